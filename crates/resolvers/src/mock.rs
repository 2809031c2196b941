//! `MockResolver` — a test double for `Resolver`.
//!
//! Useful in unit and integration tests where a real resolver is either
//! unavailable or irrelevant.

use async_trait::async_trait;
use db::MembershipStore;
use std::sync::{Arc, Mutex, PoisonError};

use crate::{RequestContext, Resolver, ResolverError, WorkflowObject};

/// Behaviour injected into `MockResolver` at construction time.
pub enum MockBehaviour {
    /// Return a fixed list of user IDs.
    Return(Vec<String>),
    /// Fail with a `BadRequest` error.
    Fail(String),
}

/// A mock resolver that records every object it is asked about and returns
/// a programmer-specified result.
pub struct MockResolver {
    pub behaviour: MockBehaviour,
    /// IDs of every object seen by this resolver (in call order).
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockResolver {
    pub fn returning<S: Into<String>>(user_ids: impl IntoIterator<Item = S>) -> Self {
        Self {
            behaviour: MockBehaviour::Return(user_ids.into_iter().map(Into::into).collect()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Fail(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this resolver has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(
        &self,
        _ctx: &RequestContext,
        _members: &dyn MembershipStore,
        object: &WorkflowObject,
    ) -> Result<Vec<String>, ResolverError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(object.id.clone());

        match &self.behaviour {
            MockBehaviour::Return(ids) => Ok(ids.clone()),
            MockBehaviour::Fail(msg) => Err(ResolverError::BadRequest(msg.clone())),
        }
    }
}
