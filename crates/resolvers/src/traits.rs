//! The `Resolver` trait — the contract every named resolver must fulfil.

use async_trait::async_trait;
use db::MembershipStore;

use crate::{RequestContext, ResolverError, WorkflowObject};

/// A named function from (caller, data access, triggering object) to the
/// user IDs that should act on an assignment.
///
/// Implementations must not mutate anything; the same resolver may run
/// concurrently for many assignments.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(
        &self,
        ctx: &RequestContext,
        members: &dyn MembershipStore,
        object: &WorkflowObject,
    ) -> Result<Vec<String>, ResolverError>;
}
