//! Resolver-level error type.

use thiserror::Error;

/// Errors returned by a resolver's `resolve` method.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The resolver cannot run with the inputs it was given.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Object-bound resolvers need a triggering object reference.
    #[error("workflow object reference is missing")]
    MissingObject,

    #[error("store failure: {0}")]
    Store(#[from] db::DbError),
}
