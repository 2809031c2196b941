//! `resolvers` crate — the `Resolver` trait, the process-wide resolver
//! registry and the built-in resolvers.
//!
//! A resolver turns a triggering object into the user IDs that should act on
//! an approval or review.  Every resolver, built-in or test double,
//! implements [`Resolver`]; the engine looks them up by key through
//! [`ResolverRegistry`].

pub mod builtin;
pub mod context;
pub mod error;
pub mod mock;
pub mod object_type;
pub mod registry;
pub mod traits;

pub use context::{RequestContext, WorkflowObject};
pub use error::ResolverError;
pub use object_type::{FieldEligibility, ObjectTypeCatalog, WorkflowObjectType};
pub use registry::{ResolverRegistry, ResolverRegistryBuilder};
pub use traits::Resolver;
