//! `db` crate — persistence layer for workflow definitions, instances,
//! assignments and memberships.
//!
//! Provides a connection pool, typed row structs, repository functions for
//! every table in the workflow-rules schema, and the store traits the engine
//! talks to.  No business logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::InMemoryStore;
pub use pool::{DbPool, PgStore};
pub use store::{AssignmentStore, DefinitionFilter, DefinitionStore, MembershipStore};
