//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types, just SQL.

pub mod assignments;
pub mod definitions;
pub mod memberships;
