//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// A conditional status update matched no row because the current
    /// status no longer equals the expected one.
    #[error("{entity} '{id}' is no longer in status {expected}")]
    StaleTransition {
        entity: &'static str,
        id: String,
        expected: String,
    },

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl DbError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Map a sqlx error, turning Postgres unique violations (SQLSTATE 23505)
    /// into [`DbError::UniqueViolation`].
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return Self::UniqueViolation(
                    db_err.constraint().unwrap_or_default().to_string(),
                );
            }
        }
        Self::Sqlx(err)
    }
}
