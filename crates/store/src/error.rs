//! Store error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Fold a sqlx error into the store taxonomy, surfacing CHECK and
    /// UNIQUE violations as [`StoreError::Constraint`] so callers can
    /// drop the offending row and carry on.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let is_constraint = matches!(
                db_err.kind(),
                sqlx::error::ErrorKind::CheckViolation | sqlx::error::ErrorKind::UniqueViolation
            );
            // SQLite reports some constraint classes only through the
            // message text.
            if is_constraint || db_err.message().to_lowercase().contains("constraint") {
                return Self::Constraint(db_err.message().to_string());
            }
        }
        Self::Database(err)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
