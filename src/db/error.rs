//! Store Error Types

use thiserror::Error;

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// Postgres SQLSTATE for numeric_value_out_of_range
const NUMERIC_OUT_OF_RANGE: &str = "22003";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A bigint column would leave its range, e.g. a balance overflow
    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("transaction deadline exceeded")]
    DeadlineExceeded,

    #[error("tx err: {source}, rb err: {rollback}")]
    Rollback {
        source: Box<StoreError>,
        rollback: String,
    },

    /// Failure raised by a caller-supplied callback inside a transaction
    #[error("callback failed: {0}")]
    Callback(#[source] CallbackError),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Error type returned by transaction callbacks
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db_err) => {
                let constraint = db_err.constraint().unwrap_or_default().to_string();
                let code = db_err.code().map(|c| c.into_owned());
                match code.as_deref() {
                    Some(UNIQUE_VIOLATION) => StoreError::UniqueViolation(constraint),
                    Some(FOREIGN_KEY_VIOLATION) => StoreError::ForeignKeyViolation(constraint),
                    Some(NUMERIC_OUT_OF_RANGE) => StoreError::OutOfRange(db_err.message().to_string()),
                    _ => StoreError::Database(e),
                }
            }
            other => StoreError::Database(other),
        }
    }
}
