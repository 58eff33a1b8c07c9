//! Task queue errors

use thiserror::Error;

/// Handler outcome that decides what happens to a failed task
#[derive(Error, Debug)]
pub enum TaskError {
    /// Transient failure; retried with backoff until `max_retry` is reached
    #[error("{0}")]
    Retry(String),

    /// Permanent failure; the task is dropped without further attempts
    #[error("skip retry: {0}")]
    SkipRetry(String),
}

impl TaskError {
    pub fn retry(msg: impl Into<String>) -> Self {
        TaskError::Retry(msg.into())
    }

    pub fn skip_retry(msg: impl Into<String>) -> Self {
        TaskError::SkipRetry(msg.into())
    }
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("failed to encode task payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    #[error("broker database error: {0}")]
    Database(#[from] sqlx::Error),
}
