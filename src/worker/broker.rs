//! Task storage contract
//!
//! A task is `pending` until a worker dequeues it, which leases it
//! (`active`). The worker then either completes it (removed), or schedules a
//! retry (back to `pending` with a later `process_at`). Leases that outlive
//! `lease_timeout` belong to a crashed worker and are handed back to
//! `pending` by [`Broker::recover_stale`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::BrokerError;
use super::task::{Queue, Task, TaskOptions};

/// Task to be stored
#[derive(Debug, Clone)]
pub struct NewTask {
    pub type_name: String,
    pub payload: Vec<u8>,
    pub queue: Queue,
    pub max_retry: i32,
    pub process_at: DateTime<Utc>,
}

impl NewTask {
    pub fn from_task(task: &Task, opts: &TaskOptions) -> Result<Self, BrokerError> {
        let delay = chrono::Duration::from_std(opts.process_in).unwrap_or(chrono::Duration::MAX);
        Ok(Self {
            type_name: task.type_name().to_string(),
            payload: task.encode()?,
            queue: opts.queue,
            max_retry: opts.max_retry,
            process_at: Utc::now()
                .checked_add_signed(delay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }
}

/// Stored task as handed to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMessage {
    pub id: Uuid,
    pub type_name: String,
    pub payload: Vec<u8>,
    pub queue: Queue,
    pub max_retry: i32,
    /// Attempts already retried
    pub retried: i32,
    pub process_at: DateTime<Utc>,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn enqueue(&self, task: NewTask) -> Result<TaskMessage, BrokerError>;

    /// Lease the earliest due task from the first non-empty queue in `queues`
    async fn dequeue(&self, queues: &[Queue]) -> Result<Option<TaskMessage>, BrokerError>;

    /// Remove a task for good (success, skip or retries exhausted)
    async fn complete(&self, id: Uuid) -> Result<(), BrokerError>;

    /// Release the lease and make the task due again at `process_at`
    async fn retry(
        &self,
        id: Uuid,
        process_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), BrokerError>;

    /// Return leases older than `lease_timeout` to pending; returns how many
    async fn recover_stale(&self, lease_timeout: Duration) -> Result<usize, BrokerError>;
}
