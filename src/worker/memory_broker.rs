//! In-process broker
//!
//! Same semantics as [`PgBroker`](super::PgBroker) without persistence.
//! Tasks are lost when the process exits.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::broker::{Broker, NewTask, TaskMessage};
use super::error::BrokerError;
use super::task::Queue;

#[derive(Debug, Clone)]
struct StoredTask {
    message: TaskMessage,
    leased_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Default)]
pub struct MemoryBroker {
    tasks: Mutex<HashMap<Uuid, StoredTask>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, StoredTask>> {
        // a poisoned map is still consistent: every mutation is a single insert/update
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored tasks, pending or active
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored task
    pub fn tasks(&self) -> Vec<TaskMessage> {
        self.lock().values().map(|t| t.message.clone()).collect()
    }

    pub fn last_error(&self, id: Uuid) -> Option<String> {
        self.lock().get(&id).and_then(|t| t.last_error.clone())
    }

    /// Pretend `id` was leased at `at`
    #[cfg(test)]
    pub(crate) fn backdate_lease(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(task) = self.lock().get_mut(&id) {
            task.leased_at = Some(at);
        }
    }

    /// Make every pending task due now
    #[cfg(test)]
    pub(crate) fn make_all_due(&self) {
        let now = Utc::now();
        for task in self.lock().values_mut() {
            task.message.process_at = now;
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, task: NewTask) -> Result<TaskMessage, BrokerError> {
        let message = TaskMessage {
            id: Uuid::new_v4(),
            type_name: task.type_name,
            payload: task.payload,
            queue: task.queue,
            max_retry: task.max_retry,
            retried: 0,
            process_at: task.process_at,
        };
        self.lock().insert(
            message.id,
            StoredTask {
                message: message.clone(),
                leased_at: None,
                last_error: None,
            },
        );
        Ok(message)
    }

    async fn dequeue(&self, queues: &[Queue]) -> Result<Option<TaskMessage>, BrokerError> {
        let now = Utc::now();
        let mut tasks = self.lock();
        for queue in queues {
            let due = tasks
                .values_mut()
                .filter(|t| {
                    t.leased_at.is_none() && t.message.queue == *queue && t.message.process_at <= now
                })
                .min_by_key(|t| t.message.process_at);
            if let Some(task) = due {
                task.leased_at = Some(now);
                return Ok(Some(task.message.clone()));
            }
        }
        Ok(None)
    }

    async fn complete(&self, id: Uuid) -> Result<(), BrokerError> {
        self.lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(BrokerError::TaskNotFound(id))
    }

    async fn retry(
        &self,
        id: Uuid,
        process_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<(), BrokerError> {
        let mut tasks = self.lock();
        let task = tasks.get_mut(&id).ok_or(BrokerError::TaskNotFound(id))?;
        task.message.retried += 1;
        task.message.process_at = process_at;
        task.leased_at = None;
        task.last_error = Some(last_error.to_string());
        Ok(())
    }

    async fn recover_stale(&self, lease_timeout: Duration) -> Result<usize, BrokerError> {
        let timeout = chrono::Duration::from_std(lease_timeout).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut recovered = 0;
        for task in self.lock().values_mut() {
            if task.leased_at.is_some_and(|at| at < cutoff) {
                task.leased_at = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}
