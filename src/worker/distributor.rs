//! Producer side of the task queue

use std::sync::Arc;

use async_trait::async_trait;

use super::broker::{Broker, NewTask, TaskMessage};
use super::error::BrokerError;
use super::task::{SendVerifyEmailPayload, Task, TaskOptions};

#[async_trait]
pub trait TaskDistributor: Send + Sync {
    async fn distribute(&self, task: Task, opts: TaskOptions) -> Result<TaskMessage, BrokerError>;

    async fn distribute_send_verify_email(
        &self,
        payload: SendVerifyEmailPayload,
        opts: TaskOptions,
    ) -> Result<TaskMessage, BrokerError> {
        self.distribute(Task::SendVerifyEmail(payload), opts).await
    }
}

/// Enqueues straight into a [`Broker`]
pub struct BrokerDistributor {
    broker: Arc<dyn Broker>,
}

impl BrokerDistributor {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl TaskDistributor for BrokerDistributor {
    async fn distribute(&self, task: Task, opts: TaskOptions) -> Result<TaskMessage, BrokerError> {
        let new_task = NewTask::from_task(&task, &opts)?;
        let info = self.broker.enqueue(new_task).await?;

        tracing::info!(
            task_id = %info.id,
            task_type = %info.type_name,
            payload = %String::from_utf8_lossy(&info.payload),
            queue = %info.queue,
            max_retry = info.max_retry,
            process_at = %info.process_at,
            "enqueued task"
        );
        Ok(info)
    }
}
