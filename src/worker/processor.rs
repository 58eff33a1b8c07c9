//! Task Processor
//!
//! `concurrency` workers poll the broker. Each poll orders the queues by
//! weighted random draw, leases one due task, decodes it and dispatches on
//! the [`Task`] variant. The outcome decides the task's fate:
//!
//! | outcome            | action                                         |
//! |--------------------|------------------------------------------------|
//! | `Ok`               | completed (removed)                            |
//! | `Retry`, budget    | rescheduled with backoff, `retried + 1`        |
//! | `Retry`, exhausted | logged and removed                             |
//! | `SkipRetry`        | logged and removed                             |
//!
//! A separate recovery loop returns leases held longer than
//! `lease_timeout` to the queue, so a task whose worker died is delivered
//! again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::broker::{Broker, TaskMessage};
use super::error::{BrokerError, TaskError};
use super::task::{Queue, SendVerifyEmailPayload, Task, retry_delay};
use crate::db::queries::CreateVerifyEmailParams;
use crate::db::{Store, StoreError};
use crate::mail::{Email, EmailSender};
use crate::shutdown::ShutdownSignal;

const SECRET_CODE_LEN: usize = 32;
const SECRET_CODE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Configuration for the task processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Idle sleep when no queue has a due task
    pub poll_interval: Duration,
    /// A lease older than this is considered abandoned
    pub lease_timeout: Duration,
    /// How often to scan for abandoned leases
    pub recovery_interval: Duration,
    /// Base URL of the email verification endpoint
    pub verify_url: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_secs(1),
            lease_timeout: Duration::from_secs(300),
            recovery_interval: Duration::from_secs(30),
            verify_url: "http://localhost:8080/v1/verify_email".to_string(),
        }
    }
}

pub struct TaskProcessor {
    broker: Arc<dyn Broker>,
    store: Arc<dyn Store>,
    mailer: Arc<dyn EmailSender>,
    config: ProcessorConfig,
    rng: Mutex<StdRng>,
    shutdown: Arc<ShutdownSignal>,
}

impl TaskProcessor {
    pub fn new(
        broker: Arc<dyn Broker>,
        store: Arc<dyn Store>,
        mailer: Arc<dyn EmailSender>,
        config: ProcessorConfig,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        Self {
            broker,
            store,
            mailer,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
            shutdown,
        }
    }

    /// Replace the random source (queue order, backoff jitter, secret codes)
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// Spawn the workers and the recovery loop. Handles finish after
    /// shutdown is requested.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            lease_timeout_secs = self.config.lease_timeout.as_secs(),
            "Starting task processor"
        );

        let mut handles = Vec::with_capacity(self.config.concurrency + 1);
        for worker_id in 0..self.config.concurrency {
            let processor = self.clone();
            handles.push(tokio::spawn(async move {
                processor.run_worker(worker_id).await;
            }));
        }
        let processor = self.clone();
        handles.push(tokio::spawn(async move {
            processor.run_recovery().await;
        }));
        handles
    }

    async fn run_worker(&self, worker_id: usize) {
        debug!(worker_id, "worker started");
        while !self.shutdown.is_shutdown_requested() {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(worker_id, error = %e, "task poll failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        debug!(worker_id, "worker stopped");
    }

    async fn run_recovery(&self) {
        while !self.shutdown.is_shutdown_requested() {
            if let Err(e) = self.recover_stale().await {
                error!(error = %e, "lease recovery scan failed");
            }
            tokio::time::sleep(self.config.recovery_interval).await;
        }
    }

    /// Return abandoned leases to their queues
    pub async fn recover_stale(&self) -> Result<usize, BrokerError> {
        let recovered = self.broker.recover_stale(self.config.lease_timeout).await?;
        if recovered > 0 {
            warn!(count = recovered, "Recovered abandoned task leases");
        }
        Ok(recovered)
    }

    /// Lease and run at most one task. Returns whether a task was found.
    pub async fn process_next(&self) -> Result<bool, BrokerError> {
        let order = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            Queue::weighted_order(&mut *rng)
        };
        let Some(msg) = self.broker.dequeue(&order).await? else {
            return Ok(false);
        };
        self.process(msg).await?;
        Ok(true)
    }

    async fn process(&self, msg: TaskMessage) -> Result<(), BrokerError> {
        let outcome = match Task::decode(&msg.type_name, &msg.payload) {
            Ok(task) => self.handle(task).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(
                    task_id = %msg.id,
                    task_type = %msg.type_name,
                    queue = %msg.queue,
                    retried = msg.retried,
                    "processed task"
                );
                self.broker.complete(msg.id).await
            }
            Err(TaskError::SkipRetry(reason)) => {
                error!(
                    task_id = %msg.id,
                    task_type = %msg.type_name,
                    queue = %msg.queue,
                    error = %reason,
                    "task failed, skipping retry"
                );
                self.broker.complete(msg.id).await
            }
            Err(TaskError::Retry(reason)) if msg.retried < msg.max_retry => {
                let delay = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    retry_delay(msg.retried, &mut *rng)
                };
                let process_at = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|d| Utc::now().checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                warn!(
                    task_id = %msg.id,
                    task_type = %msg.type_name,
                    queue = %msg.queue,
                    retried = msg.retried,
                    max_retry = msg.max_retry,
                    retry_in_secs = delay.as_secs(),
                    error = %reason,
                    "task failed, will retry"
                );
                self.broker.retry(msg.id, process_at, &reason).await
            }
            Err(TaskError::Retry(reason)) => {
                error!(
                    task_id = %msg.id,
                    task_type = %msg.type_name,
                    queue = %msg.queue,
                    retried = msg.retried,
                    max_retry = msg.max_retry,
                    error = %reason,
                    "task retries exhausted, dropping"
                );
                self.broker.complete(msg.id).await
            }
        }
    }

    async fn handle(&self, task: Task) -> Result<(), TaskError> {
        match task {
            Task::SendVerifyEmail(payload) => self.handle_send_verify_email(payload).await,
        }
    }

    async fn handle_send_verify_email(&self, payload: SendVerifyEmailPayload) -> Result<(), TaskError> {
        // The creating transaction may not have committed yet; a missing
        // user is retried rather than skipped.
        let user = self.store.get_user(&payload.username).await.map_err(|e| match e {
            StoreError::NotFound => {
                TaskError::retry(format!("user {} not found", payload.username))
            }
            other => TaskError::retry(format!("failed to get user: {}", other)),
        })?;

        let secret_code = self.secret_code();
        let verify_email = self
            .store
            .create_verify_email(CreateVerifyEmailParams {
                username: user.username.clone(),
                email: user.email.clone(),
                secret_code,
            })
            .await
            .map_err(|e| TaskError::retry(format!("failed to create verify email: {}", e)))?;

        let verify_url = format!(
            "{}?email_id={}&secret_code={}",
            self.config.verify_url, verify_email.id, verify_email.secret_code
        );
        let content = format!(
            "Hello {},<br/>\
             Thank you for registering with us!<br/>\
             Please <a href=\"{}\">click here</a> to verify your email address.<br/>",
            user.full_name, verify_url
        );
        let email = Email::new(user.email.clone(), "Welcome to Simple Bank", content);

        self.mailer
            .send_email(&email)
            .await
            .map_err(|e| TaskError::retry(format!("failed to send verify email: {}", e)))?;

        info!(
            username = %user.username,
            email = %user.email,
            email_id = verify_email.id,
            "verification email sent"
        );
        Ok(())
    }

    fn secret_code(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..SECRET_CODE_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..SECRET_CODE_ALPHABET.len());
                char::from(SECRET_CODE_ALPHABET[idx])
            })
            .collect()
    }
}
