//! Task kinds, queues and enqueue options

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::error::{BrokerError, TaskError};

pub const TASK_SEND_VERIFY_EMAIL: &str = "task:send_verify_email";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendVerifyEmailPayload {
    pub username: String,
}

/// Every kind of work the processor knows how to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    SendVerifyEmail(SendVerifyEmailPayload),
}

impl Task {
    /// Wire type tag stored with the task
    pub fn type_name(&self) -> &'static str {
        match self {
            Task::SendVerifyEmail(_) => TASK_SEND_VERIFY_EMAIL,
        }
    }

    /// JSON payload bytes
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Task::SendVerifyEmail(p) => serde_json::to_vec(p),
        }
    }

    /// Unknown tags and malformed payloads can never succeed, so both are
    /// `SkipRetry`.
    pub fn decode(type_name: &str, payload: &[u8]) -> Result<Task, TaskError> {
        match type_name {
            TASK_SEND_VERIFY_EMAIL => serde_json::from_slice(payload)
                .map(Task::SendVerifyEmail)
                .map_err(|e| TaskError::skip_retry(format!("invalid payload: {}", e))),
            other => Err(TaskError::skip_retry(format!("unknown task type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Queue {
    Critical,
    Default,
    Low,
}

impl Queue {
    pub const ALL: [Queue; 3] = [Queue::Critical, Queue::Default, Queue::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Queue::Critical => "critical",
            Queue::Default => "default",
            Queue::Low => "low",
        }
    }

    /// Relative share of polls that look at this queue first
    pub fn weight(&self) -> u32 {
        match self {
            Queue::Critical => 10,
            Queue::Default => 5,
            Queue::Low => 1,
        }
    }

    /// All queues ordered by weighted random draw without replacement.
    ///
    /// Higher-weight queues tend to come first, but lower ones are never
    /// starved: a low queue is polled first with probability 1/16.
    pub fn weighted_order<R: Rng + ?Sized>(rng: &mut R) -> Vec<Queue> {
        let mut remaining = Queue::ALL.to_vec();
        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let picked = remaining
                .choose_weighted(rng, |q| q.weight())
                .copied()
                .unwrap_or(remaining[0]);
            remaining.retain(|q| *q != picked);
            order.push(picked);
        }
        order
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Queue {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Queue::Critical),
            "default" => Ok(Queue::Default),
            "low" => Ok(Queue::Low),
            other => Err(BrokerError::UnknownQueue(other.to_string())),
        }
    }
}

/// Per-task enqueue options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub max_retry: i32,
    /// Delay before the task becomes visible to workers
    pub process_in: Duration,
    pub queue: Queue,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            max_retry: 25,
            process_in: Duration::ZERO,
            queue: Queue::Default,
        }
    }
}

impl TaskOptions {
    pub fn max_retry(mut self, n: i32) -> Self {
        self.max_retry = n;
        self
    }

    pub fn process_in(mut self, delay: Duration) -> Self {
        self.process_in = delay;
        self
    }

    pub fn queue(mut self, queue: Queue) -> Self {
        self.queue = queue;
        self
    }
}

/// Delay before retry number `retried + 1`:
/// `retried^4 + 15 + rand(0..30) * (retried + 1)` seconds.
pub fn retry_delay<R: Rng + ?Sized>(retried: i32, rng: &mut R) -> Duration {
    let n = u64::from(retried.max(0) as u32);
    let jitter: u64 = rng.gen_range(0..30);
    let secs = n
        .saturating_pow(4)
        .saturating_add(15)
        .saturating_add(jitter.saturating_mul(n + 1));
    Duration::from_secs(secs)
}
