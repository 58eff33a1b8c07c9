//! Asynchronous task queue
//!
//! Side effects that must not run inside a database transaction (sending
//! mail) are enqueued as [`Task`]s and executed later by the
//! [`TaskProcessor`]. Delivery is at least once: a task stays in the broker
//! until its handler succeeds, it is skipped, or its retries run out.
//!
//! - [`task`] - task kinds, queues and enqueue options
//! - [`broker`] - storage contract; [`pg_broker`] and [`memory_broker`]
//! - [`distributor`] - producer side
//! - [`processor`] - consumer side and the lease recovery sweep

pub mod broker;
pub mod distributor;
pub mod error;
pub mod memory_broker;
pub mod pg_broker;
pub mod processor;
pub mod task;

pub use broker::{Broker, NewTask, TaskMessage};
pub use distributor::{BrokerDistributor, TaskDistributor};
pub use error::{BrokerError, TaskError};
pub use memory_broker::MemoryBroker;
pub use pg_broker::PgBroker;
pub use processor::{ProcessorConfig, TaskProcessor};
pub use task::{Queue, SendVerifyEmailPayload, Task, TaskOptions};
