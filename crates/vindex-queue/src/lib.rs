//! Job broker for the two-stage queueing system.
//!
//! Two durable Redis Streams back the pipeline: `jobs` (consumed by
//! backend workers) and `ml_jobs` (consumed by ML workers). Job IDs are
//! deterministic (`"ml_" + task_id`) and double as the idempotency key the
//! broker deduplicates on.

pub mod error;
pub mod job;
pub mod producer;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{InferenceJob, JobState};
pub use producer::JobProducer;
pub use queue::{Broker, QueueConfig, QueueName};
