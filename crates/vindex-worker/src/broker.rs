//! Broker seams for the worker.
//!
//! The orchestrator and reconciler talk to the broker through these traits
//! so their logic can be exercised without a running Redis.

use std::sync::Arc;

use async_trait::async_trait;

use vindex_queue::{Broker, InferenceJob, JobProducer, JobState, QueueName, QueueResult};

/// Enqueues jobs onto the broker queues.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskEnqueuer: Send + Sync {
    /// Enqueue onto the backend `jobs` queue.
    async fn enqueue(&self, job: &InferenceJob) -> QueueResult<String>;

    /// Forward onto the `ml_jobs` queue.
    async fn enqueue_ml(&self, job: &InferenceJob) -> QueueResult<String>;
}

/// Observes broker-side job state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerView: Send + Sync {
    /// Whether the broker knows the job (queued or recently terminal).
    async fn job_exists(&self, job_id: &str) -> QueueResult<bool>;

    /// Broker-side state of the job, if known.
    async fn job_state(&self, job_id: &str) -> QueueResult<Option<JobState>>;
}

/// Live broker implementation of both seams, routing enqueues through the
/// job producer.
#[derive(Clone)]
pub struct LiveBroker {
    broker: Arc<Broker>,
    producer: JobProducer,
}

impl LiveBroker {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self {
            producer: JobProducer::new(Arc::clone(&broker)),
            broker,
        }
    }
}

#[async_trait]
impl TaskEnqueuer for LiveBroker {
    async fn enqueue(&self, job: &InferenceJob) -> QueueResult<String> {
        self.producer
            .enqueue_task(
                &job.task_id,
                job.task_type,
                &job.video_id,
                &job.video_path,
                job.config.clone(),
            )
            .await
    }

    async fn enqueue_ml(&self, job: &InferenceJob) -> QueueResult<String> {
        self.producer
            .enqueue_to_ml_jobs(
                &job.task_id,
                job.task_type,
                &job.video_id,
                &job.video_path,
                job.config.clone(),
            )
            .await
    }
}

#[async_trait]
impl BrokerView for LiveBroker {
    async fn job_exists(&self, job_id: &str) -> QueueResult<bool> {
        // the reconciler introspects the backend queue
        self.broker.job_exists(QueueName::Jobs, job_id).await
    }

    async fn job_state(&self, job_id: &str) -> QueueResult<Option<JobState>> {
        self.broker.job_state(QueueName::Jobs, job_id).await
    }
}
