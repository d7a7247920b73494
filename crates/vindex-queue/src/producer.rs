//! Job producer.
//!
//! Routes tasks into the broker: every task enters through the single
//! `jobs` queue; the backend worker forwards inference work to `ml_jobs`.
//! Job IDs are deterministic so re-enqueueing a task is idempotent.

use std::sync::Arc;

use tracing::info;

use vindex_models::{ResourceClass, TaskId, TaskKind, VideoId};

use crate::error::{QueueError, QueueResult};
use crate::job::InferenceJob;
use crate::queue::{Broker, QueueName};

/// Routes tasks to broker queues.
#[derive(Clone)]
pub struct JobProducer {
    broker: Arc<Broker>,
}

impl JobProducer {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    /// Whether a worker with the given GPU availability can run a kind.
    /// GPU-only kinds require a GPU; CPU-capable kinds run anywhere.
    pub fn can_worker_handle(kind: TaskKind, gpu_available: bool) -> bool {
        match kind.resource_class() {
            ResourceClass::Gpu => gpu_available,
            ResourceClass::Cpu => true,
        }
    }

    /// Enqueue a task onto the `jobs` queue. Returns the deterministic job
    /// ID (`"ml_" + task_id`).
    pub async fn enqueue_task(
        &self,
        task_id: &TaskId,
        task_type: TaskKind,
        video_id: &VideoId,
        video_path: &str,
        config: Option<serde_json::Value>,
    ) -> QueueResult<String> {
        let mut job = InferenceJob::new(
            task_id.clone(),
            task_type,
            video_id.clone(),
            video_path,
        );
        if let Some(config) = config {
            job = job.with_config(config);
        }

        let job_id = self.broker.enqueue(QueueName::Jobs, &job).await?;
        info!(
            task_id = %task_id,
            task_type = %task_type,
            job_id = %job_id,
            "Enqueued task to jobs queue"
        );
        Ok(job_id)
    }

    /// Forward a task onto the `ml_jobs` queue, handled by
    /// `process_inference_job` on the ML workers. Rejects kinds that do not
    /// flow through the inference pipeline.
    pub async fn enqueue_to_ml_jobs(
        &self,
        task_id: &TaskId,
        task_type: TaskKind,
        video_id: &VideoId,
        video_path: &str,
        config: Option<serde_json::Value>,
    ) -> QueueResult<String> {
        if task_type.artifact_kind().is_none() {
            return Err(QueueError::UnsupportedTaskKind(task_type.to_string()));
        }

        let mut job = InferenceJob::new(
            task_id.clone(),
            task_type,
            video_id.clone(),
            video_path,
        );
        if let Some(config) = config {
            job = job.with_config(config);
        }

        let job_id = self.broker.enqueue(QueueName::MlJobs, &job).await?;
        info!(
            task_id = %task_id,
            task_type = %task_type,
            job_id = %job_id,
            "Forwarded task to ml_jobs queue"
        );
        Ok(job_id)
    }

    /// The broker behind this producer.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }
}
