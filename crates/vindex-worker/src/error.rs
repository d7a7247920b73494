//! Worker error types.

use thiserror::Error;

use vindex_models::TaskStatus;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Task not found for video {video_id} kind {kind}")]
    TaskNotFound { video_id: String, kind: String },

    #[error("Task {task_id} is already terminal ({status})")]
    TaskAlreadyTerminal { task_id: String, status: TaskStatus },

    #[error("Cancelled")]
    Cancelled,

    #[error("Timed out waiting for artifacts after {seconds}s")]
    PollTimeout { seconds: u64 },

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] vindex_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vindex_queue::QueueError),

    #[error("Model error: {0}")]
    Model(#[from] vindex_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Cooperative cancellation: propagates without marking the task failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }

    /// Errors the broker should retry the job for.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::Store(_)
                | WorkerError::Queue(_)
                | WorkerError::Io(_)
                | WorkerError::PollTimeout { .. }
        )
    }
}
