//! ML worker error types.

use thiserror::Error;

pub type MlWorkerResult<T> = Result<T, MlWorkerError>;

#[derive(Debug, Error)]
pub enum MlWorkerError {
    #[error("Input file missing: {0}")]
    InputMissing(String),

    #[error("Input hash mismatch: expected {expected}, got {actual}")]
    InputHashMismatch { expected: String, actual: String },

    #[error("Missing provenance field: {0}")]
    MissingProvenance(&'static str),

    #[error("Unsupported task kind: {0}")]
    UnsupportedKind(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Store error: {0}")]
    Store(#[from] vindex_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vindex_queue::QueueError),

    #[error("Model error: {0}")]
    Model(#[from] vindex_models::ModelError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MlWorkerError {
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Fatal errors fail the job without retry: the input is wrong or the
    /// response is structurally unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MlWorkerError::InputMissing(_)
                | MlWorkerError::InputHashMismatch { .. }
                | MlWorkerError::MissingProvenance(_)
                | MlWorkerError::UnsupportedKind(_)
        )
    }
}
