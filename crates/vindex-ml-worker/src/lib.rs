//! ML compute worker for the vindex platform.
//!
//! Consumes the `ml_jobs` queue: re-validates the input file, invokes the
//! kind-specific inference collaborator, transforms the response into
//! artifact envelopes and batch-persists them. Task-table state is never
//! touched here; the backend worker observes the outcome through the
//! artifact store.

pub mod config;
pub mod error;
pub mod executor;
pub mod handler;
pub mod inference;
pub mod transform;

pub use config::MlWorkerConfig;
pub use error::{MlWorkerError, MlWorkerResult};
pub use executor::MlExecutor;
pub use handler::{InferenceJobHandler, InferenceOutcome};
pub use inference::{HttpInferenceEngine, InferenceEngine, InferenceRequest, InferenceResponse};
pub use transform::transform_to_envelopes;
