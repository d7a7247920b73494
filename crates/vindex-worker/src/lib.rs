//! Backend worker for the vindex platform.
//!
//! Consumes the `jobs` queue: transitions tasks through their lifecycle,
//! forwards inference work to `ml_jobs`, polls the artifact store for
//! completion, and runs the periodic reconciler that re-aligns task state
//! with the broker.

pub mod broker;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod reconciler;
pub mod task_handler;
pub mod thumbnails;

pub use broker::{BrokerView, LiveBroker, TaskEnqueuer};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::WorkerExecutor;
pub use orchestrator::TaskOrchestrator;
pub use reconciler::{ReconcileStats, Reconciler};
pub use task_handler::{BackendTaskHandler, TaskOutcome};
pub use thumbnails::{FfmpegFrameExtractor, FrameExtractor, ThumbnailExtractor, ThumbnailStats};
