//! Shared domain models for the vindex platform.
//!
//! This crate provides Serde-serializable types for:
//! - Videos (assets) and their processing lifecycle
//! - Tasks, the task-kind registry and the dependency graph
//! - Runs grouping one logical ML execution over an asset
//! - Artifact envelopes with provenance and typed payloads
//! - The payload schema registry
//! - Selection policies and their compiled filters

pub mod artifact;
pub mod error;
pub mod kind;
pub mod payload;
pub mod run;
pub mod schema;
pub mod selection;
pub mod task;
pub mod video;

// Re-export common types
pub use artifact::{ArtifactEnvelope, ArtifactId, ModelProfile};
pub use error::{ModelError, ModelResult};
pub use kind::ArtifactKind;
pub use payload::{
    ArtifactPayload, BoundingBox, FaceDetectionV1, MetadataV1, ObjectDetectionV1, OcrTextV1,
    PlaceClassificationV1, SceneV1, TranscriptSegmentV1,
};
pub use run::{Run, RunId, RunStatus};
pub use schema::{register_all_schemas, SchemaRegistry};
pub use selection::{SelectionFilter, SelectionMode, SelectionPolicy};
pub use task::{LanguageMode, ResourceClass, Task, TaskId, TaskKind, TaskPriority, TaskStatus};
pub use video::{Video, VideoId, VideoStatus};
