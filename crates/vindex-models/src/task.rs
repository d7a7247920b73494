//! Task models and the static task-kind registry.
//!
//! The registry (`TaskKind` methods) is a static declaration evaluated
//! without I/O: dependency DAG, resource class, language mode, priority
//! and per-video readiness rules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;
use crate::kind::ArtifactKind;
use crate::video::{Video, VideoId, VideoStatus};

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Closed set of task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Hash,
    Transcription,
    SceneDetection,
    ObjectDetection,
    FaceDetection,
    Ocr,
    PlaceDetection,
    TopicExtraction,
    EmbeddingGeneration,
    ThumbnailExtraction,
}

/// Resource class a task kind requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Cpu,
    Gpu,
}

/// Language mode for a task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LanguageMode {
    /// Language not applicable (e.g. face_detection)
    None,
    /// Language is required, one task per language (e.g. ocr)
    Required,
    /// Language is optional, absent = auto-detect (e.g. transcription)
    Optional,
}

/// Task priority, stored as an integer so the dequeue query can order on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

impl TaskPriority {
    pub fn as_i64(&self) -> i64 {
        match self {
            TaskPriority::Low => 10,
            TaskPriority::Normal => 50,
            TaskPriority::High => 100,
        }
    }
}

/// The six ML kinds unlocked by hash completion.
const ML_KINDS: [TaskKind; 6] = [
    TaskKind::Transcription,
    TaskKind::SceneDetection,
    TaskKind::ObjectDetection,
    TaskKind::FaceDetection,
    TaskKind::Ocr,
    TaskKind::PlaceDetection,
];

impl TaskKind {
    /// All kinds, in creation-preference order.
    pub const ALL: [TaskKind; 10] = [
        TaskKind::Hash,
        TaskKind::Transcription,
        TaskKind::SceneDetection,
        TaskKind::ObjectDetection,
        TaskKind::FaceDetection,
        TaskKind::Ocr,
        TaskKind::PlaceDetection,
        TaskKind::TopicExtraction,
        TaskKind::EmbeddingGeneration,
        TaskKind::ThumbnailExtraction,
    ];

    /// The ML kinds that run directly over the video once hashed.
    pub fn ml_kinds() -> &'static [TaskKind] {
        &ML_KINDS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Hash => "hash",
            TaskKind::Transcription => "transcription",
            TaskKind::SceneDetection => "scene_detection",
            TaskKind::ObjectDetection => "object_detection",
            TaskKind::FaceDetection => "face_detection",
            TaskKind::Ocr => "ocr",
            TaskKind::PlaceDetection => "place_detection",
            TaskKind::TopicExtraction => "topic_extraction",
            TaskKind::EmbeddingGeneration => "embedding_generation",
            TaskKind::ThumbnailExtraction => "thumbnail_extraction",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        match name {
            "hash" => Ok(TaskKind::Hash),
            "transcription" => Ok(TaskKind::Transcription),
            "scene_detection" => Ok(TaskKind::SceneDetection),
            "object_detection" => Ok(TaskKind::ObjectDetection),
            "face_detection" => Ok(TaskKind::FaceDetection),
            "ocr" => Ok(TaskKind::Ocr),
            "place_detection" => Ok(TaskKind::PlaceDetection),
            "topic_extraction" => Ok(TaskKind::TopicExtraction),
            "embedding_generation" => Ok(TaskKind::EmbeddingGeneration),
            "thumbnail_extraction" => Ok(TaskKind::ThumbnailExtraction),
            other => Err(ModelError::UnknownTaskKind(other.to_string())),
        }
    }

    /// Resource class required to run this kind.
    pub fn resource_class(&self) -> ResourceClass {
        match self {
            TaskKind::ObjectDetection
            | TaskKind::FaceDetection
            | TaskKind::PlaceDetection
            | TaskKind::SceneDetection => ResourceClass::Gpu,
            TaskKind::Hash
            | TaskKind::Transcription
            | TaskKind::Ocr
            | TaskKind::TopicExtraction
            | TaskKind::EmbeddingGeneration
            | TaskKind::ThumbnailExtraction => ResourceClass::Cpu,
        }
    }

    /// Language behavior of this kind.
    pub fn language_mode(&self) -> LanguageMode {
        match self {
            TaskKind::Ocr => LanguageMode::Required,
            TaskKind::Transcription => LanguageMode::Optional,
            _ => LanguageMode::None,
        }
    }

    /// Scheduling priority of this kind.
    pub fn priority(&self) -> TaskPriority {
        match self {
            TaskKind::Hash => TaskPriority::High,
            TaskKind::TopicExtraction
            | TaskKind::EmbeddingGeneration
            | TaskKind::ThumbnailExtraction => TaskPriority::Low,
            _ => TaskPriority::Normal,
        }
    }

    /// Kinds that must be completed before this one may be created.
    pub fn dependencies(&self) -> &'static [TaskKind] {
        match self {
            TaskKind::Hash => &[],
            TaskKind::Transcription
            | TaskKind::SceneDetection
            | TaskKind::ObjectDetection
            | TaskKind::FaceDetection
            | TaskKind::Ocr
            | TaskKind::PlaceDetection => &[TaskKind::Hash],
            TaskKind::TopicExtraction
            | TaskKind::EmbeddingGeneration
            | TaskKind::ThumbnailExtraction => &ML_KINDS,
        }
    }

    /// The artifact kind this task produces, when it flows through the
    /// inference pipeline. Kinds handled locally by the backend worker
    /// (hash, thumbnails) and the derivative text kinds have none.
    pub fn artifact_kind(&self) -> Option<ArtifactKind> {
        match self {
            TaskKind::Transcription => Some(ArtifactKind::TranscriptSegment),
            TaskKind::SceneDetection => Some(ArtifactKind::Scene),
            TaskKind::ObjectDetection => Some(ArtifactKind::ObjectDetection),
            TaskKind::FaceDetection => Some(ArtifactKind::FaceDetection),
            TaskKind::Ocr => Some(ArtifactKind::OcrText),
            TaskKind::PlaceDetection => Some(ArtifactKind::PlaceClassification),
            TaskKind::Hash
            | TaskKind::TopicExtraction
            | TaskKind::EmbeddingGeneration
            | TaskKind::ThumbnailExtraction => None,
        }
    }

    /// Whether the orchestrator schedules this kind.
    ///
    /// The derivative text kinds are declared in the dependency graph but
    /// no pipeline produces them yet.
    // TODO: flip topic_extraction and embedding_generation to schedulable
    // once their inference pipelines land.
    pub fn is_schedulable(&self) -> bool {
        !matches!(
            self,
            TaskKind::TopicExtraction | TaskKind::EmbeddingGeneration
        )
    }

    /// Readiness rule for this kind against the current video state.
    pub fn is_ready(&self, video: &Video) -> bool {
        match self {
            TaskKind::Hash => video.status == VideoStatus::Discovered && !video.has_hash(),
            TaskKind::Transcription
            | TaskKind::SceneDetection
            | TaskKind::ObjectDetection
            | TaskKind::FaceDetection
            | TaskKind::Ocr
            | TaskKind::PlaceDetection => {
                video.has_hash()
                    && matches!(video.status, VideoStatus::Hashed | VideoStatus::Processing)
            }
            TaskKind::TopicExtraction
            | TaskKind::EmbeddingGeneration
            | TaskKind::ThumbnailExtraction => matches!(
                video.status,
                VideoStatus::Processing | VideoStatus::Completed
            ),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One unit of work over a video.
///
/// Unique on `(video_id, task_type, language)`; the storage layer enforces
/// the constraint. `started_at` is set exactly when the task first becomes
/// `running`, `completed_at` when it reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Unique task ID
    pub task_id: TaskId,
    /// Owning video
    pub video_id: VideoId,
    /// Kind of work
    pub task_type: TaskKind,
    /// Language, per the kind's language mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: TaskStatus,
    /// Scheduling priority (higher first)
    pub priority: i64,
    /// Kinds this task waited on at creation time
    #[serde(default)]
    pub dependencies: Vec<TaskKind>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the task first became running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Task {
    /// Create a new pending task of the given kind.
    pub fn new(video_id: VideoId, task_type: TaskKind) -> Self {
        Self {
            task_id: TaskId::new(),
            video_id,
            task_type,
            language: None,
            status: TaskStatus::Pending,
            priority: task_type.priority().as_i64(),
            dependencies: task_type.dependencies().to_vec(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Set the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Mark as running.
    pub fn start(mut self) -> Self {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self
    }

    /// Mark as completed.
    pub fn complete(mut self) -> Self {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Mark as failed.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error.into());
        self
    }

    /// Mark as cancelled.
    pub fn cancel(mut self) -> Self {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Reset a failed task so it can be re-enqueued.
    pub fn reset_for_retry(mut self) -> Self {
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_only_root_of_the_dag() {
        assert!(TaskKind::Hash.dependencies().is_empty());
        for kind in TaskKind::ml_kinds() {
            assert_eq!(kind.dependencies(), &[TaskKind::Hash]);
        }
        assert_eq!(
            TaskKind::TopicExtraction.dependencies(),
            TaskKind::ml_kinds()
        );
        assert_eq!(
            TaskKind::EmbeddingGeneration.dependencies(),
            TaskKind::ml_kinds()
        );
    }

    #[test]
    fn language_modes() {
        assert_eq!(TaskKind::Ocr.language_mode(), LanguageMode::Required);
        assert_eq!(
            TaskKind::Transcription.language_mode(),
            LanguageMode::Optional
        );
        assert_eq!(TaskKind::FaceDetection.language_mode(), LanguageMode::None);
    }

    #[test]
    fn priorities_order_hash_first_derivatives_last() {
        assert!(TaskKind::Hash.priority() > TaskKind::ObjectDetection.priority());
        assert!(TaskKind::ObjectDetection.priority() > TaskKind::TopicExtraction.priority());
    }

    #[test]
    fn readiness_follows_video_state() {
        let mut video = Video::discovered("/videos/a.mp4");
        assert!(TaskKind::Hash.is_ready(&video));
        assert!(!TaskKind::Transcription.is_ready(&video));
        assert!(!TaskKind::TopicExtraction.is_ready(&video));

        video.content_hash = Some("abc".to_string());
        video.status = VideoStatus::Hashed;
        assert!(!TaskKind::Hash.is_ready(&video));
        assert!(TaskKind::Transcription.is_ready(&video));
        assert!(TaskKind::ObjectDetection.is_ready(&video));
        assert!(!TaskKind::TopicExtraction.is_ready(&video));

        video.status = VideoStatus::Processing;
        assert!(TaskKind::TopicExtraction.is_ready(&video));
        assert!(TaskKind::ThumbnailExtraction.is_ready(&video));
    }

    #[test]
    fn task_lifecycle_timestamps() {
        let task = Task::new(VideoId::new(), TaskKind::ObjectDetection);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());

        let task = task.start();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        let task = task.complete();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());

        let task = task.reset_for_retry();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
        assert!(task.error_message.is_none());
    }

    #[test]
    fn gpu_kinds_match_registry() {
        assert_eq!(
            TaskKind::ObjectDetection.resource_class(),
            ResourceClass::Gpu
        );
        assert_eq!(TaskKind::Transcription.resource_class(), ResourceClass::Cpu);
        assert_eq!(TaskKind::Hash.resource_class(), ResourceClass::Cpu);
    }
}
