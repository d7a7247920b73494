//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vindex_models::{TaskId, TaskKind, VideoId};

/// Job payload carried on both streams.
///
/// The same payload shape flows through `jobs` (backend stage) and
/// `ml_jobs` (inference stage); the streams differ in who consumes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceJob {
    /// Deterministic job ID (`"ml_" + task_id`); the broker's idempotency key
    pub job_id: String,
    /// Task this job executes
    pub task_id: TaskId,
    /// Kind of work
    pub task_type: TaskKind,
    /// Owning video
    pub video_id: VideoId,
    /// Path of the media file
    pub video_path: String,
    /// Optional per-job configuration (model parameters, input hash, language)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl InferenceJob {
    /// Create a job for a task. The job ID is derived from the task ID so
    /// re-enqueueing the same task produces the same job.
    pub fn new(
        task_id: TaskId,
        task_type: TaskKind,
        video_id: VideoId,
        video_path: impl Into<String>,
    ) -> Self {
        Self {
            job_id: Self::job_id_for(&task_id),
            task_id,
            task_type,
            video_id,
            video_path: video_path.into(),
            config: None,
            created_at: Utc::now(),
        }
    }

    /// Set the job configuration.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Deterministic job ID for a task.
    pub fn job_id_for(task_id: &TaskId) -> String {
        format!("ml_{task_id}")
    }

    /// Idempotency key for deduplication: the job ID itself.
    pub fn idempotency_key(&self) -> &str {
        &self.job_id
    }
}

/// Broker-side state of a job, kept in a TTL'd key so the reconciler can
/// observe in-flight and recently-terminal jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Complete,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobState::Queued),
            "complete" => Some(JobState::Complete),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_deterministic() {
        let task_id = TaskId::from("task_123");
        let a = InferenceJob::new(
            task_id.clone(),
            TaskKind::ObjectDetection,
            VideoId::from("video_456"),
            "/path/to/video.mp4",
        );
        let b = InferenceJob::new(
            task_id,
            TaskKind::ObjectDetection,
            VideoId::from("video_456"),
            "/path/to/video.mp4",
        );
        assert_eq!(a.job_id, "ml_task_123");
        assert_eq!(a.job_id, b.job_id);
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }

    #[test]
    fn job_serde_round_trip() {
        let job = InferenceJob::new(
            TaskId::from("task_1"),
            TaskKind::Transcription,
            VideoId::from("video_1"),
            "/videos/a.mp4",
        )
        .with_config(serde_json::json!({"language": "en", "input_hash": "abc"}));

        let json = serde_json::to_string(&job).expect("serialize InferenceJob");
        let decoded: InferenceJob = serde_json::from_str(&json).expect("deserialize InferenceJob");

        assert_eq!(decoded.job_id, job.job_id);
        assert_eq!(decoded.task_type, TaskKind::Transcription);
        assert_eq!(decoded.video_path, job.video_path);
        assert_eq!(decoded.config, job.config);
    }

    #[test]
    fn job_state_round_trip() {
        for state in [JobState::Queued, JobState::Complete, JobState::Failed] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("running"), None);
    }
}
