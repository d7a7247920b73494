//! Task orchestrator.
//!
//! Creates tasks for a video according to the task graph and the video's
//! current state, and owns the task-state transitions driven by worker
//! outcomes. Queue routing stays behind the [`TaskEnqueuer`] seam; the
//! orchestrator never inspects queue internals.

use std::sync::Arc;

use tracing::{info, warn};

use vindex_models::{Task, TaskKind, TaskStatus, Video, VideoStatus};
use vindex_queue::InferenceJob;
use vindex_store::{StoreError, TaskRepository, VideoRepository};

use crate::broker::TaskEnqueuer;
use crate::error::WorkerResult;

/// Build the queue job for a task, carrying the language and the input
/// hash the ML worker re-validates against.
pub fn job_for_task(task: &Task, video: &Video) -> InferenceJob {
    let mut config = serde_json::Map::new();
    if let Some(language) = &task.language {
        config.insert("language".to_string(), serde_json::json!(language));
    }
    if let Some(hash) = &video.content_hash {
        config.insert("input_hash".to_string(), serde_json::json!(hash));
    }

    let job = InferenceJob::new(
        task.task_id.clone(),
        task.task_type,
        task.video_id.clone(),
        &video.file_path,
    );
    if config.is_empty() {
        job
    } else {
        job.with_config(serde_json::Value::Object(config))
    }
}

/// Creates tasks and drives task-state transitions.
pub struct TaskOrchestrator {
    videos: VideoRepository,
    tasks: TaskRepository,
    enqueuer: Arc<dyn TaskEnqueuer>,
    ocr_language: String,
}

impl TaskOrchestrator {
    pub fn new(
        videos: VideoRepository,
        tasks: TaskRepository,
        enqueuer: Arc<dyn TaskEnqueuer>,
        ocr_language: impl Into<String>,
    ) -> Self {
        Self {
            videos,
            tasks,
            enqueuer,
            ocr_language: ocr_language.into(),
        }
    }

    /// Create (and enqueue) every task whose readiness rule is satisfied
    /// and that does not already exist for this video. Returns the created
    /// set.
    pub async fn create_tasks_for_video(&self, video: &Video) -> WorkerResult<Vec<Task>> {
        let existing = self.tasks.find_by_video(&video.video_id).await?;
        let mut created = Vec::new();

        for kind in TaskKind::ALL {
            if !kind.is_schedulable() || !kind.is_ready(video) {
                continue;
            }
            if existing.iter().any(|t| t.task_type == kind) {
                continue;
            }
            if !self.dependencies_satisfied(kind, video, &existing) {
                continue;
            }

            let mut task = Task::new(video.video_id.clone(), kind);
            if kind == TaskKind::Ocr {
                task = task.with_language(self.ocr_language.clone());
            }

            match self.tasks.create(&task).await {
                Ok(()) => {}
                Err(StoreError::Duplicate(_)) => {
                    // another orchestrator pass won the race
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let job = job_for_task(&task, video);
            match self.enqueuer.enqueue(&job).await {
                Ok(_) => {}
                Err(e) if e.is_duplicate() => {}
                Err(e) => {
                    warn!(task_id = %task.task_id, "Enqueue failed, reconciler will retry: {e}");
                }
            }

            info!(
                video_id = %video.video_id,
                task_id = %task.task_id,
                kind = %kind,
                "Created task"
            );
            created.push(task);
        }

        Ok(created)
    }

    fn dependencies_satisfied(&self, kind: TaskKind, video: &Video, existing: &[Task]) -> bool {
        kind.dependencies().iter().all(|dep| match dep {
            // the hash dependency is carried by the video state itself
            TaskKind::Hash => video.has_hash(),
            dep => existing
                .iter()
                .any(|t| t.task_type == *dep && t.status == TaskStatus::Completed),
        })
    }

    /// Create tasks for every discovered video.
    pub async fn process_discovered_videos(&self) -> WorkerResult<Vec<Task>> {
        let mut created = Vec::new();
        for video in self.videos.find_by_status(VideoStatus::Discovered).await? {
            created.extend(self.create_tasks_for_video(&video).await?);
        }
        Ok(created)
    }

    /// Mark a task completed and advance the video lifecycle: hash
    /// completion unlocks the ML kinds; an all-terminal video with no
    /// failures becomes `completed`.
    pub async fn handle_task_completion(&self, task: &Task) -> WorkerResult<()> {
        let completed = task.clone().complete();
        self.tasks.update(&completed).await?;

        if task.task_type == TaskKind::Hash {
            self.videos
                .update_status(&task.video_id, VideoStatus::Hashed)
                .await?;
            let video = self.videos.require(&task.video_id).await?;
            let unlocked = self.create_tasks_for_video(&video).await?;
            info!(
                video_id = %task.video_id,
                unlocked = unlocked.len(),
                "Hash complete, ML tasks unlocked"
            );
        } else {
            let video = self.videos.require(&task.video_id).await?;
            if video.status == VideoStatus::Hashed {
                self.videos
                    .update_status(&task.video_id, VideoStatus::Processing)
                    .await?;
            }
            // derivative kinds become ready once their dependencies finish
            let video = self.videos.require(&task.video_id).await?;
            self.create_tasks_for_video(&video).await?;
        }

        self.complete_video_if_done(task).await
    }

    async fn complete_video_if_done(&self, task: &Task) -> WorkerResult<()> {
        let tasks = self.tasks.find_by_video(&task.video_id).await?;
        let all_terminal = tasks.iter().all(|t| t.status.is_terminal());
        let none_failed = tasks.iter().all(|t| t.status != TaskStatus::Failed);

        if all_terminal && none_failed {
            self.videos
                .update_status(&task.video_id, VideoStatus::Completed)
                .await?;
            info!(video_id = %task.video_id, "All tasks terminal, video completed");
        }
        Ok(())
    }

    /// Mark a task failed. A failed hash fails the whole video; ML
    /// failures leave the video in `processing`.
    pub async fn handle_task_failure(&self, task: &Task, error: &str) -> WorkerResult<()> {
        let failed = task.clone().fail(error);
        self.tasks.update(&failed).await?;

        if task.task_type == TaskKind::Hash {
            self.videos.mark_failed(&task.video_id, error).await?;
        } else {
            let video = self.videos.require(&task.video_id).await?;
            if video.status == VideoStatus::Hashed {
                self.videos
                    .update_status(&task.video_id, VideoStatus::Processing)
                    .await?;
            }
        }
        Ok(())
    }

    /// Mark a task cancelled without touching the video lifecycle.
    pub async fn handle_task_cancellation(&self, task: &Task) -> WorkerResult<()> {
        let cancelled = task.clone().cancel();
        self.tasks.update(&cancelled).await?;
        Ok(())
    }

    /// Reset every failed task to pending and re-enqueue it. Returns the
    /// number of tasks reset.
    pub async fn retry_failed_tasks(&self) -> WorkerResult<usize> {
        let failed = self.tasks.find_by_status(TaskStatus::Failed).await?;
        let mut reset = 0;

        for task in failed {
            let video = self.videos.require(&task.video_id).await?;
            let pending = task.clone().reset_for_retry();
            self.tasks.update(&pending).await?;

            let job = job_for_task(&pending, &video);
            match self.enqueuer.enqueue(&job).await {
                Ok(_) => {}
                Err(e) if e.is_duplicate() => {}
                Err(e) => {
                    warn!(task_id = %pending.task_id, "Re-enqueue failed: {e}");
                }
            }
            reset += 1;
        }

        if reset > 0 {
            info!(count = reset, "Failed tasks reset to pending");
        }
        Ok(reset)
    }
}
