//! Backend task handler.
//!
//! Processes one job from the `jobs` queue: loads the task, transitions it
//! to running, dispatches by kind (local hash/thumbnail work, or a forward
//! to `ml_jobs` followed by polling the artifact store), and closes the
//! task out. The task's final state is determined solely by what ends up
//! in the artifact store, so the handler is idempotent.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::warn;

use vindex_models::{Task, TaskKind, TaskStatus};
use vindex_queue::InferenceJob;
use vindex_store::{ArtifactStore, TaskRepository, VideoRepository};

use crate::broker::TaskEnqueuer;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::orchestrator::TaskOrchestrator;
use crate::thumbnails::ThumbnailExtractor;

/// Result of processing one job.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    pub artifact_count: usize,
}

/// Handles jobs from the backend `jobs` queue.
pub struct BackendTaskHandler {
    tasks: TaskRepository,
    videos: VideoRepository,
    artifacts: ArtifactStore,
    orchestrator: TaskOrchestrator,
    enqueuer: Arc<dyn TaskEnqueuer>,
    thumbnails: ThumbnailExtractor,
    config: WorkerConfig,
}

impl BackendTaskHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: TaskRepository,
        videos: VideoRepository,
        artifacts: ArtifactStore,
        orchestrator: TaskOrchestrator,
        enqueuer: Arc<dyn TaskEnqueuer>,
        thumbnails: ThumbnailExtractor,
        config: WorkerConfig,
    ) -> Self {
        Self {
            tasks,
            videos,
            artifacts,
            orchestrator,
            enqueuer,
            thumbnails,
            config,
        }
    }

    /// Process one job. Cooperative cancellation is honored at every
    /// suspension point of the poll loop; on cancel the task is marked
    /// `cancelled` and the cancellation propagates.
    pub async fn process_ml_task(
        &self,
        job: &InferenceJob,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<TaskOutcome> {
        let task = self.load_task(job).await?;
        let logger = TaskLogger::new(&task.task_id, task.task_type);

        if task.status.is_terminal() {
            return Err(WorkerError::TaskAlreadyTerminal {
                task_id: task.task_id.to_string(),
                status: task.status,
            });
        }

        // pending -> running; a redelivered job finds the task already
        // running and keeps its original started_at
        let task = if task.status == TaskStatus::Pending {
            let started = task.start();
            self.tasks.update(&started).await?;
            started
        } else {
            task
        };

        logger.log_start(&format!("processing job {}", job.job_id));

        let result = self.dispatch(&task, job, cancel).await;

        match result {
            Ok(artifact_count) => {
                self.orchestrator.handle_task_completion(&task).await?;
                logger.log_completion(&format!("{artifact_count} artifacts"));
                metrics::counter!("vindex_tasks_completed_total").increment(1);
                Ok(TaskOutcome {
                    task_id: task.task_id.to_string(),
                    status: TaskStatus::Completed,
                    artifact_count,
                })
            }
            Err(e) if e.is_cancelled() => {
                self.orchestrator.handle_task_cancellation(&task).await?;
                logger.log_warning("cancelled");
                Err(e)
            }
            Err(e) => {
                self.orchestrator
                    .handle_task_failure(&task, &e.to_string())
                    .await?;
                logger.log_error(&e.to_string());
                metrics::counter!("vindex_tasks_failed_total").increment(1);
                Err(e)
            }
        }
    }

    async fn load_task(&self, job: &InferenceJob) -> WorkerResult<Task> {
        let tasks = self
            .tasks
            .find_by_video_and_type(&job.video_id, job.task_type)
            .await?;
        tasks
            .into_iter()
            .find(|t| t.task_id == job.task_id)
            .ok_or_else(|| WorkerError::TaskNotFound {
                video_id: job.video_id.to_string(),
                kind: job.task_type.to_string(),
            })
    }

    /// Run the kind-specific work and return the artifact count.
    async fn dispatch(
        &self,
        task: &Task,
        job: &InferenceJob,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<usize> {
        match task.task_type {
            TaskKind::Hash => {
                self.handle_hash(task).await?;
                Ok(0)
            }
            TaskKind::ThumbnailExtraction => {
                let video = self.videos.require(&task.video_id).await?;
                let stats = self.thumbnails.run(&video).await?;
                Ok(stats.generated + stats.skipped)
            }
            kind => {
                let artifact_kind =
                    kind.artifact_kind()
                        .ok_or_else(|| WorkerError::job_failed(format!(
                            "no pipeline for task kind {kind}"
                        )))?;

                // forward to the ML queue; a duplicate means it is already
                // in flight, which is exactly what we want
                match self.enqueuer.enqueue_ml(job).await {
                    Ok(_) => {}
                    Err(e) if e.is_duplicate() => {}
                    Err(e) => return Err(e.into()),
                }

                self.poll_for_artifacts(task, artifact_kind, cancel).await
            }
        }
    }

    /// Compute the content hash of the video file and store it.
    async fn handle_hash(&self, task: &Task) -> WorkerResult<()> {
        let video = self.videos.require(&task.video_id).await?;
        let hash = content_hash(&video.file_path).await?;
        self.videos.set_content_hash(&task.video_id, &hash).await?;
        Ok(())
    }

    /// Poll the artifact store until envelopes for `(asset, kind)` appear.
    /// Exponential backoff from `poll_initial` capped at `poll_max`, total
    /// deadline `poll_timeout`. Transient query errors are logged and the
    /// loop keeps polling.
    async fn poll_for_artifacts(
        &self,
        task: &Task,
        kind: vindex_models::ArtifactKind,
        mut cancel: watch::Receiver<bool>,
    ) -> WorkerResult<usize> {
        let started = Instant::now();
        let mut delay = self.config.poll_initial;

        loop {
            if *cancel.borrow() {
                return Err(WorkerError::Cancelled);
            }

            match self
                .artifacts
                .get_by_asset(&task.video_id, Some(kind), None, None, None)
                .await
            {
                Ok(envelopes) if !envelopes.is_empty() => return Ok(envelopes.len()),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        task_id = %task.task_id,
                        "Artifact poll query failed, retrying: {e}"
                    );
                }
            }

            if started.elapsed() >= self.config.poll_timeout {
                return Err(WorkerError::PollTimeout {
                    seconds: self.config.poll_timeout.as_secs(),
                });
            }

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_ok() && *cancel.borrow() {
                        return Err(WorkerError::Cancelled);
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }

            delay = (delay * 2).min(self.config.poll_max);
        }
    }
}

/// SHA-256 of a file's contents, streamed.
pub async fn content_hash(path: &str) -> WorkerResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
