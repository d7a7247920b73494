//! Reconciler.
//!
//! Periodically re-aligns database task state with broker queue contents:
//! pending tasks whose job vanished are re-enqueued, running tasks are
//! synced against broker-side job state, and long-running tasks are
//! surfaced at alert level. The three sections are isolated so an error in
//! one does not abort the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use vindex_models::{TaskStatus, VideoId};
use vindex_queue::{InferenceJob, JobState};
use vindex_store::{TaskRepository, VideoRepository};

use crate::broker::{BrokerView, TaskEnqueuer};
use crate::error::WorkerResult;
use crate::orchestrator::job_for_task;

/// Aggregated stats for one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileStats {
    pub pending_checked: usize,
    pub pending_reenqueued: usize,
    pub running_checked: usize,
    pub running_synced: usize,
    pub long_running_alerted: usize,
    pub errors: Vec<String>,
}

/// Re-aligns task state with the broker.
pub struct Reconciler {
    tasks: TaskRepository,
    videos: VideoRepository,
    broker: Arc<dyn BrokerView>,
    enqueuer: Arc<dyn TaskEnqueuer>,
    long_running_threshold: Duration,
}

impl Reconciler {
    pub fn new(
        tasks: TaskRepository,
        videos: VideoRepository,
        broker: Arc<dyn BrokerView>,
        enqueuer: Arc<dyn TaskEnqueuer>,
        long_running_threshold: Duration,
    ) -> Self {
        Self {
            tasks,
            videos,
            broker,
            enqueuer,
            long_running_threshold,
        }
    }

    /// Run one reconcile pass.
    pub async fn run(&self) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        match self.sync_pending_tasks().await {
            Ok((checked, reenqueued)) => {
                stats.pending_checked = checked;
                stats.pending_reenqueued = reenqueued;
            }
            Err(e) => stats.errors.push(format!("pending sync: {e}")),
        }

        match self.sync_running_tasks().await {
            Ok((checked, synced)) => {
                stats.running_checked = checked;
                stats.running_synced = synced;
            }
            Err(e) => stats.errors.push(format!("running sync: {e}")),
        }

        match self.alert_long_running_tasks().await {
            Ok(alerted) => stats.long_running_alerted = alerted,
            Err(e) => stats.errors.push(format!("long-running alert: {e}")),
        }

        metrics::counter!("vindex_reconciler_passes_total").increment(1);
        if stats.pending_reenqueued > 0 || stats.running_synced > 0 || !stats.errors.is_empty() {
            info!(
                pending_checked = stats.pending_checked,
                pending_reenqueued = stats.pending_reenqueued,
                running_checked = stats.running_checked,
                running_synced = stats.running_synced,
                long_running_alerted = stats.long_running_alerted,
                errors = stats.errors.len(),
                "Reconcile pass finished"
            );
        }
        stats
    }

    /// Re-enqueue pending tasks whose job is missing from the broker.
    /// Introspection errors default to "exists" to avoid double-enqueue.
    async fn sync_pending_tasks(&self) -> WorkerResult<(usize, usize)> {
        let pending = self.tasks.find_by_status(TaskStatus::Pending).await?;
        let mut checked = 0;
        let mut reenqueued = 0;

        for task in pending {
            checked += 1;
            let job_id = InferenceJob::job_id_for(&task.task_id);

            let exists = match self.broker.job_exists(&job_id).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(task_id = %task.task_id, "Job existence check failed: {e}");
                    true
                }
            };
            if exists {
                continue;
            }

            match self.reenqueue(&task.video_id, &task).await {
                Ok(()) => {
                    reenqueued += 1;
                    info!(task_id = %task.task_id, "Re-enqueued pending task");
                }
                Err(e) => {
                    warn!(task_id = %task.task_id, "Re-enqueue failed: {e}");
                }
            }
        }

        Ok((checked, reenqueued))
    }

    /// Sync running tasks against broker-side job state: missing jobs reset
    /// the task to pending, terminal job states close the task out.
    async fn sync_running_tasks(&self) -> WorkerResult<(usize, usize)> {
        let running = self.tasks.find_by_status(TaskStatus::Running).await?;
        let mut checked = 0;
        let mut synced = 0;

        for task in running {
            checked += 1;
            let job_id = InferenceJob::job_id_for(&task.task_id);

            let exists = match self.broker.job_exists(&job_id).await {
                Ok(exists) => exists,
                Err(e) => {
                    warn!(task_id = %task.task_id, "Job existence check failed: {e}");
                    continue;
                }
            };

            if !exists {
                // job fell off the broker without completing
                let reset = task.clone().reset_for_retry();
                self.tasks.update(&reset).await?;
                if let Err(e) = self.reenqueue(&task.video_id, &reset).await {
                    warn!(task_id = %task.task_id, "Re-enqueue after reset failed: {e}");
                }
                synced += 1;
                info!(task_id = %task.task_id, "Running task reset to pending");
                continue;
            }

            match self.broker.job_state(&job_id).await {
                Ok(Some(JobState::Complete)) => {
                    self.tasks.update(&task.clone().complete()).await?;
                    synced += 1;
                    info!(task_id = %task.task_id, "Running task synced to completed");
                }
                Ok(Some(JobState::Failed)) => {
                    self.tasks
                        .update(&task.clone().fail("job failed in broker"))
                        .await?;
                    synced += 1;
                    info!(task_id = %task.task_id, "Running task synced to failed");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(task_id = %task.task_id, "Job state check failed: {e}");
                }
            }
        }

        Ok((checked, synced))
    }

    /// Log running tasks older than the threshold at alert level. No state
    /// transition.
    async fn alert_long_running_tasks(&self) -> WorkerResult<usize> {
        let running = self.tasks.find_by_status(TaskStatus::Running).await?;
        let mut alerted = 0;

        for task in running {
            let Some(started_at) = task.started_at else {
                continue;
            };
            let age = Utc::now().signed_duration_since(started_at);
            if age.num_seconds() >= self.long_running_threshold.as_secs() as i64 {
                alerted += 1;
                error!(
                    task_id = %task.task_id,
                    kind = %task.task_type,
                    running_for_secs = age.num_seconds(),
                    "Task running far longer than expected"
                );
            }
        }

        Ok(alerted)
    }

    async fn reenqueue(&self, video_id: &VideoId, task: &vindex_models::Task) -> WorkerResult<()> {
        let video = self.videos.require(video_id).await?;
        let job = job_for_task(task, &video);
        match self.enqueuer.enqueue(&job).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
