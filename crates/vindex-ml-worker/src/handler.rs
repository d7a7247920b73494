//! Inference job handler.
//!
//! `process_inference_job`: re-validate the input, invoke the inference
//! collaborator, transform the response into envelopes, batch-persist.
//! Writes run records for provenance; never touches the task table.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::info;

use chrono::Utc;
use vindex_models::{Run, RunId, RunStatus};
use vindex_queue::InferenceJob;
use vindex_store::{ArtifactStore, RunRepository};

use crate::error::{MlWorkerError, MlWorkerResult};
use crate::inference::{InferenceEngine, InferenceRequest};
use crate::transform::transform_to_envelopes;

/// Result of one inference job.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InferenceOutcome {
    pub task_id: String,
    pub status: &'static str,
    pub artifact_count: usize,
}

/// Handles jobs from the `ml_jobs` queue.
pub struct InferenceJobHandler {
    artifacts: ArtifactStore,
    runs: RunRepository,
    engine: Arc<dyn InferenceEngine>,
}

impl InferenceJobHandler {
    pub fn new(
        artifacts: ArtifactStore,
        runs: RunRepository,
        engine: Arc<dyn InferenceEngine>,
    ) -> Self {
        Self {
            artifacts,
            runs,
            engine,
        }
    }

    /// Process one inference job.
    pub async fn process_inference_job(
        &self,
        job: &InferenceJob,
    ) -> MlWorkerResult<InferenceOutcome> {
        self.validate_input(job).await?;

        let request = InferenceRequest {
            task_id: job.task_id.to_string(),
            task_type: job.task_type,
            video_id: job.video_id.to_string(),
            video_path: job.video_path.clone(),
            config: job.config.clone(),
        };

        let response = self.engine.run(&request).await?;

        let envelopes =
            transform_to_envelopes(&response, &job.task_id, &job.video_id, job.task_type)?;

        // record the run before its envelopes become visible
        let run = Run {
            run_id: RunId::from(
                response
                    .run_id
                    .as_deref()
                    .ok_or(MlWorkerError::MissingProvenance("run_id"))?,
            ),
            asset_id: job.video_id.clone(),
            pipeline_profile: response
                .model_profile
                .ok_or(MlWorkerError::MissingProvenance("model_profile"))?,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            error_message: None,
        };

        match self.runs.get(&run.run_id).await? {
            // a redelivered job whose run already persisted is a no-op
            Some(existing) if existing.status == RunStatus::Completed => {
                info!(
                    task_id = %job.task_id,
                    run_id = %run.run_id,
                    "Run already persisted, skipping"
                );
                return Ok(InferenceOutcome {
                    task_id: job.task_id.to_string(),
                    status: "completed",
                    artifact_count: envelopes.len(),
                });
            }
            // retry of a failed attempt: the run row is already there and
            // the aborted batch left no envelopes behind
            Some(_) => {}
            None => self.runs.create(&run).await?,
        }

        match self.artifacts.batch_create(&envelopes).await {
            Ok(()) => {
                self.runs
                    .finish(&run.run_id, RunStatus::Completed, None)
                    .await?;
            }
            Err(e) => {
                self.runs
                    .finish(&run.run_id, RunStatus::Failed, Some(&e.to_string()))
                    .await
                    .ok();
                return Err(e.into());
            }
        }

        info!(
            task_id = %job.task_id,
            kind = %job.task_type,
            artifacts = envelopes.len(),
            "Inference job persisted"
        );
        metrics::counter!("vindex_inference_jobs_total").increment(1);

        Ok(InferenceOutcome {
            task_id: job.task_id.to_string(),
            status: "completed",
            artifact_count: envelopes.len(),
        })
    }

    /// Fail fast when the input file is gone or its content drifted from
    /// the hash the task graph pinned.
    async fn validate_input(&self, job: &InferenceJob) -> MlWorkerResult<()> {
        if !tokio::fs::try_exists(&job.video_path).await? {
            return Err(MlWorkerError::InputMissing(job.video_path.clone()));
        }

        let expected = job
            .config
            .as_ref()
            .and_then(|c| c.get("input_hash"))
            .and_then(|v| v.as_str())
            .ok_or(MlWorkerError::MissingProvenance("input_hash"))?;

        let actual = file_hash(&job.video_path).await?;
        if actual != expected {
            return Err(MlWorkerError::InputHashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

/// SHA-256 of a file's contents, streamed.
async fn file_hash(path: &str) -> MlWorkerResult<String> {
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
