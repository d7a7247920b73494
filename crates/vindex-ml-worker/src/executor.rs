//! ML worker executor.
//!
//! Consumption loop over the `ml_jobs` stream. Jobs whose resource class
//! this worker cannot satisfy (GPU kinds on a CPU-only worker) are left
//! unacknowledged so a capable worker claims them after the idle window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vindex_queue::{Broker, InferenceJob, JobProducer, JobState, QueueName};

use crate::config::MlWorkerConfig;
use crate::error::{MlWorkerError, MlWorkerResult};
use crate::handler::InferenceJobHandler;

/// Executor for the `ml_jobs` queue.
pub struct MlExecutor {
    config: MlWorkerConfig,
    broker: Arc<Broker>,
    handler: Arc<InferenceJobHandler>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl MlExecutor {
    pub fn new(config: MlWorkerConfig, broker: Arc<Broker>, handler: InferenceJobHandler) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("ml-worker-{}", Uuid::new_v4());

        Self {
            config,
            broker,
            handler: Arc::new(handler),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor. Returns when shutdown is signalled.
    pub async fn run(&self) -> MlWorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            gpu = self.config.gpu_available,
            max_jobs = self.config.max_jobs,
            "Starting ML worker executor"
        );

        self.broker.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        let claim_task = {
            let broker = Arc::clone(&self.broker);
            let handler = Arc::clone(&self.handler);
            let semaphore = Arc::clone(&self.job_semaphore);
            let consumer_name = self.consumer_name.clone();
            let config = self.config.clone();
            let mut shutdown_rx = self.shutdown.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.claim_interval);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = interval.tick() => {
                            match broker
                                .claim_pending(
                                    QueueName::MlJobs,
                                    &consumer_name,
                                    config.claim_min_idle.as_millis() as u64,
                                    5,
                                )
                                .await
                            {
                                Ok(jobs) if !jobs.is_empty() => {
                                    info!("Claimed {} pending inference jobs", jobs.len());
                                    for (message_id, job) in jobs {
                                        if !JobProducer::can_worker_handle(
                                            job.task_type,
                                            config.gpu_available,
                                        ) {
                                            debug!(
                                                job_id = %job.job_id,
                                                "Kind needs a GPU, leaving for a capable worker"
                                            );
                                            continue;
                                        }
                                        let Ok(permit) =
                                            Arc::clone(&semaphore).acquire_owned().await
                                        else {
                                            return;
                                        };
                                        let broker = Arc::clone(&broker);
                                        let handler = Arc::clone(&handler);
                                        tokio::spawn(async move {
                                            let _permit = permit;
                                            Self::execute_job(broker, handler, message_id, job)
                                                .await;
                                        });
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    warn!("Failed to claim pending inference jobs: {e}");
                                }
                            }
                        }
                    }
                }
            })
        };

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping ML executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming inference jobs: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight inference jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("ML worker executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> MlWorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .broker
            .consume(
                QueueName::MlJobs,
                &self.consumer_name,
                1000,
                available.min(5),
            )
            .await?;

        for (message_id, job) in jobs {
            if !JobProducer::can_worker_handle(job.task_type, self.config.gpu_available) {
                debug!(
                    job_id = %job.job_id,
                    kind = %job.task_type,
                    "Kind needs a GPU, leaving for a capable worker"
                );
                continue;
            }

            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| MlWorkerError::inference("Semaphore closed"))?;

            let broker = Arc::clone(&self.broker);
            let handler = Arc::clone(&self.handler);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(broker, handler, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute one inference job with retry and DLQ handling.
    async fn execute_job(
        broker: Arc<Broker>,
        handler: Arc<InferenceJobHandler>,
        message_id: String,
        job: InferenceJob,
    ) {
        let job_id = job.job_id.clone();

        match handler.process_inference_job(&job).await {
            Ok(outcome) => {
                info!(
                    job_id = %job_id,
                    artifacts = outcome.artifact_count,
                    "Inference job completed"
                );
                if let Err(e) = broker.ack(QueueName::MlJobs, &message_id).await {
                    error!(job_id = %job_id, "Failed to ack inference job: {e}");
                }
                if let Err(e) = broker
                    .mark_job_state(QueueName::MlJobs, &job_id, JobState::Complete)
                    .await
                {
                    warn!(job_id = %job_id, "Failed to record job state: {e}");
                }
            }
            Err(e) if e.is_fatal() => {
                error!(job_id = %job_id, "Inference job failed fatally: {e}");
                if let Err(dlq_err) = broker
                    .dlq(QueueName::MlJobs, &message_id, &job, &e.to_string())
                    .await
                {
                    error!(job_id = %job_id, "Failed to move job to DLQ: {dlq_err}");
                }
            }
            Err(e) => {
                error!(job_id = %job_id, "Inference job failed: {e}");

                let tries = broker.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                let max_tries = broker.max_tries();

                if tries >= max_tries {
                    warn!(
                        job_id = %job_id,
                        "Inference job exceeded max tries ({max_tries}), moving to DLQ"
                    );
                    if let Err(dlq_err) = broker
                        .dlq(QueueName::MlJobs, &message_id, &job, &e.to_string())
                        .await
                    {
                        error!(job_id = %job_id, "Failed to move job to DLQ: {dlq_err}");
                    }
                } else {
                    info!(
                        job_id = %job_id,
                        "Inference job will be retried (attempt {tries}/{max_tries})"
                    );
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
