//! Backend worker executor.
//!
//! Long-lived consumption loop over the `jobs` stream: bounded concurrency
//! through a semaphore, periodic claim of idle pending messages (crashed
//! worker recovery), the reconciler on its own interval, and watch-channel
//! shutdown that doubles as the cooperative cancellation signal for
//! in-flight tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vindex_queue::{Broker, InferenceJob, JobState, QueueName};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::orchestrator::TaskOrchestrator;
use crate::reconciler::Reconciler;
use crate::task_handler::BackendTaskHandler;

/// Executor for the backend `jobs` queue.
pub struct WorkerExecutor {
    config: WorkerConfig,
    broker: Arc<Broker>,
    handler: Arc<BackendTaskHandler>,
    orchestrator: Arc<TaskOrchestrator>,
    reconciler: Arc<Reconciler>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl WorkerExecutor {
    pub fn new(
        config: WorkerConfig,
        broker: Arc<Broker>,
        handler: BackendTaskHandler,
        orchestrator: TaskOrchestrator,
        reconciler: Reconciler,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            broker,
            handler: Arc::new(handler),
            orchestrator: Arc::new(orchestrator),
            reconciler: Arc::new(reconciler),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor. Returns when shutdown is signalled.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_jobs = self.config.max_jobs,
            "Starting backend worker executor"
        );

        self.broker.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // claim idle pending messages from crashed workers
        let claim_task = {
            let broker = Arc::clone(&self.broker);
            let handler = Arc::clone(&self.handler);
            let semaphore = Arc::clone(&self.job_semaphore);
            let consumer_name = self.consumer_name.clone();
            let claim_interval = self.config.claim_interval;
            let claim_min_idle = self.config.claim_min_idle;
            let shutdown = self.shutdown.clone();
            let mut shutdown_rx = self.shutdown.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(claim_interval);
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
                                    QueueName::Jobs,
                                    &consumer_name,
                                    claim_min_idle.as_millis() as u64,
                                    5,
                                )
                                .await
                            {
                                Ok(jobs) if !jobs.is_empty() => {
                                    info!("Claimed {} pending jobs", jobs.len());
                                    for (message_id, job) in jobs {
                                        let Ok(permit) =
                                            Arc::clone(&semaphore).acquire_owned().await
                                        else {
                                            return;
                                        };
                                        let broker = Arc::clone(&broker);
                                        let handler = Arc::clone(&handler);
                                        let cancel = shutdown.subscribe();
                                        tokio::spawn(async move {
                                            let _permit = permit;
                                            Self::execute_job(
                                                broker, handler, message_id, job, cancel,
                                            )
                                            .await;
                                        });
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    warn!("Failed to claim pending jobs: {e}");
                                }
                            }
                        }
                    }
                }
            })
        };

        // the reconciler runs on its own interval inside this process
        let reconcile_task = {
            let reconciler = Arc::clone(&self.reconciler);
            let orchestrator = Arc::clone(&self.orchestrator);
            let interval_duration = self.config.reconcile_interval;
            let mut shutdown_rx = self.shutdown.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(interval_duration);
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = interval.tick() => {
                            if let Err(e) = orchestrator.process_discovered_videos().await {
                                error!("Discovery orchestration error: {e}");
                            }
                            let stats = reconciler.run().await;
                            for err in &stats.errors {
                                error!("Reconciler section error: {err}");
                            }
                        }
                    }
                }
            })
        };

        // main consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();
        reconcile_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Backend worker executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .broker
            .consume(
                QueueName::Jobs,
                &self.consumer_name,
                1000,
                available.min(5),
            )
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            let broker = Arc::clone(&self.broker);
            let handler = Arc::clone(&self.handler);
            let cancel = self.shutdown.subscribe();

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(broker, handler, message_id, job, cancel).await;
            });
        }

        Ok(())
    }

    /// Execute one job with retry and DLQ handling.
    async fn execute_job(
        broker: Arc<Broker>,
        handler: Arc<BackendTaskHandler>,
        message_id: String,
        job: InferenceJob,
        cancel: tokio::sync::watch::Receiver<bool>,
    ) {
        let job_id = job.job_id.clone();
        debug!(job_id = %job_id, "Executing job");

        match handler.process_ml_task(&job, cancel).await {
            Ok(outcome) => {
                info!(
                    job_id = %job_id,
                    artifacts = outcome.artifact_count,
                    "Job completed"
                );
                if let Err(e) = broker.ack(QueueName::Jobs, &message_id).await {
                    error!(job_id = %job_id, "Failed to ack job: {e}");
                }
                if let Err(e) = broker
                    .mark_job_state(QueueName::Jobs, &job_id, JobState::Complete)
                    .await
                {
                    warn!(job_id = %job_id, "Failed to record job state: {e}");
                }
            }
            Err(e) if e.is_cancelled() => {
                // task row is already marked cancelled; drop the message so
                // nobody re-runs a terminal task
                warn!(job_id = %job_id, "Job cancelled");
                broker.ack(QueueName::Jobs, &message_id).await.ok();
                broker
                    .mark_job_state(QueueName::Jobs, &job_id, JobState::Failed)
                    .await
                    .ok();
            }
            Err(e) => {
                error!(job_id = %job_id, "Job failed: {e}");

                let tries = broker.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                let max_tries = broker.max_tries();

                if tries >= max_tries {
                    warn!(
                        job_id = %job_id,
                        "Job exceeded max tries ({max_tries}), moving to DLQ"
                    );
                    if let Err(dlq_err) = broker
                        .dlq(QueueName::Jobs, &message_id, &job, &e.to_string())
                        .await
                    {
                        error!(job_id = %job_id, "Failed to move job to DLQ: {dlq_err}");
                    }
                } else {
                    info!(
                        job_id = %job_id,
                        "Job will be retried (attempt {tries}/{max_tries})"
                    );
                    // the message stays pending and is redelivered after the
                    // visibility timeout
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

    /// Signal shutdown; in-flight poll loops observe this as cancellation.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
