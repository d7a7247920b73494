//! Job broker using Redis Streams.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{InferenceJob, JobState};

/// TTL for job-state keys: long enough for the reconciler to observe
/// terminal outcomes, short enough that orphaned keys expire.
const JOB_STATE_TTL_SECS: u64 = 86_400;

/// TTL for per-message retry counters.
const RETRY_TTL_SECS: i64 = 86_400;

/// The two broker queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    /// Backend stage, consumed by backend workers
    Jobs,
    /// Inference stage, consumed by ML workers
    MlJobs,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Jobs => "jobs",
            QueueName::MlJobs => "ml_jobs",
        }
    }

    /// Handler name recorded on entries of this queue.
    fn handler(&self) -> &'static str {
        match self {
            QueueName::Jobs => "process_ml_task",
            QueueName::MlJobs => "process_inference_job",
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for the backend queue
    pub jobs_stream: String,
    /// Stream name for the ML queue
    pub ml_jobs_stream: String,
    /// Consumer group name (shared by both streams)
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream: String,
    /// Max tries before DLQ
    pub max_tries: u32,
    /// Job visibility timeout
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            jobs_stream: "jobs".to_string(),
            ml_jobs_stream: "ml_jobs".to_string(),
            consumer_group: "vindex:workers".to_string(),
            dlq_stream: "vindex:dlq".to_string(),
            max_tries: 3,
            visibility_timeout: Duration::from_secs(1800),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jobs_stream: std::env::var("QUEUE_JOBS_STREAM").unwrap_or_else(|_| "jobs".to_string()),
            ml_jobs_stream: std::env::var("QUEUE_ML_JOBS_STREAM")
                .unwrap_or_else(|_| "ml_jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vindex:workers".to_string()),
            dlq_stream: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "vindex:dlq".to_string()),
            max_tries: std::env::var("QUEUE_MAX_TRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
        }
    }
}

/// Broker client over the two streams.
pub struct Broker {
    client: redis::Client,
    config: QueueConfig,
}

impl Broker {
    /// Create a new broker client.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    fn stream_name(&self, queue: QueueName) -> &str {
        match queue {
            QueueName::Jobs => &self.config.jobs_stream,
            QueueName::MlJobs => &self.config.ml_jobs_stream,
        }
    }

    // the same deterministic job id exists on both streams, so state keys
    // are scoped per queue
    fn state_key(queue: QueueName, job_id: &str) -> String {
        format!("vindex:job:{}:{}", queue.as_str(), job_id)
    }

    /// Initialize both streams (create consumer groups if they don't exist).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for queue in [QueueName::Jobs, QueueName::MlJobs] {
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(self.stream_name(queue))
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!(
                    stream = queue.as_str(),
                    group = %self.config.consumer_group,
                    "Created consumer group"
                ),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(stream = queue.as_str(), "Consumer group already exists");
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Enqueue a job onto a queue.
    ///
    /// The job's deterministic ID is the idempotency key: a job that is
    /// already queued is rejected as a duplicate. Terminal state keys from
    /// a previous attempt are overwritten so the reconciler can re-enqueue.
    pub async fn enqueue(&self, queue: QueueName, job: &InferenceJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let state_key = Self::state_key(queue, &job.job_id);
        let existing: Option<String> = conn.get(&state_key).await?;
        if matches!(existing.as_deref().and_then(JobState::parse), Some(JobState::Queued)) {
            warn!(job_id = %job.job_id, "Duplicate job rejected");
            return Err(QueueError::DuplicateJob(job.job_id.clone()));
        }

        let payload = serde_json::to_string(job)?;
        let message_id: String = redis::cmd("XADD")
            .arg(self.stream_name(queue))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(job.idempotency_key())
            .arg("handler")
            .arg(queue.handler())
            .query_async(&mut conn)
            .await?;

        conn.set_ex::<_, _, ()>(&state_key, JobState::Queued.as_str(), JOB_STATE_TTL_SECS)
            .await?;

        info!(
            job_id = %job.job_id,
            stream = queue.as_str(),
            message_id = %message_id,
            "Enqueued job"
        );

        Ok(job.job_id.clone())
    }

    /// Whether a job is currently known on a queue (queued or recently
    /// terminal).
    pub async fn job_exists(&self, queue: QueueName, job_id: &str) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(Self::state_key(queue, job_id)).await?;
        Ok(exists)
    }

    /// Broker-side state of a job on a queue, if known.
    pub async fn job_state(&self, queue: QueueName, job_id: &str) -> QueueResult<Option<JobState>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(Self::state_key(queue, job_id)).await?;
        Ok(value.as_deref().and_then(JobState::parse))
    }

    /// Record a terminal outcome for a job. The state key keeps its TTL so
    /// the reconciler can observe the outcome for a while.
    pub async fn mark_job_state(
        &self,
        queue: QueueName,
        job_id: &str,
        state: JobState,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(
            Self::state_key(queue, job_id),
            state.as_str(),
            JOB_STATE_TTL_SECS,
        )
        .await?;
        debug!(job_id, state = state.as_str(), "Recorded job state");
        Ok(())
    }

    /// Acknowledge a message (mark as processed and drop it from the stream).
    pub async fn ack(&self, queue: QueueName, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(self.stream_name(queue))
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(self.stream_name(queue))
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(message_id, stream = queue.as_str(), "Acknowledged job");
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(
        &self,
        queue: QueueName,
        message_id: &str,
        job: &InferenceJob,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;
        redis::cmd("XADD")
            .arg(&self.config.dlq_stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(queue, message_id).await?;
        self.mark_job_state(queue, &job.job_id, JobState::Failed)
            .await?;

        warn!(job_id = %job.job_id, error, "Moved job to DLQ");
        Ok(())
    }

    /// Queue length.
    pub async fn len(&self, queue: QueueName) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.stream_name(queue)).await?;
        Ok(len)
    }

    /// Consume new jobs from a queue. Returns `(message_id, job)` pairs.
    pub async fn consume(
        &self,
        queue: QueueName,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, InferenceJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.stream_name(queue))
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<InferenceJob>(&payload_str) {
                        Ok(job) => {
                            debug!(job_id = %job.job_id, "Consumed job from stream");
                            jobs.push((message_id, job));
                        }
                        Err(e) => {
                            warn!("Failed to parse job payload: {}", e);
                            // ack the malformed message to prevent reprocessing
                            self.ack(queue, &message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Claim pending messages that have been idle for too long (crashed
    /// worker recovery).
    pub async fn claim_pending(
        &self,
        queue: QueueName,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, InferenceJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.stream_name(queue).to_string();

        let pending_count: usize = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await
            .map(|reply: redis::streams::StreamPendingReply| reply.count())
            .unwrap_or(0);

        if pending_count == 0 {
            return Ok(Vec::new());
        }

        let pending_details: Vec<Vec<redis::Value>> = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        // entries: [id, consumer, idle_time_ms, delivery_count]
        let mut message_ids_to_claim = Vec::new();
        for detail in pending_details {
            if let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Int(idle_ms))) =
                (detail.first(), detail.get(2))
            {
                if *idle_ms as u64 >= min_idle_ms {
                    if let Ok(id) = String::from_utf8(id_bytes.clone()) {
                        message_ids_to_claim.push(id);
                    }
                }
            }
        }

        if message_ids_to_claim.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for msg_id in &message_ids_to_claim {
            cmd.arg(msg_id);
        }

        let claimed_messages: Vec<Vec<redis::Value>> = cmd.query_async(&mut conn).await?;

        let mut jobs = Vec::new();
        for message in claimed_messages {
            let (Some(redis::Value::BulkString(id_bytes)), Some(redis::Value::Array(fields))) =
                (message.first(), message.get(1))
            else {
                continue;
            };
            let Ok(message_id) = String::from_utf8(id_bytes.clone()) else {
                continue;
            };

            // fields: [field1, value1, field2, value2, ...]
            let mut job_payload: Option<String> = None;
            let mut i = 0;
            while i + 1 < fields.len() {
                if let (
                    Some(redis::Value::BulkString(field_bytes)),
                    Some(redis::Value::BulkString(value_bytes)),
                ) = (fields.get(i), fields.get(i + 1))
                {
                    if let (Ok(field), Ok(value)) = (
                        String::from_utf8(field_bytes.clone()),
                        String::from_utf8(value_bytes.clone()),
                    ) {
                        if field == "job" {
                            job_payload = Some(value);
                            break;
                        }
                    }
                }
                i += 2;
            }

            if let Some(payload) = job_payload {
                match serde_json::from_str::<InferenceJob>(&payload) {
                    Ok(job) => {
                        info!(job_id = %job.job_id, "Claimed pending job from stream");
                        jobs.push((message_id, job));
                    }
                    Err(e) => {
                        warn!("Failed to parse claimed job payload: {}", e);
                        self.ack(queue, &message_id).await.ok();
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Get retry count for a message.
    pub async fn get_retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("vindex:retry:{message_id}");
        let count: Option<u32> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment retry count for a message.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("vindex:retry:{message_id}");
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, RETRY_TTL_SECS).await?;
        Ok(count)
    }

    /// Max tries from config.
    pub fn max_tries(&self) -> u32 {
        self.config.max_tries
    }

    /// Visibility timeout from config.
    pub fn visibility_timeout(&self) -> Duration {
        self.config.visibility_timeout
    }
}
