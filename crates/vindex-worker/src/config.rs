//! Worker configuration.

use std::time::Duration;

/// Backend worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_jobs: usize,
    /// Per-job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker scans for orphaned pending messages
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be claimed
    pub claim_min_idle: Duration,
    /// Artifact polling: initial delay
    pub poll_initial: Duration,
    /// Artifact polling: delay cap
    pub poll_max: Duration,
    /// Artifact polling: total deadline
    pub poll_timeout: Duration,
    /// Reconciler interval
    pub reconcile_interval: Duration,
    /// Running tasks older than this are logged at alert level
    pub long_running_threshold: Duration,
    /// Language assigned to newly created OCR tasks
    pub ocr_language: String,
    /// Root directory for extracted thumbnails
    pub thumbnail_root: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_jobs: 4,
            job_timeout: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(60),
            claim_min_idle: Duration::from_secs(1800),
            poll_initial: Duration::from_secs(1),
            poll_max: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(1800),
            reconcile_interval: Duration::from_secs(60),
            long_running_threshold: Duration::from_secs(3600),
            ocr_language: "en".to_string(),
            thumbnail_root: "/var/lib/vindex/thumbnails".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let secs = |name: &str, default: u64| {
            Duration::from_secs(
                std::env::var(name)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };

        Self {
            max_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            job_timeout: secs("WORKER_JOB_TIMEOUT", 1800),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT", 30),
            claim_interval: secs("WORKER_CLAIM_INTERVAL_SECS", 60),
            claim_min_idle: secs("WORKER_CLAIM_MIN_IDLE_SECS", 1800),
            poll_initial: secs("WORKER_POLL_INITIAL_SECS", 1),
            poll_max: secs("WORKER_POLL_MAX_SECS", 30),
            poll_timeout: secs("WORKER_POLL_TIMEOUT_SECS", 1800),
            reconcile_interval: secs("WORKER_RECONCILE_INTERVAL_SECS", 60),
            long_running_threshold: secs("WORKER_LONG_RUNNING_THRESHOLD_SECS", 3600),
            ocr_language: std::env::var("WORKER_OCR_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            thumbnail_root: std::env::var("WORKER_THUMBNAIL_ROOT")
                .unwrap_or_else(|_| "/var/lib/vindex/thumbnails".to_string()),
        }
    }
}
