//! ML worker configuration.

use std::time::Duration;

/// ML worker configuration.
#[derive(Debug, Clone)]
pub struct MlWorkerConfig {
    /// Whether this worker has a GPU; GPU-only kinds are skipped otherwise
    pub gpu_available: bool,
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
    /// Base URL of the inference service
    pub inference_url: String,
}

impl Default for MlWorkerConfig {
    fn default() -> Self {
        Self {
            gpu_available: false,
            max_jobs: 2,
            job_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(60),
            claim_min_idle: Duration::from_secs(1800),
            inference_url: "http://localhost:8500".to_string(),
        }
    }
}

impl MlWorkerConfig {
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
            gpu_available: std::env::var("ML_WORKER_GPU")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            max_jobs: std::env::var("ML_WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            job_timeout: secs("ML_WORKER_JOB_TIMEOUT", 3600),
            shutdown_timeout: secs("ML_WORKER_SHUTDOWN_TIMEOUT", 30),
            claim_interval: secs("ML_WORKER_CLAIM_INTERVAL_SECS", 60),
            claim_min_idle: secs("ML_WORKER_CLAIM_MIN_IDLE_SECS", 1800),
            inference_url: std::env::var("ML_INFERENCE_URL")
                .unwrap_or_else(|_| "http://localhost:8500".to_string()),
        }
    }
}
