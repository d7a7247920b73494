//! Inference service boundary.
//!
//! The concrete models are external; this module defines the request and
//! response shapes and the [`InferenceEngine`] seam, plus the HTTP client
//! implementation talking to the inference service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vindex_models::{ModelProfile, TaskKind};

use crate::error::{MlWorkerError, MlWorkerResult};

/// Request to run one kind of inference over a video file.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub task_id: String,
    pub task_type: TaskKind,
    pub video_id: String,
    pub video_path: String,
    /// Per-job configuration (language, model parameters)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Batch response from the inference service.
///
/// Provenance fields are optional at the wire level; the envelope
/// transformation treats any missing field as a hard error.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct InferenceResponse {
    pub run_id: Option<String>,
    pub config_hash: Option<String>,
    pub input_hash: Option<String>,
    pub producer: Option<String>,
    pub producer_version: Option<String>,
    pub model_profile: Option<ModelProfile>,
    /// Kind-specific items (detections, segments, classifications, scenes)
    #[serde(default)]
    pub detections: Vec<serde_json::Value>,
}

/// Runs kind-specific inference. External collaborator seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn run(&self, request: &InferenceRequest) -> MlWorkerResult<InferenceResponse>;
}

/// HTTP client for the inference service.
pub struct HttpInferenceEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInferenceEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl InferenceEngine for HttpInferenceEngine {
    async fn run(&self, request: &InferenceRequest) -> MlWorkerResult<InferenceResponse> {
        let url = format!("{}/v1/infer/{}", self.base_url, request.task_type);
        debug!(task_id = %request.task_id, url = %url, "Calling inference service");

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MlWorkerError::inference(format!(
                "inference service returned {status}: {body}"
            )));
        }

        Ok(response.json::<InferenceResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_decodes_with_minimal_fields() {
        let json = serde_json::json!({
            "run_id": "r1",
            "detections": []
        });
        let response: InferenceResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.run_id.as_deref(), Some("r1"));
        assert!(response.detections.is_empty());
        assert!(response.producer.is_none());
    }

    #[test]
    fn response_decodes_full_provenance() {
        let json = serde_json::json!({
            "run_id": "r1",
            "config_hash": "cfg",
            "input_hash": "in",
            "producer": "ml-service",
            "producer_version": "1.0.0",
            "model_profile": "high_quality",
            "detections": [{"label": "person", "confidence": 0.9, "start_ms": 0, "end_ms": 33}]
        });
        let response: InferenceResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.model_profile, Some(ModelProfile::HighQuality));
        assert_eq!(response.detections.len(), 1);
    }
}
