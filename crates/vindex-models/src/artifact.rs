//! Artifact envelope models.
//!
//! The envelope is the central immutable record: one ML-produced item with
//! its temporal span, opaque payload and full provenance. Envelopes are
//! never updated after creation; `delete` is the only state change.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::kind::ArtifactKind;
use crate::run::RunId;
use crate::video::VideoId;

/// Unique identifier for an artifact envelope.
///
/// Produced envelopes use the deterministic form
/// `{asset_id}_{task_kind}_{run_id}_{index}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Quality class of the producing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelProfile {
    Fast,
    #[default]
    Balanced,
    HighQuality,
}

impl ModelProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelProfile::Fast => "fast",
            ModelProfile::Balanced => "balanced",
            ModelProfile::HighQuality => "high_quality",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fast" => Some(ModelProfile::Fast),
            "balanced" => Some(ModelProfile::Balanced),
            "high_quality" => Some(ModelProfile::HighQuality),
            _ => None,
        }
    }

    /// Rank for `best_quality` ordering: higher is better.
    pub fn quality_rank(&self) -> i64 {
        match self {
            ModelProfile::Fast => 0,
            ModelProfile::Balanced => 1,
            ModelProfile::HighQuality => 2,
        }
    }
}

impl fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable, versioned, provenance-stamped record of one ML result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactEnvelope {
    /// Unique artifact ID
    pub artifact_id: ArtifactId,
    /// Owning asset
    pub asset_id: VideoId,
    /// Artifact kind
    pub artifact_type: ArtifactKind,
    /// Payload schema version
    pub schema_version: i64,
    /// Span start in milliseconds (inclusive)
    pub span_start_ms: i64,
    /// Span end in milliseconds
    pub span_end_ms: i64,
    /// Payload JSON, validated against the registered schema at write time
    pub payload: serde_json::Value,
    /// Producing service name
    pub producer: String,
    /// Producing service version
    pub producer_version: String,
    /// Quality profile of the producing model
    pub model_profile: ModelProfile,
    /// Hash of the inference configuration
    pub config_hash: String,
    /// Content hash of the input at inference time
    pub input_hash: String,
    /// Run that produced this envelope
    pub run_id: RunId,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Whether the schema version was recognized at read time. Always true
    /// for freshly constructed envelopes; the store flags stale versions on
    /// read so callers can skip them.
    #[serde(default = "default_true", skip_serializing)]
    pub schema_recognized: bool,
}

fn default_true() -> bool {
    true
}

impl ArtifactEnvelope {
    /// Construct an envelope, enforcing the span invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        artifact_id: ArtifactId,
        asset_id: VideoId,
        artifact_type: ArtifactKind,
        schema_version: i64,
        span_start_ms: i64,
        span_end_ms: i64,
        payload: serde_json::Value,
        producer: impl Into<String>,
        producer_version: impl Into<String>,
        model_profile: ModelProfile,
        config_hash: impl Into<String>,
        input_hash: impl Into<String>,
        run_id: RunId,
    ) -> Result<Self, ModelError> {
        if span_start_ms < 0 || span_end_ms < 0 || span_start_ms > span_end_ms {
            return Err(ModelError::InvalidSpan {
                start: span_start_ms,
                end: span_end_ms,
            });
        }
        Ok(Self {
            artifact_id,
            asset_id,
            artifact_type,
            schema_version,
            span_start_ms,
            span_end_ms,
            payload,
            producer: producer.into(),
            producer_version: producer_version.into(),
            model_profile,
            config_hash: config_hash.into(),
            input_hash: input_hash.into(),
            run_id,
            created_at: Utc::now(),
            schema_recognized: true,
        })
    }

    /// Whether the span overlaps `[start_ms, end_ms]`.
    pub fn overlaps(&self, start_ms: i64, end_ms: i64) -> bool {
        self.span_start_ms <= end_ms && self.span_end_ms >= start_ms
    }

    /// Whether the span is fully contained in `[start_ms, end_ms]`.
    pub fn contained_in(&self, start_ms: i64, end_ms: i64) -> bool {
        self.span_start_ms >= start_ms && self.span_end_ms <= end_ms
    }
}
