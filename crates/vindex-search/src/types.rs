//! Navigation request and response types.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{SearchError, SearchResult};

/// Direction of a jump or find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpDirection {
    Next,
    Prev,
}

impl JumpDirection {
    pub fn parse(s: &str) -> SearchResult<Self> {
        match s {
            "next" => Ok(JumpDirection::Next),
            "prev" => Ok(JumpDirection::Prev),
            other => Err(SearchError::InvalidDirection(other.to_string())),
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, JumpDirection::Next)
    }
}

/// Text source for the find operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindSource {
    Transcript,
    Ocr,
    All,
}

impl FindSource {
    pub fn parse(s: &str) -> SearchResult<Self> {
        match s {
            "transcript" => Ok(FindSource::Transcript),
            "ocr" => Ok(FindSource::Ocr),
            "all" => Ok(FindSource::All),
            other => Err(SearchError::InvalidSource(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FindSource::Transcript => "transcript",
            FindSource::Ocr => "ocr",
            FindSource::All => "all",
        }
    }
}

pub(crate) fn default_limit() -> i64 {
    50
}

/// Within-video jump request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JumpRequest {
    pub asset_id: String,
    pub kind: String,
    pub direction: String,
    #[serde(default)]
    pub from_ms: i64,
    /// Object label filter (label index kinds)
    #[serde(default)]
    pub label: Option<String>,
    /// Face cluster filter (cluster index kinds)
    #[serde(default)]
    pub cluster_id: Option<String>,
    /// Minimum detection confidence
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_confidence: Option<f64>,
    /// Full-text query; mutually exclusive with `label`
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: i64,
}

impl JumpRequest {
    pub fn new(
        asset_id: impl Into<String>,
        kind: impl Into<String>,
        direction: impl Into<String>,
        from_ms: i64,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            kind: kind.into(),
            direction: direction.into(),
            from_ms,
            label: None,
            cluster_id: None,
            min_confidence: None,
            query: None,
            limit: default_limit(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_cluster(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }
}

/// Within-video find request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FindRequest {
    pub asset_id: String,
    pub query: String,
    #[serde(default)]
    pub from_ms: i64,
    /// `next` or `prev`
    #[serde(default = "default_direction")]
    pub direction: String,
    /// `transcript`, `ocr` or `all`
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: i64,
}

fn default_direction() -> String {
    "next".to_string()
}

fn default_source() -> String {
    "all".to_string()
}

impl FindRequest {
    pub fn new(asset_id: impl Into<String>, query: impl Into<String>, from_ms: i64) -> Self {
        Self {
            asset_id: asset_id.into(),
            query: query.into(),
            from_ms,
            direction: default_direction(),
            source: default_source(),
            limit: default_limit(),
        }
    }

    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = direction.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Map field-level validation failures to the error taxonomy.
pub(crate) fn check_ranges(
    result: Result<(), validator::ValidationErrors>,
    min_confidence: Option<f64>,
    limit: i64,
) -> SearchResult<()> {
    let Err(errors) = result else {
        return Ok(());
    };
    let fields = errors.field_errors();
    if fields.contains_key("min_confidence") {
        return Err(SearchError::InvalidConfidence(
            min_confidence.unwrap_or(f64::NAN),
        ));
    }
    if fields.contains_key("limit") {
        return Err(SearchError::InvalidLimit(limit));
    }
    Err(SearchError::internal("unexpected validation failure"))
}

/// One jump result: the envelope's identity plus the navigation target.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JumpHit {
    pub artifact_id: String,
    pub asset_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// One find result with its source tag and snippet.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FindHit {
    pub artifact_id: String,
    pub asset_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub source: FindSource,
    pub text: String,
    pub snippet: String,
}
