//! Search error taxonomy.
//!
//! Validation and not-found errors surface 1:1 to the caller with a
//! stable error code. Internal failures collapse to `INTERNAL_ERROR` with
//! a correlation id; the detail stays in the logs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

pub type SearchResult<T> = Result<T, SearchError>;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Unknown artifact kind: {0}")]
    InvalidKind(String),

    #[error("Unknown direction: {0}")]
    InvalidDirection(String),

    #[error("Unknown source: {0}")]
    InvalidSource(String),

    #[error("label and query filters are mutually exclusive")]
    ConflictingFilters,

    #[error("min_confidence must be within [0, 1], got {0}")]
    InvalidConfidence(f64),

    #[error("limit must be within [1, 500], got {0}")]
    InvalidLimit(i64),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Internal error (correlation id {correlation_id})")]
    Internal { correlation_id: String },
}

impl SearchError {
    /// Stable error code for the caller.
    pub fn error_code(&self) -> &'static str {
        match self {
            SearchError::InvalidKind(_) => "INVALID_KIND",
            SearchError::InvalidDirection(_) => "INVALID_DIRECTION",
            SearchError::InvalidSource(_) => "INVALID_SOURCE",
            SearchError::ConflictingFilters => "CONFLICTING_FILTERS",
            SearchError::InvalidConfidence(_) => "INVALID_CONFIDENCE",
            SearchError::InvalidLimit(_) => "INVALID_LIMIT",
            SearchError::VideoNotFound(_) => "VIDEO_NOT_FOUND",
            SearchError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Wrap an internal failure, logging the detail and keeping only a
    /// correlation id on the surface.
    pub fn internal(source: impl std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        error!(correlation_id = %correlation_id, "Internal search error: {source}");
        SearchError::Internal { correlation_id }
    }

    /// The error shape surfaced to callers.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            detail: self.to_string(),
            error_code: self.error_code().to_string(),
            timestamp: Utc::now(),
        }
    }
}

impl From<vindex_store::StoreError> for SearchError {
    fn from(e: vindex_store::StoreError) -> Self {
        SearchError::internal(e)
    }
}

/// Surfaced error payload: `{detail, error_code, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub error_code: String,
    pub timestamp: DateTime<Utc>,
}
