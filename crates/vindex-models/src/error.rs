//! Domain model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Schema already registered: {kind} v{version}")]
    SchemaAlreadyRegistered { kind: String, version: i64 },

    #[error("Invalid schema version: {0} (must be >= 1)")]
    InvalidSchemaVersion(i64),

    #[error("Unknown schema: {kind} v{version}")]
    UnknownSchema { kind: String, version: i64 },

    #[error("Invalid payload for {kind} v{version}: {detail}")]
    PayloadInvalid {
        kind: String,
        version: i64,
        detail: String,
    },

    #[error("Invalid span: start={start} end={end}")]
    InvalidSpan { start: i64, end: i64 },

    #[error("Unknown artifact kind: {0}")]
    UnknownKind(String),

    #[error("Unknown task kind: {0}")]
    UnknownTaskKind(String),

    #[error("Invalid selection policy: {0}")]
    PolicyInvalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn payload_invalid(
        kind: impl Into<String>,
        version: i64,
        detail: impl Into<String>,
    ) -> Self {
        Self::PayloadInvalid {
            kind: kind.into(),
            version,
            detail: detail.into(),
        }
    }

    pub fn policy_invalid(msg: impl Into<String>) -> Self {
        Self::PolicyInvalid(msg.into())
    }
}
