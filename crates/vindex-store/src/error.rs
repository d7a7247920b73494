//! Store error types.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown asset: {0}")]
    AssetUnknown(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Invalid GPS coordinates: lat={lat} lon={lon}")]
    InvalidGps { lat: f64, lon: f64 },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Model error: {0}")]
    Model(#[from] vindex_models::ModelError),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::Duplicate(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Whether the underlying database error was a unique-key violation.
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
    }

    /// Whether a payload failed schema validation.
    pub fn is_schema_invalid(&self) -> bool {
        matches!(
            self,
            StoreError::Model(
                vindex_models::ModelError::PayloadInvalid { .. }
                    | vindex_models::ModelError::UnknownSchema { .. }
            )
        )
    }
}
