//! Video (asset) models.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an ingested video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Video lifecycle status.
///
/// Transitions are driven by task completion: discovery creates the video
/// as `discovered`; hash completion moves it to `hashed`; ML activity moves
/// it to `processing`; the terminal states are `completed` and `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Discovered on disk, not yet hashed
    #[default]
    Discovered,
    /// Content hash computed, ML tasks unlocked
    Hashed,
    /// ML tasks in flight
    Processing,
    /// All tasks finished without failure
    Completed,
    /// Hash failed or processing aborted
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Discovered => "discovered",
            VideoStatus::Hashed => "hashed",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(VideoStatus::Discovered),
            "hashed" => Some(VideoStatus::Hashed),
            "processing" => Some(VideoStatus::Processing),
            "completed" => Some(VideoStatus::Completed),
            "failed" => Some(VideoStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Failed)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ingested video file and its analysis lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    /// Unique video ID
    pub video_id: VideoId,

    /// Absolute path of the media file
    pub file_path: String,

    /// Content hash (set by the hash task)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Filesystem creation time, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_created_at: Option<DateTime<Utc>>,

    /// Duration in seconds, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    /// Lifecycle status
    #[serde(default)]
    pub status: VideoStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Video {
    /// Create a newly-discovered video record.
    pub fn discovered(file_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            video_id: VideoId::new(),
            file_path: file_path.into(),
            content_hash: None,
            file_created_at: None,
            duration_seconds: None,
            status: VideoStatus::Discovered,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    /// Set the filesystem creation time.
    pub fn with_file_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.file_created_at = Some(at);
        self
    }

    /// Whether the content hash is available.
    pub fn has_hash(&self) -> bool {
        self.content_hash.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_id_generation() {
        let id1 = VideoId::new();
        let id2 = VideoId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn discovered_video_defaults() {
        let video = Video::discovered("/videos/a.mp4");
        assert_eq!(video.status, VideoStatus::Discovered);
        assert!(video.content_hash.is_none());
        assert!(!video.has_hash());
    }

    #[test]
    fn status_round_trip() {
        for status in [
            VideoStatus::Discovered,
            VideoStatus::Hashed,
            VideoStatus::Processing,
            VideoStatus::Completed,
            VideoStatus::Failed,
        ] {
            assert_eq!(VideoStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(VideoStatus::parse("bogus"), None);
    }
}
