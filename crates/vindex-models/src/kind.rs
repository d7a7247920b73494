//! Artifact kinds.
//!
//! The canonical name of a kind is the dotted form (`object.detection`).
//! Older snake_case spellings from the task boundary are accepted on parse
//! and translated to the canonical kind.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Closed set of artifact kinds the platform produces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum ArtifactKind {
    #[serde(rename = "transcript.segment")]
    TranscriptSegment,
    #[serde(rename = "scene")]
    Scene,
    #[serde(rename = "object.detection")]
    ObjectDetection,
    #[serde(rename = "face.detection")]
    FaceDetection,
    #[serde(rename = "place.classification")]
    PlaceClassification,
    #[serde(rename = "ocr.text")]
    OcrText,
    #[serde(rename = "video.metadata")]
    VideoMetadata,
}

impl ArtifactKind {
    /// All kinds, in registration order.
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::TranscriptSegment,
        ArtifactKind::Scene,
        ArtifactKind::ObjectDetection,
        ArtifactKind::FaceDetection,
        ArtifactKind::PlaceClassification,
        ArtifactKind::OcrText,
        ArtifactKind::VideoMetadata,
    ];

    /// Canonical (dotted) name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::TranscriptSegment => "transcript.segment",
            ArtifactKind::Scene => "scene",
            ArtifactKind::ObjectDetection => "object.detection",
            ArtifactKind::FaceDetection => "face.detection",
            ArtifactKind::PlaceClassification => "place.classification",
            ArtifactKind::OcrText => "ocr.text",
            ArtifactKind::VideoMetadata => "video.metadata",
        }
    }

    /// Parse a kind name, accepting canonical and legacy spellings.
    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        match name {
            "transcript.segment" | "transcript_segment" => Ok(ArtifactKind::TranscriptSegment),
            "scene" => Ok(ArtifactKind::Scene),
            "object.detection" | "object_detection" => Ok(ArtifactKind::ObjectDetection),
            "face.detection" | "face_detection" => Ok(ArtifactKind::FaceDetection),
            "place.classification" | "place_classification" => {
                Ok(ArtifactKind::PlaceClassification)
            }
            "ocr.text" | "ocr_text" | "ocr_detection" => Ok(ArtifactKind::OcrText),
            "video.metadata" | "video_metadata" => Ok(ArtifactKind::VideoMetadata),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }

    /// Whether this kind has a projection (read model) attached to it.
    pub fn has_projection(&self) -> bool {
        !matches!(self, ArtifactKind::PlaceClassification)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}
