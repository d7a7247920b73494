//! Typed artifact payloads.
//!
//! Each registered `(kind, version)` pair has a concrete payload type; the
//! `ArtifactPayload` variant ties them together so a decoded payload always
//! carries its kind. Validation is a constructor: a payload either decodes
//! into one of these types or the envelope write is rejected.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::kind::ArtifactKind;

/// Normalized bounding box, coordinates in [0, 1] relative to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// `transcript.segment` v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegmentV1 {
    /// Transcribed text of the segment
    pub text: String,
    /// Detected or requested language code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Transcription confidence in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// `scene` v1. Scene boundaries live on the envelope span; the payload
/// carries the ordinal position within the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneV1 {
    /// Zero-based scene index within the video
    pub scene_index: i64,
    /// Boundary detection confidence in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// `object.detection` v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectDetectionV1 {
    /// Detected object label (e.g. "person")
    pub label: String,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    /// Location of the detection within the frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// `face.detection` v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FaceDetectionV1 {
    /// Identity cluster the face was assigned to
    pub cluster_id: String,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    /// Location of the face within the frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// `place.classification` v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlaceClassificationV1 {
    /// Scene/place category label (e.g. "beach")
    pub label: String,
    /// Classification confidence in [0, 1]
    pub confidence: f64,
}

/// `ocr.text` v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OcrTextV1 {
    /// Recognized text
    pub text: String,
    /// Language the recognizer ran with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Recognition confidence in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Region of the frame the text was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundingBox>,
}

/// `video.metadata` v1.
///
/// Standardized metadata extracted from the media file: GPS coordinates,
/// camera information, file properties, temporal data and image
/// information. All fields are optional since not every file carries every
/// metadata group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct MetadataV1 {
    // GPS coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    // Image properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub megapixels: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<i64>,

    // Audio/video properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_bitrate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    // File properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    // Camera properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    // Temporal properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<String>,
}

impl MetadataV1 {
    /// GPS coordinates when both latitude and longitude are present.
    pub fn gps(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// A decoded, schema-validated payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactPayload {
    TranscriptSegment(TranscriptSegmentV1),
    Scene(SceneV1),
    ObjectDetection(ObjectDetectionV1),
    FaceDetection(FaceDetectionV1),
    PlaceClassification(PlaceClassificationV1),
    OcrText(OcrTextV1),
    VideoMetadata(MetadataV1),
}

impl ArtifactPayload {
    /// The artifact kind this payload belongs to.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactPayload::TranscriptSegment(_) => ArtifactKind::TranscriptSegment,
            ArtifactPayload::Scene(_) => ArtifactKind::Scene,
            ArtifactPayload::ObjectDetection(_) => ArtifactKind::ObjectDetection,
            ArtifactPayload::FaceDetection(_) => ArtifactKind::FaceDetection,
            ArtifactPayload::PlaceClassification(_) => ArtifactKind::PlaceClassification,
            ArtifactPayload::OcrText(_) => ArtifactKind::OcrText,
            ArtifactPayload::VideoMetadata(_) => ArtifactKind::VideoMetadata,
        }
    }
}
