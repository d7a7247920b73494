//! Envelope transformation.
//!
//! Turns a batch inference response into artifact envelopes: one envelope
//! per item, provenance copied verbatim, deterministic artifact IDs.
//! Items with negative or inverted spans are skipped with a warning; the
//! batch itself only fails on missing provenance.

use tracing::{info, warn};

use vindex_models::{
    ArtifactEnvelope, ArtifactId, ModelProfile, RunId, SchemaRegistry, TaskId, TaskKind, VideoId,
};

use crate::error::{MlWorkerError, MlWorkerResult};
use crate::inference::InferenceResponse;

/// Transform an inference response into envelopes ready for batch
/// insertion.
pub fn transform_to_envelopes(
    response: &InferenceResponse,
    task_id: &TaskId,
    video_id: &VideoId,
    task_type: TaskKind,
) -> MlWorkerResult<Vec<ArtifactEnvelope>> {
    let artifact_kind = task_type
        .artifact_kind()
        .ok_or_else(|| MlWorkerError::UnsupportedKind(task_type.to_string()))?;

    // provenance is copied verbatim; any missing field is a hard error
    let run_id = response
        .run_id
        .as_deref()
        .ok_or(MlWorkerError::MissingProvenance("run_id"))?;
    let config_hash = response
        .config_hash
        .as_deref()
        .ok_or(MlWorkerError::MissingProvenance("config_hash"))?;
    let input_hash = response
        .input_hash
        .as_deref()
        .ok_or(MlWorkerError::MissingProvenance("input_hash"))?;
    let producer = response
        .producer
        .as_deref()
        .ok_or(MlWorkerError::MissingProvenance("producer"))?;
    let producer_version = response
        .producer_version
        .as_deref()
        .ok_or(MlWorkerError::MissingProvenance("producer_version"))?;
    let model_profile: ModelProfile = response
        .model_profile
        .ok_or(MlWorkerError::MissingProvenance("model_profile"))?;

    let schema_version = SchemaRegistry::global()
        .current_version(artifact_kind)
        .ok_or_else(|| MlWorkerError::UnsupportedKind(task_type.to_string()))?;

    let mut envelopes = Vec::with_capacity(response.detections.len());

    for (idx, item) in response.detections.iter().enumerate() {
        let span_start_ms = item.get("start_ms").and_then(|v| v.as_i64()).unwrap_or(0);
        let span_end_ms = item.get("end_ms").and_then(|v| v.as_i64()).unwrap_or(0);

        if span_start_ms < 0 || span_end_ms < 0 || span_start_ms > span_end_ms {
            warn!(
                task_id = %task_id,
                index = idx,
                start_ms = span_start_ms,
                end_ms = span_end_ms,
                "Skipping item with invalid time span"
            );
            continue;
        }

        let artifact_id = format!("{video_id}_{task_type}_{run_id}_{idx}");

        let envelope = ArtifactEnvelope::new(
            ArtifactId::from(artifact_id),
            video_id.clone(),
            artifact_kind,
            schema_version,
            span_start_ms,
            span_end_ms,
            item.clone(),
            producer,
            producer_version,
            model_profile,
            config_hash,
            input_hash,
            RunId::from(run_id),
        )?;

        envelopes.push(envelope);
    }

    info!(
        task_id = %task_id,
        kind = %task_type,
        items = response.detections.len(),
        envelopes = envelopes.len(),
        "Transformed inference response"
    );
    Ok(envelopes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_response(detections: Vec<serde_json::Value>) -> InferenceResponse {
        InferenceResponse {
            run_id: Some("R1".to_string()),
            config_hash: Some("cfg".to_string()),
            input_hash: Some("in".to_string()),
            producer: Some("ml-service".to_string()),
            producer_version: Some("1.0.0".to_string()),
            model_profile: Some(ModelProfile::Balanced),
            detections,
        }
    }

    #[test]
    fn one_envelope_per_item_with_deterministic_ids() {
        let response = full_response(vec![
            serde_json::json!({"label": "person", "confidence": 0.95, "start_ms": 0, "end_ms": 33}),
            serde_json::json!({"label": "car", "confidence": 0.87, "start_ms": 33, "end_ms": 66}),
        ]);

        let envelopes = transform_to_envelopes(
            &response,
            &TaskId::from("t1"),
            &VideoId::from("V1"),
            TaskKind::ObjectDetection,
        )
        .unwrap();

        assert_eq!(envelopes.len(), 2);
        assert_eq!(
            envelopes[0].artifact_id.as_str(),
            "V1_object_detection_R1_0"
        );
        assert_eq!(
            envelopes[1].artifact_id.as_str(),
            "V1_object_detection_R1_1"
        );
        assert_eq!(envelopes[0].span_start_ms, 0);
        assert_eq!(envelopes[0].span_end_ms, 33);
        assert_eq!(envelopes[1].span_start_ms, 33);
        assert_eq!(envelopes[0].run_id.as_str(), "R1");
        assert_eq!(envelopes[0].producer, "ml-service");
        assert_eq!(envelopes[0].schema_version, 1);
    }

    #[test]
    fn invalid_spans_are_skipped_not_fatal() {
        let response = full_response(vec![
            serde_json::json!({"label": "a", "confidence": 0.9, "start_ms": -5, "end_ms": 10}),
            serde_json::json!({"label": "b", "confidence": 0.9, "start_ms": 50, "end_ms": 10}),
            serde_json::json!({"label": "c", "confidence": 0.9, "start_ms": 10, "end_ms": 20}),
        ]);

        let envelopes = transform_to_envelopes(
            &response,
            &TaskId::from("t1"),
            &VideoId::from("V1"),
            TaskKind::ObjectDetection,
        )
        .unwrap();

        assert_eq!(envelopes.len(), 1);
        // index in the artifact id is the item's position, not the output's
        assert_eq!(
            envelopes[0].artifact_id.as_str(),
            "V1_object_detection_R1_2"
        );
    }

    #[test]
    fn missing_provenance_is_a_hard_error() {
        let mut response = full_response(vec![serde_json::json!({
            "label": "a", "confidence": 0.9, "start_ms": 0, "end_ms": 10
        })]);
        response.producer = None;

        let err = transform_to_envelopes(
            &response,
            &TaskId::from("t1"),
            &VideoId::from("V1"),
            TaskKind::ObjectDetection,
        );
        assert!(matches!(
            err,
            Err(MlWorkerError::MissingProvenance("producer"))
        ));
    }

    #[test]
    fn empty_detections_produce_no_envelopes() {
        let response = full_response(vec![]);
        let envelopes = transform_to_envelopes(
            &response,
            &TaskId::from("t1"),
            &VideoId::from("V1"),
            TaskKind::Transcription,
        )
        .unwrap();
        assert!(envelopes.is_empty());
    }

    #[test]
    fn point_in_time_items_keep_equal_span() {
        let response = full_response(vec![serde_json::json!({
            "text": "Reset button", "start_ms": 4000, "end_ms": 4000
        })]);
        let envelopes = transform_to_envelopes(
            &response,
            &TaskId::from("t1"),
            &VideoId::from("V1"),
            TaskKind::Ocr,
        )
        .unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].span_start_ms, 4000);
        assert_eq!(envelopes[0].span_end_ms, 4000);
    }

    #[test]
    fn non_pipeline_kind_rejected() {
        let response = full_response(vec![]);
        let err = transform_to_envelopes(
            &response,
            &TaskId::from("t1"),
            &VideoId::from("V1"),
            TaskKind::Hash,
        );
        assert!(matches!(err, Err(MlWorkerError::UnsupportedKind(_))));
    }
}
