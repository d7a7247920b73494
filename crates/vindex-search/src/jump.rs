//! Within-video jump.
//!
//! Finds the nearest envelope in a direction under the active selection
//! policy and the optional label / cluster / confidence filters. `next`
//! selects the minimum `span_start_ms >= from_ms`; `prev` the maximum
//! `span_start_ms < from_ms`.

use tracing::debug;
use validator::Validate;

use vindex_models::{ArtifactEnvelope, ArtifactKind, VideoId};
use vindex_store::{ArtifactStore, SelectionPolicyManager, VideoRepository};

use crate::error::{SearchError, SearchResult};
use crate::types::{check_ranges, JumpDirection, JumpHit, JumpRequest};

/// Jump service over the artifact store.
pub struct JumpService {
    videos: VideoRepository,
    artifacts: ArtifactStore,
    policies: SelectionPolicyManager,
}

impl JumpService {
    pub fn new(
        videos: VideoRepository,
        artifacts: ArtifactStore,
        policies: SelectionPolicyManager,
    ) -> Self {
        Self {
            videos,
            artifacts,
            policies,
        }
    }

    /// Find the nearest matching envelope in the requested direction.
    /// Returns `None` when nothing matches.
    pub async fn jump(&self, request: &JumpRequest) -> SearchResult<Option<JumpHit>> {
        let kind = ArtifactKind::from_name(&request.kind)
            .map_err(|_| SearchError::InvalidKind(request.kind.clone()))?;
        let direction = JumpDirection::parse(&request.direction)?;
        check_ranges(request.validate(), request.min_confidence, request.limit)?;

        if request.label.is_some() && request.query.is_some() {
            return Err(SearchError::ConflictingFilters);
        }

        let asset_id = VideoId::from(request.asset_id.as_str());
        if !self.videos.exists(&asset_id).await? {
            return Err(SearchError::VideoNotFound(request.asset_id.clone()));
        }

        let policy = self.policies.effective_policy(&asset_id, kind).await?;
        let filter = policy.compile().map_err(SearchError::internal)?;

        let envelopes = self
            .artifacts
            .get_by_asset(&asset_id, Some(kind), None, None, Some(&filter))
            .await?;

        debug!(
            asset_id = %asset_id,
            kind = %kind,
            candidates = envelopes.len(),
            "Jump candidates loaded"
        );

        let matching = envelopes
            .iter()
            .filter(|e| e.schema_recognized)
            .filter(|e| matches_filters(e, request));

        let hit = match direction {
            JumpDirection::Next => matching
                .filter(|e| e.span_start_ms >= request.from_ms)
                .min_by_key(|e| (e.span_start_ms, e.artifact_id.as_str().to_string())),
            // prev never returns the envelope containing from_ms: only
            // spans already fully passed qualify
            JumpDirection::Prev => matching
                .filter(|e| {
                    e.span_start_ms < request.from_ms && e.span_end_ms <= request.from_ms
                })
                .max_by_key(|e| (e.span_start_ms, e.artifact_id.as_str().to_string())),
        };

        Ok(hit.map(to_hit))
    }
}

fn matches_filters(envelope: &ArtifactEnvelope, request: &JumpRequest) -> bool {
    let payload = &envelope.payload;

    if let Some(label) = &request.label {
        if payload.get("label").and_then(|v| v.as_str()) != Some(label.as_str()) {
            return false;
        }
    }

    if let Some(cluster_id) = &request.cluster_id {
        if payload.get("cluster_id").and_then(|v| v.as_str()) != Some(cluster_id.as_str()) {
            return false;
        }
    }

    if let Some(min_confidence) = request.min_confidence {
        match payload.get("confidence").and_then(|v| v.as_f64()) {
            Some(confidence) if confidence >= min_confidence => {}
            _ => return false,
        }
    }

    true
}

fn to_hit(envelope: &ArtifactEnvelope) -> JumpHit {
    let payload = &envelope.payload;
    JumpHit {
        artifact_id: envelope.artifact_id.to_string(),
        asset_id: envelope.asset_id.to_string(),
        start_ms: envelope.span_start_ms,
        end_ms: envelope.span_end_ms,
        label: payload
            .get("label")
            .and_then(|v| v.as_str())
            .map(String::from),
        cluster_id: payload
            .get("cluster_id")
            .and_then(|v| v.as_str())
            .map(String::from),
        confidence: payload.get("confidence").and_then(|v| v.as_f64()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vindex_models::{
        ArtifactId, ModelProfile, RunId, SelectionMode, SelectionPolicy, Video,
    };
    use vindex_store::Database;

    struct Fixture {
        service: JumpService,
        artifacts: ArtifactStore,
        policies: SelectionPolicyManager,
        video: Video,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let videos = VideoRepository::new(db.clone());
        let artifacts = ArtifactStore::new(db.clone());
        let policies = SelectionPolicyManager::new(db);

        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();

        Fixture {
            service: JumpService::new(videos, artifacts.clone(), policies.clone()),
            artifacts,
            policies,
            video,
        }
    }

    fn transcript(f: &Fixture, id: &str, run: &str, start: i64, end: i64) -> ArtifactEnvelope {
        ArtifactEnvelope::new(
            ArtifactId::from(id),
            f.video.video_id.clone(),
            ArtifactKind::TranscriptSegment,
            1,
            start,
            end,
            serde_json::json!({"text": "hello"}),
            "ml-service",
            "1.0.0",
            ModelProfile::Balanced,
            "cfg",
            "input",
            RunId::from(run),
        )
        .unwrap()
    }

    fn object(
        f: &Fixture,
        id: &str,
        start: i64,
        end: i64,
        label: &str,
        confidence: f64,
    ) -> ArtifactEnvelope {
        ArtifactEnvelope::new(
            ArtifactId::from(id),
            f.video.video_id.clone(),
            ArtifactKind::ObjectDetection,
            1,
            start,
            end,
            serde_json::json!({"label": label, "confidence": confidence}),
            "ml-service",
            "1.0.0",
            ModelProfile::Balanced,
            "cfg",
            "input",
            RunId::from("r1"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn next_returns_earliest_match_at_or_after_from() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[
                transcript(&f, "t1", "r1", 0, 1000),
                transcript(&f, "t2", "r1", 1000, 2000),
                transcript(&f, "t3", "r1", 3000, 4000),
            ])
            .await
            .unwrap();

        let req = JumpRequest::new(
            f.video.video_id.as_str(),
            "transcript.segment",
            "next",
            1000,
        );
        let hit = f.service.jump(&req).await.unwrap().unwrap();
        assert_eq!(hit.artifact_id, "t2");
        assert_eq!(hit.start_ms, 1000);
    }

    #[tokio::test]
    async fn prev_boundary_excludes_containing_envelope() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[
                transcript(&f, "t1", "r1", 0, 1000),
                transcript(&f, "t2", "r1", 1000, 2000),
            ])
            .await
            .unwrap();

        // from inside [1000, 2000): prev is the [0, 1000) envelope, never
        // the containing one
        let req = JumpRequest::new(
            f.video.video_id.as_str(),
            "transcript.segment",
            "prev",
            1500,
        );
        let hit = f.service.jump(&req).await.unwrap().unwrap();
        assert_eq!(hit.artifact_id, "t1");
        assert_eq!(hit.start_ms, 0);

        let req = JumpRequest::new(
            f.video.video_id.as_str(),
            "transcript.segment",
            "prev",
            1000,
        );
        let hit = f.service.jump(&req).await.unwrap().unwrap();
        assert_eq!(hit.artifact_id, "t1");
        assert_eq!(hit.start_ms, 0);
    }

    #[tokio::test]
    async fn prev_returns_latest_fully_passed_envelope() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[
                transcript(&f, "t1", "r1", 0, 1000),
                transcript(&f, "t2", "r1", 500, 1500),
                transcript(&f, "t3", "r1", 1000, 2000),
            ])
            .await
            .unwrap();

        let req = JumpRequest::new(
            f.video.video_id.as_str(),
            "transcript.segment",
            "prev",
            2500,
        );
        let hit = f.service.jump(&req).await.unwrap().unwrap();
        assert_eq!(hit.artifact_id, "t3");
        assert_eq!(hit.start_ms, 1000);
    }

    #[tokio::test]
    async fn jump_monotonicity_holds_at_the_edges() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[transcript(&f, "t1", "r1", 500, 900)])
            .await
            .unwrap();

        // next beyond the last envelope: nothing
        let req = JumpRequest::new(f.video.video_id.as_str(), "transcript.segment", "next", 901);
        assert!(f.service.jump(&req).await.unwrap().is_none());

        // prev before the first envelope: nothing
        let req = JumpRequest::new(f.video.video_id.as_str(), "transcript.segment", "prev", 500);
        assert!(f.service.jump(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn label_and_confidence_filters_apply() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[
                object(&f, "o1", 0, 100, "person", 0.5),
                object(&f, "o2", 200, 300, "car", 0.95),
                object(&f, "o3", 400, 500, "person", 0.9),
            ])
            .await
            .unwrap();

        let req = JumpRequest::new(f.video.video_id.as_str(), "object.detection", "next", 0)
            .with_label("person")
            .with_min_confidence(0.8);
        let hit = f.service.jump(&req).await.unwrap().unwrap();
        assert_eq!(hit.artifact_id, "o3");
        assert_eq!(hit.label.as_deref(), Some("person"));
        assert_eq!(hit.confidence, Some(0.9));
    }

    #[tokio::test]
    async fn selection_policy_scopes_the_candidates() {
        let f = fixture().await;

        let mut old = transcript(&f, "t-old", "run-1", 0, 1000);
        old.created_at = chrono::Utc::now() - chrono::Duration::seconds(60);
        f.artifacts.create(&old).await.unwrap();
        f.artifacts
            .create(&transcript(&f, "t-new", "run-2", 0, 1000))
            .await
            .unwrap();

        // implicit policy is latest: only run-2 is visible
        let req = JumpRequest::new(f.video.video_id.as_str(), "transcript.segment", "next", 0);
        let hit = f.service.jump(&req).await.unwrap().unwrap();
        assert_eq!(hit.artifact_id, "t-new");

        // pin run-1 and the old envelope comes back
        let policy = SelectionPolicy::new(
            f.video.video_id.clone(),
            ArtifactKind::TranscriptSegment,
            SelectionMode::Pinned,
        )
        .with_pinned_run(RunId::from("run-1"));
        f.policies.set_policy(&policy).await.unwrap();

        let hit = f.service.jump(&req).await.unwrap().unwrap();
        assert_eq!(hit.artifact_id, "t-old");
    }

    #[tokio::test]
    async fn validation_errors_surface_with_codes() {
        let f = fixture().await;

        let req = JumpRequest::new(f.video.video_id.as_str(), "pose.estimation", "next", 0);
        assert_eq!(
            f.service.jump(&req).await.unwrap_err().error_code(),
            "INVALID_KIND"
        );

        let req = JumpRequest::new(f.video.video_id.as_str(), "scene", "sideways", 0);
        assert_eq!(
            f.service.jump(&req).await.unwrap_err().error_code(),
            "INVALID_DIRECTION"
        );

        let mut req = JumpRequest::new(f.video.video_id.as_str(), "object.detection", "next", 0)
            .with_label("person");
        req.query = Some("person".to_string());
        assert_eq!(
            f.service.jump(&req).await.unwrap_err().error_code(),
            "CONFLICTING_FILTERS"
        );

        let req = JumpRequest::new("ghost", "scene", "next", 0);
        assert_eq!(
            f.service.jump(&req).await.unwrap_err().error_code(),
            "VIDEO_NOT_FOUND"
        );
    }

    #[tokio::test]
    async fn empty_store_returns_none() {
        let f = fixture().await;
        let req = JumpRequest::new(f.video.video_id.as_str(), "scene", "next", 0);
        assert!(f.service.jump(&req).await.unwrap().is_none());
    }
}
