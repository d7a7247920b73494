//! Global jump.
//!
//! The same jump interface across all videos, walking the projection
//! tables directly in `(file_created_at NULLS LAST, video_id, start_ms)`
//! order so results read like a chronological browse of the library.

use serde::Deserialize;
use validator::Validate;

use vindex_models::VideoId;
use vindex_store::{GlobalPosition, ProjectionQueries, VideoRepository};

use crate::error::{SearchError, SearchResult};
use crate::types::{default_limit, JumpDirection, JumpHit};

/// Cross-video jump request. The current position is `(asset_id,
/// from_ms)`; the filter picks the projection to walk.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GlobalJumpRequest {
    pub asset_id: String,
    pub kind: String,
    pub direction: String,
    #[serde(default)]
    pub from_ms: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: i64,
}

impl GlobalJumpRequest {
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
}

/// Global jump over the label and cluster projections.
pub struct GlobalJumpService {
    videos: VideoRepository,
    queries: ProjectionQueries,
}

impl GlobalJumpService {
    pub fn new(videos: VideoRepository, queries: ProjectionQueries) -> Self {
        Self { videos, queries }
    }

    /// Walk the global timeline from the current position. Returns up to
    /// `limit` hits in browse order.
    pub async fn jump(&self, request: &GlobalJumpRequest) -> SearchResult<Vec<JumpHit>> {
        let direction = JumpDirection::parse(&request.direction)?;
        if request.validate().is_err() {
            return Err(SearchError::InvalidLimit(request.limit));
        }

        let asset_id = VideoId::from(request.asset_id.as_str());
        let video = self
            .videos
            .get(&asset_id)
            .await?
            .ok_or_else(|| SearchError::VideoNotFound(request.asset_id.clone()))?;

        let position = GlobalPosition {
            file_created_at: video.file_created_at,
            asset_id: request.asset_id.clone(),
            start_ms: request.from_ms,
        };
        let forward = direction.is_forward();

        let hits = match (request.kind.as_str(), &request.label, &request.cluster_id) {
            ("object.detection", Some(label), None) => {
                self.queries
                    .global_label_hits(label, &position, forward, request.limit)
                    .await?
            }
            ("face.detection", None, Some(cluster_id)) => {
                self.queries
                    .global_cluster_hits(cluster_id, &position, forward, request.limit)
                    .await?
            }
            ("object.detection", _, _) | ("face.detection", _, _) => {
                return Err(SearchError::ConflictingFilters);
            }
            (kind, _, _) => return Err(SearchError::InvalidKind(kind.to_string())),
        };

        Ok(hits
            .into_iter()
            .map(|hit| JumpHit {
                artifact_id: hit.artifact_id,
                asset_id: hit.asset_id,
                start_ms: hit.start_ms,
                end_ms: hit.end_ms,
                label: request.label.clone(),
                cluster_id: request.cluster_id.clone(),
                confidence: Some(hit.confidence),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vindex_models::{
        ArtifactEnvelope, ArtifactId, ArtifactKind, ModelProfile, RunId, Video,
    };
    use vindex_store::{ArtifactStore, Database};

    struct Fixture {
        service: GlobalJumpService,
        artifacts: ArtifactStore,
        videos: VideoRepository,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        let videos = VideoRepository::new(db.clone());
        let artifacts = ArtifactStore::new(db.clone());
        let queries = ProjectionQueries::new(db);
        Fixture {
            service: GlobalJumpService::new(videos.clone(), queries),
            artifacts,
            videos,
        }
    }

    async fn video(f: &Fixture, id: &str, created: Option<&str>) -> Video {
        let mut video = Video::discovered(format!("/videos/{id}.mp4"));
        video.video_id = VideoId::from(id);
        video.file_created_at = created.map(|s| s.parse().unwrap());
        f.videos.create(&video).await.unwrap();
        video
    }

    fn object(asset: &VideoId, id: &str, start: i64, label: &str) -> ArtifactEnvelope {
        ArtifactEnvelope::new(
            ArtifactId::from(id),
            asset.clone(),
            ArtifactKind::ObjectDetection,
            1,
            start,
            start + 33,
            serde_json::json!({"label": label, "confidence": 0.9}),
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
    async fn walks_across_videos_in_chronological_order() {
        let f = fixture().await;
        let v1 = video(&f, "v1", Some("2024-01-01T00:00:00Z")).await;
        let v2 = video(&f, "v2", Some("2024-06-01T00:00:00Z")).await;
        let v3 = video(&f, "v3", None).await;

        f.artifacts
            .batch_create(&[
                object(&v1.video_id, "a1", 100, "person"),
                object(&v1.video_id, "a2", 900, "person"),
                object(&v2.video_id, "b1", 50, "person"),
                object(&v3.video_id, "c1", 0, "person"),
            ])
            .await
            .unwrap();

        // from the first hit of v1, next walks through v1 then v2 then the
        // undated v3
        let request = GlobalJumpRequest::new("v1", "object.detection", "next", 100)
            .with_label("person");
        let hits = f.service.jump(&request).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.artifact_id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "b1", "c1"]);

        // prev from v2 walks back into v1
        let request = GlobalJumpRequest::new("v2", "object.detection", "prev", 50)
            .with_label("person");
        let hits = f.service.jump(&request).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.artifact_id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);
    }

    #[tokio::test]
    async fn filter_mismatches_are_rejected() {
        let f = fixture().await;
        video(&f, "v1", None).await;

        // label on a face kind
        let request = GlobalJumpRequest::new("v1", "face.detection", "next", 0)
            .with_label("person");
        assert_eq!(
            f.service.jump(&request).await.unwrap_err().error_code(),
            "CONFLICTING_FILTERS"
        );

        // kind without a global projection
        let request = GlobalJumpRequest::new("v1", "scene", "next", 0);
        assert_eq!(
            f.service.jump(&request).await.unwrap_err().error_code(),
            "INVALID_KIND"
        );

        let request = GlobalJumpRequest::new("ghost", "object.detection", "next", 0)
            .with_label("person");
        assert_eq!(
            f.service.jump(&request).await.unwrap_err().error_code(),
            "VIDEO_NOT_FOUND"
        );
    }
}
