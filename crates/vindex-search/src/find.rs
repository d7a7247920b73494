//! Find within video.
//!
//! Full-text search over the transcript and OCR projections, merged
//! across sources by `span_start_ms` (ascending for `next`, descending
//! for `prev`), each hit tagged with its source and a snippet.

use validator::Validate;

use vindex_models::VideoId;
use vindex_store::{FtsHit, ProjectionQueries, VideoRepository};

use crate::error::{SearchError, SearchResult};
use crate::types::{FindHit, FindRequest, FindSource, JumpDirection};

/// Characters of context on each side of the match in a snippet.
const SNIPPET_CONTEXT: usize = 40;

/// Find service over the FTS projections.
pub struct FindService {
    videos: VideoRepository,
    queries: ProjectionQueries,
}

impl FindService {
    pub fn new(videos: VideoRepository, queries: ProjectionQueries) -> Self {
        Self { videos, queries }
    }

    /// Find text occurrences in the requested direction.
    pub async fn find(&self, request: &FindRequest) -> SearchResult<Vec<FindHit>> {
        let direction = JumpDirection::parse(&request.direction)?;
        let source = FindSource::parse(&request.source)?;
        if request.validate().is_err() {
            return Err(SearchError::InvalidLimit(request.limit));
        }

        if request.query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let asset_id = VideoId::from(request.asset_id.as_str());
        if !self.videos.exists(&asset_id).await? {
            return Err(SearchError::VideoNotFound(request.asset_id.clone()));
        }

        let forward = direction.is_forward();
        let mut hits: Vec<FindHit> = Vec::new();

        if matches!(source, FindSource::Transcript | FindSource::All) {
            let rows = self
                .queries
                .search_transcript(
                    &asset_id,
                    &request.query,
                    request.from_ms,
                    forward,
                    request.limit,
                )
                .await?;
            hits.extend(rows.into_iter().map(|row| to_hit(row, FindSource::Transcript, &request.query)));
        }

        if matches!(source, FindSource::Ocr | FindSource::All) {
            let rows = self
                .queries
                .search_ocr(
                    &asset_id,
                    &request.query,
                    request.from_ms,
                    forward,
                    request.limit,
                )
                .await?;
            hits.extend(rows.into_iter().map(|row| to_hit(row, FindSource::Ocr, &request.query)));
        }

        // merge the sources on the timeline
        if forward {
            hits.sort_by(|a, b| (a.start_ms, &a.artifact_id).cmp(&(b.start_ms, &b.artifact_id)));
        } else {
            hits.sort_by(|a, b| (b.start_ms, &b.artifact_id).cmp(&(a.start_ms, &a.artifact_id)));
        }
        hits.truncate(request.limit as usize);

        Ok(hits)
    }
}

fn to_hit(row: FtsHit, source: FindSource, query: &str) -> FindHit {
    let snippet = make_snippet(&row.text, query);
    FindHit {
        artifact_id: row.artifact_id,
        asset_id: row.asset_id,
        start_ms: row.start_ms,
        end_ms: row.end_ms,
        source,
        text: row.text,
        snippet,
    }
}

/// Short excerpt around the first (case-insensitive) occurrence of the
/// query; the whole text when it is short or the match is not literal.
fn make_snippet(text: &str, query: &str) -> String {
    let lower_text = text.to_lowercase();
    let lower_query = query.to_lowercase();

    let Some(pos) = lower_text.find(&lower_query) else {
        return truncate_chars(text, 2 * SNIPPET_CONTEXT);
    };

    let start = text[..pos]
        .char_indices()
        .rev()
        .nth(SNIPPET_CONTEXT.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let end_base = pos + lower_query.len();
    let end = text[end_base..]
        .char_indices()
        .nth(SNIPPET_CONTEXT)
        .map(|(i, _)| end_base + i)
        .unwrap_or(text.len());

    let mut snippet = String::new();
    if start > 0 {
        snippet.push('…');
    }
    snippet.push_str(&text[start..end]);
    if end < text.len() {
        snippet.push('…');
    }
    snippet
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}…", &text[..i]),
        None => text.to_string(),
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
        service: FindService,
        artifacts: ArtifactStore,
        video: Video,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let videos = VideoRepository::new(db.clone());
        let artifacts = ArtifactStore::new(db.clone());
        let queries = ProjectionQueries::new(db);

        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();

        Fixture {
            service: FindService::new(videos, queries),
            artifacts,
            video,
        }
    }

    fn text_envelope(
        f: &Fixture,
        kind: ArtifactKind,
        id: &str,
        start: i64,
        end: i64,
        text: &str,
    ) -> ArtifactEnvelope {
        ArtifactEnvelope::new(
            ArtifactId::from(id),
            f.video.video_id.clone(),
            kind,
            1,
            start,
            end,
            serde_json::json!({"text": text}),
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
    async fn multi_source_merge_orders_by_timeline_with_tags() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[
                text_envelope(
                    &f,
                    ArtifactKind::TranscriptSegment,
                    "t1",
                    2000,
                    3000,
                    "password reset",
                ),
                text_envelope(&f, ArtifactKind::OcrText, "o1", 4000, 4033, "Reset button"),
            ])
            .await
            .unwrap();

        let request = FindRequest::new(f.video.video_id.as_str(), "reset", 0);
        let hits = f.service.find(&request).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].artifact_id, "t1");
        assert_eq!(hits[0].source, FindSource::Transcript);
        assert_eq!(hits[0].start_ms, 2000);
        assert_eq!(hits[1].artifact_id, "o1");
        assert_eq!(hits[1].source, FindSource::Ocr);
        assert_eq!(hits[1].start_ms, 4000);
    }

    #[tokio::test]
    async fn from_ms_bounds_the_search_window() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[
                text_envelope(&f, ArtifactKind::TranscriptSegment, "t1", 1000, 2000, "reset one"),
                text_envelope(&f, ArtifactKind::TranscriptSegment, "t2", 5000, 6000, "reset two"),
            ])
            .await
            .unwrap();

        let request = FindRequest::new(f.video.video_id.as_str(), "reset", 3000);
        let hits = f.service.find(&request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artifact_id, "t2");

        let request = FindRequest::new(f.video.video_id.as_str(), "reset", 3000)
            .with_direction("prev");
        let hits = f.service.find(&request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artifact_id, "t1");
    }

    #[tokio::test]
    async fn prev_direction_sorts_descending() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[
                text_envelope(&f, ArtifactKind::TranscriptSegment, "t1", 1000, 2000, "reset a"),
                text_envelope(&f, ArtifactKind::OcrText, "o1", 3000, 3033, "reset b"),
            ])
            .await
            .unwrap();

        let request = FindRequest::new(f.video.video_id.as_str(), "reset", 10_000)
            .with_direction("prev");
        let hits = f.service.find(&request).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].start_ms, 3000);
        assert_eq!(hits[1].start_ms, 1000);
    }

    #[tokio::test]
    async fn single_source_restricts_results() {
        let f = fixture().await;
        f.artifacts
            .batch_create(&[
                text_envelope(&f, ArtifactKind::TranscriptSegment, "t1", 0, 1000, "reset"),
                text_envelope(&f, ArtifactKind::OcrText, "o1", 2000, 2033, "reset"),
            ])
            .await
            .unwrap();

        let request =
            FindRequest::new(f.video.video_id.as_str(), "reset", 0).with_source("ocr");
        let hits = f.service.find(&request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, FindSource::Ocr);
    }

    #[tokio::test]
    async fn empty_query_returns_empty() {
        let f = fixture().await;
        let request = FindRequest::new(f.video.video_id.as_str(), "   ", 0);
        assert!(f.service.find(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_video_and_bad_enums_error() {
        let f = fixture().await;

        let request = FindRequest::new("ghost", "reset", 0);
        assert_eq!(
            f.service.find(&request).await.unwrap_err().error_code(),
            "VIDEO_NOT_FOUND"
        );

        let request =
            FindRequest::new(f.video.video_id.as_str(), "reset", 0).with_source("subtitles");
        assert_eq!(
            f.service.find(&request).await.unwrap_err().error_code(),
            "INVALID_SOURCE"
        );

        let request = FindRequest::new(f.video.video_id.as_str(), "reset", 0)
            .with_direction("sideways");
        assert_eq!(
            f.service.find(&request).await.unwrap_err().error_code(),
            "INVALID_DIRECTION"
        );
    }

    #[test]
    fn snippet_centers_on_the_match() {
        let text = "a very long sentence that eventually mentions the password reset flow and then keeps going for quite a while longer";
        let snippet = make_snippet(text, "password reset");
        assert!(snippet.contains("password reset"));
        assert!(snippet.len() < text.len());
        assert!(snippet.starts_with('…'));

        // short text comes back whole
        assert_eq!(make_snippet("Reset button", "reset"), "Reset button");
    }
}
