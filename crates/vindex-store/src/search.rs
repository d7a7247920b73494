//! Read-side projection queries.
//!
//! Query helpers over the projection tables: full-text search for the find
//! service, keyset pagination in global timeline order for global jump,
//! and location lookups over the geo projection.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vindex_models::VideoId;

use crate::db::Database;
use crate::error::StoreResult;

/// One full-text hit from a text projection.
#[derive(Debug, Clone, PartialEq)]
pub struct FtsHit {
    pub artifact_id: String,
    pub asset_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
}

/// One hit from a label/cluster projection in global timeline order.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalHit {
    pub artifact_id: String,
    pub asset_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub confidence: f64,
    pub file_created_at: Option<DateTime<Utc>>,
}

/// Position in the global `(file_created_at NULLS LAST, asset_id,
/// start_ms)` ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalPosition {
    pub file_created_at: Option<DateTime<Utc>>,
    pub asset_id: String,
    pub start_ms: i64,
}

/// Row of the geo projection.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoLocation {
    pub video_id: String,
    pub artifact_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
}

fn fts_hit_from_row(row: &SqliteRow) -> StoreResult<FtsHit> {
    Ok(FtsHit {
        artifact_id: row.try_get("artifact_id")?,
        asset_id: row.try_get("asset_id")?,
        start_ms: row.try_get("start_ms")?,
        end_ms: row.try_get("end_ms")?,
        text: row.try_get("text")?,
    })
}

fn global_hit_from_row(row: &SqliteRow) -> StoreResult<GlobalHit> {
    Ok(GlobalHit {
        artifact_id: row.try_get("artifact_id")?,
        asset_id: row.try_get("asset_id")?,
        start_ms: row.try_get("start_ms")?,
        end_ms: row.try_get("end_ms")?,
        confidence: row.try_get("confidence")?,
        file_created_at: row.try_get::<Option<DateTime<Utc>>, _>("file_created_at")?,
    })
}

fn location_from_row(row: &SqliteRow) -> StoreResult<VideoLocation> {
    Ok(VideoLocation {
        video_id: row.try_get("video_id")?,
        artifact_id: row.try_get("artifact_id")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        altitude: row.try_get("altitude")?,
        country: row.try_get("country")?,
        state: row.try_get("state")?,
        city: row.try_get("city")?,
    })
}

/// Quote user input for an FTS5 MATCH expression (phrase query).
fn fts_quote(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

/// Read-side queries over the projection tables.
#[derive(Debug, Clone)]
pub struct ProjectionQueries {
    db: Database,
}

impl ProjectionQueries {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Full-text search within one video, forward (`start_ms >= from_ms`,
    /// ascending) or backward (`start_ms < from_ms`, descending).
    pub async fn search_text(
        &self,
        fts_table: &str,
        asset_id: &VideoId,
        query: &str,
        from_ms: i64,
        forward: bool,
        limit: i64,
    ) -> StoreResult<Vec<FtsHit>> {
        let (cmp, order) = if forward { (">=", "ASC") } else { ("<", "DESC") };
        let sql = format!(
            "SELECT artifact_id, asset_id, start_ms, end_ms, text \
             FROM {fts_table} \
             WHERE text MATCH ? AND asset_id = ? AND start_ms {cmp} ? \
             ORDER BY start_ms {order} LIMIT ?"
        );

        let rows = sqlx::query(&sql)
            .bind(fts_quote(query))
            .bind(asset_id.as_str())
            .bind(from_ms)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(fts_hit_from_row).collect()
    }

    /// Transcript FTS search.
    pub async fn search_transcript(
        &self,
        asset_id: &VideoId,
        query: &str,
        from_ms: i64,
        forward: bool,
        limit: i64,
    ) -> StoreResult<Vec<FtsHit>> {
        self.search_text("transcript_fts", asset_id, query, from_ms, forward, limit)
            .await
    }

    /// OCR FTS search.
    pub async fn search_ocr(
        &self,
        asset_id: &VideoId,
        query: &str,
        from_ms: i64,
        forward: bool,
        limit: i64,
    ) -> StoreResult<Vec<FtsHit>> {
        self.search_text("ocr_fts", asset_id, query, from_ms, forward, limit)
            .await
    }

    /// Hits for a label (or cluster) across all videos in global timeline
    /// order `(file_created_at NULLS LAST, asset_id, start_ms)`, after or
    /// before the given position.
    async fn global_hits(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        position: &GlobalPosition,
        forward: bool,
        limit: i64,
    ) -> StoreResult<Vec<GlobalHit>> {
        // keyset comparison over (is-null flag, created_at, asset, start)
        let (cmp, order) = if forward {
            (">", "ASC")
        } else {
            ("<", "DESC")
        };
        let sql = format!(
            "SELECT p.artifact_id, p.asset_id, p.start_ms, p.end_ms, p.confidence, \
                    v.file_created_at \
             FROM {table} p JOIN videos v ON v.video_id = p.asset_id \
             WHERE p.{key_column} = ? \
               AND (v.file_created_at IS NULL, COALESCE(v.file_created_at, ''), \
                    p.asset_id, p.start_ms) \
                   {cmp} (?, COALESCE(?, ''), ?, ?) \
             ORDER BY v.file_created_at IS NULL {order}, v.file_created_at {order}, \
                      p.asset_id {order}, p.start_ms {order} \
             LIMIT ?"
        );

        let rows = sqlx::query(&sql)
            .bind(key)
            .bind(i64::from(position.file_created_at.is_none()))
            .bind(position.file_created_at)
            .bind(&position.asset_id)
            .bind(position.start_ms)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(global_hit_from_row).collect()
    }

    /// Global object-label hits.
    pub async fn global_label_hits(
        &self,
        label: &str,
        position: &GlobalPosition,
        forward: bool,
        limit: i64,
    ) -> StoreResult<Vec<GlobalHit>> {
        self.global_hits("object_labels", "label", label, position, forward, limit)
            .await
    }

    /// Global face-cluster hits.
    pub async fn global_cluster_hits(
        &self,
        cluster_id: &str,
        position: &GlobalPosition,
        forward: bool,
        limit: i64,
    ) -> StoreResult<Vec<GlobalHit>> {
        self.global_hits(
            "face_clusters",
            "cluster_id",
            cluster_id,
            position,
            forward,
            limit,
        )
        .await
    }

    /// Location of one video, when its metadata carried GPS coordinates.
    pub async fn get_location(&self, video_id: &VideoId) -> StoreResult<Option<VideoLocation>> {
        let row = sqlx::query("SELECT * FROM video_locations WHERE video_id = ?")
            .bind(video_id.as_str())
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(location_from_row).transpose()
    }

    /// Videos located in a country.
    pub async fn find_locations_by_country(&self, country: &str) -> StoreResult<Vec<VideoLocation>> {
        let rows = sqlx::query("SELECT * FROM video_locations WHERE country = ? ORDER BY video_id")
            .bind(country)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(location_from_row).collect()
    }

    /// Videos located in a city.
    pub async fn find_locations_by_city(&self, city: &str) -> StoreResult<Vec<VideoLocation>> {
        let rows = sqlx::query("SELECT * FROM video_locations WHERE city = ? ORDER BY video_id")
            .bind(city)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(location_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::db::test_db;
    use crate::videos::VideoRepository;
    use vindex_models::{
        ArtifactEnvelope, ArtifactId, ArtifactKind, ModelProfile, RunId, Video,
    };

    fn text_envelope(
        asset: &VideoId,
        kind: ArtifactKind,
        id: &str,
        start: i64,
        end: i64,
        text: &str,
    ) -> ArtifactEnvelope {
        ArtifactEnvelope::new(
            ArtifactId::from(id),
            asset.clone(),
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

    fn label_envelope(
        asset: &VideoId,
        id: &str,
        start: i64,
        end: i64,
        label: &str,
    ) -> ArtifactEnvelope {
        ArtifactEnvelope::new(
            ArtifactId::from(id),
            asset.clone(),
            ArtifactKind::ObjectDetection,
            1,
            start,
            end,
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
    async fn fts_search_is_direction_aware() {
        let db = test_db().await;
        let videos = VideoRepository::new(db.clone());
        let store = ArtifactStore::new(db.clone());
        let queries = ProjectionQueries::new(db);

        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();
        let asset = video.video_id;

        store
            .batch_create(&[
                text_envelope(&asset, ArtifactKind::TranscriptSegment, "t1", 2000, 3000, "password reset"),
                text_envelope(&asset, ArtifactKind::TranscriptSegment, "t2", 5000, 6000, "reset complete"),
            ])
            .await
            .unwrap();

        let forward = queries
            .search_transcript(&asset, "reset", 0, true, 10)
            .await
            .unwrap();
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[0].start_ms, 2000);
        assert_eq!(forward[1].start_ms, 5000);

        let backward = queries
            .search_transcript(&asset, "reset", 4000, false, 10)
            .await
            .unwrap();
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0].start_ms, 2000);

        // case-insensitive by FTS tokenization
        let upper = queries
            .search_transcript(&asset, "RESET", 0, true, 10)
            .await
            .unwrap();
        assert_eq!(upper.len(), 2);
    }

    #[tokio::test]
    async fn fts_quoting_neutralizes_match_syntax() {
        let db = test_db().await;
        let videos = VideoRepository::new(db.clone());
        let store = ArtifactStore::new(db.clone());
        let queries = ProjectionQueries::new(db);

        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();
        let asset = video.video_id;

        store
            .create(&text_envelope(
                &asset,
                ArtifactKind::OcrText,
                "o1",
                0,
                33,
                "total: 42",
            ))
            .await
            .unwrap();

        // would be a syntax error unquoted
        let hits = queries.search_ocr(&asset, "total:", 0, true, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn global_hits_order_by_file_created_at_nulls_last() {
        let db = test_db().await;
        let videos = VideoRepository::new(db.clone());
        let store = ArtifactStore::new(db.clone());
        let queries = ProjectionQueries::new(db);

        // v-old has an old file_created_at, v-new a newer one, v-null none
        let mut v_old = Video::discovered("/videos/old.mp4");
        v_old.video_id = VideoId::from("v-old");
        v_old.file_created_at = Some("2024-01-01T00:00:00Z".parse().unwrap());
        let mut v_new = Video::discovered("/videos/new.mp4");
        v_new.video_id = VideoId::from("v-new");
        v_new.file_created_at = Some("2025-06-01T00:00:00Z".parse().unwrap());
        let mut v_null = Video::discovered("/videos/null.mp4");
        v_null.video_id = VideoId::from("v-null");
        for v in [&v_old, &v_new, &v_null] {
            videos.create(v).await.unwrap();
        }

        store
            .batch_create(&[
                label_envelope(&v_new.video_id, "a-new", 100, 200, "person"),
                label_envelope(&v_old.video_id, "a-old", 500, 600, "person"),
                label_envelope(&v_null.video_id, "a-null", 0, 100, "person"),
            ])
            .await
            .unwrap();

        // walk forward from the beginning of the global timeline
        let origin = GlobalPosition {
            file_created_at: Some(chrono::DateTime::<Utc>::MIN_UTC),
            asset_id: String::new(),
            start_ms: -1,
        };
        let hits = queries
            .global_label_hits("person", &origin, true, 10)
            .await
            .unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.artifact_id.as_str()).collect();
        assert_eq!(order, vec!["a-old", "a-new", "a-null"]);

        // continue after the first hit
        let after_first = GlobalPosition {
            file_created_at: hits[0].file_created_at,
            asset_id: hits[0].asset_id.clone(),
            start_ms: hits[0].start_ms,
        };
        let rest = queries
            .global_label_hits("person", &after_first, true, 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].artifact_id, "a-new");
    }

    #[tokio::test]
    async fn location_lookups() {
        let db = test_db().await;
        let videos = VideoRepository::new(db.clone());
        let store = ArtifactStore::new(db.clone());
        let queries = ProjectionQueries::new(db.clone());

        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();

        let env = ArtifactEnvelope::new(
            ArtifactId::from("m1"),
            video.video_id.clone(),
            ArtifactKind::VideoMetadata,
            1,
            0,
            0,
            serde_json::json!({"latitude": 40.7128, "longitude": -74.0060, "altitude": 10.5}),
            "ml-service",
            "1.0.0",
            ModelProfile::Balanced,
            "cfg",
            "input",
            RunId::from("r1"),
        )
        .unwrap();
        store.create(&env).await.unwrap();

        let location = queries.get_location(&video.video_id).await.unwrap().unwrap();
        assert!((location.latitude - 40.7128).abs() < 1e-9);
        assert_eq!(location.artifact_id, "m1");

        // country/state/city stay empty until enrichment fills them
        assert!(location.country.is_none());
        assert!(queries
            .find_locations_by_country("US")
            .await
            .unwrap()
            .is_empty());
    }
}
