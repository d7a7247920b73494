//! Projection sync.
//!
//! Per-kind transformation from a validated envelope into rows of the
//! kind's read-model table. The transformers are pure; the writes run on
//! the connection of the enclosing envelope transaction so a failed sync
//! aborts the envelope write.

use sqlx::SqliteConnection;

use vindex_models::{ArtifactEnvelope, ArtifactKind, ArtifactPayload};

use crate::error::{StoreError, StoreResult};

/// Row of the text projections (transcript / OCR).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRow {
    pub artifact_id: String,
    pub asset_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
}

/// Row of the object-label projection.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRow {
    pub artifact_id: String,
    pub asset_id: String,
    pub label: String,
    pub confidence: f64,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Row of the face-cluster projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRow {
    pub artifact_id: String,
    pub asset_id: String,
    pub cluster_id: String,
    pub confidence: f64,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Row of the scene-range projection.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRow {
    pub artifact_id: String,
    pub asset_id: String,
    pub scene_index: i64,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Row of the geo projection.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRow {
    pub video_id: String,
    pub artifact_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Rows a transformer produced for one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionRows {
    Transcript(TextRow),
    Ocr(TextRow),
    Labels(Vec<LabelRow>),
    Clusters(Vec<ClusterRow>),
    Scene(SceneRow),
    Location(Option<LocationRow>),
    /// Kind has no projection
    None,
}

impl ProjectionRows {
    /// Number of rows this projection will write.
    pub fn row_count(&self) -> usize {
        match self {
            ProjectionRows::Transcript(_) | ProjectionRows::Ocr(_) | ProjectionRows::Scene(_) => 1,
            ProjectionRows::Labels(rows) => rows.len(),
            ProjectionRows::Clusters(rows) => rows.len(),
            ProjectionRows::Location(row) => usize::from(row.is_some()),
            ProjectionRows::None => 0,
        }
    }
}

/// Pure transformer: envelope + decoded payload -> projection rows.
///
/// Invalid GPS coordinates are a hard error so the enclosing envelope
/// write aborts.
pub fn transform(
    envelope: &ArtifactEnvelope,
    payload: &ArtifactPayload,
) -> StoreResult<ProjectionRows> {
    let artifact_id = envelope.artifact_id.to_string();
    let asset_id = envelope.asset_id.to_string();

    Ok(match payload {
        ArtifactPayload::TranscriptSegment(p) => ProjectionRows::Transcript(TextRow {
            artifact_id,
            asset_id,
            start_ms: envelope.span_start_ms,
            end_ms: envelope.span_end_ms,
            text: p.text.clone(),
        }),
        ArtifactPayload::OcrText(p) => ProjectionRows::Ocr(TextRow {
            artifact_id,
            asset_id,
            start_ms: envelope.span_start_ms,
            end_ms: envelope.span_end_ms,
            text: p.text.clone(),
        }),
        ArtifactPayload::ObjectDetection(p) => ProjectionRows::Labels(vec![LabelRow {
            artifact_id,
            asset_id,
            label: p.label.clone(),
            confidence: p.confidence,
            start_ms: envelope.span_start_ms,
            end_ms: envelope.span_end_ms,
        }]),
        ArtifactPayload::FaceDetection(p) => ProjectionRows::Clusters(vec![ClusterRow {
            artifact_id,
            asset_id,
            cluster_id: p.cluster_id.clone(),
            confidence: p.confidence,
            start_ms: envelope.span_start_ms,
            end_ms: envelope.span_end_ms,
        }]),
        ArtifactPayload::Scene(p) => ProjectionRows::Scene(SceneRow {
            artifact_id,
            asset_id,
            scene_index: p.scene_index,
            start_ms: envelope.span_start_ms,
            end_ms: envelope.span_end_ms,
        }),
        ArtifactPayload::VideoMetadata(p) => match p.gps() {
            Some((lat, lon)) => {
                if lat.abs() > 90.0 || lon.abs() > 180.0 {
                    return Err(StoreError::InvalidGps { lat, lon });
                }
                ProjectionRows::Location(Some(LocationRow {
                    video_id: asset_id,
                    artifact_id,
                    latitude: lat,
                    longitude: lon,
                    altitude: p.altitude,
                }))
            }
            None => ProjectionRows::Location(None),
        },
        ArtifactPayload::PlaceClassification(_) => ProjectionRows::None,
    })
}

/// Write the projection rows for one envelope inside the caller's
/// transaction.
pub(crate) async fn sync_artifact(
    conn: &mut SqliteConnection,
    envelope: &ArtifactEnvelope,
    payload: &ArtifactPayload,
) -> StoreResult<usize> {
    let rows = transform(envelope, payload)?;
    let count = rows.row_count();

    match rows {
        ProjectionRows::Transcript(row) => {
            write_text_row(conn, "transcript_segments", "transcript_fts", &row).await?;
        }
        ProjectionRows::Ocr(row) => {
            write_text_row(conn, "ocr_segments", "ocr_fts", &row).await?;
        }
        ProjectionRows::Labels(rows) => {
            for row in rows {
                sqlx::query(
                    r#"
                    INSERT INTO object_labels
                        (artifact_id, asset_id, label, confidence, start_ms, end_ms)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&row.artifact_id)
                .bind(&row.asset_id)
                .bind(&row.label)
                .bind(row.confidence)
                .bind(row.start_ms)
                .bind(row.end_ms)
                .execute(&mut *conn)
                .await?;
            }
        }
        ProjectionRows::Clusters(rows) => {
            for row in rows {
                sqlx::query(
                    r#"
                    INSERT INTO face_clusters
                        (artifact_id, asset_id, cluster_id, confidence, start_ms, end_ms)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&row.artifact_id)
                .bind(&row.asset_id)
                .bind(&row.cluster_id)
                .bind(row.confidence)
                .bind(row.start_ms)
                .bind(row.end_ms)
                .execute(&mut *conn)
                .await?;
            }
        }
        ProjectionRows::Scene(row) => {
            sqlx::query(
                r#"
                INSERT INTO scene_ranges (artifact_id, asset_id, scene_index, start_ms, end_ms)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.artifact_id)
            .bind(&row.asset_id)
            .bind(row.scene_index)
            .bind(row.start_ms)
            .bind(row.end_ms)
            .execute(&mut *conn)
            .await?;
        }
        ProjectionRows::Location(Some(row)) => {
            // one location per video; a newer metadata envelope replaces it
            sqlx::query(
                r#"
                INSERT INTO video_locations
                    (video_id, artifact_id, latitude, longitude, altitude, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (video_id) DO UPDATE SET
                    artifact_id = excluded.artifact_id,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    altitude = excluded.altitude,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&row.video_id)
            .bind(&row.artifact_id)
            .bind(row.latitude)
            .bind(row.longitude)
            .bind(row.altitude)
            .bind(chrono::Utc::now())
            .execute(&mut *conn)
            .await?;
        }
        ProjectionRows::Location(None) | ProjectionRows::None => {}
    }

    Ok(count)
}

async fn write_text_row(
    conn: &mut SqliteConnection,
    meta_table: &str,
    fts_table: &str,
    row: &TextRow,
) -> StoreResult<()> {
    sqlx::query(&format!(
        "INSERT INTO {meta_table} (artifact_id, asset_id, start_ms, end_ms, text) VALUES (?, ?, ?, ?, ?)"
    ))
    .bind(&row.artifact_id)
    .bind(&row.asset_id)
    .bind(row.start_ms)
    .bind(row.end_ms)
    .bind(&row.text)
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "INSERT INTO {fts_table} (text, artifact_id, asset_id, start_ms, end_ms) VALUES (?, ?, ?, ?, ?)"
    ))
    .bind(&row.text)
    .bind(&row.artifact_id)
    .bind(&row.asset_id)
    .bind(row.start_ms)
    .bind(row.end_ms)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Delete every projection row bound to an artifact, inside the caller's
/// transaction.
pub(crate) async fn delete_for_artifact(
    conn: &mut SqliteConnection,
    kind: ArtifactKind,
    artifact_id: &str,
) -> StoreResult<()> {
    let tables: &[&str] = match kind {
        ArtifactKind::TranscriptSegment => &["transcript_segments", "transcript_fts"],
        ArtifactKind::OcrText => &["ocr_segments", "ocr_fts"],
        ArtifactKind::ObjectDetection => &["object_labels"],
        ArtifactKind::FaceDetection => &["face_clusters"],
        ArtifactKind::Scene => &["scene_ranges"],
        ArtifactKind::VideoMetadata => &["video_locations"],
        ArtifactKind::PlaceClassification => &[],
    };

    for table in tables {
        sqlx::query(&format!("DELETE FROM {table} WHERE artifact_id = ?"))
            .bind(artifact_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
