//! Artifact store.
//!
//! Persists immutable envelopes and synchronously drives projection sync:
//! the envelope insert and its projection rows commit in one transaction,
//! so either both are visible or neither is. Read paths apply the compiled
//! selection filter inside a single query.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use vindex_models::{
    ArtifactEnvelope, ArtifactId, ArtifactKind, ModelProfile, RunId, SchemaRegistry,
    SelectionFilter, VideoId,
};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::projections;

fn artifact_from_row(row: &SqliteRow, registry: &SchemaRegistry) -> StoreResult<ArtifactEnvelope> {
    let kind_str: String = row.try_get("artifact_type")?;
    let artifact_type = ArtifactKind::from_name(&kind_str)
        .map_err(|_| StoreError::corrupt(format!("unknown artifact type: {kind_str}")))?;

    let profile_str: String = row.try_get("model_profile")?;
    let model_profile = ModelProfile::parse(&profile_str)
        .ok_or_else(|| StoreError::corrupt(format!("unknown model profile: {profile_str}")))?;

    let payload_json: String = row.try_get("payload_json")?;
    let payload: serde_json::Value = serde_json::from_str(&payload_json)?;

    let schema_version: i64 = row.try_get("schema_version")?;

    Ok(ArtifactEnvelope {
        artifact_id: ArtifactId::from(row.try_get::<String, _>("artifact_id")?),
        asset_id: VideoId::from(row.try_get::<String, _>("asset_id")?),
        artifact_type,
        schema_version,
        span_start_ms: row.try_get("span_start_ms")?,
        span_end_ms: row.try_get("span_end_ms")?,
        payload,
        producer: row.try_get("producer")?,
        producer_version: row.try_get("producer_version")?,
        model_profile,
        config_hash: row.try_get("config_hash")?,
        input_hash: row.try_get("input_hash")?,
        run_id: RunId::from(row.try_get::<String, _>("run_id")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        schema_recognized: registry.is_registered(artifact_type, schema_version),
    })
}

/// Envelope persistence and queries.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    db: Database,
    registry: &'static SchemaRegistry,
}

impl ArtifactStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            registry: SchemaRegistry::global(),
        }
    }

    /// Persist one envelope and its projection rows.
    pub async fn create(&self, envelope: &ArtifactEnvelope) -> StoreResult<()> {
        self.batch_create(std::slice::from_ref(envelope)).await
    }

    /// Persist a batch of envelopes in one transaction. A single failure
    /// (schema, unknown asset, duplicate, projection error) rolls the
    /// whole batch back.
    pub async fn batch_create(&self, envelopes: &[ArtifactEnvelope]) -> StoreResult<()> {
        if envelopes.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.pool().begin().await?;

        for envelope in envelopes {
            if envelope.span_start_ms < 0
                || envelope.span_end_ms < 0
                || envelope.span_start_ms > envelope.span_end_ms
            {
                return Err(StoreError::Model(vindex_models::ModelError::InvalidSpan {
                    start: envelope.span_start_ms,
                    end: envelope.span_end_ms,
                }));
            }

            let payload = self.registry.validate(
                envelope.artifact_type,
                envelope.schema_version,
                &envelope.payload,
            )?;

            let asset_exists = sqlx::query("SELECT 1 FROM videos WHERE video_id = ?")
                .bind(envelope.asset_id.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            if !asset_exists {
                return Err(StoreError::AssetUnknown(envelope.asset_id.to_string()));
            }

            let payload_json = serde_json::to_string(&envelope.payload)?;
            let insert = sqlx::query(
                r#"
                INSERT INTO artifacts
                    (artifact_id, asset_id, artifact_type, schema_version,
                     span_start_ms, span_end_ms, payload_json,
                     producer, producer_version, model_profile,
                     config_hash, input_hash, run_id, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(envelope.artifact_id.as_str())
            .bind(envelope.asset_id.as_str())
            .bind(envelope.artifact_type.as_str())
            .bind(envelope.schema_version)
            .bind(envelope.span_start_ms)
            .bind(envelope.span_end_ms)
            .bind(payload_json)
            .bind(&envelope.producer)
            .bind(&envelope.producer_version)
            .bind(envelope.model_profile.as_str())
            .bind(&envelope.config_hash)
            .bind(&envelope.input_hash)
            .bind(envelope.run_id.as_str())
            .bind(envelope.created_at)
            .execute(&mut *tx)
            .await;

            match insert {
                Ok(_) => {}
                Err(e) if StoreError::is_unique_violation(&e) => {
                    return Err(StoreError::duplicate(format!(
                        "artifact {}",
                        envelope.artifact_id
                    )));
                }
                Err(e) => return Err(e.into()),
            }

            let rows = projections::sync_artifact(&mut tx, envelope, &payload).await?;
            debug!(
                artifact_id = %envelope.artifact_id,
                kind = %envelope.artifact_type,
                projection_rows = rows,
                "Persisted artifact envelope"
            );
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_id(&self, artifact_id: &ArtifactId) -> StoreResult<Option<ArtifactEnvelope>> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE artifact_id = ?")
            .bind(artifact_id.as_str())
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref()
            .map(|r| artifact_from_row(r, self.registry))
            .transpose()
    }

    /// Envelopes of an asset, optionally narrowed by kind and a containment
    /// window, under a selection filter. Unknown assets return empty.
    pub async fn get_by_asset(
        &self,
        asset_id: &VideoId,
        kind: Option<ArtifactKind>,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        selection: Option<&SelectionFilter>,
    ) -> StoreResult<Vec<ArtifactEnvelope>> {
        let contained = match (start_ms, end_ms) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        };
        self.query(asset_id, kind, contained, None, selection).await
    }

    /// Envelopes of `(asset, kind)` whose span overlaps
    /// `[span_start_ms, span_end_ms]`, under a selection filter.
    pub async fn get_by_span(
        &self,
        asset_id: &VideoId,
        kind: ArtifactKind,
        span_start_ms: i64,
        span_end_ms: i64,
        selection: Option<&SelectionFilter>,
    ) -> StoreResult<Vec<ArtifactEnvelope>> {
        self.query(
            asset_id,
            Some(kind),
            None,
            Some((span_start_ms, span_end_ms)),
            selection,
        )
        .await
    }

    async fn query(
        &self,
        asset_id: &VideoId,
        kind: Option<ArtifactKind>,
        contained: Option<(i64, i64)>,
        overlap: Option<(i64, i64)>,
        selection: Option<&SelectionFilter>,
    ) -> StoreResult<Vec<ArtifactEnvelope>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM artifacts a WHERE a.asset_id = ");
        qb.push_bind(asset_id.as_str());

        if let Some(kind) = kind {
            qb.push(" AND a.artifact_type = ").push_bind(kind.as_str());
        }

        if let Some((start, end)) = contained {
            qb.push(" AND a.span_start_ms >= ").push_bind(start);
            qb.push(" AND a.span_end_ms <= ").push_bind(end);
        }

        if let Some((start, end)) = overlap {
            qb.push(" AND a.span_start_ms <= ").push_bind(end);
            qb.push(" AND a.span_end_ms >= ").push_bind(start);
        }

        let mut best_quality = false;
        match selection {
            None | Some(SelectionFilter::None) => {}
            Some(SelectionFilter::LatestRun) => {
                // single correlated subquery: the run of the newest envelope
                // for this (asset, kind); O(result), not O(history)
                qb.push(
                    " AND a.run_id = (SELECT a2.run_id FROM artifacts a2 \
                     WHERE a2.asset_id = a.asset_id AND a2.artifact_type = a.artifact_type \
                     ORDER BY a2.created_at DESC, a2.artifact_id DESC LIMIT 1)",
                );
            }
            Some(SelectionFilter::Profile(profile)) => {
                qb.push(" AND a.model_profile = ").push_bind(profile.as_str());
            }
            Some(SelectionFilter::Pinned { run_id, artifact_id }) => {
                qb.push(" AND a.run_id = ").push_bind(run_id.as_str());
                if let Some(artifact_id) = artifact_id {
                    qb.push(" AND a.artifact_id = ").push_bind(artifact_id.as_str());
                }
            }
            Some(SelectionFilter::BestQualityFirst) => {
                best_quality = true;
            }
        }

        if best_quality {
            qb.push(
                " ORDER BY CASE a.model_profile \
                 WHEN 'high_quality' THEN 0 WHEN 'balanced' THEN 1 ELSE 2 END, \
                 a.span_start_ms, a.artifact_id",
            );
        } else {
            qb.push(" ORDER BY a.span_start_ms, a.artifact_id");
        }

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        rows.iter()
            .map(|r| artifact_from_row(r, self.registry))
            .collect()
    }

    /// Delete an envelope and every projection row derived from it, in one
    /// transaction.
    pub async fn delete(&self, artifact_id: &ArtifactId) -> StoreResult<()> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query("SELECT artifact_type FROM artifacts WHERE artifact_id = ?")
            .bind(artifact_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let kind_str: String = match row {
            Some(row) => row.try_get("artifact_type")?,
            None => return Err(StoreError::not_found(format!("artifact {artifact_id}"))),
        };
        let kind = ArtifactKind::from_name(&kind_str)
            .map_err(|_| StoreError::corrupt(format!("unknown artifact type: {kind_str}")))?;

        projections::delete_for_artifact(&mut tx, kind, artifact_id.as_str()).await?;

        sqlx::query("DELETE FROM artifacts WHERE artifact_id = ?")
            .bind(artifact_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
