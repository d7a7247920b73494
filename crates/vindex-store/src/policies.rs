//! Selection policy storage.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vindex_models::{
    ArtifactId, ArtifactKind, ModelProfile, RunId, SelectionMode, SelectionPolicy, VideoId,
};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

fn policy_from_row(row: &SqliteRow) -> StoreResult<SelectionPolicy> {
    let kind_str: String = row.try_get("artifact_type")?;
    let artifact_type = ArtifactKind::from_name(&kind_str)
        .map_err(|_| StoreError::corrupt(format!("unknown artifact type: {kind_str}")))?;

    let mode_str: String = row.try_get("mode")?;
    let mode = SelectionMode::parse(&mode_str)
        .ok_or_else(|| StoreError::corrupt(format!("unknown selection mode: {mode_str}")))?;

    let preferred_profile = row
        .try_get::<Option<String>, _>("preferred_profile")?
        .map(|s| {
            ModelProfile::parse(&s)
                .ok_or_else(|| StoreError::corrupt(format!("unknown model profile: {s}")))
        })
        .transpose()?;

    Ok(SelectionPolicy {
        asset_id: VideoId::from(row.try_get::<String, _>("asset_id")?),
        artifact_type,
        mode,
        preferred_profile,
        pinned_run_id: row
            .try_get::<Option<String>, _>("pinned_run_id")?
            .map(RunId::from),
        pinned_artifact_id: row
            .try_get::<Option<String>, _>("pinned_artifact_id")?
            .map(ArtifactId::from),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

/// Stores and resolves per `(asset, kind)` selection policies.
#[derive(Debug, Clone)]
pub struct SelectionPolicyManager {
    db: Database,
}

impl SelectionPolicyManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_policy(
        &self,
        asset_id: &VideoId,
        artifact_type: ArtifactKind,
    ) -> StoreResult<Option<SelectionPolicy>> {
        let row = sqlx::query(
            "SELECT * FROM artifact_selections WHERE asset_id = ? AND artifact_type = ?",
        )
        .bind(asset_id.as_str())
        .bind(artifact_type.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        row.as_ref().map(policy_from_row).transpose()
    }

    /// The implicit policy when none is stored: `latest`.
    pub fn get_default_policy(
        &self,
        asset_id: &VideoId,
        artifact_type: ArtifactKind,
    ) -> SelectionPolicy {
        SelectionPolicy::default_policy(asset_id.clone(), artifact_type)
    }

    /// Stored policy if present, the implicit default otherwise.
    pub async fn effective_policy(
        &self,
        asset_id: &VideoId,
        artifact_type: ArtifactKind,
    ) -> StoreResult<SelectionPolicy> {
        Ok(self
            .get_policy(asset_id, artifact_type)
            .await?
            .unwrap_or_else(|| self.get_default_policy(asset_id, artifact_type)))
    }

    /// Create or replace the policy for `(asset, kind)`. Replaces in place
    /// and bumps `updated_at`; `created_at` is kept from the first write.
    pub async fn set_policy(&self, policy: &SelectionPolicy) -> StoreResult<SelectionPolicy> {
        policy.validate()?;

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO artifact_selections
                (asset_id, artifact_type, mode, preferred_profile,
                 pinned_run_id, pinned_artifact_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (asset_id, artifact_type) DO UPDATE SET
                mode = excluded.mode,
                preferred_profile = excluded.preferred_profile,
                pinned_run_id = excluded.pinned_run_id,
                pinned_artifact_id = excluded.pinned_artifact_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(policy.asset_id.as_str())
        .bind(policy.artifact_type.as_str())
        .bind(policy.mode.as_str())
        .bind(policy.preferred_profile.map(|p| p.as_str()))
        .bind(policy.pinned_run_id.as_ref().map(|r| r.as_str()))
        .bind(policy.pinned_artifact_id.as_ref().map(|a| a.as_str()))
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        self.get_policy(&policy.asset_id, policy.artifact_type)
            .await?
            .ok_or_else(|| StoreError::not_found("policy vanished after upsert".to_string()))
    }

    pub async fn delete_policy(
        &self,
        asset_id: &VideoId,
        artifact_type: ArtifactKind,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "DELETE FROM artifact_selections WHERE asset_id = ? AND artifact_type = ?",
        )
        .bind(asset_id.as_str())
        .bind(artifact_type.as_str())
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!(
                "policy ({asset_id}, {artifact_type})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::videos::VideoRepository;
    use vindex_models::{SelectionFilter, Video};

    async fn setup() -> (SelectionPolicyManager, VideoId) {
        let db = test_db().await;
        let videos = VideoRepository::new(db.clone());
        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();
        (SelectionPolicyManager::new(db), video.video_id)
    }

    #[tokio::test]
    async fn get_policy_not_found_returns_none() {
        let (manager, asset) = setup().await;
        let policy = manager
            .get_policy(&asset, ArtifactKind::TranscriptSegment)
            .await
            .unwrap();
        assert!(policy.is_none());
    }

    #[tokio::test]
    async fn default_policy_is_latest() {
        let (manager, asset) = setup().await;
        let policy = manager.get_default_policy(&asset, ArtifactKind::Scene);
        assert_eq!(policy.mode, SelectionMode::Latest);
        assert_eq!(policy.compile().unwrap(), SelectionFilter::LatestRun);

        let effective = manager
            .effective_policy(&asset, ArtifactKind::Scene)
            .await
            .unwrap();
        assert_eq!(effective.mode, SelectionMode::Latest);
    }

    #[tokio::test]
    async fn set_policy_creates_then_replaces() {
        let (manager, asset) = setup().await;

        let profile_policy = SelectionPolicy::new(
            asset.clone(),
            ArtifactKind::TranscriptSegment,
            SelectionMode::Profile,
        )
        .with_preferred_profile(ModelProfile::HighQuality);
        let stored = manager.set_policy(&profile_policy).await.unwrap();
        assert_eq!(stored.mode, SelectionMode::Profile);
        assert_eq!(stored.preferred_profile, Some(ModelProfile::HighQuality));
        let first_updated = stored.updated_at;

        // replace in place with a pinned policy
        let pinned = SelectionPolicy::new(
            asset.clone(),
            ArtifactKind::TranscriptSegment,
            SelectionMode::Pinned,
        )
        .with_pinned_run(RunId::from("r1"))
        .with_pinned_artifact(ArtifactId::from("a1"));
        let stored = manager.set_policy(&pinned).await.unwrap();
        assert_eq!(stored.mode, SelectionMode::Pinned);
        assert_eq!(stored.pinned_run_id, Some(RunId::from("r1")));
        assert_eq!(stored.pinned_artifact_id, Some(ArtifactId::from("a1")));
        assert!(stored.updated_at >= first_updated);
    }

    #[tokio::test]
    async fn invalid_policies_rejected() {
        let (manager, asset) = setup().await;

        let no_profile =
            SelectionPolicy::new(asset.clone(), ArtifactKind::Scene, SelectionMode::Profile);
        assert!(manager.set_policy(&no_profile).await.is_err());

        let no_run = SelectionPolicy::new(asset, ArtifactKind::Scene, SelectionMode::Pinned);
        assert!(manager.set_policy(&no_run).await.is_err());
    }

    #[tokio::test]
    async fn policies_are_scoped_per_kind() {
        let (manager, asset) = setup().await;

        let latest = SelectionPolicy::new(
            asset.clone(),
            ArtifactKind::TranscriptSegment,
            SelectionMode::Latest,
        );
        manager.set_policy(&latest).await.unwrap();

        let best = SelectionPolicy::new(
            asset.clone(),
            ArtifactKind::ObjectDetection,
            SelectionMode::BestQuality,
        );
        manager.set_policy(&best).await.unwrap();

        let t = manager
            .get_policy(&asset, ArtifactKind::TranscriptSegment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(t.mode, SelectionMode::Latest);

        let o = manager
            .get_policy(&asset, ArtifactKind::ObjectDetection)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(o.mode, SelectionMode::BestQuality);
    }

    #[tokio::test]
    async fn delete_policy_removes_row() {
        let (manager, asset) = setup().await;

        let policy =
            SelectionPolicy::new(asset.clone(), ArtifactKind::Scene, SelectionMode::Default);
        manager.set_policy(&policy).await.unwrap();

        manager
            .delete_policy(&asset, ArtifactKind::Scene)
            .await
            .unwrap();
        assert!(manager
            .get_policy(&asset, ArtifactKind::Scene)
            .await
            .unwrap()
            .is_none());

        assert!(matches!(
            manager.delete_policy(&asset, ArtifactKind::Scene).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
