//! Run repository.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use chrono::{DateTime, Utc};
use vindex_models::{ModelProfile, Run, RunId, RunStatus, VideoId};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

fn run_from_row(row: &SqliteRow) -> StoreResult<Run> {
    let profile_str: String = row.try_get("pipeline_profile")?;
    let pipeline_profile = ModelProfile::parse(&profile_str)
        .ok_or_else(|| StoreError::corrupt(format!("unknown model profile: {profile_str}")))?;

    let status_str: String = row.try_get("status")?;
    let status = RunStatus::parse(&status_str)
        .ok_or_else(|| StoreError::corrupt(format!("unknown run status: {status_str}")))?;

    Ok(Run {
        run_id: RunId::from(row.try_get::<String, _>("run_id")?),
        asset_id: VideoId::from(row.try_get::<String, _>("asset_id")?),
        pipeline_profile,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get::<Option<DateTime<Utc>>, _>("finished_at")?,
        status,
        error_message: row.try_get("error_message")?,
    })
}

/// CRUD over the `runs` table.
#[derive(Debug, Clone)]
pub struct RunRepository {
    db: Database,
}

impl RunRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, run: &Run) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO runs
                (run_id, asset_id, pipeline_profile, started_at, finished_at, status, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.run_id.as_str())
        .bind(run.asset_id.as_str())
        .bind(run.pipeline_profile.as_str())
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.status.as_str())
        .bind(&run.error_message)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if StoreError::is_unique_violation(&e) => {
                Err(StoreError::duplicate(format!("run {}", run.run_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, run_id: &RunId) -> StoreResult<Option<Run>> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = ?")
            .bind(run_id.as_str())
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    pub async fn find_by_asset(&self, asset_id: &VideoId) -> StoreResult<Vec<Run>> {
        let rows = sqlx::query("SELECT * FROM runs WHERE asset_id = ? ORDER BY started_at")
            .bind(asset_id.as_str())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(run_from_row).collect()
    }

    /// Record the terminal outcome of a run.
    pub async fn finish(
        &self,
        run_id: &RunId,
        status: RunStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE runs SET status = ?, finished_at = ?, error_message = ? WHERE run_id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(error)
        .bind(run_id.as_str())
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("run {run_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::videos::VideoRepository;
    use vindex_models::Video;

    #[tokio::test]
    async fn run_lifecycle_round_trip() {
        let db = test_db().await;
        let videos = VideoRepository::new(db.clone());
        let repo = RunRepository::new(db);

        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();

        let run = Run::start(video.video_id.clone(), ModelProfile::HighQuality);
        repo.create(&run).await.unwrap();

        let loaded = repo.get(&run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.pipeline_profile, ModelProfile::HighQuality);

        repo.finish(&run.run_id, RunStatus::Completed, None)
            .await
            .unwrap();
        let loaded = repo.get(&run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Completed);
        assert!(loaded.finished_at.is_some());

        let runs = repo.find_by_asset(&video.video_id).await.unwrap();
        assert_eq!(runs.len(), 1);
    }
}
