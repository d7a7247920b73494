//! Video repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vindex_models::{Video, VideoId, VideoStatus};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

pub(crate) fn video_from_row(row: &SqliteRow) -> StoreResult<Video> {
    let status_str: String = row.try_get("status")?;
    let status = VideoStatus::parse(&status_str)
        .ok_or_else(|| StoreError::corrupt(format!("unknown video status: {status_str}")))?;

    Ok(Video {
        video_id: VideoId::from(row.try_get::<String, _>("video_id")?),
        file_path: row.try_get("file_path")?,
        content_hash: row.try_get("content_hash")?,
        file_created_at: row.try_get::<Option<DateTime<Utc>>, _>("file_created_at")?,
        duration_seconds: row.try_get("duration_seconds")?,
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        error_message: row.try_get("error_message")?,
    })
}

/// CRUD over the `videos` table.
#[derive(Debug, Clone)]
pub struct VideoRepository {
    db: Database,
}

impl VideoRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new video. `Duplicate` on a path or id collision.
    pub async fn create(&self, video: &Video) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO videos
                (video_id, file_path, content_hash, file_created_at, duration_seconds,
                 status, created_at, updated_at, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(video.video_id.as_str())
        .bind(&video.file_path)
        .bind(&video.content_hash)
        .bind(video.file_created_at)
        .bind(video.duration_seconds)
        .bind(video.status.as_str())
        .bind(video.created_at)
        .bind(video.updated_at)
        .bind(&video.error_message)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if StoreError::is_unique_violation(&e) => {
                Err(StoreError::duplicate(format!("video {}", video.video_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, video_id: &VideoId) -> StoreResult<Option<Video>> {
        let row = sqlx::query("SELECT * FROM videos WHERE video_id = ?")
            .bind(video_id.as_str())
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(video_from_row).transpose()
    }

    /// Fetch a video or fail with `NotFound`.
    pub async fn require(&self, video_id: &VideoId) -> StoreResult<Video> {
        self.get(video_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("video {video_id}")))
    }

    pub async fn exists(&self, video_id: &VideoId) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM videos WHERE video_id = ?")
            .bind(video_id.as_str())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn find_by_status(&self, status: VideoStatus) -> StoreResult<Vec<Video>> {
        let rows = sqlx::query("SELECT * FROM videos WHERE status = ? ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(video_from_row).collect()
    }

    pub async fn update_status(&self, video_id: &VideoId, status: VideoStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE videos SET status = ?, updated_at = ? WHERE video_id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(video_id.as_str())
            .execute(self.db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("video {video_id}")));
        }
        Ok(())
    }

    /// Record a failure and flip the video to `failed`.
    pub async fn mark_failed(&self, video_id: &VideoId, error: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE videos SET status = 'failed', error_message = ?, updated_at = ? WHERE video_id = ?",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(video_id.as_str())
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("video {video_id}")));
        }
        Ok(())
    }

    /// Set the content hash computed by the hash task.
    pub async fn set_content_hash(&self, video_id: &VideoId, hash: &str) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE videos SET content_hash = ?, updated_at = ? WHERE video_id = ?")
                .bind(hash)
                .bind(Utc::now())
                .bind(video_id.as_str())
                .execute(self.db.pool())
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("video {video_id}")));
        }
        Ok(())
    }

    pub async fn set_file_created_at(
        &self,
        video_id: &VideoId,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE videos SET file_created_at = ?, updated_at = ? WHERE video_id = ?")
            .bind(at)
            .bind(Utc::now())
            .bind(video_id.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Delete a video and everything it owns: tasks, runs, policies,
    /// artifacts and their projection rows.
    pub async fn delete(&self, video_id: &VideoId) -> StoreResult<()> {
        let mut tx = self.db.pool().begin().await?;
        let id = video_id.as_str();

        for table in [
            "transcript_segments",
            "ocr_segments",
            "object_labels",
            "face_clusters",
            "scene_ranges",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE asset_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM transcript_fts WHERE asset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM ocr_fts WHERE asset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM video_locations WHERE video_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM artifacts WHERE asset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM artifact_selections WHERE asset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM runs WHERE asset_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE video_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM videos WHERE video_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("video {video_id}")));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let db = test_db().await;
        let repo = VideoRepository::new(db);

        let video = Video::discovered("/videos/a.mp4");
        repo.create(&video).await.unwrap();

        let loaded = repo.get(&video.video_id).await.unwrap().unwrap();
        assert_eq!(loaded.video_id, video.video_id);
        assert_eq!(loaded.file_path, "/videos/a.mp4");
        assert_eq!(loaded.status, VideoStatus::Discovered);
        assert!(loaded.content_hash.is_none());
    }

    #[tokio::test]
    async fn duplicate_path_rejected() {
        let db = test_db().await;
        let repo = VideoRepository::new(db);

        repo.create(&Video::discovered("/videos/a.mp4")).await.unwrap();
        let err = repo.create(&Video::discovered("/videos/a.mp4")).await;
        assert!(matches!(err, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn status_and_hash_updates() {
        let db = test_db().await;
        let repo = VideoRepository::new(db);

        let video = Video::discovered("/videos/a.mp4");
        repo.create(&video).await.unwrap();

        repo.set_content_hash(&video.video_id, "abc123").await.unwrap();
        repo.update_status(&video.video_id, VideoStatus::Hashed)
            .await
            .unwrap();

        let loaded = repo.require(&video.video_id).await.unwrap();
        assert_eq!(loaded.content_hash.as_deref(), Some("abc123"));
        assert_eq!(loaded.status, VideoStatus::Hashed);

        let discovered = repo.find_by_status(VideoStatus::Discovered).await.unwrap();
        assert!(discovered.is_empty());
        let hashed = repo.find_by_status(VideoStatus::Hashed).await.unwrap();
        assert_eq!(hashed.len(), 1);
    }

    #[tokio::test]
    async fn missing_video_errors() {
        let db = test_db().await;
        let repo = VideoRepository::new(db);

        let id = VideoId::new();
        assert!(repo.get(&id).await.unwrap().is_none());
        assert!(matches!(
            repo.require(&id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.update_status(&id, VideoStatus::Completed).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
