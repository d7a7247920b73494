//! Task repository.
//!
//! The unique `(video_id, task_type, coalesce(language, ''))` key is
//! enforced by the storage layer; `pending -> running` happens only through
//! [`TaskRepository::atomic_dequeue_pending`].

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use vindex_models::{Task, TaskId, TaskKind, TaskStatus, VideoId};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

fn task_from_row(row: &SqliteRow) -> StoreResult<Task> {
    let type_str: String = row.try_get("task_type")?;
    let task_type = TaskKind::from_name(&type_str)
        .map_err(|_| StoreError::corrupt(format!("unknown task type: {type_str}")))?;

    let status_str: String = row.try_get("status")?;
    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| StoreError::corrupt(format!("unknown task status: {status_str}")))?;

    let deps_json: String = row.try_get("dependencies")?;
    let dependencies: Vec<TaskKind> = serde_json::from_str(&deps_json)
        .map_err(|e| StoreError::corrupt(format!("bad dependencies json: {e}")))?;

    Ok(Task {
        task_id: TaskId::from(row.try_get::<String, _>("task_id")?),
        video_id: VideoId::from(row.try_get::<String, _>("video_id")?),
        task_type,
        language: row.try_get("language")?,
        status,
        priority: row.try_get("priority")?,
        dependencies,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        error_message: row.try_get("error_message")?,
    })
}

/// CRUD plus atomic dequeue over the `tasks` table.
#[derive(Debug, Clone)]
pub struct TaskRepository {
    db: Database,
}

impl TaskRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new task. `Duplicate` when a task with the same
    /// `(video, kind, language)` already exists.
    pub async fn create(&self, task: &Task) -> StoreResult<()> {
        let deps_json = serde_json::to_string(&task.dependencies)?;
        let result = sqlx::query(
            r#"
            INSERT INTO tasks
                (task_id, video_id, task_type, language, status, priority,
                 dependencies, created_at, started_at, completed_at, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.task_id.as_str())
        .bind(task.video_id.as_str())
        .bind(task.task_type.as_str())
        .bind(&task.language)
        .bind(task.status.as_str())
        .bind(task.priority)
        .bind(deps_json)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(&task.error_message)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if StoreError::is_unique_violation(&e) => Err(StoreError::duplicate(format!(
                "task ({}, {}, {})",
                task.video_id,
                task.task_type,
                task.language.as_deref().unwrap_or("")
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, task_id: &TaskId) -> StoreResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
            .bind(task_id.as_str())
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    /// Persist the full mutable state of a task row.
    pub async fn update(&self, task: &Task) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, started_at = ?, completed_at = ?, error_message = ?
            WHERE task_id = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(&task.error_message)
        .bind(task.task_id.as_str())
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("task {}", task.task_id)));
        }
        Ok(())
    }

    pub async fn find_by_video(&self, video_id: &VideoId) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE video_id = ? ORDER BY created_at")
            .bind(video_id.as_str())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn find_by_video_and_type(
        &self,
        video_id: &VideoId,
        task_type: TaskKind,
    ) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE video_id = ? AND task_type = ? ORDER BY created_at",
        )
        .bind(video_id.as_str())
        .bind(task_type.as_str())
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    pub async fn find_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE status = ? ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    /// Atomically claim the next pending task of a kind.
    ///
    /// One statement selects the highest-priority (oldest on ties) pending
    /// task, flips it to `running` and sets `started_at`. The `status =
    /// 'pending'` guard on the outer update makes concurrent dequeues
    /// return disjoint tasks.
    pub async fn atomic_dequeue_pending(&self, task_type: TaskKind) -> StoreResult<Option<Task>> {
        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'running', started_at = ?
            WHERE task_id = (
                SELECT task_id FROM tasks
                WHERE status = 'pending' AND task_type = ?
                ORDER BY priority DESC, created_at ASC, task_id ASC
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(task_type.as_str())
        .fetch_optional(self.db.pool())
        .await?;
        row.as_ref().map(task_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::videos::VideoRepository;
    use vindex_models::Video;

    async fn setup() -> (TaskRepository, VideoId) {
        let db = test_db().await;
        let videos = VideoRepository::new(db.clone());
        let video = Video::discovered("/videos/a.mp4");
        videos.create(&video).await.unwrap();
        (TaskRepository::new(db), video.video_id)
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let (repo, video_id) = setup().await;

        let task = Task::new(video_id.clone(), TaskKind::ObjectDetection);
        repo.create(&task).await.unwrap();

        let loaded = repo.get(&task.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.task_type, TaskKind::ObjectDetection);
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.dependencies, vec![TaskKind::Hash]);

        let by_type = repo
            .find_by_video_and_type(&video_id, TaskKind::ObjectDetection)
            .await
            .unwrap();
        assert_eq!(by_type.len(), 1);
    }

    #[tokio::test]
    async fn unique_key_includes_language() {
        let (repo, video_id) = setup().await;

        let en = Task::new(video_id.clone(), TaskKind::Ocr).with_language("en");
        repo.create(&en).await.unwrap();

        // same kind, different language is fine
        let de = Task::new(video_id.clone(), TaskKind::Ocr).with_language("de");
        repo.create(&de).await.unwrap();

        // same kind + language collides
        let dup = Task::new(video_id.clone(), TaskKind::Ocr).with_language("en");
        assert!(matches!(
            repo.create(&dup).await,
            Err(StoreError::Duplicate(_))
        ));

        // NULL language counts as one slot too
        let t1 = Task::new(video_id.clone(), TaskKind::Transcription);
        repo.create(&t1).await.unwrap();
        let t2 = Task::new(video_id.clone(), TaskKind::Transcription);
        assert!(matches!(
            repo.create(&t2).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn dequeue_orders_by_priority_then_age() {
        let (repo, video_id) = setup().await;

        let mut low = Task::new(video_id.clone(), TaskKind::Transcription);
        low.priority = 10;
        repo.create(&low).await.unwrap();

        let mut high = Task::new(video_id.clone(), TaskKind::Transcription).with_language("en");
        high.priority = 100;
        repo.create(&high).await.unwrap();

        let first = repo
            .atomic_dequeue_pending(TaskKind::Transcription)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.task_id, high.task_id);
        assert_eq!(first.status, TaskStatus::Running);
        assert!(first.started_at.is_some());

        let second = repo
            .atomic_dequeue_pending(TaskKind::Transcription)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.task_id, low.task_id);

        let third = repo
            .atomic_dequeue_pending(TaskKind::Transcription)
            .await
            .unwrap();
        assert!(third.is_none());
    }

    #[tokio::test]
    async fn concurrent_dequeues_return_disjoint_tasks() {
        let (repo, video_id) = setup().await;

        for i in 0..8 {
            let task =
                Task::new(video_id.clone(), TaskKind::Ocr).with_language(format!("lang-{i}"));
            repo.create(&task).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.atomic_dequeue_pending(TaskKind::Ocr).await.unwrap()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            if let Some(task) = handle.await.unwrap() {
                assert!(seen.insert(task.task_id.clone()), "task dequeued twice");
            }
        }
        assert_eq!(seen.len(), 8);

        // everything is running now, nothing left to claim
        assert!(repo
            .atomic_dequeue_pending(TaskKind::Ocr)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_persists_transitions() {
        let (repo, video_id) = setup().await;

        let task = Task::new(video_id, TaskKind::FaceDetection);
        repo.create(&task).await.unwrap();

        let failed = task.clone().start().fail("model crashed");
        repo.update(&failed).await.unwrap();

        let loaded = repo.get(&task.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("model crashed"));
        assert!(loaded.completed_at.is_some());

        let failed_tasks = repo.find_by_status(TaskStatus::Failed).await.unwrap();
        assert_eq!(failed_tasks.len(), 1);
    }
}
