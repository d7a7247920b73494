//! Database handle and migration runner.

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::migrations::MIGRATIONS;

/// Database handle. Cheap to clone; repositories hold one and borrow
/// connections per operation.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to a database URL (e.g. `sqlite://vindex.db` or
    /// `sqlite::memory:`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options: SqliteConnectOptions = url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // each pooled connection to an in-memory database would get its
        // own empty database, so those pools are pinned to one connection
        let is_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = SqlitePoolOptions::new()
            .max_connections(if is_memory { 1 } else { 8 })
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Connect using the `DATABASE_URL` environment variable.
    pub async fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://vindex.db".to_string());
        Self::connect(&url).await
    }

    /// Run any migrations not yet applied. Forward-only; progress is
    /// tracked in `PRAGMA user_version`.
    pub async fn migrate(&self) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(&mut *conn)
            .await?;
        let applied: i64 = row.try_get(0)?;

        for (idx, migration) in MIGRATIONS.iter().enumerate() {
            let version = (idx + 1) as i64;
            if version <= applied {
                continue;
            }
            debug!(version, "Applying migration");
            sqlx::raw_sql(migration).execute(&mut *conn).await?;
            sqlx::raw_sql(&format!("PRAGMA user_version = {version}"))
                .execute(&mut *conn)
                .await?;
        }

        let total = MIGRATIONS.len();
        if applied < total as i64 {
            info!(from = applied, to = total, "Database migrated");
        }
        Ok(())
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
pub(crate) async fn test_db() -> Database {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect in-memory database");
    db.migrate().await.expect("run migrations");
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_apply_cleanly() {
        let db = test_db().await;

        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(db.pool())
            .await
            .unwrap();
        let version: i64 = row.try_get(0).unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let db = test_db().await;
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }
}
