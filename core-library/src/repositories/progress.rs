//! Progress repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{ItemId, Progress};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Listening progress interface for data access operations
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn get(&self, item_id: &ItemId) -> Result<Option<Progress>>;

    /// Insert or replace the progress row of an item
    ///
    /// # Errors
    /// Returns error if validation fails or the database rejects the write
    async fn upsert(&self, progress: &Progress) -> Result<()>;

    async fn delete(&self, item_id: &ItemId) -> Result<bool>;
}

/// SQLite implementation of ProgressRepository
pub struct SqliteProgressRepository {
    pool: SqlitePool,
}

impl SqliteProgressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressRepository for SqliteProgressRepository {
    async fn get(&self, item_id: &ItemId) -> Result<Option<Progress>> {
        let progress = sqlx::query_as::<_, Progress>("SELECT * FROM progress WHERE item_id = ?")
            .bind(item_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(progress)
    }

    async fn upsert(&self, progress: &Progress) -> Result<()> {
        progress
            .validate()
            .map_err(|e| LibraryError::invalid("Progress", e))?;

        sqlx::query(
            r#"
            INSERT INTO progress (
                item_id, remote_progress_id, position_secs, time_listened, duration,
                fraction_complete, is_finished, last_played_at, last_updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                remote_progress_id = COALESCE(excluded.remote_progress_id, progress.remote_progress_id),
                position_secs = excluded.position_secs,
                time_listened = excluded.time_listened,
                duration = excluded.duration,
                fraction_complete = excluded.fraction_complete,
                is_finished = excluded.is_finished,
                last_played_at = excluded.last_played_at,
                last_updated_at = excluded.last_updated_at
            "#,
        )
        .bind(progress.item_id.as_str())
        .bind(&progress.remote_progress_id)
        .bind(progress.current_time)
        .bind(progress.time_listened)
        .bind(progress.duration)
        .bind(progress.fraction_complete)
        .bind(progress.is_finished)
        .bind(progress.last_played_at)
        .bind(progress.last_updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, item_id: &ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM progress WHERE item_id = ?")
            .bind(item_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
