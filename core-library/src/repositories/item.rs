//! Library item repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{ItemId, LibraryItem};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Library item interface for data access operations
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Find an item by ID
    ///
    /// # Returns
    /// - `Ok(Some(item))` if found
    /// - `Ok(None)` if not found
    async fn get(&self, id: &ItemId) -> Result<Option<LibraryItem>>;

    /// Insert the item or replace the stored copy
    async fn upsert(&self, item: &LibraryItem) -> Result<()>;

    /// Delete an item and, through the foreign key, its tracks
    ///
    /// # Returns
    /// `Ok(true)` if a row was removed
    async fn delete(&self, id: &ItemId) -> Result<bool>;

    async fn list_ids(&self) -> Result<Vec<ItemId>>;
}

/// SQLite implementation of ItemRepository
pub struct SqliteItemRepository {
    pool: SqlitePool,
}

impl SqliteItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn get(&self, id: &ItemId) -> Result<Option<LibraryItem>> {
        let item = sqlx::query_as::<_, LibraryItem>("SELECT * FROM library_items WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn upsert(&self, item: &LibraryItem) -> Result<()> {
        item.validate()
            .map_err(|e| LibraryError::invalid("LibraryItem", e))?;

        let chapters_json = serde_json::to_string(&item.chapters)?;

        sqlx::query(
            r#"
            INSERT INTO library_items (id, title, duration, chapters_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                duration = excluded.duration,
                chapters_json = excluded.chapters_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.id.as_str())
        .bind(&item.title)
        .bind(item.duration)
        .bind(chapters_json)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM library_items WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self) -> Result<Vec<ItemId>> {
        let ids = sqlx::query_scalar::<_, ItemId>("SELECT id FROM library_items ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }
}
