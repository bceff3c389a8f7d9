//! Track repository trait and implementation
//!
//! Tracks carry the item's streaming metadata and, once downloaded, the path
//! of the local file relative to the download root.

use crate::error::{LibraryError, Result};
use crate::models::{ItemId, Track};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

/// Track interface for data access operations
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Tracks of an item ordered by index
    async fn list_for_item(&self, item_id: &ItemId) -> Result<Vec<Track>>;

    /// Replace the track list of each item present in `tracks`, in one
    /// transaction
    ///
    /// Tracks of those items whose index is missing from the new list are
    /// removed. A stored local path survives a refresh that does not carry one.
    async fn upsert_many(&self, tracks: &[Track]) -> Result<()>;

    /// Record local paths for downloaded tracks
    ///
    /// All paths are written in one transaction. Nothing is written if any
    /// `(index, path)` pair does not match an existing track.
    async fn set_local_paths(&self, item_id: &ItemId, paths: &[(i64, String)]) -> Result<()>;

    /// Forget every local path of an item
    async fn clear_local_paths(&self, item_id: &ItemId) -> Result<u64>;

    /// Forget the local path of a single track
    async fn clear_local_path(&self, item_id: &ItemId, index: i64) -> Result<bool>;

    /// Items with at least one committed local file
    async fn list_downloaded_item_ids(&self) -> Result<Vec<ItemId>>;
}

/// SQLite implementation of TrackRepository
pub struct SqliteTrackRepository {
    pool: SqlitePool,
}

impl SqliteTrackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn list_for_item(&self, item_id: &ItemId) -> Result<Vec<Track>> {
        let tracks = sqlx::query_as::<_, Track>(
            "SELECT * FROM tracks WHERE item_id = ? ORDER BY track_index ASC",
        )
        .bind(item_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(tracks)
    }

    async fn upsert_many(&self, tracks: &[Track]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let mut indices_by_item: HashMap<&ItemId, Vec<i64>> = HashMap::new();

        for track in tracks {
            if track.index < 0 {
                return Err(LibraryError::invalid(
                    "Track",
                    format!("negative index {}", track.index),
                ));
            }

            sqlx::query(
                r#"
                INSERT INTO tracks (
                    item_id, track_index, start_offset, duration, size_bytes,
                    mime_type, streaming_url, local_relative_path
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(item_id, track_index) DO UPDATE SET
                    start_offset = excluded.start_offset,
                    duration = excluded.duration,
                    size_bytes = excluded.size_bytes,
                    mime_type = excluded.mime_type,
                    streaming_url = excluded.streaming_url,
                    local_relative_path = COALESCE(excluded.local_relative_path, tracks.local_relative_path)
                "#,
            )
            .bind(track.item_id.as_str())
            .bind(track.index)
            .bind(track.start_offset)
            .bind(track.duration)
            .bind(track.size_bytes)
            .bind(&track.mime_type)
            .bind(&track.streaming_url)
            .bind(&track.local_relative_path)
            .execute(&mut *tx)
            .await?;

            indices_by_item.entry(&track.item_id).or_default().push(track.index);
        }

        for (item_id, indices) in indices_by_item {
            let mut stale: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM tracks WHERE item_id = ");
            stale.push_bind(item_id.as_str());
            stale.push(" AND track_index NOT IN (");
            let mut separated = stale.separated(", ");
            for index in indices {
                separated.push_bind(index);
            }
            separated.push_unseparated(")");
            stale.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_local_paths(&self, item_id: &ItemId, paths: &[(i64, String)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (index, path) in paths {
            let result = sqlx::query(
                "UPDATE tracks SET local_relative_path = ? WHERE item_id = ? AND track_index = ?",
            )
            .bind(path)
            .bind(item_id.as_str())
            .bind(index)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back earlier updates
                return Err(LibraryError::NotFound {
                    entity: "Track",
                    id: format!("{}#{}", item_id, index),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear_local_paths(&self, item_id: &ItemId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tracks SET local_relative_path = NULL WHERE item_id = ? AND local_relative_path IS NOT NULL",
        )
        .bind(item_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn clear_local_path(&self, item_id: &ItemId, index: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tracks SET local_relative_path = NULL WHERE item_id = ? AND track_index = ? AND local_relative_path IS NOT NULL",
        )
        .bind(item_id.as_str())
        .bind(index)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_downloaded_item_ids(&self) -> Result<Vec<ItemId>> {
        let ids = sqlx::query_scalar::<_, ItemId>(
            "SELECT DISTINCT item_id FROM tracks WHERE local_relative_path IS NOT NULL ORDER BY item_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
