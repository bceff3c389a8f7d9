//! # Local Store
//!
//! Opens the SQLite database that holds library items, tracks, progress and
//! playback sessions. The pool runs in WAL mode with foreign keys enforced,
//! and the embedded migrations under `migrations/` are applied on open.
//!
//! ```rust,ignore
//! use core_library::db::{DatabaseConfig, create_pool};
//!
//! let pool = create_pool(DatabaseConfig::new("/data/audioshelf/core.db")).await?;
//! ```

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    /// Private to a single connection; used by tests.
    Memory,
}

/// Pool settings for the local store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: StoreLocation,
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(database_path: impl AsRef<Path>) -> Self {
        Self {
            location: StoreLocation::File(database_path.as_ref().to_path_buf()),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// An in-memory store pinned to one connection, since every connection
    /// to `:memory:` sees its own database.
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.location {
            StoreLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            StoreLocation::Memory => {
                SqliteConnectOptions::new().in_memory(true).journal_mode(SqliteJournalMode::Memory)
            }
        };

        options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
    }
}

/// Open the store and bring its schema up to date.
#[tracing::instrument(skip(config), fields(location = ?config.location))]
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout);
    if config.location == StoreLocation::Memory {
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to open local store");
            LibraryError::Database(e)
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| LibraryError::Migration(e.to_string()))?;
    debug!("Migrations applied");

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    info!(connections = pool.size(), "Local store ready");
    Ok(pool)
}

/// In-memory store with the schema applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config() {
        let config = DatabaseConfig::new("/data/audioshelf/core.db")
            .with_max_connections(2)
            .with_busy_timeout(Duration::from_secs(1));

        assert_eq!(
            config.location,
            StoreLocation::File(PathBuf::from("/data/audioshelf/core.db"))
        );
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert_eq!(DatabaseConfig::in_memory().max_connections, 1);
    }

    #[tokio::test]
    async fn test_schema_and_pragmas() {
        let pool = create_test_pool().await.unwrap();

        let (foreign_keys,): (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);

        for table in ["library_items", "tracks", "progress", "playback_sessions"] {
            let (count,): (i32,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn test_file_store_is_created_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.db");

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        pool.close().await;
        assert!(path.exists());

        // Migrations are already applied on the second open
        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
