//! Playback session repository trait and implementation
//!
//! Sessions are persisted while open so that listening time survives a crash,
//! and kept afterwards until the server has accepted them.

use crate::error::Result;
use crate::models::{ItemId, PlaybackSession, SessionId, SessionStatus};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Playback session interface for data access operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, id: &SessionId) -> Result<Option<PlaybackSession>>;

    /// Most recently updated open session for an item
    async fn find_open(&self, item_id: &ItemId) -> Result<Option<PlaybackSession>>;

    async fn upsert(&self, session: &PlaybackSession) -> Result<()>;

    async fn delete(&self, id: &SessionId) -> Result<bool>;

    /// Sessions in `status`, oldest first
    async fn list_by_status(&self, status: SessionStatus) -> Result<Vec<PlaybackSession>>;

    async fn list_all(&self) -> Result<Vec<PlaybackSession>>;
}

/// SQLite implementation of SessionRepository
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn get(&self, id: &SessionId) -> Result<Option<PlaybackSession>> {
        let session =
            sqlx::query_as::<_, PlaybackSession>("SELECT * FROM playback_sessions WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(session)
    }

    async fn find_open(&self, item_id: &ItemId) -> Result<Option<PlaybackSession>> {
        let session = sqlx::query_as::<_, PlaybackSession>(
            r#"
            SELECT * FROM playback_sessions
            WHERE item_id = ? AND status = 'open'
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn upsert(&self, session: &PlaybackSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO playback_sessions (
                id, item_id, is_remote, status, start_time, position_secs, duration,
                time_listening, pending_listening_time, close_retry_count,
                base_streaming_url, last_synced_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                position_secs = excluded.position_secs,
                duration = excluded.duration,
                time_listening = excluded.time_listening,
                pending_listening_time = excluded.pending_listening_time,
                close_retry_count = excluded.close_retry_count,
                base_streaming_url = excluded.base_streaming_url,
                last_synced_at = excluded.last_synced_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session.id.as_str())
        .bind(session.item_id.as_str())
        .bind(session.is_remote)
        .bind(session.status.as_str())
        .bind(session.start_time)
        .bind(session.current_time)
        .bind(session.duration)
        .bind(session.time_listening)
        .bind(session.pending_listening_time)
        .bind(session.close_retry_count)
        .bind(&session.base_streaming_url)
        .bind(session.last_synced_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM playback_sessions WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_status(&self, status: SessionStatus) -> Result<Vec<PlaybackSession>> {
        let sessions = sqlx::query_as::<_, PlaybackSession>(
            "SELECT * FROM playback_sessions WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn list_all(&self) -> Result<Vec<PlaybackSession>> {
        let sessions = sqlx::query_as::<_, PlaybackSession>(
            "SELECT * FROM playback_sessions ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    fn remote(id: &str, item: &str, created_at: i64) -> PlaybackSession {
        PlaybackSession::new_remote(
            SessionId::new(id),
            ItemId::from(item),
            12.0,
            600.0,
            created_at,
        )
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSessionRepository::new(pool);

        let mut session = remote("s1", "li_1", 10);
        session.add_pending(21.5, 11);
        session.base_streaming_url = Some("https://abs.local/s1".to_string());
        repo.upsert(&session).await.unwrap();

        let stored = repo.get(&session.id).await.unwrap().unwrap();
        assert_eq!(stored, session);
    }

    #[tokio::test]
    async fn test_find_open_ignores_other_statuses() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSessionRepository::new(pool);

        let mut closing = remote("s1", "li_1", 10);
        closing.status = SessionStatus::Closing;
        repo.upsert(&closing).await.unwrap();
        assert!(repo.find_open(&ItemId::from("li_1")).await.unwrap().is_none());

        let open = remote("s2", "li_1", 20);
        repo.upsert(&open).await.unwrap();
        let found = repo.find_open(&ItemId::from("li_1")).await.unwrap().unwrap();
        assert_eq!(found.id, open.id);
    }

    #[tokio::test]
    async fn test_list_by_status_and_delete() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSessionRepository::new(pool);

        let mut a = PlaybackSession::new_local(ItemId::from("li_1"), 0.0, 100.0, 30);
        a.status = SessionStatus::Unsynced;
        let mut b = remote("s2", "li_2", 10);
        b.status = SessionStatus::Unsynced;
        repo.upsert(&a).await.unwrap();
        repo.upsert(&b).await.unwrap();
        repo.upsert(&remote("s3", "li_3", 5)).await.unwrap();

        let unsynced = repo.list_by_status(SessionStatus::Unsynced).await.unwrap();
        let ids: Vec<&SessionId> = unsynced.iter().map(|s| &s.id).collect();
        assert_eq!(ids, vec![&b.id, &a.id]);
        assert_eq!(repo.list_all().await.unwrap().len(), 3);

        assert!(repo.delete(&b.id).await.unwrap());
        assert_eq!(
            repo.list_by_status(SessionStatus::Unsynced).await.unwrap().len(),
            1
        );
    }
}
