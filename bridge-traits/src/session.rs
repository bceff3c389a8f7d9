//! Remote Playback Session Contract
//!
//! The library server tracks "play sessions": it hands out streaming URLs and
//! chapters when playback starts, receives periodic listened-time reports and
//! auto-expires idle sessions after roughly a day. The wire format belongs to
//! the server; the core only depends on this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Chapter boundaries reported by the server, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChapter {
    pub id: i64,
    pub start: f64,
    pub end: f64,
    pub title: String,
}

/// One audio file of an item as announced at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub index: u32,
    pub start_offset: f64,
    pub duration: f64,
    /// Absolute URL valid for the lifetime of the session.
    pub content_url: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
}

/// Result of opening a play session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: String,
    pub item_id: String,
    pub title: String,
    /// Position the server believes the listener is at.
    pub current_time: f64,
    pub duration: f64,
    pub chapters: Vec<RemoteChapter>,
    pub tracks: Vec<RemoteTrack>,
    /// Server-side progress record id, when one exists.
    pub progress_id: Option<String>,
    pub base_streaming_url: Option<String>,
}

/// Session summary uploaded by the batched "local sessions" endpoint.
///
/// `time_listened` is the cumulative total for the session; the server
/// computes the delta against what it already recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSessionRecord {
    pub session_id: String,
    pub item_id: String,
    pub duration: f64,
    pub start_time: f64,
    pub current_time: f64,
    pub time_listened: f64,
    /// Unix milliseconds
    pub started_at: i64,
    /// Unix milliseconds
    pub updated_at: i64,
}

/// Remote session client
///
/// Failures use [`BridgeError`](crate::BridgeError); an expired or unknown
/// session must be reported as `BridgeError::NotFound` so callers can
/// distinguish it from transient failures.
#[async_trait]
pub trait RemoteSessionClient: Send + Sync {
    /// Open a session for an item.
    async fn start_session(&self, item_id: &str) -> Result<StartedSession>;

    /// Report listened time accrued since the previous sync.
    async fn sync_session(
        &self,
        session_id: &str,
        time_listened: f64,
        current_time: f64,
    ) -> Result<()>;

    /// Close a session.
    async fn close_session(&self, session_id: &str) -> Result<()>;

    /// Upload sessions recorded while offline (or never closed) in one call.
    async fn bulk_sync_sessions(&self, sessions: Vec<BulkSessionRecord>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_record_serializes_camel_case() {
        let record = BulkSessionRecord {
            session_id: "s1".to_string(),
            item_id: "b1".to_string(),
            duration: 3600.0,
            start_time: 120.0,
            current_time: 155.0,
            time_listened: 35.0,
            started_at: 1_000,
            updated_at: 2_000,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["timeListened"], 35.0);
        assert_eq!(json["startedAt"], 1_000);
    }
}
