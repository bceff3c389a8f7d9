//! Domain models for audiobook playback
//!
//! Progress, sessions, items and per-track download state, with validation
//! and database mapping. Times are seconds (`f64`); timestamps are Unix
//! milliseconds.

use bridge_traits::session::BulkSessionRecord;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Positions this close to the end count as finished.
const FINISHED_TOLERANCE_SECS: f64 = 0.5;

// =============================================================================
// ID Types
// =============================================================================

/// Library item identifier assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can be used as a single directory name under the
    /// download root.
    ///
    /// Rejects empty ids, `.` and `..`, and ids carrying a path separator or
    /// NUL, so a hostile server id cannot escape the root.
    pub fn is_path_safe(&self) -> bool {
        let id = self.as_str();
        !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\', '\0'])
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Playback session identifier.
///
/// Server-issued for remote sessions, a random UUID for local-only ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh identifier for a local-only session.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Progress
// =============================================================================

/// Listening progress for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Progress {
    pub item_id: ItemId,
    /// Server-side progress record, unknown until the first session opens
    pub remote_progress_id: Option<String>,
    #[sqlx(rename = "position_secs")]
    pub current_time: f64,
    pub time_listened: f64,
    pub duration: f64,
    pub fraction_complete: f64,
    pub is_finished: bool,
    pub last_played_at: Option<i64>,
    pub last_updated_at: i64,
}

impl Progress {
    pub fn new(item_id: ItemId, duration: f64, now_millis: i64) -> Self {
        Self {
            item_id,
            remote_progress_id: None,
            current_time: 0.0,
            time_listened: 0.0,
            duration: duration.max(0.0),
            fraction_complete: 0.0,
            is_finished: false,
            last_played_at: None,
            last_updated_at: now_millis,
        }
    }

    /// Move the playback position, clamping it into the item and keeping the
    /// completed fraction consistent.
    pub fn set_position(&mut self, time: f64, now_millis: i64) {
        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };

        if self.duration > 0.0 {
            self.current_time = time.min(self.duration);
            self.fraction_complete = self.current_time / self.duration;
            if self.current_time >= self.duration - FINISHED_TOLERANCE_SECS {
                self.is_finished = true;
            }
        } else {
            self.current_time = time;
            self.fraction_complete = 0.0;
        }

        self.last_updated_at = now_millis;
    }

    /// Update the known duration and re-derive the fraction.
    pub fn set_duration(&mut self, duration: f64, now_millis: i64) {
        self.duration = duration.max(0.0);
        let current = self.current_time;
        self.set_position(current, now_millis);
    }

    pub fn add_listened(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.time_listened += seconds;
        }
    }

    pub fn mark_played(&mut self, now_millis: i64) {
        self.last_played_at = Some(now_millis);
        self.last_updated_at = now_millis;
    }

    /// Start the item over.
    pub fn reset(&mut self, now_millis: i64) {
        self.current_time = 0.0;
        self.time_listened = 0.0;
        self.fraction_complete = 0.0;
        self.is_finished = false;
        self.last_updated_at = now_millis;
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.item_id.as_str().trim().is_empty() {
            return Err("Progress item id cannot be empty".to_string());
        }

        if self.current_time < 0.0 || self.time_listened < 0.0 {
            return Err("Progress times cannot be negative".to_string());
        }

        if self.duration > 0.0 {
            if self.current_time > self.duration {
                return Err(format!(
                    "Position {} exceeds duration {}",
                    self.current_time, self.duration
                ));
            }
            let expected = self.current_time / self.duration;
            if (self.fraction_complete - expected).abs() > 1e-6 {
                return Err("Fraction complete does not match position".to_string());
            }
        }

        Ok(())
    }
}

// =============================================================================
// Playback Session
// =============================================================================

/// Lifecycle of a persisted session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Owned by the running session manager
    Open,
    /// Remote close failed; a retry is scheduled
    Closing,
    /// Detached from playback; waiting for a bulk sync
    Unsynced,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Closing => "closing",
            SessionStatus::Unsynced => "unsynced",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "closing" => Ok(SessionStatus::Closing),
            "unsynced" => Ok(SessionStatus::Unsynced),
            other => Err(format!("Unknown session status: {}", other)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side (or local-only) record of one listening period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub item_id: ItemId,
    /// `false` for local-only sessions created while offline
    pub is_remote: bool,
    pub status: SessionStatus,
    /// Position when the session opened
    pub start_time: f64,
    #[sqlx(rename = "position_secs")]
    pub current_time: f64,
    pub duration: f64,
    /// Listened seconds already reported to the server
    pub time_listening: f64,
    /// Listened seconds not yet reported
    pub pending_listening_time: f64,
    pub close_retry_count: i64,
    pub base_streaming_url: Option<String>,
    pub last_synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PlaybackSession {
    pub fn new_remote(
        id: SessionId,
        item_id: ItemId,
        start_time: f64,
        duration: f64,
        now_millis: i64,
    ) -> Self {
        Self {
            id,
            item_id,
            is_remote: true,
            status: SessionStatus::Open,
            start_time,
            current_time: start_time,
            duration,
            time_listening: 0.0,
            pending_listening_time: 0.0,
            close_retry_count: 0,
            base_streaming_url: None,
            last_synced_at: None,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }

    pub fn new_local(item_id: ItemId, start_time: f64, duration: f64, now_millis: i64) -> Self {
        Self {
            is_remote: false,
            ..Self::new_remote(SessionId::generate(), item_id, start_time, duration, now_millis)
        }
    }

    pub fn add_pending(&mut self, seconds: f64, now_millis: i64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.pending_listening_time += seconds;
        }
        self.updated_at = now_millis;
    }

    /// Fold pending time into the synced total after the server accepted it.
    pub fn commit_pending(&mut self, now_millis: i64) {
        self.time_listening += self.pending_listening_time;
        self.pending_listening_time = 0.0;
        self.last_synced_at = Some(now_millis);
        self.updated_at = now_millis;
    }

    pub fn total_listening_time(&self) -> f64 {
        self.time_listening + self.pending_listening_time
    }

    /// Retry count as used by the close backoff schedule.
    pub fn close_retries(&self) -> u32 {
        u32::try_from(self.close_retry_count.max(0)).unwrap_or(u32::MAX)
    }

    /// Summary for the batched upload endpoint, carrying the cumulative
    /// listened time.
    pub fn to_bulk_record(&self) -> BulkSessionRecord {
        BulkSessionRecord {
            session_id: self.id.to_string(),
            item_id: self.item_id.to_string(),
            duration: self.duration,
            start_time: self.start_time,
            current_time: self.current_time,
            time_listened: self.total_listening_time(),
            started_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// =============================================================================
// Library Item
// =============================================================================

/// Chapter marker, in item-global seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub start: f64,
    pub end: f64,
    pub title: String,
}

impl Chapter {
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Audiobook or podcast episode as cached on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: ItemId,
    pub title: String,
    pub duration: f64,
    pub chapters: Vec<Chapter>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl LibraryItem {
    pub fn chapter_at(&self, time: f64) -> Option<&Chapter> {
        self.chapters.iter().find(|chapter| chapter.contains(time))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.as_str().trim().is_empty() {
            return Err("Item id cannot be empty".to_string());
        }
        if !self.id.is_path_safe() {
            return Err(format!(
                "Item id '{}' cannot contain path separators or be '.' or '..'",
                self.id
            ));
        }
        if self.duration < 0.0 {
            return Err("Item duration cannot be negative".to_string());
        }
        if let Some(chapter) = self.chapters.iter().find(|c| c.end < c.start) {
            return Err(format!("Chapter {} ends before it starts", chapter.id));
        }
        Ok(())
    }
}

impl<'r> FromRow<'r, SqliteRow> for LibraryItem {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        let chapters_json: String = row.try_get("chapters_json")?;
        let chapters =
            serde_json::from_str(&chapters_json).map_err(|e| sqlx::Error::ColumnDecode {
                index: "chapters_json".to_string(),
                source: Box::new(e),
            })?;

        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            duration: row.try_get("duration")?,
            chapters,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// =============================================================================
// Tracks and download state
// =============================================================================

/// One audio file of an item plus its local download state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Track {
    pub item_id: ItemId,
    #[sqlx(rename = "track_index")]
    pub index: i64,
    pub start_offset: f64,
    pub duration: f64,
    pub size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub streaming_url: Option<String>,
    /// Path relative to the download root, set once the file is committed
    pub local_relative_path: Option<String>,
}

impl Track {
    /// Deterministic on-disk name: `{index}.{extension}`.
    pub fn file_name(&self) -> String {
        format!(
            "{}.{}",
            self.index,
            extension_for_mime(self.mime_type.as_deref())
        )
    }

    /// Name of the in-progress download next to the final file.
    pub fn staging_file_name(&self) -> String {
        format!("{}.part", self.file_name())
    }

    /// Path relative to the download root once committed.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.item_id, self.file_name())
    }

    pub fn is_marked_downloaded(&self) -> bool {
        self.local_relative_path.is_some()
    }

    /// Item-global time at which this track ends.
    pub fn end_offset(&self) -> f64 {
        self.start_offset + self.duration
    }
}

/// File extension for an audio MIME type, `audio` when unknown.
pub fn extension_for_mime(mime_type: Option<&str>) -> &'static str {
    let Some(mime) = mime_type else {
        return "audio";
    };

    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence.to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" | "audio/aac-mp4" => "m4a",
        "audio/x-m4b" | "audio/m4b" => "m4b",
        "audio/aac" | "audio/x-aac" => "aac",
        "audio/ogg" | "audio/vorbis" => "ogg",
        "audio/opus" => "opus",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/webm" => "webm",
        _ => "audio",
    }
}

/// Offline availability of an item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadState {
    NotDownloaded,
    Downloading { progress: f64 },
    Downloaded,
}

impl DownloadState {
    pub fn progress(&self) -> f64 {
        match self {
            DownloadState::NotDownloaded => 0.0,
            DownloadState::Downloading { progress } => *progress,
            DownloadState::Downloaded => 1.0,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, DownloadState::Downloading { .. })
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, DownloadState::Downloaded)
    }
}

impl Default for DownloadState {
    fn default() -> Self {
        DownloadState::NotDownloaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(index: i64, mime: Option<&str>) -> Track {
        Track {
            item_id: ItemId::from("li_1"),
            index,
            start_offset: 0.0,
            duration: 60.0,
            size_bytes: None,
            mime_type: mime.map(str::to_string),
            streaming_url: None,
            local_relative_path: None,
        }
    }

    #[test]
    fn test_progress_set_position_clamps_and_tracks_fraction() {
        let mut progress = Progress::new(ItemId::from("li_1"), 200.0, 0);

        progress.set_position(50.0, 1);
        assert_eq!(progress.current_time, 50.0);
        assert!((progress.fraction_complete - 0.25).abs() < 1e-9);
        assert!(!progress.is_finished);

        progress.set_position(-5.0, 2);
        assert_eq!(progress.current_time, 0.0);

        progress.set_position(500.0, 3);
        assert_eq!(progress.current_time, 200.0);
        assert_eq!(progress.fraction_complete, 1.0);
        assert!(progress.is_finished);
        assert!(progress.validate().is_ok());
    }

    #[test]
    fn test_progress_unknown_duration() {
        let mut progress = Progress::new(ItemId::from("li_1"), 0.0, 0);
        progress.set_position(42.0, 1);
        assert_eq!(progress.current_time, 42.0);
        assert_eq!(progress.fraction_complete, 0.0);

        progress.set_duration(84.0, 2);
        assert!((progress.fraction_complete - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_progress_reset() {
        let mut progress = Progress::new(ItemId::from("li_1"), 100.0, 0);
        progress.set_position(100.0, 1);
        progress.add_listened(30.0);
        progress.reset(2);

        assert_eq!(progress.current_time, 0.0);
        assert_eq!(progress.time_listened, 0.0);
        assert!(!progress.is_finished);
    }

    #[test]
    fn test_session_commit_pending() {
        let mut session =
            PlaybackSession::new_remote(SessionId::new("s1"), ItemId::from("li_1"), 10.0, 100.0, 0);
        session.add_pending(25.0, 1);
        session.add_pending(-3.0, 2);
        assert_eq!(session.pending_listening_time, 25.0);

        session.commit_pending(3);
        assert_eq!(session.time_listening, 25.0);
        assert_eq!(session.pending_listening_time, 0.0);
        assert_eq!(session.last_synced_at, Some(3));

        session.add_pending(5.0, 4);
        assert_eq!(session.total_listening_time(), 30.0);
        assert_eq!(session.to_bulk_record().time_listened, 30.0);
    }

    #[test]
    fn test_local_session_has_generated_id() {
        let a = PlaybackSession::new_local(ItemId::from("li_1"), 0.0, 10.0, 0);
        let b = PlaybackSession::new_local(ItemId::from("li_1"), 0.0, 10.0, 0);
        assert!(!a.is_remote);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_session_status_round_trip_strings() {
        for status in [
            SessionStatus::Open,
            SessionStatus::Closing,
            SessionStatus::Unsynced,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("gone".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_track_file_names() {
        assert_eq!(track(0, Some("audio/mpeg")).file_name(), "0.mp3");
        assert_eq!(track(3, Some("audio/mp4; codecs=mp4a")).file_name(), "3.m4a");
        assert_eq!(track(1, None).file_name(), "1.audio");
        assert_eq!(track(2, Some("audio/flac")).staging_file_name(), "2.flac.part");
        assert_eq!(track(2, Some("audio/flac")).relative_path(), "li_1/2.flac");
    }

    #[test]
    fn test_chapter_lookup() {
        let item = LibraryItem {
            id: ItemId::from("li_1"),
            title: "Book".to_string(),
            duration: 300.0,
            chapters: vec![
                Chapter { id: 0, start: 0.0, end: 100.0, title: "One".into() },
                Chapter { id: 1, start: 100.0, end: 300.0, title: "Two".into() },
            ],
            created_at: 0,
            updated_at: 0,
        };

        assert_eq!(item.chapter_at(100.0).map(|c| c.id), Some(1));
        assert_eq!(item.chapter_at(99.9).map(|c| c.id), Some(0));
        assert!(item.chapter_at(300.0).is_none());
    }

    #[test]
    fn test_item_id_path_safety() {
        assert!(ItemId::from("li_1").is_path_safe());
        assert!(ItemId::from("a..b").is_path_safe());

        for unsafe_id in ["", ".", "..", "../etc", "/abs", "li/1", "li\\1", "li\01"] {
            assert!(!ItemId::from(unsafe_id).is_path_safe(), "{unsafe_id:?}");
        }

        let item = LibraryItem {
            id: ItemId::from("../outside"),
            title: "Book".to_string(),
            duration: 10.0,
            chapters: Vec::new(),
            created_at: 0,
            updated_at: 0,
        };
        assert!(item.validate().unwrap_err().contains("path separators"));
    }

    #[test]
    fn test_download_state_progress() {
        assert_eq!(DownloadState::NotDownloaded.progress(), 0.0);
        assert_eq!(DownloadState::Downloading { progress: 0.4 }.progress(), 0.4);
        assert_eq!(DownloadState::Downloaded.progress(), 1.0);
        assert!(DownloadState::Downloading { progress: 0.0 }.is_active());
        assert!(!DownloadState::Downloaded.is_active());
    }
}
