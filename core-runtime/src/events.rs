//! # Event Bus System
//!
//! Typed events broadcast over `tokio::sync::broadcast` so hosts can observe
//! listening sessions, downloads and playback without polling.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Session Manager ├─────────>│           ├────────────>│ Host UI    │
//! └─────────────────┘          │ EventBus  │             └────────────┘
//! ┌─────────────────┐   emit   │ (broadcast│  subscribe  ┌────────────┐
//! │ Download Engine ├─────────>│  channel) ├────────────>│ Host media │
//! └─────────────────┘          │           │             │ controls   │
//! ┌─────────────────┐   emit   │           │             └────────────┘
//! │Player Controller├─────────>│           │
//! └─────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut downloads =
//!     EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Download(_)));
//!
//! bus.emit(CoreEvent::Download(DownloadEvent::Queued {
//!     item_id: "li_1".to_string(),
//! }))
//! .ok();
//!
//! let event = downloads.recv().await.unwrap();
//! assert_eq!(event.description(), "Download queued");
//! # }
//! ```
//!
//! Emitting with no subscribers returns an error; producers call `.ok()` on
//! the result and carry on.
//!
//! Subscribers that fall behind receive `RecvError::Lagged(n)` and keep
//! receiving newer events. `RecvError::Closed` means every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Session(SessionEvent),
    Download(DownloadEvent),
    Playback(PlaybackEvent),
}

impl CoreEvent {
    /// Short human-readable description.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Session(SessionEvent::Abandoned { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error {
                recoverable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Warning,
            CoreEvent::Session(SessionEvent::Expired { .. }) => EventSeverity::Warning,
            CoreEvent::Session(SessionEvent::CloseRetryScheduled { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Playback(PlaybackEvent::Reconnecting { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::Opened { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::Closed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Session Events
// ============================================================================

/// Listening session lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A session became the active one.
    Opened {
        session_id: String,
        item_id: String,
        /// `false` for local-only sessions of downloaded items
        is_remote: bool,
    },
    /// Pending listened time was reported to the server.
    Synced {
        session_id: String,
        time_listened: f64,
        current_time: f64,
    },
    /// The server no longer knows the session.
    Expired { session_id: String, item_id: String },
    Closed { session_id: String },
    /// A close attempt failed and another one is scheduled.
    CloseRetryScheduled {
        session_id: String,
        attempt: u32,
        delay_secs: u64,
    },
    /// Close retries are exhausted; the session is dropped.
    Abandoned { session_id: String },
    /// Leftover sessions were uploaded in one batch.
    BulkSynced { count: usize },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::Opened { .. } => "Session opened",
            SessionEvent::Synced { .. } => "Session progress synced",
            SessionEvent::Expired { .. } => "Session expired on server",
            SessionEvent::Closed { .. } => "Session closed",
            SessionEvent::CloseRetryScheduled { .. } => "Session close retry scheduled",
            SessionEvent::Abandoned { .. } => "Session close abandoned",
            SessionEvent::BulkSynced { .. } => "Unsynced sessions uploaded",
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

/// Offline download lifecycle for a library item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    Queued { item_id: String },
    /// Fraction in `0.0..=1.0`, never decreasing for a given download.
    Progress { item_id: String, progress: f64 },
    Completed { item_id: String },
    Failed { item_id: String, message: String },
    Cancelled { item_id: String },
    Deleted { item_id: String },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Queued { .. } => "Download queued",
            DownloadEvent::Progress { .. } => "Download in progress",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
            DownloadEvent::Deleted { .. } => "Download deleted",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    Started { item_id: String, position: f64 },
    Paused { item_id: String, position: f64 },
    Stopped { item_id: String },
    /// Stream recovery attempt scheduled after a stall.
    Reconnecting {
        item_id: String,
        attempt: u32,
        delay_secs: u64,
    },
    Recovered { item_id: String },
    Error {
        item_id: Option<String>,
        message: String,
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Reconnecting { .. } => "Reconnecting stream",
            PlaybackEvent::Recovered { .. } => "Stream recovered",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received it, or an error when
    /// nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver with an optional predicate applied before events are returned.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Wait for the next matching event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
