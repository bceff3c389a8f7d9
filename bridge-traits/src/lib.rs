//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the audiobook core and the
//! platform it runs on. Each trait represents a capability the core requires
//! but that is implemented differently per host (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Request/response calls and streaming downloads
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Staging and committing media files
//! - [`RemoteSessionClient`](session::RemoteSessionClient) - Library server play sessions
//!
//! ### Platform Integration
//! - [`BackgroundExecutor`](background::BackgroundExecutor) - One-shot cancellable jobs
//! - [`MediaPipeline`](playback::MediaPipeline) - Host audio engine
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ In Progress |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError`
//! and report missing remote resources as `BridgeError::NotFound`; the
//! session manager relies on that to detect expired sessions.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so they can be shared as
//! `Arc<dyn Trait>` across async tasks.

pub mod background;
pub mod error;
pub mod http;
pub mod playback;
pub mod session;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{deferred_job, BackgroundExecutor, DeferredJob, TaskId, TaskStatus};
pub use http::{DownloadStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use playback::{AudioSource, MediaPipeline, QueuedTrack};
pub use session::{
    BulkSessionRecord, RemoteChapter, RemoteSessionClient, RemoteTrack, StartedSession,
};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
