//! # Playback Session Module
//!
//! Keeps one playback session per process consistent with the library server
//! under unreliable connectivity.
//!
//! ## Components
//!
//! - **Session Manager** (`manager`): open, reuse, sync and close sessions;
//!   local-only fallback for downloaded items; start-up bulk sync
//! - **Close Retry Policy** (`retry`): fixed backoff schedule for failed closes
//! - **Remote Client** (`remote`): `RemoteSessionClient` over the host HTTP client

pub mod config;
pub mod error;
pub mod manager;
pub mod remote;
pub mod retry;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use manager::{
    OfflineAvailability, PlayableItem, SessionManager, SessionStores, SyncOutcome,
};
pub use remote::HttpRemoteSessionClient;
pub use retry::CloseRetryPolicy;
