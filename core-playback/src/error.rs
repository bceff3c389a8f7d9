//! # Playback Error Types
//!
//! Errors raised by the download engine and the player controller.

use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use core_session::SessionError;
use thiserror::Error;

/// Errors that can occur during download and playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Download Errors
    // ========================================================================
    /// A download operation failed; partial files were discarded.
    #[error("Download failed: {0}")]
    Download(String),

    /// The download was cancelled before it committed.
    #[error("Download of item {item_id} was cancelled")]
    DownloadCancelled { item_id: String },

    /// The item id cannot name a directory under the download root.
    #[error("Item id '{0}' is not usable as a download directory name")]
    UnsafeItemId(String),

    /// No track of the item can be streamed or read locally.
    #[error("No playable source for item {item_id}")]
    NoSources { item_id: String },

    // ========================================================================
    // Session & Storage Errors
    // ========================================================================
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// HTTP or file system bridge failure.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Playback Control Errors
    // ========================================================================
    /// The host media pipeline rejected a command.
    #[error("Media pipeline error: {0}")]
    Pipeline(BridgeError),

    /// Stream recovery gave up after the configured number of attempts.
    #[error("Stream recovery exhausted after {attempts} attempts")]
    RecoveryExhausted { attempts: u32 },

    /// A downloaded item failed to play; not recoverable over the network.
    #[error("Local playback failed: {0}")]
    LocalPlaybackFailed(String),

    #[error("Nothing is playing")]
    NothingPlaying,

    /// The operation was interrupted by teardown.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PlaybackError {
    /// Returns `true` if a later attempt may succeed without user action.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::Session(e) => e.is_transient(),
            PlaybackError::Bridge(e) | PlaybackError::Pipeline(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Cancellation is expected and never reported as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            PlaybackError::DownloadCancelled { .. } | PlaybackError::Cancelled
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
