//! # Offline Downloads
//!
//! Per-item downloads into a local directory with byte-level progress,
//! cancellation and cleanup of partial or orphaned files.

pub mod config;
pub mod engine;
pub mod progress;
pub mod sweep;

pub use config::DownloadConfig;
pub use engine::DownloadEngine;
pub use progress::{ProgressTracker, MAX_UNCOMMITTED_PROGRESS};
pub use sweep::SweepReport;
