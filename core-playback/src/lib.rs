//! # Playback & Downloads Module
//!
//! Drives audiobook playback on the host media pipeline and keeps items
//! available offline.
//!
//! ## Overview
//!
//! This module handles:
//! - Offline downloads with a bounded queue, byte progress, cancellation and
//!   orphan cleanup (`download`)
//! - The player controller: session-backed playback, stream failure
//!   recovery and progress ticks (`controller`)
//! - Smart rewind on resume (`rewind`)

pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod recovery;
pub mod rewind;

pub use config::ControllerConfig;
pub use controller::PlayerController;
pub use download::{DownloadConfig, DownloadEngine, SweepReport};
pub use error::{PlaybackError, Result};
pub use recovery::{RecoveryConfig, RecoveryOutcome};
pub use rewind::{should_rewind, smart_rewind_position};
