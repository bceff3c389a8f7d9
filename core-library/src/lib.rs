//! # Library Storage Module
//!
//! Owns the local SQLite database for audiobook items, their tracks, listening
//! progress and playback sessions.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pool and embedded migrations
//! - Domain models shared by the session, download and playback layers
//! - Repository traits with SQLite implementations

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{
    Chapter, DownloadState, ItemId, LibraryItem, PlaybackSession, Progress, SessionId,
    SessionStatus, Track,
};
