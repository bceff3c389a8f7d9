//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the audiobook core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions, the configuration builder and the
//! event broadcasting used to report session, download and playback
//! activity to the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
