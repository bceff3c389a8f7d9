//! # Player Configuration
//!
//! Settings for the player controller: stream recovery, smart rewind and
//! the headers sent with remote streams.

use crate::error::{PlaybackError, Result};
use crate::recovery::RecoveryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Player controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Stream failure recovery budget and backoff.
    #[serde(skip, default)]
    pub recovery: RecoveryConfig,

    /// How far to jump back on resume.
    ///
    /// Default: 30 seconds. Zero disables smart rewind.
    #[serde(default = "default_rewind_interval")]
    pub rewind_interval: Duration,

    /// Pause length after which resuming rewinds.
    ///
    /// Default: 10 minutes.
    #[serde(default = "default_rewind_after_inactivity")]
    pub rewind_after_inactivity: Duration,

    /// Headers the host must send when fetching remote streams.
    #[serde(default)]
    pub stream_headers: HashMap<String, String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            recovery: RecoveryConfig::default(),
            rewind_interval: default_rewind_interval(),
            rewind_after_inactivity: default_rewind_after_inactivity(),
            stream_headers: HashMap::new(),
        }
    }
}

impl ControllerConfig {
    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_rewind_interval(mut self, interval: Duration) -> Self {
        self.rewind_interval = interval;
        self
    }

    pub fn with_rewind_after_inactivity(mut self, threshold: Duration) -> Self {
        self.rewind_after_inactivity = threshold;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.stream_headers
            .insert("Authorization".to_string(), format!("Bearer {}", token.into()));
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.recovery.validate()?;
        if self.rewind_after_inactivity.is_zero() {
            return Err(PlaybackError::InvalidConfig(
                "rewind_after_inactivity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_rewind_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_rewind_after_inactivity() -> Duration {
    Duration::from_secs(600)
}
