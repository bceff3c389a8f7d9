//! Stream failure recovery policy.

use crate::error::{PlaybackError, Result};
use std::time::Duration;

/// How often and how patiently a stalled stream is re-established.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// Consecutive failures handled before giving up (default: 3)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RecoveryConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Wait before the given attempt (1-based): `min(base * 2^(n-1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(PlaybackError::InvalidConfig(
                "recovery max_attempts must be at least 1".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(PlaybackError::InvalidConfig(
                "recovery base_delay cannot exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of reporting a stream failure to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// A fresh session was opened and the pipeline reloaded
    Recovered { attempt: u32 },
    /// The reload attempt failed; the next failure counts against the budget
    Failed { attempt: u32 },
    /// Another recovery is already running
    AlreadyRecovering,
    /// Attempts are used up; the pipeline was released
    Exhausted,
    /// The item plays from local files; the failure was surfaced as is
    LocalFailure,
    /// Playback was torn down during the backoff wait
    Cancelled,
    NothingPlaying,
}

impl RecoveryOutcome {
    /// Playback is over and needs user action.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecoveryOutcome::Exhausted | RecoveryOutcome::LocalFailure)
    }
}
