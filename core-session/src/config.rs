//! Session manager configuration

use crate::error::{Result, SessionError};
use crate::retry::CloseRetryPolicy;
use std::time::Duration;

pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(600);
/// Pending listened time required before a sync goes out.
pub const DEFAULT_MIN_PENDING_SYNC: Duration = Duration::from_secs(20);
/// Minimum spacing between two successful syncs.
pub const DEFAULT_MIN_SYNC_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which an open session is closed
    pub inactivity_timeout: Duration,
    pub min_pending_sync: Duration,
    pub min_sync_interval: Duration,
    pub close_retry: CloseRetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            min_pending_sync: DEFAULT_MIN_PENDING_SYNC,
            min_sync_interval: DEFAULT_MIN_SYNC_INTERVAL,
            close_retry: CloseRetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn with_min_pending_sync(mut self, pending: Duration) -> Self {
        self.min_pending_sync = pending;
        self
    }

    pub fn with_min_sync_interval(mut self, interval: Duration) -> Self {
        self.min_sync_interval = interval;
        self
    }

    pub fn with_close_retry(mut self, policy: CloseRetryPolicy) -> Self {
        self.close_retry = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.inactivity_timeout.is_zero() {
            return Err(SessionError::InvalidConfig(
                "inactivity_timeout must be greater than zero".to_string(),
            ));
        }
        if self.close_retry.delays().iter().any(Duration::is_zero) {
            return Err(SessionError::InvalidConfig(
                "close retry delays must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
