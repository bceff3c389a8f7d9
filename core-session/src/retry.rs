//! Close retry schedule
//!
//! A failed remote close is retried on a fixed, increasing schedule. The
//! server expires idle sessions after about a day, so once the schedule runs
//! out the session is dropped locally.

use std::time::Duration;

/// Delays in seconds between consecutive close attempts.
pub const DEFAULT_CLOSE_RETRY_DELAYS_SECS: [u64; 8] =
    [600, 1800, 3600, 7200, 14400, 14400, 14400, 14400];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRetryPolicy {
    delays: Vec<Duration>,
}

impl CloseRetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Delay before retry number `retry_count + 1`, or `None` once every
    /// scheduled retry has been used.
    pub fn next_delay(&self, retry_count: u32) -> Option<Duration> {
        self.delays.get(retry_count as usize).copied()
    }

    pub fn max_retries(&self) -> u32 {
        u32::try_from(self.delays.len()).unwrap_or(u32::MAX)
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for CloseRetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_CLOSE_RETRY_DELAYS_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        )
    }
}
