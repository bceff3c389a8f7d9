//! Download engine configuration

use crate::error::{PlaybackError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Bytes read from the network per write to the staging file.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Configuration for the [`DownloadEngine`](super::DownloadEngine).
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory holding one sub-directory per downloaded item
    pub download_root: PathBuf,

    /// Number of items downloaded at the same time (default: 1)
    pub max_concurrent_downloads: usize,

    pub chunk_size: usize,

    /// Headers sent with every media request, e.g. authorization
    pub request_headers: HashMap<String, String>,
}

impl DownloadConfig {
    pub fn new(download_root: impl Into<PathBuf>) -> Self {
        Self {
            download_root: download_root.into(),
            max_concurrent_downloads: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_headers: HashMap::new(),
        }
    }

    pub fn with_max_concurrent_downloads(mut self, count: usize) -> Self {
        self.max_concurrent_downloads = count;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_request_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.insert(key.into(), value.into());
        self
    }

    /// Authorize media requests with a bearer token.
    pub fn with_bearer_token(self, token: impl Into<String>) -> Self {
        self.with_request_header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.download_root.as_os_str().is_empty() {
            return Err(PlaybackError::InvalidConfig(
                "download_root cannot be empty".to_string(),
            ));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(PlaybackError::InvalidConfig(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(PlaybackError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
