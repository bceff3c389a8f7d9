//! # Core Configuration Module
//!
//! Provides configuration management for the audiobook core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding every host bridge and tunable the core needs. It fails fast with
//! actionable messages when a required value or capability is missing.
//!
//! ## Required Values
//!
//! - `database_path` - SQLite file for progress, sessions and track state
//! - `download_root` - Directory that holds one sub-directory per downloaded item
//! - `server_url` (+ `api_token`) or an injected `RemoteSessionClient`
//!
//! ## Bridges (with desktop defaults)
//!
//! - `HttpClient` - API calls and media downloads (desktop: reqwest)
//! - `FileSystemAccess` - Download staging (desktop: tokio fs)
//! - `BackgroundExecutor` - Inactivity close and close retries (desktop: tokio tasks)
//! - `Clock` - Defaults to `SystemClock` everywhere
//! - `MediaPipeline` - Optional; without it the player controller is not built
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected for the bridges that were not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/audioshelf/core.db")
//!     .download_root("/data/audioshelf/downloads")
//!     .server_url("https://books.example.com")
//!     .api_token("secret")
//!     .max_concurrent_downloads(2)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    BackgroundExecutor, Clock, FileSystemAccess, HttpClient, MediaPipeline, RemoteSessionClient,
    SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of simultaneous item downloads.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 1;
/// Idle time after which an open session is closed.
pub const DEFAULT_SESSION_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(600);
/// How far playback jumps back after a long pause.
pub const DEFAULT_SMART_REWIND_INTERVAL: Duration = Duration::from_secs(30);
/// Stream recovery attempts before playback fails.
pub const DEFAULT_RECOVERY_MAX_ATTEMPTS: u32 = 3;

/// Core configuration
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Root directory for downloaded items
    pub download_root: PathBuf,

    /// Base URL of the library server
    pub server_url: Option<String>,

    /// Bearer token for the library server
    pub api_token: Option<String>,

    /// Custom remote session client; takes precedence over `server_url`
    pub remote_session_client: Option<Arc<dyn RemoteSessionClient>>,

    pub http_client: Arc<dyn HttpClient>,

    pub file_system: Arc<dyn FileSystemAccess>,

    pub background_executor: Arc<dyn BackgroundExecutor>,

    pub clock: Arc<dyn Clock>,

    /// Host audio engine, if playback is driven by the core
    pub media_pipeline: Option<Arc<dyn MediaPipeline>>,

    pub max_concurrent_downloads: usize,

    pub session_inactivity_timeout: Duration,

    pub smart_rewind_interval: Duration,

    pub recovery_max_attempts: u32,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("download_root", &self.download_root)
            .field("server_url", &self.server_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "remote_session_client",
                &self
                    .remote_session_client
                    .as_ref()
                    .map(|_| "RemoteSessionClient { ... }"),
            )
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("background_executor", &"BackgroundExecutor { ... }")
            .field(
                "media_pipeline",
                &self.media_pipeline.as_ref().map(|_| "MediaPipeline { ... }"),
            )
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("session_inactivity_timeout", &self.session_inactivity_timeout)
            .field("smart_rewind_interval", &self.smart_rewind_interval)
            .field("recovery_max_attempts", &self.recovery_max_attempts)
            .finish()
    }
}

impl CoreConfig {
    /// Create a new configuration builder
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.download_root.as_os_str().is_empty() {
            return Err(Error::Config("Download root cannot be empty".to_string()));
        }

        // The orphan sweep deletes unknown files under the download root,
        // which would include the database and its -wal/-shm companions.
        if self.database_path.starts_with(&self.download_root) {
            return Err(Error::Config(format!(
                "Database path '{}' is inside the download root '{}'. Orphan sweeps remove \
                 unknown files there; move the database outside the download root.",
                self.database_path.display(),
                self.download_root.display()
            )));
        }

        if self.remote_session_client.is_none() {
            match self.server_url.as_deref() {
                None | Some("") => {
                    return Err(Error::Config(
                        "A server URL is required. Use .server_url() or inject a \
                         RemoteSessionClient with .remote_session_client()."
                            .to_string(),
                    ))
                }
                Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                    return Err(Error::Config(format!(
                        "Server URL must start with http:// or https://, got '{}'",
                        url
                    )))
                }
                Some(_) => {}
            }
        }

        if self.max_concurrent_downloads == 0 || self.max_concurrent_downloads > 8 {
            return Err(Error::Config(
                "Concurrent downloads must be between 1 and 8".to_string(),
            ));
        }

        if self.session_inactivity_timeout < Duration::from_secs(30) {
            return Err(Error::Config(
                "Session inactivity timeout must be at least 30 seconds".to_string(),
            ));
        }

        if self.smart_rewind_interval > Duration::from_secs(300) {
            return Err(Error::Config(
                "Smart rewind interval exceeds maximum of 5 minutes".to_string(),
            ));
        }

        if self.recovery_max_attempts == 0 || self.recovery_max_attempts > 10 {
            return Err(Error::Config(
                "Recovery attempts must be between 1 and 10".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: ensure the 'desktop-shims' feature is enabled. \
             Mobile: inject the platform-native adapter.",
            capability, purpose
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "server calls and downloads"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess", "offline downloads"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_background_executor() -> Result<Arc<dyn BackgroundExecutor>> {
    Ok(Arc::new(bridge_desktop::TokioBackgroundExecutor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_background_executor() -> Result<Arc<dyn BackgroundExecutor>> {
    Err(capability_missing(
        "BackgroundExecutor",
        "session inactivity and close retries",
    ))
}

/// Builder for CoreConfig
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    download_root: Option<PathBuf>,
    server_url: Option<String>,
    api_token: Option<String>,
    remote_session_client: Option<Arc<dyn RemoteSessionClient>>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    background_executor: Option<Arc<dyn BackgroundExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    media_pipeline: Option<Arc<dyn MediaPipeline>>,
    max_concurrent_downloads: Option<usize>,
    session_inactivity_timeout: Option<Duration>,
    smart_rewind_interval: Option<Duration>,
    recovery_max_attempts: Option<u32>,
}

impl CoreConfigBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn download_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_root = Some(path.into());
        self
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn remote_session_client(mut self, client: Arc<dyn RemoteSessionClient>) -> Self {
        self.remote_session_client = Some(client);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn background_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.background_executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn media_pipeline(mut self, pipeline: Arc<dyn MediaPipeline>) -> Self {
        self.media_pipeline = Some(pipeline);
        self
    }

    pub fn max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = Some(max);
        self
    }

    pub fn session_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.session_inactivity_timeout = Some(timeout);
        self
    }

    pub fn smart_rewind_interval(mut self, interval: Duration) -> Self {
        self.smart_rewind_interval = Some(interval);
        self
    }

    pub fn recovery_max_attempts(mut self, attempts: u32) -> Self {
        self.recovery_max_attempts = Some(attempts);
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// - `Error::Config` when a required value is missing or out of range
    /// - `Error::CapabilityMissing` when a bridge was not injected and no
    ///   platform default is available
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let download_root = self.download_root.ok_or_else(|| {
            Error::Config(
                "Download root is required. Use .download_root() to set it.".to_string(),
            )
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let background_executor = match self.background_executor {
            Some(executor) => executor,
            None => provide_default_background_executor()?,
        };

        let config = CoreConfig {
            database_path,
            download_root,
            server_url: self.server_url,
            api_token: self.api_token,
            remote_session_client: self.remote_session_client,
            http_client,
            file_system,
            background_executor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            media_pipeline: self.media_pipeline,
            max_concurrent_downloads: self
                .max_concurrent_downloads
                .unwrap_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS),
            session_inactivity_timeout: self
                .session_inactivity_timeout
                .unwrap_or(DEFAULT_SESSION_INACTIVITY_TIMEOUT),
            smart_rewind_interval: self
                .smart_rewind_interval
                .unwrap_or(DEFAULT_SMART_REWIND_INTERVAL),
            recovery_max_attempts: self
                .recovery_max_attempts
                .unwrap_or(DEFAULT_RECOVERY_MAX_ATTEMPTS),
        };

        config.validate()?;

        Ok(config)
    }
}
