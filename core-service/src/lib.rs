//! Core service façade and bootstrap.
//!
//! This crate wires host-provided bridges (HTTP, filesystem, background
//! executor, clock, media pipeline) and the server connection from a
//! [`CoreConfig`] into the session manager, the download engine and the
//! player controller. Desktop apps enable the `desktop-shims` feature so
//! missing bridges default to the `bridge-desktop` implementations.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/audioshelf/core.db")
//!     .download_root("/data/audioshelf/downloads")
//!     .server_url("https://books.example.com")
//!     .api_token("secret")
//!     .media_pipeline(pipeline)
//!     .build()?;
//!
//! let core = CoreService::bootstrap(config).await?;
//! core.start().await?;
//! core.player()?.play_item(&"li_123".into()).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::RemoteSessionClient;
use core_library::db::{create_pool, DatabaseConfig};
use core_library::LibraryError;
use core_library::models::{ItemId, LibraryItem, Progress, Track};
use core_playback::download::{DownloadConfig, DownloadEngine, SweepReport};
use core_playback::{ControllerConfig, PlayerController, RecoveryConfig};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_session::{HttpRemoteSessionClient, SessionConfig, SessionManager, SessionStores};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const EVENT_BUS_CAPACITY: usize = 256;

/// What the start-up tasks did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StartupReport {
    /// Unsynced sessions delivered to the server
    pub synced_sessions: usize,
    pub sweep: SweepReport,
}

struct ServiceInner {
    config: CoreConfig,
    stores: SessionStores,
    sessions: SessionManager,
    downloads: DownloadEngine,
    player: Option<PlayerController>,
    events: EventBus,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Open the database and build every component from `config`.
    ///
    /// Nothing talks to the server yet; call [`start`](Self::start) once the
    /// host is ready.
    #[instrument(skip(config), fields(database = %config.database_path.display()))]
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                config.file_system.create_dir_all(parent).await?;
            }
        }
        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let stores = SessionStores::sqlite(pool);
        let events = EventBus::new(EVENT_BUS_CAPACITY);

        let remote = remote_client(&config)?;

        let mut download_config = DownloadConfig::new(config.download_root.clone())
            .with_max_concurrent_downloads(config.max_concurrent_downloads);
        if let Some(token) = config.api_token.as_deref() {
            download_config = download_config.with_bearer_token(token);
        }
        let downloads = DownloadEngine::new(
            download_config,
            stores.items.clone(),
            stores.tracks.clone(),
            config.http_client.clone(),
            config.file_system.clone(),
            Some(events.clone()),
        )?;

        let sessions = SessionManager::new(
            SessionConfig::default().with_inactivity_timeout(config.session_inactivity_timeout),
            remote,
            stores.clone(),
            config.background_executor.clone(),
            Arc::new(downloads.clone()),
            config.clock.clone(),
            Some(events.clone()),
        )?;

        let player = match config.media_pipeline.clone() {
            Some(pipeline) => {
                let mut controller_config = ControllerConfig::default()
                    .with_recovery(
                        RecoveryConfig::default().with_max_attempts(config.recovery_max_attempts),
                    )
                    .with_rewind_interval(config.smart_rewind_interval);
                if let Some(token) = config.api_token.as_deref() {
                    controller_config = controller_config.with_bearer_token(token);
                }
                Some(PlayerController::new(
                    controller_config,
                    sessions.clone(),
                    downloads.clone(),
                    stores.progress.clone(),
                    pipeline,
                    config.clock.clone(),
                    Some(events.clone()),
                )?)
            }
            None => {
                info!("No media pipeline provided, player controller disabled");
                None
            }
        };

        info!("Core service bootstrapped");
        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                stores,
                sessions,
                downloads,
                player,
                events,
            }),
        })
    }

    /// Start-up tasks: deliver sessions left unsynced by earlier runs and
    /// sweep orphaned download files.
    ///
    /// A failed bulk sync is not fatal; the sessions stay stored for the
    /// next start.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<StartupReport> {
        let synced_sessions = match self.inner.sessions.sync_unsynced_sessions().await {
            Ok(count) => count,
            Err(error) if error.is_transient() => {
                warn!(error = %error, "Unsynced sessions kept for the next start");
                0
            }
            Err(error) => return Err(error.into()),
        };

        let sweep = self.inner.downloads.sweep_orphans().await?;

        info!(
            synced_sessions,
            removed = sweep.removed(),
            "Start-up tasks finished"
        );
        Ok(StartupReport {
            synced_sessions,
            sweep,
        })
    }

    /// Stop playback, closing the open session.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(player) = &self.inner.player {
            player.stop().await?;
        }
        for item_id in self.inner.downloads.active_downloads().await {
            self.inner.downloads.cancel_download(&item_id).await;
        }
        info!("Core service shut down");
        Ok(())
    }

    /// Store an item and its tracks so it can be downloaded before it was
    /// ever played.
    #[instrument(skip(self, item, tracks), fields(item_id = %item.id, tracks = tracks.len()))]
    pub async fn register_item(&self, item: LibraryItem, tracks: Vec<Track>) -> Result<()> {
        item.validate().map_err(|message| LibraryError::invalid("item", message))?;
        if let Some(track) = tracks.iter().find(|track| track.item_id != item.id) {
            return Err(LibraryError::invalid(
                "tracks",
                format!("track {} belongs to item {}", track.index, track.item_id),
            )
            .into());
        }

        self.inner.stores.items.upsert(&item).await?;
        self.inner.stores.tracks.upsert_many(&tracks).await?;
        Ok(())
    }

    /// Locally stored progress of `item_id`.
    pub async fn progress(&self, item_id: &ItemId) -> Result<Option<Progress>> {
        Ok(self.inner.stores.progress.get(item_id).await?)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn downloads(&self) -> &DownloadEngine {
        &self.inner.downloads
    }

    /// The player controller, present when a media pipeline was configured.
    pub fn player(&self) -> Result<&PlayerController> {
        self.inner.player.as_ref().ok_or(CoreError::PlayerUnavailable)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }
}

fn remote_client(config: &CoreConfig) -> Result<Arc<dyn RemoteSessionClient>> {
    if let Some(client) = &config.remote_session_client {
        return Ok(client.clone());
    }

    let server_url = config.server_url.as_deref().ok_or_else(|| {
        CoreError::InitializationFailed("no server URL or session client configured".to_string())
    })?;
    let mut client = HttpRemoteSessionClient::new(config.http_client.clone(), server_url);
    if let Some(token) = config.api_token.as_deref() {
        client = client.with_api_token(token);
    }
    Ok(Arc::new(client))
}
