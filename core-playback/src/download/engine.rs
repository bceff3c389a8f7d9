//! # Download Engine
//!
//! Fetches every track of an item into `{download_root}/{item_id}/` for
//! offline playback.
//!
//! ## Operation
//!
//! 1. Wait for a slot in the bounded queue (one item at a time by default)
//! 2. Resolve the track list and sizes, probing unknown sizes with `HEAD`
//! 3. Stream each track into `{index}.{ext}.part`, then rename it to
//!    `{index}.{ext}`
//! 4. Commit all local paths in one transaction and only then report
//!    `Downloaded`
//!
//! Cancellation or failure at any step deletes the item directory and
//! clears the local paths, so persisted track state never points at a
//! partial download. Failed downloads are not retried.
//!
//! State is observable per item through a `watch` channel and on the
//! [`EventBus`] as [`DownloadEvent`]s.

use super::config::DownloadConfig;
use super::progress::ProgressTracker;
use crate::error::{PlaybackError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::playback::{AudioSource, QueuedTrack};
use bridge_traits::storage::FileSystemAccess;
use core_library::models::{DownloadState, ItemId, Track};
use core_library::repositories::{ItemRepository, TrackRepository};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_session::OfflineAvailability;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub(super) struct ActiveDownload {
    token: CancellationToken,
}

pub(super) struct EngineInner {
    pub(super) config: DownloadConfig,
    pub(super) items: Arc<dyn ItemRepository>,
    pub(super) tracks: Arc<dyn TrackRepository>,
    http: Arc<dyn HttpClient>,
    pub(super) fs: Arc<dyn FileSystemAccess>,
    event_bus: Option<EventBus>,
    queue: Semaphore,
    /// Items with a running operation; also guards the orphan sweep
    pub(super) active: Mutex<HashMap<ItemId, ActiveDownload>>,
    states: parking_lot::Mutex<HashMap<ItemId, watch::Sender<DownloadState>>>,
}

/// Offline download service.
///
/// Cheap to clone; clones share the queue and the operation registry.
#[derive(Clone)]
pub struct DownloadEngine {
    pub(super) inner: Arc<EngineInner>,
}

impl DownloadEngine {
    pub fn new(
        config: DownloadConfig,
        items: Arc<dyn ItemRepository>,
        tracks: Arc<dyn TrackRepository>,
        http: Arc<dyn HttpClient>,
        fs: Arc<dyn FileSystemAccess>,
        event_bus: Option<EventBus>,
    ) -> Result<Self> {
        config.validate()?;
        let queue = Semaphore::new(config.max_concurrent_downloads);

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                items,
                tracks,
                http,
                fs,
                event_bus,
                queue,
                active: Mutex::new(HashMap::new()),
                states: parking_lot::Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.inner.config
    }

    /// Directory holding the files of `item_id`.
    ///
    /// Fails for ids that would resolve outside the download root.
    pub fn item_dir(&self, item_id: &ItemId) -> Result<PathBuf> {
        if !item_id.is_path_safe() {
            return Err(PlaybackError::UnsafeItemId(item_id.to_string()));
        }
        Ok(self.inner.config.download_root.join(item_id.as_str()))
    }

    // =========================================================================
    // Starting and stopping
    // =========================================================================

    /// Queue a download of every track of `item_id`.
    ///
    /// Returns `false` without doing anything when the item is already
    /// downloading or fully downloaded.
    #[instrument(skip(self))]
    pub async fn start_download(&self, item_id: &ItemId) -> Result<bool> {
        self.item_dir(item_id)?;
        let mut active = self.inner.active.lock().await;
        if active.contains_key(item_id) {
            debug!("Download already in progress");
            return Ok(false);
        }
        if self.committed_tracks(item_id).await?.is_some() {
            debug!("Item already downloaded");
            self.publish(item_id, DownloadState::Downloaded);
            return Ok(false);
        }

        let token = CancellationToken::new();
        active.insert(
            item_id.clone(),
            ActiveDownload {
                token: token.clone(),
            },
        );
        self.publish(item_id, DownloadState::Downloading { progress: 0.0 });
        drop(active);

        info!("Download queued");
        self.emit(DownloadEvent::Queued {
            item_id: item_id.to_string(),
        });

        let engine = self.clone();
        let item_id = item_id.clone();
        tokio::spawn(async move { engine.run(item_id, token).await });

        Ok(true)
    }

    /// Abort the running download of `item_id`.
    ///
    /// Returns `false` when nothing was running. Cleanup finishes
    /// asynchronously; use [`wait_for_settled`](Self::wait_for_settled).
    #[instrument(skip(self))]
    pub async fn cancel_download(&self, item_id: &ItemId) -> bool {
        let active = self.inner.active.lock().await;
        match active.get(item_id) {
            Some(operation) => {
                info!("Cancelling download");
                operation.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the downloaded files of `item_id` and forget their paths.
    ///
    /// A running download is cancelled first.
    #[instrument(skip(self))]
    pub async fn delete_download(&self, item_id: &ItemId) -> Result<()> {
        let dir = self.item_dir(item_id)?;
        if self.cancel_download(item_id).await {
            self.wait_for_settled(item_id).await?;
        }

        let active = self.inner.active.lock().await;
        if let Some(operation) = active.get(item_id) {
            operation.token.cancel();
        }

        if self.inner.fs.exists(&dir).await? {
            self.inner.fs.delete_dir_all(&dir).await?;
        }
        let cleared = self.inner.tracks.clear_local_paths(item_id).await?;
        drop(active);

        info!(cleared, "Download deleted");
        self.publish(item_id, DownloadState::NotDownloaded);
        self.emit(DownloadEvent::Deleted {
            item_id: item_id.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Observing
    // =========================================================================

    pub async fn download_state(&self, item_id: &ItemId) -> Result<DownloadState> {
        if self.inner.active.lock().await.contains_key(item_id) {
            let watched = self
                .inner
                .states
                .lock()
                .get(item_id)
                .map(|sender| *sender.borrow());
            if let Some(state) = watched {
                return Ok(state);
            }
        }
        self.stored_state(item_id).await
    }

    /// Live state of `item_id`; progress values arrive in non-decreasing order.
    pub async fn subscribe(&self, item_id: &ItemId) -> Result<watch::Receiver<DownloadState>> {
        let existing = self
            .inner
            .states
            .lock()
            .get(item_id)
            .map(watch::Sender::subscribe);
        if let Some(receiver) = existing {
            return Ok(receiver);
        }

        let state = self.stored_state(item_id).await?;
        let mut states = self.inner.states.lock();
        let sender = states
            .entry(item_id.clone())
            .or_insert_with(|| watch::channel(state).0);
        Ok(sender.subscribe())
    }

    /// Wait until `item_id` is no longer downloading and return where it
    /// ended up.
    pub async fn wait_for_settled(&self, item_id: &ItemId) -> Result<DownloadState> {
        let mut receiver = self.subscribe(item_id).await?;
        let state = *receiver
            .wait_for(|state| !state.is_active())
            .await
            .map_err(|_| PlaybackError::Download("download state channel closed".to_string()))?;
        Ok(state)
    }

    /// Whether every track has a committed path and its file is on disk.
    pub async fn is_fully_downloaded(&self, item_id: &ItemId) -> bool {
        match self.committed_tracks(item_id).await {
            Ok(tracks) => tracks.is_some(),
            Err(error) => {
                warn!(item_id = %item_id, error = %error, "Failed to check local tracks");
                false
            }
        }
    }

    /// Local files of a fully downloaded item, ready for the media pipeline.
    pub async fn local_sources(&self, item_id: &ItemId) -> Result<Option<Vec<QueuedTrack>>> {
        let Some(tracks) = self.committed_tracks(item_id).await? else {
            return Ok(None);
        };

        let root = &self.inner.config.download_root;
        let sources = tracks
            .iter()
            .filter_map(|track| {
                let relative = track.local_relative_path.as_deref()?;
                Some(QueuedTrack {
                    index: u32::try_from(track.index).unwrap_or_default(),
                    start_offset: track.start_offset,
                    duration: track.duration,
                    source: AudioSource::LocalFile {
                        path: root.join(relative),
                    },
                })
            })
            .collect();
        Ok(Some(sources))
    }

    pub async fn active_downloads(&self) -> Vec<ItemId> {
        self.inner.active.lock().await.keys().cloned().collect()
    }

    // =========================================================================
    // Operation
    // =========================================================================

    async fn run(&self, item_id: ItemId, token: CancellationToken) {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(PlaybackError::DownloadCancelled {
                item_id: item_id.to_string(),
            }),
            result = self.download_item(&item_id) => result,
        };

        let (state, event) = match result {
            Ok(()) => {
                info!(item_id = %item_id, "Download completed");
                (
                    DownloadState::Downloaded,
                    DownloadEvent::Completed {
                        item_id: item_id.to_string(),
                    },
                )
            }
            Err(error) => {
                self.discard(&item_id).await;
                let event = if error.is_cancellation() {
                    debug!(item_id = %item_id, "Download cancelled");
                    DownloadEvent::Cancelled {
                        item_id: item_id.to_string(),
                    }
                } else {
                    warn!(item_id = %item_id, error = %error, "Download failed");
                    DownloadEvent::Failed {
                        item_id: item_id.to_string(),
                        message: error.to_string(),
                    }
                };
                (DownloadState::NotDownloaded, event)
            }
        };

        self.inner.active.lock().await.remove(&item_id);
        self.publish(&item_id, state);
        self.emit(event);
    }

    async fn download_item(&self, item_id: &ItemId) -> Result<()> {
        let _permit = self
            .inner
            .queue
            .acquire()
            .await
            .map_err(|_| PlaybackError::Download("download queue closed".to_string()))?;
        debug!(item_id = %item_id, "Download slot acquired");

        let tracks = self.inner.tracks.list_for_item(item_id).await?;
        if tracks.is_empty() {
            return Err(PlaybackError::Download(format!(
                "item {} has no tracks",
                item_id
            )));
        }

        let mut tracker = ProgressTracker::new(self.resolve_sizes(&tracks).await);
        debug!(
            item_id = %item_id,
            tracks = tracks.len(),
            total_bytes = ?tracker.total_bytes(),
            "Resolved download size"
        );

        let item_dir = self.item_dir(item_id)?;
        self.inner.fs.create_dir_all(&item_dir).await?;

        let mut paths = Vec::with_capacity(tracks.len());
        for track in &tracks {
            self.fetch_track(item_id, track, &item_dir, &mut tracker)
                .await?;
            if let Some(progress) = tracker.finish_file() {
                self.report_progress(item_id, progress);
            }
            paths.push((track.index, track.relative_path()));
        }

        self.inner.tracks.set_local_paths(item_id, &paths).await?;
        Ok(())
    }

    async fn fetch_track(
        &self,
        item_id: &ItemId,
        track: &Track,
        item_dir: &Path,
        tracker: &mut ProgressTracker,
    ) -> Result<()> {
        let url = source_url(track)?;
        let staging = item_dir.join(track.staging_file_name());
        let target = item_dir.join(track.file_name());

        let request = HttpRequest::get(url).headers(&self.inner.config.request_headers);
        let mut stream = self.inner.http.download_stream(request).await?;
        let mut writer = self.inner.fs.open_write_stream(&staging).await?;

        let mut buffer = vec![0u8; self.inner.config.chunk_size];
        loop {
            let read = stream.reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read]).await?;
            if let Some(progress) = tracker.advance(read as u64) {
                self.report_progress(item_id, progress);
            }
        }
        writer.flush().await?;
        writer.shutdown().await?;
        drop(writer);

        self.inner.fs.rename(&staging, &target).await?;
        debug!(item_id = %item_id, track = track.index, "Track stored");
        Ok(())
    }

    async fn resolve_sizes(&self, tracks: &[Track]) -> Vec<Option<u64>> {
        let mut sizes = Vec::with_capacity(tracks.len());
        for track in tracks {
            let known = track.size_bytes.and_then(|size| u64::try_from(size).ok());
            let size = match known {
                Some(size) => Some(size),
                None => self.head_size(track).await,
            };
            sizes.push(size);
        }
        sizes
    }

    /// `HEAD` the track for its `Content-Length`.
    async fn head_size(&self, track: &Track) -> Option<u64> {
        let url = track.streaming_url.as_deref()?;
        let request =
            HttpRequest::new(HttpMethod::Head, url).headers(&self.inner.config.request_headers);

        match self.inner.http.execute(request).await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => response.content_length(),
                Err(error) => {
                    debug!(track = track.index, error = %error, "Size lookup rejected");
                    None
                }
            },
            Err(error) => {
                debug!(track = track.index, error = %error, "Size lookup failed");
                None
            }
        }
    }

    /// Remove everything a failed or cancelled operation left behind.
    async fn discard(&self, item_id: &ItemId) {
        let Ok(dir) = self.item_dir(item_id) else {
            return;
        };
        match self.inner.fs.exists(&dir).await {
            Ok(true) => {
                if let Err(error) = self.inner.fs.delete_dir_all(&dir).await {
                    warn!(item_id = %item_id, error = %error, "Failed to delete partial download");
                }
            }
            Ok(false) => {}
            Err(error) => {
                warn!(item_id = %item_id, error = %error, "Failed to inspect partial download");
            }
        }

        if let Err(error) = self.inner.tracks.clear_local_paths(item_id).await {
            warn!(item_id = %item_id, error = %error, "Failed to clear local paths");
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Tracks of `item_id` when all of them are committed and on disk.
    async fn committed_tracks(&self, item_id: &ItemId) -> Result<Option<Vec<Track>>> {
        let tracks = self.inner.tracks.list_for_item(item_id).await?;
        if tracks.is_empty() {
            return Ok(None);
        }

        for track in &tracks {
            let Some(relative) = track.local_relative_path.as_deref() else {
                return Ok(None);
            };
            let path = self.inner.config.download_root.join(relative);
            if !self.inner.fs.exists(&path).await? {
                return Ok(None);
            }
        }
        Ok(Some(tracks))
    }

    async fn stored_state(&self, item_id: &ItemId) -> Result<DownloadState> {
        Ok(match self.committed_tracks(item_id).await? {
            Some(_) => DownloadState::Downloaded,
            None => DownloadState::NotDownloaded,
        })
    }

    /// Set the watched state of `item_id`, returning the previous one.
    pub(super) fn publish(&self, item_id: &ItemId, state: DownloadState) -> DownloadState {
        let mut states = self.inner.states.lock();
        match states.get(item_id) {
            Some(sender) => {
                let mut previous = state;
                sender.send_if_modified(|current| {
                    previous = *current;
                    if *current == state {
                        false
                    } else {
                        *current = state;
                        true
                    }
                });
                previous
            }
            None => {
                states.insert(item_id.clone(), watch::channel(state).0);
                DownloadState::NotDownloaded
            }
        }
    }

    fn report_progress(&self, item_id: &ItemId, progress: f64) {
        let previous = self.publish(item_id, DownloadState::Downloading { progress });

        // Bus subscribers get whole-percent steps
        let percent = |value: f64| (value * 100.0).floor() as u32;
        if percent(progress) > percent(previous.progress()) {
            self.emit(DownloadEvent::Progress {
                item_id: item_id.to_string(),
                progress,
            });
        }
    }

    pub(super) fn emit(&self, event: DownloadEvent) {
        if let Some(bus) = &self.inner.event_bus {
            bus.emit(CoreEvent::Download(event)).ok();
        }
    }
}

#[async_trait]
impl OfflineAvailability for DownloadEngine {
    async fn is_fully_downloaded(&self, item_id: &ItemId) -> bool {
        DownloadEngine::is_fully_downloaded(self, item_id).await
    }
}

fn source_url(track: &Track) -> Result<&str> {
    track.streaming_url.as_deref().ok_or_else(|| {
        PlaybackError::Download(format!(
            "track {} of item {} has no source URL",
            track.index, track.item_id
        ))
    })
}
