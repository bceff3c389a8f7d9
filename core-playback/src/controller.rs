//! # Player Controller
//!
//! Turns a session and its track list into playback on the host media
//! pipeline.
//!
//! ## Overview
//!
//! - `play_item` opens (or reuses) the session, prefers downloaded files
//!   over remote streams and applies smart rewind when the item was last
//!   played long ago
//! - `tick` feeds the pipeline position into the progress store and the
//!   session manager; an expired session starts recovery
//! - `handle_stream_failure` re-establishes the session and reloads the
//!   pipeline with capped exponential backoff, a bounded number of times
//!   in a row
//! - `stop` does a final sync, closes the session and releases the pipeline
//!
//! Player state sits behind one async mutex. The recovery backoff waits
//! outside it, so `stop` can cancel the wait through the teardown token.

use crate::config::ControllerConfig;
use crate::download::DownloadEngine;
use crate::error::{PlaybackError, Result};
use crate::recovery::RecoveryOutcome;
use crate::rewind::{should_rewind, smart_rewind_position};
use bridge_traits::playback::{AudioSource, MediaPipeline, QueuedTrack};
use bridge_traits::time::Clock;
use core_library::models::{Chapter, ItemId, Progress};
use core_library::repositories::ProgressRepository;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_session::{PlayableItem, SessionError, SessionManager};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// The loaded item.
struct NowPlaying {
    item_id: ItemId,
    duration: f64,
    chapters: Vec<Chapter>,
    is_downloaded: bool,
    /// Last position read from the pipeline
    position: f64,
    playing: bool,
    paused_at: Option<i64>,
    /// Paused by an audio route change rather than by the user
    interrupted: bool,
}

#[derive(Default)]
struct RecoveryState {
    attempts: u32,
    is_recovering: bool,
}

#[derive(Default)]
struct PlayerState {
    current: Option<NowPlaying>,
    recovery: RecoveryState,
}

struct Inner {
    config: ControllerConfig,
    sessions: SessionManager,
    downloads: DownloadEngine,
    progress: Arc<dyn ProgressRepository>,
    pipeline: Arc<dyn MediaPipeline>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    state: Mutex<PlayerState>,
    /// Cancelled and replaced on every `stop`
    teardown: parking_lot::Mutex<CancellationToken>,
}

/// Playback orchestrator over the session manager, the download engine and
/// the host media pipeline.
#[derive(Clone)]
pub struct PlayerController {
    inner: Arc<Inner>,
}

impl PlayerController {
    pub fn new(
        config: ControllerConfig,
        sessions: SessionManager,
        downloads: DownloadEngine,
        progress: Arc<dyn ProgressRepository>,
        pipeline: Arc<dyn MediaPipeline>,
        clock: Arc<dyn Clock>,
        event_bus: Option<EventBus>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                sessions,
                downloads,
                progress,
                pipeline,
                clock,
                event_bus,
                state: Mutex::new(PlayerState::default()),
                teardown: parking_lot::Mutex::new(CancellationToken::new()),
            }),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub async fn current_item(&self) -> Option<ItemId> {
        let state = self.inner.state.lock().await;
        state.current.as_ref().map(|current| current.item_id.clone())
    }

    pub async fn is_playing(&self) -> bool {
        let state = self.inner.state.lock().await;
        state.current.as_ref().is_some_and(|current| current.playing)
    }

    /// Last known position of the loaded item.
    pub async fn position(&self) -> Option<f64> {
        let state = self.inner.state.lock().await;
        state.current.as_ref().map(|current| current.position)
    }

    pub async fn recovery_attempts(&self) -> u32 {
        self.inner.state.lock().await.recovery.attempts
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Start playing `item_id` from its stored position.
    #[instrument(skip(self))]
    pub async fn play_item(&self, item_id: &ItemId) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let now = self.now();

        let mut interrupted = false;
        if let Some(mut previous) = state.current.take() {
            interrupted = previous.item_id == *item_id && previous.interrupted;
            if previous.playing {
                previous.position = self.pipeline_position(previous.position).await;
                if let Err(error) = self.inner.pipeline.pause().await {
                    warn!(error = %error, "Failed to pause previous item");
                }
                if let Err(error) = self.sync_position(&previous).await {
                    warn!(error = %error, "Failed to sync previous item");
                }
            }
        }

        let progress = self.load_progress(item_id, now).await?;
        let last_played_at = progress.last_played_at;
        let playable = self.inner.sessions.ensure_session(item_id, progress).await?;
        let (queue, is_downloaded) = self.queue_for(&playable).await?;

        let mut position = playable.progress.current_time;
        if should_rewind(
            last_played_at,
            now,
            self.inner.config.rewind_after_inactivity,
            interrupted,
        ) {
            position = smart_rewind_position(
                position,
                self.inner.config.rewind_interval,
                &playable.item.chapters,
            );
            debug!(from = playable.progress.current_time, to = position, "Smart rewind");
        }

        self.start_pipeline(queue, position).await?;
        self.inner.sessions.notify_playback_started().await;

        state.current = Some(NowPlaying {
            item_id: item_id.clone(),
            duration: playable.item.duration,
            chapters: playable.item.chapters,
            is_downloaded,
            position,
            playing: true,
            paused_at: None,
            interrupted: false,
        });
        state.recovery = RecoveryState::default();

        info!(position, is_downloaded, "Playback started");
        self.emit(PlaybackEvent::Started {
            item_id: item_id.to_string(),
            position,
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn pause(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let Some(current) = state.current.as_mut() else {
            return Err(PlaybackError::NothingPlaying);
        };
        self.pause_current(current).await
    }

    /// Pause for an audio route change; the next resume rewinds.
    #[instrument(skip(self))]
    pub async fn handle_interruption(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let Some(current) = state.current.as_mut() else {
            return Ok(());
        };
        current.interrupted = true;
        self.pause_current(current).await
    }

    /// Resume the paused item, rewinding after a long pause or an
    /// interruption. Reopens the session when it was closed meanwhile.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let now = self.now();
        let Some(current) = state.current.as_mut() else {
            return Err(PlaybackError::NothingPlaying);
        };
        if current.playing {
            return Ok(());
        }

        let mut position = current.position;
        if should_rewind(
            current.paused_at,
            now,
            self.inner.config.rewind_after_inactivity,
            current.interrupted,
        ) {
            position = smart_rewind_position(
                position,
                self.inner.config.rewind_interval,
                &current.chapters,
            );
        }

        let session_open = self
            .inner
            .sessions
            .current_session()
            .await
            .is_some_and(|session| session.item_id == current.item_id);

        if session_open {
            self.inner
                .pipeline
                .seek(position)
                .await
                .map_err(PlaybackError::Pipeline)?;
            self.inner
                .pipeline
                .play()
                .await
                .map_err(PlaybackError::Pipeline)?;
        } else {
            debug!("Session closed while paused, reopening");
            let mut progress = self.load_progress(&current.item_id, now).await?;
            progress.set_position(position, now);
            let playable = self
                .inner
                .sessions
                .ensure_session(&current.item_id, progress)
                .await?;
            let (queue, is_downloaded) = self.queue_for(&playable).await?;
            position = playable.progress.current_time;
            self.start_pipeline(queue, position).await?;
            current.is_downloaded = is_downloaded;
        }
        self.inner.sessions.notify_playback_started().await;

        current.position = position;
        current.playing = true;
        current.paused_at = None;
        current.interrupted = false;

        self.emit(PlaybackEvent::Started {
            item_id: current.item_id.to_string(),
            position,
        });
        Ok(())
    }

    /// Periodic position sample while playing.
    pub async fn tick(&self) -> Result<()> {
        let expired = {
            let mut state = self.inner.state.lock().await;
            let Some(current) = state.current.as_mut() else {
                return Ok(());
            };
            if !current.playing {
                return Ok(());
            }

            current.position = self
                .inner
                .pipeline
                .position()
                .await
                .map_err(PlaybackError::Pipeline)?;

            match self.sync_position(current).await {
                Ok(()) => false,
                Err(error) if error.is_expired() && current.is_downloaded => {
                    // Local files keep playing; only the session is renewed
                    self.persist_position(current).await;
                    self.renew_session(current).await?;
                    false
                }
                Err(error) if error.is_expired() => {
                    self.persist_position(current).await;
                    true
                }
                Err(error) if error.is_transient() => {
                    warn!(error = %error, "Progress sync failed, will retry on a later tick");
                    false
                }
                Err(error) => return Err(error.into()),
            }
        };

        if expired {
            info!("Session expired during playback, recovering");
            let outcome = self.handle_stream_failure("session expired").await;
            debug!(?outcome, "Session recovery finished");
        }
        Ok(())
    }

    /// Final sync, session close and pipeline release.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        self.cancel_pending_recovery();

        let mut state = self.inner.state.lock().await;
        state.recovery = RecoveryState::default();
        let Some(mut current) = state.current.take() else {
            return Ok(());
        };

        if current.playing {
            current.position = self.pipeline_position(current.position).await;
        }
        if let Err(error) = self.sync_position(&current).await {
            warn!(error = %error, "Final progress sync failed");
            self.persist_position(&current).await;
        }

        let is_downloaded = self
            .inner
            .downloads
            .is_fully_downloaded(&current.item_id)
            .await;
        let closed = self.inner.sessions.close_session(is_downloaded).await;

        if let Err(error) = self.inner.pipeline.release().await {
            warn!(error = %error, "Failed to release media pipeline");
        }

        info!(item_id = %current.item_id, position = current.position, "Playback stopped");
        self.emit(PlaybackEvent::Stopped {
            item_id: current.item_id.to_string(),
        });
        closed.map_err(Into::into)
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// React to a stalled, failed or undecodable stream.
    #[instrument(skip(self))]
    pub async fn handle_stream_failure(&self, reason: &str) -> RecoveryOutcome {
        let token = self.inner.teardown.lock().clone();
        let recovery_config = &self.inner.config.recovery;

        let (item_id, attempt) = {
            let mut guard = self.inner.state.lock().await;
            let PlayerState { current, recovery } = &mut *guard;
            let Some(playing) = current.as_mut() else {
                return RecoveryOutcome::NothingPlaying;
            };

            if recovery.is_recovering {
                debug!("Recovery already running");
                return RecoveryOutcome::AlreadyRecovering;
            }

            if playing.is_downloaded {
                warn!(reason, "Local playback failed");
                self.halt(playing).await;
                self.emit(PlaybackEvent::Error {
                    item_id: Some(playing.item_id.to_string()),
                    message: PlaybackError::LocalPlaybackFailed(reason.to_string()).to_string(),
                    recoverable: false,
                });
                return RecoveryOutcome::LocalFailure;
            }

            if recovery.attempts >= recovery_config.max_attempts {
                warn!(attempts = recovery.attempts, reason, "Stream recovery exhausted");
                self.halt(playing).await;
                if let Err(error) = self.inner.pipeline.release().await {
                    warn!(error = %error, "Failed to release media pipeline");
                }
                self.emit(PlaybackEvent::Error {
                    item_id: Some(playing.item_id.to_string()),
                    message: PlaybackError::RecoveryExhausted {
                        attempts: recovery.attempts,
                    }
                    .to_string(),
                    recoverable: false,
                });
                return RecoveryOutcome::Exhausted;
            }

            recovery.attempts += 1;
            recovery.is_recovering = true;
            (playing.item_id.clone(), recovery.attempts)
        };

        let delay = recovery_config.delay_for(attempt);
        info!(attempt, delay_ms = delay.as_millis() as u64, reason, "Stream failed, reconnecting");
        self.emit(PlaybackEvent::Reconnecting {
            item_id: item_id.to_string(),
            attempt,
            delay_secs: delay.as_secs(),
        });

        tokio::select! {
            _ = token.cancelled() => {
                self.inner.state.lock().await.recovery.is_recovering = false;
                debug!("Recovery cancelled during backoff");
                return RecoveryOutcome::Cancelled;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let mut guard = self.inner.state.lock().await;
        let PlayerState { current, recovery } = &mut *guard;
        recovery.is_recovering = false;
        let Some(current) = current
            .as_mut()
            .filter(|current| current.item_id == item_id)
        else {
            return RecoveryOutcome::Cancelled;
        };

        match self.reload(current, &token).await {
            Ok(()) => {
                info!(attempt, "Stream recovered");
                recovery.attempts = 0;
                self.emit(PlaybackEvent::Recovered {
                    item_id: item_id.to_string(),
                });
                RecoveryOutcome::Recovered { attempt }
            }
            Err(error) if error.is_cancellation() => RecoveryOutcome::Cancelled,
            Err(error) => {
                warn!(attempt, error = %error, "Stream recovery attempt failed");
                current.playing = false;
                self.emit(PlaybackEvent::Error {
                    item_id: Some(item_id.to_string()),
                    message: error.to_string(),
                    recoverable: attempt < recovery_config.max_attempts,
                });
                RecoveryOutcome::Failed { attempt }
            }
        }
    }

    /// The pipeline reports healthy playback; the recovery budget refills.
    pub async fn on_playback_ready(&self) {
        let mut state = self.inner.state.lock().await;
        if state.recovery.attempts > 0 {
            debug!(attempts = state.recovery.attempts, "Playback healthy again");
        }
        state.recovery.attempts = 0;
    }

    async fn reload(&self, current: &mut NowPlaying, token: &CancellationToken) -> Result<()> {
        let now = self.now();
        let position = current.position;

        let mut progress = self.load_progress(&current.item_id, now).await?;
        progress.set_position(position, now);
        let playable = self
            .inner
            .sessions
            .ensure_session(&current.item_id, progress)
            .await?;
        if token.is_cancelled() {
            return Err(PlaybackError::Cancelled);
        }

        let (queue, is_downloaded) = self.queue_for(&playable).await?;
        self.start_pipeline(queue, position).await?;
        self.inner.sessions.notify_playback_started().await;

        current.is_downloaded = is_downloaded;
        current.playing = true;
        current.paused_at = None;
        Ok(())
    }

    /// Open a new session for the loaded item after the server expired the
    /// old one, without touching the pipeline.
    async fn renew_session(&self, current: &mut NowPlaying) -> Result<()> {
        let now = self.now();
        let mut progress = self.load_progress(&current.item_id, now).await?;
        progress.set_position(current.position, now);

        let playable = self
            .inner
            .sessions
            .ensure_session(&current.item_id, progress)
            .await?;
        self.inner.sessions.notify_playback_started().await;

        info!(
            session_id = %playable.session.id,
            local_only = playable.is_local_only(),
            "Session renewed for downloaded item"
        );
        Ok(())
    }

    fn cancel_pending_recovery(&self) {
        let token = std::mem::replace(&mut *self.inner.teardown.lock(), CancellationToken::new());
        token.cancel();
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn pause_current(&self, current: &mut NowPlaying) -> Result<()> {
        if !current.playing {
            return Ok(());
        }

        current.position = self.pipeline_position(current.position).await;
        self.inner
            .pipeline
            .pause()
            .await
            .map_err(PlaybackError::Pipeline)?;
        current.playing = false;
        current.paused_at = Some(self.now());

        if let Err(error) = self.sync_position(current).await {
            warn!(error = %error, "Progress sync on pause failed");
            self.persist_position(current).await;
        }
        self.inner.sessions.notify_playback_stopped().await;

        self.emit(PlaybackEvent::Paused {
            item_id: current.item_id.to_string(),
            position: current.position,
        });
        Ok(())
    }

    /// Pause the pipeline and stop accruing without touching the session.
    async fn halt(&self, current: &mut NowPlaying) {
        current.position = self.pipeline_position(current.position).await;
        if let Err(error) = self.inner.pipeline.pause().await {
            debug!(error = %error, "Pipeline did not pause");
        }
        current.playing = false;
        current.paused_at = Some(self.now());
        self.inner.sessions.notify_playback_stopped().await;
    }

    /// Hand the position to the session manager, which stores progress.
    ///
    /// Without a session only the progress store is updated.
    async fn sync_position(&self, current: &NowPlaying) -> std::result::Result<(), SessionError> {
        match self.inner.sessions.sync_progress(current.position).await {
            Ok(outcome) => {
                debug!(?outcome, position = current.position, "Position synced");
                Ok(())
            }
            Err(SessionError::NoActiveSession) => {
                self.persist_position(current).await;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn persist_position(&self, current: &NowPlaying) {
        let now = self.now();
        let result = async {
            let mut progress = self.load_progress(&current.item_id, now).await?;
            if progress.duration <= 0.0 && current.duration > 0.0 {
                progress.set_duration(current.duration, now);
            }
            progress.set_position(current.position, now);
            progress.mark_played(now);
            self.inner.progress.upsert(&progress).await?;
            Ok::<(), PlaybackError>(())
        }
        .await;

        if let Err(error) = result {
            warn!(item_id = %current.item_id, error = %error, "Failed to store position");
        }
    }

    async fn load_progress(&self, item_id: &ItemId, now: i64) -> Result<Progress> {
        Ok(self
            .inner
            .progress
            .get(item_id)
            .await?
            .unwrap_or_else(|| Progress::new(item_id.clone(), 0.0, now)))
    }

    /// Downloaded files when complete, otherwise the session's stream URLs.
    async fn queue_for(&self, playable: &PlayableItem) -> Result<(Vec<QueuedTrack>, bool)> {
        if let Some(local) = self.inner.downloads.local_sources(&playable.item.id).await? {
            return Ok((local, true));
        }

        let queue: Vec<QueuedTrack> = playable
            .tracks
            .iter()
            .filter_map(|track| {
                let url = track.streaming_url.clone()?;
                Some(QueuedTrack {
                    index: u32::try_from(track.index).unwrap_or_default(),
                    start_offset: track.start_offset,
                    duration: track.duration,
                    source: AudioSource::RemoteStream {
                        url,
                        headers: self.inner.config.stream_headers.clone(),
                    },
                })
            })
            .collect();

        if queue.is_empty() {
            return Err(PlaybackError::NoSources {
                item_id: playable.item.id.to_string(),
            });
        }
        Ok((queue, false))
    }

    async fn start_pipeline(&self, queue: Vec<QueuedTrack>, position: f64) -> Result<()> {
        self.inner
            .pipeline
            .load(queue, position)
            .await
            .map_err(PlaybackError::Pipeline)?;
        self.inner
            .pipeline
            .play()
            .await
            .map_err(PlaybackError::Pipeline)
    }

    async fn pipeline_position(&self, fallback: f64) -> f64 {
        match self.inner.pipeline.position().await {
            Ok(position) => position,
            Err(error) => {
                debug!(error = %error, "Pipeline position unavailable");
                fallback
            }
        }
    }

    fn now(&self) -> i64 {
        self.inner.clock.unix_timestamp_millis()
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.inner.event_bus {
            bus.emit(CoreEvent::Playback(event)).ok();
        }
    }
}
