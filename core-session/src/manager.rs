//! # Session Manager
//!
//! Owns the single playback session of the process and reconciles locally
//! accrued listening time with the library server.
//!
//! ## Overview
//!
//! - `ensure_session` reuses the open session for an item, supersedes a
//!   session for another item, opens a remote session, or falls back to a
//!   local-only session when the item is downloaded and the server is out of
//!   reach.
//! - `sync_progress` coalesces listened time and only talks to the server when
//!   enough time is pending and the last sync is old enough.
//! - `close_session` flushes pending time and closes remotely, retrying failed
//!   closes on a fixed backoff schedule through the [`BackgroundExecutor`].
//! - `sync_unsynced_sessions` uploads leftovers of earlier runs in one batch.
//!
//! Every operation runs under one async mutex, so syncs for a session never
//! overlap and session state has a single writer. Each mutation is persisted
//! before the operation returns so listened time survives a restart.
//!
//! ## State machine
//!
//! ```text
//! NoSession ──start ok──────────────> RemoteOpen ──close ok──> NoSession
//! NoSession ──start failed, offline─> LocalOnlyOpen ──close──> NoSession
//! RemoteOpen ──sync "not found"─────> NoSession (record kept as unsynced)
//! RemoteOpen ──close failed─────────> NoSession (record closing, retry armed)
//! ```

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use async_trait::async_trait;
use bridge_traits::background::{deferred_job, BackgroundExecutor, TaskId};
use bridge_traits::session::{RemoteSessionClient, StartedSession};
use bridge_traits::time::Clock;
use core_library::models::{
    Chapter, ItemId, LibraryItem, PlaybackSession, Progress, SessionId, SessionStatus, Track,
};
use core_library::repositories::{
    ItemRepository, ProgressRepository, SessionRepository, SqliteItemRepository,
    SqliteProgressRepository, SqliteSessionRepository, SqliteTrackRepository, TrackRepository,
};
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use futures::future::BoxFuture;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const INACTIVITY_TASK_ID: &str = "session-inactivity-close";

fn close_retry_task_id(session_id: &SessionId) -> String {
    format!("session-close-retry:{}", session_id)
}

/// Answers whether every track of an item is available on disk.
///
/// Implemented by the download engine; consulted when the server cannot be
/// reached and before any network recovery.
#[async_trait]
pub trait OfflineAvailability: Send + Sync {
    async fn is_fully_downloaded(&self, item_id: &ItemId) -> bool;
}

/// Everything the player needs to start playing an item.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableItem {
    pub item: LibraryItem,
    pub tracks: Vec<Track>,
    pub session: PlaybackSession,
    pub progress: Progress,
}

impl PlayableItem {
    pub fn is_local_only(&self) -> bool {
        !self.session.is_remote
    }
}

/// What `sync_progress` did with the pending time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Pending time was reported and committed
    Synced,
    /// Not enough pending time, or the last sync is too recent
    Deferred,
    /// Local-only session; time waits for a bulk sync
    LocalOnly,
}

/// Repositories the session manager reads and writes.
#[derive(Clone)]
pub struct SessionStores {
    pub items: Arc<dyn ItemRepository>,
    pub tracks: Arc<dyn TrackRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl SessionStores {
    /// SQLite-backed stores sharing one pool.
    pub fn sqlite(pool: SqlitePool) -> Self {
        Self {
            items: Arc::new(SqliteItemRepository::new(pool.clone())),
            tracks: Arc::new(SqliteTrackRepository::new(pool.clone())),
            progress: Arc::new(SqliteProgressRepository::new(pool.clone())),
            sessions: Arc::new(SqliteSessionRepository::new(pool)),
        }
    }
}

#[derive(Default)]
struct SessionState {
    current: Option<PlaybackSession>,
    playing: bool,
    /// Start of the listening span not yet folded into pending time
    accrual_started_at: Option<i64>,
    /// Session open time or last successful sync, in Unix millis
    last_sync_at: i64,
}

impl SessionState {
    /// Fold wall-clock listening time into the open session.
    fn accrue(&mut self, now: i64) -> f64 {
        if !self.playing {
            return 0.0;
        }
        let Some(started) = self.accrual_started_at.replace(now) else {
            return 0.0;
        };

        let seconds = (now - started).max(0) as f64 / 1000.0;
        if let Some(session) = self.current.as_mut() {
            session.add_pending(seconds, now);
        }
        seconds
    }
}

struct Inner {
    config: SessionConfig,
    remote: Arc<dyn RemoteSessionClient>,
    stores: SessionStores,
    executor: Arc<dyn BackgroundExecutor>,
    offline: Arc<dyn OfflineAvailability>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    state: Mutex<SessionState>,
}

/// Playback session orchestrator.
///
/// Cheap to clone; clones share state. Deferred jobs capture a clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        remote: Arc<dyn RemoteSessionClient>,
        stores: SessionStores,
        executor: Arc<dyn BackgroundExecutor>,
        offline: Arc<dyn OfflineAvailability>,
        clock: Arc<dyn Clock>,
        event_bus: Option<EventBus>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                remote,
                stores,
                executor,
                offline,
                clock,
                event_bus,
                state: Mutex::new(SessionState::default()),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Snapshot of the open session, including time accrued so far.
    pub async fn current_session(&self) -> Option<PlaybackSession> {
        let mut state = self.inner.state.lock().await;
        let now = self.now();
        state.accrue(now);
        state.current.clone()
    }

    pub async fn is_playing(&self) -> bool {
        self.inner.state.lock().await.playing
    }

    // =========================================================================
    // Opening
    // =========================================================================

    /// Make sure a session is open for `item_id` and return what is needed to
    /// play it.
    ///
    /// `progress` is the local progress of the item; it is advanced to the
    /// server position when the server is ahead.
    #[instrument(skip(self, progress))]
    pub async fn ensure_session(&self, item_id: &ItemId, progress: Progress) -> Result<PlayableItem> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let now = self.now();

        if let Some(current) = state.current.as_ref() {
            if current.item_id == *item_id {
                debug!(session_id = %current.id, "Reusing open session");
                let session = current.clone();
                return self.playable_from_store(session, progress).await;
            }
        }

        if state.current.is_some() {
            self.supersede(state, now).await?;
        }

        match self.inner.remote.start_session(item_id.as_str()).await {
            Ok(started) => self.open_remote(state, item_id, started, progress, now).await,
            Err(error) => {
                if self.inner.offline.is_fully_downloaded(item_id).await {
                    info!(error = %error, "Server unavailable, opening local-only session");
                    self.open_local(state, item_id, progress, now).await
                } else {
                    warn!(error = %error, "Failed to start session");
                    Err(error.into())
                }
            }
        }
    }

    async fn open_remote(
        &self,
        state: &mut SessionState,
        item_id: &ItemId,
        started: StartedSession,
        mut progress: Progress,
        now: i64,
    ) -> Result<PlayableItem> {
        let stores = &self.inner.stores;

        let created_at = stores
            .items
            .get(item_id)
            .await?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let item = LibraryItem {
            id: item_id.clone(),
            title: started.title.clone(),
            duration: started.duration,
            chapters: started
                .chapters
                .iter()
                .map(|c| Chapter {
                    id: c.id,
                    start: c.start,
                    end: c.end,
                    title: c.title.clone(),
                })
                .collect(),
            created_at,
            updated_at: now,
        };
        stores.items.upsert(&item).await?;

        let remote_tracks: Vec<Track> = started
            .tracks
            .iter()
            .map(|t| Track {
                item_id: item_id.clone(),
                index: i64::from(t.index),
                start_offset: t.start_offset,
                duration: t.duration,
                size_bytes: t.size_bytes.and_then(|size| i64::try_from(size).ok()),
                mime_type: t.mime_type.clone(),
                streaming_url: Some(t.content_url.clone()),
                local_relative_path: None,
            })
            .collect();
        stores.tracks.upsert_many(&remote_tracks).await?;
        let tracks = stores.tracks.list_for_item(item_id).await?;

        if started.duration > 0.0 {
            progress.set_duration(started.duration, now);
        }
        if started.current_time > progress.current_time {
            debug!(
                local = progress.current_time,
                server = started.current_time,
                "Server position is ahead, resuming from it"
            );
            progress.set_position(started.current_time, now);
        }
        if progress.remote_progress_id.is_none() {
            progress.remote_progress_id = started.progress_id.clone();
        }
        progress.mark_played(now);
        stores.progress.upsert(&progress).await?;

        let mut session = PlaybackSession::new_remote(
            SessionId::new(started.session_id),
            item_id.clone(),
            progress.current_time,
            started.duration,
            now,
        );
        session.base_streaming_url = started.base_streaming_url;
        stores.sessions.upsert(&session).await?;

        self.activate(state, session.clone(), now).await;
        info!(session_id = %session.id, "Opened remote session");

        Ok(PlayableItem {
            item,
            tracks,
            session,
            progress,
        })
    }

    async fn open_local(
        &self,
        state: &mut SessionState,
        item_id: &ItemId,
        mut progress: Progress,
        now: i64,
    ) -> Result<PlayableItem> {
        let stores = &self.inner.stores;

        let item = stores
            .items
            .get(item_id)
            .await?
            .ok_or_else(|| SessionError::ItemNotFound {
                item_id: item_id.to_string(),
            })?;
        let tracks = stores.tracks.list_for_item(item_id).await?;

        if item.duration > 0.0 && progress.duration <= 0.0 {
            progress.set_duration(item.duration, now);
        }
        progress.mark_played(now);
        stores.progress.upsert(&progress).await?;

        let session =
            PlaybackSession::new_local(item_id.clone(), progress.current_time, item.duration, now);
        stores.sessions.upsert(&session).await?;

        self.activate(state, session.clone(), now).await;
        info!(session_id = %session.id, "Opened local-only session");

        Ok(PlayableItem {
            item,
            tracks,
            session,
            progress,
        })
    }

    async fn activate(&self, state: &mut SessionState, session: PlaybackSession, now: i64) {
        let session_id = session.id.clone();
        self.emit(SessionEvent::Opened {
            session_id: session.id.to_string(),
            item_id: session.item_id.to_string(),
            is_remote: session.is_remote,
        });

        state.current = Some(session);
        state.last_sync_at = now;
        state.accrual_started_at = state.playing.then_some(now);

        self.arm_inactivity_timer(&session_id).await;
    }

    async fn playable_from_store(
        &self,
        session: PlaybackSession,
        progress: Progress,
    ) -> Result<PlayableItem> {
        let stores = &self.inner.stores;
        let item = stores
            .items
            .get(&session.item_id)
            .await?
            .ok_or_else(|| SessionError::ItemNotFound {
                item_id: session.item_id.to_string(),
            })?;
        let tracks = stores.tracks.list_for_item(&session.item_id).await?;
        let progress = stores.progress.get(&session.item_id).await?.unwrap_or(progress);

        Ok(PlayableItem {
            item,
            tracks,
            session,
            progress,
        })
    }

    /// Drop the open session for another item without a remote close; the
    /// server supersedes it when the next session starts.
    async fn supersede(&self, state: &mut SessionState, now: i64) -> Result<()> {
        let listened = state.accrue(now);
        let Some(session) = state.current.take() else {
            return Ok(());
        };
        state.accrual_started_at = state.playing.then_some(now);
        self.cancel_inactivity_timer().await;
        self.record_listened(&session, listened, now).await;

        info!(session_id = %session.id, "Superseding session for another item");
        self.detach(session, now).await?;
        Ok(())
    }

    /// Forget a session locally, keeping it for a bulk sync when it still
    /// holds unreported time.
    async fn detach(&self, mut session: PlaybackSession, now: i64) -> Result<()> {
        let sessions = &self.inner.stores.sessions;
        if session.pending_listening_time > 0.0 || !session.is_remote {
            session.status = SessionStatus::Unsynced;
            session.updated_at = now;
            sessions.upsert(&session).await?;
        } else {
            sessions.delete(&session.id).await?;
        }

        self.emit(SessionEvent::Closed {
            session_id: session.id.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Syncing
    // =========================================================================

    /// Record the playback position and report pending time when due.
    ///
    /// # Errors
    ///
    /// - `NoActiveSession` without an open session
    /// - `SessionExpired` when the server no longer knows the session; the
    ///   session is detached and callers should call `ensure_session` again
    /// - `Remote` / `Authentication` when the sync failed; pending time is kept
    #[instrument(skip(self))]
    pub async fn sync_progress(&self, current_time: f64) -> Result<SyncOutcome> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let now = self.now();

        let listened = state.accrue(now);
        let Some(session) = state.current.as_mut() else {
            return Err(SessionError::NoActiveSession);
        };

        session.current_time = current_time.max(0.0);
        session.updated_at = now;
        self.record_progress(session, Some(session.current_time), listened, now)
            .await?;

        if !session.is_remote {
            self.inner.stores.sessions.upsert(session).await?;
            return Ok(SyncOutcome::LocalOnly);
        }

        let config = &self.inner.config;
        let pending_due = session.pending_listening_time >= config.min_pending_sync.as_secs_f64();
        let interval_due =
            now - state.last_sync_at >= config.min_sync_interval.as_millis() as i64;
        if !pending_due || !interval_due {
            self.inner.stores.sessions.upsert(session).await?;
            return Ok(SyncOutcome::Deferred);
        }

        let pending = session.pending_listening_time;
        match self
            .inner
            .remote
            .sync_session(session.id.as_str(), pending, session.current_time)
            .await
        {
            Ok(()) => {
                session.commit_pending(now);
                self.inner.stores.sessions.upsert(session).await?;
                state.last_sync_at = now;

                debug!(session_id = %session.id, synced = pending, "Session synced");
                self.emit(SessionEvent::Synced {
                    session_id: session.id.to_string(),
                    time_listened: pending,
                    current_time: session.current_time,
                });

                let session_id = session.id.clone();
                self.arm_inactivity_timer(&session_id).await;
                Ok(SyncOutcome::Synced)
            }
            Err(error) if error.is_not_found() => {
                let Some(expired) = state.current.take() else {
                    return Err(SessionError::NoActiveSession);
                };
                state.accrual_started_at = state.playing.then_some(now);
                self.cancel_inactivity_timer().await;

                warn!(session_id = %expired.id, "Session expired on the server");
                self.emit(SessionEvent::Expired {
                    session_id: expired.id.to_string(),
                    item_id: expired.item_id.to_string(),
                });
                let session_id = expired.id.to_string();
                self.detach(expired, now).await?;

                Err(SessionError::SessionExpired { session_id })
            }
            Err(error) => {
                self.inner.stores.sessions.upsert(session).await?;
                warn!(error = %error, "Session sync failed, keeping pending time");
                Err(error.into())
            }
        }
    }

    async fn record_progress(
        &self,
        session: &PlaybackSession,
        position: Option<f64>,
        listened: f64,
        now: i64,
    ) -> Result<()> {
        let repo = &self.inner.stores.progress;
        let mut progress = repo
            .get(&session.item_id)
            .await?
            .unwrap_or_else(|| Progress::new(session.item_id.clone(), session.duration, now));

        if progress.duration <= 0.0 && session.duration > 0.0 {
            progress.set_duration(session.duration, now);
        }
        if let Some(position) = position {
            progress.set_position(position, now);
        }
        progress.add_listened(listened);
        progress.mark_played(now);

        repo.upsert(&progress).await?;
        Ok(())
    }

    /// Best-effort progress update for paths that must not fail on storage.
    async fn record_listened(&self, session: &PlaybackSession, listened: f64, now: i64) {
        if listened <= 0.0 {
            return;
        }
        if let Err(error) = self.record_progress(session, None, listened, now).await {
            warn!(error = %error, "Failed to persist listened time");
        }
    }

    // =========================================================================
    // Playback notifications
    // =========================================================================

    /// Start accruing listened time and disarm the inactivity close.
    #[instrument(skip(self))]
    pub async fn notify_playback_started(&self) {
        let mut state = self.inner.state.lock().await;
        let now = self.now();
        state.accrue(now);
        state.playing = true;
        state.accrual_started_at = Some(now);
        drop(state);

        self.cancel_inactivity_timer().await;
    }

    /// Stop accruing listened time and arm the inactivity close.
    #[instrument(skip(self))]
    pub async fn notify_playback_stopped(&self) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let now = self.now();

        let listened = state.accrue(now);
        state.playing = false;
        state.accrual_started_at = None;

        let Some(session) = state.current.as_ref() else {
            return;
        };
        let session_id = session.id.clone();

        if let Err(error) = self.inner.stores.sessions.upsert(session).await {
            warn!(error = %error, "Failed to persist session on stop");
        }
        self.record_listened(session, listened, now).await;

        self.arm_inactivity_timer(&session_id).await;
    }

    /// Fired by the inactivity timer.
    pub async fn handle_inactivity(&self, session_id: SessionId) {
        let item_id = {
            let state = self.inner.state.lock().await;
            match state.current.as_ref() {
                Some(session) if session.id == session_id && !state.playing => {
                    session.item_id.clone()
                }
                _ => {
                    debug!(%session_id, "Inactivity timer no longer relevant");
                    return;
                }
            }
        };

        info!(%session_id, "Closing idle session");
        let is_downloaded = self.inner.offline.is_fully_downloaded(&item_id).await;
        if let Err(error) = self.close_session(is_downloaded).await {
            warn!(error = %error, "Idle session close failed");
        }
    }

    async fn arm_inactivity_timer(&self, session_id: &SessionId) {
        let manager = self.clone();
        let session_id = session_id.clone();
        let job = deferred_job(move || async move { manager.handle_inactivity(session_id).await });

        if let Err(error) = self
            .inner
            .executor
            .schedule_once(INACTIVITY_TASK_ID, self.inner.config.inactivity_timeout, job)
            .await
        {
            warn!(error = %error, "Failed to arm inactivity close");
        }
    }

    async fn cancel_inactivity_timer(&self) {
        if let Err(error) = self
            .inner
            .executor
            .cancel_task(&TaskId::new(INACTIVITY_TASK_ID))
            .await
        {
            warn!(error = %error, "Failed to cancel inactivity close");
        }
    }

    // =========================================================================
    // Closing
    // =========================================================================

    /// Close the open session.
    ///
    /// Pending time is flushed first on a best-effort basis. A failed remote
    /// close is retried on the close backoff schedule unless the item is
    /// downloaded, in which case the session is cleared locally and left to
    /// expire on the server.
    #[instrument(skip(self))]
    pub async fn close_session(&self, is_downloaded: bool) -> Result<()> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let now = self.now();

        let listened = state.accrue(now);
        state.playing = false;
        state.accrual_started_at = None;
        let Some(session) = state.current.take() else {
            debug!("No session to close");
            return Ok(());
        };
        self.cancel_inactivity_timer().await;
        self.record_listened(&session, listened, now).await;

        if session.is_remote {
            self.close_remote(session, is_downloaded, now).await
        } else {
            self.close_local(session, now).await
        }
    }

    async fn close_local(&self, mut session: PlaybackSession, now: i64) -> Result<()> {
        session.updated_at = now;
        match self
            .inner
            .remote
            .bulk_sync_sessions(vec![session.to_bulk_record()])
            .await
        {
            Ok(()) => {
                self.inner.stores.sessions.delete(&session.id).await?;
                info!(session_id = %session.id, "Local-only session uploaded and closed");
                self.emit(SessionEvent::Closed {
                    session_id: session.id.to_string(),
                });
            }
            Err(error) => {
                info!(error = %error, session_id = %session.id, "Keeping local-only session for bulk sync");
                self.detach(session, now).await?;
            }
        }
        Ok(())
    }

    async fn close_remote(
        &self,
        mut session: PlaybackSession,
        is_downloaded: bool,
        now: i64,
    ) -> Result<()> {
        let remote = &self.inner.remote;

        if session.pending_listening_time > 0.0 {
            match remote
                .sync_session(
                    session.id.as_str(),
                    session.pending_listening_time,
                    session.current_time,
                )
                .await
            {
                Ok(()) => session.commit_pending(now),
                Err(error) => {
                    debug!(error = %error, "Final sync before close failed");
                }
            }
        }

        match remote.close_session(session.id.as_str()).await {
            Ok(()) => {
                self.inner.stores.sessions.delete(&session.id).await?;
                info!(session_id = %session.id, "Session closed");
                self.emit(SessionEvent::Closed {
                    session_id: session.id.to_string(),
                });
                Ok(())
            }
            Err(error) if is_downloaded => {
                info!(error = %error, session_id = %session.id, "Close failed for downloaded item, clearing locally");
                self.detach(session, now).await
            }
            Err(error) => {
                warn!(error = %error, session_id = %session.id, "Session close failed");
                self.schedule_close_retry(session, now).await
            }
        }
    }

    async fn schedule_close_retry(&self, mut session: PlaybackSession, now: i64) -> Result<()> {
        let Some(delay) = self
            .inner
            .config
            .close_retry
            .next_delay(session.close_retries())
        else {
            warn!(
                session_id = %session.id,
                retries = session.close_retry_count,
                "Close retries exhausted, abandoning session"
            );
            self.emit(SessionEvent::Abandoned {
                session_id: session.id.to_string(),
            });
            return self.detach(session, now).await;
        };

        session.close_retry_count += 1;
        session.status = SessionStatus::Closing;
        session.updated_at = now;
        self.inner.stores.sessions.upsert(&session).await?;

        let manager = self.clone();
        let session_id = session.id.clone();
        let job = deferred_job(move || async move {
            if let Err(error) = manager.retry_close(&session_id).await {
                warn!(error = %error, %session_id, "Close retry failed");
            }
        });

        self.inner
            .executor
            .schedule_once(&close_retry_task_id(&session.id), delay, job)
            .await
            .map_err(|e| SessionError::Scheduler(e.to_string()))?;

        info!(
            session_id = %session.id,
            attempt = session.close_retry_count,
            delay_secs = delay.as_secs(),
            "Session close retry scheduled"
        );
        self.emit(SessionEvent::CloseRetryScheduled {
            session_id: session.id.to_string(),
            attempt: session.close_retries(),
            delay_secs: delay.as_secs(),
        });
        Ok(())
    }

    /// Retry a remote close previously left in the closing state.
    ///
    /// Boxed because a failed retry schedules the next one, which runs this
    /// again from a deferred job.
    pub fn retry_close<'a>(&'a self, session_id: &'a SessionId) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let _guard = self.inner.state.lock().await;
            let now = self.now();

            let Some(session) = self.inner.stores.sessions.get(session_id).await? else {
                debug!(%session_id, "Session already gone, skipping close retry");
                return Ok(());
            };
            if session.status != SessionStatus::Closing {
                return Ok(());
            }

            self.close_remote(session, false, now).await
        })
    }

    // =========================================================================
    // Start-up reconciliation
    // =========================================================================

    /// Upload every persisted session not owned by this process in a single
    /// batch and forget them. Returns the number of sessions uploaded.
    ///
    /// Sessions of the same item are uploaded individually with their own
    /// cumulative totals, so time from several local-only sessions adds up.
    #[instrument(skip(self))]
    pub async fn sync_unsynced_sessions(&self) -> Result<usize> {
        let state = self.inner.state.lock().await;
        let owned = state.current.as_ref().map(|s| s.id.clone());

        let leftovers: Vec<PlaybackSession> = self
            .inner
            .stores
            .sessions
            .list_all()
            .await?
            .into_iter()
            .filter(|session| Some(&session.id) != owned.as_ref())
            .collect();

        if leftovers.is_empty() {
            debug!("No unsynced sessions");
            return Ok(0);
        }

        let records = leftovers.iter().map(PlaybackSession::to_bulk_record).collect();
        self.inner.remote.bulk_sync_sessions(records).await?;

        for session in &leftovers {
            if session.status == SessionStatus::Closing {
                let task_id = TaskId::new(close_retry_task_id(&session.id));
                if let Err(error) = self.inner.executor.cancel_task(&task_id).await {
                    debug!(error = %error, "Failed to cancel close retry");
                }
            }
            self.inner.stores.sessions.delete(&session.id).await?;
        }

        let count = leftovers.len();
        info!(count, "Uploaded unsynced sessions");
        self.emit(SessionEvent::BulkSynced { count });
        Ok(count)
    }

    fn now(&self) -> i64 {
        self.inner.clock.unix_timestamp_millis()
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(bus) = &self.inner.event_bus {
            bus.emit(CoreEvent::Session(event)).ok();
        }
    }
}
