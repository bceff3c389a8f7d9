//! Player controller behaviour: source selection, smart rewind and stream
//! recovery, driven through a scripted server and a recording pipeline.

use async_trait::async_trait;
use bridge_desktop::{TokioBackgroundExecutor, TokioFileSystem};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{DownloadStream, HttpClient, HttpRequest, HttpResponse};
use bridge_traits::playback::{AudioSource, MediaPipeline, QueuedTrack};
use bridge_traits::session::{
    BulkSessionRecord, RemoteChapter, RemoteSessionClient, RemoteTrack, StartedSession,
};
use bridge_traits::time::ManualClock;
use bytes::Bytes;
use core_library::db::create_test_pool;
use core_library::models::{DownloadState, ItemId};
use core_playback::{
    ControllerConfig, DownloadConfig, DownloadEngine, PlaybackError, PlayerController,
    RecoveryConfig, RecoveryOutcome,
};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use core_session::{SessionConfig, SessionManager, SessionStores};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

const TRACK_BYTES: usize = 600;

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct ScriptedServer {
    offline: AtomicBool,
    server_position: Mutex<f64>,
    started: AtomicUsize,
    sync_results: Mutex<VecDeque<BridgeResult<()>>>,
    closed: Mutex<Vec<String>>,
}

impl ScriptedServer {
    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn set_server_position(&self, position: f64) {
        *self.server_position.lock().unwrap() = position;
    }

    fn expire_next_sync(&self) {
        self.sync_results
            .lock()
            .unwrap()
            .push_back(Err(BridgeError::NotFound("HTTP 404: session".into())));
    }

    fn starts(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSessionClient for ScriptedServer {
    async fn start_session(&self, item_id: &str) -> BridgeResult<StartedSession> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BridgeError::Network("server unreachable".into()));
        }

        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(StartedSession {
            session_id: format!("play_{}", n),
            item_id: item_id.to_string(),
            title: "The Long Book".to_string(),
            current_time: *self.server_position.lock().unwrap(),
            duration: 3600.0,
            chapters: vec![
                RemoteChapter {
                    id: 0,
                    start: 0.0,
                    end: 1800.0,
                    title: "Part One".to_string(),
                },
                RemoteChapter {
                    id: 1,
                    start: 1800.0,
                    end: 3600.0,
                    title: "Part Two".to_string(),
                },
            ],
            tracks: vec![
                RemoteTrack {
                    index: 0,
                    start_offset: 0.0,
                    duration: 1800.0,
                    content_url: format!("https://abs.example/api/items/{}/file/0", item_id),
                    mime_type: Some("audio/mpeg".to_string()),
                    size_bytes: Some(TRACK_BYTES as u64),
                },
                RemoteTrack {
                    index: 1,
                    start_offset: 1800.0,
                    duration: 1800.0,
                    content_url: format!("https://abs.example/api/items/{}/file/1", item_id),
                    mime_type: Some("audio/mpeg".to_string()),
                    size_bytes: Some(TRACK_BYTES as u64),
                },
            ],
            progress_id: None,
            base_streaming_url: None,
        })
    }

    async fn sync_session(
        &self,
        _session_id: &str,
        _time_listened: f64,
        _current_time: f64,
    ) -> BridgeResult<()> {
        self.sync_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn close_session(&self, session_id: &str) -> BridgeResult<()> {
        self.closed.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    async fn bulk_sync_sessions(&self, _sessions: Vec<BulkSessionRecord>) -> BridgeResult<()> {
        Ok(())
    }
}

/// Every download request gets a fresh body of `TRACK_BYTES` bytes.
struct StaticHttpClient;

#[async_trait]
impl HttpClient for StaticHttpClient {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::new(),
        })
    }

    async fn download_stream(&self, _request: HttpRequest) -> BridgeResult<DownloadStream> {
        Ok(DownloadStream {
            content_length: Some(TRACK_BYTES as u64),
            reader: Box::new(Cursor::new(vec![3u8; TRACK_BYTES])),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PipelineCall {
    Load { queue: Vec<QueuedTrack>, position: f64 },
    Play,
    Pause,
    Seek(f64),
    Release,
}

#[derive(Default)]
struct RecordingPipeline {
    position: Mutex<f64>,
    failing_loads: AtomicUsize,
    calls: Mutex<Vec<PipelineCall>>,
}

impl RecordingPipeline {
    fn set_position(&self, position: f64) {
        *self.position.lock().unwrap() = position;
    }

    fn fail_next_load(&self) {
        self.failing_loads.fetch_add(1, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<PipelineCall> {
        self.calls.lock().unwrap().clone()
    }

    fn loads(&self) -> Vec<(Vec<QueuedTrack>, f64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PipelineCall::Load { queue, position } => Some((queue, position)),
                _ => None,
            })
            .collect()
    }

    fn last_load(&self) -> (Vec<QueuedTrack>, f64) {
        self.loads().pop().expect("pipeline was never loaded")
    }

    fn last_seek(&self) -> Option<f64> {
        self.calls().into_iter().rev().find_map(|call| match call {
            PipelineCall::Seek(position) => Some(position),
            _ => None,
        })
    }

    fn record(&self, call: PipelineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MediaPipeline for RecordingPipeline {
    async fn load(&self, tracks: Vec<QueuedTrack>, start_position: f64) -> BridgeResult<()> {
        let failing = self
            .failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BridgeError::OperationFailed("decoder init failed".into()));
        }
        self.record(PipelineCall::Load {
            queue: tracks,
            position: start_position,
        });
        self.set_position(start_position);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.record(PipelineCall::Play);
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record(PipelineCall::Pause);
        Ok(())
    }

    async fn seek(&self, position: f64) -> BridgeResult<()> {
        self.record(PipelineCall::Seek(position));
        self.set_position(position);
        Ok(())
    }

    async fn position(&self) -> BridgeResult<f64> {
        Ok(*self.position.lock().unwrap())
    }

    async fn release(&self) -> BridgeResult<()> {
        self.record(PipelineCall::Release);
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    _root: TempDir,
    server: Arc<ScriptedServer>,
    pipeline: Arc<RecordingPipeline>,
    clock: Arc<ManualClock>,
    sessions: SessionManager,
    downloads: DownloadEngine,
    controller: PlayerController,
    events: Receiver<CoreEvent>,
}

impl Harness {
    async fn new() -> Self {
        Self::with_recovery(
            RecoveryConfig::default()
                .with_delays(Duration::from_millis(1), Duration::from_millis(8)),
        )
        .await
    }

    async fn with_recovery(recovery: RecoveryConfig) -> Self {
        let pool = create_test_pool().await.unwrap();
        let stores = SessionStores::sqlite(pool);
        let root = tempfile::tempdir().unwrap();
        let server = Arc::new(ScriptedServer::default());
        let pipeline = Arc::new(RecordingPipeline::default());
        let clock = Arc::new(ManualClock::default());
        let bus = EventBus::new(256);
        let events = bus.subscribe();

        let downloads = DownloadEngine::new(
            DownloadConfig::new(root.path().join("downloads")),
            stores.items.clone(),
            stores.tracks.clone(),
            Arc::new(StaticHttpClient),
            Arc::new(TokioFileSystem::with_data_directory(root.path().to_path_buf())),
            Some(bus.clone()),
        )
        .unwrap();

        let sessions = SessionManager::new(
            SessionConfig::default(),
            server.clone(),
            stores.clone(),
            Arc::new(TokioBackgroundExecutor::new()),
            Arc::new(downloads.clone()),
            clock.clone(),
            Some(bus.clone()),
        )
        .unwrap();

        let controller = PlayerController::new(
            ControllerConfig::default()
                .with_recovery(recovery)
                .with_bearer_token("secret"),
            sessions.clone(),
            downloads.clone(),
            stores.progress.clone(),
            pipeline.clone(),
            clock.clone(),
            Some(bus),
        )
        .unwrap();

        Self {
            _root: root,
            server,
            pipeline,
            clock,
            sessions,
            downloads,
            controller,
            events,
        }
    }

    /// Open the item once so its tracks are known, then download it.
    async fn download(&self, item_id: &ItemId) {
        self.controller.play_item(item_id).await.unwrap();
        self.controller.stop().await.unwrap();
        assert!(self.downloads.start_download(item_id).await.unwrap());
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            self.downloads.wait_for_settled(item_id),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(state, DownloadState::Downloaded);
    }

    async fn wait_for(&mut self, predicate: impl Fn(&PlaybackEvent) -> bool) -> PlaybackEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let CoreEvent::Playback(event) = self.events.recv().await.unwrap() {
                    if predicate(&event) {
                        return event;
                    }
                }
            }
        })
        .await
        .expect("playback event not emitted")
    }

    fn saw(&mut self, predicate: impl Fn(&PlaybackEvent) -> bool) -> bool {
        let mut found = false;
        while let Ok(event) = self.events.try_recv() {
            if let CoreEvent::Playback(event) = event {
                found |= predicate(&event);
            }
        }
        found
    }
}

fn item() -> ItemId {
    ItemId::from("li_book")
}

// =============================================================================
// Sources
// =============================================================================

#[tokio::test]
async fn test_play_streams_remote_tracks_with_headers() {
    let h = Harness::new().await;
    h.server.set_server_position(42.0);

    h.controller.play_item(&item()).await.unwrap();

    let (queue, position) = h.pipeline.last_load();
    assert_eq!(position, 42.0);
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[1].start_offset, 1800.0);
    match &queue[0].source {
        AudioSource::RemoteStream { url, headers } => {
            assert_eq!(url, "https://abs.example/api/items/li_book/file/0");
            assert_eq!(headers.get("Authorization").unwrap(), "Bearer secret");
        }
        other => panic!("expected a remote stream, got {:?}", other),
    }
    assert!(h.controller.is_playing().await);
    assert_eq!(h.controller.current_item().await, Some(item()));
    assert!(h.sessions.is_playing().await);
}

#[tokio::test]
async fn test_downloaded_item_plays_local_files() {
    let h = Harness::new().await;
    h.download(&item()).await;

    h.controller.play_item(&item()).await.unwrap();

    let (queue, _) = h.pipeline.last_load();
    assert_eq!(queue.len(), 2);
    assert!(queue.iter().all(|track| !track.source.is_remote()));
    assert!(h.sessions.current_session().await.unwrap().is_remote);
}

#[tokio::test]
async fn test_downloaded_item_plays_while_server_is_down() {
    let h = Harness::new().await;
    h.download(&item()).await;
    h.server.set_offline(true);

    h.controller.play_item(&item()).await.unwrap();

    let session = h.sessions.current_session().await.unwrap();
    assert!(!session.is_remote);
    let (queue, _) = h.pipeline.last_load();
    assert!(queue.iter().all(|track| !track.source.is_remote()));
}

#[tokio::test]
async fn test_play_fails_when_server_down_and_not_downloaded() {
    let h = Harness::new().await;
    h.server.set_offline(true);

    let error = h.controller.play_item(&item()).await.unwrap_err();
    assert!(matches!(error, PlaybackError::Session(_)));
    assert!(h.pipeline.loads().is_empty());
    assert_eq!(h.controller.current_item().await, None);
}

// =============================================================================
// Smart rewind
// =============================================================================

#[tokio::test]
async fn test_short_pause_resumes_in_place() {
    let h = Harness::new().await;
    h.server.set_server_position(1810.0);
    h.controller.play_item(&item()).await.unwrap();

    h.controller.pause().await.unwrap();
    h.clock.advance(Duration::from_secs(60));
    h.controller.resume().await.unwrap();

    assert_eq!(h.pipeline.last_seek(), Some(1810.0));
}

#[tokio::test]
async fn test_long_pause_rewinds_to_chapter_start() {
    let h = Harness::new().await;
    h.server.set_server_position(1810.0);
    h.controller.play_item(&item()).await.unwrap();

    h.controller.pause().await.unwrap();
    h.clock.advance(Duration::from_secs(11 * 60));
    h.controller.resume().await.unwrap();

    // 30s back would cross into the previous chapter
    assert_eq!(h.pipeline.last_seek(), Some(1800.0));
    assert_eq!(h.controller.position().await, Some(1800.0));
}

#[tokio::test]
async fn test_interruption_rewinds_on_resume() {
    let h = Harness::new().await;
    h.server.set_server_position(1850.0);
    h.controller.play_item(&item()).await.unwrap();

    h.controller.handle_interruption().await.unwrap();
    assert!(!h.controller.is_playing().await);
    h.controller.resume().await.unwrap();

    assert_eq!(h.pipeline.last_seek(), Some(1820.0));
}

#[tokio::test]
async fn test_reopening_item_after_long_absence_rewinds() {
    let h = Harness::new().await;
    h.server.set_server_position(1810.0);
    h.controller.play_item(&item()).await.unwrap();
    h.controller.stop().await.unwrap();

    h.server.set_server_position(0.0);
    h.clock.advance(Duration::from_secs(11 * 60));
    h.controller.play_item(&item()).await.unwrap();

    let (_, position) = h.pipeline.last_load();
    assert_eq!(position, 1800.0);
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn test_recovery_gives_up_after_three_failed_reloads_in_a_row() {
    let mut h = Harness::new().await;
    h.controller.play_item(&item()).await.unwrap();

    for attempt in 1..=3 {
        h.pipeline.fail_next_load();
        let outcome = h.controller.handle_stream_failure("stalled").await;
        assert_eq!(outcome, RecoveryOutcome::Failed { attempt });
    }
    assert_eq!(h.controller.recovery_attempts().await, 3);
    assert_eq!(h.pipeline.loads().len(), 1);

    let outcome = h.controller.handle_stream_failure("stalled").await;
    assert_eq!(outcome, RecoveryOutcome::Exhausted);
    assert!(outcome.is_fatal());
    assert_eq!(h.pipeline.loads().len(), 1);
    assert_eq!(h.pipeline.calls().last(), Some(&PipelineCall::Release));
    assert!(!h.controller.is_playing().await);
    assert!(h.saw(|e| matches!(e, PlaybackEvent::Error { recoverable: false, .. })));

    // The session is still closed cleanly afterwards
    h.controller.stop().await.unwrap();
    assert_eq!(h.server.closed(), vec!["play_1".to_string()]);
}

#[tokio::test]
async fn test_successful_reload_resets_attempts() {
    let h = Harness::new().await;
    h.controller.play_item(&item()).await.unwrap();

    // Isolated stalls never use up the budget
    for _ in 0..5 {
        assert_eq!(
            h.controller.handle_stream_failure("stalled").await,
            RecoveryOutcome::Recovered { attempt: 1 }
        );
        assert_eq!(h.controller.recovery_attempts().await, 0);
    }
    assert_eq!(h.pipeline.loads().len(), 6);
    assert!(h.controller.is_playing().await);
}

#[tokio::test]
async fn test_playback_ready_refills_the_budget() {
    let h = Harness::new().await;
    h.controller.play_item(&item()).await.unwrap();
    h.pipeline.fail_next_load();

    assert_eq!(
        h.controller.handle_stream_failure("stalled").await,
        RecoveryOutcome::Failed { attempt: 1 }
    );
    assert_eq!(h.controller.recovery_attempts().await, 1);

    h.controller.on_playback_ready().await;
    assert_eq!(h.controller.recovery_attempts().await, 0);
    assert_eq!(
        h.controller.handle_stream_failure("stalled").await,
        RecoveryOutcome::Recovered { attempt: 1 }
    );
}

#[tokio::test]
async fn test_failed_reload_counts_as_an_attempt() {
    let mut h = Harness::new().await;
    h.controller.play_item(&item()).await.unwrap();
    h.pipeline.fail_next_load();

    let outcome = h.controller.handle_stream_failure("decoder error").await;
    assert_eq!(outcome, RecoveryOutcome::Failed { attempt: 1 });
    assert!(!h.controller.is_playing().await);
    assert!(h.saw(|e| matches!(e, PlaybackEvent::Error { recoverable: true, .. })));

    assert_eq!(
        h.controller.handle_stream_failure("decoder error").await,
        RecoveryOutcome::Recovered { attempt: 2 }
    );
    assert_eq!(h.controller.recovery_attempts().await, 0);
}

#[test]
fn test_backoff_delays_double_and_cap() {
    let recovery = RecoveryConfig::default();
    let delays: Vec<u64> = (1..=5).map(|n| recovery.delay_for(n).as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 8, 8]);
}

#[tokio::test]
async fn test_downloaded_item_is_not_recovered_over_network() {
    let mut h = Harness::new().await;
    h.download(&item()).await;
    h.controller.play_item(&item()).await.unwrap();
    let starts = h.server.starts();

    let outcome = h.controller.handle_stream_failure("file unreadable").await;

    assert_eq!(outcome, RecoveryOutcome::LocalFailure);
    assert_eq!(h.server.starts(), starts);
    assert_eq!(h.controller.recovery_attempts().await, 0);
    assert!(!h.controller.is_playing().await);
    assert!(!h.saw(|e| matches!(e, PlaybackEvent::Reconnecting { .. })));
}

#[tokio::test]
async fn test_concurrent_failure_is_ignored_while_recovering() {
    let mut h = Harness::with_recovery(
        RecoveryConfig::default().with_delays(Duration::from_millis(200), Duration::from_secs(1)),
    )
    .await;
    h.controller.play_item(&item()).await.unwrap();

    let controller = h.controller.clone();
    let first = tokio::spawn(async move { controller.handle_stream_failure("stalled").await });
    h.wait_for(|e| matches!(e, PlaybackEvent::Reconnecting { attempt: 1, .. }))
        .await;

    assert_eq!(
        h.controller.handle_stream_failure("stalled again").await,
        RecoveryOutcome::AlreadyRecovering
    );
    assert_eq!(
        first.await.unwrap(),
        RecoveryOutcome::Recovered { attempt: 1 }
    );
    assert_eq!(h.controller.recovery_attempts().await, 0);
}

#[tokio::test]
async fn test_stop_cancels_pending_backoff() {
    let mut h = Harness::with_recovery(
        RecoveryConfig::default().with_delays(Duration::from_secs(30), Duration::from_secs(30)),
    )
    .await;
    h.controller.play_item(&item()).await.unwrap();

    let controller = h.controller.clone();
    let recovery = tokio::spawn(async move { controller.handle_stream_failure("stalled").await });
    h.wait_for(|e| matches!(e, PlaybackEvent::Reconnecting { .. })).await;

    h.controller.stop().await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), recovery)
        .await
        .expect("backoff was not cancelled")
        .unwrap();
    assert_eq!(outcome, RecoveryOutcome::Cancelled);
    assert_eq!(h.pipeline.loads().len(), 1);
    assert_eq!(h.server.starts(), 1);
    assert_eq!(h.controller.current_item().await, None);
}

#[tokio::test]
async fn test_nothing_playing_is_reported() {
    let h = Harness::new().await;
    assert_eq!(
        h.controller.handle_stream_failure("stalled").await,
        RecoveryOutcome::NothingPlaying
    );
    assert!(matches!(
        h.controller.pause().await,
        Err(PlaybackError::NothingPlaying)
    ));
}

// =============================================================================
// Ticks and stop
// =============================================================================

#[tokio::test]
async fn test_tick_recovers_expired_session() {
    let mut h = Harness::new().await;
    h.controller.play_item(&item()).await.unwrap();
    h.server.expire_next_sync();

    h.clock.advance(Duration::from_secs(25));
    h.pipeline.set_position(25.0);
    h.controller.tick().await.unwrap();

    h.wait_for(|e| matches!(e, PlaybackEvent::Recovered { .. })).await;
    assert_eq!(h.server.starts(), 2);
    let session = h.sessions.current_session().await.unwrap();
    assert_eq!(session.id.as_str(), "play_2");
    assert_eq!(h.controller.recovery_attempts().await, 0);

    let (_, position) = h.pipeline.last_load();
    assert_eq!(position, 25.0);
}

#[tokio::test]
async fn test_tick_renews_expired_session_of_downloaded_item() {
    let mut h = Harness::new().await;
    h.download(&item()).await;
    h.controller.play_item(&item()).await.unwrap();
    let starts = h.server.starts();
    let loads = h.pipeline.loads().len();
    h.saw(|_| false);
    h.server.expire_next_sync();

    h.clock.advance(Duration::from_secs(25));
    h.pipeline.set_position(25.0);
    h.controller.tick().await.unwrap();

    assert!(h.controller.is_playing().await);
    assert!(h.sessions.is_playing().await);
    assert_eq!(h.server.starts(), starts + 1);
    let session = h.sessions.current_session().await.unwrap();
    assert_eq!(session.id.as_str(), format!("play_{}", starts + 1));

    // Local files keep playing untouched
    assert_eq!(h.pipeline.loads().len(), loads);
    assert_ne!(h.pipeline.calls().last(), Some(&PipelineCall::Pause));
    assert!(!h.saw(|e| matches!(
        e,
        PlaybackEvent::Error { .. } | PlaybackEvent::Reconnecting { .. }
    )));
}

#[tokio::test]
async fn test_local_failure_pauses_pipeline() {
    let h = Harness::new().await;
    h.download(&item()).await;
    h.controller.play_item(&item()).await.unwrap();

    assert_eq!(
        h.controller.handle_stream_failure("file unreadable").await,
        RecoveryOutcome::LocalFailure
    );
    assert_eq!(h.pipeline.calls().last(), Some(&PipelineCall::Pause));
    assert!(!h.sessions.is_playing().await);
}

#[tokio::test]
async fn test_tick_is_quiet_while_paused() {
    let h = Harness::new().await;
    h.controller.play_item(&item()).await.unwrap();
    h.controller.pause().await.unwrap();
    let calls = h.pipeline.calls().len();

    h.clock.advance(Duration::from_secs(60));
    h.controller.tick().await.unwrap();

    assert_eq!(h.pipeline.calls().len(), calls);
}

#[tokio::test]
async fn test_stop_closes_session_and_releases_pipeline() {
    let mut h = Harness::new().await;
    h.controller.play_item(&item()).await.unwrap();
    h.clock.advance(Duration::from_secs(30));
    h.pipeline.set_position(30.0);

    h.controller.stop().await.unwrap();

    assert_eq!(h.server.closed(), vec!["play_1".to_string()]);
    assert!(h.sessions.current_session().await.is_none());
    assert_eq!(h.pipeline.calls().last(), Some(&PipelineCall::Release));
    assert_eq!(h.controller.current_item().await, None);
    assert!(h.saw(|e| matches!(e, PlaybackEvent::Stopped { .. })));

    // Idempotent
    h.controller.stop().await.unwrap();
}
