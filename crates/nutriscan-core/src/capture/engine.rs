use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::frame::{Frame, FrameSource, SymbolDecoder};
use super::session::{CaptureMode, CaptureSession, CaptureState, FrameOutcome, SessionTuning};
use crate::{config::CaptureConfig, models::ScanResult, resolver::ProductResolver, Error, Result};

/// What a running session reports to whoever is watching it
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Started {
        session_id: Uuid,
        mode: CaptureMode,
    },
    /// A barcode passed normalization. In manual mode the session is now armed.
    BarcodeDetected {
        session_id: Uuid,
        barcode: String,
    },
    /// Throttled nudge after a run of empty frames
    NoBarcodeHint {
        session_id: Uuid,
        streak: u32,
    },
    Resolved {
        session_id: Uuid,
        result: ScanResult,
    },
    NotFound {
        session_id: Uuid,
        barcode: String,
    },
    ResolutionFailed {
        session_id: Uuid,
        barcode: String,
        error: String,
    },
    SourceFailed {
        session_id: Uuid,
        error: String,
    },
    /// Always the last event of a session
    Stopped {
        session_id: Uuid,
        state: CaptureState,
    },
}

/// Final numbers for a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    pub session_id: Uuid,
    pub mode: CaptureMode,
    pub final_state: CaptureState,
    pub frames_processed: u64,
    pub resolutions: u32,
}

#[derive(Debug)]
enum Command {
    Capture,
}

/// Starts capture sessions. Only one session may hold a frame source at a time.
pub struct CaptureEngine {
    resolver: Arc<ProductResolver>,
    tuning: SessionTuning,
    event_capacity: usize,
    source_busy: Arc<AtomicBool>,
}

impl CaptureEngine {
    pub fn new(resolver: Arc<ProductResolver>, config: &CaptureConfig) -> Self {
        Self {
            resolver,
            tuning: SessionTuning::from(config),
            event_capacity: config.event_capacity.max(1),
            source_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a session currently owns a frame source
    pub fn is_busy(&self) -> bool {
        self.source_busy.load(Ordering::Acquire)
    }

    /// Spawn the frame loop for a new session. Must be called inside a tokio
    /// runtime. The engine owns `source` from here on and releases it exactly
    /// once, even when the session is refused.
    pub fn start<S, D>(&self, mode: CaptureMode, mut source: S, decoder: D) -> Result<CaptureHandle>
    where
        S: FrameSource + 'static,
        D: SymbolDecoder + 'static,
    {
        let Some(lease) = SourceLease::acquire(&self.source_busy) else {
            source.release();
            return Err(Error::Capture(
                "frame source is held by another capture session".into(),
            ));
        };

        let mut session = CaptureSession::new(mode, self.tuning);
        if let Err(e) = session.start() {
            source.release();
            return Err(e);
        }
        let session_id = session.id();
        info!("Capture session {} started in {} mode on {}", session_id, mode, source.name());

        let (events_tx, events_rx) = mpsc::channel(self.event_capacity);
        let (frames_tx, frames_rx) = watch::channel(None);
        let (commands_tx, commands_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let frame_loop = FrameLoop {
            session,
            source: Box::new(source),
            decoder: Box::new(decoder),
            resolver: Arc::clone(&self.resolver),
            events: events_tx,
            frames: frames_tx,
            commands: commands_rx,
            cancel: cancel.clone(),
            lease,
        };
        let task = tokio::spawn(frame_loop.run());

        Ok(CaptureHandle {
            session_id,
            mode,
            events: events_rx,
            frames: frames_rx,
            commands: commands_tx,
            guard: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }
}

/// Control and output side of a running session.
///
/// Dropping the handle stops the session.
pub struct CaptureHandle {
    session_id: Uuid,
    mode: CaptureMode,
    events: mpsc::Receiver<CaptureEvent>,
    frames: watch::Receiver<Option<Frame>>,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
    guard: DropGuard,
    task: JoinHandle<CaptureSummary>,
}

impl CaptureHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Next event, or `None` once the session has finished and every event
    /// has been delivered
    pub async fn next_event(&mut self) -> Option<CaptureEvent> {
        self.events.recv().await
    }

    /// Most recent frame. Older frames are dropped if nobody looks.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.frames.borrow().clone()
    }

    /// Manual-mode capture trigger. Ignored by the session if nothing is armed.
    pub async fn capture(&self) -> Result<()> {
        self.commands
            .send(Command::Capture)
            .await
            .map_err(|_| Error::Capture("capture session has already ended".into()))
    }

    /// Ask the session to stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Token that stops this session when cancelled, e.g. from a signal handler
    pub fn stop_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the session to finish on its own. Undelivered events are
    /// discarded.
    pub async fn join(self) -> Result<CaptureSummary> {
        let CaptureHandle {
            events,
            guard,
            task,
            ..
        } = self;
        let _ = guard.disarm();
        drop(events);

        task.await
            .map_err(|e| Error::Capture(format!("capture loop failed: {}", e)))
    }

    pub async fn stop_and_join(self) -> Result<CaptureSummary> {
        self.stop();
        self.join().await
    }
}

fn reap(session_id: Uuid, joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!("Resolution task in session {} failed: {}", session_id, e);
    }
}

/// Marks the frame source as taken for as long as it lives
struct SourceLease {
    busy: Arc<AtomicBool>,
}

impl SourceLease {
    fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            busy: Arc::clone(busy),
        })
    }
}

impl Drop for SourceLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

struct FrameLoop {
    session: CaptureSession,
    source: Box<dyn FrameSource>,
    decoder: Box<dyn SymbolDecoder>,
    resolver: Arc<ProductResolver>,
    events: mpsc::Sender<CaptureEvent>,
    frames: watch::Sender<Option<Frame>>,
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    lease: SourceLease,
}

impl FrameLoop {
    async fn run(mut self) -> CaptureSummary {
        let session_id = self.session.id();
        self.emit(CaptureEvent::Started {
            session_id,
            mode: self.session.mode(),
        });

        let mut resolutions = JoinSet::new();
        let mut frames_processed = 0u64;

        while !self.session.state().is_terminal() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Capture session {} stop requested", session_id);
                    self.session.stop();
                }
                Some(command) = self.commands.recv() => {
                    self.on_command(command, &mut resolutions);
                }
                Some(joined) = resolutions.join_next(), if !resolutions.is_empty() => {
                    reap(session_id, joined);
                }
                frame = self.source.next_frame() => match frame {
                    Ok(Some(frame)) => {
                        frames_processed += 1;
                        self.on_frame(frame, &mut resolutions);
                    }
                    Ok(None) => {
                        debug!("Frame source for session {} ran dry", session_id);
                        self.session.stop();
                    }
                    Err(e) => {
                        warn!("Frame source failed in session {}: {}", session_id, e);
                        self.emit(CaptureEvent::SourceFailed {
                            session_id,
                            error: e.to_string(),
                        });
                        self.session.stop();
                    }
                },
            }
        }

        // Give the camera back before waiting on the network
        self.source.release();
        drop(self.lease);

        // In-flight resolutions finish; each one is a single cache transaction
        while let Some(joined) = resolutions.join_next().await {
            reap(session_id, joined);
        }

        let final_state = self.session.state();
        info!(
            "Capture session {} finished as {:?} after {} frame(s)",
            session_id, final_state, frames_processed
        );
        let _ = self
            .events
            .send(CaptureEvent::Stopped {
                session_id,
                state: final_state,
            })
            .await;

        CaptureSummary {
            session_id,
            mode: self.session.mode(),
            final_state,
            frames_processed,
            resolutions: self.session.resolutions(),
        }
    }

    fn on_frame(&mut self, frame: Frame, resolutions: &mut JoinSet<()>) {
        let symbols: Vec<String> = self
            .decoder
            .decode(&frame)
            .into_iter()
            .map(|symbol| symbol.text)
            .collect();
        self.frames.send_replace(Some(frame));

        let session_id = self.session.id();
        match self.session.on_frame(Instant::now(), &symbols) {
            FrameOutcome::Empty {
                streak,
                show_hint: true,
            } => self.emit(CaptureEvent::NoBarcodeHint { session_id, streak }),
            FrameOutcome::Armed(barcode) => {
                self.emit(CaptureEvent::BarcodeDetected { session_id, barcode });
            }
            FrameOutcome::Resolve(barcode) => {
                self.emit(CaptureEvent::BarcodeDetected {
                    session_id,
                    barcode: barcode.clone(),
                });
                self.dispatch(barcode, resolutions);
            }
            FrameOutcome::Empty { .. } | FrameOutcome::Suppressed | FrameOutcome::Ignored => {}
        }
    }

    fn on_command(&mut self, command: Command, resolutions: &mut JoinSet<()>) {
        match command {
            Command::Capture => match self.session.capture() {
                Some(barcode) => self.dispatch(barcode, resolutions),
                None => debug!("Capture trigger ignored, nothing armed"),
            },
        }
    }

    /// Resolution runs off the frame loop so a slow network never stalls frames
    fn dispatch(&self, barcode: String, resolutions: &mut JoinSet<()>) {
        let resolver = Arc::clone(&self.resolver);
        let events = self.events.clone();
        let session_id = self.session.id();

        resolutions.spawn(async move {
            let event = match resolver.resolve(&barcode).await {
                Ok(result) => CaptureEvent::Resolved { session_id, result },
                Err(Error::NotFound(_)) => CaptureEvent::NotFound { session_id, barcode },
                Err(e) => {
                    warn!("Resolving {} failed: {}", barcode, e);
                    CaptureEvent::ResolutionFailed {
                        session_id,
                        barcode,
                        error: e.to_string(),
                    }
                }
            };
            if events.send(event).await.is_err() {
                debug!("Event consumer for session {} is gone", session_id);
            }
        });
    }

    /// Never blocks the frame loop. A full queue drops the event.
    fn emit(&self, event: CaptureEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Capture event queue full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::scripted::{ScriptedFrameSource, TextPayloadDecoder};
    use crate::models::{ProductRecord, ResolutionSource};
    use crate::source::{MockProductSource, ProductSource};
    use async_trait::async_trait;
    use nutriscan_cache::CacheManager;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Answers every lookup after a delay, noting how often the frame source
    /// had been released by then
    struct SlowService {
        delay: Duration,
        source_released: Arc<AtomicU32>,
        released_when_answered: Arc<AtomicU32>,
    }

    impl SlowService {
        fn new(delay: Duration, source_released: Arc<AtomicU32>) -> Self {
            Self {
                delay,
                source_released,
                released_when_answered: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl ProductSource for SlowService {
        async fn fetch_product(&self, barcode: &str) -> Result<ProductRecord> {
            tokio::time::sleep(self.delay).await;
            self.released_when_answered
                .store(self.source_released.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(ProductRecord::new(barcode, "Slow Bar"))
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }

        async fn submit_product(&self, _product: &ProductRecord) -> Result<()> {
            Ok(())
        }

        async fn fetch_catalog(&self) -> Result<Vec<ProductRecord>> {
            Ok(Vec::new())
        }
    }

    fn engine_on(service: impl ProductSource + 'static) -> (CaptureEngine, Arc<CacheManager>) {
        let cache = Arc::new(CacheManager::in_memory().unwrap());
        let resolver = Arc::new(ProductResolver::new(Arc::new(service), Arc::clone(&cache)));
        (CaptureEngine::new(resolver, &CaptureConfig::default()), cache)
    }

    fn engine_with(mock: MockProductSource) -> (CaptureEngine, Arc<CacheManager>) {
        engine_on(mock)
    }

    async fn wait_for_detection(handle: &mut CaptureHandle) -> String {
        loop {
            match tokio::time::timeout(Duration::from_secs(5), handle.next_event()).await {
                Ok(Some(CaptureEvent::BarcodeDetected { barcode, .. })) => return barcode,
                Ok(Some(_)) => continue,
                Ok(None) => panic!("session ended before a detection"),
                Err(_) => panic!("no detection within 5s"),
            }
        }
    }

    fn known_products() -> MockProductSource {
        let mut mock = MockProductSource::new();
        mock.expect_fetch_product()
            .returning(|barcode| Ok(ProductRecord::new(barcode, "Test Bar")));
        mock
    }

    async fn drain(handle: &mut CaptureHandle) -> Vec<CaptureEvent> {
        let mut events = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(5), handle.next_event()).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return events,
                Err(_) => panic!("session never finished, got {:?}", events),
            }
        }
    }

    fn resolved(events: &[CaptureEvent]) -> Vec<&ScanResult> {
        events
            .iter()
            .filter_map(|e| match e {
                CaptureEvent::Resolved { result, .. } => Some(result),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_auto_mode_resolves_once() {
        let mut mock = MockProductSource::new();
        mock.expect_fetch_product()
            .times(1)
            .returning(|barcode| Ok(ProductRecord::new(barcode, "Test Bar")));
        let (engine, cache) = engine_with(mock);

        let source = ScriptedFrameSource::repeating("1234567890", 50);
        let released = source.release_counter();

        let mut handle = engine
            .start(CaptureMode::Auto, source, TextPayloadDecoder)
            .unwrap();
        let events = drain(&mut handle).await;
        assert!(handle.latest_frame().is_some());
        let summary = handle.join().await.unwrap();

        assert_eq!(resolved(&events).len(), 1);
        assert_eq!(resolved(&events)[0].source, ResolutionSource::Remote);
        assert!(matches!(events.first(), Some(CaptureEvent::Started { .. })));
        assert!(matches!(
            events.last(),
            Some(CaptureEvent::Stopped {
                state: CaptureState::Captured,
                ..
            })
        ));
        assert_eq!(summary.final_state, CaptureState::Captured);
        assert_eq!(summary.resolutions, 1);
        assert_eq!(cache.count_scans().unwrap(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_manual_mode_waits_for_trigger() {
        let (engine, cache) = engine_with(known_products());
        let source = ScriptedFrameSource::new(["", "42"]).hold_last(true);

        let mut handle = engine
            .start(CaptureMode::Manual, source, TextPayloadDecoder)
            .unwrap();

        assert_eq!(wait_for_detection(&mut handle).await, "42");
        assert_eq!(cache.count_scans().unwrap(), 0);

        handle.capture().await.unwrap();
        let events = drain(&mut handle).await;
        let summary = handle.join().await.unwrap();

        assert_eq!(resolved(&events).len(), 1);
        assert_eq!(summary.final_state, CaptureState::Captured);
        assert_eq!(cache.count_scans().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stop_releases_source_once() {
        let mut mock = MockProductSource::new();
        mock.expect_fetch_product().never();
        let (engine, cache) = engine_with(mock);

        let source = ScriptedFrameSource::new([""])
            .hold_last(true)
            .with_interval(Duration::from_millis(1));
        let released = source.release_counter();

        let handle = engine
            .start(CaptureMode::Auto, source, TextPayloadDecoder)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let summary = handle.stop_and_join().await.unwrap();

        assert_eq!(summary.final_state, CaptureState::Stopped);
        assert_eq!(summary.resolutions, 0);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(cache.count_scans().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_only_one_session_holds_the_source() {
        let (engine, _cache) = engine_with(known_products());

        let first = engine
            .start(
                CaptureMode::Manual,
                ScriptedFrameSource::new([""])
                    .hold_last(true)
                    .with_interval(Duration::from_millis(1)),
                TextPayloadDecoder,
            )
            .unwrap();
        assert!(engine.is_busy());

        let refused = ScriptedFrameSource::new(["1"]);
        let refused_released = refused.release_counter();
        let err = engine
            .start(CaptureMode::Auto, refused, TextPayloadDecoder)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Capture(_)));
        assert_eq!(refused_released.load(Ordering::SeqCst), 1);

        first.stop_and_join().await.unwrap();
        assert!(!engine.is_busy());

        let mut next = engine
            .start(
                CaptureMode::Auto,
                ScriptedFrameSource::new(["1"]),
                TextPayloadDecoder,
            )
            .unwrap();
        drain(&mut next).await;
    }

    #[tokio::test]
    async fn test_continuous_mode_cools_down_per_barcode() {
        let (engine, cache) = engine_with(known_products());
        let source = ScriptedFrameSource::new(["A", "A", "", "A", "B", "B"]);

        let mut handle = engine
            .start(CaptureMode::Continuous, source, TextPayloadDecoder)
            .unwrap();
        let events = drain(&mut handle).await;
        let summary = handle.join().await.unwrap();

        let barcodes: Vec<&str> = resolved(&events)
            .iter()
            .map(|r| r.product.barcode.as_str())
            .collect();
        assert_eq!(barcodes.len(), 2);
        assert!(barcodes.contains(&"A"));
        assert!(barcodes.contains(&"B"));
        assert_eq!(summary.final_state, CaptureState::Stopped);
        assert_eq!(cache.count_scans().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_continuous_two_products_in_view_scan_once_each() {
        let (engine, cache) = engine_with(known_products());
        let source =
            ScriptedFrameSource::new((0..30).map(|i| if i % 2 == 0 { "A,B" } else { "B,A" }));

        let mut handle = engine
            .start(CaptureMode::Continuous, source, TextPayloadDecoder)
            .unwrap();
        let events = drain(&mut handle).await;
        handle.join().await.unwrap();

        assert_eq!(resolved(&events).len(), 2);
        assert_eq!(cache.count_scans().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_slow_lookup_does_not_stall_frames() {
        let service = SlowService::new(Duration::from_millis(1500), Arc::new(AtomicU32::new(0)));
        let (engine, cache) = engine_on(service);
        let source = ScriptedFrameSource::new(["A", ""])
            .hold_last(true)
            .with_interval(Duration::from_millis(2));

        let mut handle = engine
            .start(CaptureMode::Continuous, source, TextPayloadDecoder)
            .unwrap();
        wait_for_detection(&mut handle).await;

        let before = handle.latest_frame().unwrap().id;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after = handle.latest_frame().unwrap().id;

        assert!(after > before + 5, "frames stalled at {} -> {}", before, after);
        assert_eq!(cache.count_scans().unwrap(), 0);

        let summary = handle.stop_and_join().await.unwrap();
        assert!(summary.frames_processed > 5);
        assert_eq!(cache.count_scans().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stop_mid_lookup_keeps_product_and_scan_together() {
        let source = ScriptedFrameSource::new(["A", ""])
            .hold_last(true)
            .with_interval(Duration::from_millis(1));
        let released = source.release_counter();
        let service = SlowService::new(Duration::from_millis(300), Arc::clone(&released));
        let released_when_answered = Arc::clone(&service.released_when_answered);
        let (engine, cache) = engine_on(service);

        let mut handle = engine
            .start(CaptureMode::Continuous, source, TextPayloadDecoder)
            .unwrap();
        wait_for_detection(&mut handle).await;
        assert_eq!(cache.count_scans().unwrap(), 0);

        handle.stop();
        let summary = handle.join().await.unwrap();

        assert_eq!(summary.final_state, CaptureState::Stopped);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        // The camera was already back when the lookup answered
        assert_eq!(released_when_answered.load(Ordering::SeqCst), 1);
        assert_eq!(cache.product_count().unwrap(), 1);
        assert_eq!(cache.count_scans().unwrap(), 1);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_unknown_barcode_reports_not_found() {
        let mut mock = MockProductSource::new();
        mock.expect_fetch_product()
            .returning(|barcode| Err(Error::NotFound(barcode.to_string())));
        let (engine, cache) = engine_with(mock);

        let mut handle = engine
            .start(
                CaptureMode::Auto,
                ScriptedFrameSource::new(["0012345678905"]),
                TextPayloadDecoder,
            )
            .unwrap();
        let events = drain(&mut handle).await;

        assert!(events.iter().any(|e| matches!(
            e,
            CaptureEvent::NotFound { barcode, .. } if barcode == "012345678905"
        )));
        assert_eq!(cache.count_scans().unwrap(), 0);
    }
}
