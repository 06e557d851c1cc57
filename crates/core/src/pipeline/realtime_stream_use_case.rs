use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classification::domain::emotion_classifier::EmotionClassifier;
use crate::detection::domain::face_locator::{Detection, FaceLocator};
use crate::pipeline::admission_controller::{AdmissionController, ConcurrencyLimit, Permit};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::result_formatter::build_overlays;
use crate::pipeline::slot_table::SlotTable;
use crate::pipeline::stream_error::StreamError;
use crate::pipeline::worker_dispatcher::WorkerDispatcher;
use crate::shared::frame::Frame;
use crate::video::domain::display_surface::DisplaySurface;
use crate::video::domain::frame_source::FrameSource;

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    SourceExhausted,
    SourceFailed,
    ExitKey,
    FrameLimit,
}

/// Counters collected over one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames: usize,
    pub dispatched: usize,
    /// Dispatches granted outside the budget to slots with no result yet.
    pub bootstrapped: usize,
    pub refused: usize,
    pub locator_failures: usize,
    pub reason: ShutdownReason,
}

#[derive(Clone, Debug)]
pub struct StreamOptions {
    pub max_faces: usize,
    pub limit: ConcurrencyLimit,
    /// Exit-key wait per frame; bounds the loop's minimum period.
    pub key_poll_timeout: Duration,
    /// Stop after this many presented frames.
    pub max_frames: Option<usize>,
}

#[derive(Default)]
struct Tally {
    frames: usize,
    dispatched: usize,
    bootstrapped: usize,
    refused: usize,
    locator_failures: usize,
}

/// The real-time loop: capture, locate, dispatch, render, display.
///
/// The loop never waits on classification. Workers launched for one frame
/// publish into the slot table and whatever is there when a later frame
/// renders is what gets drawn.
pub struct RealtimeStreamUseCase {
    source: Box<dyn FrameSource>,
    locator: Box<dyn FaceLocator>,
    surface: Box<dyn DisplaySurface>,
    dispatcher: WorkerDispatcher,
    table: Arc<SlotTable>,
    admission: Arc<AdmissionController>,
    logger: Box<dyn PipelineLogger>,
    options: StreamOptions,
}

impl RealtimeStreamUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        locator: Box<dyn FaceLocator>,
        classifier: Arc<dyn EmotionClassifier>,
        surface: Box<dyn DisplaySurface>,
        logger: Box<dyn PipelineLogger>,
        options: StreamOptions,
    ) -> Self {
        Self {
            source,
            locator,
            surface,
            dispatcher: WorkerDispatcher::new(classifier),
            table: Arc::new(SlotTable::new(options.max_faces)),
            admission: Arc::new(AdmissionController::new(options.limit)),
            logger,
            options,
        }
    }

    pub fn slot_table(&self) -> Arc<SlotTable> {
        Arc::clone(&self.table)
    }

    pub fn admission(&self) -> Arc<AdmissionController> {
        Arc::clone(&self.admission)
    }

    /// Waits for background workers; only useful once the loop has ended.
    pub fn wait_for_workers(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    /// Runs until the source ends, an exit key arrives or the frame limit
    /// is hit. Only a display failure is returned as an error, and only
    /// after the source and surface have been released.
    pub fn execute(&mut self) -> Result<StreamSummary, StreamError> {
        self.logger.info(&format!(
            "Streaming with {} face slot(s), concurrency {}",
            self.table.capacity(),
            self.admission.limit()
        ));

        let mut tally = Tally::default();
        let outcome = self.run_loop(&mut tally);
        let closed = self.shutdown();
        self.logger.summary();

        let reason = outcome?;
        closed?;
        Ok(StreamSummary {
            frames: tally.frames,
            dispatched: tally.dispatched,
            bootstrapped: tally.bootstrapped,
            refused: tally.refused,
            locator_failures: tally.locator_failures,
            reason,
        })
    }

    fn run_loop(&mut self, tally: &mut Tally) -> Result<ShutdownReason, StreamError> {
        loop {
            if self.options.max_frames.is_some_and(|max| tally.frames >= max) {
                return Ok(ShutdownReason::FrameLimit);
            }

            let t0 = Instant::now();
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(ShutdownReason::SourceExhausted),
                Err(e) => {
                    log::warn!("{}", StreamError::Source(e.to_string()));
                    return Ok(ShutdownReason::SourceFailed);
                }
            };
            self.logger.timing("capture", elapsed_ms(t0));

            let t0 = Instant::now();
            let detections = self.locate(&frame, tally);
            self.logger.timing("locate", elapsed_ms(t0));
            self.logger.metric("faces", detections.len() as f64);

            let t0 = Instant::now();
            let (boxes, crops): (Vec<_>, Vec<_>) =
                detections.into_iter().map(|d| (d.bbox, d.crop)).unzip();
            let refused = self.dispatch_all(crops, tally);
            self.logger.timing("dispatch", elapsed_ms(t0));
            self.logger.metric("refused", refused as f64);
            self.logger
                .metric("in_flight", self.table.total_in_flight() as f64);

            let t0 = Instant::now();
            let overlays = build_overlays(&boxes, &self.table);
            self.logger.timing("render", elapsed_ms(t0));

            let t0 = Instant::now();
            self.surface
                .present(frame, &overlays)
                .map_err(|e| StreamError::Display(e.to_string()))?;
            tally.frames += 1;
            self.logger.progress(tally.frames);

            let key = self.surface.poll_key(self.options.key_poll_timeout);
            self.logger.timing("display", elapsed_ms(t0));
            if key.is_some_and(|k| k.is_exit()) {
                return Ok(ShutdownReason::ExitKey);
            }
        }
    }

    /// A failing locator yields no faces for this frame.
    fn locate(&mut self, frame: &Frame, tally: &mut Tally) -> Vec<Detection> {
        match self.locator.locate(frame) {
            Ok(detections) => detections,
            Err(e) => {
                tally.locator_failures += 1;
                log::warn!(
                    "Frame {}: {}",
                    frame.index(),
                    StreamError::Locator(e.to_string())
                );
                Vec::new()
            }
        }
    }

    /// Returns how many faces were refused admission.
    fn dispatch_all(&self, crops: Vec<Frame>, tally: &mut Tally) -> usize {
        let mut refused = 0;
        for (slot, crop) in crops.into_iter().take(self.table.capacity()).enumerate() {
            let Some(permit) = admit_slot(&self.table, &self.admission, slot) else {
                log::trace!("Slot {slot}: refused, budget exhausted");
                refused += 1;
                continue;
            };
            if permit.is_bootstrap() {
                log::debug!("Slot {slot}: bootstrap dispatch");
                tally.bootstrapped += 1;
            }

            match self.dispatcher.dispatch(self.table.begin(slot), permit, crop) {
                Ok(()) => tally.dispatched += 1,
                Err(e) => log::warn!("{e}"),
            }
        }
        tally.refused += refused;
        refused
    }

    fn shutdown(&mut self) -> Result<(), StreamError> {
        self.source.close();
        let closed = self
            .surface
            .close()
            .map_err(|e| StreamError::Display(e.to_string()));

        let live = self.dispatcher.live_workers();
        if live > 0 {
            log::info!("Abandoning {live} running classification worker(s)");
        }
        closed
    }
}

/// Decides whether `slot` may launch a worker this frame.
///
/// A slot that has never produced a result and has nothing running gets a
/// bootstrap permit outside the budget; every other slot competes for the
/// budget first-come.
pub fn admit_slot(
    table: &SlotTable,
    admission: &Arc<AdmissionController>,
    slot: usize,
) -> Option<Permit> {
    let snapshot = table.get(slot);
    if snapshot.last_result.is_none() && snapshot.in_flight == 0 {
        return Some(Permit::bootstrap());
    }
    admission.try_acquire()
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::domain::ranked_result::RankedResult;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use crate::pipeline::stream_config::StreamConfig;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::overlay::Overlay;
    use crate::video::domain::display_surface::Key;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, OnceLock};

    const WAIT: Duration = Duration::from_secs(5);

    type FrameGate = Box<dyn Fn(usize) + Send>;

    struct StubSource {
        remaining: usize,
        index: usize,
        fail_at: Option<usize>,
        gate: Option<FrameGate>,
        closed: Arc<AtomicBool>,
    }

    impl StubSource {
        fn new(frames: usize) -> Self {
            Self {
                remaining: frames,
                index: 0,
                fail_at: None,
                gate: None,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl FrameSource for StubSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
            if self.fail_at == Some(self.index) {
                return Err("camera unplugged".into());
            }
            if self.remaining == 0 {
                return Ok(None);
            }
            if let Some(gate) = &self.gate {
                gate(self.index);
            }
            self.remaining -= 1;
            self.index += 1;
            Ok(Some(Frame::blank(64, 48, self.index - 1)))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Returns `faces` detections per frame; scripted failures by frame index.
    struct StubLocator {
        faces: usize,
        fail_frames: Vec<usize>,
    }

    impl FaceLocator for StubLocator {
        fn locate(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            if self.fail_frames.contains(&frame.index()) {
                return Err("bad tensor".into());
            }
            Ok((0..self.faces as i32)
                .map(|i| Detection {
                    bbox: BoundingBox::new(i * 10, 0, i * 10 + 8, 8),
                    crop: Frame::blank(4, 4, frame.index()),
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct SurfaceLog {
        overlays: Vec<Vec<Overlay>>,
        closed: bool,
    }

    struct StubSurface {
        log: Arc<Mutex<SurfaceLog>>,
        keys: VecDeque<Option<Key>>,
        fail_present: bool,
    }

    impl StubSurface {
        fn new() -> (Self, Arc<Mutex<SurfaceLog>>) {
            let log = Arc::new(Mutex::new(SurfaceLog::default()));
            (
                Self {
                    log: Arc::clone(&log),
                    keys: VecDeque::new(),
                    fail_present: false,
                },
                log,
            )
        }
    }

    impl DisplaySurface for StubSurface {
        fn present(
            &mut self,
            _frame: Frame,
            overlays: &[Overlay],
        ) -> Result<(), Box<dyn std::error::Error>> {
            if self.fail_present {
                return Err("window closed".into());
            }
            self.log.lock().unwrap().overlays.push(overlays.to_vec());
            Ok(())
        }

        fn poll_key(&mut self, _timeout: Duration) -> Option<Key> {
            self.keys.pop_front().flatten()
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.log.lock().unwrap().closed = true;
            Ok(())
        }
    }

    /// Each call blocks until a token arrives, then answers from a script.
    struct GatedClassifier {
        tokens: crossbeam_channel::Receiver<()>,
        calls: AtomicUsize,
        fail_after_first: bool,
    }

    impl GatedClassifier {
        fn new(fail_after_first: bool) -> (Arc<Self>, crossbeam_channel::Sender<()>) {
            let (tx, rx) = crossbeam_channel::unbounded();
            (
                Arc::new(Self {
                    tokens: rx,
                    calls: AtomicUsize::new(0),
                    fail_after_first,
                }),
                tx,
            )
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EmotionClassifier for GatedClassifier {
        fn classify(&self, _crop: &Frame) -> Result<RankedResult, Box<dyn std::error::Error>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens.recv_timeout(WAIT)?;
            if call > 0 && self.fail_after_first {
                return Err("inference failed".into());
            }
            Ok(RankedResult::from_scores(&[1.0, 5.0, 0.0, 2.0])?)
        }
    }

    fn options(max_faces: usize, max_concurrent: usize) -> StreamOptions {
        StreamOptions {
            max_faces,
            limit: ConcurrencyLimit::from_max(max_concurrent),
            key_poll_timeout: Duration::ZERO,
            max_frames: None,
        }
    }

    fn use_case(
        source: StubSource,
        faces: usize,
        classifier: Arc<dyn EmotionClassifier>,
        surface: StubSurface,
        options: StreamOptions,
    ) -> RealtimeStreamUseCase {
        RealtimeStreamUseCase::new(
            Box::new(source),
            Box::new(StubLocator {
                faces,
                fail_frames: Vec::new(),
            }),
            classifier,
            Box::new(surface),
            Box::new(NullPipelineLogger),
            options,
        )
    }

    /// Holds each frame after the first until the table has settled.
    fn settle_gate(table: Arc<OnceLock<Arc<SlotTable>>>) -> FrameGate {
        Box::new(move |index| {
            if index == 0 {
                return;
            }
            let Some(table) = table.get() else { return };
            let deadline = Instant::now() + WAIT;
            while table.total_in_flight() > 0 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
    }

    #[test]
    fn test_two_faces_with_budget_of_one() {
        let (classifier, tokens) = GatedClassifier::new(false);
        let (surface, log) = StubSurface::new();
        let mut uc = use_case(StubSource::new(2), 2, classifier.clone(), surface, options(5, 1));

        let summary = uc.execute().unwrap();

        // Frame 1 bootstraps both slots; frame 2 admits one of the two.
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.bootstrapped, 2);
        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.refused, 1);
        assert_eq!(summary.reason, ShutdownReason::SourceExhausted);
        assert_eq!(uc.admission().num_running(), 1);
        assert!(log.lock().unwrap().overlays.iter().all(|o| o.is_empty()));

        for _ in 0..3 {
            tokens.send(()).unwrap();
        }
        assert!(uc.wait_for_workers(WAIT));
        assert_eq!(classifier.calls(), 3);
        assert_eq!(uc.admission().num_running(), 0);
        assert_eq!(uc.slot_table().total_in_flight(), 0);
        assert!(uc.slot_table().last_result(0).is_some());
        assert!(uc.slot_table().last_result(1).is_some());
    }

    #[test]
    fn test_render_does_not_wait_for_workers() {
        let (classifier, tokens) = GatedClassifier::new(false);
        let (surface, log) = StubSurface::new();
        let mut uc = use_case(StubSource::new(4), 1, classifier, surface, options(5, 0));

        let summary = uc.execute().unwrap();
        assert_eq!(summary.frames, 4);
        assert_eq!(log.lock().unwrap().overlays.len(), 4);

        drop(tokens);
        assert!(uc.wait_for_workers(WAIT));
        assert_eq!(uc.slot_table().total_in_flight(), 0);
        assert!(uc.slot_table().last_result(0).is_none());
    }

    #[test]
    fn test_result_appears_on_later_frames() {
        let (classifier, tokens) = GatedClassifier::new(false);
        for _ in 0..10 {
            tokens.send(()).unwrap();
        }
        let handle = Arc::new(OnceLock::new());
        let mut source = StubSource::new(3);
        source.gate = Some(settle_gate(Arc::clone(&handle)));
        let (surface, log) = StubSurface::new();
        let mut uc = use_case(source, 1, classifier, surface, options(5, 0));
        handle.set(uc.slot_table()).ok();

        uc.execute().unwrap();
        let log = log.lock().unwrap();
        assert!(log.overlays[0].is_empty());
        let overlay = &log.overlays[1][0];
        assert_eq!(overlay.slot, 0);
        assert_eq!(overlay.bbox, BoundingBox::new(0, 0, 8, 8));
        let text: Vec<String> = overlay.lines.iter().map(ToString::to_string).collect();
        assert_eq!(text, vec!["happy: 62.5%", "surprise: 25.0%", "neutral: 12.5%"]);
        assert_eq!(log.overlays[2], log.overlays[1]);
    }

    #[test]
    fn test_failed_classification_keeps_displayed_result() {
        let (classifier, tokens) = GatedClassifier::new(true);
        for _ in 0..10 {
            tokens.send(()).unwrap();
        }
        let handle = Arc::new(OnceLock::new());
        let mut source = StubSource::new(4);
        source.gate = Some(settle_gate(Arc::clone(&handle)));
        let (surface, log) = StubSurface::new();
        let mut uc = use_case(source, 1, classifier.clone(), surface, options(5, 1));
        handle.set(uc.slot_table()).ok();

        uc.execute().unwrap();
        assert!(uc.wait_for_workers(WAIT));

        assert!(classifier.calls() >= 2);
        let log = log.lock().unwrap();
        for frame in 1..4 {
            assert_eq!(log.overlays[frame].len(), 1);
            assert_eq!(log.overlays[frame], log.overlays[1]);
        }
        assert_eq!(uc.admission().num_running(), 0);
    }

    #[test]
    fn test_faces_beyond_capacity_are_ignored() {
        let (classifier, tokens) = GatedClassifier::new(false);
        let (surface, _log) = StubSurface::new();
        let mut uc = use_case(StubSource::new(1), 4, classifier.clone(), surface, options(2, 0));

        let summary = uc.execute().unwrap();
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.refused, 0);

        drop(tokens);
        assert!(uc.wait_for_workers(WAIT));
        assert_eq!(classifier.calls(), 2);
    }

    #[test]
    fn test_default_config_bounds_workers_behind_slow_classifier() {
        let config = StreamConfig::default();
        let opts = StreamOptions {
            max_faces: config.max_faces,
            limit: config.concurrency_limit(),
            key_poll_timeout: config.key_poll_timeout(),
            max_frames: None,
        };
        let (classifier, tokens) = GatedClassifier::new(false);
        let (surface, _log) = StubSurface::new();
        let faces = config.max_faces;
        let mut uc = use_case(StubSource::new(50), faces, classifier, surface, opts);

        let summary = uc.execute().unwrap();

        // Bootstrap dispatches for every slot plus one full budget, no more.
        let budget = config.max_concurrent;
        assert_eq!(summary.bootstrapped, faces);
        assert_eq!(summary.dispatched, faces + budget);
        assert_eq!(summary.refused, 50 * faces - faces - budget);
        assert_eq!(uc.dispatcher.live_workers(), faces + budget);
        assert_eq!(uc.admission().num_running(), budget);

        drop(tokens);
        assert!(uc.wait_for_workers(WAIT));
        assert_eq!(uc.admission().num_running(), 0);
    }

    #[test]
    fn test_unbounded_never_refuses() {
        let (classifier, tokens) = GatedClassifier::new(false);
        let (surface, _log) = StubSurface::new();
        let mut uc = use_case(StubSource::new(5), 3, classifier, surface, options(3, 0));

        let summary = uc.execute().unwrap();
        assert_eq!(summary.refused, 0);
        assert_eq!(summary.bootstrapped, 3);
        assert_eq!(summary.dispatched, 15);
        assert_eq!(uc.admission().num_running(), 12);

        drop(tokens);
        assert!(uc.wait_for_workers(WAIT));
        assert_eq!(uc.admission().num_running(), 0);
    }

    #[test]
    fn test_locator_failure_is_zero_faces() {
        let (classifier, tokens) = GatedClassifier::new(false);
        let (surface, log) = StubSurface::new();
        let mut uc = RealtimeStreamUseCase::new(
            Box::new(StubSource::new(3)),
            Box::new(StubLocator {
                faces: 1,
                fail_frames: vec![0, 2],
            }),
            classifier,
            Box::new(surface),
            Box::new(NullPipelineLogger),
            options(5, 0),
        );

        let summary = uc.execute().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.locator_failures, 2);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(log.lock().unwrap().overlays.len(), 3);
        drop(tokens);
        assert!(uc.wait_for_workers(WAIT));
    }

    #[test]
    fn test_exit_key_shuts_down() {
        let (classifier, _tokens) = GatedClassifier::new(false);
        let source = StubSource::new(100);
        let source_closed = Arc::clone(&source.closed);
        let (mut surface, log) = StubSurface::new();
        surface.keys = VecDeque::from(vec![None, Some(Key::Char('x')), Some(Key::Escape)]);
        let mut uc = use_case(source, 0, classifier, surface, options(5, 0));

        let summary = uc.execute().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.reason, ShutdownReason::ExitKey);
        assert!(source_closed.load(Ordering::SeqCst));
        assert!(log.lock().unwrap().closed);
    }

    #[test]
    fn test_frame_limit() {
        let (classifier, _tokens) = GatedClassifier::new(false);
        let (surface, _log) = StubSurface::new();
        let mut opts = options(5, 0);
        opts.max_frames = Some(2);
        let mut uc = use_case(StubSource::new(10), 0, classifier, surface, opts);

        let summary = uc.execute().unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.reason, ShutdownReason::FrameLimit);
    }

    #[test]
    fn test_source_failure_ends_gracefully() {
        let (classifier, _tokens) = GatedClassifier::new(false);
        let mut source = StubSource::new(10);
        source.fail_at = Some(1);
        let (surface, log) = StubSurface::new();
        let mut uc = use_case(source, 0, classifier, surface, options(5, 0));

        let summary = uc.execute().unwrap();
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.reason, ShutdownReason::SourceFailed);
        assert!(log.lock().unwrap().closed);
    }

    #[test]
    fn test_display_failure_is_an_error() {
        let (classifier, _tokens) = GatedClassifier::new(false);
        let source = StubSource::new(10);
        let source_closed = Arc::clone(&source.closed);
        let (mut surface, log) = StubSurface::new();
        surface.fail_present = true;
        let mut uc = use_case(source, 0, classifier, surface, options(5, 0));

        assert!(matches!(uc.execute(), Err(StreamError::Display(_))));
        assert!(source_closed.load(Ordering::SeqCst));
        assert!(log.lock().unwrap().closed);
    }

    #[test]
    fn test_admit_slot_bootstraps_only_idle_empty_slots() {
        let table = Arc::new(SlotTable::new(3));
        let admission = Arc::new(AdmissionController::new(ConcurrencyLimit::from_max(1)));
        let held = admission.try_acquire().unwrap();

        // Empty and idle: granted outside the exhausted budget.
        assert!(admit_slot(&table, &admission, 0).unwrap().is_bootstrap());

        // Empty but already running: competes for the budget.
        let pending = table.begin(1);
        assert!(admit_slot(&table, &admission, 1).is_none());

        // Has a result: competes for the budget.
        table.begin(2).complete(Some(RankedResult::from_scores(&[1.0, 0.0, 0.0]).unwrap()));
        assert!(admit_slot(&table, &admission, 2).is_none());

        drop(held);
        let permit = admit_slot(&table, &admission, 2).unwrap();
        assert!(!permit.is_bootstrap());
        assert_eq!(admission.num_running(), 1);
        drop(permit);
        drop(pending);
        assert_eq!(admission.num_running(), 0);
    }
}
