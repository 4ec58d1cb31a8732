//! The recording state machine.
//!
//! `Idle --start--> Recording --stop / capacity / timeout--> Processing
//! --> Idle`. Frame acceptance is gated by the buffer's capture flag; the
//! classification of a completed sequence runs on a dedicated worker thread
//! so a multi-hundred-millisecond inference never stalls the capture worker
//! or the control surface.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};

use super::buffer::{Ingest, SessionBuffer};
use super::classifier::{SequenceClassifier, resolve_label};
use super::normalizer::LandmarkFrame;
use super::preprocess;
use crate::config::{PipelineConfig, UNRECOGNIZED_LABEL};
use crate::history::ResultSink;
use crate::types::{SessionEvent, SessionStatus, SignResult};

/// Why a session stopped accepting frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopReason {
    Capacity,
    Stopped,
    Timeout,
}

/// State observed by both the control surface and the classifier worker.
struct SessionShared {
    status: Mutex<SessionStatus>,
    latest: Mutex<Option<SignResult>>,
    events: Sender<SessionEvent>,
}

/// The capture-and-classify session controller. Cheap to share behind an
/// `Arc`; the capture worker calls `ingest`, the UI/control side everything
/// else.
pub struct GestureSession {
    cfg: PipelineConfig,
    buffer: SessionBuffer,
    started_at: Mutex<Option<Instant>>,
    shared: Arc<SessionShared>,
    jobs: Sender<Vec<LandmarkFrame>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl GestureSession {
    /// Build the state machine and spawn its classifier worker. The returned
    /// receiver observes session lifecycle events; the worker exits once the
    /// session (and with it the job channel) is dropped.
    pub fn spawn(
        cfg: PipelineConfig,
        classifier: Box<dyn SequenceClassifier>,
        sink: Box<dyn ResultSink>,
    ) -> (Arc<Self>, Receiver<SessionEvent>, thread::JoinHandle<()>) {
        let (event_tx, event_rx) = unbounded();
        let (job_tx, job_rx) = unbounded();

        let shared = Arc::new(SessionShared {
            status: Mutex::new(SessionStatus::Idle),
            latest: Mutex::new(None),
            events: event_tx,
        });

        let worker = {
            let shared = shared.clone();
            let cfg = cfg.clone();
            thread::spawn(move || run_classifier_worker(shared, cfg, classifier, sink, job_rx))
        };

        let session = Arc::new(Self {
            buffer: SessionBuffer::new(cfg.capacity),
            started_at: Mutex::new(None),
            shared,
            jobs: job_tx,
            cfg,
        });

        (session, event_rx, worker)
    }

    /// Begin a recording session: clear the buffer, stamp the start time,
    /// open the capture gate. Rejected unless the machine is `Idle`.
    pub fn start(&self) -> bool {
        {
            let mut status = lock(&self.shared.status);
            if *status != SessionStatus::Idle {
                return false;
            }
            *status = SessionStatus::Recording;
        }
        self.buffer.begin();
        *lock(&self.started_at) = Some(Instant::now());
        let _ = self.shared.events.send(SessionEvent::Started);
        true
    }

    /// User-initiated stop. Safe to call at any time, including concurrently
    /// with an in-flight frame append; only an active capture is drained,
    /// and the drained snapshot is a prefix of continued capture.
    pub fn stop(&self) {
        if let Some(frames) = self.buffer.drain() {
            self.complete(frames, StopReason::Stopped);
        }
    }

    /// Offer one normalized frame from the capture worker. Acceptance is
    /// purely count-based; all-zero frames count toward capacity.
    pub fn ingest(&self, frame: LandmarkFrame) {
        if self.expired() {
            // The session overran its recording window; complete with what
            // accumulated and discard the late frame.
            if let Some(frames) = self.buffer.drain() {
                self.complete(frames, StopReason::Timeout);
            }
            return;
        }

        match self.buffer.ingest(frame) {
            Ingest::Ignored => {}
            Ingest::Accepted { len } => {
                log::trace!("captured frame {len}/{}", self.cfg.capacity)
            }
            Ingest::Filled(frames) => self.complete(frames, StopReason::Capacity),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.buffer.is_capturing()
    }

    pub fn status(&self) -> SessionStatus {
        *lock(&self.shared.status)
    }

    /// Most recent completed classification, updated by the worker.
    pub fn latest_result(&self) -> Option<SignResult> {
        lock(&self.shared.latest).clone()
    }

    fn expired(&self) -> bool {
        let started_at = *lock(&self.started_at);
        started_at.is_some_and(|at| at.elapsed() > self.cfg.max_session)
    }

    /// Route a drained sequence: abort below the minimum-frame threshold,
    /// hand off to the classifier worker otherwise.
    fn complete(&self, frames: Vec<LandmarkFrame>, reason: StopReason) {
        *lock(&self.shared.status) = SessionStatus::Processing;
        *lock(&self.started_at) = None;
        log::debug!("capture finished ({reason:?}) with {} frames", frames.len());

        if frames.len() < self.cfg.min_frames {
            *lock(&self.shared.status) = SessionStatus::Idle;
            let _ = self.shared.events.send(SessionEvent::InsufficientData {
                captured: frames.len(),
                required: self.cfg.min_frames,
            });
            return;
        }

        if self.jobs.send(frames).is_err() {
            log::error!("classifier worker is not running, dropping completed session");
            *lock(&self.shared.status) = SessionStatus::Idle;
        }
    }
}

fn run_classifier_worker(
    shared: Arc<SessionShared>,
    cfg: PipelineConfig,
    mut classifier: Box<dyn SequenceClassifier>,
    mut sink: Box<dyn ResultSink>,
    jobs: Receiver<Vec<LandmarkFrame>>,
) {
    while let Ok(frames) = jobs.recv() {
        let input = preprocess::build_input(&frames, cfg.target_frames, cfg.fill);

        let resolved = match classifier.classify(&input) {
            Ok(probabilities) => {
                let resolved = resolve_label(&probabilities, &cfg.labels);
                if resolved.is_none() {
                    log::warn!(
                        "classifier returned {} probabilities for {} labels",
                        probabilities.len(),
                        cfg.labels.len()
                    );
                }
                resolved
            }
            Err(err) => {
                log::warn!("classification failed: {err:?}");
                None
            }
        };

        let (label, confidence) =
            resolved.unwrap_or_else(|| (UNRECOGNIZED_LABEL.to_string(), 0.0));
        let result = SignResult {
            label,
            confidence,
            recorded_at: Utc::now(),
        };

        // Fire-and-forget: a failing sink never affects the state machine.
        if let Err(err) = sink.record(&result.label, result.recorded_at) {
            log::warn!("failed to record result: {err:?}");
        }

        *lock(&shared.latest) = Some(result.clone());
        *lock(&shared.status) = SessionStatus::Idle;
        let _ = shared.events.send(SessionEvent::Completed(result));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use chrono::{DateTime, Utc};
    use ndarray::Array3;

    use super::*;
    use crate::config::FillPolicy;
    use crate::pipeline::detector::Detection;
    use crate::pipeline::normalizer::{self, tagged_frame};

    const EVENT_WAIT: Duration = Duration::from_secs(5);

    struct ScriptedClassifier {
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<Array3<f32>>>>,
        response: Option<Vec<f32>>,
    }

    impl SequenceClassifier for ScriptedClassifier {
        fn classify(&mut self, input: &Array3<f32>) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(input.clone());
            self.response
                .clone()
                .ok_or_else(|| anyhow!("scripted inference failure"))
        }
    }

    struct RecordingSink {
        rows: Arc<Mutex<Vec<String>>>,
    }

    impl ResultSink for RecordingSink {
        fn record(&mut self, label: &str, _recorded_at: DateTime<Utc>) -> Result<()> {
            self.rows.lock().unwrap().push(label.to_string());
            Ok(())
        }
    }

    struct Harness {
        session: Arc<GestureSession>,
        events: Receiver<SessionEvent>,
        calls: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<Array3<f32>>>>,
        rows: Arc<Mutex<Vec<String>>>,
    }

    fn harness(cfg: PipelineConfig, response: Option<Vec<f32>>) -> Harness {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let rows = Arc::new(Mutex::new(Vec::new()));
        let classifier = ScriptedClassifier {
            calls: calls.clone(),
            seen: seen.clone(),
            response,
        };
        let sink = RecordingSink { rows: rows.clone() };
        let (session, events, _worker) =
            GestureSession::spawn(cfg, Box::new(classifier), Box::new(sink));
        Harness {
            session,
            events,
            calls,
            seen,
            rows,
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            capacity: 30,
            min_frames: 10,
            target_frames: 30,
            fill: FillPolicy::Zeros,
            labels: ["a", "b", "c"].iter().map(|s| s.to_string()).collect(),
            max_session: Duration::from_secs(30),
        }
    }

    fn pose_frame() -> normalizer::LandmarkFrame {
        normalizer::normalize(&Detection {
            pose: vec![
                [1.0, 2.0, 3.0],
                [4.0, 5.0, 6.0],
                [7.0, 8.0, 9.0],
                [10.0, 11.0, 12.0],
            ],
            hands: Vec::new(),
        })
    }

    fn expect_started(h: &Harness) {
        match h.events.recv_timeout(EVENT_WAIT).unwrap() {
            SessionEvent::Started => {}
            other => panic!("expected Started, got {other:?}"),
        }
    }

    fn expect_completed(h: &Harness) -> SignResult {
        match h.events.recv_timeout(EVENT_WAIT).unwrap() {
            SessionEvent::Completed(result) => result,
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn capacity_auto_completes_and_classifies_once() {
        let h = harness(test_config(), Some(vec![0.1, 0.8, 0.1]));

        assert!(h.session.start());
        expect_started(&h);
        assert!(h.session.is_recording());

        h.session.ingest(pose_frame());
        for _ in 1..30 {
            h.session.ingest(LandmarkFrame::missing());
        }
        // Gate closed with frame 30; late arrivals are ignored.
        assert!(!h.session.is_recording());
        h.session.ingest(tagged_frame(99.0));

        let result = expect_completed(&h);
        assert_eq!(result.label, "b");
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.session.status(), SessionStatus::Idle);
        assert_eq!(h.session.latest_result(), Some(result));
        assert_eq!(*h.rows.lock().unwrap(), ["b"]);

        // The injected pose values survive flatten/reshape into the first
        // four tensor rows.
        let seen = h.seen.lock().unwrap();
        let tensor = &seen[0];
        assert_eq!(tensor.dim(), (1, 30, 3));
        for (i, expected) in [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0], [10.0, 11.0, 12.0]]
            .iter()
            .enumerate()
        {
            for (j, &value) in expected.iter().enumerate() {
                assert_eq!(tensor[[0, i, j]], value);
            }
        }
        assert_eq!(tensor[[0, 4, 0]], 0.0);
    }

    #[test]
    fn early_stop_below_threshold_skips_classification() {
        let h = harness(test_config(), Some(vec![1.0, 0.0, 0.0]));

        assert!(h.session.start());
        expect_started(&h);
        for i in 0..5 {
            h.session.ingest(tagged_frame(i as f32));
        }
        h.session.stop();

        match h.events.recv_timeout(EVENT_WAIT).unwrap() {
            SessionEvent::InsufficientData { captured, required } => {
                assert_eq!(captured, 5);
                assert_eq!(required, 10);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.session.status(), SessionStatus::Idle);
        assert!(h.session.latest_result().is_none());

        // A fresh session starts from an empty buffer: refilling to capacity
        // classifies exactly the new frames.
        assert!(h.session.start());
        expect_started(&h);
        for _ in 0..30 {
            h.session.ingest(pose_frame());
        }
        expect_completed(&h);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        let seen = h.seen.lock().unwrap();
        assert_eq!(seen[0][[0, 0, 0]], 1.0);
    }

    #[test]
    fn stop_preserves_arrival_order() {
        let cfg = PipelineConfig {
            capacity: 10,
            min_frames: 2,
            // Large enough that every captured frame's tag lands in the
            // tensor: frame i starts at row i * FRAME_DIM / 3.
            target_frames: 300,
            ..test_config()
        };
        let h = harness(cfg, Some(vec![0.0, 0.0, 1.0]));

        assert!(h.session.start());
        expect_started(&h);
        for i in 0..4 {
            h.session.ingest(tagged_frame(10.0 + i as f32));
        }
        h.session.stop();
        expect_completed(&h);

        let seen = h.seen.lock().unwrap();
        let tensor = &seen[0];
        let rows_per_frame = normalizer::FRAME_DIM / 3;
        for i in 0..4 {
            assert_eq!(tensor[[0, i * rows_per_frame, 0]], 10.0 + i as f32);
        }
    }

    #[test]
    fn classifier_failure_resolves_to_fallback_result() {
        let h = harness(test_config(), None);

        assert!(h.session.start());
        expect_started(&h);
        for _ in 0..30 {
            h.session.ingest(LandmarkFrame::missing());
        }

        let result = expect_completed(&h);
        assert_eq!(result.label, UNRECOGNIZED_LABEL);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(h.session.status(), SessionStatus::Idle);
        // The fallback is still persisted, like any other outcome.
        assert_eq!(*h.rows.lock().unwrap(), [UNRECOGNIZED_LABEL]);
    }

    #[test]
    fn arity_mismatch_counts_as_classifier_failure() {
        // Two probabilities against a three-label table.
        let h = harness(test_config(), Some(vec![0.9, 0.1]));

        assert!(h.session.start());
        expect_started(&h);
        for _ in 0..30 {
            h.session.ingest(LandmarkFrame::missing());
        }
        let result = expect_completed(&h);
        assert_eq!(result.label, UNRECOGNIZED_LABEL);
    }

    #[test]
    fn start_rejected_while_active() {
        let h = harness(test_config(), Some(vec![1.0, 0.0, 0.0]));
        assert!(h.session.start());
        assert!(!h.session.start());
        expect_started(&h);
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let h = harness(test_config(), Some(vec![1.0, 0.0, 0.0]));
        h.session.stop();
        assert_eq!(h.session.status(), SessionStatus::Idle);
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn overrunning_the_recording_window_completes_the_session() {
        let cfg = PipelineConfig {
            max_session: Duration::from_millis(1),
            ..test_config()
        };
        let h = harness(cfg, Some(vec![1.0, 0.0, 0.0]));

        assert!(h.session.start());
        expect_started(&h);
        thread::sleep(Duration::from_millis(20));

        // The late frame is discarded; nothing accumulated, so the session
        // aborts as insufficient.
        h.session.ingest(tagged_frame(1.0));
        match h.events.recv_timeout(EVENT_WAIT).unwrap() {
            SessionEvent::InsufficientData { captured, .. } => assert_eq!(captured, 0),
            other => panic!("expected InsufficientData, got {other:?}"),
        }
        assert_eq!(h.session.status(), SessionStatus::Idle);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }
}
