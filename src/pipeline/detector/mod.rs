//! Landmark detection boundary and the frame-capture worker.

mod common;
mod ort;

use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;

use super::normalizer::{self, LandmarkFrame};
use super::session::GestureSession;
use crate::types::Frame;

pub use self::ort::OrtLandmarkDetector;

/// Raw output of one detector call: zero-or-one pose keypoint set and up to
/// two hand keypoint sets. Hand order is the detector's, positional.
#[derive(Clone, Debug, Default)]
pub struct Detection {
    pub pose: Vec<[f32; 3]>,
    pub hands: Vec<Vec<[f32; 3]>>,
}

/// Extracts body and hand keypoints from one camera frame.
pub trait LandmarkDetector: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Detection>;
}

/// Spawn the frame-capture worker: drain the camera channel to the newest
/// frame, detect, normalize, offer the result to the session. A detector
/// error degrades to an all-zero frame rather than ending the session, and
/// the camera frame is released at the end of every iteration no matter the
/// outcome. Exits when the camera side hangs up.
pub fn start_capture_worker(
    mut detector: Box<dyn LandmarkDetector>,
    frame_rx: Receiver<Frame>,
    session: Arc<GestureSession>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Some(frame) = recv_latest_frame(&frame_rx) {
            if !session.is_recording() {
                continue;
            }

            let landmarks = match detector.detect(&frame) {
                Ok(detection) => normalizer::normalize(&detection),
                Err(err) => {
                    log::warn!("landmark detection failed: {err:?}");
                    LandmarkFrame::missing()
                }
            };
            if !landmarks.any_detection() {
                log::trace!("no usable landmarks in frame");
            }
            session.ingest(landmarks);
        }
    })
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>) -> Option<Frame> {
    let mut frame = frame_rx.recv().ok()?;
    // Drop stale frames if detection is still catching up to avoid backlog.
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Some(frame)
}
