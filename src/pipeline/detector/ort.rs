//! ONNX Runtime landmark backend: a pose landmarker and a hand landmark
//! estimator, each run on the letterboxed full frame.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{Detection, LandmarkDetector, common};
use crate::pipeline::normalizer::HAND_POINTS;
use crate::types::Frame;

const POSE_SCORE_THRESHOLD: f32 = 0.3;
const HAND_SCORE_THRESHOLD: f32 = 0.2;

/// Keypoints emitted by the pose model; the normalizer keeps the first four.
const POSE_MODEL_POINTS: usize = 33;

pub struct OrtLandmarkDetector {
    pose: Session,
    hand: Session,
}

impl OrtLandmarkDetector {
    pub fn new(pose_model_path: &Path, hand_model_path: &Path) -> Result<Self> {
        Ok(Self {
            pose: build_session(pose_model_path)?,
            hand: build_session(hand_model_path)?,
        })
    }
}

fn build_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))
}

impl LandmarkDetector for OrtLandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detection> {
        let pose = run_keypoint_model(
            &mut self.pose,
            frame,
            common::POSE_INPUT_SIZE,
            POSE_MODEL_POINTS,
            POSE_SCORE_THRESHOLD,
        )?;

        // Full-frame hand estimation without a palm-detection stage: at most
        // one hand per frame, reported in the first positional slot.
        let hand = run_keypoint_model(
            &mut self.hand,
            frame,
            common::HAND_INPUT_SIZE,
            HAND_POINTS,
            HAND_SCORE_THRESHOLD,
        )?;

        let mut detection = Detection {
            pose: pose.unwrap_or_default(),
            hands: Vec::new(),
        };
        if let Some(points) = hand {
            detection.hands.push(points);
        }
        Ok(detection)
    }
}

/// Run one landmark model on the letterboxed frame. Output 0 is the flat
/// keypoint tensor; output 1, when present, is a detection score used to
/// gate the result.
fn run_keypoint_model(
    session: &mut Session,
    frame: &Frame,
    input_size: u32,
    count: usize,
    threshold: f32,
) -> Result<Option<Vec<[f32; 3]>>> {
    let input = common::prepare_frame(frame, input_size)?;
    let tensor = Tensor::from_array(input)?;
    let outputs = session
        .run(ort::inputs![tensor])
        .context("failed to run landmark session")?;

    if outputs.len() < 1 {
        return Err(anyhow!("landmark model returned no outputs"));
    }

    let score = if outputs.len() > 1 {
        outputs[1]
            .try_extract_array::<f32>()
            .ok()
            .and_then(|arr| arr.iter().next().copied())
            .unwrap_or(0.0)
    } else {
        1.0
    };
    if score < threshold {
        return Ok(None);
    }

    let coords = outputs[0].try_extract_array::<f32>()?;
    let flattened: Vec<f32> = coords.iter().copied().collect();
    Ok(Some(common::decode_keypoints(&flattened, count, input_size)?))
}
