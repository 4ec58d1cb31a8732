//! Deterministic resampling of a captured frame sequence into the
//! classifier's fixed input shape.

use ndarray::Array3;

use super::normalizer::LandmarkFrame;
use crate::config::FillPolicy;

const COORDS_PER_ROW: usize = 3;

/// Build the `(1, target_frames, 3)` input tensor from a drained session.
///
/// The frame sequence is flattened to one scalar stream and every three
/// consecutive scalars become one tensor row: the first `target_frames * 3`
/// scalars when the stream is long enough, right-padded per `fill` when it
/// is not. Pure: identical input always yields the identical tensor.
///
/// Callers reject empty sessions via the minimum-frame threshold; should one
/// slip through anyway, the result degrades to a single all-zero row.
pub fn build_input(
    frames: &[LandmarkFrame],
    target_frames: usize,
    fill: FillPolicy,
) -> Array3<f32> {
    if frames.is_empty() || target_frames == 0 {
        return Array3::zeros((1, 1, COORDS_PER_ROW));
    }

    let want = target_frames * COORDS_PER_ROW;
    let mut scalars: Vec<f32> = frames
        .iter()
        .flat_map(|frame| frame.values().iter().copied())
        .take(want)
        .collect();

    if scalars.len() < want {
        let pad = match fill {
            FillPolicy::Zeros => 0.0,
            FillPolicy::RepeatLast => scalars.last().copied().unwrap_or(0.0),
        };
        scalars.resize(want, pad);
    }

    let mut tensor = Array3::zeros((1, target_frames, COORDS_PER_ROW));
    for (i, value) in scalars.into_iter().enumerate() {
        tensor[[0, i / COORDS_PER_ROW, i % COORDS_PER_ROW]] = value;
    }
    tensor
}
