//! Turns raw detector output into fixed-dimension landmark frames.
//!
//! Every frame has exactly `FRAME_DIM` scalars at fixed offsets: the first
//! four pose points, then two positional hand slots of 21 points each.
//! Missing or partial body parts leave their sub-range zero-filled, so an
//! offset always means the same coordinate regardless of detection success.

use super::detector::Detection;

pub const POSE_POINTS: usize = 4;
pub const HAND_POINTS: usize = 21;
const COORDS: usize = 3;

const POSE_RANGE_LEN: usize = POSE_POINTS * COORDS;
const HAND_RANGE_LEN: usize = HAND_POINTS * COORDS;

/// Dimension of one landmark frame: 4 pose points and two 21-point hands,
/// three coordinates each.
pub const FRAME_DIM: usize = POSE_RANGE_LEN + 2 * HAND_RANGE_LEN;

/// Scalar offset of each positional hand slot.
const HAND_OFFSETS: [usize; 2] = [POSE_RANGE_LEN, POSE_RANGE_LEN + HAND_RANGE_LEN];

/// One normalized landmark frame. Immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkFrame {
    values: [f32; FRAME_DIM],
    any_detection: bool,
}

impl LandmarkFrame {
    /// All-zero frame for a failed or empty detection.
    pub fn missing() -> Self {
        Self {
            values: [0.0; FRAME_DIM],
            any_detection: false,
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Whether any body part actually contributed coordinates to this frame.
    /// Ignored for buffer acceptance; kept for downstream quality gating.
    pub fn any_detection(&self) -> bool {
        self.any_detection
    }
}

/// Fold one detector result into a landmark frame. Total: a detection with
/// no usable pose and no usable hands still yields a valid all-zero frame.
pub fn normalize(detection: &Detection) -> LandmarkFrame {
    let mut values = [0.0f32; FRAME_DIM];
    let mut any_detection = false;

    // Pose contributes its first four points, or nothing at all.
    if detection.pose.len() >= POSE_POINTS {
        for (i, point) in detection.pose.iter().take(POSE_POINTS).enumerate() {
            values[i * COORDS..(i + 1) * COORDS].copy_from_slice(point);
        }
        any_detection = true;
    }

    // Hand slots are positional: detector index 0 and 1, no identity
    // tracking across frames.
    for (slot, &offset) in HAND_OFFSETS.iter().enumerate() {
        let Some(hand) = detection.hands.get(slot) else {
            continue;
        };
        if hand.len() != HAND_POINTS {
            continue;
        }
        for (i, point) in hand.iter().enumerate() {
            let at = offset + i * COORDS;
            values[at..at + COORDS].copy_from_slice(point);
        }
        any_detection = true;
    }

    LandmarkFrame {
        values,
        any_detection,
    }
}

/// Frame whose first scalar carries a recognizable tag, for ordering
/// assertions in tests.
#[cfg(test)]
pub(crate) fn tagged_frame(tag: f32) -> LandmarkFrame {
    let mut values = [0.0; FRAME_DIM];
    values[0] = tag;
    LandmarkFrame {
        values,
        any_detection: true,
    }
}
