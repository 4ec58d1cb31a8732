use std::time::Duration;

use thiserror::Error;

/// How the preprocessor fills the tail of a sequence shorter than the
/// classifier's expected length. Fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillPolicy {
    Zeros,
    RepeatLast,
}

/// The sign classes the reference model was trained on, in output order.
pub const DEFAULT_LABELS: &[&str] = &[
    "ausencia",
    "oliguria",
    "sangrado_vaginal",
    "taquicardia",
    "taquipnea",
    "tinitus",
];

/// Label reported when inference fails or the winning class index falls
/// outside the label table.
pub const UNRECOGNIZED_LABEL: &str = "no sign recognized";

/// Pipeline tuning, fixed at construction and never mutated at runtime.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Frames accepted per session before capture auto-completes.
    pub capacity: usize,
    /// Sessions that drain fewer frames than this abort without
    /// classification.
    pub min_frames: usize,
    /// Frame count of the classifier's fixed input tensor.
    pub target_frames: usize,
    pub fill: FillPolicy,
    /// Ordered class labels, index-aligned with the classifier output.
    pub labels: Vec<String>,
    /// A session recording longer than this completes as if stopped.
    pub max_session: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            min_frames: 10,
            target_frames: 30,
            fill: FillPolicy::Zeros,
            labels: DEFAULT_LABELS.iter().map(|label| label.to_string()).collect(),
            max_session: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("capacity must be at least 1")]
    ZeroCapacity,
    #[error("min_frames must be non-zero and below capacity {capacity}, got {min_frames}")]
    BadMinFrames { min_frames: usize, capacity: usize },
    #[error("target_frames must be at least 1")]
    ZeroTargetFrames,
    #[error("label table must not be empty")]
    EmptyLabels,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.min_frames == 0 || self.min_frames >= self.capacity {
            return Err(ConfigError::BadMinFrames {
                min_frames: self.min_frames,
                capacity: self.capacity,
            });
        }
        if self.target_frames == 0 {
            return Err(ConfigError::ZeroTargetFrames);
        }
        if self.labels.is_empty() {
            return Err(ConfigError::EmptyLabels);
        }
        Ok(())
    }
}
