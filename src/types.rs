use std::time::Instant;

use chrono::{DateTime, Utc};

/// One captured camera image, owned RGBA bytes.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

/// Completed classification of one recording session.
#[derive(Clone, Debug, PartialEq)]
pub struct SignResult {
    pub label: String,
    pub confidence: f32,
    pub recorded_at: DateTime<Utc>,
}

/// Where the recording state machine currently is. Cyclic: every session
/// ends back in `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Recording,
    Processing,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Recording => "recording",
            SessionStatus::Processing => "processing",
        }
    }
}

/// Session lifecycle notifications delivered to the control surface.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    Started,
    /// The session ended with fewer frames than the configured minimum;
    /// no classification was attempted.
    InsufficientData { captured: usize, required: usize },
    Completed(SignResult),
}
