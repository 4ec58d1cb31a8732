//! The one shared mutable structure of the pipeline: an ordered frame store
//! with a capture gate, both behind a single mutex. An append can therefore
//! never observe a half-cleared buffer, land after a drain, or race the
//! capacity auto-stop.

use std::mem;
use std::sync::{Mutex, MutexGuard};

use super::normalizer::LandmarkFrame;

/// Outcome of offering one frame to the buffer.
#[derive(Debug)]
pub enum Ingest {
    /// Capture is not active; the frame was discarded.
    Ignored,
    Accepted { len: usize },
    /// This frame filled the buffer to capacity. The gate closed in the same
    /// lock hold, so exactly one caller ever receives the completed sequence.
    Filled(Vec<LandmarkFrame>),
}

#[derive(Debug, Default)]
struct Inner {
    capturing: bool,
    frames: Vec<LandmarkFrame>,
}

#[derive(Debug)]
pub struct SessionBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl SessionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    // A peer panicking mid-hold must not wedge the capture worker; the
    // guarded state is valid after any complete operation, so poisoning is
    // absorbed rather than propagated.
    fn locked(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Discard any previous session's frames and open the capture gate.
    pub fn begin(&self) {
        let mut inner = self.locked();
        inner.frames = Vec::with_capacity(self.capacity);
        inner.capturing = true;
    }

    pub fn ingest(&self, frame: LandmarkFrame) -> Ingest {
        let mut inner = self.locked();
        if !inner.capturing {
            return Ingest::Ignored;
        }
        inner.frames.push(frame);
        if inner.frames.len() >= self.capacity {
            inner.capturing = false;
            Ingest::Filled(mem::take(&mut inner.frames))
        } else {
            Ingest::Accepted {
                len: inner.frames.len(),
            }
        }
    }

    /// Close the capture gate and take whatever has accumulated, in arrival
    /// order. `None` when no capture is active (never started, already
    /// drained, or auto-completed at capacity).
    pub fn drain(&self) -> Option<Vec<LandmarkFrame>> {
        let mut inner = self.locked();
        if !inner.capturing {
            return None;
        }
        inner.capturing = false;
        Some(mem::take(&mut inner.frames))
    }

    pub fn is_capturing(&self) -> bool {
        self.locked().capturing
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locked().frames.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::pipeline::normalizer::tagged_frame;

    #[test]
    fn fills_to_capacity_exactly_once() {
        let buffer = SessionBuffer::new(30);
        buffer.begin();

        let mut filled = None;
        for i in 0..30 {
            match buffer.ingest(tagged_frame(i as f32)) {
                Ingest::Accepted { len } => assert_eq!(len, i + 1),
                Ingest::Filled(frames) => {
                    assert_eq!(i, 29);
                    filled = Some(frames);
                }
                Ingest::Ignored => panic!("frame {i} ignored while capturing"),
            }
        }

        let frames = filled.expect("buffer never filled");
        assert_eq!(frames.len(), 30);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.values()[0], i as f32);
        }

        // The gate closed with the capacity frame; nothing else gets in.
        assert!(!buffer.is_capturing());
        assert!(matches!(buffer.ingest(tagged_frame(99.0)), Ingest::Ignored));
        assert!(buffer.drain().is_none());
    }

    #[test]
    fn drain_returns_partial_sequence_in_order() {
        let buffer = SessionBuffer::new(30);
        buffer.begin();
        for i in 0..7 {
            buffer.ingest(tagged_frame(i as f32));
        }

        let frames = buffer.drain().expect("capture was active");
        assert_eq!(frames.len(), 7);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.values()[0], i as f32);
        }

        assert!(buffer.drain().is_none());
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn begin_resets_leftover_frames() {
        let buffer = SessionBuffer::new(10);
        buffer.begin();
        buffer.ingest(tagged_frame(1.0));
        buffer.begin();
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_capturing());
    }

    #[test]
    fn ingest_before_begin_is_ignored() {
        let buffer = SessionBuffer::new(10);
        assert!(matches!(buffer.ingest(tagged_frame(0.0)), Ingest::Ignored));
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn concurrent_drain_sees_an_ordered_prefix() {
        let buffer = Arc::new(SessionBuffer::new(1000));
        buffer.begin();

        let writer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    buffer.ingest(tagged_frame(i as f32));
                }
            })
        };

        let frames = buffer.drain().expect("capture was active");
        writer.join().unwrap();

        // Whatever landed before the drain is a contiguous prefix of the
        // writer's sequence.
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.values()[0], i as f32);
        }
        assert!(!buffer.is_capturing());
        assert_eq!(buffer.len(), 0);
    }
}
