//! Control flags shared between the capture worker and whoever drives it.
//!
//! The worker samples the flags once per loop iteration, so a change made by the
//! control context takes effect on the worker's next iteration (about one frame
//! interval later). Reads never block and never interrupt an in-flight read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type SharedControlState = Arc<ControlState>;

/// Point-in-time copy of the three flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlSnapshot {
    pub running: bool,
    pub paused: bool,
    pub recording: bool,
}

#[derive(Debug, Default)]
pub struct ControlState {
    running: AtomicBool,
    paused: AtomicBool,
    recording: AtomicBool,
}

impl ControlState {
    pub fn new(running: bool, paused: bool, recording: bool) -> Self {
        Self {
            running: AtomicBool::new(running),
            paused: AtomicBool::new(paused),
            recording: AtomicBool::new(recording),
        }
    }

    /// Convenience constructor returning the handle the worker expects.
    pub fn shared(running: bool, paused: bool, recording: bool) -> SharedControlState {
        Arc::new(Self::new(running, paused, recording))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, value: bool) {
        self.paused.store(value, Ordering::Release);
    }

    /// Flips `paused` and returns the new value.
    pub fn toggle_paused(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, value: bool) {
        self.recording.store(value, Ordering::Release);
    }

    /// Flips `recording` and returns the new value.
    pub fn toggle_recording(&self) -> bool {
        !self.recording.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            running: self.is_running(),
            paused: self.is_paused(),
            recording: self.is_recording(),
        }
    }
}
