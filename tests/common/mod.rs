// Shared doubles and helpers for the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use vidcap::{
    CaptureBackend, CaptureConfig, CaptureDevice, CaptureError, CaptureEvent, Frame, PixelFormat, Resolution,
    SharedControlState,
};

/// What the next `read()` returns.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Frame,
    FrameSized(Resolution),
    Fail,
    Panic,
    End,
}

/// Side effects applied inside `read()`, before it returns.
#[derive(Debug, Clone)]
pub enum Action {
    SetRecording(bool),
    SetPaused(bool),
    Stop,
    /// Deletes a directory tree, e.g. the recording output, to make finalization fail.
    RemoveDir(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub opens: Arc<AtomicUsize>,
    pub reads: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// In-memory source driven by a per-read script.
pub struct ScriptedSource {
    resolution: Resolution,
    control: SharedControlState,
    script: VecDeque<(Step, Vec<Action>)>,
    counters: Counters,
    fail_open: bool,
    endless: bool,
    open: bool,
    sequence: u64,
}

impl ScriptedSource {
    pub fn new(resolution: Resolution, control: SharedControlState) -> Self {
        ScriptedSource {
            resolution,
            control,
            script: VecDeque::new(),
            counters: Counters::default(),
            fail_open: false,
            endless: false,
            open: false,
            sequence: 0,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.script.push_back((step, Vec::new()));
        self
    }

    pub fn step_with(mut self, step: Step, actions: &[Action]) -> Self {
        self.script.push_back((step, actions.to_vec()));
        self
    }

    pub fn frames(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.script.push_back((Step::Frame, Vec::new()));
        }
        self
    }

    /// Keeps delivering frames once the script runs out.
    pub fn endless(mut self) -> Self {
        self.endless = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }

    fn frame(&mut self, resolution: Resolution) -> Frame {
        let shade = (self.sequence * 30 % 256) as u8;
        let frame = Frame::new(
            vec![shade; resolution.pixel_count() * 3],
            resolution,
            PixelFormat::Bgr8,
            self.sequence,
        )
        .expect("scripted frame matches its resolution");
        self.sequence += 1;
        frame
    }
}

impl CaptureDevice for ScriptedSource {
    fn describe(&self) -> String {
        "Scripted".to_string()
    }

    fn open(&mut self) -> Result<Resolution, CaptureError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(CaptureError::DeviceUnavailable("scripted open failure".to_string()));
        }
        self.open = true;
        Ok(self.resolution)
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let (step, actions) = match self.script.pop_front() {
            Some(entry) => entry,
            None if self.endless => (Step::Frame, Vec::new()),
            None => (Step::End, Vec::new()),
        };
        for action in actions {
            match action {
                Action::SetRecording(on) => self.control.set_recording(on),
                Action::SetPaused(on) => self.control.set_paused(on),
                Action::Stop => self.control.set_running(false),
                Action::RemoveDir(dir) => std::fs::remove_dir_all(&dir).expect("scripted directory removal"),
            }
        }
        match step {
            Step::Frame => {
                let res = self.resolution;
                Ok(Some(self.frame(res)))
            }
            Step::FrameSized(res) => Ok(Some(self.frame(res))),
            Step::Fail => Err(CaptureError::ReadFailed("scripted read failure".to_string())),
            Step::Panic => panic!("scripted source exploded"),
            Step::End => Ok(None),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.open = false;
    }

    fn negotiated_resolution(&self) -> Option<Resolution> {
        self.open.then_some(self.resolution)
    }
}

/// Unpaced config for scripted sources.
pub fn scripted_config() -> CaptureConfig {
    vidcap::common::logging_setup::basic_env_logging_init();
    CaptureConfig::new(CaptureBackend::FileOrStream { path: "scripted".into() })
        .with_frame_size(16, 12)
        .with_target_fps(0)
}

/// Everything currently queued on the channel.
pub fn drain(events: &mut UnboundedReceiver<CaptureEvent>) -> Vec<CaptureEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn frame_sequences(events: &[CaptureEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            CaptureEvent::FrameReady(frame) => Some(frame.sequence()),
            _ => None,
        })
        .collect()
}

pub fn source_invalid_reasons(events: &[CaptureEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            CaptureEvent::SourceInvalid(reason) => Some(reason.clone()),
            _ => None,
        })
        .collect()
}

/// Asserts the stream ends with exactly one `Stopped`.
pub fn assert_stopped_last(events: &[CaptureEvent]) {
    let stopped = events.iter().filter(|e| matches!(e, CaptureEvent::Stopped(_))).count();
    assert_eq!(stopped, 1, "expected exactly one Stopped event in {:?}", events);
    assert!(matches!(events.last(), Some(CaptureEvent::Stopped(_))), "Stopped must be last: {:?}", events);
}
