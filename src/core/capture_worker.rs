//! Background capture worker.
//!
//! One dedicated thread owns the capture source and any open recorder. The
//! control context talks to it only through [`ControlState`] flags, which the
//! loop samples once per iteration, and receives [`CaptureEvent`]s back over an
//! unbounded channel when it took one with [`CaptureWorker::take_events`]
//! before starting. Stopping is cooperative: an in-flight `read()` is never
//! interrupted, so `join()` can block for up to one backend timeout.

use crate::camera_config::CaptureConfig;
use crate::core::capture_source::{CaptureDevice, CaptureSource};
use crate::core::control_state::SharedControlState;
use crate::core::frame::{Frame, Resolution};
use crate::core::recorder::{Recorder, RecorderSettings, RecordingSummary};
use crate::errors::CaptureError;
use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

const READ_RETRY_BACKOFF: Duration = Duration::from_millis(100);
const MIN_PAUSE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    FrameReady(Frame),
    RecordingStarted { path: std::path::PathBuf, resolution: Resolution },
    RecordingFinished(RecordingSummary),
    /// The file or stream ran out of frames. Not an error.
    Ended,
    /// Terminal failure, `"<Kind>: <detail>"`. Emitted at most once.
    SourceInvalid(String),
    /// Always the last event of a worker.
    Stopped(WorkerReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Opening,
    Running,
    Paused,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    EndOfStream,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub negotiated_resolution: Option<Resolution>,
    pub frames_emitted: u64,
    pub frames_recorded: u64,
    pub recordings: Vec<RecordingSummary>,
    pub stop_reason: StopReason,
}

impl WorkerReport {
    fn failed(reason: String) -> Self {
        WorkerReport {
            negotiated_resolution: None,
            frames_emitted: 0,
            frames_recorded: 0,
            recordings: Vec::new(),
            stop_reason: StopReason::Failed(reason),
        }
    }
}

pub type SourceFactory = Box<dyn FnOnce(&CaptureConfig) -> Box<dyn CaptureDevice> + Send>;

pub struct CaptureWorker {
    config: CaptureConfig,
    control: SharedControlState,
    recorder_settings: RecorderSettings,
    state: Arc<Mutex<WorkerState>>,
    events_tx: Option<UnboundedSender<CaptureEvent>>,
    events_taken: bool,
    source_factory: Option<SourceFactory>,
    handle: Option<JoinHandle<WorkerReport>>,
    report: Option<WorkerReport>,
}

impl CaptureWorker {
    pub fn new(config: CaptureConfig, control: SharedControlState) -> Self {
        let recorder_settings = RecorderSettings::new("./recordings", config.backend.label());
        CaptureWorker {
            config,
            control,
            recorder_settings,
            state: Arc::new(Mutex::new(WorkerState::Idle)),
            events_tx: None,
            events_taken: false,
            source_factory: None,
            handle: None,
            report: None,
        }
    }

    pub fn with_recorder_settings(mut self, settings: RecorderSettings) -> Self {
        self.recorder_settings = settings;
        self
    }

    /// Replaces the backend built from the config. The factory runs on the
    /// worker thread, so the device itself never has to be `Send`.
    pub fn with_source_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&CaptureConfig) -> Box<dyn CaptureDevice> + Send + 'static,
    {
        self.source_factory = Some(Box::new(factory));
        self
    }

    pub fn with_source<S>(self, source: S) -> Self
    where
        S: CaptureDevice + Send + 'static,
    {
        self.with_source_factory(move |_| Box::new(source) as Box<dyn CaptureDevice>)
    }

    /// Hands out the event receiver. Only the first call before `start` returns `Some`.
    /// A worker started without one emits nothing, so frames never queue up unread.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<CaptureEvent>> {
        if self.events_taken || self.handle.is_some() || self.report.is_some() {
            return None;
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = Some(events_tx);
        self.events_taken = true;
        Some(events_rx)
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn control(&self) -> &SharedControlState {
        &self.control
    }

    pub fn state(&self) -> WorkerState {
        read_state(&self.state)
    }

    pub fn is_finished(&self) -> bool {
        match &self.handle {
            Some(handle) => handle.is_finished(),
            None => self.report.is_some(),
        }
    }

    /// Sets `running` and spawns the capture thread.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.handle.is_some() || self.report.is_some() || self.state() != WorkerState::Idle {
            return Err(CaptureError::Worker("capture worker was already started".to_string()));
        }
        let factory: SourceFactory = match self.source_factory.take() {
            Some(factory) => factory,
            None => Box::new(default_source),
        };

        if self.events_tx.is_none() {
            debug!("No event receiver was taken; capture events are discarded.");
        }
        self.control.set_running(true);
        let ctx = LoopContext {
            config: self.config.clone(),
            control: Arc::clone(&self.control),
            settings: self.recorder_settings.clone(),
            state: Arc::clone(&self.state),
            events: self.events_tx.take(),
        };
        let handle = thread::Builder::new()
            .name(format!("capture-{}", self.config.backend.label()))
            .spawn(move || run_worker(ctx, factory))
            .map_err(|e| {
                self.control.set_running(false);
                CaptureError::Worker(format!("failed to spawn capture thread: {}", e))
            })?;
        info!("🚀 Capture worker started for {:?} at {} fps.", self.config.backend, self.config.target_fps);
        self.handle = Some(handle);
        Ok(())
    }

    /// Clears `running`. Returns immediately; the loop notices on its next iteration.
    pub fn request_stop(&self) {
        debug!("Stop requested for capture worker.");
        self.control.set_running(false);
    }

    /// Blocks until the worker reaches `Stopped`.
    pub fn join(&mut self) -> Result<WorkerReport, CaptureError> {
        if let Some(handle) = self.handle.take() {
            let report = handle
                .join()
                .map_err(|e| CaptureError::Worker(format!("capture thread panicked: {}", panic_message(&*e))))?;
            self.report = Some(report.clone());
            return Ok(report);
        }
        self.report
            .clone()
            .ok_or_else(|| CaptureError::Worker("capture worker was never started".to_string()))
    }

    pub fn stop(&mut self) -> Result<WorkerReport, CaptureError> {
        self.request_stop();
        self.join()
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
            if let Err(e) = self.join() {
                error!("❌ Capture worker did not shut down cleanly: {}", e);
            }
        }
    }
}

struct LoopContext {
    config: CaptureConfig,
    control: SharedControlState,
    settings: RecorderSettings,
    state: Arc<Mutex<WorkerState>>,
    events: Option<UnboundedSender<CaptureEvent>>,
}

impl LoopContext {
    fn emit(&self, event: CaptureEvent) {
        // A consumer that went away does not stop capture.
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Emits the single terminal failure and turns it into a stop reason.
    fn fail(&self, err: &CaptureError) -> StopReason {
        self.emit(CaptureEvent::SourceInvalid(err.reason()));
        StopReason::Failed(err.reason())
    }

    fn set_state(&self, next: WorkerState) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard != next {
            debug!("Capture worker state changed from {:?} to {:?}", *guard, next);
            *guard = next;
        }
    }

    fn state(&self) -> WorkerState {
        read_state(&self.state)
    }
}

fn default_source(config: &CaptureConfig) -> Box<dyn CaptureDevice> {
    Box::new(CaptureSource::from_config(config))
}

fn read_state(state: &Mutex<WorkerState>) -> WorkerState {
    match state.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `f`, turning a panic into a `Worker` error.
fn guarded<T>(f: impl FnOnce() -> Result<T, CaptureError>) -> Result<T, CaptureError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(CaptureError::Worker(format!(
            "capture thread panicked: {}",
            panic_message(&*payload)
        ))),
    }
}

fn release_source(source: &mut dyn CaptureDevice) -> Result<(), CaptureError> {
    guarded(|| {
        source.release();
        Ok(())
    })
}

fn run_worker(ctx: LoopContext, factory: SourceFactory) -> WorkerReport {
    let started = Instant::now();
    let report = run_session(&ctx, factory);
    ctx.set_state(WorkerState::Stopped);
    info!(
        "🏁 Capture worker stopped after {:?}: {} frame(s) emitted, {} recorded, reason {:?}.",
        started.elapsed(),
        report.frames_emitted,
        report.frames_recorded,
        report.stop_reason
    );
    ctx.emit(CaptureEvent::Stopped(report.clone()));
    report
}

fn run_session(ctx: &LoopContext, factory: SourceFactory) -> WorkerReport {
    ctx.set_state(WorkerState::Opening);
    let mut source = match guarded(|| Ok(factory(&ctx.config))) {
        Ok(source) => source,
        Err(e) => {
            error!("💀 Failed to build the capture source: {}", e);
            ctx.emit(CaptureEvent::SourceInvalid(e.reason()));
            return WorkerReport::failed(e.reason());
        }
    };
    let describe = source.describe();
    debug!("Opening {} (requested {} @ {} fps)...", describe, ctx.config.requested_resolution(), ctx.config.target_fps);

    let open_start = Instant::now();
    let negotiated = match guarded(|| source.open()) {
        Ok(resolution) => resolution,
        Err(e) => {
            error!("❌ Failed to open {} in {:?}: {}", describe, open_start.elapsed(), e);
            if let Err(release_err) = release_source(source.as_mut()) {
                warn!("⚠️ Releasing {} after a failed open: {}", describe, release_err);
            }
            ctx.emit(CaptureEvent::SourceInvalid(e.reason()));
            return WorkerReport::failed(e.reason());
        }
    };
    if negotiated != ctx.config.requested_resolution() {
        warn!(
            "⚠️ {} negotiated {} instead of the requested {}; recordings will use {}.",
            describe,
            negotiated,
            ctx.config.requested_resolution(),
            negotiated
        );
    }
    info!("👍 {} opened at {} in {:?}.", describe, negotiated, open_start.elapsed());

    let mut session = CaptureSession {
        source,
        recorder: None,
        negotiated,
        fps: ctx.config.target_fps.max(1) as f64,
        spans_opened: 0,
        frames_emitted: 0,
        frames_recorded: 0,
        recordings: Vec::new(),
    };
    ctx.set_state(WorkerState::Running);
    let mut stop_reason = match guarded(|| Ok(session.run(ctx))) {
        Ok(reason) => reason,
        Err(e) => {
            error!("💀 {}", e);
            ctx.fail(&e)
        }
    };

    ctx.set_state(WorkerState::Stopping);
    if let Err(e) = session.teardown(ctx) {
        if matches!(stop_reason, StopReason::Failed(_)) {
            warn!("⚠️ Teardown after a failure also failed: {}", e);
        } else {
            error!("❌ Teardown failed: {}", e);
            stop_reason = ctx.fail(&e);
        }
    }

    WorkerReport {
        negotiated_resolution: Some(negotiated),
        frames_emitted: session.frames_emitted,
        frames_recorded: session.frames_recorded,
        recordings: session.recordings,
        stop_reason,
    }
}

/// Everything the worker thread owns between open and teardown.
struct CaptureSession {
    source: Box<dyn CaptureDevice>,
    recorder: Option<Recorder>,
    negotiated: Resolution,
    fps: f64,
    spans_opened: u32,
    frames_emitted: u64,
    frames_recorded: u64,
    recordings: Vec<RecordingSummary>,
}

impl CaptureSession {
    fn run(&mut self, ctx: &LoopContext) -> StopReason {
        let interval = ctx.config.frame_interval();
        let max_retries = ctx.config.max_consecutive_read_failures;
        let mut consecutive_failures = 0u32;

        loop {
            if !ctx.control.is_running() {
                info!("🛑 Stop flag observed after {} frame(s).", self.frames_emitted);
                return StopReason::Requested;
            }

            if ctx.control.is_paused() {
                if ctx.state() != WorkerState::Paused {
                    info!("⏸️ Capture paused; {} stays open.", self.source.describe());
                    ctx.set_state(WorkerState::Paused);
                }
                thread::sleep(interval.max(MIN_PAUSE_POLL));
                continue;
            }
            if ctx.state() == WorkerState::Paused {
                info!("▶️ Capture resumed.");
                ctx.set_state(WorkerState::Running);
            }

            let iteration_start = Instant::now();
            match self.source.read() {
                Ok(Some(frame)) => {
                    consecutive_failures = 0;
                    self.frames_emitted += 1;
                    ctx.emit(CaptureEvent::FrameReady(frame.clone()));
                    if let Err(e) = self.handle_recording(ctx, &frame) {
                        error!("❌ Recording failed on frame {}: {}", frame.sequence(), e);
                        return ctx.fail(&e);
                    }
                }
                Ok(None) => {
                    info!("🏁 {} reached end of stream after {} frame(s).", self.source.describe(), self.frames_emitted);
                    ctx.emit(CaptureEvent::Ended);
                    return StopReason::EndOfStream;
                }
                Err(e @ CaptureError::ReadFailed(_)) if consecutive_failures < max_retries => {
                    consecutive_failures += 1;
                    warn!(
                        "🚫 Read failed ({}/{} retries): {}",
                        consecutive_failures, max_retries, e
                    );
                    thread::sleep(READ_RETRY_BACKOFF);
                    continue;
                }
                Err(e) => {
                    error!("❌ {} failed to deliver a frame: {}", self.source.describe(), e);
                    return ctx.fail(&e);
                }
            }

            let remaining = interval.saturating_sub(iteration_start.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
    }

    fn handle_recording(&mut self, ctx: &LoopContext, frame: &Frame) -> Result<(), CaptureError> {
        if !ctx.control.is_recording() {
            if let Some(recorder) = self.recorder.take() {
                self.finish_recorder(ctx, recorder)?;
            }
            return Ok(());
        }

        if self.recorder.is_none() {
            let recorder = Recorder::open(&ctx.settings, self.spans_opened, self.negotiated, self.fps)?;
            self.spans_opened += 1;
            ctx.emit(CaptureEvent::RecordingStarted {
                path: recorder.path().to_path_buf(),
                resolution: recorder.resolution(),
            });
            self.recorder = Some(recorder);
        }
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.write(frame)?;
            self.frames_recorded += 1;
        }
        Ok(())
    }

    fn finish_recorder(&mut self, ctx: &LoopContext, mut recorder: Recorder) -> Result<(), CaptureError> {
        match recorder.close() {
            Ok(summary) => {
                self.recordings.push(summary.clone());
                ctx.emit(CaptureEvent::RecordingFinished(summary));
                Ok(())
            }
            Err(e) => {
                error!("❌ Failed to finalize {}: {}", recorder.path().display(), e);
                Err(e)
            }
        }
    }

    /// Finalizes any open span, then releases the source even when that fails.
    fn teardown(&mut self, ctx: &LoopContext) -> Result<(), CaptureError> {
        let finished = match self.recorder.take() {
            Some(recorder) => guarded(|| self.finish_recorder(ctx, recorder)),
            None => Ok(()),
        };
        let released = release_source(self.source.as_mut());
        debug!("Released {}.", self.source.describe());
        finished.and(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_config::CaptureBackend;
    use crate::core::control_state::ControlState;

    fn file_config() -> CaptureConfig {
        CaptureConfig::new(CaptureBackend::FileOrStream { path: "/nonexistent/missing.avi".into() })
    }

    #[test]
    fn test_new_worker_is_idle() {
        let worker = CaptureWorker::new(file_config(), ControlState::shared(false, false, false));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert!(!worker.is_finished());
    }

    #[test]
    fn test_join_before_start_is_an_error() {
        let mut worker = CaptureWorker::new(file_config(), ControlState::shared(false, false, false));
        assert_eq!(worker.join().unwrap_err().kind(), "Worker");
    }

    #[test]
    fn test_missing_file_stops_with_device_unavailable() {
        let control = ControlState::shared(false, false, false);
        let mut worker = CaptureWorker::new(file_config(), Arc::clone(&control));
        let mut events = worker.take_events().unwrap();
        assert!(worker.take_events().is_none());

        worker.start().unwrap();
        assert!(control.is_running());
        let report = worker.join().unwrap();

        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(matches!(report.stop_reason, StopReason::Failed(ref r) if r.starts_with("DeviceUnavailable")));
        assert!(matches!(events.try_recv(), Ok(CaptureEvent::SourceInvalid(_))));
        assert!(matches!(events.try_recv(), Ok(CaptureEvent::Stopped(_))));
        assert!(worker.start().is_err());
    }

    #[test]
    fn test_panic_message_extracts_strings() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
    }
}
