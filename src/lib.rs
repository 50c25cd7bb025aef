//! Background video capture from RealSense devices, USB cameras and video
//! files, with on-demand recording in fixed-size spans.
//!
//! A [`CaptureWorker`] owns one capture source on its own thread. The caller
//! steers it through a shared [`ControlState`] and listens on its
//! [`CaptureEvent`] channel.

pub mod app_config;
pub mod camera;
pub mod camera_config;
pub mod cli;
pub mod common;
pub mod config_loader;
pub mod core;
pub mod errors;
pub mod media;
pub mod operations;

pub use crate::camera_config::{CaptureBackend, CaptureConfig, FrameSize};
pub use crate::core::capture_source::{CaptureDevice, CaptureSource};
pub use crate::core::capture_worker::{CaptureEvent, CaptureWorker, StopReason, WorkerReport, WorkerState};
pub use crate::core::control_state::{ControlSnapshot, ControlState, SharedControlState};
pub use crate::core::frame::{DepthPlane, Frame, PixelFormat, Resolution};
pub use crate::core::recorder::{EncoderKind, Recorder, RecorderSettings, RecordingSummary};
pub use crate::errors::CaptureError;
