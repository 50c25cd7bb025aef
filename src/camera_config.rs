use crate::core::frame::{PixelFormat, Resolution};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CaptureBackend {
    RealsenseDevice {
        #[serde(default)]
        serial_number: Option<String>, // first available device when unset
    },
    ExternalCamera {
        index: i32,
    },
    FileOrStream {
        path: String, // file path or rtsp/http URL
    },
}

impl CaptureBackend {
    pub fn label(&self) -> String {
        match self {
            CaptureBackend::RealsenseDevice { serial_number: Some(sn) } => format!("realsense-{}", sn),
            CaptureBackend::RealsenseDevice { serial_number: None } => "realsense".to_string(),
            CaptureBackend::ExternalCamera { index } => format!("camera-{}", index),
            CaptureBackend::FileOrStream { path } => std::path::Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty())
                .unwrap_or("stream")
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl From<FrameSize> for Resolution {
    fn from(size: FrameSize) -> Self {
        Resolution::new(size.width, size.height)
    }
}

/// Immutable capture configuration, fixed when the worker is created.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CaptureConfig {
    pub backend: CaptureBackend,
    #[serde(default = "default_frame_size")]
    pub frame_size: FrameSize,
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default = "default_autofocus")]
    pub autofocus: bool,
    #[serde(default)]
    pub focus_value: Option<i32>,
    #[serde(default)]
    pub pixel_format: PixelFormat, // channel order handed to consumers
    #[serde(default = "default_fourcc")]
    pub fourcc: String, // pixel encoding requested from USB cameras
    #[serde(default)]
    pub with_depth: bool,
    #[serde(default)]
    pub exposure: Option<f32>,
    #[serde(default)]
    pub gain: Option<f32>,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub max_consecutive_read_failures: u32, // 0 = any failed read is terminal
}

fn default_frame_size() -> FrameSize {
    FrameSize { width: 640, height: 480 }
}

fn default_target_fps() -> u32 {
    30
}

fn default_autofocus() -> bool {
    true
}

fn default_fourcc() -> String {
    "MJPG".to_string()
}

fn default_read_timeout_ms() -> u64 {
    5000
}

impl CaptureConfig {
    pub fn new(backend: CaptureBackend) -> Self {
        CaptureConfig {
            backend,
            frame_size: default_frame_size(),
            target_fps: default_target_fps(),
            autofocus: default_autofocus(),
            focus_value: None,
            pixel_format: PixelFormat::default(),
            fourcc: default_fourcc(),
            with_depth: false,
            exposure: None,
            gain: None,
            read_timeout_ms: default_read_timeout_ms(),
            max_consecutive_read_failures: 0,
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = FrameSize { width, height };
        self
    }

    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn requested_resolution(&self) -> Resolution {
        self.frame_size.into()
    }

    /// Target pacing interval, `1000 / fps` milliseconds. Zero fps disables pacing.
    pub fn frame_interval(&self) -> Duration {
        if self.target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(1000 / self.target_fps as u64)
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_deserializes_from_tagged_yaml() {
        let yaml = r#"
backend:
  type: external_camera
  index: 1
frame_size: { width: 1280, height: 720 }
target_fps: 24
autofocus: false
focus_value: 521
"#;
        let config: CaptureConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.backend, CaptureBackend::ExternalCamera { index: 1 });
        assert_eq!(config.requested_resolution(), Resolution::new(1280, 720));
        assert_eq!(config.focus_value, Some(521));
        assert_eq!(config.fourcc, "MJPG");
        assert_eq!(config.pixel_format, PixelFormat::Bgr8);
        assert_eq!(config.max_consecutive_read_failures, 0);
    }

    #[test]
    fn test_frame_interval_uses_integer_milliseconds() {
        let config = CaptureConfig::new(CaptureBackend::FileOrStream { path: "sample.mp4".into() })
            .with_target_fps(24);
        assert_eq!(config.frame_interval(), Duration::from_millis(41));
        assert_eq!(config.clone().with_target_fps(0).frame_interval(), Duration::ZERO);
    }

    #[test]
    fn test_backend_label() {
        let file = CaptureBackend::FileOrStream { path: "/data/run/sample.mp4".into() };
        assert_eq!(file.label(), "sample");
        assert_eq!(CaptureBackend::ExternalCamera { index: 2 }.label(), "camera-2");
        assert_eq!(CaptureBackend::RealsenseDevice { serial_number: None }.label(), "realsense");
    }
}
