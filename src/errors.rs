use crate::core::frame::Resolution;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device Unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Frame Read Failed: {0}")]
    ReadFailed(String),

    #[error("Recorder expected {expected} frames but received {actual}")]
    RecorderDimensionMismatch { expected: Resolution, actual: Resolution },

    #[error("Recorder is already closed")]
    RecorderClosed,

    #[error("Encoder Error: {0}")]
    Encoder(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("File I/O Error: {0}")]
    Io(String),

    #[error("OpenCV Error: {0}")]
    OpenCV(String),

    #[error("Worker Error: {0}")]
    Worker(String),
}

impl CaptureError {
    /// Stable taxonomy name, used as the prefix of `SourceInvalid` reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureError::DeviceUnavailable(_) => "DeviceUnavailable",
            CaptureError::ReadFailed(_) => "TransientReadFailure",
            CaptureError::RecorderDimensionMismatch { .. } => "RecorderDimensionMismatch",
            CaptureError::RecorderClosed => "RecorderClosed",
            CaptureError::Encoder(_) => "Encoder",
            CaptureError::Config(_) => "Config",
            CaptureError::Io(_) => "Io",
            CaptureError::OpenCV(_) => "OpenCV",
            CaptureError::Worker(_) => "Worker",
        }
    }

    /// The message without the display prefix.
    pub fn detail(&self) -> String {
        match self {
            CaptureError::DeviceUnavailable(msg)
            | CaptureError::ReadFailed(msg)
            | CaptureError::Encoder(msg)
            | CaptureError::Config(msg)
            | CaptureError::Io(msg)
            | CaptureError::OpenCV(msg)
            | CaptureError::Worker(msg) => msg.clone(),
            CaptureError::RecorderDimensionMismatch { .. } | CaptureError::RecorderClosed => self.to_string(),
        }
    }

    /// `"<Kind>: <detail>"`, the payload carried by `CaptureEvent::SourceInvalid`.
    pub fn reason(&self) -> String {
        format!("{}: {}", self.kind(), self.detail())
    }
}

// Allow conversion from std::io::Error to CaptureError::Io
impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Encoder(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for CaptureError {
    fn from(err: opencv::Error) -> Self {
        CaptureError::OpenCV(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_is_prefixed_with_kind() {
        let err = CaptureError::DeviceUnavailable("no RealSense devices found".to_string());
        assert_eq!(err.kind(), "DeviceUnavailable");
        assert_eq!(err.reason(), "DeviceUnavailable: no RealSense devices found");
        assert_eq!(
            CaptureError::ReadFailed("timeout".to_string()).reason(),
            "TransientReadFailure: timeout"
        );
        assert_eq!(CaptureError::RecorderClosed.reason(), "RecorderClosed: Recorder is already closed");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = CaptureError::RecorderDimensionMismatch {
            expected: Resolution::new(640, 480),
            actual: Resolution::new(1280, 720),
        };
        assert_eq!(err.to_string(), "Recorder expected 640x480 frames but received 1280x720");
    }
}
