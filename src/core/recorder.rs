use crate::app_config::ApplicationConfig;
use crate::common::file_utils;
use crate::core::frame::{Frame, Resolution};
use crate::errors::CaptureError;
use crate::media::jpeg_sequence::JpegSequenceWriter;
use log::{debug, info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One fixed encoding for the lifetime of a recording span.
pub trait FrameEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    /// Flushes and finalizes the container.
    fn finish(&mut self) -> Result<(), CaptureError>;
}

impl FrameEncoder for JpegSequenceWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        JpegSequenceWriter::write_frame(self, frame)
    }

    fn finish(&mut self) -> Result<(), CaptureError> {
        JpegSequenceWriter::finish(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    /// OpenCV `VideoWriter` with the configured fourcc and container.
    Opencv,
    /// One JPEG per frame in a span directory, no native libraries needed.
    JpegSequence,
}

impl Default for EncoderKind {
    fn default() -> Self {
        if cfg!(feature = "opencv") {
            EncoderKind::Opencv
        } else {
            EncoderKind::JpegSequence
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub output_dir: PathBuf,
    pub base_name: String,
    pub encoder: EncoderKind,
    pub fourcc: String,
    pub container: String,
    pub jpeg_quality: u8,
    pub timestamp_format: String,
}

impl RecorderSettings {
    pub fn new(output_dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        RecorderSettings {
            output_dir: output_dir.into(),
            base_name: base_name.into(),
            encoder: EncoderKind::default(),
            fourcc: "MJPG".to_string(),
            container: "avi".to_string(),
            jpeg_quality: 90,
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
        }
    }

    pub fn from_app_config(app: &ApplicationConfig, base_name: &str) -> Self {
        RecorderSettings {
            output_dir: PathBuf::from(&app.output_directory),
            base_name: base_name.to_string(),
            encoder: app.video_encoder,
            fourcc: app.video_codec.clone(),
            container: app.video_format.clone(),
            jpeg_quality: app.jpeg_quality.unwrap_or(90),
            timestamp_format: app.filename_timestamp_format.clone(),
        }
    }

    pub fn with_encoder(mut self, encoder: EncoderKind) -> Self {
        self.encoder = encoder;
        self
    }

    /// Output path of the `span_index`-th recording span. Distinct per index.
    /// JPEG sequences get a directory without extension.
    pub fn span_path(&self, span_index: u32) -> PathBuf {
        let name = match self.encoder {
            EncoderKind::Opencv => {
                file_utils::generate_span_filename(&self.base_name, &self.timestamp_format, span_index, &self.container)
            }
            EncoderKind::JpegSequence => {
                file_utils::generate_span_name(&self.base_name, &self.timestamp_format, span_index)
            }
        };
        self.output_dir.join(name)
    }

    fn open_encoder(&self, path: &Path, resolution: Resolution, fps: f64) -> Result<Box<dyn FrameEncoder>, CaptureError> {
        match self.encoder {
            EncoderKind::JpegSequence => {
                Ok(Box::new(JpegSequenceWriter::create(path, resolution, fps, self.jpeg_quality)?))
            }
            #[cfg(feature = "opencv")]
            EncoderKind::Opencv => Ok(Box::new(crate::camera::camera_media::OpenCvVideoWriter::create(
                path,
                &self.fourcc,
                fps,
                resolution,
            )?)),
            #[cfg(not(feature = "opencv"))]
            EncoderKind::Opencv => Err(CaptureError::Config(
                "the opencv encoder needs the `opencv` feature".to_string(),
            )),
        }
    }
}

/// Result of one closed recording span.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frames: u64,
    pub resolution: Resolution,
}

/// Writes one recording span. Dimensions are fixed at open time.
pub struct Recorder {
    path: PathBuf,
    resolution: Resolution,
    encoder: Option<Box<dyn FrameEncoder>>,
    frames_written: u64,
}

impl Recorder {
    pub fn open(
        settings: &RecorderSettings,
        span_index: u32,
        resolution: Resolution,
        fps: f64,
    ) -> Result<Self, CaptureError> {
        file_utils::ensure_output_directory(&settings.output_dir)?;
        let path = settings.span_path(span_index);
        let encoder = settings.open_encoder(&path, resolution, fps)?;
        info!("⏺️ Recording span {} started: {} ({} @ {:.1} fps)", span_index, path.display(), resolution, fps);
        Ok(Self::with_encoder(path, resolution, encoder))
    }

    pub fn with_encoder(path: PathBuf, resolution: Resolution, encoder: Box<dyn FrameEncoder>) -> Self {
        Recorder {
            path,
            resolution,
            encoder: Some(encoder),
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn is_open(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn write(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        let encoder = self.encoder.as_mut().ok_or(CaptureError::RecorderClosed)?;
        if frame.resolution() != self.resolution {
            return Err(CaptureError::RecorderDimensionMismatch {
                expected: self.resolution,
                actual: frame.resolution(),
            });
        }
        encoder.write_frame(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn close(&mut self) -> Result<RecordingSummary, CaptureError> {
        let mut encoder = self.encoder.take().ok_or(CaptureError::RecorderClosed)?;
        encoder.finish()?;
        info!("⏹️ Recording closed: {} ({} frames)", self.path.display(), self.frames_written);
        Ok(RecordingSummary {
            path: self.path.clone(),
            frames: self.frames_written,
            resolution: self.resolution,
        })
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            debug!("Recorder for {} dropped while open, finalizing.", self.path.display());
            if let Err(e) = encoder.finish() {
                warn!("Failed to finalize {} on drop: {}", self.path.display(), e);
            }
        }
    }
}
