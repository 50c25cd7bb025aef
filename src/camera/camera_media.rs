//! OpenCV bridge: `Mat` conversions, `VideoCapture` helpers and the
//! `VideoWriter` recorder backend. Only compiled with the `opencv` feature.

use crate::core::frame::{swap_red_blue, Frame, PixelFormat, Resolution};
use crate::core::recorder::FrameEncoder;
use crate::errors::CaptureError;
use log::{debug, error, info, warn};
use opencv::{core as opencv_core, prelude::*, videoio};
use std::path::{Path, PathBuf};

pub fn fourcc_code(fourcc: &str) -> Result<i32, CaptureError> {
    let chars: Vec<char> = fourcc.chars().collect();
    if chars.len() != 4 {
        return Err(CaptureError::Config(format!("fourcc '{}' must have four characters", fourcc)));
    }
    Ok(videoio::VideoWriter::fourcc(chars[0], chars[1], chars[2], chars[3])?)
}

/// Copies a BGR (or single channel) `Mat` into a `Frame` in the requested channel order.
pub fn mat_to_frame(mat: &opencv_core::Mat, format: PixelFormat, sequence: u64) -> Result<Frame, CaptureError> {
    if mat.empty() {
        return Err(CaptureError::ReadFailed("OpenCV returned an empty frame".to_string()));
    }
    let resolution = Resolution::new(mat.cols() as u32, mat.rows() as u32);
    let owned;
    let mat = if mat.is_continuous() {
        mat
    } else {
        owned = mat.try_clone()?;
        &owned
    };
    let bytes = mat.data_bytes()?;
    let data = match (mat.channels(), format) {
        (3, PixelFormat::Bgr8) | (1, PixelFormat::Gray8) => bytes.to_vec(),
        (3, PixelFormat::Rgb8) => swap_red_blue(bytes),
        (channels, wanted) => {
            let gray = Frame::new(bytes.to_vec(), resolution, PixelFormat::Gray8, sequence);
            return match (channels, gray) {
                (1, Ok(frame)) => frame.to_format(wanted),
                _ => Err(CaptureError::ReadFailed(format!(
                    "unsupported OpenCV frame layout: {} channel(s) for {:?}",
                    channels, wanted
                ))),
            };
        }
    };
    Frame::new(data, resolution, format, sequence)
}

/// Builds an owned BGR `Mat` from a colour frame.
pub fn frame_to_mat(frame: &Frame) -> Result<opencv_core::Mat, CaptureError> {
    let bgr = match frame.format() {
        PixelFormat::Bgr8 => frame.clone(),
        _ => frame.to_format(PixelFormat::Bgr8)?,
    };
    let flat = opencv_core::Mat::from_slice(bgr.data())?;
    let shaped = flat.reshape(3, bgr.height() as i32)?;
    Ok(shaped.try_clone()?)
}

pub fn negotiated_size(cap: &videoio::VideoCapture) -> Result<Resolution, CaptureError> {
    let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)?;
    let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
    Ok(Resolution::new(width.max(0.0) as u32, height.max(0.0) as u32))
}

/// Sets a capture property and logs when the driver refuses it.
pub fn set_property(cap: &mut videoio::VideoCapture, prop: i32, value: f64, label: &str) {
    match cap.set(prop, value) {
        Ok(true) => debug!("Set {} to {}", label, value),
        Ok(false) => warn!("⚠️ Device ignored {} = {}", label, value),
        Err(e) => warn!("⚠️ Failed to set {} = {}: {}", label, value, e),
    }
}

/// Reads one frame. `Ok(None)` when OpenCV reports no more frames.
pub fn read_frame(
    cap: &mut videoio::VideoCapture,
    format: PixelFormat,
    sequence: u64,
) -> Result<Option<Frame>, CaptureError> {
    let mut mat = opencv_core::Mat::default();
    let grabbed = cap
        .read(&mut mat)
        .map_err(|e| CaptureError::ReadFailed(format!("OpenCV read failed: {}", e)))?;
    if !grabbed || mat.empty() {
        return Ok(None);
    }
    mat_to_frame(&mat, format, sequence).map(Some)
}

pub struct OpenCvVideoWriter {
    writer: Option<videoio::VideoWriter>,
    path: PathBuf,
}

impl OpenCvVideoWriter {
    pub fn create(path: &Path, fourcc: &str, fps: f64, resolution: Resolution) -> Result<Self, CaptureError> {
        let code = fourcc_code(fourcc)?;
        let path_str = path
            .to_str()
            .ok_or_else(|| CaptureError::Config(format!("Invalid output path for video (not UTF-8): {}", path.display())))?;
        let writer = videoio::VideoWriter::new(
            path_str,
            code,
            fps,
            opencv_core::Size::new(resolution.width as i32, resolution.height as i32),
            true,
        )?;
        if !writer.is_opened()? {
            error!("❌ Failed to open VideoWriter at '{}'", path.display());
            if path.exists() {
                if let Err(del_err) = std::fs::remove_file(path) {
                    warn!("Failed to delete partial file {} after VideoWriter open error: {}", path.display(), del_err);
                }
            }
            return Err(CaptureError::Encoder(format!(
                "OpenCV VideoWriter could not open '{}' with fourcc {}",
                path.display(),
                fourcc
            )));
        }
        info!("✍️ OpenCV VideoWriter opened: {} ({} @ {:.1} fps, {})", path.display(), resolution, fps, fourcc);
        Ok(OpenCvVideoWriter {
            writer: Some(writer),
            path: path.to_path_buf(),
        })
    }
}

impl FrameEncoder for OpenCvVideoWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        let writer = self.writer.as_mut().ok_or(CaptureError::RecorderClosed)?;
        let mat = frame_to_mat(frame)?;
        writer
            .write(&mat)
            .map_err(|e| CaptureError::Encoder(format!("OpenCV write to '{}' failed: {}", self.path.display(), e)))
    }

    fn finish(&mut self) -> Result<(), CaptureError> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
        }
        Ok(())
    }
}
