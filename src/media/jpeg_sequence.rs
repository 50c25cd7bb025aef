//! Recording spans stored as a directory of numbered JPEG frames.
//!
//! `finish` writes a `sequence.yaml` manifest with the frame size, rate and
//! count. A span without a manifest (the process died mid-recording) is still
//! readable: the reader counts the contiguous `frame_NNNNNN.jpg` files instead.

use crate::core::frame::{swap_red_blue, Frame, PixelFormat, Resolution};
use crate::errors::CaptureError;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "sequence.yaml";

pub fn frame_file_name(index: u64) -> String {
    format!("frame_{:06}.jpg", index)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceManifest {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frames: u64,
}

impl SequenceManifest {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

pub struct JpegSequenceWriter {
    dir: PathBuf,
    resolution: Resolution,
    fps: f64,
    quality: u8,
    frames: u64,
    finished: bool,
}

impl JpegSequenceWriter {
    pub fn create(dir: &Path, resolution: Resolution, fps: f64, quality: u8) -> Result<Self, CaptureError> {
        if dir.exists() {
            return Err(CaptureError::Io(format!("'{}' already exists", dir.display())));
        }
        fs::create_dir_all(dir)
            .map_err(|e| CaptureError::Io(format!("Failed to create '{}': {}", dir.display(), e)))?;
        debug!("🖼️ JPEG sequence opened at '{}' ({} @ {:.1} fps, quality {})", dir.display(), resolution, fps, quality);
        Ok(JpegSequenceWriter {
            dir: dir.to_path_buf(),
            resolution,
            fps,
            quality,
            frames: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        if self.finished {
            return Err(CaptureError::RecorderClosed);
        }
        if frame.resolution() != self.resolution {
            return Err(CaptureError::RecorderDimensionMismatch {
                expected: self.resolution,
                actual: frame.resolution(),
            });
        }

        let mut jpeg = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
            match frame.format() {
                PixelFormat::Bgr8 => {
                    let rgb = swap_red_blue(frame.data());
                    encoder.encode(&rgb, frame.width(), frame.height(), ExtendedColorType::Rgb8)?
                }
                PixelFormat::Rgb8 => encoder.encode(frame.data(), frame.width(), frame.height(), ExtendedColorType::Rgb8)?,
                PixelFormat::Gray8 => encoder.encode(frame.data(), frame.width(), frame.height(), ExtendedColorType::L8)?,
            }
        }
        fs::write(self.dir.join(frame_file_name(self.frames)), &jpeg)?;
        self.frames += 1;
        Ok(())
    }

    /// Writes the manifest. Idempotent.
    pub fn finish(&mut self) -> Result<(), CaptureError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let manifest = SequenceManifest {
            width: self.resolution.width,
            height: self.resolution.height,
            fps: self.fps,
            frames: self.frames,
        };
        let yaml = serde_yaml::to_string(&manifest)
            .map_err(|e| CaptureError::Encoder(format!("Failed to serialize manifest: {}", e)))?;
        fs::write(self.dir.join(MANIFEST_FILE), yaml)?;
        info!("🎞️ Finalized '{}' with {} frame(s).", self.dir.display(), self.frames);
        Ok(())
    }
}

impl Drop for JpegSequenceWriter {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                warn!("Failed to finalize '{}' on drop: {}", self.dir.display(), e);
            }
        }
    }
}

pub struct JpegSequenceReader {
    dir: PathBuf,
    manifest: SequenceManifest,
    next: u64,
}

impl JpegSequenceReader {
    pub fn open(dir: &Path) -> Result<Self, CaptureError> {
        if !dir.is_dir() {
            return Err(CaptureError::DeviceUnavailable(format!("'{}' is not a frame directory", dir.display())));
        }
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            let text = fs::read_to_string(&manifest_path)?;
            serde_yaml::from_str::<SequenceManifest>(&text).map_err(|e| {
                CaptureError::DeviceUnavailable(format!("Invalid manifest '{}': {}", manifest_path.display(), e))
            })?
        } else {
            warn!("⚠️ '{}' has no {}, counting frames on disk.", dir.display(), MANIFEST_FILE);
            Self::scan(dir)?
        };
        Ok(JpegSequenceReader {
            dir: dir.to_path_buf(),
            manifest,
            next: 0,
        })
    }

    fn scan(dir: &Path) -> Result<SequenceManifest, CaptureError> {
        let mut frames = 0;
        while dir.join(frame_file_name(frames)).is_file() {
            frames += 1;
        }
        if frames == 0 {
            return Err(CaptureError::DeviceUnavailable(format!("'{}' holds no frames", dir.display())));
        }
        let first = image::open(dir.join(frame_file_name(0)))
            .map_err(|e| CaptureError::DeviceUnavailable(format!("Cannot decode first frame: {}", e)))?;
        Ok(SequenceManifest {
            width: first.width(),
            height: first.height(),
            fps: 0.0,
            frames,
        })
    }

    pub fn manifest(&self) -> SequenceManifest {
        self.manifest
    }

    /// Decodes the next frame into `format`, `None` once every frame was read.
    pub fn read_frame(&mut self, format: PixelFormat, sequence: u64) -> Result<Option<Frame>, CaptureError> {
        if self.next >= self.manifest.frames {
            return Ok(None);
        }
        let path = self.dir.join(frame_file_name(self.next));
        let decoded = image::open(&path)
            .map_err(|e| CaptureError::ReadFailed(format!("Failed to decode '{}': {}", path.display(), e)))?;
        let resolution = Resolution::new(decoded.width(), decoded.height());
        if resolution != self.manifest.resolution() {
            return Err(CaptureError::ReadFailed(format!(
                "'{}' is {}, sequence is {}",
                path.display(),
                resolution,
                self.manifest.resolution()
            )));
        }
        let data = match format {
            PixelFormat::Rgb8 => decoded.to_rgb8().into_raw(),
            PixelFormat::Bgr8 => swap_red_blue(&decoded.to_rgb8().into_raw()),
            PixelFormat::Gray8 => decoded.to_luma8().into_raw(),
        };
        self.next += 1;
        Frame::new(data, resolution, format, sequence).map(Some)
    }
}

/// Number of frame files on disk, independent of the manifest.
pub fn count_frames(dir: &Path) -> Result<u64, CaptureError> {
    let mut frames = 0;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("frame_") && name.ends_with(".jpg") {
            frames += 1;
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn frame(res: Resolution, shade: u8) -> Frame {
        Frame::new(vec![shade; res.pixel_count() * 3], res, PixelFormat::Bgr8, 0).unwrap()
    }

    #[test]
    fn test_finish_writes_manifest_once() {
        let dir = tempdir().unwrap();
        let span = dir.path().join("span000");
        let res = Resolution::new(16, 8);
        let mut writer = JpegSequenceWriter::create(&span, res, 12.5, 85).unwrap();
        writer.write_frame(&frame(res, 10)).unwrap();
        writer.write_frame(&frame(res, 200)).unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert!(matches!(writer.write_frame(&frame(res, 0)), Err(CaptureError::RecorderClosed)));

        let reader = JpegSequenceReader::open(&span).unwrap();
        assert_eq!(
            reader.manifest(),
            SequenceManifest { width: 16, height: 8, fps: 12.5, frames: 2 }
        );
        assert_eq!(count_frames(&span).unwrap(), 2);
    }

    #[test]
    fn test_existing_directory_is_rejected() {
        let dir = tempdir().unwrap();
        let err = JpegSequenceWriter::create(dir.path(), Resolution::new(8, 8), 30.0, 90).err().unwrap();
        assert_eq!(err.kind(), "Io");
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let res = Resolution::new(8, 8);
        let mut writer = JpegSequenceWriter::create(&dir.path().join("s"), res, 30.0, 90).unwrap();
        let err = writer.write_frame(&frame(Resolution::new(4, 4), 0)).unwrap_err();
        assert_eq!(err.kind(), "RecorderDimensionMismatch");
        assert_eq!(writer.frames_written(), 0);
    }

    #[test]
    fn test_reader_without_manifest_counts_files() {
        let dir = tempdir().unwrap();
        let span = dir.path().join("crashed");
        let res = Resolution::new(8, 6);
        let mut writer = JpegSequenceWriter::create(&span, res, 30.0, 90).unwrap();
        for shade in [0u8, 60, 120] {
            writer.write_frame(&frame(res, shade)).unwrap();
        }
        // Skip finalization, as if the process died.
        std::mem::forget(writer);

        let mut reader = JpegSequenceReader::open(&span).unwrap();
        assert_eq!(reader.manifest().frames, 3);
        assert_eq!(reader.manifest().resolution(), res);
        for seq in 0..3 {
            let decoded = reader.read_frame(PixelFormat::Gray8, seq).unwrap().unwrap();
            assert_eq!(decoded.sequence(), seq);
            assert_eq!(decoded.data().len(), res.pixel_count());
        }
        assert!(reader.read_frame(PixelFormat::Gray8, 3).unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_is_unavailable() {
        let dir = tempdir().unwrap();
        assert_eq!(JpegSequenceReader::open(dir.path()).err().unwrap().kind(), "DeviceUnavailable");
    }
}
