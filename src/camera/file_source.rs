use crate::core::capture_source::CaptureDevice;
use crate::core::frame::{Frame, PixelFormat, Resolution};
use crate::errors::CaptureError;
use crate::media::jpeg_sequence::JpegSequenceReader;
use log::{debug, info};
#[cfg(feature = "opencv")]
use log::warn;
use std::path::Path;

enum Decoder {
    Sequence(JpegSequenceReader),
    #[cfg(feature = "opencv")]
    OpenCv(opencv::videoio::VideoCapture),
}

/// Video file, network stream, or a recorded JPEG sequence directory. A file
/// ends with `Ok(None)` once its frames are exhausted.
pub struct FileSource {
    path: String,
    format: PixelFormat,
    decoder: Option<Decoder>,
    negotiated: Option<Resolution>,
    total_frames: Option<u64>,
    sequence: u64,
    ended: bool,
}

fn is_url(path: &str) -> bool {
    path.contains("://")
}

impl FileSource {
    pub fn new(path: String, format: PixelFormat) -> Self {
        FileSource {
            path,
            format,
            decoder: None,
            negotiated: None,
            total_frames: None,
            sequence: 0,
            ended: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Frame count reported by the container, when known.
    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn open_sequence(&mut self) -> Result<Resolution, CaptureError> {
        let reader = JpegSequenceReader::open(Path::new(&self.path))?;
        let manifest = reader.manifest();
        debug!(
            "🎞️ {} read as a JPEG sequence: {} @ {:.2} fps, {} frame(s)",
            self.path,
            manifest.resolution(),
            manifest.fps,
            manifest.frames
        );
        self.total_frames = Some(manifest.frames);
        self.decoder = Some(Decoder::Sequence(reader));
        Ok(manifest.resolution())
    }

    #[cfg(feature = "opencv")]
    fn open_opencv(&mut self) -> Result<Resolution, CaptureError> {
        use crate::camera::camera_media::negotiated_size;
        use opencv::{prelude::*, videoio};

        let cap = videoio::VideoCapture::from_file(&self.path, videoio::CAP_ANY)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", self.path, e)))?;
        if !cap.is_opened().unwrap_or(false) {
            return Err(CaptureError::DeviceUnavailable(format!(
                "Failed to open '{}' - check the path or stream availability",
                self.path
            )));
        }
        let resolution = negotiated_size(&cap)?;
        let count = cap.get(videoio::CAP_PROP_FRAME_COUNT).unwrap_or(0.0);
        self.total_frames = if count > 0.0 { Some(count as u64) } else { None };
        self.decoder = Some(Decoder::OpenCv(cap));
        Ok(resolution)
    }

    #[cfg(not(feature = "opencv"))]
    fn open_opencv(&mut self) -> Result<Resolution, CaptureError> {
        Err(CaptureError::DeviceUnavailable(format!(
            "'{}' needs the `opencv` feature to decode",
            self.path
        )))
    }

    fn open_inner(&mut self) -> Result<Resolution, CaptureError> {
        if is_url(&self.path) {
            return self.open_opencv();
        }
        let path = Path::new(&self.path);
        if path.is_dir() {
            self.open_sequence()
        } else if path.is_file() {
            self.open_opencv()
        } else {
            Err(CaptureError::DeviceUnavailable(format!("'{}' does not exist", self.path)))
        }
    }
}

impl CaptureDevice for FileSource {
    fn describe(&self) -> String {
        format!("FileOrStream({})", self.path)
    }

    fn open(&mut self) -> Result<Resolution, CaptureError> {
        if let Some(res) = self.negotiated.filter(|_| self.decoder.is_some()) {
            return Ok(res);
        }
        let res = match self.open_inner() {
            Ok(res) => res,
            Err(e) => {
                self.release();
                return Err(e);
            }
        };
        if res.is_empty() {
            self.release();
            return Err(CaptureError::DeviceUnavailable(format!("'{}' reports an empty frame size", self.path)));
        }
        self.negotiated = Some(res);
        self.sequence = 0;
        self.ended = false;
        info!("👍 Opened {} at {}", self.describe(), res);
        Ok(res)
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.ended {
            return Ok(None);
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Err(CaptureError::ReadFailed(format!("'{}' is not open", self.path)));
        };
        let frame = match decoder {
            Decoder::Sequence(reader) => reader.read_frame(self.format, self.sequence)?,
            #[cfg(feature = "opencv")]
            Decoder::OpenCv(cap) => crate::camera::camera_media::read_frame(cap, self.format, self.sequence)?,
        };
        match frame {
            Some(frame) => {
                self.sequence += 1;
                Ok(Some(frame))
            }
            None => {
                debug!("{} exhausted after {} frame(s)", self.describe(), self.sequence);
                self.ended = true;
                Ok(None)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    fn release(&mut self) {
        match self.decoder.take() {
            #[cfg(feature = "opencv")]
            Some(Decoder::OpenCv(mut cap)) => {
                use opencv::prelude::*;
                if let Err(e) = cap.release() {
                    warn!("⚠️ Failed to release '{}': {}", self.path, e);
                }
            }
            Some(_) => debug!("Closed '{}'", self.path),
            None => {}
        }
        self.negotiated = None;
    }

    fn negotiated_resolution(&self) -> Option<Resolution> {
        self.negotiated
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::jpeg_sequence::JpegSequenceWriter;
    use tempfile::tempdir;

    fn write_sequence(dir: &Path, res: Resolution, frames: u64) {
        let mut writer = JpegSequenceWriter::create(dir, res, 10.0, 90).unwrap();
        for seq in 0..frames {
            let data = vec![(seq * 40) as u8; res.pixel_count() * 3];
            writer.write_frame(&Frame::new(data, res, PixelFormat::Bgr8, seq).unwrap()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_reads_every_frame_then_ends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip");
        let res = Resolution::new(16, 8);
        write_sequence(&path, res, 3);

        let mut source = FileSource::new(path.to_string_lossy().into_owned(), PixelFormat::Bgr8);
        assert_eq!(source.open().unwrap(), res);
        assert_eq!(source.total_frames(), Some(3));
        assert_eq!(source.negotiated_resolution(), Some(res));

        for expected in 0..3 {
            let frame = source.read().unwrap().unwrap();
            assert_eq!(frame.sequence(), expected);
            assert_eq!(frame.resolution(), res);
        }
        assert!(source.read().unwrap().is_none());
        assert!(source.read().unwrap().is_none());

        source.release();
        source.release();
        assert!(!source.is_open());
        assert_eq!(source.negotiated_resolution(), None);
    }

    #[test]
    fn test_missing_file_is_device_unavailable() {
        let mut source = FileSource::new("/nonexistent/clip.avi".into(), PixelFormat::Bgr8);
        assert_eq!(source.open().unwrap_err().kind(), "DeviceUnavailable");
        assert!(!source.is_open());
    }

    #[test]
    fn test_undecodable_file_is_device_unavailable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        let mut source = FileSource::new(path.to_string_lossy().into_owned(), PixelFormat::Bgr8);
        assert_eq!(source.open().unwrap_err().kind(), "DeviceUnavailable");
        assert!(!source.is_open());
    }
}
