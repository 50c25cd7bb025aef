use crate::camera_config::CaptureConfig;
use crate::core::capture_source::CaptureDevice;
use crate::core::frame::{Frame, Resolution};
use crate::errors::CaptureError;
#[cfg(feature = "opencv")]
use log::{debug, info, warn};

/// USB / built-in camera opened by device index through OpenCV.
pub struct ExternalCamera {
    index: i32,
    config: CaptureConfig,
    #[cfg(feature = "opencv")]
    capture: Option<opencv::videoio::VideoCapture>,
    #[cfg(feature = "opencv")]
    pending: Option<Frame>,
    negotiated: Option<Resolution>,
    sequence: u64,
}

impl ExternalCamera {
    pub fn new(index: i32, config: CaptureConfig) -> Self {
        ExternalCamera {
            index,
            config,
            #[cfg(feature = "opencv")]
            capture: None,
            #[cfg(feature = "opencv")]
            pending: None,
            negotiated: None,
            sequence: 0,
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    /// Opens the driver's own settings dialog where the platform has one.
    #[cfg(feature = "opencv")]
    pub fn open_settings_dialog(&mut self) -> Result<(), CaptureError> {
        use opencv::{prelude::*, videoio};
        let name = self.describe_inner();
        let cap = self
            .capture
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("{} is not open", name)))?;
        if !cap.set(videoio::CAP_PROP_SETTINGS, 1.0)? {
            warn!("⚠️ {} has no settings dialog on this platform.", name);
        }
        Ok(())
    }

    #[cfg(not(feature = "opencv"))]
    pub fn open_settings_dialog(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::DeviceUnavailable(format!(
            "{}: built without the `opencv` feature",
            self.describe_inner()
        )))
    }

    fn describe_inner(&self) -> String {
        format!("ExternalCamera({})", self.index)
    }

    #[cfg(feature = "opencv")]
    fn open_inner(&mut self) -> Result<Resolution, CaptureError> {
        use crate::camera::camera_media::{fourcc_code, negotiated_size, read_frame, set_property};
        use opencv::{prelude::*, videoio};

        let name = self.describe_inner();
        let requested = self.config.requested_resolution();
        debug!("🎥 Opening {} (requested {} @ {} fps, fourcc {})", name, requested, self.config.target_fps, self.config.fourcc);

        let mut cap = videoio::VideoCapture::new(self.index, videoio::CAP_ANY)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", name, e)))?;
        let opened = cap.is_opened().unwrap_or(false);
        if !opened {
            let _ = cap.release();
            return Err(CaptureError::DeviceUnavailable(format!("{} could not be opened", name)));
        }

        set_property(&mut cap, videoio::CAP_PROP_AUTOFOCUS, if self.config.autofocus { 1.0 } else { 0.0 }, "autofocus");
        if let Some(focus) = self.config.focus_value {
            set_property(&mut cap, videoio::CAP_PROP_FOCUS, focus as f64, "focus");
        }
        set_property(&mut cap, videoio::CAP_PROP_FRAME_WIDTH, requested.width as f64, "frame width");
        set_property(&mut cap, videoio::CAP_PROP_FRAME_HEIGHT, requested.height as f64, "frame height");
        match fourcc_code(&self.config.fourcc) {
            Ok(code) => set_property(&mut cap, videoio::CAP_PROP_FOURCC, code as f64, "fourcc"),
            Err(e) => warn!("⚠️ {}: {}", name, e),
        }
        if self.config.target_fps > 0 {
            set_property(&mut cap, videoio::CAP_PROP_FPS, self.config.target_fps as f64, "fps");
        }

        match negotiated_size(&cap) {
            Ok(reported) => debug!("{} reports {} after setup", name, reported),
            Err(e) => debug!("{} did not report its frame size: {}", name, e),
        }
        // Drivers may report one size and deliver another; the first frame decides.
        let first = match read_frame(&mut cap, self.config.pixel_format, self.sequence) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                let _ = cap.release();
                return Err(CaptureError::DeviceUnavailable(format!("{} delivered no first frame", name)));
            }
            Err(e) => {
                let _ = cap.release();
                return Err(CaptureError::DeviceUnavailable(format!("{} failed on its first frame: {}", name, e.detail())));
            }
        };
        let actual = first.resolution();
        if actual != requested {
            warn!("⚠️ {} clamped the frame size: requested {}, got {}", name, requested, actual);
        }
        info!("👍 {} opened at {}", name, actual);
        self.capture = Some(cap);
        self.pending = Some(first);
        Ok(actual)
    }

    #[cfg(not(feature = "opencv"))]
    fn open_inner(&mut self) -> Result<Resolution, CaptureError> {
        Err(CaptureError::DeviceUnavailable(format!(
            "{}: built without the `opencv` feature",
            self.describe_inner()
        )))
    }

    #[cfg(feature = "opencv")]
    fn read_inner(&mut self) -> Result<Option<Frame>, CaptureError> {
        let name = self.describe_inner();
        let cap = self
            .capture
            .as_mut()
            .ok_or_else(|| CaptureError::ReadFailed(format!("{} is not open", name)))?;
        let next = match self.pending.take() {
            Some(frame) => Some(frame),
            None => crate::camera::camera_media::read_frame(cap, self.config.pixel_format, self.sequence)?,
        };
        // A live camera that stops delivering frames has failed; it never ends normally.
        match next {
            Some(frame) => {
                self.sequence += 1;
                Ok(Some(frame))
            }
            None => Err(CaptureError::ReadFailed(format!("{} delivered no frame", name))),
        }
    }

    #[cfg(not(feature = "opencv"))]
    fn read_inner(&mut self) -> Result<Option<Frame>, CaptureError> {
        Err(CaptureError::ReadFailed(format!("{} is not open", self.describe_inner())))
    }
}

impl CaptureDevice for ExternalCamera {
    fn describe(&self) -> String {
        self.describe_inner()
    }

    fn open(&mut self) -> Result<Resolution, CaptureError> {
        if let Some(res) = self.negotiated.filter(|_| self.is_open()) {
            return Ok(res);
        }
        self.sequence = 0;
        let res = self.open_inner()?;
        self.negotiated = Some(res);
        Ok(res)
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.read_inner()
    }

    fn is_open(&self) -> bool {
        #[cfg(feature = "opencv")]
        {
            self.capture.is_some()
        }
        #[cfg(not(feature = "opencv"))]
        {
            false
        }
    }

    fn release(&mut self) {
        #[cfg(feature = "opencv")]
        {
            self.pending = None;
        }
        #[cfg(feature = "opencv")]
        if let Some(mut cap) = self.capture.take() {
            use opencv::prelude::*;
            if let Err(e) = cap.release() {
                warn!("⚠️ Failed to release {}: {}", self.describe_inner(), e);
            } else {
                debug!("Released {}", self.describe_inner());
            }
        }
        self.negotiated = None;
    }

    fn negotiated_resolution(&self) -> Option<Resolution> {
        self.negotiated
    }
}

impl Drop for ExternalCamera {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_config::CaptureBackend;

    fn camera(index: i32) -> ExternalCamera {
        ExternalCamera::new(index, CaptureConfig::new(CaptureBackend::ExternalCamera { index }))
    }

    #[test]
    fn test_describe_and_unopened_state() {
        let mut cam = camera(4);
        assert_eq!(cam.describe(), "ExternalCamera(4)");
        assert_eq!(cam.index(), 4);
        assert!(!cam.is_open());
        assert!(cam.read().is_err());
        cam.release();
        cam.release();
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_missing_camera_index_is_device_unavailable() {
        let mut cam = camera(9_999);
        assert_eq!(cam.open().unwrap_err().kind(), "DeviceUnavailable");
        assert!(!cam.is_open());
        assert_eq!(cam.negotiated_resolution(), None);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_open_without_opencv_is_device_unavailable() {
        let mut cam = camera(0);
        assert_eq!(cam.open().unwrap_err().kind(), "DeviceUnavailable");
        assert_eq!(cam.open_settings_dialog().unwrap_err().kind(), "DeviceUnavailable");
        assert_eq!(cam.negotiated_resolution(), None);
    }
}
