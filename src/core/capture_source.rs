use crate::camera::external_camera::ExternalCamera;
use crate::camera::file_source::FileSource;
use crate::camera::realsense_device::RealsenseDevice;
use crate::camera_config::{CaptureBackend, CaptureConfig};
use crate::core::frame::{Frame, Resolution};
use crate::errors::CaptureError;

// --- The capability set every backend provides ---

pub trait CaptureDevice {
    /// Short human readable description, e.g. "ExternalCamera(1)".
    fn describe(&self) -> String;

    /// Opens the device and returns the resolution it actually negotiated.
    /// Failing here must be quick and must leave the device releasable.
    fn open(&mut self) -> Result<Resolution, CaptureError>;

    /// Blocks for the next frame. `Ok(None)` means the stream ended normally.
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    fn is_open(&self) -> bool;

    /// Releases every handle. Safe to call repeatedly and on a device that never opened.
    fn release(&mut self);

    /// Resolution reported by the device after `open`, never the requested one.
    fn negotiated_resolution(&self) -> Option<Resolution>;
}

/// Closed set of capture backends. New backends are added as variants.
pub enum CaptureSource {
    Realsense(RealsenseDevice),
    ExternalCamera(ExternalCamera),
    FileOrStream(FileSource),
}

impl CaptureSource {
    /// Builds the unopened backend described by `config`.
    pub fn from_config(config: &CaptureConfig) -> Self {
        match &config.backend {
            CaptureBackend::RealsenseDevice { .. } => CaptureSource::Realsense(RealsenseDevice::new(config.clone())),
            CaptureBackend::ExternalCamera { index } => {
                CaptureSource::ExternalCamera(ExternalCamera::new(*index, config.clone()))
            }
            CaptureBackend::FileOrStream { path } => {
                CaptureSource::FileOrStream(FileSource::new(path.clone(), config.pixel_format))
            }
        }
    }

    fn device(&self) -> &dyn CaptureDevice {
        match self {
            CaptureSource::Realsense(dev) => dev,
            CaptureSource::ExternalCamera(dev) => dev,
            CaptureSource::FileOrStream(dev) => dev,
        }
    }

    fn device_mut(&mut self) -> &mut dyn CaptureDevice {
        match self {
            CaptureSource::Realsense(dev) => dev,
            CaptureSource::ExternalCamera(dev) => dev,
            CaptureSource::FileOrStream(dev) => dev,
        }
    }
}

impl CaptureDevice for CaptureSource {
    fn describe(&self) -> String {
        self.device().describe()
    }

    fn open(&mut self) -> Result<Resolution, CaptureError> {
        self.device_mut().open()
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.device_mut().read()
    }

    fn is_open(&self) -> bool {
        self.device().is_open()
    }

    fn release(&mut self) {
        self.device_mut().release()
    }

    fn negotiated_resolution(&self) -> Option<Resolution> {
        self.device().negotiated_resolution()
    }
}

impl<T: CaptureDevice + ?Sized> CaptureDevice for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn open(&mut self) -> Result<Resolution, CaptureError> {
        (**self).open()
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).read()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn negotiated_resolution(&self) -> Option<Resolution> {
        (**self).negotiated_resolution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_picks_variant() {
        let cfg = CaptureConfig::new(CaptureBackend::ExternalCamera { index: 3 });
        let source = CaptureSource::from_config(&cfg);
        assert!(matches!(source, CaptureSource::ExternalCamera(_)));
        assert_eq!(source.describe(), "ExternalCamera(3)");
        assert!(!source.is_open());
        assert_eq!(source.negotiated_resolution(), None);

        let cfg = CaptureConfig::new(CaptureBackend::RealsenseDevice { serial_number: None });
        assert!(matches!(CaptureSource::from_config(&cfg), CaptureSource::Realsense(_)));

        let cfg = CaptureConfig::new(CaptureBackend::FileOrStream { path: "clip.avi".into() });
        assert!(matches!(CaptureSource::from_config(&cfg), CaptureSource::FileOrStream(_)));
    }

    #[test]
    fn test_release_twice_on_unopened_sources() {
        let backends = [
            CaptureBackend::RealsenseDevice { serial_number: Some("000000000000".into()) },
            CaptureBackend::ExternalCamera { index: 99 },
            CaptureBackend::FileOrStream { path: "/nonexistent/clip.avi".into() },
        ];
        for backend in backends {
            let mut source = CaptureSource::from_config(&CaptureConfig::new(backend));
            source.release();
            source.release();
            assert!(!source.is_open());
        }
    }

    #[test]
    fn test_release_twice_after_failed_open() {
        let cfg = CaptureConfig::new(CaptureBackend::FileOrStream { path: "/nonexistent/clip.avi".into() });
        let mut source = CaptureSource::from_config(&cfg);
        let err = source.open().unwrap_err();
        assert_eq!(err.kind(), "DeviceUnavailable");
        source.release();
        source.release();
        assert!(!source.is_open());
    }
}
