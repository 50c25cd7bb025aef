use crate::camera_config::{CaptureBackend, CaptureConfig};
use crate::core::capture_source::CaptureDevice;
use crate::core::frame::{Frame, Resolution};
use crate::errors::CaptureError;
use log::debug;
#[cfg(feature = "realsense")]
use log::{info, warn};

#[cfg(feature = "realsense")]
use realsense_rust::{
    config::Config as RsConfig,
    context::Context as RsContext,
    frame::{ColorFrame, CompositeFrame, DepthFrame, FrameEx},
    kind::{Rs2CameraInfo, Rs2Format, Rs2Option, Rs2StreamKind},
    pipeline::{ActivePipeline as RsActivePipeline, InactivePipeline as RsInactivePipeline},
    processing_blocks::align::Align,
};

#[cfg(feature = "realsense")]
const ALIGN_QUEUE_SIZE: i32 = 1;

/// Intel RealSense colour (and optional depth) stream through librealsense.
pub struct RealsenseDevice {
    config: CaptureConfig,
    #[cfg(feature = "realsense")]
    pipeline: Option<RsActivePipeline>,
    #[cfg(feature = "realsense")]
    align: Option<Align>,
    #[cfg(feature = "realsense")]
    pending: Option<Frame>,
    serial_in_use: Option<String>,
    negotiated: Option<Resolution>,
    sequence: u64,
}

impl RealsenseDevice {
    pub fn new(config: CaptureConfig) -> Self {
        RealsenseDevice {
            config,
            #[cfg(feature = "realsense")]
            pipeline: None,
            #[cfg(feature = "realsense")]
            align: None,
            #[cfg(feature = "realsense")]
            pending: None,
            serial_in_use: None,
            negotiated: None,
            sequence: 0,
        }
    }

    fn requested_serial(&self) -> Option<&str> {
        match &self.config.backend {
            CaptureBackend::RealsenseDevice { serial_number } => serial_number.as_deref(),
            _ => None,
        }
    }

    /// Serial number of the opened device.
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_in_use.as_deref()
    }

    #[cfg(not(feature = "realsense"))]
    fn open_inner(&mut self) -> Result<Resolution, CaptureError> {
        Err(CaptureError::DeviceUnavailable(format!(
            "{}: built without the `realsense` feature",
            self.describe()
        )))
    }

    #[cfg(not(feature = "realsense"))]
    fn read_inner(&mut self) -> Result<Option<Frame>, CaptureError> {
        Err(CaptureError::ReadFailed(format!("{} is not open", self.describe())))
    }

    #[cfg(not(feature = "realsense"))]
    fn stop_pipeline(&mut self) {}

    #[cfg(feature = "realsense")]
    fn select_serial(&self, context: &RsContext) -> Result<String, CaptureError> {
        use std::collections::HashSet;

        let device_list = context.query_devices(HashSet::new());
        if device_list.is_empty() {
            return Err(CaptureError::DeviceUnavailable("No Realsense devices found.".to_string()));
        }
        let serial_of = |dev: &realsense_rust::device::Device| {
            dev.info(Rs2CameraInfo::SerialNumber)
                .and_then(|cstr| cstr.to_str().ok())
                .map(|s| s.to_string())
        };
        match self.requested_serial() {
            Some(wanted) => {
                info!("RS: Searching for device S/N: {}", wanted);
                device_list
                    .iter()
                    .filter_map(serial_of)
                    .find(|sn| sn == wanted)
                    .ok_or_else(|| CaptureError::DeviceUnavailable(format!("Specified device S/N '{}' not found.", wanted)))
            }
            None => {
                info!("RS: No S/N specified, using first available device.");
                device_list
                    .first()
                    .and_then(serial_of)
                    .ok_or_else(|| CaptureError::DeviceUnavailable("Failed to read S/N of the first device".to_string()))
            }
        }
    }

    #[cfg(feature = "realsense")]
    fn apply_sensor_options(&self, pipeline: &RsActivePipeline) {
        if self.config.exposure.is_none() && self.config.gain.is_none() {
            return;
        }
        for mut sensor in pipeline.profile().device().sensors() {
            let name = sensor
                .info(Rs2CameraInfo::Name)
                .and_then(|c| c.to_str().ok())
                .unwrap_or("")
                .to_string();
            if !name.contains("RGB") {
                continue;
            }
            if let Some(exposure) = self.config.exposure {
                if let Err(e) = sensor.set_option(Rs2Option::Exposure, exposure) {
                    warn!("⚠️ RS: Failed to set exposure {} on '{}': {}", exposure, name, e);
                }
            }
            if let Some(gain) = self.config.gain {
                if let Err(e) = sensor.set_option(Rs2Option::Gain, gain) {
                    warn!("⚠️ RS: Failed to set gain {} on '{}': {}", gain, name, e);
                }
            }
        }
    }

    #[cfg(feature = "realsense")]
    fn open_inner(&mut self) -> Result<Resolution, CaptureError> {
        use crate::core::frame::PixelFormat;
        use std::ffi::CString;

        let unavailable = |what: &str, e: &dyn std::fmt::Display| CaptureError::DeviceUnavailable(format!("RS: {}: {}", what, e));
        let rs_format = match self.config.pixel_format {
            PixelFormat::Bgr8 => Rs2Format::Bgr8,
            PixelFormat::Rgb8 => Rs2Format::Rgb8,
            PixelFormat::Gray8 => {
                return Err(CaptureError::Config("RealSense colour stream supports bgr8 or rgb8 only".to_string()))
            }
        };

        self.align = None;
        let context = RsContext::new().map_err(|e| unavailable("Failed to create Realsense context", &e))?;
        let serial = self.select_serial(&context)?;
        let inactive = RsInactivePipeline::try_from(&context).map_err(|e| unavailable("Failed to create pipeline", &e))?;

        let mut rs_config = RsConfig::new();
        let c_serial = CString::new(serial.clone()).map_err(|e| unavailable("Invalid serial", &e))?;
        rs_config
            .enable_device_from_serial(c_serial.as_c_str())
            .map_err(|e| unavailable("Failed to enable device", &e))?;
        rs_config.disable_all_streams().map_err(|e| unavailable("Failed to reset streams", &e))?;

        let requested = self.config.requested_resolution();
        let fps = self.config.target_fps as usize;
        rs_config
            .enable_stream(Rs2StreamKind::Color, None, requested.width as usize, requested.height as usize, rs_format, fps)
            .map_err(|e| unavailable(&format!("Failed to enable color stream {}@{}", requested, fps), &e))?;
        if self.config.with_depth {
            rs_config
                .enable_stream(Rs2StreamKind::Depth, None, requested.width as usize, requested.height as usize, Rs2Format::Z16, fps)
                .map_err(|e| unavailable(&format!("Failed to enable depth stream {}@{}", requested, fps), &e))?;
            // Depth is reprojected into the colour camera so (x, y) means the same point in both planes.
            let align = Align::new(Rs2StreamKind::Color, ALIGN_QUEUE_SIZE)
                .map_err(|e| unavailable("Failed to create depth-to-colour align block", &e))?;
            self.align = Some(align);
        }

        info!("RS: Starting pipeline for S/N {}...", serial);
        let pipeline = inactive
            .start(Some(rs_config))
            .map_err(|e| unavailable("Failed to start pipeline", &e))?;
        self.apply_sensor_options(&pipeline);
        self.pipeline = Some(pipeline);
        self.serial_in_use = Some(serial);

        // The first frameset tells us what the device actually streams.
        let first = match self.wait_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.stop_pipeline();
                return Err(CaptureError::DeviceUnavailable(format!("RS: no first frame: {}", e)));
            }
        };
        let actual = first.resolution();
        self.pending = Some(first);
        Ok(actual)
    }

    #[cfg(feature = "realsense")]
    fn wait_frame(&mut self) -> Result<Frame, CaptureError> {
        let timeout = self.config.read_timeout();
        let sequence = self.sequence;
        let format = self.config.pixel_format;
        let pipeline = self
            .pipeline
            .as_mut()
            .ok_or_else(|| CaptureError::ReadFailed("RS: pipeline is not running".to_string()))?;
        let mut frameset: CompositeFrame = pipeline
            .wait(Some(timeout))
            .map_err(|e| CaptureError::ReadFailed(format!("RS: wait for frames failed: {}", e)))?;
        if let Some(align) = self.align.as_mut() {
            align
                .queue(frameset)
                .map_err(|e| CaptureError::ReadFailed(format!("RS: queueing frames for alignment failed: {}", e)))?;
            frameset = align
                .wait(timeout)
                .map_err(|e| CaptureError::ReadFailed(format!("RS: depth alignment failed: {}", e)))?;
        }

        let color_frames: Vec<ColorFrame> = frameset.frames_of_type::<ColorFrame>();
        let color = color_frames
            .first()
            .ok_or_else(|| CaptureError::ReadFailed("RS: frameset had no colour frame".to_string()))?;
        let resolution = Resolution::new(color.width() as u32, color.height() as u32);
        let bytes_per_pixel = color.bits_per_pixel() / 8;
        if bytes_per_pixel != 3 {
            return Err(CaptureError::ReadFailed(format!(
                "RS: colour frame has {} bytes per pixel, expected 3",
                bytes_per_pixel
            )));
        }
        let data_size = resolution.pixel_count() * 3;
        // SAFETY: librealsense keeps the buffer alive while `color` is held and sizes it width*height*bpp.
        let pixels = unsafe {
            let ptr = color.get_data() as *const u8;
            std::slice::from_raw_parts(ptr, data_size).to_vec()
        };
        let mut frame = Frame::new(pixels, resolution, format, sequence)?;

        if self.config.with_depth {
            let depth_frames: Vec<DepthFrame> = frameset.frames_of_type::<DepthFrame>();
            match depth_frames.first() {
                Some(depth) if depth.width() as u32 == resolution.width && depth.height() as u32 == resolution.height => {
                    let units = depth
                        .depth_units()
                        .map_err(|e| CaptureError::ReadFailed(format!("RS: Failed to get depth units: {}", e)))?;
                    // SAFETY: Z16 frame of width*height u16 samples, alive while `depth` is held.
                    let samples = unsafe {
                        let ptr = depth.get_data() as *const u16;
                        std::slice::from_raw_parts(ptr, resolution.pixel_count()).to_vec()
                    };
                    frame = frame.with_depth(crate::core::frame::DepthPlane::new(samples, units))?;
                }
                Some(depth) => warn!(
                    "⚠️ RS: aligned depth frame {}x{} does not match colour {}, skipping depth",
                    depth.width(),
                    depth.height(),
                    resolution
                ),
                None => warn!("⚠️ RS: depth stream enabled, but no depth frame in frameset."),
            }
        }
        Ok(frame)
    }

    #[cfg(feature = "realsense")]
    fn read_inner(&mut self) -> Result<Option<Frame>, CaptureError> {
        let frame = match self.pending.take() {
            Some(frame) => frame,
            None => self.wait_frame()?,
        };
        self.sequence += 1;
        Ok(Some(frame))
    }

    #[cfg(feature = "realsense")]
    fn stop_pipeline(&mut self) {
        self.pending = None;
        self.align = None;
        if let Some(pipeline) = self.pipeline.take() {
            info!("RS: Stopping pipeline...");
            let _inactive = pipeline.stop();
        }
    }
}

impl CaptureDevice for RealsenseDevice {
    fn describe(&self) -> String {
        match self.serial_in_use.as_deref().or(self.requested_serial()) {
            Some(sn) => format!("RealsenseDevice({})", sn),
            None => "RealsenseDevice(first available)".to_string(),
        }
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
        #[cfg(feature = "realsense")]
        {
            self.pipeline.is_some()
        }
        #[cfg(not(feature = "realsense"))]
        {
            false
        }
    }

    fn release(&mut self) {
        self.stop_pipeline();
        if self.negotiated.take().is_some() {
            debug!("Released {}", self.describe());
        }
    }

    fn negotiated_resolution(&self) -> Option<Resolution> {
        self.negotiated
    }
}

impl Drop for RealsenseDevice {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(serial: Option<&str>) -> RealsenseDevice {
        RealsenseDevice::new(CaptureConfig::new(CaptureBackend::RealsenseDevice {
            serial_number: serial.map(|s| s.to_string()),
        }))
    }

    #[test]
    fn test_describe_uses_requested_serial() {
        assert_eq!(device(Some("123")).describe(), "RealsenseDevice(123)");
        assert_eq!(device(None).describe(), "RealsenseDevice(first available)");
        assert_eq!(device(None).serial_number(), None);
    }

    #[cfg(not(feature = "realsense"))]
    #[test]
    fn test_open_without_feature_fails_fast() {
        let mut dev = device(None);
        let started = std::time::Instant::now();
        assert_eq!(dev.open().unwrap_err().kind(), "DeviceUnavailable");
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert!(!dev.is_open());
        dev.release();
        dev.release();
    }
}
