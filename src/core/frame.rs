//! Frame type shared by every capture backend and the recorder.
//!
//! Pixel buffers are reference counted and never mutated after construction,
//! so a frame can be handed to the consumer and the recorder without copying.

use crate::errors::CaptureError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Bgr8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Depth channel aligned with the colour plane of a frame.
#[derive(Debug, Clone)]
pub struct DepthPlane {
    data: Arc<[u16]>,
    /// Metres per depth step.
    depth_units: f32,
}

impl DepthPlane {
    pub fn new(data: Vec<u16>, depth_units: f32) -> Self {
        Self {
            data: data.into(),
            depth_units,
        }
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    pub fn depth_units(&self) -> f32 {
        self.depth_units
    }

    /// Raw little-endian bytes of the depth samples.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Distance in metres at `(x, y)`, `None` outside the plane.
    pub fn distance_at(&self, resolution: Resolution, x: u32, y: u32) -> Option<f32> {
        if x >= resolution.width || y >= resolution.height {
            return None;
        }
        let idx = y as usize * resolution.width as usize + x as usize;
        self.data.get(idx).map(|raw| *raw as f32 * self.depth_units)
    }
}

/// A single captured frame.
#[derive(Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    resolution: Resolution,
    format: PixelFormat,
    depth: Option<DepthPlane>,
    sequence: u64,
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Builds a frame, checking the buffer length against the dimensions.
    pub fn new(
        data: Vec<u8>,
        resolution: Resolution,
        format: PixelFormat,
        sequence: u64,
    ) -> Result<Self, CaptureError> {
        let expected = resolution.pixel_count() * format.channels();
        if data.len() != expected {
            return Err(CaptureError::ReadFailed(format!(
                "frame buffer holds {} bytes, {} {:?} needs {}",
                data.len(),
                resolution,
                format,
                expected
            )));
        }
        Ok(Self {
            data: data.into(),
            resolution,
            format,
            depth: None,
            sequence,
            captured_at: Utc::now(),
        })
    }

    /// Attaches a depth plane with the same spatial dimensions.
    pub fn with_depth(mut self, depth: DepthPlane) -> Result<Self, CaptureError> {
        if depth.data().len() != self.resolution.pixel_count() {
            return Err(CaptureError::ReadFailed(format!(
                "depth plane holds {} samples, frame is {}",
                depth.data().len(),
                self.resolution
            )));
        }
        self.depth = Some(depth);
        Ok(self)
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn depth(&self) -> Option<&DepthPlane> {
        self.depth.as_ref()
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns the frame in `target` channel order. Same-format conversion is free.
    pub fn to_format(&self, target: PixelFormat) -> Result<Frame, CaptureError> {
        if target == self.format {
            return Ok(self.clone());
        }
        let data = match (self.format, target) {
            (PixelFormat::Bgr8, PixelFormat::Rgb8) | (PixelFormat::Rgb8, PixelFormat::Bgr8) => {
                swap_red_blue(&self.data)
            }
            (PixelFormat::Gray8, PixelFormat::Bgr8) | (PixelFormat::Gray8, PixelFormat::Rgb8) => {
                self.data.iter().flat_map(|v| [*v, *v, *v]).collect()
            }
            (from, to) => {
                return Err(CaptureError::Encoder(format!(
                    "unsupported pixel conversion {:?} -> {:?}",
                    from, to
                )))
            }
        };
        Ok(Frame {
            data: data.into(),
            resolution: self.resolution,
            format: target,
            depth: self.depth.clone(),
            sequence: self.sequence,
            captured_at: self.captured_at,
        })
    }
}

/// Swaps the first and third byte of every 3-byte pixel.
pub fn swap_red_blue(pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len());
    for chunk in pixels.chunks_exact(3) {
        out.push(chunk[2]);
        out.push(chunk[1]);
        out.push(chunk[0]);
    }
    out
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("resolution", &self.resolution)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("has_depth", &self.depth.is_some())
            .field("pixel_bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_wrong_buffer_size() {
        let result = Frame::new(vec![0u8; 10], Resolution::new(4, 4), PixelFormat::Bgr8, 1);
        assert!(matches!(result, Err(CaptureError::ReadFailed(_))));
    }

    #[test]
    fn test_bgr_to_rgb_swaps_channels() {
        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], Resolution::new(2, 1), PixelFormat::Bgr8, 7).unwrap();
        let rgb = frame.to_format(PixelFormat::Rgb8).unwrap();
        assert_eq!(rgb.data(), &[3, 2, 1, 6, 5, 4]);
        assert_eq!(rgb.format(), PixelFormat::Rgb8);
        assert_eq!(rgb.sequence(), 7);
    }

    #[test]
    fn test_clone_shares_pixels() {
        let frame = Frame::new(vec![9u8; 12], Resolution::new(2, 2), PixelFormat::Bgr8, 1).unwrap();
        let copy = frame.clone();
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
    }

    #[test]
    fn test_depth_plane_must_match_dimensions() {
        let frame = Frame::new(vec![0u8; 12], Resolution::new(2, 2), PixelFormat::Bgr8, 1).unwrap();
        assert!(frame.clone().with_depth(DepthPlane::new(vec![0u16; 3], 0.001)).is_err());

        let with_depth = frame.with_depth(DepthPlane::new(vec![0, 1, 2, 4], 0.25)).unwrap();
        let depth = with_depth.depth().unwrap();
        assert_eq!(depth.as_bytes().len(), 8);
        assert_eq!(depth.distance_at(with_depth.resolution(), 1, 1), Some(1.0));
        assert_eq!(depth.distance_at(with_depth.resolution(), 2, 0), None);
    }
}
