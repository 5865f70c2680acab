//! Sensor-side wrappers: captures, images and the value types they carry.

pub mod capture;
pub mod image;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::time::Microseconds;

pub use capture::Capture;
pub use image::Image;

/// Pixel layout of an image buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    ColorMjpg,
    ColorNv12,
    ColorYuy2,
    ColorBgra32,
    Depth16,
    Ir16,
    Custom8,
    Custom16,
    Custom,
}

impl ImageFormat {
    /// Bytes per pixel for uncompressed formats; `None` for compressed/planar ones.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            ImageFormat::ColorBgra32 => Some(4),
            ImageFormat::Depth16 | ImageFormat::Ir16 | ImageFormat::Custom16 => Some(2),
            ImageFormat::ColorYuy2 => Some(2),
            ImageFormat::Custom8 => Some(1),
            ImageFormat::ColorMjpg | ImageFormat::ColorNv12 | ImageFormat::Custom => None,
        }
    }

    /// Minimum stride for `width` pixels, if the format has a fixed pixel size.
    pub fn min_stride(self, width: usize) -> Option<usize> {
        self.bytes_per_pixel().map(|bpp| bpp * width)
    }
}

/// Which image of a capture to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Color,
    Depth,
    Ir,
}

/// Depth sensor operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DepthMode {
    Off,
    Nfov2x2Binned,
    #[default]
    NfovUnbinned,
    Wfov2x2Binned,
    WfovUnbinned,
    PassiveIr,
}

impl DepthMode {
    pub fn has_depth(self) -> bool {
        !matches!(self, DepthMode::Off | DepthMode::PassiveIr)
    }

    pub fn has_passive_ir(self) -> bool {
        !matches!(self, DepthMode::Off)
    }

    /// Depth/IR image resolution in pixels.
    pub fn resolution(self) -> (usize, usize) {
        match self {
            DepthMode::Off => (0, 0),
            DepthMode::Nfov2x2Binned => (320, 288),
            DepthMode::NfovUnbinned => (640, 576),
            DepthMode::Wfov2x2Binned => (512, 512),
            DepthMode::WfovUnbinned | DepthMode::PassiveIr => (1024, 1024),
        }
    }
}

/// Immutable layout metadata of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub size: usize,
}

/// Three-component vector: millimetres for positions, m/s² for acceleration,
/// rad/s for angular velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Float3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Float3 {
    pub const ZERO: Float3 = Float3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// One reading of the inertial sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuSample {
    pub temperature_c: f32,
    pub acc_sample: Float3,
    pub acc_timestamp: Microseconds,
    pub gyro_sample: Float3,
    pub gyro_timestamp: Microseconds,
}

/// Sensor calibration. Opaque to this crate beyond the depth mode; the raw
/// blob is passed through to the native tracker untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    pub depth_mode: DepthMode,
    pub raw: Bytes,
}

impl Calibration {
    pub fn new(depth_mode: DepthMode, raw: impl Into<Bytes>) -> Self {
        Self {
            depth_mode,
            raw: raw.into(),
        }
    }
}
