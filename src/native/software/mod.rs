//! In-process implementation of the native seam.
//!
//! Keeps real reference counts, runs a bounded inference worker per tracker
//! and stores recordings in memory keyed by path. Used by the binary and by
//! tests; a vendor backend would implement the same traits over FFI.

mod container;
mod inference;
mod objects;

use std::sync::Arc;

use tracing::info;

use self::container::RecordingStore;
use self::objects::{slot_index, CaptureObject, ImageObject, Object, ObjectTable};
use crate::error::{Error, Result};
use crate::handle::NativeHandle;
use crate::native::{NativeApi, ObjectApi, SdkConfig, SensorApi};
use crate::sensor::{ImageFormat, ImageInfo, ImageSlot};
use crate::time::Microseconds;

pub use self::objects::SoftwareStats;

pub struct SoftwareApi {
    config: SdkConfig,
    objects: Arc<ObjectTable>,
    store: Arc<RecordingStore>,
}

impl SoftwareApi {
    pub fn new(config: SdkConfig) -> Self {
        info!(
            log_level = ?config.log_level,
            release_stats = config.release_stats,
            "software backend initialized"
        );
        Self {
            objects: Arc::new(ObjectTable::new(config.release_stats)),
            store: Arc::new(RecordingStore::default()),
            config,
        }
    }

    pub fn shared(config: SdkConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn shared_default() -> Arc<Self> {
        Self::shared(SdkConfig::default())
    }

    /// Default configuration with per-handle release statistics.
    pub fn shared_with_release_stats() -> Arc<Self> {
        Self::shared(SdkConfig {
            release_stats: true,
            ..SdkConfig::default()
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn stats(&self) -> &SoftwareStats {
        self.objects.stats()
    }

    /// Number of native objects currently alive.
    pub fn live_objects(&self) -> usize {
        self.objects.live_count()
    }
}

impl ObjectApi for SoftwareApi {
    fn add_ref(&self, handle: NativeHandle) -> bool {
        self.objects.add_ref(handle)
    }

    fn release(&self, handle: NativeHandle) {
        self.objects.release(handle);
    }
}

impl SensorApi for SoftwareApi {
    fn capture_create(&self) -> Result<NativeHandle> {
        Ok(self.objects.insert(Object::Capture(Arc::new(CaptureObject::default()))))
    }

    fn capture_get_image(
        &self,
        capture: NativeHandle,
        slot: ImageSlot,
    ) -> Result<Option<NativeHandle>> {
        let capture = self.objects.capture(capture)?;
        Ok(self.objects.capture_image(&capture, slot))
    }

    fn capture_set_image(
        &self,
        capture: NativeHandle,
        slot: ImageSlot,
        image: Option<NativeHandle>,
    ) -> Result<()> {
        let capture = self.objects.capture(capture)?;
        if let Some(image) = image {
            if !self.objects.add_ref(image) {
                return Err(Error::InvalidHandle(image.kind()));
            }
        }
        let previous = std::mem::replace(&mut capture.images.lock()[slot_index(slot)], image);
        if let Some(previous) = previous {
            self.objects.release(previous);
        }
        Ok(())
    }

    fn capture_get_temperature_c(&self, capture: NativeHandle) -> Result<f32> {
        Ok(*self.objects.capture(capture)?.temperature_c.lock())
    }

    fn capture_set_temperature_c(&self, capture: NativeHandle, value: f32) -> Result<()> {
        *self.objects.capture(capture)?.temperature_c.lock() = value;
        Ok(())
    }

    fn image_create(
        &self,
        format: ImageFormat,
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<NativeHandle> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument(format!("image size {width}x{height}")));
        }
        let rows = match (format, format.min_stride(width)) {
            (_, Some(min)) if stride < min => {
                return Err(Error::InvalidArgument(format!(
                    "stride {stride} is below {min} bytes for {width} {format:?} pixels"
                )));
            }
            (ImageFormat::ColorNv12, _) if stride < width => {
                return Err(Error::InvalidArgument(format!(
                    "stride {stride} is below width {width}"
                )));
            }
            // luma plane plus the interleaved chroma plane at half height
            (ImageFormat::ColorNv12, _) => height.checked_add(height.div_ceil(2)),
            (_, None) if stride == 0 => {
                return Err(Error::InvalidArgument(format!(
                    "{format:?} images need an explicit stride"
                )));
            }
            _ => Some(height),
        };
        let size = rows.and_then(|rows| stride.checked_mul(rows)).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{width}x{height} {format:?} image with stride {stride} is too large"
            ))
        })?;
        let info = ImageInfo {
            format,
            width,
            height,
            stride,
            size,
        };
        let image = ImageObject::zeroed(info)?;
        Ok(self.objects.insert(Object::Image(Arc::new(image))))
    }

    fn image_info(&self, image: NativeHandle) -> Result<ImageInfo> {
        Ok(self.objects.image(image)?.info)
    }

    fn image_read(&self, image: NativeHandle, dst: &mut [u8]) -> Result<usize> {
        let image = self.objects.image(image)?;
        let data = image.data.lock();
        let n = data.len().min(dst.len());
        dst[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn image_write(&self, image: NativeHandle, src: &[u8]) -> Result<()> {
        let image = self.objects.image(image)?;
        let mut data = image.data.lock();
        if src.len() > data.len() {
            return Err(Error::InvalidArgument(format!(
                "{} bytes do not fit into an image of {} bytes",
                src.len(),
                data.len()
            )));
        }
        data[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn image_get_device_timestamp(&self, image: NativeHandle) -> Result<Microseconds> {
        Ok(self.objects.image(image)?.timestamp())
    }

    fn image_set_device_timestamp(&self, image: NativeHandle, value: Microseconds) -> Result<()> {
        self.objects.image(image)?.set_timestamp(value);
        Ok(())
    }
}

impl NativeApi for SoftwareApi {
    fn name(&self) -> &'static str {
        "software"
    }
}
