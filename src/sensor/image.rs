//! Image buffer wrapper.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::handle::{NativeHandle, RefHandle};
use crate::native::NativeApi;
use crate::resource::{Disposable, DuplicateReference};
use crate::sensor::{ImageFormat, ImageInfo};
use crate::time::Microseconds;
use crate::Sdk;

/// One native image: a pixel buffer plus format, geometry and timestamp.
pub struct Image {
    handle: RefHandle,
}

impl Image {
    /// Wrap a reference returned by the native layer.
    pub(crate) fn from_native(api: Arc<dyn NativeApi>, value: NativeHandle) -> Result<Self> {
        Ok(Self {
            handle: RefHandle::new(api, value)?,
        })
    }

    /// Allocate a zeroed image.
    pub fn create(
        sdk: &Sdk,
        format: ImageFormat,
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<Self> {
        let value = sdk.api().image_create(format, width, height, stride)?;
        Self::from_native(sdk.api().clone(), value)
    }

    /// Allocate an image sized for `data` and copy it in.
    pub fn create_from_bytes(
        sdk: &Sdk,
        format: ImageFormat,
        width: usize,
        height: usize,
        stride: usize,
        data: &[u8],
    ) -> Result<Self> {
        let image = Self::create(sdk, format, width, height, stride)?;
        let size = image.size_bytes()?;
        if data.len() != size {
            return Err(Error::InvalidArgument(format!(
                "expected {size} bytes for {width}x{height} {format:?}, got {}",
                data.len()
            )));
        }
        image.fill_from(data)?;
        Ok(image)
    }

    pub(crate) fn handle(&self) -> &RefHandle {
        &self.handle
    }

    pub fn info(&self) -> Result<ImageInfo> {
        self.handle.api().image_info(self.handle.value_not_disposed()?)
    }

    pub fn format(&self) -> Result<ImageFormat> {
        Ok(self.info()?.format)
    }

    pub fn width_pixels(&self) -> Result<usize> {
        Ok(self.info()?.width)
    }

    pub fn height_pixels(&self) -> Result<usize> {
        Ok(self.info()?.height)
    }

    pub fn stride_bytes(&self) -> Result<usize> {
        Ok(self.info()?.stride)
    }

    pub fn size_bytes(&self) -> Result<usize> {
        Ok(self.info()?.size)
    }

    pub fn device_timestamp(&self) -> Result<Microseconds> {
        self.handle.api().image_get_device_timestamp(self.handle.value_not_disposed()?)
    }

    pub fn set_device_timestamp(&self, value: Microseconds) -> Result<()> {
        self.handle
            .api()
            .image_set_device_timestamp(self.handle.value_not_disposed()?, value)
    }

    /// Copy the whole buffer into `dst`, which must hold at least `size_bytes`.
    pub fn copy_to(&self, dst: &mut [u8]) -> Result<usize> {
        let size = self.size_bytes()?;
        if dst.len() < size {
            return Err(Error::InvalidArgument(format!(
                "destination holds {} bytes, image has {size}",
                dst.len()
            )));
        }
        self.handle.api().image_read(self.handle.value_not_disposed()?, &mut dst[..size])
    }

    /// Overwrite the start of the buffer with `src`.
    pub fn fill_from(&self, src: &[u8]) -> Result<()> {
        self.handle.api().image_write(self.handle.value_not_disposed()?, src)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = vec![0; self.size_bytes()?];
        self.copy_to(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    pub fn on_disposed<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.on_disposed(callback);
    }
}

impl Disposable for Image {
    fn dispose(&self) {
        Image::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Image::is_disposed(self)
    }

    fn on_disposed(&self, callback: Box<dyn FnOnce() + Send>) {
        self.handle.on_disposed(callback);
    }
}

impl DuplicateReference for Image {
    fn duplicate_reference(&self) -> Result<Self> {
        Ok(Self {
            handle: self.handle.duplicate()?,
        })
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Image {}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Image").field(&self.handle).finish()
    }
}
