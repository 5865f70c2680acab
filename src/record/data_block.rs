//! One block of custom track data read back from a recording.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::handle::{NativeHandle, RefHandle};
use crate::native::NativeApi;
use crate::resource::{Disposable, DuplicateReference};
use crate::time::Microseconds;

pub struct PlaybackDataBlock {
    handle: RefHandle,
}

impl PlaybackDataBlock {
    pub(crate) fn from_native(api: Arc<dyn NativeApi>, value: NativeHandle) -> Result<Self> {
        Ok(Self {
            handle: RefHandle::new(api, value)?,
        })
    }

    pub fn device_timestamp(&self) -> Result<Microseconds> {
        self.handle
            .api()
            .data_block_get_device_timestamp(self.handle.value_not_disposed()?)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        self.handle
            .api()
            .data_block_get_buffer(self.handle.value_not_disposed()?)
    }

    pub fn size_bytes(&self) -> Result<usize> {
        Ok(self.to_bytes()?.len())
    }

    pub fn copy_to(&self, dst: &mut [u8]) -> Result<usize> {
        let data = self.to_bytes()?;
        if dst.len() < data.len() {
            return Err(Error::InvalidArgument(format!(
                "destination holds {} bytes, block has {}",
                dst.len(),
                data.len()
            )));
        }
        dst[..data.len()].copy_from_slice(&data);
        Ok(data.len())
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

impl Disposable for PlaybackDataBlock {
    fn dispose(&self) {
        PlaybackDataBlock::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        PlaybackDataBlock::is_disposed(self)
    }

    fn on_disposed(&self, callback: Box<dyn FnOnce() + Send>) {
        self.handle.on_disposed(callback);
    }
}

impl DuplicateReference for PlaybackDataBlock {
    fn duplicate_reference(&self) -> Result<Self> {
        Ok(Self {
            handle: self.handle.duplicate()?,
        })
    }
}

impl fmt::Debug for PlaybackDataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PlaybackDataBlock").field(&self.handle).finish()
    }
}
