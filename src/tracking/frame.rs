//! Body tracking result for one capture.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};
use crate::handle::{NativeHandle, RefHandle};
use crate::native::NativeApi;
use crate::resource::{ChildTracker, Disposable, DuplicateReference};
use crate::sensor::{Capture, Image};
use crate::time::Microseconds;
use crate::tracking::{BodyId, Skeleton};

/// Body index map value of pixels that belong to no body.
pub const NOT_A_BODY: u8 = 255;

/// Result popped from a [`Tracker`](crate::tracking::Tracker).
///
/// The source capture and the body index map are fetched on first access and
/// then reused; both are disposed together with the frame.
pub struct BodyFrame {
    handle: RefHandle,
    children: ChildTracker,
    capture: OnceCell<Arc<Capture>>,
    body_index_map: OnceCell<Option<Arc<Image>>>,
}

impl BodyFrame {
    pub(crate) fn from_native(api: Arc<dyn NativeApi>, value: NativeHandle) -> Result<Self> {
        Ok(Self {
            handle: RefHandle::new(api, value)?,
            children: ChildTracker::new(),
            capture: OnceCell::new(),
            body_index_map: OnceCell::new(),
        })
    }

    pub fn device_timestamp(&self) -> Result<Microseconds> {
        self.handle
            .api()
            .frame_get_device_timestamp(self.handle.value_not_disposed()?)
    }

    pub fn body_count(&self) -> Result<usize> {
        self.handle
            .api()
            .frame_get_num_bodies(self.handle.value_not_disposed()?)
    }

    pub fn body_id(&self, index: usize) -> Result<BodyId> {
        let count = self.body_count()?;
        if index >= count {
            return Err(Error::InvalidArgument(format!(
                "body index {index} out of range, frame has {count} bodies"
            )));
        }
        self.handle
            .api()
            .frame_get_body_id(self.handle.value_not_disposed()?, index)
    }

    /// Joints of the body at `index`, in the depth camera's coordinates.
    pub fn skeleton(&self, index: usize) -> Result<Skeleton> {
        let count = self.body_count()?;
        if index >= count {
            return Err(Error::InvalidArgument(format!(
                "body index {index} out of range, frame has {count} bodies"
            )));
        }
        self.handle
            .api()
            .frame_get_body_skeleton(self.handle.value_not_disposed()?, index)
    }

    /// Capture this frame was computed from.
    pub fn capture(&self) -> Result<Arc<Capture>> {
        self.capture
            .get_or_try_init(|| -> Result<_> {
                let api = self.handle.api();
                let value = api
                    .frame_get_capture(self.handle.value_not_disposed()?)?
                    .ok_or_else(|| {
                        Error::InvalidOperation(format!("{} has no capture", self.handle))
                    })?;
                let capture = Capture::from_native(api.clone(), value)?;
                Ok(self.children.register(Arc::new(capture)))
            })
            .cloned()
    }

    /// One byte per depth pixel: the index of the body it belongs to, or [`NOT_A_BODY`].
    pub fn body_index_map(&self) -> Result<Option<Arc<Image>>> {
        self.body_index_map
            .get_or_try_init(|| -> Result<_> {
                let api = self.handle.api();
                let value = self.handle.value_not_disposed()?;
                let Some(value) = api.frame_get_body_index_map(value)? else {
                    return Ok(None);
                };
                let image = Image::from_native(api.clone(), value)?;
                Ok(Some(self.children.register(Arc::new(image))))
            })
            .cloned()
    }

    pub fn dispose(&self) {
        self.children.dispose_all();
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

impl Drop for BodyFrame {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Disposable for BodyFrame {
    fn dispose(&self) {
        BodyFrame::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        BodyFrame::is_disposed(self)
    }

    fn on_disposed(&self, callback: Box<dyn FnOnce() + Send>) {
        self.handle.on_disposed(callback);
    }
}

impl DuplicateReference for BodyFrame {
    fn duplicate_reference(&self) -> Result<Self> {
        Ok(Self {
            handle: self.handle.duplicate()?,
            children: ChildTracker::new(),
            capture: OnceCell::new(),
            body_index_map: OnceCell::new(),
        })
    }
}

impl PartialEq for BodyFrame {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for BodyFrame {}

impl fmt::Debug for BodyFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BodyFrame").field(&self.handle).finish()
    }
}
