//! Capture wrapper: a set of color, depth and IR images taken together.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::handle::{NativeHandle, RefHandle};
use crate::native::NativeApi;
use crate::resource::{ChildTracker, Disposable, DuplicateReference};
use crate::sensor::{Image, ImageSlot};
use crate::Sdk;

/// Images handed out by the getters are owned by the capture and disposed
/// with it, unless the caller disposes them first.
pub struct Capture {
    handle: RefHandle,
    children: ChildTracker,
}

impl Capture {
    pub(crate) fn from_native(api: Arc<dyn NativeApi>, value: NativeHandle) -> Result<Self> {
        Ok(Self {
            handle: RefHandle::new(api, value)?,
            children: ChildTracker::new(),
        })
    }

    /// Empty capture without images.
    pub fn create(sdk: &Sdk) -> Result<Self> {
        let value = sdk.api().capture_create()?;
        Self::from_native(sdk.api().clone(), value)
    }

    /// Capture holding the given images. Nothing is leaked if a step fails.
    pub fn from_images(
        sdk: &Sdk,
        color: Option<&Image>,
        depth: Option<&Image>,
        ir: Option<&Image>,
    ) -> Result<Self> {
        let capture = Self::create(sdk)?;
        // an early return drops `capture`, releasing it and every image it took
        let slots = [(ImageSlot::Color, color), (ImageSlot::Depth, depth), (ImageSlot::Ir, ir)];
        for (slot, image) in slots {
            if image.is_some() {
                capture.set_image(slot, image)?;
            }
        }
        Ok(capture)
    }

    pub(crate) fn handle(&self) -> &RefHandle {
        &self.handle
    }

    fn image(&self, slot: ImageSlot) -> Result<Option<Arc<Image>>> {
        let api = self.handle.api();
        let Some(value) = api.capture_get_image(self.handle.value_not_disposed()?, slot)? else {
            return Ok(None);
        };
        let image = Image::from_native(api.clone(), value)?;
        Ok(Some(self.children.register(Arc::new(image))))
    }

    fn set_image(&self, slot: ImageSlot, image: Option<&Image>) -> Result<()> {
        let value = image.map(|i| i.handle().value_not_disposed()).transpose()?;
        self.handle
            .api()
            .capture_set_image(self.handle.value_not_disposed()?, slot, value)
    }

    pub fn color_image(&self) -> Result<Option<Arc<Image>>> {
        self.image(ImageSlot::Color)
    }

    pub fn depth_image(&self) -> Result<Option<Arc<Image>>> {
        self.image(ImageSlot::Depth)
    }

    pub fn ir_image(&self) -> Result<Option<Arc<Image>>> {
        self.image(ImageSlot::Ir)
    }

    /// The capture takes its own reference; the caller keeps `image`.
    pub fn set_color_image(&self, image: Option<&Image>) -> Result<()> {
        self.set_image(ImageSlot::Color, image)
    }

    pub fn set_depth_image(&self, image: Option<&Image>) -> Result<()> {
        self.set_image(ImageSlot::Depth, image)
    }

    pub fn set_ir_image(&self, image: Option<&Image>) -> Result<()> {
        self.set_image(ImageSlot::Ir, image)
    }

    pub fn temperature_c(&self) -> Result<f32> {
        self.handle
            .api()
            .capture_get_temperature_c(self.handle.value_not_disposed()?)
    }

    pub fn set_temperature_c(&self, value: f32) -> Result<()> {
        self.handle
            .api()
            .capture_set_temperature_c(self.handle.value_not_disposed()?, value)
    }

    /// Dispose the images handed out so far, then the capture itself.
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

impl Drop for Capture {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Disposable for Capture {
    fn dispose(&self) {
        Capture::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Capture::is_disposed(self)
    }

    fn on_disposed(&self, callback: Box<dyn FnOnce() + Send>) {
        self.handle.on_disposed(callback);
    }
}

impl DuplicateReference for Capture {
    fn duplicate_reference(&self) -> Result<Self> {
        Ok(Self {
            handle: self.handle.duplicate()?,
            children: ChildTracker::new(),
        })
    }
}

impl PartialEq for Capture {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for Capture {}

impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field("handle", &self.handle)
            .field("children", &self.children.live_count())
            .finish()
    }
}
