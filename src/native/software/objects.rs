//! Reference-counted object table of the in-process backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::container::{PlaybackObject, RecordObject};
use super::inference::TrackerObject;
use crate::error::{Error, Result};
use crate::handle::{HandleKind, NativeHandle};
use crate::sensor::{ImageInfo, ImageSlot};
use crate::time::Microseconds;
use crate::tracking::{BodyId, Skeleton};

pub(crate) struct ImageObject {
    pub info: ImageInfo,
    pub data: Mutex<Vec<u8>>,
    timestamp_usec: AtomicI64,
}

impl ImageObject {
    /// Zero-filled buffer of `info.size` bytes. Fails instead of aborting when
    /// the allocation cannot be made.
    pub fn zeroed(info: ImageInfo) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(info.size).map_err(|e| {
            Error::InvalidArgument(format!("cannot allocate {} image bytes: {e}", info.size))
        })?;
        data.resize(info.size, 0);
        Ok(Self {
            info,
            data: Mutex::new(data),
            timestamp_usec: AtomicI64::new(0),
        })
    }

    pub fn with_data(info: ImageInfo, data: Vec<u8>, timestamp: Microseconds) -> Self {
        Self {
            info,
            data: Mutex::new(data),
            timestamp_usec: AtomicI64::new(timestamp.as_usec()),
        }
    }

    pub fn timestamp(&self) -> Microseconds {
        Microseconds(self.timestamp_usec.load(Ordering::Acquire))
    }

    pub fn set_timestamp(&self, value: Microseconds) {
        self.timestamp_usec.store(value.as_usec(), Ordering::Release);
    }

    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data.lock())
    }
}

/// Each populated slot owns one reference to its image.
#[derive(Default)]
pub(crate) struct CaptureObject {
    pub images: Mutex<[Option<NativeHandle>; 3]>,
    pub temperature_c: Mutex<f32>,
}

pub(crate) fn slot_index(slot: ImageSlot) -> usize {
    match slot {
        ImageSlot::Color => 0,
        ImageSlot::Depth => 1,
        ImageSlot::Ir => 2,
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TrackedBody {
    pub id: BodyId,
    pub skeleton: Skeleton,
}

/// Tracking result. Owns one reference to its capture and, when present,
/// to the body index map.
pub(crate) struct FrameObject {
    pub timestamp: Microseconds,
    pub bodies: Vec<TrackedBody>,
    pub capture: NativeHandle,
    pub body_index_map: Option<NativeHandle>,
}

impl FrameObject {
    pub fn body(&self, index: usize) -> Result<&TrackedBody> {
        self.bodies
            .get(index)
            .ok_or_else(|| Error::InvalidArgument(format!("body index {index} out of range")))
    }
}

pub(crate) struct DataBlockObject {
    pub timestamp: Microseconds,
    pub data: Bytes,
}

#[derive(Clone)]
pub(crate) enum Object {
    Image(Arc<ImageObject>),
    Capture(Arc<CaptureObject>),
    Tracker(Arc<TrackerObject>),
    BodyFrame(Arc<FrameObject>),
    Record(Arc<RecordObject>),
    Playback(Arc<PlaybackObject>),
    DataBlock(Arc<DataBlockObject>),
}

impl Object {
    pub fn kind(&self) -> HandleKind {
        match self {
            Object::Image(_) => HandleKind::Image,
            Object::Capture(_) => HandleKind::Capture,
            Object::Tracker(_) => HandleKind::Tracker,
            Object::BodyFrame(_) => HandleKind::BodyFrame,
            Object::Record(_) => HandleKind::Record,
            Object::Playback(_) => HandleKind::Playback,
            Object::DataBlock(_) => HandleKind::PlaybackDataBlock,
        }
    }

    /// Run when the last reference goes. Returns nested references to release.
    fn teardown(&self) -> Vec<NativeHandle> {
        match self {
            Object::Capture(capture) => {
                capture.images.lock().iter_mut().filter_map(Option::take).collect()
            }
            Object::BodyFrame(frame) => {
                let mut nested = vec![frame.capture];
                nested.extend(frame.body_index_map);
                nested
            }
            Object::Tracker(tracker) => tracker.teardown(),
            Object::Record(record) => {
                record.close();
                Vec::new()
            }
            Object::Image(_) | Object::Playback(_) | Object::DataBlock(_) => Vec::new(),
        }
    }
}

struct Slot {
    refs: usize,
    object: Object,
}

/// Per-handle release bookkeeping. Only collected when
/// [`SdkConfig::release_stats`](crate::native::SdkConfig::release_stats) is
/// set, since entries are kept for the lifetime of the backend.
#[derive(Default)]
pub struct SoftwareStats {
    enabled: bool,
    releases: Mutex<HashMap<u64, usize>>,
    freed: Mutex<HashSet<u64>>,
}

impl SoftwareStats {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of `release` calls the handle received.
    pub fn releases(&self, handle: NativeHandle) -> usize {
        self.releases.lock().get(&handle.raw()).copied().unwrap_or(0)
    }

    /// True once the object's last reference was released.
    pub fn is_freed(&self, handle: NativeHandle) -> bool {
        self.freed.lock().contains(&handle.raw())
    }

    pub fn total_freed(&self) -> usize {
        self.freed.lock().len()
    }

    /// Handles with at least one recorded release.
    pub fn tracked_handles(&self) -> usize {
        self.releases.lock().len()
    }

    fn record_release(&self, handle: NativeHandle) {
        if self.enabled {
            *self.releases.lock().entry(handle.raw()).or_insert(0) += 1;
        }
    }

    fn record_freed(&self, handle: NativeHandle) {
        if self.enabled {
            self.freed.lock().insert(handle.raw());
        }
    }
}

pub(crate) struct ObjectTable {
    slots: Mutex<HashMap<u64, Slot>>,
    next_id: AtomicU64,
    stats: SoftwareStats,
}

impl ObjectTable {
    pub fn new(release_stats: bool) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stats: SoftwareStats::new(release_stats),
        }
    }

    pub fn stats(&self) -> &SoftwareStats {
        &self.stats
    }

    pub fn live_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Store a new object; the returned handle carries its single reference.
    pub fn insert(&self, object: Object) -> NativeHandle {
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = NativeHandle::new(object.kind(), raw);
        self.slots.lock().insert(raw, Slot { refs: 1, object });
        trace!(%handle, "native object created");
        handle
    }

    pub fn add_ref(&self, handle: NativeHandle) -> bool {
        match self.slots.lock().get_mut(&handle.raw()) {
            Some(slot) if slot.object.kind() == handle.kind() => {
                slot.refs += 1;
                true
            }
            _ => false,
        }
    }

    pub fn release(&self, handle: NativeHandle) {
        let freed = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(&handle.raw()) else {
                warn!(%handle, "release of unknown native object");
                return;
            };
            if slot.object.kind() != handle.kind() {
                warn!(%handle, actual = %slot.object.kind(), "release with mismatched kind");
                return;
            }
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(&handle.raw()).map(|slot| slot.object)
            } else {
                None
            }
        };

        self.stats.record_release(handle);
        metrics::counter!("trackbridge_native_releases_total").increment(1);

        // teardown may join a worker that itself touches the table
        if let Some(object) = freed {
            trace!(%handle, "native object freed");
            self.stats.record_freed(handle);
            for nested in object.teardown() {
                self.release(nested);
            }
        }
    }

    pub fn get(&self, handle: NativeHandle) -> Result<Object> {
        match self.slots.lock().get(&handle.raw()) {
            Some(slot) if slot.object.kind() == handle.kind() => Ok(slot.object.clone()),
            _ => Err(Error::InvalidHandle(handle.kind())),
        }
    }

    pub fn image(&self, handle: NativeHandle) -> Result<Arc<ImageObject>> {
        match self.get(handle)? {
            Object::Image(image) => Ok(image),
            _ => Err(Error::InvalidHandle(handle.kind())),
        }
    }

    pub fn capture(&self, handle: NativeHandle) -> Result<Arc<CaptureObject>> {
        match self.get(handle)? {
            Object::Capture(capture) => Ok(capture),
            _ => Err(Error::InvalidHandle(handle.kind())),
        }
    }

    pub fn tracker(&self, handle: NativeHandle) -> Result<Arc<TrackerObject>> {
        match self.get(handle)? {
            Object::Tracker(tracker) => Ok(tracker),
            _ => Err(Error::InvalidHandle(handle.kind())),
        }
    }

    pub fn frame(&self, handle: NativeHandle) -> Result<Arc<FrameObject>> {
        match self.get(handle)? {
            Object::BodyFrame(frame) => Ok(frame),
            _ => Err(Error::InvalidHandle(handle.kind())),
        }
    }

    pub fn record(&self, handle: NativeHandle) -> Result<Arc<RecordObject>> {
        match self.get(handle)? {
            Object::Record(record) => Ok(record),
            _ => Err(Error::InvalidHandle(handle.kind())),
        }
    }

    pub fn playback(&self, handle: NativeHandle) -> Result<Arc<PlaybackObject>> {
        match self.get(handle)? {
            Object::Playback(playback) => Ok(playback),
            _ => Err(Error::InvalidHandle(handle.kind())),
        }
    }

    pub fn data_block(&self, handle: NativeHandle) -> Result<Arc<DataBlockObject>> {
        match self.get(handle)? {
            Object::DataBlock(block) => Ok(block),
            _ => Err(Error::InvalidHandle(handle.kind())),
        }
    }

    /// Add one reference to the image in `slot`, if any.
    pub fn capture_image(&self, capture: &CaptureObject, slot: ImageSlot) -> Option<NativeHandle> {
        let images = capture.images.lock();
        let image = images[slot_index(slot)]?;
        // the slot's own reference keeps the image alive while we hold the lock
        self.add_ref(image).then_some(image)
    }
}
