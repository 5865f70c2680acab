//! Tracker objects of the in-process backend and their inference worker.
//!
//! Each tracker owns a [`BoundedTrackingQueue`] and one worker thread. The
//! worker segments the depth image of every capture into body and background
//! pixels: a pixel belongs to the body when its depth is in
//! `(0, body_max_depth_mm]`, and a frame contains one body when at least
//! `body_min_pixels` pixels do. The skeleton is laid out over the bounding
//! box of the body pixels.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::objects::{FrameObject, ImageObject, Object, ObjectTable, TrackedBody};
use super::SoftwareApi;
use crate::error::{Error, Result};
use crate::handle::NativeHandle;
use crate::native::{TrackerApi, WaitResult};
use crate::sensor::{Calibration, DepthMode, Float3, ImageFormat, ImageInfo, ImageSlot};
use crate::time::{Microseconds, Timeout};
use crate::tracking::frame::NOT_A_BODY;
use crate::tracking::skeleton::{Joint, JointConfidence, Quaternion, Skeleton, JOINT_COUNT};
use crate::tracking::tracker::{DEFAULT_SMOOTHING_FACTOR, MAX_QUEUE_SIZE};
use crate::tracking::{BodyId, BoundedTrackingQueue, TrackerConfiguration};

/// Queue items are captures, results are body frames. Each queued handle
/// owns one reference.
type TrackingQueue = BoundedTrackingQueue<NativeHandle, NativeHandle>;

/// Pinhole focal length as a fraction of the image width, about a 75° field of view.
const FOCAL_PER_WIDTH: f32 = 0.65;

/// Joint positions as fractions of the body bounding box, in native joint
/// order. The body faces the camera, so its left side is on the image right.
const BODY_LAYOUT: [(f32, f32); JOINT_COUNT] = [
    (0.50, 0.52), // pelvis
    (0.50, 0.42),
    (0.50, 0.30),
    (0.50, 0.18), // neck
    (0.60, 0.20),
    (0.70, 0.22),
    (0.80, 0.35),
    (0.85, 0.48), // left wrist
    (0.40, 0.20),
    (0.30, 0.22),
    (0.20, 0.35),
    (0.15, 0.48), // right wrist
    (0.60, 0.55),
    (0.60, 0.75),
    (0.60, 0.93),
    (0.62, 1.00), // left foot
    (0.40, 0.55),
    (0.40, 0.75),
    (0.40, 0.93),
    (0.38, 1.00), // right foot
    (0.50, 0.00), // head
    (0.50, 0.10),
    (0.55, 0.07),
    (0.58, 0.08),
    (0.45, 0.07),
    (0.42, 0.08),
];

#[derive(Debug, Clone, Copy)]
struct Segmentation {
    max_depth_mm: u16,
    min_pixels: usize,
    resolution: (usize, usize),
}

pub(crate) struct TrackerObject {
    depth_mode: DepthMode,
    queue: Arc<TrackingQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
    temporal_smoothing: Arc<Mutex<f32>>,
}

impl TrackerObject {
    /// Shut the queue down, join the worker and hand back every reference
    /// still held by queued items.
    pub fn teardown(&self) -> Vec<NativeHandle> {
        self.queue.shutdown();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("tracker worker panicked");
            }
        }
        let (pending, ready) = self.queue.drain();
        pending.into_iter().chain(ready).collect()
    }

    fn validate_capture(&self, objects: &ObjectTable, capture: NativeHandle) -> Result<()> {
        let capture_obj = objects.capture(capture)?;
        let (width, height) = self.depth_mode.resolution();
        let expected = [
            (ImageSlot::Depth, ImageFormat::Depth16),
            (ImageSlot::Ir, ImageFormat::Ir16),
        ];
        for (slot, format) in expected {
            let Some(image) = objects.capture_image(&capture_obj, slot) else {
                return Err(Error::InvalidArgument(format!("capture has no {slot:?} image")));
            };
            let info = objects.image(image).map(|i| i.info);
            objects.release(image);
            let info = info?;
            if info.format != format || info.width != width || info.height != height {
                return Err(Error::InvalidArgument(format!(
                    "{slot:?} image is {:?} {}x{}, expected {format:?} {width}x{height}",
                    info.format, info.width, info.height
                )));
            }
        }
        Ok(())
    }
}

/// Assigns body ids that stay stable while a body remains in view.
struct BodyIds {
    next: u32,
    current: Option<BodyId>,
}

impl BodyIds {
    fn new() -> Self {
        Self { next: 1, current: None }
    }

    fn observe(&mut self, present: bool) -> Option<BodyId> {
        if !present {
            self.current = None;
            return None;
        }
        let id = *self.current.get_or_insert_with(|| {
            let id = BodyId(self.next);
            self.next += 1;
            id
        });
        Some(id)
    }
}

/// Per-worker state carried from one frame to the next.
struct WorkerState {
    ids: BodyIds,
    smoothing: Arc<Mutex<f32>>,
    smoothed_pixels: f32,
}

impl WorkerState {
    /// Blend the body pixel count with the previous frames' and decide presence.
    fn observe(&mut self, body_pixels: usize, min_pixels: usize) -> Option<BodyId> {
        let factor = *self.smoothing.lock();
        self.smoothed_pixels = factor * self.smoothed_pixels + (1.0 - factor) * body_pixels as f32;
        self.ids.observe(self.smoothed_pixels >= min_pixels as f32)
    }
}

fn spawn_worker(
    objects: Arc<ObjectTable>,
    queue: Arc<TrackingQueue>,
    seg: Segmentation,
    smoothing: Arc<Mutex<f32>>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("trackbridge-inference".into())
        .spawn(move || {
            let mut state = WorkerState {
                ids: BodyIds::new(),
                smoothing,
                smoothed_pixels: 0.0,
            };
            while let Some(capture) = queue.take_work() {
                let step = panic::catch_unwind(AssertUnwindSafe(|| {
                    infer(&objects, capture, seg, &mut state)
                }));
                match step {
                    Ok(frame) => queue.complete(objects.insert(Object::BodyFrame(Arc::new(frame)))),
                    Err(_) => {
                        error!(%capture, "inference panicked, failing the pipeline");
                        objects.release(capture);
                        queue.fail();
                        break;
                    }
                }
            }
            debug!("inference worker exiting");
        })
        .map_err(|e| Error::pipeline(format!("cannot spawn inference worker: {e}")))
}

fn empty_frame(capture: NativeHandle) -> FrameObject {
    FrameObject {
        timestamp: Microseconds::ZERO,
        bodies: Vec::new(),
        capture,
        body_index_map: None,
    }
}

/// Build the frame for `capture`, taking over the queue's reference to it.
fn infer(
    objects: &ObjectTable,
    capture: NativeHandle,
    seg: Segmentation,
    state: &mut WorkerState,
) -> FrameObject {
    let depth = objects
        .capture(capture)
        .ok()
        .and_then(|c| objects.capture_image(&c, ImageSlot::Depth));
    let Some(depth) = depth else {
        warn!(%capture, "capture lost its depth image before inference");
        return empty_frame(capture);
    };

    // the capture may have been modified since it was enqueued
    let segmented = objects.image(depth).and_then(|image| segment(&image, seg));
    objects.release(depth);

    match segmented {
        Ok(segmented) => {
            let skeleton = segmented.skeleton.unwrap_or_default();
            let bodies = state
                .observe(segmented.body_pixels, seg.min_pixels)
                .map(|id| TrackedBody { id, skeleton })
                .into_iter()
                .collect();
            let map = objects.insert(Object::Image(Arc::new(segmented.map)));
            FrameObject {
                timestamp: segmented.timestamp,
                bodies,
                capture,
                body_index_map: Some(map),
            }
        }
        Err(err) => {
            warn!(%capture, %err, "depth image unusable");
            empty_frame(capture)
        }
    }
}

/// Result of segmenting one depth image.
struct Segmented {
    map: ImageObject,
    timestamp: Microseconds,
    body_pixels: usize,
    skeleton: Option<Skeleton>,
}

/// Bounding box and pixel count of the body pixels.
#[derive(Debug, Clone, Copy)]
struct Extent {
    min: (usize, usize),
    max: (usize, usize),
    pixels: usize,
    depth_sum: u64,
}

impl Extent {
    fn at(x: usize, y: usize) -> Self {
        Self {
            min: (x, y),
            max: (x, y),
            pixels: 0,
            depth_sum: 0,
        }
    }

    fn include(&mut self, x: usize, y: usize, mm: u16) {
        self.min = (self.min.0.min(x), self.min.1.min(y));
        self.max = (self.max.0.max(x), self.max.1.max(y));
        self.pixels += 1;
        self.depth_sum += u64::from(mm);
    }

    fn mean_depth(&self) -> f32 {
        self.depth_sum as f32 / self.pixels.max(1) as f32
    }
}

/// Reject depth images whose layout does not match the tracker.
fn check_depth_layout(info: &ImageInfo, data_len: usize, resolution: (usize, usize)) -> Result<()> {
    let (width, height) = resolution;
    if info.format != ImageFormat::Depth16 || (info.width, info.height) != resolution {
        return Err(Error::InvalidArgument(format!(
            "depth image is {:?} {}x{}, expected Depth16 {width}x{height}",
            info.format, info.width, info.height
        )));
    }
    let needed = info
        .stride
        .checked_mul(height.saturating_sub(1))
        .and_then(|n| n.checked_add(2 * width));
    if info.stride < 2 * width || needed.map_or(true, |n| data_len < n) {
        return Err(Error::InvalidArgument(format!(
            "depth buffer of {data_len} bytes with stride {} is too small",
            info.stride
        )));
    }
    Ok(())
}

fn segment(depth: &ImageObject, seg: Segmentation) -> Result<Segmented> {
    let info = depth.info;
    let data = depth.data.lock();
    check_depth_layout(&info, data.len(), seg.resolution)?;

    let mm_at = |x: usize, y: usize| {
        let i = y * info.stride + 2 * x;
        u16::from_le_bytes([data[i], data[i + 1]])
    };
    let mut map = vec![NOT_A_BODY; info.width * info.height];
    let mut extent: Option<Extent> = None;
    for y in 0..info.height {
        for x in 0..info.width {
            let mm = mm_at(x, y);
            if mm > 0 && mm <= seg.max_depth_mm {
                map[y * info.width + x] = 0;
                extent.get_or_insert_with(|| Extent::at(x, y)).include(x, y, mm);
            }
        }
    }
    let skeleton = extent.map(|extent| {
        estimate_skeleton(&extent, info.width, info.height, |x, y| {
            (map[y * info.width + x] == 0).then(|| mm_at(x, y))
        })
    });

    let map_info = ImageInfo {
        format: ImageFormat::Custom8,
        width: info.width,
        height: info.height,
        stride: info.width,
        size: info.width * info.height,
    };
    Ok(Segmented {
        map: ImageObject::with_data(map_info, map, depth.timestamp()),
        timestamp: depth.timestamp(),
        body_pixels: extent.map_or(0, |e| e.pixels),
        skeleton,
    })
}

/// Place every joint of [`BODY_LAYOUT`] inside `extent` and back-project it.
///
/// `body_depth` returns the depth of a body pixel and `None` for background;
/// joints that land on background take the mean body depth and low confidence.
fn estimate_skeleton(
    extent: &Extent,
    width: usize,
    height: usize,
    body_depth: impl Fn(usize, usize) -> Option<u16>,
) -> Skeleton {
    let focal = FOCAL_PER_WIDTH * width as f32;
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let span = |lo: usize, hi: usize, f: f32| lo + ((hi - lo) as f32 * f).round() as usize;

    let joints = BODY_LAYOUT.map(|(fx, fy)| {
        let x = span(extent.min.0, extent.max.0, fx);
        let y = span(extent.min.1, extent.max.1, fy);
        let (z, confidence) = match body_depth(x, y) {
            Some(mm) => (f32::from(mm), JointConfidence::Medium),
            None => (extent.mean_depth(), JointConfidence::Low),
        };
        Joint {
            position_mm: Float3::new((x as f32 - cx) * z / focal, (y as f32 - cy) * z / focal, z),
            orientation: Quaternion::IDENTITY,
            confidence,
        }
    });
    Skeleton::new(joints)
}

impl TrackerApi for SoftwareApi {
    #[instrument(skip(self, calibration), fields(depth_mode = ?calibration.depth_mode))]
    fn tracker_create(
        &self,
        calibration: &Calibration,
        config: &TrackerConfiguration,
    ) -> Result<NativeHandle> {
        if !calibration.depth_mode.has_depth() {
            return Err(Error::InvalidArgument(format!(
                "depth mode {:?} produces no depth data",
                calibration.depth_mode
            )));
        }
        let queue = Arc::new(TrackingQueue::new(MAX_QUEUE_SIZE));
        let seg = Segmentation {
            max_depth_mm: self.config.body_max_depth_mm,
            min_pixels: self.config.body_min_pixels,
            resolution: calibration.depth_mode.resolution(),
        };
        let smoothing = Arc::new(Mutex::new(DEFAULT_SMOOTHING_FACTOR));
        let worker = spawn_worker(self.objects.clone(), queue.clone(), seg, smoothing.clone())?;
        let tracker = TrackerObject {
            depth_mode: calibration.depth_mode,
            queue,
            worker: Mutex::new(Some(worker)),
            temporal_smoothing: smoothing,
        };
        let handle = self.objects.insert(Object::Tracker(Arc::new(tracker)));
        info!(%handle, processing_mode = ?config.processing_mode, "tracker created");
        Ok(handle)
    }

    fn tracker_enqueue_capture(
        &self,
        tracker: NativeHandle,
        capture: NativeHandle,
        timeout: Timeout,
    ) -> WaitResult<()> {
        let Ok(tracker_obj) = self.objects.tracker(tracker) else {
            return WaitResult::Failed;
        };
        if let Err(err) = tracker_obj.validate_capture(&self.objects, capture) {
            warn!(%tracker, %capture, %err, "capture rejected");
            return WaitResult::Failed;
        }
        if !self.objects.add_ref(capture) {
            return WaitResult::Failed;
        }
        let result = tracker_obj.queue.enqueue(capture, timeout);
        if !result.is_succeeded() {
            self.objects.release(capture);
        }
        result
    }

    fn tracker_pop_result(
        &self,
        tracker: NativeHandle,
        timeout: Timeout,
    ) -> WaitResult<NativeHandle> {
        match self.objects.tracker(tracker) {
            Ok(tracker_obj) => tracker_obj.queue.pop(timeout),
            Err(_) => WaitResult::Failed,
        }
    }

    fn tracker_shutdown(&self, tracker: NativeHandle) {
        if let Ok(tracker_obj) = self.objects.tracker(tracker) {
            tracker_obj.queue.shutdown();
        }
    }

    fn tracker_set_temporal_smoothing(&self, tracker: NativeHandle, factor: f32) -> Result<()> {
        *self.objects.tracker(tracker)?.temporal_smoothing.lock() = factor;
        Ok(())
    }

    fn frame_get_device_timestamp(&self, frame: NativeHandle) -> Result<Microseconds> {
        Ok(self.objects.frame(frame)?.timestamp)
    }

    fn frame_get_num_bodies(&self, frame: NativeHandle) -> Result<usize> {
        Ok(self.objects.frame(frame)?.bodies.len())
    }

    fn frame_get_body_id(&self, frame: NativeHandle, index: usize) -> Result<BodyId> {
        Ok(self.objects.frame(frame)?.body(index)?.id)
    }

    fn frame_get_body_skeleton(&self, frame: NativeHandle, index: usize) -> Result<Skeleton> {
        Ok(self.objects.frame(frame)?.body(index)?.skeleton)
    }

    fn frame_get_capture(&self, frame: NativeHandle) -> Result<Option<NativeHandle>> {
        let capture = self.objects.frame(frame)?.capture;
        Ok(self.objects.add_ref(capture).then_some(capture))
    }

    fn frame_get_body_index_map(&self, frame: NativeHandle) -> Result<Option<NativeHandle>> {
        let map = self.objects.frame(frame)?.body_index_map;
        Ok(map.filter(|&m| self.objects.add_ref(m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{ObjectApi, SensorApi};
    use crate::tracking::JointType;
    use bytes::Bytes;

    fn seg(width: usize, height: usize) -> Segmentation {
        Segmentation {
            max_depth_mm: 1_000,
            min_pixels: 2,
            resolution: (width, height),
        }
    }

    fn depth_image(values: &[u16], width: usize) -> ImageObject {
        let info = ImageInfo {
            format: ImageFormat::Depth16,
            width,
            height: values.len() / width,
            stride: width * 2,
            size: values.len() * 2,
        };
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        ImageObject::with_data(info, data, Microseconds(42))
    }

    /// 8x8 frame with a 4 pixel wide column of 800 mm in the middle.
    fn column_depth() -> Vec<u16> {
        (0..64).map(|i| if (2..6).contains(&(i % 8)) { 800 } else { 0 }).collect()
    }

    #[test]
    fn test_segment_marks_near_pixels() {
        let image = depth_image(&[0, 500, 1_000, 1_001], 2);
        let segmented = segment(&image, seg(2, 2)).unwrap();
        assert_eq!(segmented.body_pixels, 2);
        assert_eq!(segmented.timestamp, Microseconds(42));
        assert_eq!(*segmented.map.data.lock(), vec![NOT_A_BODY, 0, 0, NOT_A_BODY]);
    }

    #[test]
    fn test_segment_rejects_foreign_layout() {
        let image = depth_image(&[500; 4], 2);
        assert!(matches!(segment(&image, seg(4, 4)), Err(Error::InvalidArgument(_))));

        let info = ImageInfo {
            format: ImageFormat::Custom8,
            width: 1,
            height: 1,
            stride: 1,
            size: 1,
        };
        let tiny = ImageObject::with_data(info, vec![7], Microseconds::ZERO);
        assert!(segment(&tiny, seg(1, 1)).is_err());
    }

    #[test]
    fn test_skeleton_spans_body_extent() {
        let image = depth_image(&column_depth(), 8);
        let skeleton = segment(&image, seg(8, 8)).unwrap().skeleton.unwrap();
        assert!(skeleton.iter().all(|(_, j)| j.confidence == JointConfidence::Medium));

        let pelvis = skeleton[JointType::Pelvis];
        assert_eq!(pelvis.position_mm.x, 0.0);
        assert_eq!(pelvis.position_mm.z, 800.0);
        let left = skeleton[JointType::WristLeft].position_mm.x;
        let right = skeleton[JointType::WristRight].position_mm.x;
        assert!(left > 0.0 && right < 0.0);
        let (head, foot) = (skeleton[JointType::Head], skeleton[JointType::FootLeft]);
        assert!(head.position_mm.y < foot.position_mm.y);
    }

    #[test]
    fn test_joint_on_background_is_predicted() {
        let mut depth = column_depth();
        // pelvis lands on (4, 4)
        depth[4 * 8 + 4] = 0;
        let image = depth_image(&depth, 8);
        let skeleton = segment(&image, seg(8, 8)).unwrap().skeleton.unwrap();
        let pelvis = skeleton[JointType::Pelvis];
        assert_eq!(pelvis.confidence, JointConfidence::Low);
        assert_eq!(pelvis.position_mm.z, 800.0);
        assert_eq!(skeleton[JointType::Neck].confidence, JointConfidence::Medium);
    }

    #[test]
    fn test_no_skeleton_without_body_pixels() {
        let image = depth_image(&[0; 4], 2);
        assert!(segment(&image, seg(2, 2)).unwrap().skeleton.is_none());
    }

    #[test]
    fn test_infer_survives_replaced_depth_image() {
        let api = SoftwareApi::shared_default();
        let capture = api.capture_create().unwrap();
        let image = api.image_create(ImageFormat::Custom8, 1, 1, 1).unwrap();
        api.capture_set_image(capture, ImageSlot::Depth, Some(image)).unwrap();
        api.release(image);

        let mut state = WorkerState {
            ids: BodyIds::new(),
            smoothing: Arc::new(Mutex::new(0.0)),
            smoothed_pixels: 0.0,
        };
        let frame = infer(&api.objects, capture, seg(320, 288), &mut state);
        assert!(frame.bodies.is_empty());
        assert!(frame.body_index_map.is_none());
        assert_eq!(frame.capture, capture);
        api.release(capture);
        assert_eq!(api.live_objects(), 0);
    }

    #[test]
    fn test_body_ids_stable_while_present() {
        let mut ids = BodyIds::new();
        assert_eq!(ids.observe(true), Some(BodyId(1)));
        assert_eq!(ids.observe(true), Some(BodyId(1)));
        assert_eq!(ids.observe(false), None);
        assert_eq!(ids.observe(true), Some(BodyId(2)));
    }

    #[test]
    fn test_smoothing_delays_presence() {
        let mut state = WorkerState {
            ids: BodyIds::new(),
            smoothing: Arc::new(Mutex::new(0.5)),
            smoothed_pixels: 0.0,
        };
        // 5.0, 7.5, 8.75
        assert_eq!(state.observe(10, 8), None);
        assert_eq!(state.observe(10, 8), None);
        assert_eq!(state.observe(10, 8), Some(BodyId(1)));
    }

    #[test]
    fn test_create_rejects_depthless_mode() {
        let api = SoftwareApi::shared_default();
        let calibration = Calibration::new(DepthMode::PassiveIr, Bytes::new());
        assert!(matches!(
            api.tracker_create(&calibration, &TrackerConfiguration::default()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_enqueue_rejects_capture_without_depth() {
        let api = SoftwareApi::shared_with_release_stats();
        let calibration = Calibration::new(DepthMode::Nfov2x2Binned, Bytes::new());
        let tracker = api.tracker_create(&calibration, &TrackerConfiguration::default()).unwrap();
        let capture = api.capture_create().unwrap();
        let enqueued = api.tracker_enqueue_capture(tracker, capture, Timeout::NO_WAIT);
        assert_eq!(enqueued, WaitResult::Failed);
        assert_eq!(api.stats().releases(capture), 0);
        api.release(capture);
        api.release(tracker);
        assert!(api.stats().is_freed(tracker));
    }
}
