//! Body tracker wrapper around the native asynchronous pipeline.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{Error, Result};
use crate::handle::RefHandle;
use crate::native::WaitResult;
use crate::resource::Disposable;
use crate::sensor::{Calibration, Capture, DepthMode, ImageFormat};
use crate::time::Timeout;
use crate::tracking::{BodyFrame, TrackerConfiguration};
use crate::Sdk;

/// Captures the pipeline holds at most, counting queued input and unpopped results.
pub const MAX_QUEUE_SIZE: usize = 3;

pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.0;

/// Feeds captures into the native tracking pipeline and pops body frames.
///
/// Enqueue and pop may run on different threads. A timed-out wait is not an
/// error: `try_enqueue_capture` returns `Ok(false)` and `try_pop_result`
/// returns `Ok(None)`.
pub struct Tracker {
    handle: RefHandle,
    depth_mode: DepthMode,
    // enqueues counted after the native call succeeds, pops reserved before
    // it, so the value never exceeds the native depth
    depth: CachePadded<AtomicI64>,
    shut_down: AtomicBool,
    temporal_smoothing: Mutex<f32>,
}

impl Tracker {
    #[instrument(skip(sdk, calibration, config), fields(depth_mode = ?calibration.depth_mode))]
    pub fn create(
        sdk: &Sdk,
        calibration: &Calibration,
        config: &TrackerConfiguration,
    ) -> Result<Self> {
        if !calibration.depth_mode.has_depth() {
            return Err(Error::InvalidArgument(format!(
                "calibration depth mode {:?} has no depth",
                calibration.depth_mode
            )));
        }
        if let Some(path) = config.model_path.as_deref() {
            if !path.is_ascii() || path.chars().any(char::is_control) {
                return Err(Error::InvalidArgument(format!(
                    "model path {path:?} contains unsupported characters"
                )));
            }
        }

        let value = sdk.api().tracker_create(calibration, config)?;
        let handle = RefHandle::new(sdk.api().clone(), value)?;
        info!(tracker = %handle, "body tracker ready");
        Ok(Self {
            handle,
            depth_mode: calibration.depth_mode,
            depth: CachePadded::new(AtomicI64::new(0)),
            shut_down: AtomicBool::new(false),
            temporal_smoothing: Mutex::new(DEFAULT_SMOOTHING_FACTOR),
        })
    }

    pub fn depth_mode(&self) -> DepthMode {
        self.depth_mode
    }

    /// Captures enqueued whose results have not been popped yet.
    pub fn queue_size(&self) -> usize {
        if self.is_disposed() {
            return 0;
        }
        // negative only while pops of an empty queue are in flight
        self.depth.load(Ordering::Acquire).max(0) as usize
    }

    pub fn is_queue_full(&self) -> bool {
        self.queue_size() >= MAX_QUEUE_SIZE
    }

    pub fn temporal_smoothing(&self) -> f32 {
        *self.temporal_smoothing.lock()
    }

    /// Smoothing of body presence across frames, from 0 (none) to 1.
    pub fn set_temporal_smoothing(&self, factor: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(Error::InvalidArgument(format!(
                "temporal smoothing {factor} outside [0, 1]"
            )));
        }
        let mut current = self.temporal_smoothing.lock();
        self.handle
            .api()
            .tracker_set_temporal_smoothing(self.handle.value_not_disposed()?, factor)?;
        *current = factor;
        Ok(())
    }

    /// Submit `capture`, waiting up to `timeout` for queue space.
    ///
    /// The pipeline takes its own reference; the caller keeps `capture`.
    pub fn try_enqueue_capture(&self, capture: &Capture, timeout: Timeout) -> Result<bool> {
        let tracker = self.handle.value_not_disposed()?;
        let value = capture.handle().value_not_disposed()?;
        match self.handle.api().tracker_enqueue_capture(tracker, value, timeout) {
            WaitResult::Succeeded(()) => {
                self.depth.fetch_add(1, Ordering::AcqRel);
                metrics::counter!("trackbridge_tracker_enqueued_total").increment(1);
                trace!(tracker = %self.handle, queue_size = self.queue_size(), "capture enqueued");
                Ok(true)
            }
            WaitResult::Timeout => Ok(false),
            WaitResult::Failed => {
                self.handle.check_not_disposed()?;
                if self.shut_down.load(Ordering::Acquire) {
                    return Err(Error::pipeline("tracker has been shut down"));
                }
                Err(self.diagnose(capture))
            }
        }
    }

    /// Blocking form of [`try_enqueue_capture`](Self::try_enqueue_capture).
    pub fn enqueue_capture(&self, capture: &Capture) -> Result<()> {
        match self.try_enqueue_capture(capture, Timeout::INFINITE)? {
            true => Ok(()),
            false => Err(Error::pipeline("infinite enqueue wait timed out")),
        }
    }

    /// Take the oldest result, waiting up to `timeout`.
    ///
    /// After [`shutdown`](Self::shutdown) the remaining results are still
    /// returned; once drained this fails with `EndOfStream`.
    pub fn try_pop_result(&self, timeout: Timeout) -> Result<Option<BodyFrame>> {
        let tracker = self.handle.value_not_disposed()?;
        let api = self.handle.api();
        self.depth.fetch_sub(1, Ordering::AcqRel);
        let result = api.tracker_pop_result(tracker, timeout);
        if !result.is_succeeded() {
            self.depth.fetch_add(1, Ordering::AcqRel);
        }
        match result {
            WaitResult::Succeeded(value) => {
                metrics::counter!("trackbridge_tracker_popped_total").increment(1);
                trace!(tracker = %self.handle, queue_size = self.queue_size(), "result popped");
                BodyFrame::from_native(api.clone(), value).map(Some)
            }
            WaitResult::Timeout => Ok(None),
            WaitResult::Failed => {
                self.handle.check_not_disposed()?;
                if self.shut_down.load(Ordering::Acquire) {
                    return Err(Error::EndOfStream);
                }
                Err(Error::pipeline("cannot pop a result from the tracking pipeline"))
            }
        }
    }

    /// Blocking form of [`try_pop_result`](Self::try_pop_result).
    pub fn pop_result(&self) -> Result<BodyFrame> {
        self.try_pop_result(Timeout::INFINITE)?
            .ok_or_else(|| Error::pipeline("infinite pop wait timed out"))
    }

    /// Stop accepting captures and wake every blocked caller.
    pub fn shutdown(&self) -> Result<()> {
        let value = self.handle.value_not_disposed()?;
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            debug!(tracker = %self.handle, "shutting down tracking pipeline");
        }
        self.handle.api().tracker_shutdown(value);
        Ok(())
    }

    /// Explain why the pipeline rejected `capture`.
    fn diagnose(&self, capture: &Capture) -> Error {
        let (width, height) = self.depth_mode.resolution();
        let checks = [
            ("depth", capture.depth_image(), ImageFormat::Depth16),
            ("IR", capture.ir_image(), ImageFormat::Ir16),
        ];
        for (what, image, expected) in checks {
            let image = match image {
                Ok(Some(image)) => image,
                Ok(None) => return Error::InvalidArgument(format!("capture has no {what} image")),
                Err(err) => return err,
            };
            let info = match image.info() {
                Ok(info) => info,
                Err(err) => return err,
            };
            image.dispose();
            if info.format != expected {
                return Error::InvalidArgument(format!(
                    "{what} image format is {:?}, expected {expected:?}",
                    info.format
                ));
            }
            if (info.width, info.height) != (width, height) {
                return Error::InvalidArgument(format!(
                    "{what} image is {}x{}, expected {width}x{height}",
                    info.width, info.height
                ));
            }
        }
        Error::pipeline("cannot add capture to the tracking pipeline")
    }

    /// Shut the pipeline down, then release the tracker.
    pub fn dispose(&self) {
        if !self.handle.is_disposed() {
            if let Err(err) = self.shutdown() {
                warn!(tracker = %self.handle, %err, "shutdown before release failed");
            }
        }
        if self.handle.dispose() {
            info!(tracker = %self.handle, "body tracker released");
        }
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

impl Drop for Tracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Disposable for Tracker {
    fn dispose(&self) {
        Tracker::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Tracker::is_disposed(self)
    }

    fn on_disposed(&self, callback: Box<dyn FnOnce() + Send>) {
        self.handle.on_disposed(callback);
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("handle", &self.handle)
            .field("queue_size", &self.queue_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::software::SoftwareApi;
    use crate::sensor::Image;
    use bytes::Bytes;

    const MODE: DepthMode = DepthMode::Nfov2x2Binned;

    fn tracker(sdk: &Sdk) -> Tracker {
        let calibration = Calibration::new(MODE, Bytes::new());
        Tracker::create(sdk, &calibration, &TrackerConfiguration::default()).unwrap()
    }

    fn capture(sdk: &Sdk, ts: i64) -> Capture {
        let (w, h) = MODE.resolution();
        let depth = Image::create(sdk, ImageFormat::Depth16, w, h, w * 2).unwrap();
        // 1000 mm everywhere
        depth.fill_from(&[0xE8, 0x03].repeat(w * h)).unwrap();
        depth.set_device_timestamp(crate::time::Microseconds(ts)).unwrap();
        let ir = Image::create(sdk, ImageFormat::Ir16, w, h, w * 2).unwrap();
        Capture::from_images(sdk, None, Some(&depth), Some(&ir)).unwrap()
    }

    #[test]
    fn test_zero_timeout_when_full() {
        let sdk = Sdk::new(SoftwareApi::shared_default());
        let tracker = tracker(&sdk);
        for i in 0..MAX_QUEUE_SIZE {
            let capture = capture(&sdk, i as i64);
            assert!(tracker.try_enqueue_capture(&capture, Timeout::INFINITE).unwrap());
        }
        assert!(tracker.is_queue_full());
        assert!(!tracker.try_enqueue_capture(&capture(&sdk, 9), Timeout::NO_WAIT).unwrap());
        assert_eq!(tracker.queue_size(), MAX_QUEUE_SIZE);
    }

    #[test]
    fn test_pop_empty_with_zero_timeout() {
        let sdk = Sdk::new(SoftwareApi::shared_default());
        let tracker = tracker(&sdk);
        assert!(tracker.try_pop_result(Timeout::NO_WAIT).unwrap().is_none());
    }

    #[test]
    fn test_results_in_order_with_body() {
        let sdk = Sdk::new(SoftwareApi::shared_default());
        let tracker = tracker(&sdk);
        for ts in [10, 20] {
            tracker.enqueue_capture(&capture(&sdk, ts)).unwrap();
        }
        let first = tracker.pop_result().unwrap();
        let second = tracker.pop_result().unwrap();
        assert_eq!(first.device_timestamp().unwrap().as_usec(), 10);
        assert_eq!(second.device_timestamp().unwrap().as_usec(), 20);
        assert_eq!(first.body_count().unwrap(), 1);
        assert_eq!(first.body_id(0).unwrap(), second.body_id(0).unwrap());
        assert!(first.body_id(1).is_err());
        assert_eq!(tracker.queue_size(), 0);
    }

    #[test]
    fn test_shutdown_drains_then_end_of_stream() {
        let sdk = Sdk::new(SoftwareApi::shared_default());
        let tracker = tracker(&sdk);
        tracker.enqueue_capture(&capture(&sdk, 1)).unwrap();
        tracker.shutdown().unwrap();

        let err = tracker.try_enqueue_capture(&capture(&sdk, 2), Timeout::INFINITE).unwrap_err();
        assert!(matches!(err, Error::PipelineFailed(_)));
        assert!(tracker.pop_result().is_ok());
        assert_eq!(tracker.pop_result().unwrap_err(), Error::EndOfStream);
    }

    #[test]
    fn test_rejects_capture_without_ir() {
        let sdk = Sdk::new(SoftwareApi::shared_default());
        let tracker = tracker(&sdk);
        let (w, h) = MODE.resolution();
        let depth = Image::create(&sdk, ImageFormat::Depth16, w, h, w * 2).unwrap();
        let capture = Capture::from_images(&sdk, None, Some(&depth), None).unwrap();
        let err = tracker.try_enqueue_capture(&capture, Timeout::NO_WAIT).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(tracker.queue_size(), 0);
    }

    #[test]
    fn test_temporal_smoothing_range() {
        let sdk = Sdk::new(SoftwareApi::shared_default());
        let tracker = tracker(&sdk);
        assert_eq!(tracker.temporal_smoothing(), DEFAULT_SMOOTHING_FACTOR);
        tracker.set_temporal_smoothing(0.5).unwrap();
        assert_eq!(tracker.temporal_smoothing(), 0.5);
        assert!(tracker.set_temporal_smoothing(1.5).is_err());
        assert_eq!(tracker.temporal_smoothing(), 0.5);
    }

    #[test]
    fn test_queue_size_bounded_under_concurrent_use() {
        let sdk = Sdk::new(SoftwareApi::shared_default());
        let tracker = tracker(&sdk);
        let captures: Vec<Capture> = (0..40).map(|ts| capture(&sdk, ts)).collect();
        let total = captures.len();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    assert!(tracker.queue_size() <= MAX_QUEUE_SIZE);
                }
            });
            let popper = s.spawn(|| {
                let mut popped = 0;
                while popped < total {
                    if tracker.try_pop_result(Timeout::from_millis(5)).unwrap().is_some() {
                        popped += 1;
                    }
                    assert!(tracker.queue_size() <= MAX_QUEUE_SIZE);
                }
                popped
            });
            for capture in &captures {
                tracker.enqueue_capture(capture).unwrap();
                assert!(tracker.queue_size() <= MAX_QUEUE_SIZE);
            }
            assert_eq!(popper.join().unwrap(), total);
            done.store(true, Ordering::Release);
        });
        assert_eq!(tracker.queue_size(), 0);
    }

    #[test]
    fn test_dispose_releases_queued_work() {
        let api = SoftwareApi::shared_default();
        let sdk = Sdk::new(api.clone());
        let tracker = tracker(&sdk);
        tracker.enqueue_capture(&capture(&sdk, 1)).unwrap();
        tracker.enqueue_capture(&capture(&sdk, 2)).unwrap();
        tracker.dispose();
        assert_eq!(tracker.queue_size(), 0);
        assert!(matches!(tracker.try_pop_result(Timeout::NO_WAIT), Err(Error::ObjectDisposed(_))));
        assert_eq!(api.live_objects(), 0);
    }
}
