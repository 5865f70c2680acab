//! The native SDK seam.
//!
//! Every wrapper in the crate reaches the native SDK only through
//! [`NativeApi`]. A backend implements the whole capability set once; it is
//! chosen when the [`crate::Sdk`] is built and never inspected at call sites.
//!
//! Conventions follow the C API the wrappers model:
//! - getters returning a handle add one native reference the caller must release
//! - setters taking a handle add their own reference, the caller keeps its one
//! - waits report [`WaitResult`], sequential reads report [`StreamResult`]

pub mod software;

use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::handle::NativeHandle;
use crate::record::{RecordConfiguration, SeekOrigin, TrackInfo, VideoSettings};
use crate::sensor::{Calibration, ImageFormat, ImageInfo, ImageSlot, ImuSample};
use crate::time::{Microseconds, Timeout};
use crate::tracking::{BodyId, Skeleton, TrackerConfiguration};

/// Outcome of a bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult<T> {
    Succeeded(T),
    Timeout,
    Failed,
}

impl<T> WaitResult<T> {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, WaitResult::Succeeded(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WaitResult<U> {
        match self {
            WaitResult::Succeeded(v) => WaitResult::Succeeded(f(v)),
            WaitResult::Timeout => WaitResult::Timeout,
            WaitResult::Failed => WaitResult::Failed,
        }
    }
}

/// Outcome of a sequential read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamResult<T> {
    Succeeded(T),
    Eof,
    Failed,
}

/// Native log verbosity, passed explicitly through [`SdkConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum LogLevel {
    Critical,
    Error,
    #[default]
    Warning,
    Information,
    Trace,
    Off,
}

/// Configuration handed to a backend at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkConfig {
    pub log_level: LogLevel,
    /// Pixels with depth in `(0, body_max_depth_mm]` count as body pixels
    /// for the in-process inference worker.
    pub body_max_depth_mm: u16,
    /// Minimum body pixel count for a frame to contain a body.
    pub body_min_pixels: usize,
    /// Keep per-handle release counts of the in-process backend. They grow
    /// with every handle ever released, so this is for tests and diagnostics.
    pub release_stats: bool,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warning,
            body_max_depth_mm: 2_500,
            body_min_pixels: 16,
            release_stats: false,
        }
    }
}

/// Reference counting shared by every native object kind.
pub trait ObjectApi {
    /// Add one reference. False if the handle does not name a live object of its kind.
    fn add_ref(&self, handle: NativeHandle) -> bool;

    /// Drop one reference; the object is freed when the last one goes.
    fn release(&self, handle: NativeHandle);
}

pub trait SensorApi {
    fn capture_create(&self) -> Result<NativeHandle>;

    fn capture_get_image(&self, capture: NativeHandle, slot: ImageSlot)
        -> Result<Option<NativeHandle>>;

    fn capture_set_image(
        &self,
        capture: NativeHandle,
        slot: ImageSlot,
        image: Option<NativeHandle>,
    ) -> Result<()>;

    fn capture_get_temperature_c(&self, capture: NativeHandle) -> Result<f32>;

    fn capture_set_temperature_c(&self, capture: NativeHandle, value: f32) -> Result<()>;

    fn image_create(
        &self,
        format: ImageFormat,
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<NativeHandle>;

    fn image_info(&self, image: NativeHandle) -> Result<ImageInfo>;

    /// Copy the image buffer into `dst`; returns the number of bytes copied.
    fn image_read(&self, image: NativeHandle, dst: &mut [u8]) -> Result<usize>;

    /// Overwrite the start of the image buffer with `src`.
    fn image_write(&self, image: NativeHandle, src: &[u8]) -> Result<()>;

    fn image_get_device_timestamp(&self, image: NativeHandle) -> Result<Microseconds>;

    fn image_set_device_timestamp(&self, image: NativeHandle, value: Microseconds) -> Result<()>;
}

pub trait TrackerApi {
    fn tracker_create(
        &self,
        calibration: &Calibration,
        config: &TrackerConfiguration,
    ) -> Result<NativeHandle>;

    fn tracker_enqueue_capture(
        &self,
        tracker: NativeHandle,
        capture: NativeHandle,
        timeout: Timeout,
    ) -> WaitResult<()>;

    /// On success the returned body frame carries one reference owned by the caller.
    fn tracker_pop_result(&self, tracker: NativeHandle, timeout: Timeout)
        -> WaitResult<NativeHandle>;

    fn tracker_shutdown(&self, tracker: NativeHandle);

    fn tracker_set_temporal_smoothing(&self, tracker: NativeHandle, factor: f32) -> Result<()>;

    fn frame_get_device_timestamp(&self, frame: NativeHandle) -> Result<Microseconds>;

    fn frame_get_num_bodies(&self, frame: NativeHandle) -> Result<usize>;

    fn frame_get_body_id(&self, frame: NativeHandle, index: usize) -> Result<BodyId>;

    fn frame_get_body_skeleton(&self, frame: NativeHandle, index: usize) -> Result<Skeleton>;

    fn frame_get_capture(&self, frame: NativeHandle) -> Result<Option<NativeHandle>>;

    fn frame_get_body_index_map(&self, frame: NativeHandle) -> Result<Option<NativeHandle>>;
}

pub trait RecordApi {
    fn record_create(&self, path: &Path, config: &RecordConfiguration) -> Result<NativeHandle>;

    fn record_add_tag(&self, record: NativeHandle, name: &str, value: &str) -> Result<()>;

    fn record_add_attachment(&self, record: NativeHandle, name: &str, data: &[u8]) -> Result<()>;

    fn record_add_custom_track(
        &self,
        record: NativeHandle,
        name: &str,
        codec_id: &str,
        codec_context: &[u8],
        settings: &VideoSettings,
    ) -> Result<()>;

    /// Declare the IMU track. Must precede the header.
    fn record_add_imu_track(&self, record: NativeHandle) -> Result<()>;

    fn record_write_header(&self, record: NativeHandle) -> Result<()>;

    /// Captures, IMU samples and the blocks of each custom track are each
    /// appended in non-decreasing timestamp order; an earlier timestamp fails.
    fn record_write_capture(&self, record: NativeHandle, capture: NativeHandle) -> Result<()>;

    fn record_write_custom_track_data(
        &self,
        record: NativeHandle,
        track: &str,
        timestamp: Microseconds,
        data: &[u8],
    ) -> Result<()>;

    fn record_write_imu_sample(&self, record: NativeHandle, sample: &ImuSample) -> Result<()>;

    fn record_flush(&self, record: NativeHandle) -> Result<()>;
}

pub trait PlaybackApi {
    fn playback_open(&self, path: &Path) -> Result<NativeHandle>;

    fn playback_get_record_configuration(&self, playback: NativeHandle)
        -> Result<RecordConfiguration>;

    fn playback_get_recording_length(&self, playback: NativeHandle) -> Result<Microseconds>;

    fn playback_get_calibration(&self, playback: NativeHandle) -> Result<Calibration>;

    fn playback_get_tag(&self, playback: NativeHandle, name: &str) -> Result<Option<String>>;

    fn playback_get_attachment(&self, playback: NativeHandle, name: &str)
        -> Result<Option<Bytes>>;

    fn playback_get_tracks(&self, playback: NativeHandle) -> Result<Vec<TrackInfo>>;

    /// Reposition the capture and IMU cursors. False if the container cannot
    /// satisfy the request.
    fn playback_seek_timestamp(
        &self,
        playback: NativeHandle,
        offset: Microseconds,
        origin: SeekOrigin,
    ) -> bool;

    fn playback_get_next_capture(&self, playback: NativeHandle) -> StreamResult<NativeHandle>;

    fn playback_get_previous_capture(&self, playback: NativeHandle)
        -> StreamResult<NativeHandle>;

    fn playback_get_next_imu_sample(&self, playback: NativeHandle) -> StreamResult<ImuSample>;

    fn playback_get_previous_imu_sample(&self, playback: NativeHandle)
        -> StreamResult<ImuSample>;

    /// Reposition one custom track cursor, independently of the capture cursor.
    fn playback_track_seek_timestamp(
        &self,
        playback: NativeHandle,
        track: &str,
        offset: Microseconds,
        origin: SeekOrigin,
    ) -> bool;

    fn playback_get_next_data_block(
        &self,
        playback: NativeHandle,
        track: &str,
    ) -> StreamResult<NativeHandle>;

    fn playback_get_previous_data_block(
        &self,
        playback: NativeHandle,
        track: &str,
    ) -> StreamResult<NativeHandle>;

    fn data_block_get_device_timestamp(&self, block: NativeHandle) -> Result<Microseconds>;

    fn data_block_get_buffer(&self, block: NativeHandle) -> Result<Bytes>;
}

/// Full capability set a backend provides.
pub trait NativeApi:
    ObjectApi + SensorApi + TrackerApi + RecordApi + PlaybackApi + Send + Sync
{
    fn name(&self) -> &'static str;
}
