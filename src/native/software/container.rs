//! In-memory recording container of the in-process backend.
//!
//! Recorders stage everything in memory and publish an immutable snapshot to
//! the backend's [`RecordingStore`] on flush and when the last reference is
//! released. Writes are append-only: each stream (captures, IMU samples and
//! every custom track) refuses a timestamp earlier than its last one, so a
//! snapshot is sorted as written. Playbacks open the latest snapshot stored
//! under a path; each playback has a capture cursor, an IMU cursor that
//! follows capture seeks, and one cursor per custom track.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use super::objects::{slot_index, CaptureObject, DataBlockObject, ImageObject, Object, ObjectTable};
use super::SoftwareApi;
use crate::error::{Error, Result};
use crate::handle::NativeHandle;
use crate::native::{PlaybackApi, RecordApi, StreamResult};
use crate::record::cursor::{bounds, PlaybackCursor, Timestamped};
use crate::record::{
    RecordConfiguration, SeekOrigin, TrackInfo, VideoSettings, COLOR_TRACK, DEPTH_TRACK, IMU_TRACK,
    IR_TRACK,
};
use crate::sensor::{Calibration, ImageInfo, ImageSlot, ImuSample};
use crate::time::Microseconds;

/// Codec id reported for the built-in video tracks.
const BUILT_IN_CODEC_ID: &str = "V_MS/VFW/FOURCC";
const IMU_CODEC_ID: &str = "S_K4A/IMU";

const SLOTS: [ImageSlot; 3] = [ImageSlot::Color, ImageSlot::Depth, ImageSlot::Ir];

#[derive(Clone)]
struct StoredImage {
    slot: ImageSlot,
    info: ImageInfo,
    timestamp: Microseconds,
    data: Bytes,
}

#[derive(Clone)]
struct StoredCapture {
    timestamp: Microseconds,
    temperature_c: f32,
    images: Vec<StoredImage>,
}

impl Timestamped for StoredCapture {
    fn timestamp(&self) -> Microseconds {
        self.timestamp
    }
}

#[derive(Clone)]
struct StoredBlock {
    timestamp: Microseconds,
    data: Bytes,
}

impl Timestamped for StoredBlock {
    fn timestamp(&self) -> Microseconds {
        self.timestamp
    }
}

impl Timestamped for ImuSample {
    fn timestamp(&self) -> Microseconds {
        self.acc_timestamp
    }
}

#[derive(Clone)]
struct StoredTrack {
    info: TrackInfo,
    blocks: Vec<StoredBlock>,
}

/// Immutable snapshot of a finished (or flushed) recording.
pub(crate) struct StoredRecording {
    config: RecordConfiguration,
    tags: Vec<(String, String)>,
    attachments: Vec<(String, Bytes)>,
    tracks: Vec<StoredTrack>,
    captures: Vec<StoredCapture>,
    imu: Vec<ImuSample>,
    start: Microseconds,
    end: Microseconds,
}

impl StoredRecording {
    fn track(&self, name: &str) -> Option<&StoredTrack> {
        self.tracks.iter().find(|t| t.info.name == name)
    }

    fn built_in_tracks(&self) -> Vec<TrackInfo> {
        self.config
            .built_in_tracks()
            .into_iter()
            .map(|name| {
                let slot = match name {
                    COLOR_TRACK => ImageSlot::Color,
                    DEPTH_TRACK => ImageSlot::Depth,
                    IR_TRACK => ImageSlot::Ir,
                    _ => {
                        return TrackInfo {
                            name: name.to_string(),
                            is_built_in: true,
                            codec_id: IMU_CODEC_ID.to_string(),
                            codec_context: Bytes::new(),
                            video_settings: None,
                        }
                    }
                };
                let (width, height) = self
                    .captures
                    .iter()
                    .flat_map(|c| c.images.iter())
                    .find(|i| i.slot == slot)
                    .map(|i| (i.info.width, i.info.height))
                    .unwrap_or_else(|| match slot {
                        ImageSlot::Color => (0, 0),
                        _ => self.config.depth_mode.resolution(),
                    });
                TrackInfo {
                    name: name.to_string(),
                    is_built_in: true,
                    codec_id: BUILT_IN_CODEC_ID.to_string(),
                    codec_context: Bytes::new(),
                    video_settings: Some(VideoSettings {
                        width: width as u64,
                        height: height as u64,
                        frame_rate: u64::from(self.config.camera_fps),
                    }),
                }
            })
            .collect()
    }
}

/// Recordings published by recorders of one backend instance, keyed by path.
#[derive(Default)]
pub(crate) struct RecordingStore {
    recordings: Mutex<HashMap<PathBuf, Arc<StoredRecording>>>,
}

impl RecordingStore {
    fn publish(&self, path: &Path, recording: StoredRecording) {
        self.recordings.lock().insert(path.to_path_buf(), Arc::new(recording));
    }

    fn open(&self, path: &Path) -> Option<Arc<StoredRecording>> {
        self.recordings.lock().get(path).cloned()
    }
}

struct RecordState {
    config: RecordConfiguration,
    header_written: bool,
    tags: Vec<(String, String)>,
    attachments: Vec<(String, Bytes)>,
    tracks: Vec<StoredTrack>,
    captures: Vec<StoredCapture>,
    imu: Vec<ImuSample>,
}

pub(crate) struct RecordObject {
    path: PathBuf,
    store: Arc<RecordingStore>,
    state: Mutex<RecordState>,
}

impl RecordObject {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::recording(self.path.display().to_string(), message)
    }

    fn before_header(&self) -> Result<parking_lot::MutexGuard<'_, RecordState>> {
        let state = self.state.lock();
        if state.header_written {
            return Err(self.error("the header has already been written"));
        }
        Ok(state)
    }

    fn after_header(&self) -> Result<parking_lot::MutexGuard<'_, RecordState>> {
        let state = self.state.lock();
        if !state.header_written {
            return Err(self.error("the header has not been written yet"));
        }
        Ok(state)
    }

    /// Publish the current contents. Does nothing before the header exists.
    fn publish(&self) -> bool {
        let state = self.state.lock();
        if !state.header_written {
            return false;
        }

        let (start, end) = [span(&state.captures), span(&state.imu)]
            .into_iter()
            .chain(state.tracks.iter().map(|t| span(&t.blocks)))
            .flatten()
            .reduce(|(s1, e1), (s2, e2)| (s1.min(s2), e1.max(e2)))
            .unwrap_or((Microseconds::ZERO, Microseconds::ZERO));

        let mut config = state.config.clone();
        config.start_time_offset = start;

        self.store.publish(
            &self.path,
            StoredRecording {
                config,
                tags: state.tags.clone(),
                attachments: state.attachments.clone(),
                tracks: state.tracks.clone(),
                captures: state.captures.clone(),
                imu: state.imu.clone(),
                start,
                end,
            },
        );
        true
    }

    /// Fails when `timestamp` is earlier than the last item of `stream`.
    fn check_append<T: Timestamped>(
        &self,
        what: &str,
        stream: &[T],
        timestamp: Microseconds,
    ) -> Result<()> {
        match stream.last() {
            Some(last) if timestamp < last.timestamp() => Err(self.error(format!(
                "{what} at {timestamp} is earlier than the previous one at {}",
                last.timestamp()
            ))),
            _ => Ok(()),
        }
    }

    pub fn close(&self) {
        if self.publish() {
            info!(path = %self.path.display(), "recording closed");
        } else {
            debug!(path = %self.path.display(), "recording closed without a header");
        }
    }
}

pub(crate) struct PlaybackObject {
    recording: Arc<StoredRecording>,
    cursor: Mutex<PlaybackCursor>,
    imu_cursor: Mutex<PlaybackCursor>,
    track_cursors: Mutex<HashMap<String, PlaybackCursor>>,
}

impl PlaybackObject {
    fn imu_sample(&self, forward: bool) -> StreamResult<ImuSample> {
        let samples = &self.recording.imu;
        let mut cursor = self.imu_cursor.lock();
        let index = if forward {
            cursor.next(samples.len())
        } else {
            cursor.previous(samples.len())
        };
        match index {
            Some(i) => StreamResult::Succeeded(samples[i]),
            None => StreamResult::Eof,
        }
    }

    fn next_block(&self, track: &str, forward: bool) -> Option<StreamResult<Arc<DataBlockObject>>> {
        let stored = self.recording.track(track)?;
        let mut cursors = self.track_cursors.lock();
        let cursor = cursors.entry(track.to_string()).or_default();
        let index = if forward {
            cursor.next(stored.blocks.len())
        } else {
            cursor.previous(stored.blocks.len())
        };
        Some(match index {
            Some(i) => {
                let block = &stored.blocks[i];
                StreamResult::Succeeded(Arc::new(DataBlockObject {
                    timestamp: block.timestamp,
                    data: block.data.clone(),
                }))
            }
            None => StreamResult::Eof,
        })
    }
}

fn span<T: Timestamped>(items: &[T]) -> Option<(Microseconds, Microseconds)> {
    (!items.is_empty()).then(|| bounds(items))
}

/// Build live capture and image objects from a stored capture.
fn materialize(objects: &ObjectTable, stored: &StoredCapture) -> NativeHandle {
    let capture = CaptureObject::default();
    *capture.temperature_c.lock() = stored.temperature_c;
    {
        let mut images = capture.images.lock();
        for image in &stored.images {
            let object = ImageObject::with_data(image.info, image.data.to_vec(), image.timestamp);
            images[slot_index(image.slot)] = Some(objects.insert(Object::Image(Arc::new(object))));
        }
    }
    objects.insert(Object::Capture(Arc::new(capture)))
}

impl RecordApi for SoftwareApi {
    #[instrument(skip(self, config))]
    fn record_create(&self, path: &Path, config: &RecordConfiguration) -> Result<NativeHandle> {
        if config.camera_fps == 0 {
            return Err(Error::InvalidArgument("camera fps must be positive".into()));
        }
        if config.built_in_tracks().is_empty() {
            return Err(Error::InvalidArgument("recording has no enabled tracks".into()));
        }
        let record = RecordObject {
            path: path.to_path_buf(),
            store: self.store.clone(),
            state: Mutex::new(RecordState {
                config: config.clone(),
                header_written: false,
                tags: Vec::new(),
                attachments: Vec::new(),
                tracks: Vec::new(),
                captures: Vec::new(),
                imu: Vec::new(),
            }),
        };
        let handle = self.objects.insert(Object::Record(Arc::new(record)));
        info!(%handle, "recorder created");
        Ok(handle)
    }

    fn record_add_tag(&self, record: NativeHandle, name: &str, value: &str) -> Result<()> {
        let record = self.objects.record(record)?;
        let mut state = record.before_header()?;
        state.tags.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn record_add_attachment(&self, record: NativeHandle, name: &str, data: &[u8]) -> Result<()> {
        let record = self.objects.record(record)?;
        let mut state = record.before_header()?;
        if state.attachments.iter().any(|(n, _)| n == name) {
            return Err(Error::InvalidArgument(format!("attachment {name:?} already exists")));
        }
        state.attachments.push((name.to_string(), Bytes::copy_from_slice(data)));
        Ok(())
    }

    fn record_add_custom_track(
        &self,
        record: NativeHandle,
        name: &str,
        codec_id: &str,
        codec_context: &[u8],
        settings: &VideoSettings,
    ) -> Result<()> {
        let record = self.objects.record(record)?;
        let mut state = record.before_header()?;
        if name.is_empty() || codec_id.is_empty() {
            return Err(Error::InvalidArgument("track name and codec id must not be empty".into()));
        }
        let built_in = [COLOR_TRACK, DEPTH_TRACK, IR_TRACK, IMU_TRACK].contains(&name);
        if built_in || state.tracks.iter().any(|t| t.info.name == name) {
            return Err(Error::InvalidArgument(format!("track {name:?} already exists")));
        }
        state.tracks.push(StoredTrack {
            info: TrackInfo {
                name: name.to_string(),
                is_built_in: false,
                codec_id: codec_id.to_string(),
                codec_context: Bytes::copy_from_slice(codec_context),
                video_settings: Some(*settings),
            },
            blocks: Vec::new(),
        });
        Ok(())
    }

    fn record_add_imu_track(&self, record: NativeHandle) -> Result<()> {
        let record = self.objects.record(record)?;
        let mut state = record.before_header()?;
        if state.config.imu_track_enabled {
            return Err(Error::InvalidArgument("IMU track already added".into()));
        }
        state.config.imu_track_enabled = true;
        Ok(())
    }

    fn record_write_header(&self, record: NativeHandle) -> Result<()> {
        let record = self.objects.record(record)?;
        let mut state = record.before_header()?;
        state.header_written = true;
        debug!(path = %record.path.display(), tracks = state.tracks.len(), "header written");
        Ok(())
    }

    fn record_write_capture(&self, record: NativeHandle, capture: NativeHandle) -> Result<()> {
        let record = self.objects.record(record)?;
        let capture_obj = self.objects.capture(capture)?;

        let mut images = Vec::with_capacity(SLOTS.len());
        for slot in SLOTS {
            let Some(image) = self.objects.capture_image(&capture_obj, slot) else {
                continue;
            };
            let stored = self.objects.image(image).map(|obj| StoredImage {
                slot,
                info: obj.info,
                timestamp: obj.timestamp(),
                data: obj.snapshot(),
            });
            self.objects.release(image);
            images.push(stored?);
        }
        // depth, then IR, then color decides the capture timestamp
        let timestamp = [ImageSlot::Depth, ImageSlot::Ir, ImageSlot::Color]
            .into_iter()
            .find_map(|slot| images.iter().find(|i| i.slot == slot))
            .map(|i| i.timestamp)
            .ok_or_else(|| Error::InvalidArgument("capture contains no images".into()))?;

        let mut state = record.after_header()?;
        for image in &images {
            let enabled = match image.slot {
                ImageSlot::Color => state.config.color_track_enabled,
                ImageSlot::Depth => state.config.depth_track_enabled(),
                ImageSlot::Ir => state.config.ir_track_enabled(),
            };
            if !enabled {
                return Err(record.error(format!("{:?} track is not enabled", image.slot)));
            }
        }
        record.check_append("capture", &state.captures, timestamp)?;
        state.captures.push(StoredCapture {
            timestamp,
            temperature_c: *capture_obj.temperature_c.lock(),
            images,
        });
        Ok(())
    }

    fn record_write_custom_track_data(
        &self,
        record: NativeHandle,
        track: &str,
        timestamp: Microseconds,
        data: &[u8],
    ) -> Result<()> {
        let record = self.objects.record(record)?;
        let mut state = record.after_header()?;
        let Some(stored) = state.tracks.iter_mut().find(|t| t.info.name == track) else {
            return Err(Error::InvalidArgument(format!("no custom track named {track:?}")));
        };
        record.check_append(track, &stored.blocks, timestamp)?;
        stored.blocks.push(StoredBlock {
            timestamp,
            data: Bytes::copy_from_slice(data),
        });
        Ok(())
    }

    fn record_write_imu_sample(&self, record: NativeHandle, sample: &ImuSample) -> Result<()> {
        let record = self.objects.record(record)?;
        let mut state = record.after_header()?;
        if !state.config.imu_track_enabled {
            return Err(record.error("IMU track is not enabled"));
        }
        record.check_append("IMU sample", &state.imu, sample.acc_timestamp)?;
        state.imu.push(*sample);
        Ok(())
    }

    fn record_flush(&self, record: NativeHandle) -> Result<()> {
        let record = self.objects.record(record)?;
        if !record.publish() {
            return Err(record.error("cannot flush before the header is written"));
        }
        Ok(())
    }
}

impl PlaybackApi for SoftwareApi {
    #[instrument(skip(self))]
    fn playback_open(&self, path: &Path) -> Result<NativeHandle> {
        let Some(recording) = self.store.open(path) else {
            return Err(Error::recording(path.display().to_string(), "no such recording"));
        };
        let playback = PlaybackObject {
            recording,
            cursor: Mutex::new(PlaybackCursor::new()),
            imu_cursor: Mutex::new(PlaybackCursor::new()),
            track_cursors: Mutex::new(HashMap::new()),
        };
        let handle = self.objects.insert(Object::Playback(Arc::new(playback)));
        info!(%handle, "playback opened");
        Ok(handle)
    }

    fn playback_get_record_configuration(
        &self,
        playback: NativeHandle,
    ) -> Result<RecordConfiguration> {
        Ok(self.objects.playback(playback)?.recording.config.clone())
    }

    fn playback_get_recording_length(&self, playback: NativeHandle) -> Result<Microseconds> {
        let recording = &self.objects.playback(playback)?.recording;
        Ok(recording.end.saturating_sub(recording.start))
    }

    fn playback_get_calibration(&self, playback: NativeHandle) -> Result<Calibration> {
        let playback = self.objects.playback(playback)?;
        Ok(Calibration::new(playback.recording.config.depth_mode, Bytes::new()))
    }

    fn playback_get_tag(&self, playback: NativeHandle, name: &str) -> Result<Option<String>> {
        let playback = self.objects.playback(playback)?;
        Ok(playback
            .recording
            .tags
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone()))
    }

    fn playback_get_attachment(&self, playback: NativeHandle, name: &str) -> Result<Option<Bytes>> {
        let playback = self.objects.playback(playback)?;
        Ok(playback
            .recording
            .attachments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone()))
    }

    fn playback_get_tracks(&self, playback: NativeHandle) -> Result<Vec<TrackInfo>> {
        let recording = &self.objects.playback(playback)?.recording;
        let mut tracks = recording.built_in_tracks();
        tracks.extend(recording.tracks.iter().map(|t| t.info.clone()));
        Ok(tracks)
    }

    fn playback_seek_timestamp(
        &self,
        playback: NativeHandle,
        offset: Microseconds,
        origin: SeekOrigin,
    ) -> bool {
        let Ok(playback) = self.objects.playback(playback) else {
            return false;
        };
        let recording = &playback.recording;
        let (start, end) = (recording.start, recording.end);
        if !playback.cursor.lock().seek(&recording.captures, start, end, offset, origin) {
            return false;
        }
        let seeked = playback.imu_cursor.lock().seek(&recording.imu, start, end, offset, origin);
        seeked
    }

    fn playback_get_next_capture(&self, playback: NativeHandle) -> StreamResult<NativeHandle> {
        let Ok(playback) = self.objects.playback(playback) else {
            return StreamResult::Failed;
        };
        let captures = &playback.recording.captures;
        let result = match playback.cursor.lock().next(captures.len()) {
            Some(i) => StreamResult::Succeeded(materialize(&self.objects, &captures[i])),
            None => StreamResult::Eof,
        };
        result
    }

    fn playback_get_previous_capture(&self, playback: NativeHandle) -> StreamResult<NativeHandle> {
        let Ok(playback) = self.objects.playback(playback) else {
            return StreamResult::Failed;
        };
        let captures = &playback.recording.captures;
        let result = match playback.cursor.lock().previous(captures.len()) {
            Some(i) => StreamResult::Succeeded(materialize(&self.objects, &captures[i])),
            None => StreamResult::Eof,
        };
        result
    }

    fn playback_get_next_imu_sample(&self, playback: NativeHandle) -> StreamResult<ImuSample> {
        match self.objects.playback(playback) {
            Ok(playback) => playback.imu_sample(true),
            Err(_) => StreamResult::Failed,
        }
    }

    fn playback_get_previous_imu_sample(&self, playback: NativeHandle) -> StreamResult<ImuSample> {
        match self.objects.playback(playback) {
            Ok(playback) => playback.imu_sample(false),
            Err(_) => StreamResult::Failed,
        }
    }

    fn playback_track_seek_timestamp(
        &self,
        playback: NativeHandle,
        track: &str,
        offset: Microseconds,
        origin: SeekOrigin,
    ) -> bool {
        let Ok(playback) = self.objects.playback(playback) else {
            return false;
        };
        let recording = &playback.recording;
        let Some(stored) = recording.track(track) else {
            return false;
        };
        let mut cursors = playback.track_cursors.lock();
        cursors
            .entry(track.to_string())
            .or_default()
            .seek(&stored.blocks, recording.start, recording.end, offset, origin)
    }

    fn playback_get_next_data_block(
        &self,
        playback: NativeHandle,
        track: &str,
    ) -> StreamResult<NativeHandle> {
        self.data_block(playback, track, true)
    }

    fn playback_get_previous_data_block(
        &self,
        playback: NativeHandle,
        track: &str,
    ) -> StreamResult<NativeHandle> {
        self.data_block(playback, track, false)
    }

    fn data_block_get_device_timestamp(&self, block: NativeHandle) -> Result<Microseconds> {
        Ok(self.objects.data_block(block)?.timestamp)
    }

    fn data_block_get_buffer(&self, block: NativeHandle) -> Result<Bytes> {
        Ok(self.objects.data_block(block)?.data.clone())
    }
}

impl SoftwareApi {
    fn data_block(
        &self,
        playback: NativeHandle,
        track: &str,
        forward: bool,
    ) -> StreamResult<NativeHandle> {
        let Ok(playback) = self.objects.playback(playback) else {
            return StreamResult::Failed;
        };
        match playback.next_block(track, forward) {
            Some(StreamResult::Succeeded(block)) => {
                StreamResult::Succeeded(self.objects.insert(Object::DataBlock(block)))
            }
            Some(StreamResult::Eof) => StreamResult::Eof,
            Some(StreamResult::Failed) | None => StreamResult::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{ObjectApi, SensorApi};
    use crate::sensor::{DepthMode, ImageFormat};

    fn depth_capture(api: &SoftwareApi, ts: i64) -> NativeHandle {
        let (w, h) = DepthMode::Nfov2x2Binned.resolution();
        let capture = api.capture_create().unwrap();
        let image = api.image_create(ImageFormat::Depth16, w, h, w * 2).unwrap();
        api.image_set_device_timestamp(image, Microseconds(ts)).unwrap();
        api.capture_set_image(capture, ImageSlot::Depth, Some(image)).unwrap();
        api.release(image);
        capture
    }

    fn record(api: &SoftwareApi, path: &Path, stamps: &[i64]) {
        let config = RecordConfiguration::new(DepthMode::Nfov2x2Binned, None, 30);
        let rec = api.record_create(path, &config).unwrap();
        api.record_write_header(rec).unwrap();
        for &ts in stamps {
            let capture = depth_capture(api, ts);
            api.record_write_capture(rec, capture).unwrap();
            api.release(capture);
        }
        api.release(rec);
    }

    #[test]
    fn test_write_before_header_fails() {
        let api = SoftwareApi::new(Default::default());
        let config = RecordConfiguration::new(DepthMode::Nfov2x2Binned, None, 30);
        let rec = api.record_create(Path::new("a.mkv"), &config).unwrap();
        let capture = depth_capture(&api, 0);
        assert!(matches!(api.record_write_capture(rec, capture), Err(Error::Recording { .. })));
        assert!(matches!(api.record_flush(rec), Err(Error::Recording { .. })));
        api.record_write_header(rec).unwrap();
        assert!(matches!(
            api.record_add_tag(rec, "k", "v"),
            Err(Error::Recording { .. })
        ));
        api.release(capture);
        api.release(rec);
    }

    fn depth_stamps(api: &SoftwareApi, pb: NativeHandle) -> Vec<i64> {
        let mut stamps = Vec::new();
        while let StreamResult::Succeeded(capture) = api.playback_get_next_capture(pb) {
            let image = api.capture_get_image(capture, ImageSlot::Depth).unwrap().unwrap();
            stamps.push(api.image_get_device_timestamp(image).unwrap().as_usec());
            api.release(image);
            api.release(capture);
        }
        stamps
    }

    fn imu(ts: i64) -> ImuSample {
        ImuSample {
            temperature_c: 31.0,
            acc_timestamp: Microseconds(ts),
            gyro_timestamp: Microseconds(ts + 5),
            ..ImuSample::default()
        }
    }

    #[test]
    fn test_capture_written_out_of_order_is_rejected() {
        let api = SoftwareApi::new(Default::default());
        let path = Path::new("ordered.mkv");
        let config = RecordConfiguration::new(DepthMode::Nfov2x2Binned, None, 30);
        let rec = api.record_create(path, &config).unwrap();
        api.record_write_header(rec).unwrap();
        for (ts, accepted) in [(100, true), (300, true), (200, false), (300, true)] {
            let capture = depth_capture(&api, ts);
            assert_eq!(api.record_write_capture(rec, capture).is_ok(), accepted, "ts {ts}");
            api.release(capture);
        }
        api.release(rec);

        let pb = api.playback_open(path).unwrap();
        assert_eq!(api.playback_get_recording_length(pb).unwrap(), Microseconds(201));
        assert_eq!(
            api.playback_get_record_configuration(pb).unwrap().start_time_offset,
            Microseconds(100)
        );
        assert_eq!(depth_stamps(&api, pb), vec![100, 300, 300]);
        api.release(pb);
    }

    #[test]
    fn test_track_block_written_out_of_order_is_rejected() {
        let api = SoftwareApi::new(Default::default());
        let config = RecordConfiguration::new(DepthMode::Nfov2x2Binned, None, 30);
        let rec = api.record_create(Path::new("blocks.mkv"), &config).unwrap();
        let settings = VideoSettings::default();
        api.record_add_custom_track(rec, "A", "S_A", &[], &settings).unwrap();
        api.record_add_custom_track(rec, "B", "S_B", &[], &settings).unwrap();
        api.record_write_header(rec).unwrap();

        api.record_write_custom_track_data(rec, "A", Microseconds(50), b"a").unwrap();
        let err = api.record_write_custom_track_data(rec, "A", Microseconds(40), b"a");
        assert!(matches!(err, Err(Error::Recording { .. })));
        // each track keeps its own order
        api.record_write_custom_track_data(rec, "B", Microseconds(10), b"b").unwrap();
        api.release(rec);
    }

    #[test]
    fn test_imu_track_round_trip() {
        let api = SoftwareApi::new(Default::default());
        let path = Path::new("imu.mkv");
        let config = RecordConfiguration::new(DepthMode::Nfov2x2Binned, None, 30);
        let rec = api.record_create(path, &config).unwrap();
        api.record_add_imu_track(rec).unwrap();
        assert!(api.record_add_imu_track(rec).is_err());
        assert!(api.record_write_imu_sample(rec, &imu(0)).is_err());
        api.record_write_header(rec).unwrap();
        assert!(api.record_add_imu_track(rec).is_err());

        for ts in [1_000, 2_000, 3_000] {
            api.record_write_imu_sample(rec, &imu(ts)).unwrap();
        }
        assert!(api.record_write_imu_sample(rec, &imu(2_500)).is_err());
        api.release(rec);

        let pb = api.playback_open(path).unwrap();
        let config = api.playback_get_record_configuration(pb).unwrap();
        assert!(config.imu_track_enabled);
        assert_eq!(config.start_time_offset, Microseconds(1_000));
        let tracks = api.playback_get_tracks(pb).unwrap();
        let imu_track = tracks.iter().find(|t| t.name == IMU_TRACK).unwrap();
        assert!(imu_track.is_built_in);
        assert_eq!(imu_track.video_settings, None);

        let next = |api: &SoftwareApi| match api.playback_get_next_imu_sample(pb) {
            StreamResult::Succeeded(sample) => Some(sample.acc_timestamp.as_usec()),
            _ => None,
        };
        assert_eq!(next(&api), Some(1_000));
        assert_eq!(next(&api), Some(2_000));

        // a capture seek moves the IMU cursor too
        assert!(api.playback_seek_timestamp(pb, Microseconds(1_500), SeekOrigin::Begin));
        assert_eq!(next(&api), Some(3_000));
        assert_eq!(next(&api), None);
        match api.playback_get_previous_imu_sample(pb) {
            StreamResult::Succeeded(sample) => assert_eq!(sample, imu(3_000)),
            _ => panic!("expected the last IMU sample"),
        }
        api.release(pb);
    }

    #[test]
    fn test_recording_without_imu_has_no_samples() {
        let api = SoftwareApi::new(Default::default());
        let path = Path::new("no-imu.mkv");
        record(&api, path, &[10, 20]);
        let pb = api.playback_open(path).unwrap();
        assert_eq!(api.playback_get_next_imu_sample(pb), StreamResult::Eof);
        assert_eq!(depth_stamps(&api, pb), vec![10, 20]);
        api.release(pb);
    }

    #[test]
    fn test_open_unknown_path() {
        let api = SoftwareApi::new(Default::default());
        let opened = api.playback_open(Path::new("missing.mkv"));
        assert!(matches!(opened, Err(Error::Recording { .. })));
    }

    #[test]
    fn test_duplicate_custom_track_rejected() {
        let api = SoftwareApi::new(Default::default());
        let config = RecordConfiguration::new(DepthMode::Nfov2x2Binned, None, 30);
        let rec = api.record_create(Path::new("t.mkv"), &config).unwrap();
        let settings = VideoSettings::default();
        api.record_add_custom_track(rec, "ACCEL", "S_ACCEL", &[], &settings).unwrap();
        assert!(api.record_add_custom_track(rec, "ACCEL", "S_ACCEL", &[], &settings).is_err());
        assert!(api.record_add_custom_track(rec, DEPTH_TRACK, "X", &[], &settings).is_err());
        assert!(api.record_add_custom_track(rec, IMU_TRACK, "X", &[], &settings).is_err());
        api.release(rec);
    }
}
