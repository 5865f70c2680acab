//! Recording reader.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, instrument};

use crate::error::{Error, Result};
use crate::handle::{NativeHandle, RefHandle};
use crate::native::StreamResult;
use crate::record::{
    PlaybackDataBlock, RecordConfiguration, SeekOrigin, TrackInfo, VideoSettings,
};
use crate::resource::Disposable;
use crate::sensor::{Calibration, Capture, ImuSample};
use crate::time::Microseconds;
use crate::Sdk;

struct PlaybackHandle {
    handle: RefHandle,
    path: PathBuf,
}

impl PlaybackHandle {
    fn seek_failed(&self, offset: Microseconds, origin: SeekOrigin) -> Error {
        Error::SeekFailed {
            path: self.path.display().to_string(),
            offset_usec: offset.as_usec(),
            origin: origin.to_string(),
        }
    }

    fn read_error(&self, what: &str) -> Error {
        Error::recording(self.path.display().to_string(), format!("cannot read {what}"))
    }
}

/// Opened recording: metadata, the capture stream and custom tracks.
///
/// The capture cursor and the cursor of each custom track move
/// independently of one another. The IMU cursor follows capture seeks.
pub struct Playback {
    inner: Arc<PlaybackHandle>,
    config: RecordConfiguration,
    length: Microseconds,
    tracks: Vec<TrackInfo>,
}

impl Playback {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(sdk: &Sdk, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let api = sdk.api();
        let value = api.playback_open(path)?;
        let handle = RefHandle::new(api.clone(), value)?;
        let config = api.playback_get_record_configuration(value)?;
        let length = api.playback_get_recording_length(value)?;
        let tracks = api.playback_get_tracks(value)?;
        info!(playback = %handle, %length, tracks = tracks.len(), "recording opened");
        Ok(Self {
            inner: Arc::new(PlaybackHandle {
                handle,
                path: path.to_path_buf(),
            }),
            config,
            length,
            tracks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn handle(&self) -> &RefHandle {
        &self.inner.handle
    }

    pub fn record_configuration(&self) -> &RecordConfiguration {
        &self.config
    }

    /// Span from the first to one past the last timestamp.
    pub fn record_length(&self) -> Microseconds {
        self.length
    }

    pub fn calibration(&self) -> Result<Calibration> {
        let h = self.handle();
        h.api().playback_get_calibration(h.value_not_disposed()?)
    }

    pub fn tag(&self, name: &str) -> Result<Option<String>> {
        let h = self.handle();
        h.api().playback_get_tag(h.value_not_disposed()?, name)
    }

    pub fn attachment(&self, name: &str) -> Result<Option<Bytes>> {
        let h = self.handle();
        h.api().playback_get_attachment(h.value_not_disposed()?, name)
    }

    /// Built-in tracks first, then custom tracks in declaration order.
    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    /// Reader for the custom track `name`.
    pub fn custom_track(&self, name: &str) -> Result<PlaybackTrack> {
        self.handle().check_not_disposed()?;
        let info = self
            .tracks
            .iter()
            .find(|t| t.name == name && !t.is_built_in)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("no custom track named {name:?}")))?;
        Ok(PlaybackTrack {
            playback: self.inner.clone(),
            info,
        })
    }

    /// Move the capture and IMU cursors. Custom track cursors are not affected.
    pub fn seek_timestamp(&self, offset: Microseconds, origin: SeekOrigin) -> Result<()> {
        let h = self.handle();
        if !h.api().playback_seek_timestamp(h.value_not_disposed()?, offset, origin) {
            return Err(self.inner.seek_failed(offset, origin));
        }
        Ok(())
    }

    pub fn next_capture(&self) -> Result<Option<Capture>> {
        let h = self.handle();
        let result = h.api().playback_get_next_capture(h.value_not_disposed()?);
        self.capture_from(result)
    }

    pub fn previous_capture(&self) -> Result<Option<Capture>> {
        let h = self.handle();
        let result = h.api().playback_get_previous_capture(h.value_not_disposed()?);
        self.capture_from(result)
    }

    /// Next IMU sample, `None` at the end or when the recording has no IMU track.
    pub fn next_imu_sample(&self) -> Result<Option<ImuSample>> {
        let h = self.handle();
        let result = h.api().playback_get_next_imu_sample(h.value_not_disposed()?);
        self.imu_sample_from(result)
    }

    pub fn previous_imu_sample(&self) -> Result<Option<ImuSample>> {
        let h = self.handle();
        let result = h.api().playback_get_previous_imu_sample(h.value_not_disposed()?);
        self.imu_sample_from(result)
    }

    fn imu_sample_from(&self, result: StreamResult<ImuSample>) -> Result<Option<ImuSample>> {
        match result {
            StreamResult::Succeeded(sample) => Ok(Some(sample)),
            StreamResult::Eof => Ok(None),
            StreamResult::Failed => {
                self.handle().check_not_disposed()?;
                Err(self.inner.read_error("IMU sample"))
            }
        }
    }

    fn capture_from(&self, result: StreamResult<NativeHandle>) -> Result<Option<Capture>> {
        match result {
            StreamResult::Succeeded(value) => {
                Capture::from_native(self.handle().api().clone(), value).map(Some)
            }
            StreamResult::Eof => Ok(None),
            StreamResult::Failed => {
                self.handle().check_not_disposed()?;
                Err(self.inner.read_error("capture"))
            }
        }
    }

    pub fn dispose(&self) {
        if self.handle().dispose() {
            info!(path = %self.inner.path.display(), "recording closed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.handle().is_disposed()
    }

    pub fn on_disposed<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle().on_disposed(callback);
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Disposable for Playback {
    fn dispose(&self) {
        Playback::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Playback::is_disposed(self)
    }

    fn on_disposed(&self, callback: Box<dyn FnOnce() + Send>) {
        self.handle().on_disposed(callback);
    }
}

impl fmt::Debug for Playback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Playback")
            .field("handle", self.handle())
            .field("path", &self.inner.path)
            .field("length", &self.length)
            .finish()
    }
}

/// Reader for one custom track with its own cursor.
pub struct PlaybackTrack {
    playback: Arc<PlaybackHandle>,
    info: TrackInfo,
}

impl PlaybackTrack {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn codec_id(&self) -> &str {
        &self.info.codec_id
    }

    pub fn codec_context(&self) -> &Bytes {
        &self.info.codec_context
    }

    pub fn video_settings(&self) -> Option<VideoSettings> {
        self.info.video_settings
    }

    pub fn seek_timestamp(&self, offset: Microseconds, origin: SeekOrigin) -> Result<()> {
        let h = &self.playback.handle;
        if !h
            .api()
            .playback_track_seek_timestamp(h.value_not_disposed()?, &self.info.name, offset, origin)
        {
            return Err(self.playback.seek_failed(offset, origin));
        }
        Ok(())
    }

    pub fn next_data_block(&self) -> Result<Option<PlaybackDataBlock>> {
        let h = &self.playback.handle;
        let result = h
            .api()
            .playback_get_next_data_block(h.value_not_disposed()?, &self.info.name);
        self.block_from(result)
    }

    pub fn previous_data_block(&self) -> Result<Option<PlaybackDataBlock>> {
        let h = &self.playback.handle;
        let result = h
            .api()
            .playback_get_previous_data_block(h.value_not_disposed()?, &self.info.name);
        self.block_from(result)
    }

    fn block_from(&self, result: StreamResult<NativeHandle>) -> Result<Option<PlaybackDataBlock>> {
        let h = &self.playback.handle;
        match result {
            StreamResult::Succeeded(value) => {
                PlaybackDataBlock::from_native(h.api().clone(), value).map(Some)
            }
            StreamResult::Eof => Ok(None),
            StreamResult::Failed => {
                h.check_not_disposed()?;
                let what = format!("data block of track {}", self.info.name);
                Err(self.playback.read_error(&what))
            }
        }
    }
}

impl fmt::Debug for PlaybackTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackTrack")
            .field("name", &self.info.name)
            .field("codec_id", &self.info.codec_id)
            .finish()
    }
}
