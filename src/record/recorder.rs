//! Recording writer.
//!
//! Tags, attachments, the IMU track and custom tracks are declared first,
//! then the header is written, then captures, IMU samples and custom track
//! data are appended. Every stream takes timestamps in non-decreasing order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::handle::RefHandle;
use crate::record::{RecordConfiguration, VideoSettings};
use crate::resource::Disposable;
use crate::sensor::{Capture, ImuSample};
use crate::time::Microseconds;
use crate::Sdk;

/// State shared between a recorder and its custom tracks.
struct RecordHandle {
    handle: RefHandle,
    path: PathBuf,
}

pub struct Recorder {
    inner: Arc<RecordHandle>,
}

impl Recorder {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn create(
        sdk: &Sdk,
        path: impl AsRef<Path>,
        config: &RecordConfiguration,
    ) -> Result<Self> {
        let path = path.as_ref();
        let value = sdk.api().record_create(path, config)?;
        let handle = RefHandle::new(sdk.api().clone(), value)?;
        info!(recorder = %handle, tracks = ?config.built_in_tracks(), "recorder created");
        Ok(Self {
            inner: Arc::new(RecordHandle {
                handle,
                path: path.to_path_buf(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn handle(&self) -> &RefHandle {
        &self.inner.handle
    }

    pub fn add_tag(&self, name: &str, value: &str) -> Result<()> {
        let h = self.handle();
        h.api().record_add_tag(h.value_not_disposed()?, name, value)
    }

    pub fn add_attachment(&self, name: &str, data: &[u8]) -> Result<()> {
        let h = self.handle();
        h.api().record_add_attachment(h.value_not_disposed()?, name, data)
    }

    /// Declare a custom track. Must happen before [`write_header`](Self::write_header).
    pub fn add_custom_track(
        &self,
        name: &str,
        codec_id: &str,
        codec_context: &[u8],
        settings: &VideoSettings,
    ) -> Result<RecorderCustomTrack> {
        let h = self.handle();
        let value = h.value_not_disposed()?;
        h.api()
            .record_add_custom_track(value, name, codec_id, codec_context, settings)?;
        debug!(recorder = %h, track = name, codec_id, "custom track added");
        Ok(RecorderCustomTrack {
            record: self.inner.clone(),
            name: name.to_string(),
        })
    }

    /// Declare the IMU track. Must happen before [`write_header`](Self::write_header).
    pub fn add_imu_track(&self) -> Result<()> {
        let h = self.handle();
        h.api().record_add_imu_track(h.value_not_disposed()?)?;
        debug!(recorder = %h, "IMU track added");
        Ok(())
    }

    pub fn write_header(&self) -> Result<()> {
        let h = self.handle();
        h.api().record_write_header(h.value_not_disposed()?)
    }

    pub fn write_capture(&self, capture: &Capture) -> Result<()> {
        let h = self.handle();
        let value = capture.handle().value_not_disposed()?;
        h.api().record_write_capture(h.value_not_disposed()?, value)
    }

    pub fn write_imu_sample(&self, sample: &ImuSample) -> Result<()> {
        let h = self.handle();
        h.api().record_write_imu_sample(h.value_not_disposed()?, sample)
    }

    pub fn flush(&self) -> Result<()> {
        let h = self.handle();
        h.api().record_flush(h.value_not_disposed()?)
    }

    /// Close the recording; buffered data is flushed by the container.
    pub fn dispose(&self) {
        if self.handle().dispose() {
            info!(path = %self.inner.path.display(), "recorder closed");
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

impl Drop for Recorder {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Disposable for Recorder {
    fn dispose(&self) {
        Recorder::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        Recorder::is_disposed(self)
    }

    fn on_disposed(&self, callback: Box<dyn FnOnce() + Send>) {
        self.handle().on_disposed(callback);
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("handle", self.handle())
            .field("path", &self.inner.path)
            .finish()
    }
}

/// Writer for one custom track. Valid while its recorder is not disposed.
#[derive(Clone)]
pub struct RecorderCustomTrack {
    record: Arc<RecordHandle>,
    name: String,
}

impl RecorderCustomTrack {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn write_data(&self, timestamp: Microseconds, data: &[u8]) -> Result<()> {
        let h = &self.record.handle;
        h.api()
            .record_write_custom_track_data(h.value_not_disposed()?, &self.name, timestamp, data)
    }
}

impl fmt::Debug for RecorderCustomTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderCustomTrack")
            .field("name", &self.name)
            .finish()
    }
}
