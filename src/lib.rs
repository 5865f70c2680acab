pub mod error;
pub mod handle;
pub mod native;
pub mod record;
pub mod resource;
pub mod sensor;
pub mod time;
pub mod tracking;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};
pub use handle::{HandleKind, NativeHandle, RefHandle};
pub use native::{LogLevel, NativeApi, SdkConfig};
pub use record::{
    Playback, PlaybackDataBlock, PlaybackTrack, RecordConfiguration, Recorder, SeekOrigin,
};
pub use resource::{ChildTracker, Disposable, DuplicateReference};
pub use sensor::{Calibration, Capture, DepthMode, Float3, Image, ImageFormat, ImuSample};
pub use time::{Microseconds, Timeout};
pub use tracking::{
    BodyFrame, BodyId, JointConfidence, JointType, ProcessingStrategy, Processor, ProcessorStats,
    Skeleton, Tracker, TrackerConfiguration,
};

/// Process-wide configuration for the binary entry point. Library types take
/// their configuration explicitly and never read this.
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Entry point to a native backend. Cheap to clone.
#[derive(Clone)]
pub struct Sdk {
    api: Arc<dyn NativeApi>,
}

impl Sdk {
    pub fn new(api: Arc<dyn NativeApi>) -> Self {
        Self { api }
    }

    /// The in-process backend.
    pub fn software(config: &SdkConfig) -> Self {
        Self::new(native::software::SoftwareApi::shared(config.clone()))
    }

    pub fn api(&self) -> &Arc<dyn NativeApi> {
        &self.api
    }

    pub fn backend_name(&self) -> &'static str {
        self.api.name()
    }
}

impl fmt::Debug for Sdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sdk").field("backend", &self.api.name()).finish()
    }
}

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    pub sdk: SdkConfig,
    pub tracker: TrackerConfiguration,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub strategy: ProcessingStrategy,
    /// Interval start in seconds from the beginning of the recording
    pub start_secs: Option<f64>,
    pub end_secs: Option<f64>,
    /// Key of the recording in the in-process store
    pub recording_path: String,
    /// Synthetic recording generated by the binary
    pub frame_count: usize,
    pub camera_fps: u32,
    pub depth_mode: DepthMode,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            strategy: ProcessingStrategy::SingleThread,
            start_secs: None,
            end_secs: None,
            recording_path: "synthetic.mkv".into(),
            frame_count: 90,
            camera_fps: 30,
            depth_mode: DepthMode::Nfov2x2Binned,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `TRACKBRIDGE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("TRACKBRIDGE")
                .separator("__")
                .try_parsing(true),
        );
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.processing;
        if p.frame_count == 0 || p.camera_fps == 0 {
            return Err(Error::Config("frame_count and camera_fps must be positive".into()));
        }
        if p.start_secs.is_some_and(|s| s < 0.0) || p.end_secs.is_some_and(|e| e < 0.0) {
            return Err(Error::Config("interval bounds must not be negative".into()));
        }
        if let (Some(start), Some(end)) = (p.start_secs, p.end_secs) {
            if start > end {
                return Err(Error::Config(format!("interval start {start}s is after end {end}s")));
            }
        }
        if !p.depth_mode.has_depth() {
            return Err(Error::Config(format!("depth mode {:?} has no depth", p.depth_mode)));
        }
        Ok(())
    }
}
