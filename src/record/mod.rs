//! Recording and playback of capture sequences.

pub mod cursor;
pub mod data_block;
pub mod playback;
pub mod recorder;

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::sensor::{DepthMode, ImageFormat};
use crate::time::Microseconds;

pub use cursor::{CursorPosition, PlaybackCursor, Timestamped};
pub use data_block::PlaybackDataBlock;
pub use playback::{Playback, PlaybackTrack};
pub use recorder::{Recorder, RecorderCustomTrack};

pub const COLOR_TRACK: &str = "COLOR";
pub const DEPTH_TRACK: &str = "DEPTH";
pub const IR_TRACK: &str = "IR";
pub const IMU_TRACK: &str = "IMU";

/// Where a seek offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeekOrigin {
    /// Offset from the first timestamp of the recording; must not be negative.
    Begin,
    /// Offset from one past the last timestamp; must not be positive.
    End,
    /// Absolute device timestamp.
    DeviceTime,
}

impl fmt::Display for SeekOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SeekOrigin::Begin => "begin",
            SeekOrigin::End => "end",
            SeekOrigin::DeviceTime => "device time",
        };
        f.write_str(s)
    }
}

/// Stream layout of a recording, fixed when the recorder is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfiguration {
    pub color_format: ImageFormat,
    pub color_track_enabled: bool,
    pub depth_mode: DepthMode,
    pub camera_fps: u32,
    pub depth_delay_off_color: Microseconds,
    /// Set by [`Recorder::add_imu_track`].
    pub imu_track_enabled: bool,
    /// Device timestamp of the first capture; filled in by the container.
    pub start_time_offset: Microseconds,
}

impl RecordConfiguration {
    pub fn new(depth_mode: DepthMode, color_format: Option<ImageFormat>, camera_fps: u32) -> Self {
        Self {
            color_format: color_format.unwrap_or(ImageFormat::ColorBgra32),
            color_track_enabled: color_format.is_some(),
            depth_mode,
            camera_fps,
            depth_delay_off_color: Microseconds::ZERO,
            imu_track_enabled: false,
            start_time_offset: Microseconds::ZERO,
        }
    }

    pub fn depth_track_enabled(&self) -> bool {
        self.depth_mode.has_depth()
    }

    pub fn ir_track_enabled(&self) -> bool {
        self.depth_mode.has_passive_ir()
    }

    /// Names of the built-in tracks this layout produces.
    pub fn built_in_tracks(&self) -> Vec<&'static str> {
        let mut tracks = Vec::with_capacity(4);
        if self.color_track_enabled {
            tracks.push(COLOR_TRACK);
        }
        if self.depth_track_enabled() {
            tracks.push(DEPTH_TRACK);
        }
        if self.ir_track_enabled() {
            tracks.push(IR_TRACK);
        }
        if self.imu_track_enabled {
            tracks.push(IMU_TRACK);
        }
        tracks
    }
}

/// Video settings of a custom track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VideoSettings {
    pub width: u64,
    pub height: u64,
    pub frame_rate: u64,
}

/// Description of one track in an opened recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub name: String,
    pub is_built_in: bool,
    pub codec_id: String,
    pub codec_context: Bytes,
    pub video_settings: Option<VideoSettings>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_tracks() {
        let cfg =
            RecordConfiguration::new(DepthMode::NfovUnbinned, Some(ImageFormat::ColorMjpg), 30);
        assert_eq!(cfg.built_in_tracks(), vec![COLOR_TRACK, DEPTH_TRACK, IR_TRACK]);

        let mut cfg = RecordConfiguration::new(DepthMode::PassiveIr, None, 5);
        assert_eq!(cfg.built_in_tracks(), vec![IR_TRACK]);
        cfg.imu_track_enabled = true;
        assert_eq!(cfg.built_in_tracks(), vec![IR_TRACK, IMU_TRACK]);
    }
}
