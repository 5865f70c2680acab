//! Body tracking: the bounded enqueue/pop pipeline and its results.

pub mod frame;
pub mod processor;
pub mod queue;
pub mod skeleton;
pub mod tracker;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use frame::BodyFrame;
pub use processor::{
    CaptureSource, Interval, ProcessingStrategy, Processor, ProcessorStats, StopHandle, VecSource,
};
pub use queue::{BoundedTrackingQueue, QueueState};
pub use skeleton::{Joint, JointConfidence, JointType, Quaternion, Skeleton, JOINT_COUNT};
pub use tracker::Tracker;

/// Identifier the tracker assigns to a body; stable across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

impl BodyId {
    pub const INVALID: BodyId = BodyId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != BodyId::INVALID
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SensorOrientation {
    #[default]
    Default,
    Clockwise90,
    CounterClockwise90,
    Flip180,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessingMode {
    #[default]
    Gpu,
    Cpu,
    GpuCuda,
    GpuTensorRt,
    GpuDirectMl,
}

/// Parameters the native tracker is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrackerConfiguration {
    pub sensor_orientation: SensorOrientation,
    pub processing_mode: ProcessingMode,
    pub gpu_device_id: i32,
    pub model_path: Option<String>,
}
