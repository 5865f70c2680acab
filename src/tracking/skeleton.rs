//! Joint model of a tracked body.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::sensor::Float3;

pub const JOINT_COUNT: usize = 26;

/// Joints in native order; `JointType as usize` indexes [`Skeleton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointType {
    Pelvis,
    SpineNaval,
    SpineChest,
    Neck,
    ClavicleLeft,
    ShoulderLeft,
    ElbowLeft,
    WristLeft,
    ClavicleRight,
    ShoulderRight,
    ElbowRight,
    WristRight,
    HipLeft,
    KneeLeft,
    AnkleLeft,
    FootLeft,
    HipRight,
    KneeRight,
    AnkleRight,
    FootRight,
    Head,
    Nose,
    EyeLeft,
    EarLeft,
    EyeRight,
    EarRight,
}

impl JointType {
    pub const ALL: [JointType; JOINT_COUNT] = [
        JointType::Pelvis,
        JointType::SpineNaval,
        JointType::SpineChest,
        JointType::Neck,
        JointType::ClavicleLeft,
        JointType::ShoulderLeft,
        JointType::ElbowLeft,
        JointType::WristLeft,
        JointType::ClavicleRight,
        JointType::ShoulderRight,
        JointType::ElbowRight,
        JointType::WristRight,
        JointType::HipLeft,
        JointType::KneeLeft,
        JointType::AnkleLeft,
        JointType::FootLeft,
        JointType::HipRight,
        JointType::KneeRight,
        JointType::AnkleRight,
        JointType::FootRight,
        JointType::Head,
        JointType::Nose,
        JointType::EyeLeft,
        JointType::EarLeft,
        JointType::EyeRight,
        JointType::EarRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next joint towards the pelvis; `None` for the pelvis itself.
    pub fn parent(self) -> Option<JointType> {
        use JointType::*;
        let parent = match self {
            Pelvis => return None,
            SpineNaval | HipLeft | HipRight => Pelvis,
            SpineChest => SpineNaval,
            Neck | ClavicleLeft | ClavicleRight => SpineChest,
            ShoulderLeft => ClavicleLeft,
            ElbowLeft => ShoulderLeft,
            WristLeft => ElbowLeft,
            ShoulderRight => ClavicleRight,
            ElbowRight => ShoulderRight,
            WristRight => ElbowRight,
            KneeLeft => HipLeft,
            AnkleLeft => KneeLeft,
            FootLeft => AnkleLeft,
            KneeRight => HipRight,
            AnkleRight => KneeRight,
            FootRight => AnkleRight,
            Head => Neck,
            Nose | EyeLeft | EarLeft | EyeRight | EarRight => Head,
        };
        Some(parent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum JointConfidence {
    /// Out of range.
    #[default]
    None,
    /// Not observed, predicted.
    Low,
    Medium,
    High,
}

/// Normalized rotation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Joint {
    /// Position in depth camera space, millimetres.
    pub position_mm: Float3,
    pub orientation: Quaternion,
    pub confidence: JointConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    joints: [Joint; JOINT_COUNT],
}

impl Skeleton {
    pub fn new(joints: [Joint; JOINT_COUNT]) -> Self {
        Self { joints }
    }

    /// Every joint at the origin with no confidence.
    pub fn untracked() -> Self {
        Self {
            joints: [Joint::default(); JOINT_COUNT],
        }
    }

    pub fn joints(&self) -> &[Joint; JOINT_COUNT] {
        &self.joints
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointType, &Joint)> {
        JointType::ALL.into_iter().zip(self.joints.iter())
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Skeleton::untracked()
    }
}

impl Index<JointType> for Skeleton {
    type Output = Joint;

    fn index(&self, joint: JointType) -> &Joint {
        &self.joints[joint.index()]
    }
}
