//! Native handle types.
//!
//! A [`NativeHandle`] is an opaque, non-owning reference to an object living
//! inside the native SDK. Ownership of one native reference is expressed by
//! [`RefHandle`], which releases it exactly once.

pub mod notify;
pub mod wrapper;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use notify::DisposeNotifier;
pub use wrapper::RefHandle;

/// Kind of native object a handle refers to.
///
/// Release and add-reference calls are kind-specific, so every handle carries its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Capture,
    Image,
    Tracker,
    BodyFrame,
    Record,
    Playback,
    PlaybackDataBlock,
}

impl HandleKind {
    pub fn label(self) -> &'static str {
        match self {
            HandleKind::Capture => "capture",
            HandleKind::Image => "image",
            HandleKind::Tracker => "tracker",
            HandleKind::BodyFrame => "body_frame",
            HandleKind::Record => "record",
            HandleKind::Playback => "playback",
            HandleKind::PlaybackDataBlock => "playback_data_block",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque, type-tagged reference to a native object. Never owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle {
    raw: u64,
    kind: HandleKind,
}

impl NativeHandle {
    pub const fn new(kind: HandleKind, raw: u64) -> Self {
        Self { raw, kind }
    }

    /// Create an invalid (null) handle.
    pub const fn null(kind: HandleKind) -> Self {
        Self { raw: 0, kind }
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.raw != 0
    }

    #[inline]
    pub const fn raw(&self) -> u64 {
        self.raw
    }

    #[inline]
    pub const fn kind(&self) -> HandleKind {
        self.kind
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:X}", self.kind, self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_invalid() {
        let h = NativeHandle::null(HandleKind::Image);
        assert!(!h.is_valid());
        assert_eq!(h.kind(), HandleKind::Image);
    }

    #[test]
    fn test_display() {
        let h = NativeHandle::new(HandleKind::BodyFrame, 0x2a);
        assert!(h.is_valid());
        assert_eq!(h.to_string(), "body_frame#2A");
    }
}
