//! Bidirectional, seekable read position over a timestamp-ordered sequence.
//!
//! The cursor only tracks a position; the items themselves live with the
//! container. `next` always returns the item after the most recently returned
//! one and `previous` the item before it. Running off either end parks the
//! cursor there, so reversing direction returns the boundary item again.
//! After a seek the cursor sits between two items: `next` yields the first
//! item with timestamp >= target, `previous` the last item with timestamp < target.

use crate::record::SeekOrigin;
use crate::time::Microseconds;

pub trait Timestamped {
    fn timestamp(&self) -> Microseconds;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPosition {
    BeforeStart,
    At(usize),
    AfterEnd,
    /// Between items `gap - 1` and `gap`, set by a seek.
    Between(usize),
}

#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    position: CursorPosition,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self {
            position: CursorPosition::BeforeStart,
        }
    }

    pub fn position(&self) -> CursorPosition {
        self.position
    }

    /// Advance over a sequence of `len` items; returns the index of the item read.
    pub fn next(&mut self, len: usize) -> Option<usize> {
        let candidate = match self.position {
            CursorPosition::BeforeStart => 0,
            CursorPosition::At(i) => i + 1,
            CursorPosition::Between(gap) => gap,
            CursorPosition::AfterEnd => return None,
        };
        if candidate < len {
            self.position = CursorPosition::At(candidate);
            Some(candidate)
        } else {
            self.position = CursorPosition::AfterEnd;
            None
        }
    }

    /// Step back over a sequence of `len` items; returns the index of the item read.
    pub fn previous(&mut self, len: usize) -> Option<usize> {
        let upper = match self.position {
            CursorPosition::AfterEnd => len,
            CursorPosition::At(i) => i.min(len),
            CursorPosition::Between(gap) => gap.min(len),
            CursorPosition::BeforeStart => return None,
        };
        if upper > 0 {
            self.position = CursorPosition::At(upper - 1);
            Some(upper - 1)
        } else {
            self.position = CursorPosition::BeforeStart;
            None
        }
    }

    /// Reposition between two items of the timestamp-sorted `items`.
    ///
    /// `start` and `end` bound the recording (`end` is one past the last
    /// timestamp). Returns false, leaving the position unchanged, for a
    /// negative offset from `Begin`, a positive offset from `End`, or an
    /// unrepresentable target.
    pub fn seek<T: Timestamped>(
        &mut self,
        items: &[T],
        start: Microseconds,
        end: Microseconds,
        offset: Microseconds,
        origin: SeekOrigin,
    ) -> bool {
        let target = match origin {
            SeekOrigin::Begin if offset < Microseconds::ZERO => return false,
            SeekOrigin::End if offset > Microseconds::ZERO => return false,
            SeekOrigin::Begin => start.checked_add(offset),
            SeekOrigin::End => end.checked_add(offset),
            SeekOrigin::DeviceTime => Some(offset),
        };
        let Some(target) = target else {
            return false;
        };
        let gap = items.partition_point(|item| item.timestamp() < target);
        self.position = CursorPosition::Between(gap);
        true
    }
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// `(first, one past last)` timestamps of a sorted sequence.
pub fn bounds<T: Timestamped>(items: &[T]) -> (Microseconds, Microseconds) {
    match (items.first(), items.last()) {
        (Some(first), Some(last)) => (first.timestamp(), last.timestamp() + Microseconds(1)),
        _ => (Microseconds::ZERO, Microseconds::ZERO),
    }
}
