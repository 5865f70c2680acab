//! Timeout and timestamp value types used across the native seam.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Wait budget for enqueue/pop style calls.
///
/// `NO_WAIT` never blocks, `INFINITE` blocks until success or shutdown,
/// anything else blocks at most for the given duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeout(Option<Duration>);

impl Default for Timeout {
    fn default() -> Self {
        Timeout::NO_WAIT
    }
}

impl Timeout {
    pub const NO_WAIT: Timeout = Timeout(Some(Duration::ZERO));
    pub const INFINITE: Timeout = Timeout(None);

    pub const fn from_millis(ms: u64) -> Self {
        Timeout(Some(Duration::from_millis(ms)))
    }

    pub const fn from_duration(d: Duration) -> Self {
        Timeout(Some(d))
    }

    pub fn is_infinite(&self) -> bool {
        self.0.is_none()
    }

    pub fn is_no_wait(&self) -> bool {
        self.0 == Some(Duration::ZERO)
    }

    pub fn as_duration(&self) -> Option<Duration> {
        self.0
    }

    /// Absolute deadline counted from `now`; `None` for an infinite wait
    /// (or one too long to represent).
    pub fn deadline_from(&self, now: Instant) -> Option<Instant> {
        self.0.and_then(|d| now.checked_add(d))
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout(Some(d))
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => write!(f, "Infinite"),
            Some(d) if d.is_zero() => write!(f, "NoWait"),
            Some(d) => write!(f, "{} ms", d.as_millis()),
        }
    }
}

/// Device timestamp in microseconds. `+` and `-` saturate at the `i64` range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Microseconds(pub i64);

impl Microseconds {
    pub const ZERO: Microseconds = Microseconds(0);

    pub const fn from_millis(ms: i64) -> Self {
        Microseconds(ms * 1_000)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Microseconds((secs * 1_000_000.0).round() as i64)
    }

    pub const fn as_usec(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, rhs: Microseconds) -> Option<Microseconds> {
        self.0.checked_add(rhs.0).map(Microseconds)
    }

    pub const fn saturating_add(self, rhs: Microseconds) -> Microseconds {
        Microseconds(self.0.saturating_add(rhs.0))
    }

    pub const fn saturating_sub(self, rhs: Microseconds) -> Microseconds {
        Microseconds(self.0.saturating_sub(rhs.0))
    }

    pub fn to_duration(self) -> Duration {
        Duration::from_micros(self.0.max(0) as u64)
    }
}

impl Add for Microseconds {
    type Output = Microseconds;

    fn add(self, rhs: Microseconds) -> Microseconds {
        self.saturating_add(rhs)
    }
}

impl Sub for Microseconds {
    type Output = Microseconds;

    fn sub(self, rhs: Microseconds) -> Microseconds {
        self.saturating_sub(rhs)
    }
}

impl fmt::Display for Microseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} us", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_kinds() {
        assert!(Timeout::NO_WAIT.is_no_wait());
        assert!(!Timeout::NO_WAIT.is_infinite());
        assert!(Timeout::INFINITE.is_infinite());
        assert_eq!(Timeout::from_millis(10).as_duration(), Some(Duration::from_millis(10)));
        assert_eq!(Timeout::default(), Timeout::NO_WAIT);
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(Timeout::INFINITE.to_string(), "Infinite");
        assert_eq!(Timeout::NO_WAIT.to_string(), "NoWait");
        assert_eq!(Timeout::from_millis(25).to_string(), "25 ms");
    }

    #[test]
    fn test_deadline() {
        let now = Instant::now();
        assert_eq!(Timeout::INFINITE.deadline_from(now), None);
        assert_eq!(
            Timeout::from_millis(5).deadline_from(now),
            Some(now + Duration::from_millis(5))
        );
    }

    #[test]
    fn test_microseconds_arith() {
        let a = Microseconds::from_millis(4);
        let b = Microseconds(400);
        assert_eq!((a + b).as_usec(), 4_400);
        assert_eq!((a - b).as_usec(), 3_600);
        assert_eq!(Microseconds::from_secs_f64(0.5), Microseconds(500_000));
        assert_eq!(Microseconds(i64::MAX).checked_add(Microseconds(1)), None);
    }

    #[test]
    fn test_microseconds_saturate() {
        assert_eq!(Microseconds(i64::MAX) + Microseconds(1), Microseconds(i64::MAX));
        assert_eq!(Microseconds(i64::MIN) - Microseconds(1), Microseconds(i64::MIN));
        assert_eq!(Microseconds(i64::MAX) - Microseconds(i64::MIN), Microseconds(i64::MAX));
    }
}
