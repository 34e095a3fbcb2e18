// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time.
//!
//! [`HostTime`] is a point on the `CLOCK_MONOTONIC` timeline expressed in
//! nanoseconds. Every timestamp the render loop sees (wake deadlines,
//! presentation feedback, paint durations) lives on this timeline, so the
//! core never reads a clock itself: callers pass `now` explicitly.
//!
//! Intervals are plain [`Duration`]s. Arithmetic saturates at the ends of
//! the `u64` range rather than panicking.

use core::fmt;
use core::ops::{Add, Sub};
use core::time::Duration;

/// A point in time in nanoseconds of the monotonic clock.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// The earliest representable time.
    pub const ZERO: Self = Self(0);

    /// Creates a host time from a nanosecond count.
    #[inline]
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a host time from a millisecond count.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the duration between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Checked addition of a duration.
    #[inline]
    #[must_use]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        let nanos = u64::try_from(duration.as_nanos()).ok()?;
        self.0.checked_add(nanos).map(Self)
    }

    /// Checked subtraction of a duration.
    #[inline]
    #[must_use]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        let nanos = u64::try_from(duration.as_nanos()).ok()?;
        self.0.checked_sub(nanos).map(Self)
    }

    /// Subtracts a duration, clamping at [`HostTime::ZERO`].
    #[inline]
    #[must_use]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        self.checked_sub(duration).unwrap_or(Self::ZERO)
    }
}

/// Converts a duration to whole nanoseconds, saturating at `u64::MAX`.
#[inline]
#[must_use]
pub fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl Add<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(duration_nanos(rhs)))
    }
}

impl Sub<Duration> for HostTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Duration) -> Self {
        self.saturating_sub(rhs)
    }
}

impl Sub for HostTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Self) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_are_nanoseconds() {
        assert_eq!(HostTime::from_millis(16), HostTime(16_000_000));
        assert_eq!(HostTime::from_millis(u64::MAX), HostTime(u64::MAX));
    }

    #[test]
    fn host_time_duration_ops() {
        let t = HostTime(1000);
        let d = Duration::from_nanos(200);
        assert_eq!((t + d).as_nanos(), 1200);
        assert_eq!((t - d).as_nanos(), 800);
        assert_eq!(t - HostTime(400), Duration::from_nanos(600));
        assert_eq!(
            t.saturating_duration_since(HostTime(1500)),
            Duration::ZERO,
            "earlier-than-self saturates to zero"
        );
    }

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(HostTime(5) - Duration::from_nanos(10), HostTime::ZERO);
        assert_eq!(HostTime(u64::MAX) + Duration::from_secs(1), HostTime(u64::MAX));
        assert_eq!(HostTime(5).checked_sub(Duration::from_nanos(10)), None);
        assert_eq!(
            HostTime(5).checked_add(Duration::from_nanos(10)),
            Some(HostTime(15))
        );
    }
}
