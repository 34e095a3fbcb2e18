// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render time history.

use core::time::Duration;
use std::collections::VecDeque;

use super::policy::LatencyPolicy;

/// Ring of recently measured paint durations.
///
/// The render loop consults it to predict how long the next frame will take
/// to paint. Which statistic is used depends on the [`LatencyPolicy`].
#[derive(Clone, Debug)]
pub struct RenderJournal {
    log: VecDeque<Duration>,
    capacity: usize,
}

impl Default for RenderJournal {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl RenderJournal {
    /// Number of samples kept by [`Default`].
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Creates an empty journal keeping at most `capacity` samples.
    ///
    /// `capacity == 0` is promoted to `1`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            log: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records one paint duration, evicting the oldest sample when full.
    pub fn add(&mut self, render_time: Duration) {
        if self.log.len() == self.capacity {
            let _ = self.log.pop_front();
        }
        self.log.push_back(render_time);
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Returns `true` if nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Shortest recorded duration, zero when empty.
    #[must_use]
    pub fn minimum(&self) -> Duration {
        self.log.iter().copied().min().unwrap_or_default()
    }

    /// Longest recorded duration, zero when empty.
    #[must_use]
    pub fn maximum(&self) -> Duration {
        self.log.iter().copied().max().unwrap_or_default()
    }

    /// Mean of the recorded durations, zero when empty.
    #[must_use]
    pub fn average(&self) -> Duration {
        let Ok(count) = u32::try_from(self.log.len()) else {
            return Duration::ZERO;
        };
        if count == 0 {
            return Duration::ZERO;
        }
        self.log.iter().sum::<Duration>() / count
    }

    /// Predicted paint duration for the given policy.
    #[must_use]
    pub fn estimate(&self, policy: LatencyPolicy) -> Duration {
        match policy {
            LatencyPolicy::ExtremelyLow => self.minimum(),
            LatencyPolicy::Low => (self.minimum() + self.average()) / 2,
            LatencyPolicy::Medium => self.average(),
            LatencyPolicy::High => (self.average() + self.maximum()) / 2,
            LatencyPolicy::ExtremelyHigh => self.maximum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn empty_journal_estimates_zero() {
        let journal = RenderJournal::default();
        assert_eq!(journal.estimate(LatencyPolicy::ExtremelyHigh), Duration::ZERO);
    }

    #[test]
    fn estimates_follow_policy() {
        let mut journal = RenderJournal::default();
        for v in [2, 4, 6] {
            journal.add(ms(v));
        }
        assert_eq!(journal.estimate(LatencyPolicy::ExtremelyLow), ms(2));
        assert_eq!(journal.estimate(LatencyPolicy::Low), ms(3));
        assert_eq!(journal.estimate(LatencyPolicy::Medium), ms(4));
        assert_eq!(journal.estimate(LatencyPolicy::High), ms(5));
        assert_eq!(journal.estimate(LatencyPolicy::ExtremelyHigh), ms(6));
    }

    #[test]
    fn old_samples_are_evicted() {
        let mut journal = RenderJournal::with_capacity(2);
        journal.add(ms(50));
        journal.add(ms(1));
        journal.add(ms(3));
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.maximum(), ms(3));
    }
}
