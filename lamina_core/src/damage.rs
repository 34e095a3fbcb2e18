// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Buffer-age damage reconstruction.
//!
//! A swapchain hands back buffers whose contents are a few frames old. To
//! repaint only what changed, an output layer records the damage of every
//! frame it renders in a [`DamageJournal`] and, when it acquires a buffer of
//! age `N`, asks the journal for the union of the last `N` entries.
//!
//! The journal never under-reports: whenever it cannot prove the history is
//! complete (unknown age, history shorter than the age, geometry changed)
//! it falls back to the whole output geometry.

use std::collections::VecDeque;

use kurbo::Rect;

use crate::region::Region;

/// Bounded history of per-frame damage regions.
///
/// Entries are stored newest first. The capacity normally matches the
/// number of swapchain slots of the owning output layer.
#[derive(Clone, Debug)]
pub struct DamageJournal {
    log: VecDeque<Region>,
    capacity: usize,
    geometry: Option<Rect>,
}

impl Default for DamageJournal {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl DamageJournal {
    /// Capacity used by [`Default`], enough for triple buffering with one
    /// spare slot.
    pub const DEFAULT_CAPACITY: usize = 4;

    /// Creates an empty journal holding at most `capacity` entries.
    ///
    /// `capacity == 0` is promoted to `1`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            log: VecDeque::with_capacity(capacity),
            capacity,
            geometry: None,
        }
    }

    /// Returns the maximum number of entries kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Returns `true` when no frame has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Returns the geometry the history was recorded against, if any.
    #[must_use]
    pub fn geometry(&self) -> Option<Rect> {
        self.geometry
    }

    /// Changes the number of kept entries, dropping the oldest ones if the
    /// journal shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.log.truncate(self.capacity);
    }

    /// Records the geometry subsequent entries refer to.
    ///
    /// A geometry different from the recorded one invalidates the whole
    /// history.
    pub fn set_geometry(&mut self, geometry: Rect) {
        if self.geometry != Some(geometry) {
            if self.geometry.is_some() {
                tracing::debug!(?geometry, "damage journal geometry changed, dropping history");
            }
            self.log.clear();
            self.geometry = Some(geometry);
        }
    }

    /// Forgets all recorded damage.
    pub fn clear(&mut self) {
        self.log.clear();
    }

    /// Records the damage of a newly rendered frame.
    pub fn add(&mut self, region: Region) {
        if self.log.len() == self.capacity {
            let _ = self.log.pop_back();
        }
        self.log.push_front(region);
    }

    /// Returns the damage accumulated over the last `age` frames, clipped to
    /// `geometry`.
    ///
    /// Falls back to the whole of `geometry` when `age` is zero (buffer
    /// contents unknown), when fewer than `age` frames were recorded, or when
    /// the history was recorded against a different geometry. A journal that
    /// never had a geometry set takes entries as recorded against `geometry`.
    #[must_use]
    pub fn accumulate(&self, age: u32, geometry: Rect) -> Region {
        let age = age as usize;
        let mismatched = self.geometry.is_some_and(|recorded| recorded != geometry);
        if age == 0 || age > self.log.len() || mismatched {
            return Region::from_rect(geometry);
        }
        let mut region = Region::new();
        for entry in self.log.iter().take(age) {
            region.add_region(entry);
        }
        region.intersect_rect(geometry)
    }
}
