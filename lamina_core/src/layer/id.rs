// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render layer handles.

use core::fmt;

/// Slot value meaning "none" in the tree's parent and sibling links.
pub const INVALID: u32 = u32::MAX;

/// Handle to a layer in a [`RenderLayerTree`](super::RenderLayerTree).
///
/// A destroyed layer's slot is recycled with a bumped generation, so a
/// handle that outlives its layer no longer validates.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

impl LayerId {
    /// Slot in the tree's columns. Only meaningful for diagnostics.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.slot
    }

    /// Generation of the slot when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layer#{}.{}", self.slot, self.generation)
    }
}
