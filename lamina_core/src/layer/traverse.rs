// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sublayer iteration.

use super::id::{INVALID, LayerId};
use super::tree::RenderLayerTree;

/// An iterator over the direct sublayers of a layer, bottom to top.
///
/// Created by [`RenderLayerTree::sublayers`].
#[derive(Debug)]
pub struct Sublayers<'a> {
    tree: &'a RenderLayerTree,
    current: u32,
}

impl<'a> Sublayers<'a> {
    pub(crate) fn new(tree: &'a RenderLayerTree, first: u32) -> Self {
        Self {
            tree,
            current: first,
        }
    }
}

impl Iterator for Sublayers<'_> {
    type Item = LayerId;

    fn next(&mut self) -> Option<LayerId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.tree.next_sibling[idx as usize];
        Some(self.tree.id(idx))
    }
}
