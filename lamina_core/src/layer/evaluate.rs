// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame change collection and paint order.
//!
//! Setters keep derived state current, so evaluation has nothing left to
//! recompute. It drains the dirty channels into a [`LayerChanges`] report and
//! rebuilds the depth-first paint order when topology changed.
//!
//! [`LayerChanges`] carries raw slot indices; turn them into handles with
//! [`RenderLayerTree::id_at`].

use super::id::INVALID;
use super::tree::RenderLayerTree;
use crate::dirty;

/// The set of changes produced by a single [`RenderLayerTree::evaluate`]
/// call.
#[derive(Clone, Debug, Default)]
pub struct LayerChanges {
    /// Layers whose global placement changed (including descendants of a
    /// moved layer).
    pub geometry: Vec<u32>,
    /// Layers whose effective visibility may have changed.
    pub visibility: Vec<u32>,
    /// Layers whose effective output layer may have changed.
    pub output_layers: Vec<u32>,
    /// Layers created since the last evaluate.
    pub added: Vec<u32>,
    /// Layers destroyed since the last evaluate.
    pub removed: Vec<u32>,
    /// Whether the paint order was rebuilt.
    pub topology_changed: bool,
}

impl LayerChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.geometry.clear();
        self.visibility.clear();
        self.output_layers.clear();
        self.added.clear();
        self.removed.clear();
        self.topology_changed = false;
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
            && self.visibility.is_empty()
            && self.output_layers.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
            && !self.topology_changed
    }
}

impl RenderLayerTree {
    /// Collects the changes since the last call and refreshes the paint
    /// order.
    pub fn evaluate(&mut self) -> LayerChanges {
        let mut changes = LayerChanges::default();
        self.evaluate_into(&mut changes);
        changes
    }

    /// Like [`evaluate`](Self::evaluate), but reuses a caller-provided
    /// buffer.
    pub fn evaluate_into(&mut self, changes: &mut LayerChanges) {
        changes.clear();

        if self.traversal_dirty {
            self.rebuild_traversal_order();
            changes.topology_changed = true;
            self.traversal_dirty = false;
        }

        changes.geometry = self
            .dirty
            .drain(dirty::GEOMETRY)
            .affected()
            .deterministic()
            .run()
            .collect();
        changes.visibility = self
            .dirty
            .drain(dirty::VISIBILITY)
            .affected()
            .deterministic()
            .run()
            .collect();
        changes.output_layers = self
            .dirty
            .drain(dirty::OUTPUT_LAYER)
            .affected()
            .deterministic()
            .run()
            .collect();
        let _: Vec<u32> = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .collect();

        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);
    }

    /// Returns the paint order of all live layers: depth-first pre-order,
    /// which is back to front.
    ///
    /// Only valid after [`evaluate`](Self::evaluate).
    #[must_use]
    pub fn traversal_order(&self) -> &[u32] {
        &self.traversal_order
    }

    /// Returns the paint order of the subtree rooted at `root`, back to
    /// front.
    ///
    /// Reflects the topology as of the last [`evaluate`](Self::evaluate);
    /// empty if `root` was created after it.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    #[must_use]
    pub fn subtree_order(&self, root: super::LayerId) -> &[u32] {
        assert!(self.is_alive(root), "stale LayerId: {root:?}");
        let idx = root.index() as usize;
        let start = self.traversal_pos[idx];
        if start == INVALID {
            return &[];
        }
        &self.traversal_order[start as usize..self.subtree_end[idx] as usize]
    }

    fn rebuild_traversal_order(&mut self) {
        self.traversal_order.clear();
        self.traversal_pos.fill(INVALID);
        self.subtree_end.fill(INVALID);
        for idx in 0..self.len {
            if self.parent[idx as usize] == INVALID && !self.free_list.contains(&idx) {
                self.dfs_collect(idx);
            }
        }
    }

    fn dfs_collect(&mut self, idx: u32) {
        self.traversal_pos[idx as usize] = self.position();
        self.traversal_order.push(idx);
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            self.dfs_collect(child);
            child = self.next_sibling[child as usize];
        }
        self.subtree_end[idx as usize] = self.position();
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot count is bounded by u32 indices"
    )]
    fn position(&self) -> u32 {
        self.traversal_order.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;

    use super::*;
    use crate::delegate::EmptyDelegate;
    use crate::output_layer::OutputLayerId;

    #[test]
    fn no_change_evaluate_returns_empty() {
        let mut tree = RenderLayerTree::new();
        let _root = tree.create_layer(EmptyDelegate);
        let _ = tree.evaluate();

        let changes = tree.evaluate();
        assert!(changes.is_empty());
    }

    #[test]
    fn traversal_order_is_depth_first() {
        let mut tree = RenderLayerTree::new();
        let a = tree.create_layer(EmptyDelegate);
        let b = tree.create_sublayer(a, EmptyDelegate);
        let c = tree.create_sublayer(a, EmptyDelegate);
        let d = tree.create_sublayer(b, EmptyDelegate);
        let other = tree.create_layer(EmptyDelegate);

        let _ = tree.evaluate();

        assert_eq!(
            tree.traversal_order(),
            &[a.index(), b.index(), d.index(), c.index(), other.index()]
        );
        assert_eq!(tree.subtree_order(b), &[b.index(), d.index()]);
        assert_eq!(tree.subtree_order(other), &[other.index()]);
    }

    #[test]
    fn geometry_change_reports_descendants() {
        let mut tree = RenderLayerTree::new();
        let root = tree.create_layer(EmptyDelegate);
        let child = tree.create_sublayer(root, EmptyDelegate);
        let _ = tree.evaluate();

        tree.set_geometry(root, Rect::new(0.0, 0.0, 10.0, 10.0));
        let changes = tree.evaluate();
        assert!(changes.geometry.contains(&root.index()));
        assert!(changes.geometry.contains(&child.index()));
        assert!(!changes.topology_changed);
    }

    #[test]
    fn output_layer_change_reports_descendants() {
        let mut tree = RenderLayerTree::new();
        let root = tree.create_layer(EmptyDelegate);
        let child = tree.create_sublayer(root, EmptyDelegate);
        let _ = tree.evaluate();

        tree.set_output_layer(root, Some(OutputLayerId(3)));
        let changes = tree.evaluate();
        assert!(changes.output_layers.contains(&child.index()));
        assert!(changes.visibility.is_empty());
    }

    #[test]
    fn added_and_removed_lifecycle() {
        let mut tree = RenderLayerTree::new();
        let id = tree.create_layer(EmptyDelegate);

        let changes = tree.evaluate();
        assert!(changes.added.contains(&id.index()));
        assert!(changes.removed.is_empty());

        let changes = tree.evaluate();
        assert!(changes.added.is_empty());

        tree.destroy_layer(id);
        let changes = tree.evaluate();
        assert!(changes.removed.contains(&id.index()));
        assert!(changes.topology_changed);
    }
}
