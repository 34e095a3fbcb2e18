// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays render layer storage with topology, property and repaint
//! management.

use core::fmt;

use kurbo::{Affine, Point, Rect, Vec2};
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use super::id::{INVALID, LayerId};
use super::traverse::Sublayers;
use crate::delegate::{EmptyDelegate, RenderLayerDelegate};
use crate::dirty;
use crate::output_layer::OutputLayerId;
use crate::region::Region;

/// Struct-of-arrays storage for all render layers of a scene.
///
/// Layers are addressed by [`LayerId`] handles. Each layer occupies a slot in
/// parallel arrays; destroyed layers are recycled through a free list and
/// generation counters reject stale handles.
///
/// # Coordinate spaces
///
/// A layer's *local* space has its origin at the top-left corner of its
/// [`geometry`](Self::geometry), which is expressed in the parent's local
/// space (global space for roots). An optional [`transform`](Self::transform)
/// is applied inside the local space before the geometry offset, so the
/// local-to-parent mapping is `translate(geometry.origin) * transform`.
/// Repaint regions are accumulated in local space.
///
/// # Derived state
///
/// Effective visibility, bounding rects and repaints are updated by the
/// setters themselves. [`evaluate`](Self::evaluate) only reports which layers
/// changed and rebuilds the paint order.
pub struct RenderLayerTree {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Local properties (set by callers) --
    pub(crate) geometry: Vec<Rect>,
    pub(crate) transform: Vec<Affine>,
    pub(crate) visible: Vec<bool>,
    pub(crate) output_layer: Vec<Option<OutputLayerId>>,
    pub(crate) delegate: Vec<Box<dyn RenderLayerDelegate>>,

    // -- Derived properties --
    pub(crate) effective_visible: Vec<bool>,
    pub(crate) bounding_rect: Vec<Rect>,
    pub(crate) repaints: Vec<Region>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,

    // -- Traversal cache --
    pub(crate) traversal_order: Vec<u32>,
    pub(crate) traversal_pos: Vec<u32>,
    pub(crate) subtree_end: Vec<u32>,
    pub(crate) traversal_dirty: bool,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,

    // -- Repaint bookkeeping --
    exposed: Region,
    repaint_requested: bool,
}

impl fmt::Debug for RenderLayerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderLayerTree")
            .field("len", &self.len)
            .field("free", &self.free_list.len())
            .field("exposed", &self.exposed)
            .field("repaint_requested", &self.repaint_requested)
            .finish_non_exhaustive()
    }
}

impl Default for RenderLayerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLayerTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            geometry: Vec::new(),
            transform: Vec::new(),
            visible: Vec::new(),
            output_layer: Vec::new(),
            delegate: Vec::new(),
            effective_visible: Vec::new(),
            bounding_rect: Vec::new(),
            repaints: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            traversal_order: Vec::new(),
            traversal_pos: Vec::new(),
            subtree_end: Vec::new(),
            traversal_dirty: true,
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
            exposed: Region::new(),
            repaint_requested: false,
        }
    }

    // -- Allocation API --

    /// Creates a root layer owning `delegate` and returns its handle.
    ///
    /// The layer starts visible, with empty geometry, an identity transform
    /// and no output layer.
    pub fn create_layer<D: RenderLayerDelegate + 'static>(&mut self, delegate: D) -> LayerId {
        let delegate: Box<dyn RenderLayerDelegate> = Box::new(delegate);
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.geometry[i] = Rect::ZERO;
            self.transform[i] = Affine::IDENTITY;
            self.visible[i] = true;
            self.output_layer[i] = None;
            self.delegate[i] = delegate;
            self.effective_visible[i] = true;
            self.bounding_rect[i] = Rect::ZERO;
            self.repaints[i] = Region::new();
            self.traversal_pos[i] = INVALID;
            self.subtree_end[i] = INVALID;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.geometry.push(Rect::ZERO);
            self.transform.push(Affine::IDENTITY);
            self.visible.push(true);
            self.output_layer.push(None);
            self.delegate.push(delegate);
            self.effective_visible.push(true);
            self.bounding_rect.push(Rect::ZERO);
            self.repaints.push(Region::new());
            self.generation.push(0);
            self.traversal_pos.push(INVALID);
            self.subtree_end.push(INVALID);
            idx
        };

        self.traversal_dirty = true;
        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);

        self.id(idx)
    }

    /// Creates a layer as the topmost sublayer of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is stale.
    pub fn create_sublayer<D: RenderLayerDelegate + 'static>(
        &mut self,
        parent: LayerId,
        delegate: D,
    ) -> LayerId {
        self.validate(parent);
        let id = self.create_layer(delegate);
        self.add_sublayer(parent, id);
        id
    }

    /// Destroys a layer and its whole subtree, dropping their delegates.
    ///
    /// The area the subtree covered is repainted through the parent.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn destroy_layer(&mut self, id: LayerId) {
        self.validate(id);
        let idx = id.slot;

        if self.effective_visible[idx as usize] {
            let area = self.global_bounding_region(idx);
            self.expose(idx, area);
        }
        if self.parent[idx as usize] != INVALID {
            self.detach(idx);
        }

        let mut subtree = Vec::new();
        self.collect_subtree(idx, &mut subtree);
        for slot in subtree {
            let i = slot as usize;
            self.dirty.remove_key(slot);
            self.delegate[i] = Box::new(EmptyDelegate);
            self.repaints[i] = Region::new();
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.generation[i] = self.generation[i].wrapping_add(1);
            self.free_list.push(slot);
            self.pending_removed.push(slot);
        }
        self.traversal_dirty = true;
    }

    /// Returns whether the given handle refers to a live layer.
    #[must_use]
    pub fn is_alive(&self, id: LayerId) -> bool {
        (id.slot < self.len)
            && self.generation[id.slot as usize] == id.generation
            && !self.free_list.contains(&id.slot)
    }

    /// Returns the number of live layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.len as usize - self.free_list.len()
    }

    // -- Topology API --

    /// Adds `child` as the topmost sublayer of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale, if `child` already has a parent, or
    /// if `child` is `parent` or one of its ancestors.
    pub fn add_sublayer(&mut self, parent: LayerId, child: LayerId) {
        self.validate(parent);
        self.validate(child);
        let (p, c) = (parent.slot, child.slot);
        assert!(
            self.parent[c as usize] == INVALID,
            "layer already has a superlayer"
        );
        assert!(
            !self.is_ancestor_or_self(c, p),
            "adding the layer would create a cycle"
        );

        if self.effective_visible[c as usize] {
            let area = self.global_bounding_region(c);
            self.expose(c, area);
        }
        self.link_last(p, c);
        self.attach(p, c);
    }

    /// Inserts `child` directly beneath `sibling` in the sibling order.
    ///
    /// # Panics
    ///
    /// Panics if handles are stale, `child` already has a parent, or
    /// `sibling` has no parent.
    pub fn insert_below(&mut self, child: LayerId, sibling: LayerId) {
        self.validate(child);
        self.validate(sibling);
        let (c, s) = (child.slot, sibling.slot);
        assert!(
            self.parent[c as usize] == INVALID,
            "layer already has a superlayer"
        );
        let p = self.parent[s as usize];
        assert!(p != INVALID, "sibling has no superlayer");
        assert!(
            !self.is_ancestor_or_self(c, p),
            "adding the layer would create a cycle"
        );

        if self.effective_visible[c as usize] {
            let area = self.global_bounding_region(c);
            self.expose(c, area);
        }

        self.parent[c as usize] = p;
        self.next_sibling[c as usize] = s;
        self.prev_sibling[c as usize] = self.prev_sibling[s as usize];
        if self.prev_sibling[s as usize] != INVALID {
            self.next_sibling[self.prev_sibling[s as usize] as usize] = c;
        } else {
            self.first_child[p as usize] = c;
        }
        self.prev_sibling[s as usize] = c;

        self.attach(p, c);
    }

    /// Detaches `child` from its superlayer, making it a root.
    ///
    /// The area the subtree covered is repainted through the old parent.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the layer has no superlayer.
    pub fn remove_from_parent(&mut self, child: LayerId) {
        self.validate(child);
        let c = child.slot;
        assert!(
            self.parent[c as usize] != INVALID,
            "layer has no superlayer"
        );
        if self.effective_visible[c as usize] {
            let area = self.global_bounding_region(c);
            self.expose(c, area);
        }
        self.detach(c);
        self.update_effective_visibility(c);
    }

    /// Moves `child` to the top of `new_parent`'s sublayers.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale or if the move would create a cycle.
    pub fn reparent(&mut self, child: LayerId, new_parent: LayerId) {
        self.validate(child);
        self.validate(new_parent);
        if self.parent[child.slot as usize] != INVALID {
            self.remove_from_parent(child);
        }
        self.add_sublayer(new_parent, child);
    }

    /// Returns the superlayer of a layer, if any.
    #[must_use]
    pub fn superlayer(&self, id: LayerId) -> Option<LayerId> {
        self.validate(id);
        let p = self.parent[id.slot as usize];
        (p != INVALID).then(|| self.id(p))
    }

    /// Returns an iterator over the direct sublayers, bottom to top.
    #[must_use]
    pub fn sublayers(&self, id: LayerId) -> Sublayers<'_> {
        self.validate(id);
        Sublayers::new(self, self.first_child[id.slot as usize])
    }

    /// Returns all root layers (those without a superlayer).
    #[must_use]
    pub fn roots(&self) -> Vec<LayerId> {
        (0..self.len)
            .filter(|&idx| self.parent[idx as usize] == INVALID && !self.free_list.contains(&idx))
            .map(|idx| self.id(idx))
            .collect()
    }

    // -- Property getters --

    /// Returns the geometry of a layer in its parent's space.
    #[must_use]
    pub fn geometry(&self, id: LayerId) -> Rect {
        self.validate(id);
        self.geometry[id.slot as usize]
    }

    /// Returns the layer's own rectangle in local space.
    #[must_use]
    pub fn rect(&self, id: LayerId) -> Rect {
        self.validate(id);
        self.local_rect(id.slot)
    }

    /// Returns the local transform of a layer.
    #[must_use]
    pub fn transform(&self, id: LayerId) -> Affine {
        self.validate(id);
        self.transform[id.slot as usize]
    }

    /// Returns the bounding rect of the layer and all its sublayers, in
    /// local space.
    #[must_use]
    pub fn bounding_rect(&self, id: LayerId) -> Rect {
        self.validate(id);
        self.bounding_rect[id.slot as usize]
    }

    /// Returns the explicit visibility flag.
    #[must_use]
    pub fn is_visible(&self, id: LayerId) -> bool {
        self.validate(id);
        self.visible[id.slot as usize]
    }

    /// Returns whether the layer and all its ancestors are visible.
    #[must_use]
    pub fn is_effectively_visible(&self, id: LayerId) -> bool {
        self.validate(id);
        self.effective_visible[id.slot as usize]
    }

    /// Returns the output layer explicitly assigned to this layer.
    #[must_use]
    pub fn assigned_output_layer(&self, id: LayerId) -> Option<OutputLayerId> {
        self.validate(id);
        self.output_layer[id.slot as usize]
    }

    /// Returns the output layer this layer is composited on: its own
    /// assignment or, if unset, the nearest ancestor's.
    #[must_use]
    pub fn output_layer(&self, id: LayerId) -> Option<OutputLayerId> {
        self.validate(id);
        self.effective_output_layer(id.slot)
    }

    /// Returns the accumulated repaint region in local space.
    #[must_use]
    pub fn repaints(&self, id: LayerId) -> &Region {
        self.validate(id);
        &self.repaints[id.slot as usize]
    }

    /// Returns the layer's delegate.
    pub fn delegate_mut(&mut self, id: LayerId) -> &mut dyn RenderLayerDelegate {
        self.validate(id);
        self.delegate[id.slot as usize].as_mut()
    }

    // -- Property setters --

    /// Moves or resizes a layer.
    ///
    /// The area the subtree covered before is repainted through the parent
    /// (or directly in global space for roots) and the new area is repainted
    /// in full.
    pub fn set_geometry(&mut self, id: LayerId, geometry: Rect) {
        self.validate(id);
        let idx = id.slot;
        if self.geometry[idx as usize] == geometry {
            return;
        }
        self.reposition(idx, |tree| tree.geometry[idx as usize] = geometry);
    }

    /// Sets the local transform, applied around the layer's local origin.
    pub fn set_transform(&mut self, id: LayerId, transform: Affine) {
        self.validate(id);
        let idx = id.slot;
        if self.transform[idx as usize] == transform {
            return;
        }
        self.reposition(idx, |tree| tree.transform[idx as usize] = transform);
    }

    /// Shows or hides a layer and, through effective visibility, its
    /// subtree.
    pub fn set_visible(&mut self, id: LayerId, visible: bool) {
        self.validate(id);
        let idx = id.slot;
        if self.visible[idx as usize] == visible {
            return;
        }
        if !visible && self.effective_visible[idx as usize] {
            let area = self.global_bounding_region(idx);
            self.expose(idx, area);
        }
        self.visible[idx as usize] = visible;
        self.update_effective_visibility(idx);
        self.dirty.mark_with(idx, dirty::VISIBILITY, &EagerPolicy);
    }

    /// Assigns the layer (and sublayers without their own assignment) to an
    /// output layer, or back to the inherited one with `None`.
    ///
    /// The old area is repainted beneath the layer right away. Repainting
    /// the layer itself on its new plane is left to whoever evaluates the
    /// tree and finds it in [`LayerChanges::output_layers`](super::LayerChanges).
    pub fn set_output_layer(&mut self, id: LayerId, output_layer: Option<OutputLayerId>) {
        self.validate(id);
        let idx = id.slot;
        if self.output_layer[idx as usize] == output_layer {
            return;
        }
        if self.effective_visible[idx as usize] {
            let area = self.global_bounding_region(idx);
            self.expose(idx, area);
        }
        self.output_layer[idx as usize] = output_layer;
        self.request_frame(idx);
        self.dirty.mark_with(idx, dirty::OUTPUT_LAYER, &EagerPolicy);
    }

    /// Clears every assignment to `output_layer`, which no longer exists.
    ///
    /// Affected layers fall back to their inherited output layer and are
    /// reported by the next evaluation.
    pub fn forget_output_layer(&mut self, output_layer: OutputLayerId) {
        for idx in 0..self.len {
            if self.output_layer[idx as usize] == Some(output_layer)
                && !self.free_list.contains(&idx)
            {
                self.output_layer[idx as usize] = None;
                self.request_frame(idx);
                self.dirty.mark_with(idx, dirty::OUTPUT_LAYER, &EagerPolicy);
            }
        }
    }

    // -- Repaint API --

    /// Accumulates a repaint in local space and requests a frame.
    ///
    /// Ignored while the layer is not effectively visible.
    pub fn add_repaint(&mut self, id: LayerId, region: &Region) {
        self.validate(id);
        self.add_repaint_at(id.slot, region, true);
    }

    /// Repaints the layer's whole own rectangle.
    pub fn add_repaint_full(&mut self, id: LayerId) {
        self.validate(id);
        let rect = Region::from_rect(self.local_rect(id.slot));
        self.add_repaint_at(id.slot, &rect, true);
    }

    /// Accumulates a repaint given in global space.
    pub fn add_global_repaint(&mut self, id: LayerId, region: &Region) {
        self.validate(id);
        let local = self.map_region_from_global(id, region);
        self.add_repaint_at(id.slot, &local, true);
    }

    /// Accumulates a repaint without requesting a frame, so it is painted
    /// with whatever frame comes next.
    pub fn defer_repaint(&mut self, id: LayerId, region: &Region) {
        self.validate(id);
        self.add_repaint_at(id.slot, region, false);
    }

    /// Clears the accumulated repaint region.
    pub fn reset_repaints(&mut self, id: LayerId) {
        self.validate(id);
        self.repaints[id.slot as usize] = Region::new();
    }

    /// Returns and clears the area exposed by removed, hidden or moved root
    /// layers, in global space.
    pub fn take_exposed(&mut self) -> Region {
        core::mem::take(&mut self.exposed)
    }

    /// Returns whether a repaint was requested since the last call, and
    /// clears the flag.
    pub fn take_repaint_requested(&mut self) -> bool {
        core::mem::take(&mut self.repaint_requested)
    }

    // -- Coordinate mapping --

    /// Returns the mapping from the layer's local space to global space.
    #[must_use]
    pub fn global_transform(&self, id: LayerId) -> Affine {
        self.validate(id);
        self.to_global(id.slot)
    }

    /// Maps a local point to global space.
    #[must_use]
    pub fn map_to_global(&self, id: LayerId, point: Point) -> Point {
        self.validate(id);
        self.to_global(id.slot) * point
    }

    /// Maps a global point to the layer's local space.
    #[must_use]
    pub fn map_from_global(&self, id: LayerId, point: Point) -> Point {
        self.validate(id);
        self.to_global(id.slot).inverse() * point
    }

    /// Maps a local rect to global space (bounding box when rotated).
    #[must_use]
    pub fn map_rect_to_global(&self, id: LayerId, rect: Rect) -> Rect {
        self.validate(id);
        map_rect(self.to_global(id.slot), rect)
    }

    /// Maps a global rect to local space (bounding box when rotated).
    #[must_use]
    pub fn map_rect_from_global(&self, id: LayerId, rect: Rect) -> Rect {
        self.validate(id);
        map_rect(self.to_global(id.slot).inverse(), rect)
    }

    /// Maps a local region to global space.
    #[must_use]
    pub fn map_region_to_global(&self, id: LayerId, region: &Region) -> Region {
        self.validate(id);
        map_region(self.to_global(id.slot), region)
    }

    /// Maps a global region to local space.
    #[must_use]
    pub fn map_region_from_global(&self, id: LayerId, region: &Region) -> Region {
        self.validate(id);
        map_region(self.to_global(id.slot).inverse(), region)
    }

    /// Returns the bounding rect of the subtree in global space.
    #[must_use]
    pub fn global_bounding_rect(&self, id: LayerId) -> Rect {
        self.validate(id);
        map_rect(self.to_global(id.slot), self.bounding_rect[id.slot as usize])
    }

    // -- Raw-index access --

    /// Returns the handle of the live layer at raw slot `idx`, as found in
    /// [`LayerChanges`](super::LayerChanges) or
    /// [`traversal_order`](Self::traversal_order).
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    #[must_use]
    pub fn id_at(&self, idx: u32) -> LayerId {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
        self.id(idx)
    }

    // -- Internal helpers --

    pub(crate) fn id(&self, idx: u32) -> LayerId {
        LayerId {
            slot: idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Panics if the handle is stale.
    fn validate(&self, id: LayerId) {
        assert!(
            id.slot < self.len && self.generation[id.slot as usize] == id.generation,
            "stale LayerId: {id:?} (current gen: {})",
            if id.slot < self.len {
                self.generation[id.slot as usize]
            } else {
                u32::MAX
            }
        );
    }

    fn local_rect(&self, idx: u32) -> Rect {
        self.geometry[idx as usize].size().to_rect()
    }

    fn to_parent(&self, idx: u32) -> Affine {
        let origin = self.geometry[idx as usize].origin().to_vec2();
        Affine::translate(origin) * self.transform[idx as usize]
    }

    fn to_global(&self, idx: u32) -> Affine {
        let mut affine = self.to_parent(idx);
        let mut p = self.parent[idx as usize];
        while p != INVALID {
            affine = self.to_parent(p) * affine;
            p = self.parent[p as usize];
        }
        affine
    }

    fn global_bounding_region(&self, idx: u32) -> Region {
        Region::from_rect(map_rect(
            self.to_global(idx),
            self.bounding_rect[idx as usize],
        ))
    }

    fn effective_output_layer(&self, mut idx: u32) -> Option<OutputLayerId> {
        loop {
            if let Some(ol) = self.output_layer[idx as usize] {
                return Some(ol);
            }
            idx = self.parent[idx as usize];
            if idx == INVALID {
                return None;
            }
        }
    }

    fn is_ancestor_or_self(&self, ancestor: u32, mut idx: u32) -> bool {
        while idx != INVALID {
            if idx == ancestor {
                return true;
            }
            idx = self.parent[idx as usize];
        }
        false
    }

    fn add_repaint_at(&mut self, idx: u32, region: &Region, request_frame: bool) {
        if !self.effective_visible[idx as usize] || region.is_empty() {
            return;
        }
        self.repaints[idx as usize].add_region(region);
        if request_frame {
            self.repaint_requested = true;
        }
    }

    /// Requests a frame if `idx` is on screen.
    fn request_frame(&mut self, idx: u32) {
        if self.effective_visible[idx as usize] {
            self.repaint_requested = true;
        }
    }

    /// Repaints the whole subtree area of `idx` on the layer itself.
    fn repaint_bounds(&mut self, idx: u32) {
        let bounds = Region::from_rect(self.bounding_rect[idx as usize]);
        self.add_repaint_at(idx, &bounds, true);
    }

    /// Hands the global area `idx` used to cover to whoever paints beneath
    /// it: the parent, or the exposed region for roots.
    fn expose(&mut self, idx: u32, area: Region) {
        if area.is_empty() {
            return;
        }
        let p = self.parent[idx as usize];
        if p == INVALID {
            self.exposed.add_region(&area);
            self.repaint_requested = true;
        } else {
            let local = map_region(self.to_global(p).inverse(), &area);
            self.add_repaint_at(p, &local, true);
        }
    }

    /// Applies a geometry or transform change to `idx`.
    fn reposition(&mut self, idx: u32, apply: impl FnOnce(&mut Self)) {
        if self.effective_visible[idx as usize] {
            let area = self.global_bounding_region(idx);
            self.expose(idx, area);
        }
        apply(self);
        self.update_bounding_chain(idx);
        self.repaint_bounds(idx);
        self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy);
    }

    fn link_last(&mut self, p: u32, c: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }
    }

    /// Common tail of linking `c` under `p`.
    fn attach(&mut self, p: u32, c: u32) {
        let _ = self.dirty.add_dependency(c, p, dirty::GEOMETRY);
        let _ = self.dirty.add_dependency(c, p, dirty::VISIBILITY);
        let _ = self.dirty.add_dependency(c, p, dirty::OUTPUT_LAYER);

        self.update_bounding_chain(p);
        self.update_effective_visibility(c);
        self.repaint_bounds(c);

        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Unlinks `c` from its parent and refreshes the old ancestors.
    fn detach(&mut self, c: u32) {
        let p = self.parent[c as usize];
        self.unlink_from_parent(c);
        self.dirty.remove_dependency(c, p, dirty::GEOMETRY);
        self.dirty.remove_dependency(c, p, dirty::VISIBILITY);
        self.dirty.remove_dependency(c, p, dirty::OUTPUT_LAYER);

        self.update_bounding_chain(p);
        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    fn mark_subtree_inherited_dirty(&mut self, idx: u32) {
        self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy);
        self.dirty.mark_with(idx, dirty::VISIBILITY, &EagerPolicy);
        self.dirty.mark_with(idx, dirty::OUTPUT_LAYER, &EagerPolicy);
    }

    /// Recomputes the bounding rect of `idx` and every ancestor.
    fn update_bounding_chain(&mut self, mut idx: u32) {
        while idx != INVALID {
            let mut bounds = self.local_rect(idx);
            let mut child = self.first_child[idx as usize];
            while child != INVALID {
                bounds = bounds.union(map_rect(
                    self.to_parent(child),
                    self.bounding_rect[child as usize],
                ));
                child = self.next_sibling[child as usize];
            }
            self.bounding_rect[idx as usize] = bounds;
            idx = self.parent[idx as usize];
        }
    }

    /// Recomputes effective visibility of `idx`, descending only into
    /// subtrees whose state flipped. Newly visible layers are repainted,
    /// newly hidden ones drop their pending repaints.
    fn update_effective_visibility(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let parent_visible = p == INVALID || self.effective_visible[p as usize];
        let effective = parent_visible && self.visible[idx as usize];
        if effective == self.effective_visible[idx as usize] {
            return;
        }
        self.effective_visible[idx as usize] = effective;
        if effective {
            let rect = Region::from_rect(self.local_rect(idx));
            self.add_repaint_at(idx, &rect, true);
        } else {
            self.repaints[idx as usize] = Region::new();
        }
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            self.update_effective_visibility(child);
            child = self.next_sibling[child as usize];
        }
    }

    fn collect_subtree(&self, idx: u32, out: &mut Vec<u32>) {
        out.push(idx);
        let mut child = self.first_child[idx as usize];
        while child != INVALID {
            self.collect_subtree(child, out);
            child = self.next_sibling[child as usize];
        }
    }
}

fn translation_only(affine: Affine) -> Option<Vec2> {
    let [a, b, c, d, e, f] = affine.as_coeffs();
    (a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0).then_some(Vec2::new(e, f))
}

fn map_rect(affine: Affine, rect: Rect) -> Rect {
    match translation_only(affine) {
        Some(offset) => rect + offset,
        None => affine.transform_rect_bbox(rect),
    }
}

fn map_region(affine: Affine, region: &Region) -> Region {
    match translation_only(affine) {
        Some(offset) => region.translate(offset),
        None if affine.determinant() == 0.0 => Region::new(),
        None => region.transform_bbox(affine),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::EmptyDelegate;

    fn r(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect::new(x0, y0, x1, y1)
    }

    fn region(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        Region::from_rect(r(x0, y0, x1, y1))
    }

    /// Root at the origin covering 100×100 with one 10×10 child at (10, 10).
    fn root_with_child() -> (RenderLayerTree, LayerId, LayerId) {
        let mut tree = RenderLayerTree::new();
        let root = tree.create_layer(EmptyDelegate);
        tree.set_geometry(root, r(0.0, 0.0, 100.0, 100.0));
        let child = tree.create_sublayer(root, EmptyDelegate);
        tree.set_geometry(child, r(10.0, 10.0, 20.0, 20.0));
        tree.reset_repaints(root);
        tree.reset_repaints(child);
        let _ = tree.take_exposed();
        let _ = tree.take_repaint_requested();
        (tree, root, child)
    }

    #[test]
    fn create_and_destroy() {
        let mut tree = RenderLayerTree::new();
        let id = tree.create_layer(EmptyDelegate);
        assert!(tree.is_alive(id));
        tree.destroy_layer(id);
        assert!(!tree.is_alive(id));
        assert_eq!(tree.layer_count(), 0);
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut tree = RenderLayerTree::new();
        let id1 = tree.create_layer(EmptyDelegate);
        tree.destroy_layer(id1);
        let id2 = tree.create_layer(EmptyDelegate);
        assert!(!tree.is_alive(id1));
        assert!(tree.is_alive(id2));
        assert_eq!(id1.index(), id2.index());
        assert_ne!(id1.generation(), id2.generation());
    }

    #[test]
    #[should_panic(expected = "stale LayerId")]
    fn destroyed_handle_panics_on_geometry() {
        let mut tree = RenderLayerTree::new();
        let id = tree.create_layer(EmptyDelegate);
        tree.destroy_layer(id);
        let _ = tree.geometry(id);
    }

    #[test]
    fn destroy_takes_the_subtree() {
        let (mut tree, root, child) = root_with_child();
        let grandchild = tree.create_sublayer(child, EmptyDelegate);
        tree.destroy_layer(child);

        assert!(!tree.is_alive(child));
        assert!(!tree.is_alive(grandchild));
        assert!(tree.sublayers(root).next().is_none());
        assert_eq!(
            tree.repaints(root),
            &region(10.0, 10.0, 20.0, 20.0),
            "vacated area is repainted by the parent"
        );
    }

    #[test]
    fn sublayers_keep_stacking_order() {
        let (mut tree, root, a) = root_with_child();
        let c = tree.create_sublayer(root, EmptyDelegate);
        let b = tree.create_layer(EmptyDelegate);
        tree.insert_below(b, c);

        let order: Vec<_> = tree.sublayers(root).collect();
        assert_eq!(order, vec![a, b, c]);
        assert_eq!(tree.superlayer(b), Some(root));
        assert_eq!(tree.roots(), vec![root]);
    }

    #[test]
    #[should_panic(expected = "cycle")]
    fn adding_an_ancestor_panics() {
        let (mut tree, root, child) = root_with_child();
        tree.remove_from_parent(child);
        tree.add_sublayer(child, root);
        tree.add_sublayer(root, child);
    }

    #[test]
    fn reparent_moves_between_parents() {
        let (mut tree, root, child) = root_with_child();
        let other = tree.create_sublayer(root, EmptyDelegate);
        tree.reparent(child, other);
        assert_eq!(tree.superlayer(child), Some(other));
        assert_eq!(tree.sublayers(root).collect::<Vec<_>>(), vec![other]);
    }

    #[test]
    fn bounding_rect_includes_sublayers() {
        let (mut tree, root, child) = root_with_child();
        tree.set_geometry(child, r(90.0, 90.0, 150.0, 120.0));
        assert_eq!(tree.bounding_rect(root), r(0.0, 0.0, 150.0, 120.0));

        tree.remove_from_parent(child);
        assert_eq!(tree.bounding_rect(root), r(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn moving_a_layer_repaints_old_and_new_area() {
        let (mut tree, root, child) = root_with_child();
        tree.set_geometry(child, r(50.0, 50.0, 60.0, 60.0));

        assert_eq!(tree.repaints(root), &region(10.0, 10.0, 20.0, 20.0));
        assert_eq!(tree.repaints(child), &region(0.0, 0.0, 10.0, 10.0));
        assert!(tree.take_repaint_requested());
        assert!(!tree.take_repaint_requested(), "flag is cleared");
    }

    #[test]
    fn moving_a_root_exposes_its_old_area() {
        let (mut tree, root, _) = root_with_child();
        tree.set_geometry(root, r(5.0, 0.0, 105.0, 100.0));
        assert_eq!(tree.take_exposed(), region(0.0, 0.0, 100.0, 100.0));
        assert!(tree.take_exposed().is_empty());
    }

    #[test]
    fn hidden_layers_ignore_repaints() {
        let (mut tree, root, child) = root_with_child();
        tree.set_visible(root, false);
        assert!(!tree.is_effectively_visible(child));
        assert!(tree.is_visible(child));

        tree.add_repaint(child, &region(0.0, 0.0, 5.0, 5.0));
        assert!(tree.repaints(child).is_empty());

        tree.set_visible(root, true);
        assert!(tree.is_effectively_visible(child));
        assert_eq!(
            tree.repaints(child),
            &region(0.0, 0.0, 10.0, 10.0),
            "becoming visible repaints the layer"
        );
    }

    #[test]
    fn hiding_a_layer_repaints_beneath_it() {
        let (mut tree, root, child) = root_with_child();
        tree.add_repaint(child, &region(0.0, 0.0, 5.0, 5.0));
        tree.set_visible(child, false);
        assert!(tree.repaints(child).is_empty(), "pending repaints are dropped");
        assert_eq!(tree.repaints(root), &region(10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn global_mapping_follows_ancestors() {
        let (mut tree, root, child) = root_with_child();
        tree.set_geometry(root, r(100.0, 50.0, 200.0, 150.0));
        let p = tree.map_to_global(child, Point::new(1.0, 2.0));
        assert_eq!(p, Point::new(111.0, 62.0));
        assert_eq!(tree.map_from_global(child, p), Point::new(1.0, 2.0));
        assert_eq!(
            tree.map_region_to_global(child, &region(0.0, 0.0, 10.0, 10.0)),
            region(110.0, 60.0, 120.0, 70.0)
        );
    }

    #[test]
    fn global_repaint_is_mapped_to_local_space() {
        let (mut tree, _, child) = root_with_child();
        tree.add_global_repaint(child, &region(12.0, 12.0, 14.0, 14.0));
        assert_eq!(tree.repaints(child), &region(2.0, 2.0, 4.0, 4.0));
    }

    #[test]
    fn scaled_transform_maps_bounding_boxes() {
        let (mut tree, root, child) = root_with_child();
        tree.set_transform(child, Affine::scale(2.0));
        assert_eq!(
            tree.map_rect_to_global(child, r(0.0, 0.0, 10.0, 10.0)),
            r(10.0, 10.0, 30.0, 30.0)
        );
        assert_eq!(tree.global_bounding_rect(child), r(10.0, 10.0, 30.0, 30.0));
        assert_eq!(tree.bounding_rect(root), r(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn deferred_repaint_does_not_request_a_frame() {
        let (mut tree, root, _) = root_with_child();
        tree.defer_repaint(root, &region(0.0, 0.0, 1.0, 1.0));
        assert!(!tree.take_repaint_requested());
        assert_eq!(tree.repaints(root), &region(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn output_layer_is_inherited() {
        let (mut tree, root, child) = root_with_child();
        tree.set_output_layer(root, Some(OutputLayerId(1)));
        assert_eq!(tree.output_layer(child), Some(OutputLayerId(1)));
        assert_eq!(tree.assigned_output_layer(child), None);

        tree.set_output_layer(child, Some(OutputLayerId(2)));
        assert_eq!(tree.output_layer(child), Some(OutputLayerId(2)));

        let _ = tree.evaluate();
        let _ = tree.take_repaint_requested();
        tree.forget_output_layer(OutputLayerId(2));
        assert_eq!(tree.output_layer(child), Some(OutputLayerId(1)));
        assert!(tree.take_repaint_requested());
        assert!(tree.evaluate().output_layers.contains(&child.index()));
    }

    #[test]
    fn visibility_propagates_through_every_level() {
        let (mut tree, root, child) = root_with_child();
        let grandchild = tree.create_sublayer(child, EmptyDelegate);
        tree.set_visible(grandchild, false);

        tree.set_visible(root, false);
        assert!(!tree.is_effectively_visible(child));
        assert!(!tree.is_effectively_visible(grandchild));

        tree.set_visible(root, true);
        assert!(tree.is_effectively_visible(child));
        assert!(
            !tree.is_effectively_visible(grandchild),
            "explicitly hidden layer stays hidden"
        );

        tree.set_visible(grandchild, true);
        tree.set_visible(root, false);
        tree.set_visible(root, true);
        assert!(tree.is_effectively_visible(grandchild));
    }

    #[test]
    fn reset_repaints_is_idempotent() {
        let (mut tree, _, child) = root_with_child();
        tree.add_repaint_full(child);
        assert!(!tree.repaints(child).is_empty());
        tree.reset_repaints(child);
        assert!(tree.repaints(child).is_empty());
        tree.reset_repaints(child);
        assert!(tree.repaints(child).is_empty());
    }
}
