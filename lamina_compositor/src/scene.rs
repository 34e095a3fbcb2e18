// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-output scene and frame painting.
//!
//! A [`Scene`] owns the render-layer tree of one output. Its root layer
//! spans the output's global geometry and is composited on the output's
//! primary output layer; sublayers may be moved onto other planes with
//! [`RenderLayerTree::set_output_layer`].
//!
//! [`Scene::paint`] runs one frame:
//!
//! 1. **Collect**: evaluate the tree and gather the repaints of visible
//!    layers into per-plane damage, clipped to the output.
//! 2. **Pre-paint**: open a frame on every damaged plane, then walk layers
//!    front to back. Delegates may grow the paint region or occlude what
//!    lies beneath them.
//! 3. **Paint**: walk back to front and draw every layer that intersects
//!    the paint region of its plane.
//! 4. **Post-paint**: delegates queue follow-up repaints, which are applied
//!    to the tree once the traversal is over.
//! 5. **Present**: close every opened frame and hand the output to the
//!    backend.
//!
//! Damage of a frame that fails is kept and painted with the next frame.

use kurbo::{Affine, Rect};
use lamina_core::backend::OutputBackend;
use lamina_core::delegate::{EmptyDelegate, PaintContext, PaintData, RepaintQueue, RepaintRequest};
use lamina_core::layer::{LayerChanges, LayerId, RenderLayerTree};
use lamina_core::output::{Output, OutputId};
use lamina_core::output_layer::OutputLayerId;
use lamina_core::region::Region;
use lamina_core::render_loop::FrameRequest;
use lamina_core::time::HostTime;
use lamina_core::trace::{
    DamageEvent, FrameCompleteEvent, FrameOutcome, FrameStartEvent, FrameSummaryBuilder,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, Tracer,
};

use crate::clock::Clock;

/// How a call to [`Scene::paint`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaintOutcome {
    /// The frame was handed to the backend; a presentation event follows.
    Submitted,
    /// Nothing was damaged. No output layer was touched.
    Skipped,
    /// An output layer or the backend failed. The damage is kept.
    Failed,
}

/// Paint state of one output layer during a frame.
#[derive(Debug)]
struct PlaneFrame {
    id: OutputLayerId,
    geometry: Rect,
    scale: f64,
    partial: bool,
    damage: Region,
    paint: Region,
    occluded: Region,
    acquired: bool,
}

impl PlaneFrame {
    fn new(id: OutputLayerId) -> Self {
        Self {
            id,
            geometry: Rect::ZERO,
            scale: 1.0,
            partial: true,
            damage: Region::new(),
            paint: Region::new(),
            occluded: Region::new(),
            acquired: false,
        }
    }

    /// Maps global space to buffer pixels of this plane.
    fn global_to_target(&self) -> Affine {
        Affine::scale(self.scale) * Affine::translate(-self.geometry.origin().to_vec2())
    }
}

/// A layer taking part in the current frame.
#[derive(Debug)]
struct LayerPaint {
    layer: LayerId,
    plane: usize,
    global: Rect,
    data: PaintData,
}

/// Damage of a frame awaiting presentation.
#[derive(Debug)]
struct InFlight {
    frame_index: u64,
    damage: Vec<(OutputLayerId, Region)>,
}

/// The render-layer tree of one output and the machinery to paint it.
#[derive(Debug)]
pub struct Scene {
    output: OutputId,
    tree: RenderLayerTree,
    root: LayerId,
    primary: OutputLayerId,
    available: Vec<OutputLayerId>,
    changes: LayerChanges,
    repaint_queue: RepaintQueue,
    order: Vec<u32>,
    planes: Vec<PlaneFrame>,
    layers: Vec<LayerPaint>,
    restored: Vec<(OutputLayerId, Region)>,
    in_flight: Option<InFlight>,
}

impl Scene {
    /// Creates a scene for `output` whose root layer covers the output and
    /// is composited on `primary`.
    #[must_use]
    pub fn new(output: &Output, primary: OutputLayerId) -> Self {
        let mut tree = RenderLayerTree::new();
        let root = tree.create_layer(EmptyDelegate);
        tree.set_geometry(root, output.geometry());
        tree.set_output_layer(root, Some(primary));
        Self {
            output: output.id(),
            tree,
            root,
            primary,
            available: Vec::new(),
            changes: LayerChanges::default(),
            repaint_queue: RepaintQueue::new(),
            order: Vec::new(),
            planes: Vec::new(),
            layers: Vec::new(),
            restored: Vec::new(),
            in_flight: None,
        }
    }

    /// Output this scene belongs to.
    #[must_use]
    pub fn output(&self) -> OutputId {
        self.output
    }

    /// Root layer. Content layers are added as its sublayers.
    #[must_use]
    pub fn root(&self) -> LayerId {
        self.root
    }

    /// Output layer the root is composited on.
    #[must_use]
    pub fn primary_output_layer(&self) -> OutputLayerId {
        self.primary
    }

    /// The render-layer tree.
    #[must_use]
    pub fn tree(&self) -> &RenderLayerTree {
        &self.tree
    }

    /// The render-layer tree, for window management.
    pub fn tree_mut(&mut self) -> &mut RenderLayerTree {
        &mut self.tree
    }

    /// Frame index of the frame awaiting presentation, if any.
    #[must_use]
    pub fn frame_in_flight(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|f| f.frame_index)
    }

    /// Resizes the root layer after the output's geometry changed and
    /// repaints it.
    pub fn set_output_geometry(&mut self, geometry: Rect) {
        self.tree.set_geometry(self.root, geometry);
        self.tree.add_repaint_full(self.root);
    }

    /// Drops every reference to an output layer that no longer exists.
    pub fn forget_output_layer(&mut self, output_layer: OutputLayerId) {
        self.tree.forget_output_layer(output_layer);
        self.restored.retain(|(id, _)| *id != output_layer);
        if self.primary == output_layer {
            tracing::warn!(output = ?self.output, "primary output layer removed");
        }
    }

    /// Paints `frame`.
    ///
    /// `output`'s render loop must be painting this frame; it is moved on to
    /// waiting for presentation, or back to idle when the frame is skipped
    /// or fails.
    pub fn paint(
        &mut self,
        output: &mut Output,
        backend: &mut dyn OutputBackend,
        frame: &FrameRequest,
        clock: &dyn Clock,
        tracer: &mut Tracer<'_>,
    ) -> PaintOutcome {
        debug_assert_eq!(output.id(), self.output, "scene painted for another output");
        let start = FrameStartEvent::new(self.output, frame, clock.now());
        tracer.frame_start(&start);
        let mut trace = FrameTrace {
            tracer,
            summary: FrameSummaryBuilder::new(&start),
            frame_index: frame.frame_index,
            output: self.output,
        };

        // -- Collect --
        trace.begin(PhaseKind::Collect, clock.now());
        self.collect_damage(output.geometry(), backend);
        trace.end(PhaseKind::Collect, clock.now());

        if self.planes.is_empty() {
            let now = clock.now();
            output.render_loop_mut().notify_frame_skipped(now);
            tracing::trace!(output = ?self.output, frame = frame.frame_index, "no damage, frame skipped");
            trace.summary.set_skipped(true);
            trace.finish(FrameOutcome::Skipped, frame.target_presentation);
            return PaintOutcome::Skipped;
        }

        // -- Pre-paint --
        trace.begin(PhaseKind::PrePaint, clock.now());
        let mut failed = self.begin_planes(backend);
        self.pre_paint(frame);
        for plane in self.planes.iter().filter(|p| p.acquired) {
            tracing::trace!(
                output = ?self.output,
                output_layer = ?plane.id,
                damage = ?plane.damage.bounding_rect(),
                paint = ?plane.paint.bounding_rect(),
                "plane damage"
            );
            trace.tracer.damage(&DamageEvent {
                frame_index: frame.frame_index,
                output_layer: plane.id,
                rect_count: u32::try_from(plane.paint.rects().len()).unwrap_or(u32::MAX),
                bounds: plane.paint.bounding_rect(),
            });
        }
        trace.end(PhaseKind::PrePaint, clock.now());

        // -- Paint --
        trace.begin(PhaseKind::Paint, clock.now());
        let painted = self.paint_layers(backend);
        for _ in 0..painted {
            trace.summary.add_painted_layer();
        }
        trace.end(PhaseKind::Paint, clock.now());

        // -- Post-paint --
        trace.begin(PhaseKind::PostPaint, clock.now());
        for entry in &self.layers {
            let mut ctx =
                PaintContext::new(entry.layer, frame.target_presentation, &mut self.repaint_queue);
            self.tree.delegate_mut(entry.layer).post_paint(&mut ctx);
        }
        self.apply_repaint_requests();
        trace.end(PhaseKind::PostPaint, clock.now());

        // -- Present --
        trace.begin(PhaseKind::Present, clock.now());
        let mut damage = Vec::with_capacity(self.planes.len());
        for plane in &self.planes {
            let Some(layer) = backend.output_layer(plane.id) else {
                failed = true;
                continue;
            };
            let committed = if plane.acquired {
                layer.end_frame(&plane.paint, &plane.damage)
            } else {
                layer.end_frame(&Region::new(), &Region::new())
            };
            if !committed {
                tracing::warn!(output = ?self.output, output_layer = ?plane.id, "output layer commit failed");
                failed = true;
            }
            damage.push((plane.id, plane.damage.clone()));
        }

        let now = clock.now();
        if failed {
            output.render_loop_mut().notify_frame_failed(now);
            self.restored.extend(damage);
            trace.end(PhaseKind::Present, now);
            trace.finish(FrameOutcome::Failed, now);
            return PaintOutcome::Failed;
        }

        output.render_loop_mut().end_frame(now);
        let outcome = match backend.present(self.output, frame, now) {
            Ok(()) => {
                self.in_flight = Some(InFlight {
                    frame_index: frame.frame_index,
                    damage,
                });
                PaintOutcome::Submitted
            }
            Err(err) => {
                tracing::warn!(output = ?self.output, frame = frame.frame_index, %err, "present failed");
                output.render_loop_mut().notify_frame_failed(now);
                self.restored.extend(damage);
                PaintOutcome::Failed
            }
        };
        trace.end(PhaseKind::Present, clock.now());
        match outcome {
            PaintOutcome::Failed => trace.finish(FrameOutcome::Failed, now),
            _ => trace.finish_summary(),
        }
        outcome
    }

    /// Records that `frame_index` reached the screen.
    pub fn frame_presented(&mut self, frame_index: u64, timestamp: HostTime, tracer: &mut Tracer<'_>) {
        if self.in_flight.as_ref().is_some_and(|f| f.frame_index == frame_index) {
            self.in_flight = None;
        }
        tracer.frame_complete(&FrameCompleteEvent {
            frame_index,
            output: self.output,
            outcome: FrameOutcome::Presented,
            timestamp,
        });
    }

    /// Records that `frame_index` was dropped by the display pipeline. Its
    /// damage is painted with the next frame, without requesting one.
    pub fn frame_failed(&mut self, frame_index: u64, now: HostTime, tracer: &mut Tracer<'_>) {
        if let Some(in_flight) = self.in_flight.take_if(|f| f.frame_index == frame_index) {
            self.restored.extend(in_flight.damage);
        }
        tracer.frame_complete(&FrameCompleteEvent {
            frame_index,
            output: self.output,
            outcome: FrameOutcome::Failed,
            timestamp: now,
        });
    }

    // -- Internal helpers --

    fn resolve_plane(&self, id: LayerId) -> OutputLayerId {
        self.tree
            .output_layer(id)
            .filter(|ol| self.available.contains(ol))
            .unwrap_or(self.primary)
    }

    fn plane_mut(&mut self, id: OutputLayerId) -> &mut PlaneFrame {
        let pos = match self.planes.iter().position(|p| p.id == id) {
            Some(pos) => pos,
            None => {
                self.planes.push(PlaneFrame::new(id));
                self.planes.len() - 1
            }
        };
        &mut self.planes[pos]
    }

    fn collect_damage(&mut self, output_rect: Rect, backend: &mut dyn OutputBackend) {
        self.tree.evaluate_into(&mut self.changes);
        if !self.changes.is_empty() {
            tracing::trace!(
                output = ?self.output,
                geometry = self.changes.geometry.len(),
                output_layers = self.changes.output_layers.len(),
                added = self.changes.added.len(),
                removed = self.changes.removed.len(),
                "layer tree changed"
            );
        }
        // Layers that moved to another plane are drawn there in full.
        for &idx in &self.changes.output_layers {
            let id = self.tree.id_at(idx);
            if self.tree.is_alive(id) {
                let full = Region::from_rect(self.tree.rect(id));
                self.tree.defer_repaint(id, &full);
            }
        }
        self.available = backend.output_layers(self.output);
        self.planes.clear();

        for (id, region) in core::mem::take(&mut self.restored) {
            self.plane_mut(id).damage.add_region(&region);
        }
        let exposed = self.tree.take_exposed().intersect_rect(output_rect);
        if !exposed.is_empty() {
            let primary = self.primary;
            self.plane_mut(primary).damage.add_region(&exposed);
        }

        self.order.clear();
        self.order.extend_from_slice(self.tree.subtree_order(self.root));
        let order = core::mem::take(&mut self.order);
        for &idx in &order {
            let id = self.tree.id_at(idx);
            if self.tree.repaints(id).is_empty() {
                continue;
            }
            if self.tree.is_effectively_visible(id) {
                let global = self
                    .tree
                    .map_region_to_global(id, self.tree.repaints(id))
                    .intersect_rect(output_rect);
                if !global.is_empty() {
                    let plane = self.resolve_plane(id);
                    self.plane_mut(plane).damage.add_region(&global);
                }
            }
            self.tree.reset_repaints(id);
        }
        self.order = order;

        for plane in &mut self.planes {
            match backend.output_layer(plane.id) {
                Some(layer) => {
                    plane.geometry = layer.geometry();
                    plane.scale = layer.scale();
                    plane.partial = layer.supports_partial_update();
                    plane.damage = plane.damage.intersect_rect(plane.geometry);
                }
                None => plane.damage = Region::new(),
            }
        }
        self.planes.retain(|p| !p.damage.is_empty());
    }

    /// Opens a frame on every damaged plane. Returns `true` if a plane had
    /// no buffer.
    fn begin_planes(&mut self, backend: &mut dyn OutputBackend) -> bool {
        let mut failed = false;
        for plane in &mut self.planes {
            let Some(layer) = backend.output_layer(plane.id) else {
                continue;
            };
            match layer.begin_frame() {
                Some(info) => {
                    plane.acquired = true;
                    plane.paint = if plane.partial {
                        plane
                            .damage
                            .union(&info.repaint)
                            .intersect_rect(plane.geometry)
                    } else {
                        Region::from_rect(plane.geometry)
                    };
                }
                None => {
                    tracing::warn!(output = ?self.output, output_layer = ?plane.id, "no buffer available");
                    failed = true;
                }
            }
        }
        failed
    }

    fn pre_paint(&mut self, frame: &FrameRequest) {
        self.layers.clear();
        let order = core::mem::take(&mut self.order);
        for &idx in order.iter().rev() {
            let id = self.tree.id_at(idx);
            if !self.tree.is_effectively_visible(id) {
                continue;
            }
            let bounds = self.tree.rect(id);
            if bounds.is_zero_area() {
                continue;
            }
            let plane_id = self.resolve_plane(id);
            let Some(pi) = self
                .planes
                .iter()
                .position(|p| p.id == plane_id && p.acquired)
            else {
                continue;
            };
            let to_global = self.tree.global_transform(id);
            let global = self.tree.map_rect_to_global(id, bounds);
            let plane = &mut self.planes[pi];
            if Region::from_rect(global.intersect(plane.geometry))
                .subtract(&plane.occluded)
                .is_empty()
            {
                continue;
            }

            let mut data = PaintData {
                frame_index: frame.frame_index,
                presentation_time: frame.target_presentation,
                bounds,
                layer_to_target: plane.global_to_target() * to_global,
                region: plane.paint.clone(),
            };
            let mut ctx = PaintContext::new(id, frame.target_presentation, &mut self.repaint_queue);
            let flow = self.tree.delegate_mut(id).pre_paint(&mut data, &mut ctx);

            let grown = data
                .region
                .intersect_rect(plane.geometry)
                .subtract(&plane.paint);
            if !grown.is_empty() {
                plane.damage.add_region(&grown);
                plane.paint.add_region(&grown);
            }
            if flow.is_break() {
                plane.occluded.add_rect(global);
            }
            self.layers.push(LayerPaint {
                layer: id,
                plane: pi,
                global,
                data,
            });
        }
        self.order = order;
    }

    /// Draws the participating layers back to front. Returns the number of
    /// layers drawn.
    fn paint_layers(&mut self, backend: &mut dyn OutputBackend) -> usize {
        for plane in self.planes.iter().filter(|p| p.acquired) {
            let Some(target) = backend
                .output_layer(plane.id)
                .and_then(|layer| layer.render_target())
            else {
                continue;
            };
            if plane.partial {
                let clip = plane.paint.transform_bbox(plane.global_to_target());
                target.set_clip(Some(&clip));
            } else {
                target.set_clip(None);
            }
        }

        let mut painted = 0;
        for entry in self.layers.iter_mut().rev() {
            let plane = &self.planes[entry.plane];
            if !plane.paint.intersects_rect(entry.global) {
                continue;
            }
            let Some(target) = backend
                .output_layer(plane.id)
                .and_then(|layer| layer.render_target())
            else {
                continue;
            };
            entry.data.region.clone_from(&plane.paint);
            self.tree.delegate_mut(entry.layer).paint(target, &entry.data);
            painted += 1;
        }
        painted
    }

    fn apply_repaint_requests(&mut self) {
        for request in self.repaint_queue.drain() {
            match request {
                RepaintRequest::Local { layer, region } if self.tree.is_alive(layer) => {
                    self.tree.add_repaint(layer, &region);
                }
                RepaintRequest::Full(layer) if self.tree.is_alive(layer) => {
                    self.tree.add_repaint_full(layer);
                }
                RepaintRequest::Global { layer, region } if self.tree.is_alive(layer) => {
                    self.tree.add_global_repaint(layer, &region);
                }
                request => {
                    tracing::debug!(?request, "repaint request for a destroyed layer dropped");
                }
            }
        }
    }
}

/// Phase bookkeeping for one frame.
struct FrameTrace<'t, 's> {
    tracer: &'t mut Tracer<'s>,
    summary: FrameSummaryBuilder,
    frame_index: u64,
    output: OutputId,
}

impl FrameTrace<'_, '_> {
    fn begin(&mut self, phase: PhaseKind, timestamp: HostTime) {
        self.summary.phase_begin(phase, timestamp);
        self.tracer.phase_begin(&PhaseBeginEvent {
            frame_index: self.frame_index,
            phase,
            timestamp,
        });
    }

    fn end(&mut self, phase: PhaseKind, timestamp: HostTime) {
        self.summary.phase_end(phase, timestamp);
        self.tracer.phase_end(&PhaseEndEvent {
            frame_index: self.frame_index,
            phase,
            timestamp,
        });
    }

    fn finish(self, outcome: FrameOutcome, timestamp: HostTime) {
        self.tracer.frame_complete(&FrameCompleteEvent {
            frame_index: self.frame_index,
            output: self.output,
            outcome,
            timestamp,
        });
        self.finish_summary();
    }

    fn finish_summary(self) {
        self.tracer.frame_summary(&self.summary.finish());
    }
}
