// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content contract for render layers.
//!
//! Every render layer owns one [`RenderLayerDelegate`] that draws its content.
//! The scene drives delegates through three passes per frame:
//!
//! 1. **Pre-paint**, front to back. A delegate may grow the paint region or
//!    return [`ControlFlow::Break`] to declare its own rectangle opaque.
//!    Layers beneath it on the same output layer are then skipped where
//!    that rectangle covers them, for this frame only.
//! 2. **Paint**, back to front, into the output layer's [`RenderTarget`].
//! 3. **Post-paint**, where animations request their next frame through
//!    [`PaintContext`]. Those requests are queued and applied once the
//!    traversal is over, so they land in the next frame.

use core::fmt;
use core::ops::ControlFlow;

use kurbo::{Affine, Rect};

use crate::layer::LayerId;
use crate::output_layer::{Argb32, RenderTarget};
use crate::region::Region;
use crate::time::HostTime;

/// Per-layer frame parameters handed to delegates.
#[derive(Clone, Debug)]
pub struct PaintData {
    /// Frame counter of the output's render loop.
    pub frame_index: u64,
    /// Predicted presentation time, the time animations should sample.
    pub presentation_time: HostTime,
    /// The layer's own rectangle in local coordinates.
    pub bounds: Rect,
    /// Maps layer-local coordinates to render target pixels.
    pub layer_to_target: Affine,
    /// Area to repaint, in global compositor space. Pre-paint may grow it.
    pub region: Region,
}

/// Repaint requested by a delegate during a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum RepaintRequest {
    /// Repaint part of a layer, in that layer's local space.
    Local {
        /// Layer to repaint.
        layer: LayerId,
        /// Area in local coordinates.
        region: Region,
    },
    /// Repaint a whole layer.
    Full(LayerId),
    /// Repaint an area of a layer given in global space.
    Global {
        /// Layer that receives the repaint.
        layer: LayerId,
        /// Area in global coordinates.
        region: Region,
    },
}

/// Repaint requests collected during one frame.
#[derive(Clone, Debug, Default)]
pub struct RepaintQueue {
    requests: Vec<RepaintRequest>,
}

impl RepaintQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request.
    pub fn push(&mut self, request: RepaintRequest) {
        self.requests.push(request);
    }

    /// Returns `true` if no request is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Removes and returns all queued requests in submission order.
    pub fn drain(&mut self) -> impl Iterator<Item = RepaintRequest> + '_ {
        self.requests.drain(..)
    }
}

/// What a delegate may do to the scene while it is being painted.
pub struct PaintContext<'a> {
    layer: LayerId,
    presentation_time: HostTime,
    queue: &'a mut RepaintQueue,
}

impl fmt::Debug for PaintContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaintContext")
            .field("layer", &self.layer)
            .field("presentation_time", &self.presentation_time)
            .finish_non_exhaustive()
    }
}

impl<'a> PaintContext<'a> {
    /// Creates a context for `layer` that queues requests into `queue`.
    #[must_use]
    pub fn new(layer: LayerId, presentation_time: HostTime, queue: &'a mut RepaintQueue) -> Self {
        Self {
            layer,
            presentation_time,
            queue,
        }
    }

    /// The layer whose delegate is being called.
    #[must_use]
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Predicted presentation time of the frame.
    #[must_use]
    pub fn presentation_time(&self) -> HostTime {
        self.presentation_time
    }

    /// Requests a repaint of part of the current layer (local space).
    pub fn add_repaint(&mut self, region: Region) {
        self.queue.push(RepaintRequest::Local {
            layer: self.layer,
            region,
        });
    }

    /// Requests a repaint of the whole current layer.
    pub fn add_repaint_full(&mut self) {
        self.queue.push(RepaintRequest::Full(self.layer));
    }

    /// Requests a repaint of part of another layer (that layer's local
    /// space).
    pub fn add_repaint_to(&mut self, layer: LayerId, region: Region) {
        self.queue.push(RepaintRequest::Local { layer, region });
    }

    /// Requests a repaint of a global area through the current layer.
    pub fn add_global_repaint(&mut self, region: Region) {
        self.queue.push(RepaintRequest::Global {
            layer: self.layer,
            region,
        });
    }
}

/// Draws the content of one render layer.
pub trait RenderLayerDelegate {
    /// Called front to back before painting. Returning
    /// [`ControlFlow::Break`] marks the layer's own rectangle, mapped to
    /// global space, as opaque for the current frame. Layers further back on
    /// the same output layer that lie entirely inside the occluded area are
    /// not painted. Sublayers and other planes are unaffected.
    fn pre_paint(&mut self, data: &mut PaintData, ctx: &mut PaintContext<'_>) -> ControlFlow<()> {
        _ = (data, ctx);
        ControlFlow::Continue(())
    }

    /// Draws the layer into `target`.
    fn paint(&mut self, target: &mut dyn RenderTarget, data: &PaintData);

    /// Called after all layers were painted.
    fn post_paint(&mut self, ctx: &mut PaintContext<'_>) {
        _ = ctx;
    }
}

/// A delegate that paints nothing, for grouping layers.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyDelegate;

impl RenderLayerDelegate for EmptyDelegate {
    fn paint(&mut self, target: &mut dyn RenderTarget, data: &PaintData) {
        _ = (target, data);
    }
}

/// A delegate that fills its layer with a solid color.
#[derive(Clone, Copy, Debug)]
pub struct SolidColorDelegate {
    /// Fill color.
    pub color: Argb32,
    /// Whether the fill hides everything beneath this layer.
    pub occluding: bool,
}

impl RenderLayerDelegate for SolidColorDelegate {
    fn pre_paint(&mut self, data: &mut PaintData, ctx: &mut PaintContext<'_>) -> ControlFlow<()> {
        _ = (data, ctx);
        if self.occluding && self.color.alpha() == u8::MAX {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn paint(&mut self, target: &mut dyn RenderTarget, data: &PaintData) {
        let rect = data.layer_to_target.transform_rect_bbox(data.bounds);
        target.fill_rect(rect, self.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::RenderLayerTree;

    #[test]
    fn paint_context_queues_requests_for_its_layer() {
        let mut tree = RenderLayerTree::new();
        let a = tree.create_layer(EmptyDelegate);
        let b = tree.create_layer(EmptyDelegate);
        let mut queue = RepaintQueue::new();

        let mut ctx = PaintContext::new(a, HostTime(5), &mut queue);
        assert_eq!(ctx.layer(), a);
        assert_eq!(ctx.presentation_time(), HostTime(5));
        ctx.add_repaint_full();
        ctx.add_repaint_to(b, Region::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0)));

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], RepaintRequest::Full(a));
        assert!(matches!(drained[1], RepaintRequest::Local { layer, .. } if layer == b));
        assert!(queue.is_empty());
    }
}
