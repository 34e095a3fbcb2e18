// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change-tracking channels of the render layer tree.
//!
//! Property setters keep the tree's derived state (effective visibility,
//! bounding rects, accumulated repaints) up to date immediately. The
//! channels below only record *which* layers changed so that
//! [`RenderLayerTree::evaluate`](crate::layer::RenderLayerTree::evaluate)
//! can report them as [`LayerChanges`](crate::layer::LayerChanges).
//!
//! [`GEOMETRY`], [`VISIBILITY`] and [`OUTPUT_LAYER`] are marked with
//! [`EagerPolicy`](understory_dirty::EagerPolicy) along child → parent
//! dependency edges, so a change on a layer also reports every descendant:
//! their global position, effective visibility and effective output layer
//! are inherited. [`TOPOLOGY`] is structural and local to the marked layer.

use understory_dirty::Channel;

/// Geometry or transform changed; global placement of the subtree moved.
pub const GEOMETRY: Channel = Channel::new(0);

/// Explicit visibility changed; effective visibility of the subtree may
/// have flipped.
pub const VISIBILITY: Channel = Channel::new(1);

/// Output layer assignment changed for the subtree.
pub const OUTPUT_LAYER: Channel = Channel::new(2);

/// Sublayers were added, removed or reordered.
pub const TOPOLOGY: Channel = Channel::new(3);
