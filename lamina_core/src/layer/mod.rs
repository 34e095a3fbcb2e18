// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render layer tree.
//!
//! A *render layer* is a node of the scene graph. Each layer has:
//!
//! - An identity ([`LayerId`]), a generational handle that becomes stale
//!   when the layer is destroyed.
//! - Topology: an ordered list of sublayers, painted bottom to top.
//! - **Local properties** set by the caller:
//!   [`geometry`](RenderLayerTree::set_geometry),
//!   [`transform`](RenderLayerTree::set_transform),
//!   [`visibility`](RenderLayerTree::set_visible) and an optional
//!   [`output layer`](RenderLayerTree::set_output_layer).
//! - **Derived properties**: effective visibility, the bounding rect of the
//!   subtree and the accumulated repaint region.
//! - A [`RenderLayerDelegate`](crate::delegate::RenderLayerDelegate) that
//!   paints its content.
//!
//! # Repaint bookkeeping
//!
//! Every change that alters what is on screen records damage immediately.
//! Moving, hiding or removing a layer repaints the area it used to cover on
//! its parent, because that area now shows whatever lies beneath. Roots have
//! nothing beneath them, so their vacated area is collected as *exposed*
//! global damage ([`RenderLayerTree::take_exposed`]).

mod evaluate;
mod id;
mod traverse;
mod tree;

pub use evaluate::LayerChanges;
pub use id::{INVALID, LayerId};
pub use traverse::Sublayers;
pub use tree::RenderLayerTree;
