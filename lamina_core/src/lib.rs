// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types for output compositing: frame scheduling, damage tracking and
//! the render-layer scene graph.
//!
//! `lamina_core` decides *when* each output renders, *what* has to be
//! repainted and *how* the layered scene maps onto the planes of an output.
//! It never touches a clock or a GPU: time is passed in explicitly and
//! drawing goes through the [`RenderTarget`](output_layer::RenderTarget)
//! trait.
//!
//! # Architecture
//!
//! ```text
//!   Window management ──► RenderLayerTree (geometry, visibility, repaints)
//!                                  │ take_repaint_requested
//!                                  ▼
//!   Output ── RenderLoop::schedule_repaint ──► next_wake ──► event loop timer
//!                                                                  │
//!                 ┌────────────────────────────────────────────────┘
//!                 ▼
//!   RenderLoop::take_due_frame ──► FrameRequest ──► scene paint
//!                                                      │
//!      RenderLayerTree::evaluate ─► damage ─► OutputLayer::begin_frame
//!      delegates pre_paint / paint / post_paint ─► OutputLayer::end_frame
//!                                                      │
//!                                                      ▼
//!   OutputBackend::present ──► PresentEvent ──► RenderLoop::notify_frame_*
//! ```
//!
//! **[`render_loop`]**: per-output frame scheduling state machine with
//! render-time prediction, latency policies and adaptive sync.
//!
//! **[`damage`]**: per-buffer damage history that turns a buffer age into
//! the region to repaint.
//!
//! **[`layer`]**: struct-of-arrays render-layer tree with generational
//! handles and immediate repaint bookkeeping.
//!
//! **[`dirty`]**: change-tracking channels reported by tree evaluation.
//!
//! **[`region`]**: rectangle-set algebra used for all damage.
//!
//! **[`delegate`]** and **[`output_layer`]**: the contracts layer content
//! and hardware planes implement.
//!
//! **[`output`]**: displays, modes and output configuration.
//!
//! **[`backend`]**: the contract display backends implement.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) events for frame-loop
//! profiling.
//!
//! # Crate features
//!
//! - `serde` (disabled by default): `Serialize`/`Deserialize` for policy and
//!   output configuration types.
//! - `trace` (disabled by default): enables `Tracer` method bodies.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod backend;
pub mod damage;
pub mod delegate;
pub mod dirty;
pub mod layer;
pub mod output;
pub mod output_layer;
pub mod region;
pub mod render_loop;
pub mod time;
pub mod trace;
