// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless backend for lamina.
//!
//! [`VirtualBackend`] renders into in-memory ARGB32 images and simulates a
//! display that scans out at a fixed refresh rate:
//!
//! - Every output gets a primary and a cursor [`VirtualOutputLayer`], each
//!   with a small swapchain whose buffer ages feed a
//!   [`DamageJournal`](lamina_core::damage::DamageJournal).
//! - `present` completes at the next simulated vblank after the commit;
//!   completions are reported by `poll_presentations` once the caller's
//!   clock reaches them.
//! - Buffer allocation, present and presentation can be made to fail.
//!
//! It backs the integration tests and the `virtual_session` demo.

mod backend;
mod image;
mod layer;

pub use backend::{VirtualBackend, VirtualOutputConfig};
pub use image::VirtualImage;
pub use layer::VirtualOutputLayer;
