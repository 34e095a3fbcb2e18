// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scene painting and event-loop glue on top of `lamina_core`.
//!
//! - [`Scene`]: the render-layer tree of one output and the per-frame
//!   collect, pre-paint, paint, post-paint and present pipeline.
//! - [`Compositor`]: owns a backend and one scene per output, routes
//!   presentation events and paints due frames.
//! - [`Driver`]: runs a compositor on a `calloop` event loop.
//! - [`config`]: TOML configuration for render loops and outputs.
//! - [`clock`]: monotonic and manual time sources.
//!
//! ```no_run
//! use core::ops::ControlFlow;
//! use lamina_compositor::{Compositor, Driver};
//! # fn run<B: lamina_core::backend::OutputBackend + 'static>(backend: B)
//! #     -> Result<(), lamina_compositor::CompositorError> {
//! let compositor = Compositor::new(backend);
//! let mut driver = Driver::new(compositor, core::time::Duration::from_secs(1))?;
//! driver.run(|_| ControlFlow::Continue(()))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate features
//!
//! - `trace` (disabled by default): forwards frame-loop events to the sink
//!   installed with [`Compositor::set_trace_sink`].

pub mod clock;
pub mod config;
mod compositor;
mod driver;
mod error;
mod scene;

pub use compositor::Compositor;
pub use config::{CompositorConfig, ConfigError};
pub use driver::Driver;
pub use error::CompositorError;
pub use scene::{PaintOutcome, Scene};
