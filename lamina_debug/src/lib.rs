// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Development tooling for lamina frame traces.
//!
//! Each module provides a [`TraceSink`](lamina_core::trace::TraceSink) or
//! works on the output of one:
//!
//! - [`pretty::PrettyPrintSink`] writes one line per event.
//! - [`recorder::RecorderSink`] records events into a compact binary buffer
//!   that [`recorder::decode`] plays back.
//! - [`chrome::export`] turns a recording into Chrome Trace Event Format
//!   JSON for `chrome://tracing` or Perfetto.

pub mod chrome;
pub mod pretty;
pub mod recorder;
