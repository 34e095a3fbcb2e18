// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor error type.

use lamina_core::output::{OutputError, OutputId};

use crate::config::ConfigError;

/// Errors returned by [`Compositor`](crate::Compositor) and
/// [`Driver`](crate::Driver).
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    /// No output with this id is managed.
    #[error("unknown output {0:?}")]
    UnknownOutput(OutputId),
    /// An output with this id is already managed.
    #[error("output {0:?} is already managed")]
    DuplicateOutput(OutputId),
    /// The backend exposes no primary output layer for the output.
    #[error("backend has no primary output layer for {0:?}")]
    NoPrimaryLayer(OutputId),
    /// An output rejected a configuration change.
    #[error("output configuration rejected: {0}")]
    Output(#[from] OutputError),
    /// The configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The event loop failed.
    #[error("event loop error: {0}")]
    EventLoop(#[from] calloop::Error),
    /// I/O error while setting up or running the event loop.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
