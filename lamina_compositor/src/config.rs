// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! TOML configuration.
//!
//! ```toml
//! idle-timeout-ms = 1000
//!
//! [render-loop]
//! latency-policy = "medium"
//! safety-margin-us = 3000
//!
//! [[output]]
//! name = "VIRTUAL-1"
//! position = [0.0, 0.0]
//! scale = 1.0
//! mode = { width = 1920, height = 1080, refresh-rate = 60000 }
//! transform = "normal"
//! vrr = "automatic"
//! ```
//!
//! Every key is optional. Output sections are matched to outputs by name and
//! turned into [`OutputChangeSet`]s.

use core::time::Duration;
use std::path::{Path, PathBuf};

use kurbo::Point;
use lamina_core::output::{
    ModeSelection, Output, OutputChangeSet, OutputConfiguration, OutputTransform, PixelSize,
};
use lamina_core::render_loop::{LatencyPolicy, RenderLoopConfig, VrrPolicy};
use serde::Deserialize;

/// Errors from loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path:?}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The contents are not valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CompositorConfig {
    /// Render loop defaults applied to every output.
    pub render_loop: RenderLoopSection,
    /// Capacity of the presentation event queue.
    pub event_queue_capacity: usize,
    /// Longest time the event loop sleeps when nothing is scheduled.
    pub idle_timeout_ms: u64,
    /// Per-output settings.
    #[serde(rename = "output")]
    pub outputs: Vec<OutputSection>,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            render_loop: RenderLoopSection::default(),
            event_queue_capacity: lamina_core::backend::PresentEventQueue::DEFAULT_CAPACITY,
            idle_timeout_ms: 1000,
            outputs: Vec::new(),
        }
    }
}

/// `[render-loop]` section.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RenderLoopSection {
    /// Default latency policy.
    pub latency_policy: LatencyPolicy,
    /// Base safety margin in microseconds.
    pub safety_margin_us: u64,
    /// Number of paint durations kept for prediction.
    pub journal_capacity: usize,
}

impl Default for RenderLoopSection {
    fn default() -> Self {
        let config = RenderLoopConfig::desktop();
        Self {
            latency_policy: config.latency_policy,
            safety_margin_us: u64::try_from(config.safety_margin.as_micros()).unwrap_or(u64::MAX),
            journal_capacity: config.journal_capacity,
        }
    }
}

impl RenderLoopSection {
    /// Converts to a [`RenderLoopConfig`].
    #[must_use]
    pub fn to_config(&self) -> RenderLoopConfig {
        RenderLoopConfig {
            latency_policy: self.latency_policy,
            safety_margin: Duration::from_micros(self.safety_margin_us),
            journal_capacity: self.journal_capacity,
        }
    }
}

/// `[[output]]` section.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OutputSection {
    /// Output name the section applies to.
    pub name: String,
    /// Enable or disable the output.
    pub enabled: Option<bool>,
    /// Position in global space.
    pub position: Option<[f64; 2]>,
    /// Scale factor.
    pub scale: Option<f64>,
    /// Mode.
    pub mode: Option<ModeSection>,
    /// Content transform.
    pub transform: Option<OutputTransform>,
    /// VRR policy.
    pub vrr: Option<VrrPolicy>,
}

/// Mode of an `[[output]]` section.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ModeSection {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Refresh rate in millihertz; highest available when omitted.
    pub refresh_rate: Option<u32>,
}

impl OutputSection {
    /// Converts to a change set.
    #[must_use]
    pub fn to_change_set(&self) -> OutputChangeSet {
        OutputChangeSet {
            enabled: self.enabled,
            position: self.position.map(|[x, y]| Point::new(x, y)),
            scale: self.scale,
            mode: self.mode.map(|mode| ModeSelection {
                size: PixelSize::new(mode.width, mode.height),
                refresh_rate: mode.refresh_rate,
            }),
            transform: self.transform,
            vrr_policy: self.vrr,
        }
    }
}

impl CompositorConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Idle timeout as a duration.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Builds the configuration for the given outputs, matching sections by
    /// output name. Sections naming no known output are skipped.
    pub fn output_configuration<'a>(
        &self,
        outputs: impl IntoIterator<Item = &'a Output>,
    ) -> OutputConfiguration {
        let outputs: Vec<&Output> = outputs.into_iter().collect();
        let mut configuration = OutputConfiguration::new();
        for section in &self.outputs {
            match outputs.iter().find(|o| o.name() == section.name) {
                Some(output) => configuration.set(output.id(), section.to_change_set()),
                None => tracing::debug!(name = %section.name, "no output for config section"),
            }
        }
        configuration
    }
}
