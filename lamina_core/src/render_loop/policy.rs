// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Latency, VRR and presentation policies.

use core::time::Duration;

/// How aggressively the render loop trades latency for headroom.
///
/// Lower latency starts rendering closer to the vblank, using an optimistic
/// estimate of the render time and a smaller safety margin. Higher latency
/// starts earlier and is less likely to miss the deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum LatencyPolicy {
    /// Minimum observed render time, half the safety margin.
    ExtremelyLow,
    /// Between minimum and average render time, three quarters of the margin.
    Low,
    /// Average render time, the full safety margin.
    #[default]
    Medium,
    /// Between average and maximum render time, one and a half margins.
    High,
    /// Maximum observed render time, twice the safety margin.
    ExtremelyHigh,
}

impl LatencyPolicy {
    /// Multiplier applied to the base safety margin, in quarters.
    #[must_use]
    pub const fn margin_quarters(self) -> u32 {
        match self {
            Self::ExtremelyLow => 2,
            Self::Low => 3,
            Self::Medium => 4,
            Self::High => 6,
            Self::ExtremelyHigh => 8,
        }
    }

    /// Returns `base` scaled by [`margin_quarters`](Self::margin_quarters).
    #[must_use]
    pub fn scale_margin(self, base: Duration) -> Duration {
        base * self.margin_quarters() / 4
    }
}

/// When the render loop may present with variable refresh rate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum VrrPolicy {
    /// Always present on the fixed vblank grid.
    #[default]
    Never,
    /// Always present as soon as a frame is ready.
    Always,
    /// Present adaptively only while fullscreen content is shown.
    Automatic,
}

/// Timing discipline of a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PresentationMode {
    /// Quantised to the display's vblank interval.
    #[default]
    VSync,
    /// Variable refresh rate: the display waits for the frame.
    AdaptiveSync,
}

impl VrrPolicy {
    /// Resolves the presentation mode for the given content state.
    #[must_use]
    pub const fn presentation_mode(self, fullscreen_content: bool) -> PresentationMode {
        match self {
            Self::Never => PresentationMode::VSync,
            Self::Always => PresentationMode::AdaptiveSync,
            Self::Automatic if fullscreen_content => PresentationMode::AdaptiveSync,
            Self::Automatic => PresentationMode::VSync,
        }
    }
}
