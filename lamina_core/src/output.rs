// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display outputs and their configuration.
//!
//! An [`Output`] is one display: its modes, placement in the global
//! compositor space, power state and the [`RenderLoop`] that paces it.
//! Backends create outputs; output configuration mutates them through
//! [`OutputChangeSet`]s, which are validated as a whole before anything is
//! applied.

use core::fmt;
use std::collections::BTreeMap;

use kurbo::{Point, Rect, Size};

use crate::render_loop::{RenderLoop, RenderLoopConfig, VrrPolicy};
use crate::time::HostTime;

/// Identifies a display output.
///
/// Backends assign output ids; core code passes them through without
/// interpreting the value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputId(pub u32);

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputId({})", self.0)
    }
}

/// Size in device pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelSize {
    /// Creates a pixel size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Converts to a floating-point size.
    #[must_use]
    pub fn to_size(self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

/// A display mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutputMode {
    /// Resolution.
    pub size: PixelSize,
    /// Refresh rate in millihertz.
    pub refresh_rate: u32,
    /// Whether the display advertises this as its preferred mode.
    pub preferred: bool,
}

/// Rotation and reflection applied to an output's contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum OutputTransform {
    /// No transform.
    #[default]
    Normal,
    /// Rotated 90° counter-clockwise.
    Rotated90,
    /// Rotated 180°.
    Rotated180,
    /// Rotated 270° counter-clockwise.
    Rotated270,
    /// Mirrored horizontally.
    Flipped,
    /// Mirrored, then rotated 90°.
    Flipped90,
    /// Mirrored, then rotated 180°.
    Flipped180,
    /// Mirrored, then rotated 270°.
    Flipped270,
}

impl OutputTransform {
    /// Returns `true` if the transform swaps width and height.
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(
            self,
            Self::Rotated90 | Self::Rotated270 | Self::Flipped90 | Self::Flipped270
        )
    }

    /// Applies the transform to a size.
    #[must_use]
    pub const fn apply(self, size: PixelSize) -> PixelSize {
        if self.swaps_axes() {
            PixelSize::new(size.height, size.width)
        } else {
            size
        }
    }
}

/// Display power state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DpmsMode {
    /// Powered and scanning out.
    #[default]
    On,
    /// Power-down requested, the last frame may still be on screen.
    TurningOff,
    /// Powered down.
    Off,
}

/// A mode selection in an [`OutputChangeSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModeSelection {
    /// Requested resolution.
    pub size: PixelSize,
    /// Requested refresh rate in millihertz; `None` picks the highest one
    /// available at `size`.
    pub refresh_rate: Option<u32>,
}

/// Requested changes to one output. Unset fields are left alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputChangeSet {
    /// Enable or disable the output.
    pub enabled: Option<bool>,
    /// New position in the global compositor space.
    pub position: Option<Point>,
    /// New scale factor.
    pub scale: Option<f64>,
    /// New mode.
    pub mode: Option<ModeSelection>,
    /// New transform.
    pub transform: Option<OutputTransform>,
    /// New VRR policy.
    pub vrr_policy: Option<VrrPolicy>,
}

impl OutputChangeSet {
    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Change sets for several outputs, applied together.
#[derive(Clone, Debug, Default)]
pub struct OutputConfiguration {
    changes: BTreeMap<OutputId, OutputChangeSet>,
}

impl OutputConfiguration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the change set for `output`, replacing an earlier one.
    pub fn set(&mut self, output: OutputId, changes: OutputChangeSet) {
        self.changes.insert(output, changes);
    }

    /// Returns the change set for `output`.
    #[must_use]
    pub fn get(&self, output: OutputId) -> Option<&OutputChangeSet> {
        self.changes.get(&output)
    }

    /// Iterates over change sets in output id order.
    pub fn iter(&self) -> impl Iterator<Item = (OutputId, &OutputChangeSet)> {
        self.changes.iter().map(|(id, changes)| (*id, changes))
    }

    /// Returns `true` if no output has changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Errors from creating or reconfiguring an output.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum OutputError {
    /// The output was created without any mode.
    #[error("output has no modes")]
    NoModes,
    /// The requested mode is not in the output's mode list.
    #[error("no mode {}x{} at {refresh_rate:?} mHz", size.width, size.height)]
    UnknownMode {
        /// Requested resolution.
        size: PixelSize,
        /// Requested refresh rate.
        refresh_rate: Option<u32>,
    },
    /// The scale factor is not a positive finite number.
    #[error("invalid scale factor {0}")]
    InvalidScale(f64),
}

/// One display output.
#[derive(Debug)]
pub struct Output {
    id: OutputId,
    name: String,
    modes: Vec<OutputMode>,
    current_mode: usize,
    scale: f64,
    transform: OutputTransform,
    position: Point,
    dpms: DpmsMode,
    enabled: bool,
    render_loop: RenderLoop,
    dpms_inhibited: bool,
    disabled_inhibited: bool,
}

impl Output {
    /// Creates an enabled output at the origin, in its preferred mode (or
    /// the first one).
    pub fn new(
        id: OutputId,
        name: impl Into<String>,
        modes: Vec<OutputMode>,
        config: RenderLoopConfig,
    ) -> Result<Self, OutputError> {
        if modes.is_empty() {
            return Err(OutputError::NoModes);
        }
        let current_mode = modes.iter().position(|m| m.preferred).unwrap_or(0);
        let mut render_loop = RenderLoop::new(config);
        render_loop.set_refresh_rate(modes[current_mode].refresh_rate);
        Ok(Self {
            id,
            name: name.into(),
            modes,
            current_mode,
            scale: 1.0,
            transform: OutputTransform::Normal,
            position: Point::ZERO,
            dpms: DpmsMode::On,
            enabled: true,
            render_loop,
            dpms_inhibited: false,
            disabled_inhibited: false,
        })
    }

    /// Output id.
    #[must_use]
    pub fn id(&self) -> OutputId {
        self.id
    }

    /// Connector or display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Available modes.
    #[must_use]
    pub fn modes(&self) -> &[OutputMode] {
        &self.modes
    }

    /// Current mode.
    #[must_use]
    pub fn current_mode(&self) -> OutputMode {
        self.modes[self.current_mode]
    }

    /// Scale factor from logical units to pixels.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Content transform.
    #[must_use]
    pub fn transform(&self) -> OutputTransform {
        self.transform
    }

    /// Position of the top-left corner in global space.
    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    /// Power state.
    #[must_use]
    pub fn dpms(&self) -> DpmsMode {
        self.dpms
    }

    /// Whether the output is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// VRR policy of the render loop.
    #[must_use]
    pub fn vrr_policy(&self) -> VrrPolicy {
        self.render_loop.vrr_policy()
    }

    /// The output's render loop.
    #[must_use]
    pub fn render_loop(&self) -> &RenderLoop {
        &self.render_loop
    }

    /// Mutable access to the render loop.
    pub fn render_loop_mut(&mut self) -> &mut RenderLoop {
        &mut self.render_loop
    }

    /// Logical rectangle in global space: the transformed mode size divided
    /// by the scale.
    #[must_use]
    pub fn geometry(&self) -> Rect {
        let size = self.transform.apply(self.current_mode().size).to_size();
        Rect::from_origin_size(self.position, size / self.scale)
    }

    /// Replaces the mode list, e.g. after a hotplug. The current mode is kept
    /// when still available, otherwise the preferred one is picked.
    pub fn set_modes(&mut self, modes: Vec<OutputMode>) -> Result<(), OutputError> {
        if modes.is_empty() {
            return Err(OutputError::NoModes);
        }
        let current = self.current_mode();
        let index = modes
            .iter()
            .position(|m| m.size == current.size && m.refresh_rate == current.refresh_rate)
            .or_else(|| modes.iter().position(|m| m.preferred))
            .unwrap_or(0);
        self.modes = modes;
        self.current_mode = index;
        self.render_loop.set_refresh_rate(self.modes[index].refresh_rate);
        Ok(())
    }

    /// Changes the power state. Anything but [`DpmsMode::On`] inhibits the
    /// render loop.
    pub fn set_dpms(&mut self, mode: DpmsMode, now: HostTime) {
        if mode == self.dpms {
            return;
        }
        self.dpms = mode;
        tracing::info!(output = ?self.id, ?mode, "dpms changed");
        let inhibit = mode != DpmsMode::On;
        Self::set_inhibited(&mut self.render_loop, &mut self.dpms_inhibited, inhibit, now);
    }

    /// Enables or disables the output. Disabled outputs never render.
    pub fn set_enabled(&mut self, enabled: bool, now: HostTime) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        tracing::info!(output = ?self.id, enabled, "output enablement changed");
        Self::set_inhibited(
            &mut self.render_loop,
            &mut self.disabled_inhibited,
            !enabled,
            now,
        );
    }

    /// Checks that `changes` can be applied to this output.
    pub fn validate_change_set(&self, changes: &OutputChangeSet) -> Result<(), OutputError> {
        if let Some(scale) = changes.scale
            && !(scale.is_finite() && scale > 0.0)
        {
            return Err(OutputError::InvalidScale(scale));
        }
        if let Some(selection) = changes.mode {
            self.find_mode(selection)?;
        }
        Ok(())
    }

    /// Validates `changes` against this output, then applies them.
    ///
    /// On error nothing is applied.
    pub fn apply_change_set(
        &mut self,
        changes: &OutputChangeSet,
        now: HostTime,
    ) -> Result<(), OutputError> {
        self.validate_change_set(changes)?;
        let mode = changes
            .mode
            .map(|selection| self.find_mode(selection))
            .transpose()?;

        if let Some(index) = mode {
            self.current_mode = index;
            self.render_loop.set_refresh_rate(self.modes[index].refresh_rate);
        }
        if let Some(scale) = changes.scale {
            self.scale = scale;
        }
        if let Some(position) = changes.position {
            self.position = position;
        }
        if let Some(transform) = changes.transform {
            self.transform = transform;
        }
        if let Some(policy) = changes.vrr_policy {
            self.render_loop.set_vrr_policy(policy);
        }
        if let Some(enabled) = changes.enabled {
            self.set_enabled(enabled, now);
        }
        tracing::debug!(output = ?self.id, ?changes, "output configuration applied");
        Ok(())
    }

    fn find_mode(&self, selection: ModeSelection) -> Result<usize, OutputError> {
        let candidates = self
            .modes
            .iter()
            .enumerate()
            .filter(|(_, m)| m.size == selection.size);
        let found = match selection.refresh_rate {
            Some(rate) => candidates
                .filter(|(_, m)| m.refresh_rate == rate)
                .map(|(i, _)| i)
                .next(),
            None => candidates
                .max_by_key(|(_, m)| m.refresh_rate)
                .map(|(i, _)| i),
        };
        found.ok_or(OutputError::UnknownMode {
            size: selection.size,
            refresh_rate: selection.refresh_rate,
        })
    }

    fn set_inhibited(
        render_loop: &mut RenderLoop,
        held: &mut bool,
        inhibit: bool,
        now: HostTime,
    ) {
        if inhibit && !*held {
            render_loop.inhibit();
            *held = true;
        } else if !inhibit && *held {
            render_loop.uninhibit(now);
            *held = false;
        }
    }
}
