// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hardware plane contract.
//!
//! An [`OutputLayer`] is one compositable plane of an output: the primary
//! plane that carries the composited scene, a cursor plane, or an overlay
//! plane that scans out a single client buffer. Backends own output layers
//! and hand them to the scene by [`OutputLayerId`]; render layers refer to
//! them only by id, so a removed plane leaves dangling ids behind that the
//! tree [forgets](crate::layer::RenderLayerTree::forget_output_layer).
//!
//! # Frame contract
//!
//! Every [`begin_frame`](OutputLayer::begin_frame) is followed by exactly
//! one [`end_frame`](OutputLayer::end_frame), even when no buffer could be
//! acquired; in that case `end_frame` is an empty commit that reports
//! failure. Between the two the layer exposes a [`RenderTarget`] for the
//! acquired buffer. Implementations can use [`FramePairing`] to enforce the
//! pairing.
//!
//! All regions crossing this interface are in global compositor space.

use core::fmt;

use kurbo::Rect;

use crate::region::Region;

/// Identifies an output layer owned by a backend.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OutputLayerId(pub u32);

impl fmt::Debug for OutputLayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputLayerId({})", self.0)
    }
}

/// Role of a plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputLayerKind {
    /// Carries the composited scene; every output has one.
    Primary,
    /// Hardware cursor plane.
    Cursor,
    /// Overlay plane for direct scanout.
    Overlay,
}

/// Opaque handle of a buffer or swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Result of a successful [`OutputLayer::begin_frame`].
#[derive(Clone, Debug)]
pub struct BeginFrameInfo {
    /// The acquired buffer.
    pub buffer: BufferHandle,
    /// Area whose contents in `buffer` are stale and must be repainted in
    /// addition to the frame's own damage.
    pub repaint: Region,
}

/// A 32-bit ARGB color, alpha in the high byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Argb32(pub u32);

impl Argb32 {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self(0);
    /// Opaque black.
    pub const BLACK: Self = Self(0xff00_0000);
    /// Opaque white.
    pub const WHITE: Self = Self(0xffff_ffff);

    /// Creates an opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(0xff00_0000 | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Alpha channel.
    #[must_use]
    pub const fn alpha(self) -> u8 {
        self.0.to_be_bytes()[0]
    }
}

impl fmt::Debug for Argb32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Argb32({:#010x})", self.0)
    }
}

/// Drawing surface for the buffer acquired by `begin_frame`.
///
/// Coordinates are buffer pixels with the origin at the top-left corner of
/// the output layer.
pub trait RenderTarget {
    /// The buffer being drawn into.
    fn buffer(&self) -> BufferHandle;

    /// Buffer size in pixels.
    fn size(&self) -> kurbo::Size;

    /// Restricts subsequent drawing to `clip`, or lifts the restriction.
    fn set_clip(&mut self, clip: Option<&Region>);

    /// Fills `rect` with a solid color, honouring the clip.
    fn fill_rect(&mut self, rect: Rect, color: Argb32);
}

/// A compositable plane of an output.
pub trait OutputLayer {
    /// Role of this plane.
    fn kind(&self) -> OutputLayerKind;

    /// Area covered by this plane, in global compositor space.
    fn geometry(&self) -> Rect;

    /// Scale from global logical units to buffer pixels.
    fn scale(&self) -> f64 {
        1.0
    }

    /// Age of the buffer the next `begin_frame` will return; 0 when
    /// unknown.
    fn buffer_age(&self) -> u32;

    /// Whether painting can be clipped to the damaged area. Planes that
    /// cannot must be fully repainted every frame.
    fn supports_partial_update(&self) -> bool {
        true
    }

    /// Opens a frame and acquires a buffer. Returns `None` when no buffer
    /// is available; the frame is open regardless and must be ended.
    fn begin_frame(&mut self) -> Option<BeginFrameInfo>;

    /// The target for the acquired buffer, between `begin_frame` and
    /// `end_frame`.
    fn render_target(&mut self) -> Option<&mut dyn RenderTarget>;

    /// Commits the buffer. `rendered` is what was drawn, `damaged` what
    /// changed relative to the previous frame; the latter feeds the layer's
    /// damage journal. Returns `false` if the buffer could not be committed.
    fn end_frame(&mut self, rendered: &Region, damaged: &Region) -> bool;
}

/// Violation of the `begin_frame` / `end_frame` pairing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameContractError {
    /// `begin_frame` was called while a frame was already open.
    #[error("begin_frame called while a frame is open")]
    DoubleBegin,
    /// `end_frame` was called without an open frame.
    #[error("end_frame called without begin_frame")]
    EndWithoutBegin,
}

/// Tracks whether a frame is open on an output layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct FramePairing {
    open: bool,
}

impl FramePairing {
    /// Opens a frame.
    pub fn begin(&mut self) -> Result<(), FrameContractError> {
        if self.open {
            return Err(FrameContractError::DoubleBegin);
        }
        self.open = true;
        Ok(())
    }

    /// Closes the open frame.
    pub fn end(&mut self) -> Result<(), FrameContractError> {
        if !self.open {
            return Err(FrameContractError::EndWithoutBegin);
        }
        self.open = false;
        Ok(())
    }

    /// Returns `true` between `begin` and `end`.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_rejects_double_begin_and_stray_end() {
        let mut pairing = FramePairing::default();
        assert_eq!(pairing.end(), Err(FrameContractError::EndWithoutBegin));
        assert_eq!(pairing.begin(), Ok(()));
        assert!(pairing.is_open());
        assert_eq!(pairing.begin(), Err(FrameContractError::DoubleBegin));
        assert_eq!(pairing.end(), Ok(()));
        assert!(!pairing.is_open());
    }

    #[test]
    fn argb_components() {
        let c = Argb32::rgb(0x12, 0x34, 0x56);
        assert_eq!(c, Argb32(0xff12_3456));
        assert_eq!(c.alpha(), 0xff);
        assert_eq!(Argb32::TRANSPARENT.alpha(), 0);
    }
}
