// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-loop instrumentation.
//!
//! [`TraceSink`] has one method per event; every method defaults to a no-op,
//! so sinks implement only what they need. The scene and the compositor emit
//! events through a [`Tracer`], which wraps an optional `&mut dyn TraceSink`.
//! Without the `trace` feature every `Tracer` method compiles to nothing.
//!
//! This is timing instrumentation for profiling tools. Human-readable
//! diagnostics go through `tracing`.

use kurbo::Rect;

use crate::output::OutputId;
use crate::output_layer::OutputLayerId;
use crate::render_loop::{FrameRequest, PresentationMode};
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a frame is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Tree evaluation and damage collection.
    Collect,
    /// Front-to-back pre-paint pass.
    PrePaint,
    /// Back-to-front paint pass.
    Paint,
    /// Post-paint pass and repaint queue.
    PostPaint,
    /// Committing output layers and presenting.
    Present,
}

impl PhaseKind {
    /// All phases in frame order.
    pub const ALL: [Self; 5] = [
        Self::Collect,
        Self::PrePaint,
        Self::Paint,
        Self::PostPaint,
        Self::Present,
    ];

    const fn index(self) -> usize {
        match self {
            Self::Collect => 0,
            Self::PrePaint => 1,
            Self::Paint => 2,
            Self::PostPaint => 3,
            Self::Present => 4,
        }
    }
}

/// How a frame ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameOutcome {
    /// The frame reached the screen.
    Presented,
    /// Painting or presentation failed.
    Failed,
    /// There was nothing to paint.
    Skipped,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a render loop hands out a frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameStartEvent {
    /// Frame counter of the output's render loop.
    pub frame_index: u64,
    /// Output being painted.
    pub output: OutputId,
    /// Host time when painting started.
    pub now: HostTime,
    /// Predicted presentation time.
    pub target_presentation: HostTime,
    /// Presentation mode of the frame.
    pub mode: PresentationMode,
}

impl FrameStartEvent {
    /// Creates the event for `frame` on `output`.
    #[must_use]
    pub fn new(output: OutputId, frame: &FrameRequest, now: HostTime) -> Self {
        Self {
            frame_index: frame.frame_index,
            output,
            now,
            target_presentation: frame.target_presentation,
            mode: frame.mode,
        }
    }
}

/// Marks the beginning of a frame phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a frame phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Damage painted on one output layer.
#[derive(Clone, Copy, Debug)]
pub struct DamageEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// The output layer painted.
    pub output_layer: OutputLayerId,
    /// Number of disjoint rectangles in the paint region.
    pub rect_count: u32,
    /// Bounding box of the paint region in global space.
    pub bounds: Rect,
}

/// Emitted when a frame ends.
#[derive(Clone, Copy, Debug)]
pub struct FrameCompleteEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Output the frame belonged to.
    pub output: OutputId,
    /// How the frame ended.
    pub outcome: FrameOutcome,
    /// Presentation timestamp, or the time the failure or skip was noticed.
    pub timestamp: HostTime,
}

/// Per-frame timing summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Output.
    pub output: OutputId,
    /// Host time when painting started.
    pub now: HostTime,
    /// Predicted presentation time.
    pub target_presentation: HostTime,
    /// Phase durations in nanoseconds, indexed like [`PhaseKind::ALL`]; 0
    /// if not measured.
    pub phase_nanos: [u64; 5],
    /// Number of layers whose delegate painted.
    pub painted_layers: u32,
    /// Whether the frame was skipped for lack of damage.
    pub skipped: bool,
}

impl FrameSummary {
    /// Duration of one phase in nanoseconds.
    #[must_use]
    pub fn phase_duration(&self, phase: PhaseKind) -> u64 {
        self.phase_nanos[phase.index()]
    }
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the frame loop.
pub trait TraceSink {
    /// Called when a frame starts.
    fn on_frame_start(&mut self, e: &FrameStartEvent) {
        _ = e;
    }

    /// Called at the beginning of a phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called once per painted output layer.
    fn on_damage(&mut self, e: &DamageEvent) {
        _ = e;
    }

    /// Called when a frame is presented, fails or is skipped.
    fn on_frame_complete(&mut self, e: &FrameCompleteEvent) {
        _ = e;
    }

    /// Called with a per-frame timing summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl Default for Tracer<'_> {
    fn default() -> Self {
        Self::none()
    }
}

/// Generates the forwarding methods of [`Tracer`]. Without the `trace`
/// feature they compile to nothing.
macro_rules! emit {
    ($($(#[$doc:meta])* $name:ident($event:ty) => $hook:ident;)*) => {
        $(
            $(#[$doc])*
            #[inline]
            pub fn $name(&mut self, event: &$event) {
                #[cfg(feature = "trace")]
                if let Some(sink) = self.sink.as_deref_mut() {
                    sink.$hook(event);
                }
                #[cfg(not(feature = "trace"))]
                {
                    _ = event;
                }
            }
        )*
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    emit! {
        /// Emits a [`FrameStartEvent`].
        frame_start(FrameStartEvent) => on_frame_start;
        /// Emits a [`PhaseBeginEvent`].
        phase_begin(PhaseBeginEvent) => on_phase_begin;
        /// Emits a [`PhaseEndEvent`].
        phase_end(PhaseEndEvent) => on_phase_end;
        /// Emits a [`DamageEvent`].
        damage(DamageEvent) => on_damage;
        /// Emits a [`FrameCompleteEvent`].
        frame_complete(FrameCompleteEvent) => on_frame_complete;
        /// Emits a [`FrameSummary`].
        frame_summary(FrameSummary) => on_frame_summary;
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    start: FrameStartEvent,
    phase_starts: [Option<HostTime>; 5],
    phase_ends: [Option<HostTime>; 5],
    painted_layers: u32,
    skipped: bool,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for the given frame.
    #[must_use]
    pub fn new(start: &FrameStartEvent) -> Self {
        Self {
            start: *start,
            phase_starts: [None; 5],
            phase_ends: [None; 5],
            painted_layers: 0,
            skipped: false,
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase.index()] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase.index()] = Some(t);
    }

    /// Counts one painted layer.
    pub fn add_painted_layer(&mut self) {
        self.painted_layers += 1;
    }

    /// Marks the frame as skipped.
    pub fn set_skipped(&mut self, skipped: bool) {
        self.skipped = skipped;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        FrameSummary {
            frame_index: self.start.frame_index,
            output: self.start.output,
            now: self.start.now,
            target_presentation: self.start.target_presentation,
            phase_nanos: PhaseKind::ALL.map(|phase| self.phase_duration(phase)),
            painted_layers: self.painted_layers,
            skipped: self.skipped,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase.index();
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.as_nanos().saturating_sub(start.as_nanos()),
            _ => 0,
        }
    }
}
