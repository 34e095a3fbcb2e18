// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend contract for display integrations.
//!
//! A backend (DRM/KMS, a nested host compositor, a virtual output) owns the
//! output layers of every output and the path to the screen. The compositor
//! talks to it through [`OutputBackend`]:
//!
//! - **Output layers**: borrowed by id for the duration of one paint.
//! - **Present**: commits the output layers painted for a frame. Completion
//!   is asynchronous.
//! - **Presentation events**: the backend pushes [`PresentEvent`]s into a
//!   [`PresentEventQueue`] when polled. The compositor routes them to the
//!   render loop of the output they belong to.
//! - **Wake-ups**: [`next_event_time`](OutputBackend::next_event_time) lets
//!   a timer-driven event loop know when the backend has something to
//!   report.
//!
//! # Crate boundaries
//!
//! `lamina_core` owns this contract. Backend crates implement it;
//! `lamina_compositor` drives it.

use std::collections::VecDeque;

use crate::output::{Output, OutputId};
use crate::output_layer::{OutputLayer, OutputLayerId};
use crate::render_loop::FrameRequest;
use crate::time::HostTime;

/// Completion of a presented frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentEvent {
    /// The frame reached the screen.
    Presented {
        /// Output the frame was shown on.
        output: OutputId,
        /// Frame counter of the output's render loop.
        frame_index: u64,
        /// Time the frame started scanning out.
        timestamp: HostTime,
    },
    /// The frame was dropped by the display pipeline.
    Failed {
        /// Output the frame was meant for.
        output: OutputId,
        /// Frame counter of the output's render loop.
        frame_index: u64,
    },
}

impl PresentEvent {
    /// Output the event belongs to.
    #[must_use]
    pub fn output(&self) -> OutputId {
        match *self {
            Self::Presented { output, .. } | Self::Failed { output, .. } => output,
        }
    }
}

/// Errors a backend reports synchronously from [`OutputBackend::present`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PresentError {
    /// The backend has no such output.
    #[error("unknown output {0:?}")]
    UnknownOutput(OutputId),
    /// The output already has a frame in flight.
    #[error("output {0:?} already has a frame in flight")]
    Busy(OutputId),
    /// The display pipeline rejected the commit.
    #[error("presentation of frame {frame_index} on {output:?} was rejected")]
    Rejected {
        /// Output the frame was meant for.
        output: OutputId,
        /// Frame counter of the rejected frame.
        frame_index: u64,
    },
}

/// Bounded FIFO of [`PresentEvent`]s.
///
/// When full, pushing drops the oldest queued event and counts it, so the
/// newest completions always get through under backpressure.
#[derive(Debug, Clone)]
pub struct PresentEventQueue {
    events: VecDeque<PresentEvent>,
    capacity: usize,
    dropped: u64,
}

impl PresentEventQueue {
    /// Capacity used by [`Default`].
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Creates a queue holding at most `capacity` events (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Enqueues an event.
    pub fn push(&mut self, event: PresentEvent) {
        if self.events.len() == self.capacity
            && let Some(lost) = self.events.pop_front()
        {
            self.dropped += 1;
            tracing::warn!(?lost, "presentation event queue overflow");
        }
        self.events.push_back(event);
    }

    /// Pops the oldest event.
    pub fn pop(&mut self) -> Option<PresentEvent> {
        self.events.pop_front()
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events lost to overflow.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

impl Default for PresentEventQueue {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

/// The compositor's view of a display backend.
pub trait OutputBackend {
    /// Output layers of `output`, primary first. Empty if the output is
    /// unknown.
    fn output_layers(&self, output: OutputId) -> Vec<OutputLayerId>;

    /// Called after the mode, position, scale or transform of `output`
    /// changed, so the backend can resize its output layers.
    fn output_changed(&mut self, output: &Output) {
        _ = output;
    }

    /// Borrows an output layer. `None` if the id is unknown.
    fn output_layer(&mut self, id: OutputLayerId) -> Option<&mut dyn OutputLayer>;

    /// Commits the output layers painted for `frame` on `output`.
    ///
    /// `Ok` means a [`PresentEvent`] for the frame will follow.
    fn present(
        &mut self,
        output: OutputId,
        frame: &FrameRequest,
        now: HostTime,
    ) -> Result<(), PresentError>;

    /// Pushes every completion that happened up to `now` into `events`.
    fn poll_presentations(&mut self, now: HostTime, events: &mut PresentEventQueue);

    /// Earliest time a completion becomes available, if one is pending.
    fn next_event_time(&self) -> Option<HostTime>;
}
