// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and appends every event to a
//! `Vec<u8>` as a tag byte followed by little-endian fields. [`decode`]
//! reads them back as an iterator of [`RecordedEvent`]. A truncated record
//! ends the iteration.

use kurbo::Rect;
use lamina_core::output::OutputId;
use lamina_core::output_layer::OutputLayerId;
use lamina_core::render_loop::PresentationMode;
use lamina_core::time::HostTime;
use lamina_core::trace::{
    DamageEvent, FrameCompleteEvent, FrameOutcome, FrameStartEvent, FrameSummary,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_START: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_DAMAGE: u8 = 4;
const TAG_FRAME_COMPLETE: u8 = 5;
const TAG_FRAME_SUMMARY: u8 = 6;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Collect => 0,
            PhaseKind::PrePaint => 1,
            PhaseKind::Paint => 2,
            PhaseKind::PostPaint => 3,
            PhaseKind::Present => 4,
        });
    }

    fn write_mode(&mut self, mode: PresentationMode) {
        self.write_u8(match mode {
            PresentationMode::VSync => 0,
            PresentationMode::AdaptiveSync => 1,
        });
    }

    fn write_outcome(&mut self, outcome: FrameOutcome) {
        self.write_u8(match outcome {
            FrameOutcome::Presented => 0,
            FrameOutcome::Failed => 1,
            FrameOutcome::Skipped => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_start(&mut self, e: &FrameStartEvent) {
        self.write_u8(TAG_FRAME_START);
        self.write_u64(e.frame_index);
        self.write_u32(e.output.0);
        self.write_u64(e.now.0);
        self.write_u64(e.target_presentation.0);
        self.write_mode(e.mode);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.0);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.0);
    }

    fn on_damage(&mut self, e: &DamageEvent) {
        self.write_u8(TAG_DAMAGE);
        self.write_u64(e.frame_index);
        self.write_u32(e.output_layer.0);
        self.write_u32(e.rect_count);
        for v in [e.bounds.x0, e.bounds.y0, e.bounds.x1, e.bounds.y1] {
            self.write_f64(v);
        }
    }

    fn on_frame_complete(&mut self, e: &FrameCompleteEvent) {
        self.write_u8(TAG_FRAME_COMPLETE);
        self.write_u64(e.frame_index);
        self.write_u32(e.output.0);
        self.write_outcome(e.outcome);
        self.write_u64(e.timestamp.0);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_u32(s.output.0);
        self.write_u64(s.now.0);
        self.write_u64(s.target_presentation.0);
        for nanos in s.phase_nanos {
            self.write_u64(nanos);
        }
        self.write_u32(s.painted_layers);
        self.write_u8(u8::from(s.skipped));
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Copy, Debug)]
pub enum RecordedEvent {
    /// A [`FrameStartEvent`].
    FrameStart(FrameStartEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`DamageEvent`].
    Damage(DamageEvent),
    /// A [`FrameCompleteEvent`].
    FrameComplete(FrameCompleteEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
}

/// Decodes bytes produced by [`RecorderSink`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.take().map(f64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Collect,
            1 => PhaseKind::PrePaint,
            2 => PhaseKind::Paint,
            3 => PhaseKind::PostPaint,
            _ => PhaseKind::Present,
        })
    }

    fn read_mode(&mut self) -> Option<PresentationMode> {
        Some(match self.read_u8()? {
            0 => PresentationMode::VSync,
            _ => PresentationMode::AdaptiveSync,
        })
    }

    fn read_outcome(&mut self) -> Option<FrameOutcome> {
        Some(match self.read_u8()? {
            0 => FrameOutcome::Presented,
            1 => FrameOutcome::Failed,
            _ => FrameOutcome::Skipped,
        })
    }

    fn decode_frame_start(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameStart(FrameStartEvent {
            frame_index: self.read_u64()?,
            output: OutputId(self.read_u32()?),
            now: self.read_time()?,
            target_presentation: self.read_time()?,
            mode: self.read_mode()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_damage(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Damage(DamageEvent {
            frame_index: self.read_u64()?,
            output_layer: OutputLayerId(self.read_u32()?),
            rect_count: self.read_u32()?,
            bounds: Rect::new(
                self.read_f64()?,
                self.read_f64()?,
                self.read_f64()?,
                self.read_f64()?,
            ),
        }))
    }

    fn decode_frame_complete(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameComplete(FrameCompleteEvent {
            frame_index: self.read_u64()?,
            output: OutputId(self.read_u32()?),
            outcome: self.read_outcome()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        let frame_index = self.read_u64()?;
        let output = OutputId(self.read_u32()?);
        let now = self.read_time()?;
        let target_presentation = self.read_time()?;
        let mut phase_nanos = [0; 5];
        for nanos in &mut phase_nanos {
            *nanos = self.read_u64()?;
        }
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index,
            output,
            now,
            target_presentation,
            phase_nanos,
            painted_layers: self.read_u32()?,
            skipped: self.read_u8()? != 0,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_FRAME_START => self.decode_frame_start(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_DAMAGE => self.decode_damage(),
            TAG_FRAME_COMPLETE => self.decode_frame_complete(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            // Unknown tag: the rest of the stream cannot be framed.
            _ => None,
        }
    }
}
