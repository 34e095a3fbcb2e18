// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Times are
//! printed in microseconds.

use std::io::Write;

use lamina_core::time::HostTime;
use lamina_core::trace::{
    DamageEvent, FrameCompleteEvent, FrameOutcome, FrameStartEvent, FrameSummary,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn us(t: HostTime) -> f64 {
    nanos_to_us(t.0)
}

#[expect(
    clippy::cast_precision_loss,
    reason = "display only; sub-nanosecond precision is irrelevant"
)]
fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Collect => "collect",
        PhaseKind::PrePaint => "pre-paint",
        PhaseKind::Paint => "paint",
        PhaseKind::PostPaint => "post-paint",
        PhaseKind::Present => "present",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_start(&mut self, e: &FrameStartEvent) {
        let _ = writeln!(
            self.writer,
            "[frame] frame={} output={} now={:.1}µs target={:.1}µs mode={:?}",
            e.frame_index,
            e.output.0,
            us(e.now),
            us(e.target_presentation),
            e.mode,
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} at {:.1}µs",
            e.frame_index,
            phase_name(e.phase),
            us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} at {:.1}µs",
            e.frame_index,
            phase_name(e.phase),
            us(e.timestamp),
        );
    }

    fn on_damage(&mut self, e: &DamageEvent) {
        let b = e.bounds;
        let _ = writeln!(
            self.writer,
            "[damage] frame={} layer={} rects={} bounds=({},{})-({},{})",
            e.frame_index, e.output_layer.0, e.rect_count, b.x0, b.y0, b.x1, b.y1,
        );
    }

    fn on_frame_complete(&mut self, e: &FrameCompleteEvent) {
        let outcome = match e.outcome {
            FrameOutcome::Presented => "presented",
            FrameOutcome::Failed => "FAILED",
            FrameOutcome::Skipped => "skipped",
        };
        let _ = writeln!(
            self.writer,
            "[complete] frame={} output={} {outcome} at {:.1}µs",
            e.frame_index,
            e.output.0,
            us(e.timestamp),
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let _ = write!(
            self.writer,
            "[summary] frame={} output={} layers={}",
            s.frame_index, s.output.0, s.painted_layers,
        );
        for phase in PhaseKind::ALL {
            let _ = write!(
                self.writer,
                " {}={:.1}µs",
                phase_name(phase),
                nanos_to_us(s.phase_duration(phase)),
            );
        }
        let _ = writeln!(self.writer, "{}", if s.skipped { " skipped" } else { "" });
    }
}

#[cfg(test)]
mod tests {
    use lamina_core::output::OutputId;
    use lamina_core::render_loop::PresentationMode;

    use super::*;

    #[test]
    fn one_line_per_event() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_frame_start(&FrameStartEvent {
            frame_index: 1,
            output: OutputId(3),
            now: HostTime(1_000_000),
            target_presentation: HostTime(17_000_000),
            mode: PresentationMode::VSync,
        });
        sink.on_frame_complete(&FrameCompleteEvent {
            frame_index: 1,
            output: OutputId(3),
            outcome: FrameOutcome::Skipped,
            timestamp: HostTime(17_000_000),
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2, "got: {output}");
        assert!(lines[0].starts_with("[frame] frame=1 output=3"), "got: {output}");
        assert!(lines[1].contains("skipped at 17000.0µs"), "got: {output}");
    }

    #[test]
    fn summary_lists_every_phase() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_frame_summary(&FrameSummary {
            frame_index: 4,
            output: OutputId(1),
            now: HostTime::ZERO,
            target_presentation: HostTime::ZERO,
            phase_nanos: [1_500, 0, 250_000, 0, 0],
            painted_layers: 3,
            skipped: false,
        });
        let output = String::from_utf8(sink.into_writer()).unwrap();
        assert!(output.contains("collect=1.5µs"), "got: {output}");
        assert!(output.contains("paint=250.0µs"), "got: {output}");
        assert!(output.contains("layers=3"), "got: {output}");
        assert!(output.ends_with('\n'), "got: {output}");
    }
}
