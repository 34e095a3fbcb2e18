// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads bytes recorded by a
//! [`RecorderSink`](super::recorder::RecorderSink) and writes
//! [Chrome Trace Event Format][format] JSON. Each output becomes a process so
//! frames of different displays land on separate tracks.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use lamina_core::time::HostTime;
use lamina_core::trace::PhaseKind;
use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as a JSON array of trace events, suitable for
/// `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Phase and damage events carry no output; they are attributed to the
/// output of the last frame start.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut pid = 0_u32;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::FrameStart(e) => {
                pid = e.output.0;
                events.push(json!({
                    "ph": "i",
                    "name": "FrameStart",
                    "cat": "Scheduler",
                    "ts": us(e.now),
                    "pid": pid,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "frame_index": e.frame_index,
                        "target_us": us(e.target_presentation),
                        "mode": format!("{:?}", e.mode),
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Frame",
                    "ts": us(e.timestamp),
                    "pid": pid,
                    "tid": 0,
                    "args": { "frame_index": e.frame_index }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Frame",
                    "ts": us(e.timestamp),
                    "pid": pid,
                    "tid": 0,
                    "args": { "frame_index": e.frame_index }
                }));
            }
            RecordedEvent::Damage(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Damage",
                    "cat": "Frame",
                    "ts": Value::Null,
                    "pid": pid,
                    "tid": e.output_layer.0,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "rects": e.rect_count,
                        "bounds": [e.bounds.x0, e.bounds.y0, e.bounds.x1, e.bounds.y1],
                    }
                }));
            }
            RecordedEvent::FrameComplete(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameComplete",
                    "cat": "Scheduler",
                    "ts": us(e.timestamp),
                    "pid": e.output.0,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "frame_index": e.frame_index,
                        "outcome": format!("{:?}", e.outcome),
                    }
                }));
            }
            RecordedEvent::FrameSummary(s) => {
                let phases: serde_json::Map<String, Value> = PhaseKind::ALL
                    .iter()
                    .map(|&phase| {
                        (
                            format!("{phase:?}"),
                            json!(nanos_to_us(s.phase_duration(phase))),
                        )
                    })
                    .collect();
                events.push(json!({
                    "ph": "i",
                    "name": "FrameSummary",
                    "cat": "Summary",
                    "ts": us(s.now),
                    "pid": s.output.0,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "frame_index": s.frame_index,
                        "painted_layers": s.painted_layers,
                        "skipped": s.skipped,
                        "phases_us": phases,
                    }
                }));
            }
        }
    }

    // Instant damage events share the timestamp of the enclosing paint phase.
    let mut last_ts = Value::from(0.0);
    for event in &mut events {
        if event["ts"].is_null() {
            event["ts"] = last_ts.clone();
        } else {
            last_ts = event["ts"].clone();
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn us(t: HostTime) -> f64 {
    nanos_to_us(t.0)
}

#[expect(
    clippy::cast_precision_loss,
    reason = "trace viewers take fractional microseconds as f64"
)]
fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}
