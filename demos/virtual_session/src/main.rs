// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runs a compositor on a simulated 60 Hz display for a few seconds.
//!
//! A window slides across a background while a pulsing badge animates
//! itself through post-paint repaints. Frame-loop events are recorded and
//! written as a Chrome trace at the end.
//!
//! ```text
//! virtual_session [CONFIG.toml] [TRACE.json]
//! ```
//!
//! Logging is configured through `RUST_LOG` (default `info`). Setting
//! `LAMINA_PRETTY_TRACE` also prints every frame-loop event to stderr.

use core::ops::ControlFlow;
use core::time::Duration;
use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::rc::Rc;

use kurbo::Rect;
use lamina_backend_virtual::{VirtualBackend, VirtualOutputConfig};
use lamina_compositor::{Compositor, CompositorConfig, CompositorError, Driver};
use lamina_core::delegate::{PaintContext, PaintData, RenderLayerDelegate, SolidColorDelegate};
use lamina_core::layer::LayerId;
use lamina_core::output::OutputId;
use lamina_core::output_layer::{Argb32, RenderTarget};
use lamina_core::time::HostTime;
use lamina_core::trace::{
    DamageEvent, FrameCompleteEvent, FrameStartEvent, FrameSummary, PhaseBeginEvent,
    PhaseEndEvent, TraceSink,
};
use lamina_debug::pretty::PrettyPrintSink;
use lamina_debug::recorder::RecorderSink;
use tracing_subscriber::EnvFilter;

const RUN_TIME: Duration = Duration::from_secs(3);
const WINDOW_SIZE: f64 = 80.0;
/// Horizontal window speed in logical pixels per second.
const WINDOW_SPEED: f64 = 120.0;

/// Fans events out to a shared recorder and an optional pretty printer.
struct SessionSink {
    recorder: Rc<RefCell<RecorderSink>>,
    pretty: Option<PrettyPrintSink>,
}

macro_rules! forward {
    ($($method:ident($event:ty)),* $(,)?) => {
        $(
            fn $method(&mut self, e: &$event) {
                self.recorder.borrow_mut().$method(e);
                if let Some(pretty) = &mut self.pretty {
                    pretty.$method(e);
                }
            }
        )*
    };
}

impl TraceSink for SessionSink {
    forward!(
        on_frame_start(FrameStartEvent),
        on_phase_begin(PhaseBeginEvent),
        on_phase_end(PhaseEndEvent),
        on_damage(DamageEvent),
        on_frame_complete(FrameCompleteEvent),
        on_frame_summary(FrameSummary),
    );
}

/// A badge whose brightness follows the presentation time.
struct Pulse {
    started: HostTime,
}

impl RenderLayerDelegate for Pulse {
    fn paint(&mut self, target: &mut dyn RenderTarget, data: &PaintData) {
        let elapsed = data
            .presentation_time
            .saturating_duration_since(self.started)
            .as_secs_f64();
        let level = (elapsed * core::f64::consts::TAU).sin() * 0.5 + 0.5;
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "level is within 0..=1"
        )]
        let g = (level * 255.0).round() as u8;
        let rect = data.layer_to_target.transform_rect_bbox(data.bounds);
        target.fill_rect(rect, Argb32::rgb(0x20, g, 0x40));
    }

    fn post_paint(&mut self, ctx: &mut PaintContext<'_>) {
        ctx.add_repaint_full();
    }
}

struct Stage {
    output: OutputId,
    window: LayerId,
    started: HostTime,
}

impl Stage {
    fn build(compositor: &mut Compositor<VirtualBackend>, output: OutputId) -> Option<Self> {
        let started = compositor.now();
        let geometry = compositor.output(output)?.geometry();
        let scene = compositor.scene_mut(output)?;
        let root = scene.root();
        let tree = scene.tree_mut();

        let background = tree.create_sublayer(
            root,
            SolidColorDelegate {
                color: Argb32::rgb(0x18, 0x18, 0x30),
                occluding: true,
            },
        );
        tree.set_geometry(background, geometry);

        let window = tree.create_sublayer(
            root,
            SolidColorDelegate {
                color: Argb32::rgb(0xe0, 0x60, 0x30),
                occluding: true,
            },
        );
        tree.set_geometry(window, Rect::new(0.0, 40.0, WINDOW_SIZE, 40.0 + WINDOW_SIZE));

        let badge = tree.create_sublayer(root, Pulse { started });
        tree.set_geometry(
            badge,
            Rect::new(geometry.x1 - 40.0, 8.0, geometry.x1 - 8.0, 40.0),
        );

        Some(Self {
            output,
            window,
            started,
        })
    }

    /// Slides the window back and forth across the output.
    fn animate(&self, compositor: &mut Compositor<VirtualBackend>) {
        let now = compositor.now();
        let Some(width) = compositor.output(self.output).map(|o| o.geometry().width()) else {
            return;
        };
        let span = (width - WINDOW_SIZE).max(1.0);
        let travel = now.saturating_duration_since(self.started).as_secs_f64() * WINDOW_SPEED;
        let phase = travel % (2.0 * span);
        let x = if phase < span { phase } else { 2.0 * span - phase };
        if let Some(scene) = compositor.scene_mut(self.output) {
            let y0 = scene.tree().geometry(self.window).y0;
            scene
                .tree_mut()
                .set_geometry(self.window, Rect::new(x, y0, x + WINDOW_SIZE, y0 + WINDOW_SIZE));
        }
    }
}

fn main() -> Result<(), CompositorError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => CompositorConfig::load(&path)?,
        None => CompositorConfig::default(),
    };
    let trace_path = args.next();

    // -- backend and compositor --
    let mut backend = VirtualBackend::new();
    let output = backend.create_output(
        VirtualOutputConfig::SMALL,
        config.render_loop.to_config(),
    )?;
    let output_id = output.id();

    let recorder = Rc::new(RefCell::new(RecorderSink::new()));
    let mut compositor = Compositor::new(backend);
    compositor.set_event_queue_capacity(config.event_queue_capacity);
    compositor.set_trace_sink(Some(Box::new(SessionSink {
        recorder: Rc::clone(&recorder),
        pretty: std::env::var_os("LAMINA_PRETTY_TRACE").map(|_| PrettyPrintSink::stderr()),
    })));
    compositor.add_output(output)?;
    let configuration = config.output_configuration(compositor.outputs());
    let now = compositor.now();
    compositor.apply_configuration(&configuration, now)?;

    let Some(stage) = Stage::build(&mut compositor, output_id) else {
        return Err(CompositorError::UnknownOutput(output_id));
    };

    // -- event loop --
    let mut driver = Driver::new(compositor, config.idle_timeout())?;
    let deadline = stage.started + RUN_TIME;
    driver.run(|compositor| {
        if compositor.now() >= deadline {
            return ControlFlow::Break(());
        }
        stage.animate(compositor);
        ControlFlow::Continue(())
    })?;

    let compositor = driver.into_compositor();
    if let Some(output) = compositor.output(output_id) {
        let render_loop = output.render_loop();
        tracing::info!(
            frames = render_loop.frame_counter(),
            presented = compositor.backend().presented_frames(output_id),
            render_estimate = ?render_loop.render_estimate(),
            dropped_events = compositor.dropped_events(),
            "session finished"
        );
    }

    if let Some(path) = trace_path {
        let mut writer = BufWriter::new(File::create(&path)?);
        lamina_debug::chrome::export(recorder.borrow().as_bytes(), &mut writer)?;
        tracing::info!(%path, "chrome trace written");
    }
    Ok(())
}
