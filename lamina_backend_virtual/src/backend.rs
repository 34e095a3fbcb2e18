// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outputs, presentation and simulated vblank.

use core::time::Duration;
use std::collections::BTreeMap;

use kurbo::{Point, Rect, Size};
use lamina_core::backend::{OutputBackend, PresentError, PresentEvent, PresentEventQueue};
use lamina_core::output::{Output, OutputError, OutputId, OutputMode, PixelSize};
use lamina_core::output_layer::{OutputLayer, OutputLayerId, OutputLayerKind};
use lamina_core::render_loop::{FrameRequest, RenderLoopConfig};
use lamina_core::time::HostTime;

use crate::image::VirtualImage;
use crate::layer::VirtualOutputLayer;

/// Parameters of a virtual output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualOutputConfig {
    /// Mode resolution.
    pub size: PixelSize,
    /// Refresh rate in millihertz.
    pub refresh_rate: u32,
    /// Buffers per output layer.
    pub swapchain_length: usize,
    /// Logical size of the cursor plane.
    pub cursor_size: Size,
}

impl VirtualOutputConfig {
    /// 1920×1080 at 60 Hz, triple buffered.
    pub const FULL_HD: Self = Self {
        size: PixelSize::new(1920, 1080),
        refresh_rate: 60_000,
        swapchain_length: 3,
        cursor_size: Size::new(64.0, 64.0),
    };

    /// A small 320×240 output at 60 Hz, double buffered.
    pub const SMALL: Self = Self {
        size: PixelSize::new(320, 240),
        refresh_rate: 60_000,
        swapchain_length: 2,
        cursor_size: Size::new(16.0, 16.0),
    };
}

impl Default for VirtualOutputConfig {
    fn default() -> Self {
        Self::SMALL
    }
}

#[derive(Debug)]
struct InFlight {
    frame_index: u64,
    due: HostTime,
    dropped: bool,
}

#[derive(Debug)]
struct VirtualOutput {
    primary: OutputLayerId,
    cursor: OutputLayerId,
    refresh_interval: Duration,
    last_vblank: Option<HostTime>,
    in_flight: Option<InFlight>,
    fail_next_present: bool,
    drop_next_presentation: bool,
    captured: Option<VirtualImage>,
    presented_frames: u64,
}

impl VirtualOutput {
    /// First simulated vblank strictly after `now`. Until the first one
    /// the display adopts the compositor's prediction.
    fn next_vblank(&self, now: HostTime, predicted: HostTime) -> HostTime {
        let Some(last) = self.last_vblank else {
            return if predicted > now {
                predicted
            } else {
                now + self.refresh_interval
            };
        };
        let interval = self.refresh_interval.as_nanos().max(1);
        let elapsed = now.saturating_duration_since(last).as_nanos();
        let periods = elapsed / interval + 1;
        let offset = u64::try_from(periods * interval).unwrap_or(u64::MAX);
        HostTime(last.0.saturating_add(offset))
    }
}

/// A headless backend with simulated displays.
#[derive(Debug, Default)]
pub struct VirtualBackend {
    outputs: BTreeMap<OutputId, VirtualOutput>,
    layers: BTreeMap<OutputLayerId, VirtualOutputLayer>,
    next_output: u32,
    next_layer: u32,
}

impl VirtualBackend {
    /// Creates a backend without outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugs in an output with a single mode and a primary and cursor
    /// layer. The output is named `VIRTUAL-<n>`, counting from 1.
    pub fn create_output(
        &mut self,
        config: VirtualOutputConfig,
        render_loop: RenderLoopConfig,
    ) -> Result<Output, OutputError> {
        self.next_output += 1;
        let id = OutputId(self.next_output);
        let output = Output::new(
            id,
            format!("VIRTUAL-{}", self.next_output),
            vec![OutputMode {
                size: config.size,
                refresh_rate: config.refresh_rate,
                preferred: true,
            }],
            render_loop,
        )?;

        let primary = self.add_layer(
            OutputLayerKind::Primary,
            output.geometry(),
            output.scale(),
            config.swapchain_length,
        );
        let cursor = self.add_layer(
            OutputLayerKind::Cursor,
            Rect::from_origin_size(output.position(), config.cursor_size),
            output.scale(),
            config.swapchain_length,
        );
        self.outputs.insert(
            id,
            VirtualOutput {
                primary,
                cursor,
                refresh_interval: output.render_loop().refresh_interval(),
                last_vblank: None,
                in_flight: None,
                fail_next_present: false,
                drop_next_presentation: false,
                captured: None,
                presented_frames: 0,
            },
        );
        tracing::info!(
            output = ?id,
            name = output.name(),
            size = ?config.size,
            "virtual output created"
        );
        Ok(output)
    }

    /// Unplugs an output and its layers.
    pub fn destroy_output(&mut self, id: OutputId) {
        if let Some(output) = self.outputs.remove(&id) {
            self.layers.remove(&output.primary);
            self.layers.remove(&output.cursor);
            tracing::info!(output = ?id, "virtual output destroyed");
        }
    }

    /// Primary layer id of an output.
    #[must_use]
    pub fn primary_layer(&self, output: OutputId) -> Option<OutputLayerId> {
        self.outputs.get(&output).map(|o| o.primary)
    }

    /// Cursor layer id of an output.
    #[must_use]
    pub fn cursor_layer(&self, output: OutputId) -> Option<OutputLayerId> {
        self.outputs.get(&output).map(|o| o.cursor)
    }

    /// Looks up a layer.
    #[must_use]
    pub fn layer(&self, id: OutputLayerId) -> Option<&VirtualOutputLayer> {
        self.layers.get(&id)
    }

    /// Looks up a layer for reconfiguration or failure injection.
    pub fn layer_mut(&mut self, id: OutputLayerId) -> Option<&mut VirtualOutputLayer> {
        self.layers.get_mut(&id)
    }

    /// Moves the cursor plane of an output to `position` (global space).
    pub fn move_cursor(&mut self, output: OutputId, position: Point) {
        let Some(id) = self.cursor_layer(output) else {
            return;
        };
        if let Some(layer) = self.layers.get_mut(&id) {
            let geometry = Rect::from_origin_size(position, layer.geometry().size());
            let scale = layer.scale();
            layer.set_geometry(geometry, scale);
        }
    }

    /// Makes the next `present` on `output` return an error.
    pub fn fail_next_present(&mut self, output: OutputId) {
        if let Some(o) = self.outputs.get_mut(&output) {
            o.fail_next_present = true;
        }
    }

    /// Makes the next presented frame on `output` complete with
    /// [`PresentEvent::Failed`].
    pub fn drop_next_presentation(&mut self, output: OutputId) {
        if let Some(o) = self.outputs.get_mut(&output) {
            o.drop_next_presentation = true;
        }
    }

    /// The primary image of the last frame that reached the screen.
    #[must_use]
    pub fn capture(&self, output: OutputId) -> Option<&VirtualImage> {
        self.outputs.get(&output)?.captured.as_ref()
    }

    /// Number of frames that reached the screen.
    #[must_use]
    pub fn presented_frames(&self, output: OutputId) -> u64 {
        self.outputs.get(&output).map_or(0, |o| o.presented_frames)
    }

    /// Frame index of the frame awaiting its vblank.
    #[must_use]
    pub fn frame_in_flight(&self, output: OutputId) -> Option<u64> {
        self.outputs
            .get(&output)?
            .in_flight
            .as_ref()
            .map(|f| f.frame_index)
    }

    fn add_layer(
        &mut self,
        kind: OutputLayerKind,
        geometry: Rect,
        scale: f64,
        swapchain_length: usize,
    ) -> OutputLayerId {
        self.next_layer += 1;
        let id = OutputLayerId(self.next_layer);
        self.layers.insert(
            id,
            VirtualOutputLayer::new(id, kind, geometry, scale, swapchain_length),
        );
        id
    }
}

impl OutputBackend for VirtualBackend {
    fn output_layers(&self, output: OutputId) -> Vec<OutputLayerId> {
        self.outputs
            .get(&output)
            .map(|o| vec![o.primary, o.cursor])
            .unwrap_or_default()
    }

    fn output_changed(&mut self, output: &Output) {
        let Some(o) = self.outputs.get_mut(&output.id()) else {
            return;
        };
        o.refresh_interval = output.render_loop().refresh_interval();
        if let Some(layer) = self.layers.get_mut(&o.primary) {
            layer.set_geometry(output.geometry(), output.scale());
        }
        if let Some(layer) = self.layers.get_mut(&o.cursor) {
            let geometry = layer.geometry();
            layer.set_geometry(geometry, output.scale());
        }
    }

    fn output_layer(&mut self, id: OutputLayerId) -> Option<&mut dyn OutputLayer> {
        self.layers
            .get_mut(&id)
            .map(|layer| layer as &mut dyn OutputLayer)
    }

    fn present(
        &mut self,
        output: OutputId,
        frame: &FrameRequest,
        now: HostTime,
    ) -> Result<(), PresentError> {
        let o = self
            .outputs
            .get_mut(&output)
            .ok_or(PresentError::UnknownOutput(output))?;
        if o.in_flight.is_some() {
            return Err(PresentError::Busy(output));
        }
        if core::mem::take(&mut o.fail_next_present) {
            return Err(PresentError::Rejected {
                output,
                frame_index: frame.frame_index,
            });
        }
        for id in [o.primary, o.cursor] {
            if let Some(layer) = self.layers.get_mut(&id) {
                layer.flip();
            }
        }
        let due = o.next_vblank(now, frame.target_presentation);
        o.in_flight = Some(InFlight {
            frame_index: frame.frame_index,
            due,
            dropped: core::mem::take(&mut o.drop_next_presentation),
        });
        tracing::trace!(
            output = ?output,
            frame = frame.frame_index,
            ?due,
            "frame queued for vblank"
        );
        Ok(())
    }

    fn poll_presentations(&mut self, now: HostTime, events: &mut PresentEventQueue) {
        for (&id, o) in &mut self.outputs {
            let Some(in_flight) = o.in_flight.take_if(|f| f.due <= now) else {
                continue;
            };
            o.last_vblank = Some(in_flight.due);
            if in_flight.dropped {
                events.push(PresentEvent::Failed {
                    output: id,
                    frame_index: in_flight.frame_index,
                });
                continue;
            }
            o.presented_frames += 1;
            o.captured = self
                .layers
                .get(&o.primary)
                .and_then(VirtualOutputLayer::front_image)
                .cloned();
            events.push(PresentEvent::Presented {
                output: id,
                frame_index: in_flight.frame_index,
                timestamp: in_flight.due,
            });
        }
    }

    fn next_event_time(&self) -> Option<HostTime> {
        self.outputs
            .values()
            .filter_map(|o| o.in_flight.as_ref().map(|f| f.due))
            .min()
    }
}
