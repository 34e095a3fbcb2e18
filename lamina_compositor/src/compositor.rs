// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multi-output frame loop.

use std::collections::BTreeMap;

use lamina_core::backend::{OutputBackend, PresentEvent, PresentEventQueue};
use lamina_core::output::{DpmsMode, Output, OutputConfiguration, OutputId};
use lamina_core::output_layer::{OutputLayerId, OutputLayerKind};
use lamina_core::time::HostTime;
use lamina_core::trace::{TraceSink, Tracer};

use crate::clock::{Clock, MonotonicClock};
use crate::error::CompositorError;
use crate::scene::{PaintOutcome, Scene};

#[derive(Debug)]
struct OutputSlot {
    output: Output,
    scene: Scene,
    /// Output layers the backend reported when the output was added.
    layers: Vec<OutputLayerId>,
}

/// Drives the outputs of one backend.
///
/// Each output has a [`Scene`] and the render loop inside its [`Output`].
/// [`dispatch`](Self::dispatch) does all the work of one event-loop
/// iteration and returns when it wants to be called next.
pub struct Compositor<B> {
    backend: B,
    outputs: BTreeMap<OutputId, OutputSlot>,
    events: PresentEventQueue,
    clock: Box<dyn Clock>,
    sink: Option<Box<dyn TraceSink>>,
}

impl<B: core::fmt::Debug> core::fmt::Debug for Compositor<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Compositor")
            .field("backend", &self.backend)
            .field("outputs", &self.outputs)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl<B: OutputBackend> Compositor<B> {
    /// Creates a compositor reading the monotonic clock.
    pub fn new(backend: B) -> Self {
        Self::with_clock(backend, Box::new(MonotonicClock))
    }

    /// Creates a compositor with a custom time source.
    pub fn with_clock(backend: B, clock: Box<dyn Clock>) -> Self {
        Self {
            backend,
            outputs: BTreeMap::new(),
            events: PresentEventQueue::default(),
            clock,
            sink: None,
        }
    }

    /// Replaces the presentation event queue with one of `capacity`.
    pub fn set_event_queue_capacity(&mut self, capacity: usize) {
        self.events = PresentEventQueue::with_capacity(capacity);
    }

    /// Installs a sink for frame-loop trace events.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink>>) {
        self.sink = sink;
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, e.g. to inject failures in tests.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Current time of the compositor's clock.
    pub fn now(&self) -> HostTime {
        self.clock.now()
    }

    /// Presentation events lost to queue overflow.
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped_count()
    }

    // -- Outputs --

    /// Starts managing `output`. Its scene is composited on the backend's
    /// primary output layer and is painted in full by the next
    /// [`dispatch`](Self::dispatch).
    pub fn add_output(&mut self, output: Output) -> Result<(), CompositorError> {
        let id = output.id();
        if self.outputs.contains_key(&id) {
            return Err(CompositorError::DuplicateOutput(id));
        }
        let layers = self.backend.output_layers(id);
        let primary = layers
            .iter()
            .copied()
            .find(|&ol| {
                self.backend
                    .output_layer(ol)
                    .is_some_and(|layer| layer.kind() == OutputLayerKind::Primary)
            })
            .ok_or(CompositorError::NoPrimaryLayer(id))?;
        tracing::info!(output = ?id, name = output.name(), geometry = ?output.geometry(), "output added");
        let scene = Scene::new(&output, primary);
        self.outputs.insert(
            id,
            OutputSlot {
                output,
                scene,
                layers,
            },
        );
        Ok(())
    }

    /// Stops managing an output and forgets its output layers in every
    /// other scene. Works whether or not the backend still knows the output.
    pub fn remove_output(&mut self, id: OutputId) -> Option<(Output, Scene)> {
        let slot = self.outputs.remove(&id)?;
        let mut layers = slot.layers;
        for ol in self.backend.output_layers(id) {
            if !layers.contains(&ol) {
                layers.push(ol);
            }
        }
        for other in self.outputs.values_mut() {
            for &ol in &layers {
                other.scene.forget_output_layer(ol);
            }
        }
        tracing::info!(output = ?id, "output removed");
        Some((slot.output, slot.scene))
    }

    /// Ids of all managed outputs, in ascending order.
    pub fn output_ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        self.outputs.keys().copied()
    }

    /// Looks up an output.
    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id).map(|slot| &slot.output)
    }

    /// All managed outputs.
    pub fn outputs(&self) -> impl Iterator<Item = &Output> + '_ {
        self.outputs.values().map(|slot| &slot.output)
    }

    /// Looks up the scene of an output.
    pub fn scene(&self, id: OutputId) -> Option<&Scene> {
        self.outputs.get(&id).map(|slot| &slot.scene)
    }

    /// Looks up the scene of an output for modification.
    pub fn scene_mut(&mut self, id: OutputId) -> Option<&mut Scene> {
        self.outputs.get_mut(&id).map(|slot| &mut slot.scene)
    }

    /// Requests a frame on an output. Unknown ids are ignored.
    pub fn schedule_repaint(&mut self, id: OutputId, now: HostTime) {
        match self.outputs.get_mut(&id) {
            Some(slot) => slot.output.render_loop_mut().schedule_repaint(now),
            None => tracing::debug!(output = ?id, "repaint for unknown output ignored"),
        }
    }

    /// Changes the power state of an output. Turning it back on repaints it
    /// in full.
    pub fn set_dpms(
        &mut self,
        id: OutputId,
        mode: DpmsMode,
        now: HostTime,
    ) -> Result<(), CompositorError> {
        let slot = self
            .outputs
            .get_mut(&id)
            .ok_or(CompositorError::UnknownOutput(id))?;
        let was_on = slot.output.dpms() == DpmsMode::On;
        slot.output.set_dpms(mode, now);
        if mode == DpmsMode::On && !was_on {
            let root = slot.scene.root();
            slot.scene.tree_mut().add_repaint_full(root);
        }
        Ok(())
    }

    /// Applies a configuration to several outputs at once.
    ///
    /// Every change set is validated before any is applied, so on error no
    /// output was modified.
    pub fn apply_configuration(
        &mut self,
        configuration: &OutputConfiguration,
        now: HostTime,
    ) -> Result<(), CompositorError> {
        for (id, changes) in configuration.iter() {
            let slot = self
                .outputs
                .get(&id)
                .ok_or(CompositorError::UnknownOutput(id))?;
            slot.output.validate_change_set(changes)?;
        }
        for (id, changes) in configuration.iter() {
            let Some(slot) = self.outputs.get_mut(&id) else {
                continue;
            };
            slot.output.apply_change_set(changes, now)?;
            self.backend.output_changed(&slot.output);
            slot.scene.set_output_geometry(slot.output.geometry());
        }
        Ok(())
    }

    // -- Frame loop --

    /// Runs one iteration of the frame loop at `now`:
    ///
    /// 1. routes presentation events to their render loops,
    /// 2. turns repaint requests of the scenes into scheduled frames,
    /// 3. paints every due frame.
    ///
    /// Returns the earliest time something needs attention again.
    ///
    /// The compositor's clock only measures how long painting takes.
    pub fn dispatch(&mut self, now: HostTime) -> Option<HostTime> {
        let Self {
            backend,
            outputs,
            events,
            clock,
            sink,
        } = self;
        let mut tracer = match sink {
            Some(sink) => Tracer::new(&mut **sink),
            None => Tracer::none(),
        };

        backend.poll_presentations(now, events);
        while let Some(event) = events.pop() {
            let Some(slot) = outputs.get_mut(&event.output()) else {
                tracing::debug!(?event, "presentation event for unknown output");
                continue;
            };
            match event {
                PresentEvent::Presented {
                    frame_index,
                    timestamp,
                    ..
                } => {
                    slot.output
                        .render_loop_mut()
                        .notify_frame_completed(timestamp, now);
                    slot.scene.frame_presented(frame_index, timestamp, &mut tracer);
                }
                PresentEvent::Failed { frame_index, .. } => {
                    tracing::warn!(output = ?event.output(), frame_index, "frame dropped by backend");
                    slot.output.render_loop_mut().notify_frame_failed(now);
                    slot.scene.frame_failed(frame_index, now, &mut tracer);
                }
            }
        }

        for slot in outputs.values_mut() {
            if slot.scene.tree_mut().take_repaint_requested() {
                slot.output.render_loop_mut().schedule_repaint(now);
            }
            let Some(frame) = slot.output.render_loop_mut().take_due_frame(now) else {
                continue;
            };
            tracing::debug!(
                output = ?slot.output.id(),
                frame = frame.frame_index,
                target = ?frame.target_presentation,
                "painting frame"
            );
            let outcome = slot.scene.paint(
                &mut slot.output,
                backend,
                &frame,
                &**clock,
                &mut tracer,
            );
            if outcome == PaintOutcome::Failed {
                tracing::debug!(output = ?slot.output.id(), frame = frame.frame_index, "frame failed");
            }
            // Requests made while painting.
            if slot.scene.tree_mut().take_repaint_requested() {
                slot.output.render_loop_mut().schedule_repaint(now);
            }
        }

        self.next_wake()
    }

    /// Earliest time a render loop or the backend needs attention.
    pub fn next_wake(&self) -> Option<HostTime> {
        self.outputs
            .values()
            .filter_map(|slot| slot.output.render_loop().next_wake())
            .chain(self.backend.next_event_time())
            .min()
    }
}
