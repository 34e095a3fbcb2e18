// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end frame loop scenarios on the virtual backend.

use core::time::Duration;

use kurbo::Rect;
use lamina_backend_virtual::{VirtualBackend, VirtualOutputConfig};
use lamina_compositor::clock::{Clock, ManualClock};
use lamina_compositor::{Compositor, CompositorConfig, CompositorError};
use lamina_core::delegate::SolidColorDelegate;
use lamina_core::layer::LayerId;
use lamina_core::output::{DpmsMode, OutputChangeSet, OutputConfiguration, OutputId};
use lamina_core::output_layer::{Argb32, OutputLayerId};
use lamina_core::region::Region;
use lamina_core::render_loop::{RenderLoopConfig, RenderLoopState};
use lamina_core::time::HostTime;

const START: HostTime = HostTime::from_millis(1_000);
const BLUE: Argb32 = Argb32::rgb(0, 0, 0xff);
const RED: Argb32 = Argb32::rgb(0xff, 0, 0);
const GREEN: Argb32 = Argb32::rgb(0, 0xff, 0);

struct Session {
    compositor: Compositor<VirtualBackend>,
    clock: ManualClock,
    output: OutputId,
    primary: OutputLayerId,
    cursor: OutputLayerId,
}

impl Session {
    fn new(config: VirtualOutputConfig) -> Self {
        let clock = ManualClock::new(START);
        let mut backend = VirtualBackend::new();
        let output = backend
            .create_output(config, RenderLoopConfig::default())
            .unwrap();
        let id = output.id();
        let primary = backend.primary_layer(id).unwrap();
        let cursor = backend.cursor_layer(id).unwrap();
        let mut compositor = Compositor::with_clock(backend, Box::new(clock.clone()));
        compositor.add_output(output).unwrap();
        Self {
            compositor,
            clock,
            output: id,
            primary,
            cursor,
        }
    }

    fn now(&self) -> HostTime {
        self.clock.now()
    }

    /// Dispatches and jumps from wake to wake until nothing is due before
    /// `until`, then leaves the clock there.
    fn run_until(&mut self, until: HostTime) {
        for _ in 0..10_000 {
            let now = self.now();
            match self.compositor.dispatch(now) {
                Some(wake) if wake <= until => self.clock.set(wake.max(now)),
                _ => {
                    self.clock.set(until.max(now));
                    return;
                }
            }
        }
        panic!("frame loop did not settle");
    }

    fn run_for(&mut self, duration: Duration) {
        self.run_until(self.now() + duration);
    }

    /// One dispatch, then the clock moves to the returned wake.
    fn step(&mut self) {
        let now = self.now();
        if let Some(wake) = self.compositor.dispatch(now) {
            self.clock.set(wake.max(now));
        }
    }

    fn state(&self) -> RenderLoopState {
        self.compositor
            .output(self.output)
            .unwrap()
            .render_loop()
            .state()
    }

    fn frame_counter(&self) -> u64 {
        self.compositor
            .output(self.output)
            .unwrap()
            .render_loop()
            .frame_counter()
    }

    fn commits(&self, output_layer: OutputLayerId) -> u64 {
        self.compositor
            .backend()
            .layer(output_layer)
            .unwrap()
            .commit_count()
    }

    /// Damage committed with the newest primary buffer.
    fn last_damage(&self) -> Region {
        let layer = self.compositor.backend().layer(self.primary).unwrap();
        let geometry = self.output_geometry();
        layer.journal().accumulate(1, geometry)
    }

    fn output_geometry(&self) -> Rect {
        self.compositor.output(self.output).unwrap().geometry()
    }

    fn captured(&self, x: u32, y: u32) -> Option<Argb32> {
        self.compositor.backend().capture(self.output)?.pixel(x, y)
    }

    fn root(&self) -> LayerId {
        self.compositor.scene(self.output).unwrap().root()
    }

    fn add_solid(&mut self, geometry: Rect, color: Argb32) -> LayerId {
        let root = self.root();
        let tree = self.compositor.scene_mut(self.output).unwrap().tree_mut();
        let id = tree.create_sublayer(
            root,
            SolidColorDelegate {
                color,
                occluding: false,
            },
        );
        tree.set_geometry(id, geometry);
        id
    }

    fn damage_root(&mut self, rect: Rect) {
        let root = self.root();
        self.compositor
            .scene_mut(self.output)
            .unwrap()
            .tree_mut()
            .add_repaint(root, &Region::from_rect(rect));
    }
}

fn settled(config: VirtualOutputConfig) -> Session {
    let mut session = Session::new(config);
    session.run_for(Duration::from_millis(100));
    session
}

// -- Render loop scenarios --

#[test]
fn single_repaint_paints_and_presents_once() {
    let mut session = Session::new(VirtualOutputConfig::FULL_HD);
    session.run_for(Duration::from_millis(50));

    assert_eq!(session.commits(session.primary), 1);
    assert_eq!(session.commits(session.cursor), 0);
    let primary = session.compositor.backend().layer(session.primary).unwrap();
    assert!(!primary.is_frame_open());
    assert_eq!(session.compositor.backend().presented_frames(session.output), 1);
    assert_eq!(session.state(), RenderLoopState::Idle);
    // First vblank after START on the 60 Hz grid.
    let output = session.compositor.output(session.output).unwrap();
    assert_eq!(output.render_loop().last_presentation(), HostTime(61 * 16_666_666));
    assert_eq!(session.last_damage(), Region::from_rect(session.output_geometry()));

    // A request after completion schedules a new frame. Without damage it
    // is skipped and touches no output layer.
    let now = session.now();
    session.compositor.schedule_repaint(session.output, now);
    assert!(matches!(session.state(), RenderLoopState::FrameScheduled { .. }));
    session.run_for(Duration::from_millis(50));
    assert_eq!(session.frame_counter(), 2);
    assert_eq!(session.commits(session.primary), 1);
    assert_eq!(session.state(), RenderLoopState::Idle);

    session.damage_root(Rect::new(10.0, 10.0, 20.0, 20.0));
    session.run_for(Duration::from_millis(50));
    assert_eq!(session.frame_counter(), 3);
    assert_eq!(session.commits(session.primary), 2);
    assert_eq!(
        session.last_damage(),
        Region::from_rect(Rect::new(10.0, 10.0, 20.0, 20.0))
    );
}

#[test]
fn dropped_presentation_returns_to_idle() {
    let mut session = Session::new(VirtualOutputConfig::SMALL);
    session.add_solid(Rect::new(0.0, 0.0, 320.0, 240.0), BLUE);
    session
        .compositor
        .backend_mut()
        .drop_next_presentation(session.output);
    session.run_for(Duration::from_millis(50));

    assert_eq!(session.frame_counter(), 1);
    assert_eq!(session.state(), RenderLoopState::Idle);
    let output = session.compositor.output(session.output).unwrap();
    assert_eq!(output.render_loop().last_presentation(), HostTime::ZERO);
    assert!(session.compositor.backend().capture(session.output).is_none());
    // The lost damage waits for the next frame without requesting one.
    assert_eq!(session.compositor.next_wake(), None);

    let now = session.now();
    session.compositor.schedule_repaint(session.output, now);
    session.run_for(Duration::from_millis(50));
    assert_eq!(session.frame_counter(), 2);
    assert_eq!(session.commits(session.primary), 2);
    assert_eq!(session.last_damage(), Region::from_rect(session.output_geometry()));
    assert_eq!(session.captured(319, 239), Some(BLUE));
}

#[test]
fn sublayers_inherit_the_cursor_plane() {
    let mut session = Session::new(VirtualOutputConfig::SMALL);
    let cursor = session.cursor;
    let parent = session.add_solid(Rect::new(0.0, 0.0, 16.0, 16.0), RED);
    let tree = session
        .compositor
        .scene_mut(session.output)
        .unwrap()
        .tree_mut();
    tree.set_output_layer(parent, Some(cursor));
    let child = tree.create_sublayer(
        parent,
        SolidColorDelegate {
            color: GREEN,
            occluding: true,
        },
    );
    tree.set_geometry(child, Rect::new(4.0, 4.0, 8.0, 8.0));

    let tree = session.compositor.scene(session.output).unwrap().tree();
    assert_eq!(tree.assigned_output_layer(child), None);
    assert_eq!(tree.output_layer(child), Some(cursor));
    assert_eq!(tree.output_layer(session.root()), Some(session.primary));

    session.run_for(Duration::from_millis(50));
    assert_eq!(session.commits(cursor), 1);
    assert_eq!(session.commits(session.primary), 1);
    let image = session
        .compositor
        .backend()
        .layer(cursor)
        .unwrap()
        .front_image()
        .unwrap();
    assert_eq!(image.pixel(1, 1), Some(RED));
    assert_eq!(image.pixel(5, 5), Some(GREEN));
    // The primary plane does not show cursor content.
    assert_eq!(session.captured(1, 1), Some(Argb32::TRANSPARENT));
}

// -- Scheduling --

#[test]
fn requests_coalesce_into_one_frame() {
    let mut session = settled(VirtualOutputConfig::SMALL);
    let frames = session.frame_counter();

    let now = session.now();
    for _ in 0..3 {
        session.compositor.schedule_repaint(session.output, now);
    }
    session.damage_root(Rect::new(0.0, 0.0, 10.0, 10.0));
    session.damage_root(Rect::new(50.0, 50.0, 60.0, 60.0));
    session.run_for(Duration::from_millis(100));
    assert_eq!(session.frame_counter(), frames + 1);

    // Requests while a frame is in flight yield exactly one follow-up.
    session.damage_root(Rect::new(0.0, 0.0, 10.0, 10.0));
    for _ in 0..3 {
        if matches!(
            session.state(),
            RenderLoopState::WaitingForPresentation { .. }
        ) {
            break;
        }
        session.step();
    }
    assert!(matches!(
        session.state(),
        RenderLoopState::WaitingForPresentation { .. }
    ));
    let now = session.now();
    session.damage_root(Rect::new(20.0, 0.0, 30.0, 10.0));
    session.compositor.schedule_repaint(session.output, now);
    session.compositor.schedule_repaint(session.output, now);
    session.run_for(Duration::from_millis(100));
    assert_eq!(session.frame_counter(), frames + 3);
    assert_eq!(
        session.last_damage(),
        Region::from_rect(Rect::new(20.0, 0.0, 30.0, 10.0))
    );
}

#[test]
fn rejected_present_keeps_damage_for_next_frame() {
    let mut session = settled(VirtualOutputConfig::SMALL);
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(100.0, 100.0, 110.0, 110.0);

    session
        .compositor
        .backend_mut()
        .fail_next_present(session.output);
    session.damage_root(a);
    session.run_for(Duration::from_millis(100));
    assert_eq!(session.frame_counter(), 2);
    assert_eq!(session.compositor.backend().presented_frames(session.output), 1);
    assert_eq!(session.state(), RenderLoopState::Idle);
    assert_eq!(session.compositor.next_wake(), None);

    session.damage_root(b);
    session.run_for(Duration::from_millis(100));
    assert_eq!(session.compositor.backend().presented_frames(session.output), 2);
    assert_eq!(
        session.last_damage(),
        Region::from_rect(a).union(&Region::from_rect(b))
    );
}

#[test]
fn dpms_off_holds_frames_until_on() {
    let mut session = settled(VirtualOutputConfig::SMALL);
    let frames = session.frame_counter();

    let now = session.now();
    session
        .compositor
        .set_dpms(session.output, DpmsMode::Off, now)
        .unwrap();
    session.damage_root(Rect::new(0.0, 0.0, 10.0, 10.0));
    session.run_for(Duration::from_millis(200));
    assert_eq!(session.frame_counter(), frames);
    assert_eq!(session.compositor.next_wake(), None);

    let now = session.now();
    session
        .compositor
        .set_dpms(session.output, DpmsMode::On, now)
        .unwrap();
    session.run_for(Duration::from_millis(200));
    assert_eq!(session.frame_counter(), frames + 1);
    assert_eq!(session.last_damage(), Region::from_rect(session.output_geometry()));
}

// -- Damage --

#[test]
fn moved_layer_repaints_the_area_it_left() {
    let mut session = Session::new(VirtualOutputConfig::SMALL);
    session.add_solid(Rect::new(0.0, 0.0, 320.0, 240.0), BLUE);
    let window = session.add_solid(Rect::new(0.0, 0.0, 100.0, 100.0), RED);
    session.run_for(Duration::from_millis(100));
    assert_eq!(session.captured(50, 50), Some(RED));

    let first = Rect::new(200.0, 0.0, 300.0, 100.0);
    let second = Rect::new(100.0, 100.0, 200.0, 200.0);
    for geometry in [first, second] {
        session
            .compositor
            .scene_mut(session.output)
            .unwrap()
            .tree_mut()
            .set_geometry(window, geometry);
        session.run_for(Duration::from_millis(100));
    }

    // The second move lands in the buffer of the first frame; stale pixels
    // of both earlier positions are gone.
    assert_eq!(session.commits(session.primary), 3);
    assert_eq!(
        session.last_damage(),
        Region::from_rect(first).union(&Region::from_rect(second))
    );
    assert_eq!(session.captured(50, 50), Some(BLUE));
    assert_eq!(session.captured(250, 50), Some(BLUE));
    assert_eq!(session.captured(150, 150), Some(RED));
}

// -- Configuration --

#[test]
fn configuration_rescales_output() {
    let mut session = Session::new(VirtualOutputConfig::SMALL);
    session.add_solid(Rect::new(0.0, 0.0, 320.0, 240.0), BLUE);
    session.run_for(Duration::from_millis(100));

    let config = CompositorConfig::from_toml_str(
        r#"
            [[output]]
            name = "VIRTUAL-1"
            scale = 2.0

            [[output]]
            name = "HDMI-A-1"
            scale = 1.5
        "#,
    )
    .unwrap();
    let configuration = config.output_configuration(session.compositor.outputs());
    assert!(configuration.get(session.output).is_some());
    let now = session.now();
    session
        .compositor
        .apply_configuration(&configuration, now)
        .unwrap();

    let logical = Rect::new(0.0, 0.0, 160.0, 120.0);
    assert_eq!(session.output_geometry(), logical);
    let scene = session.compositor.scene(session.output).unwrap();
    assert_eq!(scene.tree().geometry(scene.root()), logical);

    session.run_for(Duration::from_millis(100));
    let capture = session.compositor.backend().capture(session.output).unwrap();
    assert_eq!(capture.pixel_size().width, 320);
    assert_eq!(capture.pixel(319, 239), Some(BLUE));
    assert_eq!(session.last_damage(), Region::from_rect(logical));
}

#[test]
fn invalid_configuration_changes_nothing() {
    let mut session = settled(VirtualOutputConfig::SMALL);
    let mut configuration = OutputConfiguration::new();
    configuration.set(
        session.output,
        OutputChangeSet {
            scale: Some(2.0),
            ..OutputChangeSet::default()
        },
    );
    configuration.set(
        OutputId(99),
        OutputChangeSet {
            scale: Some(1.0),
            ..OutputChangeSet::default()
        },
    );
    let now = session.now();
    let err = session
        .compositor
        .apply_configuration(&configuration, now)
        .unwrap_err();
    assert!(matches!(err, CompositorError::UnknownOutput(OutputId(99))));
    assert_eq!(session.output_geometry(), Rect::new(0.0, 0.0, 320.0, 240.0));

    let mut configuration = OutputConfiguration::new();
    configuration.set(
        session.output,
        OutputChangeSet {
            scale: Some(-1.0),
            ..OutputChangeSet::default()
        },
    );
    let err = session
        .compositor
        .apply_configuration(&configuration, now)
        .unwrap_err();
    assert!(matches!(err, CompositorError::Output(_)));
}

// -- Outputs --

#[test]
fn outputs_paint_independently() {
    let clock = ManualClock::new(START);
    let mut backend = VirtualBackend::new();
    let slow = backend
        .create_output(
            VirtualOutputConfig {
                refresh_rate: 30_000,
                ..VirtualOutputConfig::SMALL
            },
            RenderLoopConfig::default(),
        )
        .unwrap();
    let fast = backend
        .create_output(VirtualOutputConfig::SMALL, RenderLoopConfig::default())
        .unwrap();
    let (slow_id, fast_id) = (slow.id(), fast.id());
    let primary = backend.primary_layer(fast_id).unwrap();
    let cursor = backend.cursor_layer(fast_id).unwrap();
    let mut compositor = Compositor::with_clock(backend, Box::new(clock.clone()));
    compositor.add_output(slow).unwrap();
    compositor.add_output(fast).unwrap();

    // Ids are per backend; a second one starts over.
    let duplicate = VirtualBackend::new()
        .create_output(VirtualOutputConfig::SMALL, RenderLoopConfig::default())
        .unwrap();
    assert_eq!(duplicate.id(), slow_id);
    assert!(matches!(
        compositor.add_output(duplicate),
        Err(CompositorError::DuplicateOutput(_))
    ));

    let mut session = Session {
        compositor,
        clock,
        output: fast_id,
        primary,
        cursor,
    };
    session.run_for(Duration::from_millis(200));
    let backend = session.compositor.backend();
    assert_eq!(backend.presented_frames(slow_id), 1);
    assert_eq!(backend.presented_frames(fast_id), 1);

    let (_, scene) = session.compositor.remove_output(slow_id).unwrap();
    assert_eq!(scene.output(), slow_id);
    assert_eq!(session.compositor.output_ids().collect::<Vec<_>>(), [fast_id]);
    let now = session.now();
    session.compositor.schedule_repaint(slow_id, now);
    assert_eq!(session.compositor.next_wake(), None);
}

#[test]
fn removing_an_unplugged_output_releases_its_planes() {
    let clock = ManualClock::new(START);
    let mut backend = VirtualBackend::new();
    let unplugged = backend
        .create_output(VirtualOutputConfig::SMALL, RenderLoopConfig::default())
        .unwrap();
    let kept = backend
        .create_output(VirtualOutputConfig::SMALL, RenderLoopConfig::default())
        .unwrap();
    let (unplugged_id, kept_id) = (unplugged.id(), kept.id());
    let foreign_cursor = backend.cursor_layer(unplugged_id).unwrap();
    let mut compositor = Compositor::with_clock(backend, Box::new(clock));
    compositor.add_output(unplugged).unwrap();
    compositor.add_output(kept).unwrap();

    let scene = compositor.scene_mut(kept_id).unwrap();
    let root = scene.root();
    let tree = scene.tree_mut();
    let layer = tree.create_sublayer(
        root,
        SolidColorDelegate {
            color: RED,
            occluding: true,
        },
    );
    tree.set_output_layer(layer, Some(foreign_cursor));

    // The backend forgets the output before the compositor hears about it.
    compositor.backend_mut().destroy_output(unplugged_id);
    assert!(compositor.backend().cursor_layer(unplugged_id).is_none());
    assert!(compositor.remove_output(unplugged_id).is_some());

    let tree = compositor.scene(kept_id).unwrap().tree();
    assert_eq!(tree.assigned_output_layer(layer), None);
    assert_ne!(tree.output_layer(layer), Some(foreign_cursor));
}
