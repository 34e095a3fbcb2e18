// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-output frame scheduling.
//!
//! A [`RenderLoop`] decides *when* an output renders. It is a pure state
//! machine driven with explicit [`HostTime`] values; the event loop that owns
//! it reads the clock, arms a timer for [`next_wake`](RenderLoop::next_wake)
//! and calls [`take_due_frame`](RenderLoop::take_due_frame) when the timer
//! fires.
//!
//! ```text
//!            schedule_repaint            take_due_frame
//!   Idle ─────────────────────► FrameScheduled ─────────► Painting
//!    ▲                                                       │
//!    │ notify_frame_completed / _failed                      │ end_frame
//!    │                                                       ▼
//!    └──────────────────────────────────────── WaitingForPresentation
//!    ▲                                                       │
//!    └─────────────── notify_frame_skipped (from Painting) ──┘
//! ```
//!
//! # Deadlines
//!
//! With [`PresentationMode::VSync`] the next presentation is the first
//! vblank after `now` on the grid anchored at the last presentation
//! timestamp. The wake time is that presentation minus the predicted render
//! time and a safety margin, both chosen by the [`LatencyPolicy`]. With
//! [`PresentationMode::AdaptiveSync`] the display waits for the frame, so the
//! only lower bound is the mode's minimum refresh interval.
//!
//! # Invariants
//!
//! - At most one frame is in flight; repaint requests that arrive while a
//!   frame is scheduled, painting or awaiting presentation coalesce into a
//!   single follow-up frame.
//! - An inhibited loop never hands out a frame. Requests made while inhibited
//!   are remembered and fire once when the last inhibition is released.

mod journal;
mod policy;

pub use journal::RenderJournal;
pub use policy::{LatencyPolicy, PresentationMode, VrrPolicy};

use core::time::Duration;

use crate::time::{HostTime, duration_nanos};

/// Configuration for a [`RenderLoop`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderLoopConfig {
    /// Latency policy the loop starts with and returns to on
    /// [`reset_latency_policy`](RenderLoop::reset_latency_policy).
    pub latency_policy: LatencyPolicy,
    /// Base safety margin before the predicted presentation, scaled by the
    /// latency policy.
    pub safety_margin: Duration,
    /// Number of paint durations kept for render time prediction.
    pub journal_capacity: usize,
}

impl RenderLoopConfig {
    /// Balanced defaults for desktop use.
    #[must_use]
    pub const fn desktop() -> Self {
        Self {
            latency_policy: LatencyPolicy::Medium,
            safety_margin: Duration::from_millis(3),
            journal_capacity: RenderJournal::DEFAULT_CAPACITY,
        }
    }

    /// Starts rendering as late as possible.
    #[must_use]
    pub const fn low_latency() -> Self {
        Self {
            latency_policy: LatencyPolicy::Low,
            safety_margin: Duration::from_millis(2),
            journal_capacity: 50,
        }
    }
}

impl Default for RenderLoopConfig {
    fn default() -> Self {
        Self::desktop()
    }
}

/// Refresh rate assumed until the output reports its mode, in mHz.
pub const DEFAULT_REFRESH_RATE: u32 = 60_000;

/// Current phase of a [`RenderLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderLoopState {
    /// Nothing scheduled.
    Idle,
    /// A frame will be due at `wake`.
    FrameScheduled {
        /// Time the repaint was requested; deadlines are recomputed from it
        /// when timing parameters change.
        requested_at: HostTime,
        /// When the frame becomes due.
        wake: HostTime,
        /// Predicted presentation time.
        target: HostTime,
    },
    /// The compositor is painting a frame.
    Painting {
        /// Frame counter value of this frame.
        frame_index: u64,
        /// When painting started.
        started: HostTime,
        /// Predicted presentation time.
        target: HostTime,
    },
    /// The frame was handed to the backend and completion is pending.
    WaitingForPresentation {
        /// Frame counter value of this frame.
        frame_index: u64,
        /// Predicted presentation time.
        target: HostTime,
    },
}

/// A frame the compositor should paint now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRequest {
    /// Monotonic frame counter of the loop.
    pub frame_index: u64,
    /// When the frame is expected to reach the screen.
    pub target_presentation: HostTime,
    /// Timing discipline the frame is presented with.
    pub mode: PresentationMode,
}

/// Frame scheduler for one output.
#[derive(Debug)]
pub struct RenderLoop {
    config: RenderLoopConfig,
    refresh_rate: u32,
    refresh_interval: Duration,
    state: RenderLoopState,
    pending_repaint: bool,
    inhibit_count: u32,
    latency_policy: LatencyPolicy,
    vrr_policy: VrrPolicy,
    fullscreen_content: bool,
    last_presentation: HostTime,
    next_presentation: HostTime,
    render_journal: RenderJournal,
    frame_counter: u64,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new(RenderLoopConfig::default())
    }
}

impl RenderLoop {
    /// Creates an idle loop at [`DEFAULT_REFRESH_RATE`].
    #[must_use]
    pub fn new(config: RenderLoopConfig) -> Self {
        Self {
            refresh_rate: DEFAULT_REFRESH_RATE,
            refresh_interval: interval_for(DEFAULT_REFRESH_RATE),
            state: RenderLoopState::Idle,
            pending_repaint: false,
            inhibit_count: 0,
            latency_policy: config.latency_policy,
            vrr_policy: VrrPolicy::Never,
            fullscreen_content: false,
            last_presentation: HostTime::ZERO,
            next_presentation: HostTime::ZERO,
            render_journal: RenderJournal::with_capacity(config.journal_capacity),
            frame_counter: 0,
            config,
        }
    }

    // -- Queries --

    /// Returns the current phase.
    #[must_use]
    pub fn state(&self) -> RenderLoopState {
        self.state
    }

    /// Refresh rate in millihertz.
    #[must_use]
    pub fn refresh_rate(&self) -> u32 {
        self.refresh_rate
    }

    /// Nominal time between two vblanks.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Returns `true` while at least one inhibition is held.
    #[must_use]
    pub fn is_inhibited(&self) -> bool {
        self.inhibit_count > 0
    }

    /// Returns `true` if a repaint was requested that has not been scheduled
    /// yet.
    #[must_use]
    pub fn has_pending_repaint(&self) -> bool {
        self.pending_repaint
    }

    /// Number of frames handed out so far.
    #[must_use]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Timestamp of the most recent presentation.
    #[must_use]
    pub fn last_presentation(&self) -> HostTime {
        self.last_presentation
    }

    /// Predicted presentation time of the latest scheduled frame.
    #[must_use]
    pub fn next_presentation(&self) -> HostTime {
        self.next_presentation
    }

    /// Active latency policy.
    #[must_use]
    pub fn latency_policy(&self) -> LatencyPolicy {
        self.latency_policy
    }

    /// Active VRR policy.
    #[must_use]
    pub fn vrr_policy(&self) -> VrrPolicy {
        self.vrr_policy
    }

    /// Presentation mode the next frame will use.
    #[must_use]
    pub fn presentation_mode(&self) -> PresentationMode {
        self.vrr_policy.presentation_mode(self.fullscreen_content)
    }

    /// Paint durations measured so far.
    #[must_use]
    pub fn render_journal(&self) -> &RenderJournal {
        &self.render_journal
    }

    /// Predicted paint duration under the current latency policy.
    #[must_use]
    pub fn render_estimate(&self) -> Duration {
        self.render_journal.estimate(self.latency_policy)
    }

    /// Safety margin under the current latency policy.
    #[must_use]
    pub fn safety_margin(&self) -> Duration {
        self.latency_policy.scale_margin(self.config.safety_margin)
    }

    /// When the loop next needs attention, if a frame is scheduled.
    #[must_use]
    pub fn next_wake(&self) -> Option<HostTime> {
        match self.state {
            RenderLoopState::FrameScheduled { wake, .. } if !self.is_inhibited() => Some(wake),
            _ => None,
        }
    }

    // -- Configuration --

    /// Changes the refresh rate (mHz) and recomputes a pending wake.
    pub fn set_refresh_rate(&mut self, refresh_rate: u32) {
        let refresh_rate = refresh_rate.max(1);
        if refresh_rate == self.refresh_rate {
            return;
        }
        self.refresh_rate = refresh_rate;
        self.refresh_interval = interval_for(refresh_rate);
        tracing::debug!(refresh_rate, interval = ?self.refresh_interval, "refresh rate changed");
        self.recompute_pending();
    }

    /// Changes the latency policy and recomputes a pending wake.
    pub fn set_latency_policy(&mut self, policy: LatencyPolicy) {
        if policy != self.latency_policy {
            self.latency_policy = policy;
            self.recompute_pending();
        }
    }

    /// Returns to the configured default latency policy.
    pub fn reset_latency_policy(&mut self) {
        self.set_latency_policy(self.config.latency_policy);
    }

    /// Changes the VRR policy and recomputes a pending wake.
    pub fn set_vrr_policy(&mut self, policy: VrrPolicy) {
        if policy != self.vrr_policy {
            self.vrr_policy = policy;
            self.recompute_pending();
        }
    }

    /// Flags whether fullscreen content is shown, which enables adaptive
    /// sync under [`VrrPolicy::Automatic`].
    pub fn set_fullscreen_content(&mut self, fullscreen: bool) {
        if fullscreen != self.fullscreen_content {
            self.fullscreen_content = fullscreen;
            self.recompute_pending();
        }
    }

    // -- Scheduling --

    /// Requests a frame.
    ///
    /// Coalesces with an already scheduled frame. While a frame is painting
    /// or awaiting presentation, or while the loop is inhibited, the request
    /// is remembered and scheduled later.
    pub fn schedule_repaint(&mut self, now: HostTime) {
        match self.state {
            RenderLoopState::FrameScheduled { .. } => {}
            RenderLoopState::Painting { .. } | RenderLoopState::WaitingForPresentation { .. } => {
                self.pending_repaint = true;
            }
            RenderLoopState::Idle if self.is_inhibited() => {
                self.pending_repaint = true;
            }
            RenderLoopState::Idle => self.schedule_at(now),
        }
    }

    /// Hands out the scheduled frame if it is due at `now`.
    pub fn take_due_frame(&mut self, now: HostTime) -> Option<FrameRequest> {
        let RenderLoopState::FrameScheduled { wake, target, .. } = self.state else {
            return None;
        };
        if now < wake || self.is_inhibited() {
            return None;
        }
        self.frame_counter += 1;
        self.next_presentation = target;
        self.state = RenderLoopState::Painting {
            frame_index: self.frame_counter,
            started: now,
            target,
        };
        Some(FrameRequest {
            frame_index: self.frame_counter,
            target_presentation: target,
            mode: self.presentation_mode(),
        })
    }

    /// Marks the painted frame as submitted and records its paint duration.
    pub fn end_frame(&mut self, now: HostTime) {
        let RenderLoopState::Painting {
            frame_index,
            started,
            target,
        } = self.state
        else {
            tracing::warn!(state = ?self.state, "end_frame outside of painting");
            return;
        };
        self.render_journal.add(now.saturating_duration_since(started));
        self.state = RenderLoopState::WaitingForPresentation {
            frame_index,
            target,
        };
    }

    /// Reports that the frame reached the screen at `timestamp`.
    ///
    /// A timestamp older than the previous presentation is replaced by `now`.
    pub fn notify_frame_completed(&mut self, timestamp: HostTime, now: HostTime) {
        let RenderLoopState::WaitingForPresentation { frame_index, .. } = self.state else {
            tracing::warn!(state = ?self.state, "frame completion without a frame in flight");
            return;
        };
        let timestamp = if timestamp < self.last_presentation {
            tracing::warn!(
                ?timestamp,
                last = ?self.last_presentation,
                "presentation timestamp went backwards, using the current time"
            );
            now
        } else {
            timestamp
        };
        self.last_presentation = timestamp;
        tracing::trace!(frame_index, ?timestamp, "frame presented");
        self.finish_frame(now);
    }

    /// Reports that the frame could not be presented.
    ///
    /// The last presentation timestamp is kept; the loop only reschedules if
    /// a repaint was requested meanwhile.
    pub fn notify_frame_failed(&mut self, now: HostTime) {
        if !matches!(
            self.state,
            RenderLoopState::Painting { .. } | RenderLoopState::WaitingForPresentation { .. }
        ) {
            tracing::warn!(state = ?self.state, "frame failure without a frame in flight");
            return;
        }
        self.finish_frame(now);
    }

    /// Completes a frame that found nothing to paint.
    ///
    /// No buffer was submitted, so the predicted presentation time stands in
    /// for the presentation timestamp.
    pub fn notify_frame_skipped(&mut self, now: HostTime) {
        let RenderLoopState::Painting { target, .. } = self.state else {
            tracing::warn!(state = ?self.state, "frame skip outside of painting");
            return;
        };
        if target > self.last_presentation {
            self.last_presentation = target;
        }
        self.finish_frame(now);
    }

    /// Takes one inhibition. A scheduled frame is cancelled but its request
    /// is kept.
    pub fn inhibit(&mut self) {
        self.inhibit_count += 1;
        if self.inhibit_count == 1 {
            if let RenderLoopState::FrameScheduled { .. } = self.state {
                self.state = RenderLoopState::Idle;
                self.pending_repaint = true;
            }
            tracing::debug!("render loop inhibited");
        }
    }

    /// Releases one inhibition. Releasing the last one schedules a frame if
    /// one was requested meanwhile.
    pub fn uninhibit(&mut self, now: HostTime) {
        if self.inhibit_count == 0 {
            tracing::warn!("uninhibit without matching inhibit");
            return;
        }
        self.inhibit_count -= 1;
        if self.inhibit_count == 0 {
            tracing::debug!("render loop released");
            if self.pending_repaint && self.state == RenderLoopState::Idle {
                self.schedule_at(now);
            }
        }
    }

    // -- Internal helpers --

    fn finish_frame(&mut self, now: HostTime) {
        self.state = RenderLoopState::Idle;
        if self.pending_repaint {
            self.pending_repaint = false;
            self.schedule_repaint(now);
        }
    }

    fn schedule_at(&mut self, now: HostTime) {
        let (wake, target) = self.deadlines(now);
        self.pending_repaint = false;
        self.state = RenderLoopState::FrameScheduled {
            requested_at: now,
            wake,
            target,
        };
        tracing::debug!(?now, ?wake, ?target, mode = ?self.presentation_mode(), "frame scheduled");
    }

    fn recompute_pending(&mut self) {
        if let RenderLoopState::FrameScheduled { requested_at, .. } = self.state {
            self.schedule_at(requested_at);
        }
    }

    /// Returns `(wake, predicted_presentation)` for a request made at `now`.
    fn deadlines(&self, now: HostTime) -> (HostTime, HostTime) {
        let estimate = self.render_estimate();
        let margin = self.safety_margin();
        let target = match self.presentation_mode() {
            PresentationMode::VSync => {
                let interval = duration_nanos(self.refresh_interval).max(1);
                let last = self.last_presentation.as_nanos();
                let k = if now.as_nanos() >= last {
                    (now.as_nanos() - last) / interval + 1
                } else {
                    1
                };
                HostTime(last.saturating_add(k.saturating_mul(interval)))
            }
            PresentationMode::AdaptiveSync => {
                (now + estimate + margin).max(self.last_presentation + self.refresh_interval)
            }
        };
        let wake = (target - (estimate + margin)).max(now);
        (wake, target)
    }
}

fn interval_for(refresh_rate: u32) -> Duration {
    Duration::from_nanos(1_000_000_000_000 / u64::from(refresh_rate.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL_60HZ: u64 = 16_666_666;
    const MARGIN: u64 = 3_000_000;

    fn ns(v: u64) -> HostTime {
        HostTime(v)
    }

    /// Runs one full frame that takes `paint` to render and presents at the
    /// predicted time. Returns the presentation timestamp.
    fn run_frame(rl: &mut RenderLoop, now: HostTime, paint: Duration) -> HostTime {
        rl.schedule_repaint(now);
        let wake = rl.next_wake().expect("frame should be scheduled");
        let frame = rl.take_due_frame(wake).expect("frame should be due at wake");
        rl.end_frame(wake + paint);
        rl.notify_frame_completed(frame.target_presentation, frame.target_presentation);
        frame.target_presentation
    }

    #[test]
    fn vsync_deadline_lands_on_next_vblank() {
        let mut rl = RenderLoop::default();
        rl.schedule_repaint(ns(5_000_000));

        assert_eq!(
            rl.state(),
            RenderLoopState::FrameScheduled {
                requested_at: ns(5_000_000),
                wake: ns(INTERVAL_60HZ - MARGIN),
                target: ns(INTERVAL_60HZ),
            }
        );
        assert!(rl.take_due_frame(ns(5_000_000)).is_none(), "not yet due");

        let frame = rl.take_due_frame(ns(INTERVAL_60HZ - MARGIN)).unwrap();
        assert_eq!(frame.frame_index, 1);
        assert_eq!(frame.target_presentation, ns(INTERVAL_60HZ));
        assert_eq!(frame.mode, PresentationMode::VSync);
    }

    #[test]
    fn deadline_skips_vblanks_already_passed() {
        let mut rl = RenderLoop::default();
        let presented = run_frame(&mut rl, ns(0), Duration::ZERO);
        assert_eq!(presented, ns(INTERVAL_60HZ));

        // Two and a half intervals later the next vblank is the third one.
        let now = ns(INTERVAL_60HZ + INTERVAL_60HZ * 5 / 2);
        rl.schedule_repaint(now);
        let RenderLoopState::FrameScheduled { target, .. } = rl.state() else {
            panic!("expected a scheduled frame");
        };
        assert_eq!(target, ns(INTERVAL_60HZ * 4));
    }

    #[test]
    fn late_request_wakes_immediately() {
        let mut rl = RenderLoop::default();
        let now = ns(INTERVAL_60HZ - 1_000_000);
        rl.schedule_repaint(now);
        assert_eq!(rl.next_wake(), Some(now), "wake is clamped to now");
    }

    #[test]
    fn repeated_requests_coalesce() {
        let mut rl = RenderLoop::default();
        rl.schedule_repaint(ns(1_000));
        let wake = rl.next_wake();
        rl.schedule_repaint(ns(2_000));
        rl.schedule_repaint(ns(3_000));
        assert_eq!(rl.next_wake(), wake);

        let wake = wake.unwrap();
        assert!(rl.take_due_frame(wake).is_some());
        assert!(rl.take_due_frame(wake).is_none(), "only one frame in flight");
        assert_eq!(rl.frame_counter(), 1);
    }

    #[test]
    fn request_during_flight_is_scheduled_after_completion() {
        let mut rl = RenderLoop::default();
        rl.schedule_repaint(ns(0));
        let frame = rl.take_due_frame(rl.next_wake().unwrap()).unwrap();

        rl.schedule_repaint(ns(14_000_000));
        assert!(rl.has_pending_repaint());
        rl.end_frame(ns(15_000_000));
        rl.schedule_repaint(ns(15_500_000));
        assert!(rl.next_wake().is_none());

        rl.notify_frame_completed(frame.target_presentation, ns(INTERVAL_60HZ + 100));
        assert!(!rl.has_pending_repaint());
        let RenderLoopState::FrameScheduled { target, .. } = rl.state() else {
            panic!("follow-up frame should be scheduled");
        };
        assert_eq!(target, ns(INTERVAL_60HZ * 2));
    }

    #[test]
    fn end_frame_records_render_time() {
        let mut rl = RenderLoop::default();
        let _ = run_frame(&mut rl, ns(0), Duration::from_millis(4));
        assert_eq!(rl.render_journal().len(), 1);
        assert_eq!(rl.render_estimate(), Duration::from_millis(4));
    }

    #[test]
    fn backwards_timestamp_is_replaced_by_now() {
        let mut rl = RenderLoop::default();
        let first = run_frame(&mut rl, ns(0), Duration::ZERO);

        rl.schedule_repaint(first);
        let _ = rl.take_due_frame(rl.next_wake().unwrap()).unwrap();
        rl.end_frame(first + Duration::from_millis(10));
        let now = first + Duration::from_millis(17);
        rl.notify_frame_completed(ns(1_000), now);
        assert_eq!(rl.last_presentation(), now);
        assert_eq!(rl.state(), RenderLoopState::Idle);
    }

    #[test]
    fn failed_frame_keeps_timestamp_and_does_not_reschedule() {
        let mut rl = RenderLoop::default();
        let first = run_frame(&mut rl, ns(0), Duration::ZERO);

        rl.schedule_repaint(first);
        let _ = rl.take_due_frame(rl.next_wake().unwrap()).unwrap();
        rl.end_frame(first + Duration::from_millis(14));
        rl.notify_frame_failed(first + Duration::from_millis(20));

        assert_eq!(rl.last_presentation(), first);
        assert_eq!(rl.state(), RenderLoopState::Idle);
        assert!(rl.next_wake().is_none());
    }

    #[test]
    fn failed_frame_reschedules_pending_request() {
        let mut rl = RenderLoop::default();
        rl.schedule_repaint(ns(0));
        let _ = rl.take_due_frame(rl.next_wake().unwrap()).unwrap();
        rl.end_frame(ns(14_000_000));
        rl.schedule_repaint(ns(14_500_000));
        rl.notify_frame_failed(ns(20_000_000));
        assert!(rl.next_wake().is_some());
    }

    #[test]
    fn skipped_frame_completes_at_predicted_time() {
        let mut rl = RenderLoop::default();
        rl.schedule_repaint(ns(0));
        let frame = rl.take_due_frame(rl.next_wake().unwrap()).unwrap();
        rl.notify_frame_skipped(ns(INTERVAL_60HZ - MARGIN));

        assert_eq!(rl.state(), RenderLoopState::Idle);
        assert_eq!(rl.last_presentation(), frame.target_presentation);
        assert!(rl.render_journal().is_empty(), "skips are not paint samples");
    }

    #[test]
    fn inhibited_loop_defers_until_release() {
        let mut rl = RenderLoop::default();
        rl.schedule_repaint(ns(0));
        rl.inhibit();
        rl.inhibit();
        assert!(rl.next_wake().is_none());
        assert!(rl.take_due_frame(ns(u64::MAX)).is_none());

        rl.schedule_repaint(ns(1_000));
        rl.uninhibit(ns(2_000));
        assert!(rl.next_wake().is_none(), "one inhibition still held");

        rl.uninhibit(ns(3_000));
        assert!(rl.next_wake().is_some());
        let frame = rl.take_due_frame(ns(u64::MAX));
        assert!(frame.is_some());
        assert!(rl.take_due_frame(ns(u64::MAX)).is_none(), "fires exactly once");
        assert_eq!(rl.frame_counter(), 1);
    }

    #[test]
    fn uninhibit_without_request_stays_idle() {
        let mut rl = RenderLoop::default();
        rl.inhibit();
        rl.uninhibit(ns(0));
        assert_eq!(rl.state(), RenderLoopState::Idle);
        rl.uninhibit(ns(0));
        assert!(!rl.is_inhibited());
    }

    #[test]
    fn high_latency_wakes_earlier_than_low() {
        let wake_for = |policy: LatencyPolicy| {
            let mut rl = RenderLoop::default();
            let mut now = ns(0);
            for paint in [2, 4, 6] {
                now = run_frame(&mut rl, now, Duration::from_millis(paint));
            }
            rl.set_latency_policy(policy);
            rl.schedule_repaint(now);
            rl.next_wake().unwrap()
        };

        let low = wake_for(LatencyPolicy::Low);
        let high = wake_for(LatencyPolicy::High);
        assert!(high < low, "high latency must start earlier");
        // Low: estimate 3 ms + 2.25 ms margin. High: 5 ms + 4.5 ms.
        assert_eq!(low - high, Duration::from_micros(4_250));
    }

    #[test]
    fn reset_latency_policy_restores_default() {
        let mut rl = RenderLoop::new(RenderLoopConfig::low_latency());
        rl.set_latency_policy(LatencyPolicy::ExtremelyHigh);
        rl.reset_latency_policy();
        assert_eq!(rl.latency_policy(), LatencyPolicy::Low);
    }

    #[test]
    fn refresh_change_recomputes_pending_wake() {
        let mut rl = RenderLoop::default();
        rl.schedule_repaint(ns(1_000_000));
        rl.set_refresh_rate(120_000);
        let RenderLoopState::FrameScheduled { target, wake, .. } = rl.state() else {
            panic!("frame should stay scheduled");
        };
        assert_eq!(target, ns(8_333_333));
        assert_eq!(wake, ns(8_333_333 - MARGIN));
    }

    #[test]
    fn adaptive_sync_deadline() {
        let mut rl = RenderLoop::default();
        rl.set_vrr_policy(VrrPolicy::Always);
        let last = run_frame(&mut rl, ns(80_000_000), Duration::ZERO);

        // Soon after the last presentation the minimum interval dominates.
        rl.schedule_repaint(last + Duration::from_millis(1));
        let RenderLoopState::FrameScheduled { target, wake, .. } = rl.state() else {
            panic!("frame should be scheduled");
        };
        assert_eq!(target, last + Duration::from_nanos(INTERVAL_60HZ));
        assert_eq!(wake, target - Duration::from_nanos(MARGIN));

        let frame = rl.take_due_frame(wake).unwrap();
        assert_eq!(frame.mode, PresentationMode::AdaptiveSync);
        rl.end_frame(wake);
        rl.notify_frame_completed(target, target);

        // Long after, the frame is presented as soon as it can be ready.
        let now = target + Duration::from_millis(40);
        rl.schedule_repaint(now);
        let RenderLoopState::FrameScheduled { target, wake, .. } = rl.state() else {
            panic!("frame should be scheduled");
        };
        assert_eq!(wake, now);
        assert_eq!(target, now + Duration::from_nanos(MARGIN));
    }

    #[test]
    fn early_flips_keep_the_adaptive_sync_floor() {
        let mut rl = RenderLoop::default();
        rl.set_vrr_policy(VrrPolicy::Always);
        let mut last = run_frame(&mut rl, ns(80_000_000), Duration::ZERO);

        // Each flip lands a margin ahead of the predicted time.
        for _ in 0..4 {
            rl.schedule_repaint(last);
            let wake = rl.next_wake().unwrap();
            let frame = rl.take_due_frame(wake).unwrap();
            assert_eq!(
                frame.target_presentation,
                last + Duration::from_nanos(INTERVAL_60HZ)
            );
            rl.end_frame(wake);
            last = frame.target_presentation - Duration::from_nanos(MARGIN);
            rl.notify_frame_completed(last, last);
        }
    }

    #[test]
    fn automatic_vrr_needs_fullscreen_content() {
        let mut rl = RenderLoop::default();
        rl.set_vrr_policy(VrrPolicy::Automatic);
        assert_eq!(rl.presentation_mode(), PresentationMode::VSync);
        rl.set_fullscreen_content(true);
        assert_eq!(rl.presentation_mode(), PresentationMode::AdaptiveSync);
    }
}
