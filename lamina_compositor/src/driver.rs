// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `calloop` integration.
//!
//! The [`Driver`] keeps a single timer armed at the compositor's next wake
//! time. When it fires the compositor is dispatched; after every loop
//! iteration the timer is re-armed for whatever is due next, so an idle
//! compositor sleeps until something else wakes the loop.

use core::fmt;
use core::ops::ControlFlow;
use core::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle, LoopSignal, RegistrationToken};
use lamina_core::backend::OutputBackend;

use crate::compositor::Compositor;
use crate::error::CompositorError;

/// Runs a [`Compositor`] on a `calloop` event loop.
pub struct Driver<B: OutputBackend + 'static> {
    event_loop: EventLoop<'static, Compositor<B>>,
    compositor: Compositor<B>,
    timer: Option<RegistrationToken>,
    idle_timeout: Duration,
}

impl<B: OutputBackend + 'static> fmt::Debug for Driver<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("timer", &self.timer)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl<B: OutputBackend + 'static> Driver<B> {
    /// Creates an event loop for `compositor`. The loop sleeps at most
    /// `idle_timeout` when nothing is scheduled.
    pub fn new(compositor: Compositor<B>, idle_timeout: Duration) -> Result<Self, CompositorError> {
        let event_loop = EventLoop::try_new()?;
        Ok(Self {
            event_loop,
            compositor,
            timer: None,
            idle_timeout,
        })
    }

    /// The compositor.
    pub fn compositor(&self) -> &Compositor<B> {
        &self.compositor
    }

    /// The compositor, for window management between iterations.
    pub fn compositor_mut(&mut self) -> &mut Compositor<B> {
        &mut self.compositor
    }

    /// Handle for registering further event sources, such as input devices
    /// or a backend's file descriptors.
    pub fn handle(&self) -> LoopHandle<'static, Compositor<B>> {
        self.event_loop.handle()
    }

    /// Signal that wakes or stops the loop from another source.
    pub fn signal(&self) -> LoopSignal {
        self.event_loop.get_signal()
    }

    /// Consumes the driver and returns the compositor.
    pub fn into_compositor(self) -> Compositor<B> {
        self.compositor
    }

    /// Runs one iteration: dispatches the compositor, arms the wake timer
    /// and waits for at most `max_wait` (the idle timeout when `None`).
    pub fn run_once(&mut self, max_wait: Option<Duration>) -> Result<(), CompositorError> {
        let now = self.compositor.now();
        self.compositor.dispatch(now);
        self.arm()?;
        self.event_loop
            .dispatch(Some(max_wait.unwrap_or(self.idle_timeout)), &mut self.compositor)?;
        Ok(())
    }

    /// Runs until `on_iteration` breaks. It is called before every
    /// iteration with the compositor.
    pub fn run(
        &mut self,
        mut on_iteration: impl FnMut(&mut Compositor<B>) -> ControlFlow<()>,
    ) -> Result<(), CompositorError> {
        loop {
            if on_iteration(&mut self.compositor).is_break() {
                return Ok(());
            }
            self.run_once(None)?;
        }
    }

    fn arm(&mut self) -> Result<(), CompositorError> {
        let handle = self.event_loop.handle();
        if let Some(token) = self.timer.take() {
            handle.remove(token);
        }
        let Some(wake) = self.compositor.next_wake() else {
            return Ok(());
        };
        let delay = wake.saturating_duration_since(self.compositor.now());
        let timer = if delay.is_zero() {
            Timer::immediate()
        } else {
            Timer::from_duration(delay)
        };
        tracing::trace!(?wake, ?delay, "arming frame timer");
        let token = handle
            .insert_source(timer, |_, _, compositor| {
                let now = compositor.now();
                compositor.dispatch(now);
                TimeoutAction::Drop
            })
            .map_err(|err| err.error)?;
        self.timer = Some(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lamina_backend_virtual::{VirtualBackend, VirtualOutputConfig};
    use lamina_core::render_loop::RenderLoopConfig;
    use lamina_core::time::HostTime;

    use super::*;

    #[test]
    fn timer_drives_frames_to_presentation() {
        let mut backend = VirtualBackend::new();
        let output = backend
            .create_output(VirtualOutputConfig::default(), RenderLoopConfig::default())
            .unwrap();
        let id = output.id();
        let mut compositor = Compositor::new(backend);
        compositor.add_output(output).unwrap();
        let mut driver = Driver::new(compositor, Duration::from_millis(50)).unwrap();

        let mut iterations = 0;
        driver
            .run(|compositor| {
                iterations += 1;
                let presented = compositor
                    .output(id)
                    .is_some_and(|o| o.render_loop().last_presentation() != HostTime::ZERO);
                if presented || iterations > 200 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();

        let output = driver.compositor().output(id).unwrap();
        assert_ne!(output.render_loop().last_presentation(), HostTime::ZERO);
        assert!(driver.compositor().backend().capture(id).is_some());
    }
}
