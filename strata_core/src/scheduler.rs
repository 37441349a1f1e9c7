// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-driven redraw scheduling.
//!
//! The [`RedrawScheduler`] owns the engine's single timer callback. It is
//! enabled when something needs drawing (a mutation or a running animation)
//! and disabled by the step that finds nothing left to do, so an idle engine
//! never wakes up:
//!
//! ```text
//!   mutation ──► enable ──► schedule_once(delay)
//!                               │
//!                               ▼
//!                         Engine::step ──► animations left? ──► re-arm
//!                                                │
//!                                                └─ no ──► disable
//! ```
//!
//! Ticks are paced to [`SchedulerConfig::draw_interval`] measured from the
//! last drawn frame, so a mutation right after a draw waits out the rest of
//! the interval while one after a long idle period draws immediately.

use crate::backend::FrameTimer;
use crate::time::{Duration, HostTime};

/// Configuration for the [`RedrawScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SchedulerConfig {
    /// Minimum spacing between drawn frames.
    pub draw_interval: Duration,
}

impl SchedulerConfig {
    /// 16 ms between frames, roughly 60 Hz.
    pub const DEFAULT: Self = Self::with_interval(Duration::from_millis(16));

    /// Configuration with the given draw interval.
    #[must_use]
    pub const fn with_interval(draw_interval: Duration) -> Self {
        Self { draw_interval }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Keeps at most one timer callback outstanding.
#[derive(Clone, Copy, Debug)]
pub struct RedrawScheduler {
    config: SchedulerConfig,
    enabled: bool,
    pending: bool,
    last_draw: Option<HostTime>,
}

impl RedrawScheduler {
    /// Creates a disabled scheduler.
    #[must_use]
    pub const fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            enabled: false,
            pending: false,
            last_draw: None,
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Whether the scheduler wants ticks.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a callback is outstanding on the timer.
    #[inline]
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending
    }

    /// When the last frame was drawn, if ever.
    #[inline]
    #[must_use]
    pub const fn last_draw(&self) -> Option<HostTime> {
        self.last_draw
    }

    /// Delay until the next tick if one were scheduled at `now`.
    #[must_use]
    pub fn next_delay(&self, now: HostTime) -> Duration {
        match self.last_draw {
            Some(last) => self
                .config
                .draw_interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Enables ticking and schedules a callback. Returns `false` if the
    /// scheduler was already enabled, in which case nothing changes.
    pub fn enable<T: FrameTimer + ?Sized>(&mut self, timer: &mut T) -> bool {
        if self.enabled {
            return false;
        }
        self.enabled = true;
        self.arm(timer);
        true
    }

    /// Cancels the outstanding callback and stops ticking. Returns `false`
    /// if the scheduler was already disabled.
    pub fn disable<T: FrameTimer + ?Sized>(&mut self, timer: &mut T) -> bool {
        self.cancel(timer);
        core::mem::replace(&mut self.enabled, false)
    }

    /// Cancels the outstanding callback, if any, leaving the enabled state
    /// alone.
    pub fn cancel<T: FrameTimer + ?Sized>(&mut self, timer: &mut T) {
        if self.pending {
            timer.cancel();
            self.pending = false;
        }
    }

    /// Records that a frame was drawn at `now`.
    pub fn record_draw(&mut self, now: HostTime) {
        self.last_draw = Some(now);
    }

    /// Schedules the next tick, replacing any outstanding callback.
    pub fn arm<T: FrameTimer + ?Sized>(&mut self, timer: &mut T) {
        self.cancel(timer);
        let delay = self.next_delay(timer.now());
        timer.schedule_once(delay);
        self.pending = true;
    }
}

impl Default for RedrawScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::DEFAULT)
    }
}
