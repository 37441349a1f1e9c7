// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the redraw loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! [`Engine::step_traced`](crate::engine::Engine::step_traced) calls as it
//! works through a step. All method bodies default to no-ops, so implementing
//! only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! [`FrameSummaryBuilder`] collects phase timestamps during a drawn frame and
//! produces a [`FrameSummary`] at the end.
//!
//! Contract violations and recovered failures are not trace events; they go
//! through the `tracing` crate as `warn!`/`debug!` records.

use crate::backend::SurfaceError;
use crate::node::{ImageHandle, SurfaceId};
use crate::time::{Duration, HostTime};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of a step is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Advancing animators on every live node.
    Update,
    /// Depth assignment, visibility and draw-order construction.
    Depth,
    /// Refreshing stale surface images.
    Refresh,
    /// Handing the frame to the render backend.
    Draw,
}

impl PhaseKind {
    /// Every phase, in step order.
    pub const ALL: [Self; 4] = [Self::Update, Self::Depth, Self::Refresh, Self::Draw];

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Depth => "depth",
            Self::Refresh => "refresh",
            Self::Draw => "draw",
        }
    }
}

/// What happened to a surface image during a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceOutcome {
    /// A new or updated image is bound.
    Refreshed(ImageHandle),
    /// The backend could not produce an image; the node is not drawn.
    Failed(SurfaceError),
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a step starts.
#[derive(Clone, Copy, Debug)]
pub struct StepBeginEvent {
    /// Monotonic step counter.
    pub step_index: u64,
    /// Host time the step runs at.
    pub now: HostTime,
    /// Whether a redraw was requested before the step.
    pub dirty: bool,
    /// Nodes with at least one running animation.
    pub num_animations: u32,
}

/// Emitted when a step finishes.
#[derive(Clone, Copy, Debug)]
pub struct StepEndEvent {
    /// Step counter.
    pub step_index: u64,
    /// Host time the step ran at.
    pub now: HostTime,
    /// Whether a frame was drawn.
    pub drew: bool,
    /// Nodes still animating after the step.
    pub num_animations: u32,
}

/// Marks the beginning of a step phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Step counter.
    pub step_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a step phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Step counter.
    pub step_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted when a step leaves the scheduler armed or disables it.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerEvent {
    /// Step counter.
    pub step_index: u64,
    /// Host time of the decision.
    pub now: HostTime,
    /// `false` when the engine went idle.
    pub enabled: bool,
    /// Delay until the next tick, when armed.
    pub delay: Option<Duration>,
}

/// Emitted for each surface refresh attempted during a step.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceEvent {
    /// Step counter.
    pub step_index: u64,
    /// Slot index of the texture-surface node.
    pub node_index: u32,
    /// The surface.
    pub surface: SurfaceId,
    /// What happened.
    pub outcome: SurfaceOutcome,
}

/// Node and surface counts for one drawn frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCounts {
    /// Nodes reached from the stage by the update pass.
    pub nodes: u32,
    /// Nodes still animating after the update pass.
    pub animating: u32,
    /// Nodes handed to the backend.
    pub drawn: u32,
    /// Nodes culled as off-stage or covered.
    pub culled: u32,
    /// Surfaces skipped for lack of a valid image.
    pub unbound: u32,
    /// Surface images refreshed this frame.
    pub refreshed: u32,
    /// Surface refreshes that failed this frame.
    pub refresh_failed: u32,
    /// Surface images released since the previous frame.
    pub discarded: u32,
}

/// Per-frame summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct FrameSummary {
    /// Drawn-frame counter.
    pub frame_index: u64,
    /// Host time the frame was built for.
    pub now: HostTime,
    /// Update phase duration (zero if not measured).
    pub update: Duration,
    /// Depth phase duration (zero if not measured).
    pub depth: Duration,
    /// Refresh phase duration (zero if not measured).
    pub refresh: Duration,
    /// Draw phase duration (zero if not measured).
    pub draw: Duration,
    /// Node and surface counts.
    pub counts: FrameCounts,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the redraw loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a step starts.
    fn on_step_begin(&mut self, e: &StepBeginEvent) {
        _ = e;
    }

    /// Called when a step finishes.
    fn on_step_end(&mut self, e: &StepEndEvent) {
        _ = e;
    }

    /// Called at the beginning of a step phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a step phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called when a step re-arms or disables the scheduler.
    fn on_scheduler(&mut self, e: &SchedulerEvent) {
        _ = e;
    }

    /// Called for each surface refresh attempt.
    fn on_surface(&mut self, e: &SurfaceEvent) {
        _ = e;
    }

    /// Called with a summary of each drawn frame.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $e:expr) => {{
        #[cfg(feature = "trace")]
        if let Some(s) = &mut $self.sink {
            s.$method($e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $e;
        }
    }};
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`StepBeginEvent`].
    #[inline]
    pub fn step_begin(&mut self, e: &StepBeginEvent) {
        dispatch!(self, on_step_begin, e);
    }

    /// Emits a [`StepEndEvent`].
    #[inline]
    pub fn step_end(&mut self, e: &StepEndEvent) {
        dispatch!(self, on_step_end, e);
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        dispatch!(self, on_phase_begin, e);
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        dispatch!(self, on_phase_end, e);
    }

    /// Emits a [`SchedulerEvent`].
    #[inline]
    pub fn scheduler(&mut self, e: &SchedulerEvent) {
        dispatch!(self, on_scheduler, e);
    }

    /// Emits a [`SurfaceEvent`].
    #[inline]
    pub fn surface(&mut self, e: &SurfaceEvent) {
        dispatch!(self, on_surface, e);
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        dispatch!(self, on_frame_summary, s);
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    frame_index: u64,
    now: HostTime,
    phase_starts: [Option<HostTime>; 4],
    phase_ends: [Option<HostTime>; 4],
}

impl FrameSummaryBuilder {
    /// Starts building a summary for the given frame.
    #[must_use]
    pub fn new(frame_index: u64, now: HostTime) -> Self {
        Self {
            frame_index,
            now,
            phase_starts: [None; 4],
            phase_ends: [None; 4],
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self, counts: FrameCounts) -> FrameSummary {
        FrameSummary {
            frame_index: self.frame_index,
            now: self.now,
            update: self.phase_duration(PhaseKind::Update),
            depth: self.phase_duration(PhaseKind::Depth),
            refresh: self.phase_duration(PhaseKind::Refresh),
            draw: self.phase_duration(PhaseKind::Draw),
            counts,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> Duration {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::Update => 0,
        PhaseKind::Depth => 1,
        PhaseKind::Refresh => 2,
        PhaseKind::Draw => 3,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
