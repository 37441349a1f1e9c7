// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Times are
//! printed in microseconds.

use std::io::Write;

use strata_core::time::{Duration, HostTime};
use strata_core::trace::{
    FrameSummary, PhaseBeginEvent, PhaseEndEvent, SchedulerEvent, StepBeginEvent, StepEndEvent,
    SurfaceEvent, SurfaceOutcome, TraceSink,
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

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns the destination.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}

fn host_us(t: HostTime) -> f64 {
    us(t.nanos())
}

fn dur_us(d: Duration) -> f64 {
    us(d.nanos())
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_step_begin(&mut self, e: &StepBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[step] #{} now={:.1}µs dirty={} animations={}",
            e.step_index,
            host_us(e.now),
            e.dirty,
            e.num_animations,
        );
    }

    fn on_step_end(&mut self, e: &StepEndEvent) {
        let drew = if e.drew { "drew" } else { "idle" };
        let _ = writeln!(
            self.writer,
            "[step:end] #{} {drew} animations={}",
            e.step_index, e.num_animations,
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] step={} {} at {:.1}µs",
            e.step_index,
            e.phase.name(),
            host_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] step={} {} at {:.1}µs",
            e.step_index,
            e.phase.name(),
            host_us(e.timestamp),
        );
    }

    fn on_scheduler(&mut self, e: &SchedulerEvent) {
        let _ = match e.delay {
            Some(delay) if e.enabled => writeln!(
                self.writer,
                "[scheduler] step={} armed in {:.1}µs",
                e.step_index,
                dur_us(delay),
            ),
            _ => writeln!(self.writer, "[scheduler] step={} disabled", e.step_index),
        };
    }

    fn on_surface(&mut self, e: &SurfaceEvent) {
        let _ = match e.outcome {
            SurfaceOutcome::Refreshed(image) => writeln!(
                self.writer,
                "[surface] step={} node={} surface={} image={}",
                e.step_index, e.node_index, e.surface.0, image.0,
            ),
            SurfaceOutcome::Failed(error) => writeln!(
                self.writer,
                "[surface] step={} node={} surface={} FAILED: {error}",
                e.step_index, e.node_index, e.surface.0,
            ),
        };
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let c = &s.counts;
        let _ = writeln!(
            self.writer,
            "[summary] frame={} update={:.1}µs depth={:.1}µs refresh={:.1}µs draw={:.1}µs \
             nodes={} drawn={} culled={} unbound={} refreshed={} failed={} discarded={}",
            s.frame_index,
            dur_us(s.update),
            dur_us(s.depth),
            dur_us(s.refresh),
            dur_us(s.draw),
            c.nodes,
            c.drawn,
            c.culled,
            c.unbound,
            c.refreshed,
            c.refresh_failed,
            c.discarded,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::backend::SurfaceError;
    use strata_core::node::SurfaceId;

    fn render(f: impl FnOnce(&mut PrettyPrintSink<Vec<u8>>)) -> String {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        f(&mut sink);
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn pretty_print_step() {
        let output = render(|sink| {
            sink.on_step_begin(&StepBeginEvent {
                step_index: 1,
                now: HostTime(1_000_000),
                dirty: true,
                num_animations: 0,
            });
        });
        assert!(output.contains("[step] #1"), "got: {output}");
        assert!(output.contains("now=1000.0µs"), "got: {output}");
    }

    #[test]
    fn pretty_print_failed_surface() {
        let output = render(|sink| {
            sink.on_surface(&SurfaceEvent {
                step_index: 3,
                node_index: 8,
                surface: SurfaceId(2),
                outcome: SurfaceOutcome::Failed(SurfaceError::Gone(SurfaceId(2))),
            });
        });
        assert!(output.contains("FAILED"), "got: {output}");
        assert!(output.contains("no longer exists"), "got: {output}");
    }

    #[test]
    fn pretty_print_disabled_scheduler() {
        let output = render(|sink| {
            sink.on_scheduler(&SchedulerEvent {
                step_index: 4,
                now: HostTime(0),
                enabled: false,
                delay: None,
            });
        });
        assert_eq!(output, "[scheduler] step=4 disabled\n");
    }
}
