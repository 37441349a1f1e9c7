// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Steps and their phases become nested duration slices. Scheduler and
//! surface events become instants, and each frame summary adds a counter
//! track with the frame's node counts.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use strata_core::trace::SurfaceOutcome;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    // Surface events carry no timestamp of their own.
    let mut last_ts = 0.0;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::StepBegin(e) => {
                last_ts = nanos_to_us(e.now.nanos());
                events.push(json!({
                    "ph": "B",
                    "name": "Step",
                    "cat": "Step",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "step_index": e.step_index,
                        "dirty": e.dirty,
                        "num_animations": e.num_animations,
                    }
                }));
            }
            RecordedEvent::StepEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "name": "Step",
                    "cat": "Step",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "step_index": e.step_index,
                        "drew": e.drew,
                        "num_animations": e.num_animations,
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                last_ts = nanos_to_us(e.timestamp.nanos());
                events.push(json!({
                    "ph": "B",
                    "name": e.phase.name(),
                    "cat": "Phase",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "step_index": e.step_index,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                last_ts = nanos_to_us(e.timestamp.nanos());
                events.push(json!({
                    "ph": "E",
                    "name": e.phase.name(),
                    "cat": "Phase",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "step_index": e.step_index,
                    }
                }));
            }
            RecordedEvent::Scheduler(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": if e.enabled { "SchedulerArmed" } else { "SchedulerDisabled" },
                    "cat": "Scheduler",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "step_index": e.step_index,
                        "delay_us": e.delay.map(|d| nanos_to_us(d.nanos())),
                    }
                }));
            }
            RecordedEvent::Surface(e) => {
                let (name, detail) = match e.outcome {
                    SurfaceOutcome::Refreshed(image) => ("SurfaceRefreshed", json!(image.0)),
                    SurfaceOutcome::Failed(error) => ("SurfaceFailed", json!(error.to_string())),
                };
                events.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": "Surface",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "step_index": e.step_index,
                        "node_index": e.node_index,
                        "surface": e.surface.0,
                        "detail": detail,
                    }
                }));
            }
            RecordedEvent::FrameSummary(s) => {
                let ts = nanos_to_us(s.now.nanos());
                events.push(json!({
                    "ph": "i",
                    "name": "FrameSummary",
                    "cat": "Summary",
                    "ts": ts,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": s.frame_index,
                        "update_us": nanos_to_us(s.update.nanos()),
                        "depth_us": nanos_to_us(s.depth.nanos()),
                        "refresh_us": nanos_to_us(s.refresh.nanos()),
                        "draw_us": nanos_to_us(s.draw.nanos()),
                        "refresh_failed": s.counts.refresh_failed,
                        "discarded": s.counts.discarded,
                    }
                }));
                events.push(json!({
                    "ph": "C",
                    "name": "Nodes",
                    "cat": "Summary",
                    "ts": ts,
                    "pid": 0,
                    "args": {
                        "drawn": s.counts.drawn,
                        "culled": s.counts.culled,
                        "unbound": s.counts.unbound,
                        "animating": s.counts.animating,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use strata_core::backend::SurfaceError;
    use strata_core::node::SurfaceId;
    use strata_core::time::{Duration, HostTime};
    use strata_core::trace::{
        FrameCounts, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind, StepBeginEvent,
        StepEndEvent, SurfaceEvent, TraceSink,
    };

    fn export_to_values(bytes: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();
        export(bytes, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        serde_json::from_str(&json_str).unwrap()
    }

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_step_begin(&StepBeginEvent {
            step_index: 0,
            now: HostTime(1_000_000),
            dirty: true,
            num_animations: 0,
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            step_index: 0,
            phase: PhaseKind::Update,
            timestamp: HostTime(1_000_000),
        });
        rec.on_phase_end(&PhaseEndEvent {
            step_index: 0,
            phase: PhaseKind::Update,
            timestamp: HostTime(1_000_100),
        });
        rec.on_step_end(&StepEndEvent {
            step_index: 0,
            now: HostTime(1_000_000),
            drew: true,
            num_animations: 0,
        });

        let parsed = export_to_values(rec.as_bytes());
        assert_eq!(parsed.len(), 4);

        assert_eq!(parsed[0]["ph"], "B");
        assert_eq!(parsed[0]["name"], "Step");

        assert_eq!(parsed[1]["ph"], "B");
        assert_eq!(parsed[1]["name"], "update");

        assert_eq!(parsed[2]["ph"], "E");
        assert_eq!(parsed[2]["ts"], 1000.1);

        // The step slice closes after its last phase.
        assert_eq!(parsed[3]["ph"], "E");
        assert_eq!(parsed[3]["ts"], 1000.1);
    }

    #[test]
    fn summary_adds_a_counter_track() {
        let mut rec = RecorderSink::new();
        rec.on_frame_summary(&FrameSummary {
            frame_index: 3,
            now: HostTime(2_000),
            update: Duration(10),
            depth: Duration(20),
            refresh: Duration(30),
            draw: Duration(40),
            counts: FrameCounts {
                drawn: 5,
                culled: 2,
                ..FrameCounts::default()
            },
        });

        let parsed = export_to_values(rec.as_bytes());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["args"]["frame_index"], 3);
        assert_eq!(parsed[1]["ph"], "C");
        assert_eq!(parsed[1]["args"]["drawn"], 5);
        assert_eq!(parsed[1]["args"]["culled"], 2);
    }

    #[test]
    fn failed_surface_carries_the_error_message() {
        let mut rec = RecorderSink::new();
        rec.on_surface(&SurfaceEvent {
            step_index: 1,
            node_index: 4,
            surface: SurfaceId(9),
            outcome: SurfaceOutcome::Failed(SurfaceError::ImportFailed(SurfaceId(9))),
        });

        let parsed = export_to_values(rec.as_bytes());
        assert_eq!(parsed[0]["name"], "SurfaceFailed");
        assert_eq!(
            parsed[0]["args"]["detail"],
            "failed to import the contents of surface SurfaceId(9)"
        );
    }

    #[test]
    fn export_empty_recording() {
        let parsed = export_to_values(&[]);
        assert!(parsed.is_empty());
    }
}
