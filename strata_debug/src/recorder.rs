// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].

use strata_core::backend::SurfaceError;
use strata_core::node::{ImageHandle, SurfaceId};
use strata_core::time::{Duration, HostTime};
use strata_core::trace::{
    FrameCounts, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind, SchedulerEvent,
    StepBeginEvent, StepEndEvent, SurfaceEvent, SurfaceOutcome, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_STEP_BEGIN: u8 = 1;
const TAG_STEP_END: u8 = 2;
const TAG_PHASE_BEGIN: u8 = 3;
const TAG_PHASE_END: u8 = 4;
const TAG_SCHEDULER: u8 = 5;
const TAG_SURFACE: u8 = 6;
const TAG_FRAME_SUMMARY: u8 = 7;

const OUTCOME_REFRESHED: u8 = 0;
const OUTCOME_UNBOUND: u8 = 1;
const OUTCOME_GONE: u8 = 2;
const OUTCOME_IMPORT_FAILED: u8 = 3;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_option_u64(&mut self, v: Option<u64>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_u64(val);
            }
            None => {
                self.write_u8(0);
                self.write_u64(0);
            }
        }
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Update => 0,
            PhaseKind::Depth => 1,
            PhaseKind::Refresh => 2,
            PhaseKind::Draw => 3,
        });
    }

    /// Outcomes are a tag plus one `u64` payload: the image handle or the
    /// failing surface id.
    fn write_outcome(&mut self, outcome: SurfaceOutcome) {
        let (tag, payload) = match outcome {
            SurfaceOutcome::Refreshed(image) => (OUTCOME_REFRESHED, image.0),
            SurfaceOutcome::Failed(SurfaceError::Unbound) => (OUTCOME_UNBOUND, 0),
            SurfaceOutcome::Failed(SurfaceError::Gone(id)) => (OUTCOME_GONE, u64::from(id.0)),
            SurfaceOutcome::Failed(SurfaceError::ImportFailed(id)) => {
                (OUTCOME_IMPORT_FAILED, u64::from(id.0))
            }
        };
        self.write_u8(tag);
        self.write_u64(payload);
    }

    fn write_counts(&mut self, c: &FrameCounts) {
        for v in [
            c.nodes,
            c.animating,
            c.drawn,
            c.culled,
            c.unbound,
            c.refreshed,
            c.refresh_failed,
            c.discarded,
        ] {
            self.write_u32(v);
        }
    }
}

impl TraceSink for RecorderSink {
    fn on_step_begin(&mut self, e: &StepBeginEvent) {
        self.write_u8(TAG_STEP_BEGIN);
        self.write_u64(e.step_index);
        self.write_u64(e.now.nanos());
        self.write_bool(e.dirty);
        self.write_u32(e.num_animations);
    }

    fn on_step_end(&mut self, e: &StepEndEvent) {
        self.write_u8(TAG_STEP_END);
        self.write_u64(e.step_index);
        self.write_u64(e.now.nanos());
        self.write_bool(e.drew);
        self.write_u32(e.num_animations);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.step_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.nanos());
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.step_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp.nanos());
    }

    fn on_scheduler(&mut self, e: &SchedulerEvent) {
        self.write_u8(TAG_SCHEDULER);
        self.write_u64(e.step_index);
        self.write_u64(e.now.nanos());
        self.write_bool(e.enabled);
        self.write_option_u64(e.delay.map(Duration::nanos));
    }

    fn on_surface(&mut self, e: &SurfaceEvent) {
        self.write_u8(TAG_SURFACE);
        self.write_u64(e.step_index);
        self.write_u32(e.node_index);
        self.write_u32(e.surface.0);
        self.write_outcome(e.outcome);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_u64(s.now.nanos());
        self.write_u64(s.update.nanos());
        self.write_u64(s.depth.nanos());
        self.write_u64(s.refresh.nanos());
        self.write_u64(s.draw.nanos());
        self.write_counts(&s.counts);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`StepBeginEvent`].
    StepBegin(StepBeginEvent),
    /// A [`StepEndEvent`].
    StepEnd(StepEndEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`SchedulerEvent`].
    Scheduler(SchedulerEvent),
    /// A [`SurfaceEvent`].
    Surface(SurfaceEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Some(v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_u64(&mut self) -> Option<u64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_option_u64(&mut self) -> Option<Option<u64>> {
        let present = self.read_u8()?;
        let val = self.read_u64()?;
        Some(if present != 0 { Some(val) } else { None })
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Update,
            1 => PhaseKind::Depth,
            2 => PhaseKind::Refresh,
            _ => PhaseKind::Draw,
        })
    }

    fn read_outcome(&mut self) -> Option<SurfaceOutcome> {
        let tag = self.read_u8()?;
        let payload = self.read_u64()?;
        let surface = || u32::try_from(payload).ok().map(SurfaceId);
        Some(match tag {
            OUTCOME_REFRESHED => SurfaceOutcome::Refreshed(ImageHandle(payload)),
            OUTCOME_UNBOUND => SurfaceOutcome::Failed(SurfaceError::Unbound),
            OUTCOME_GONE => SurfaceOutcome::Failed(SurfaceError::Gone(surface()?)),
            OUTCOME_IMPORT_FAILED => {
                SurfaceOutcome::Failed(SurfaceError::ImportFailed(surface()?))
            }
            _ => return None,
        })
    }

    fn read_counts(&mut self) -> Option<FrameCounts> {
        Some(FrameCounts {
            nodes: self.read_u32()?,
            animating: self.read_u32()?,
            drawn: self.read_u32()?,
            culled: self.read_u32()?,
            unbound: self.read_u32()?,
            refreshed: self.read_u32()?,
            refresh_failed: self.read_u32()?,
            discarded: self.read_u32()?,
        })
    }

    fn decode_step_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::StepBegin(StepBeginEvent {
            step_index: self.read_u64()?,
            now: HostTime(self.read_u64()?),
            dirty: self.read_bool()?,
            num_animations: self.read_u32()?,
        }))
    }

    fn decode_step_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::StepEnd(StepEndEvent {
            step_index: self.read_u64()?,
            now: HostTime(self.read_u64()?),
            drew: self.read_bool()?,
            num_animations: self.read_u32()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            step_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            step_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: HostTime(self.read_u64()?),
        }))
    }

    fn decode_scheduler(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Scheduler(SchedulerEvent {
            step_index: self.read_u64()?,
            now: HostTime(self.read_u64()?),
            enabled: self.read_bool()?,
            delay: self.read_option_u64()?.map(Duration),
        }))
    }

    fn decode_surface(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Surface(SurfaceEvent {
            step_index: self.read_u64()?,
            node_index: self.read_u32()?,
            surface: SurfaceId(self.read_u32()?),
            outcome: self.read_outcome()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index: self.read_u64()?,
            now: HostTime(self.read_u64()?),
            update: Duration(self.read_u64()?),
            depth: Duration(self.read_u64()?),
            refresh: Duration(self.read_u64()?),
            draw: Duration(self.read_u64()?),
            counts: self.read_counts()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_STEP_BEGIN => self.decode_step_begin(),
            TAG_STEP_END => self.decode_step_end(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_SCHEDULER => self.decode_scheduler(),
            TAG_SURFACE => self.decode_surface(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
