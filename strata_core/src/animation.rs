// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Time-based property animation.
//!
//! Every animated property in the compositor moves along the same curve: a
//! raised cosine, `(1 - cos(pi * t)) / 2`, which starts and ends with zero
//! slope. There is no linear or custom-curve option.
//!
//! An [`Animator`] is bound to one [`AnimatedField`] of one node. Nodes keep
//! their animators in a [`FieldAnimations`] table indexed by field, so at most
//! one animator drives a given field at a time; re-targeting a field replaces
//! its animator in place.
//!
//! An animator may also pass through intermediate keyframes. Each segment
//! between two consecutive keyframes is eased on its own, so the field comes
//! to rest at every keyframe before moving on.
//!
//! Evaluation is purely a function of the time passed in. How many steps run
//! between the start and end of an animation does not change its duration.

use core::f64::consts::PI;

use alloc::vec::Vec;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::time::{Duration, HostTime};

/// A scalar node property that can be animated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnimatedField {
    /// Horizontal position, in pixels relative to the parent.
    X,
    /// Vertical position, in pixels relative to the parent.
    Y,
    /// Horizontal scale factor.
    ScaleX,
    /// Vertical scale factor.
    ScaleY,
    /// Node opacity in `[0, 1]`.
    Opacity,
    /// Perspective tilt amount, passed through to the backend.
    Tilt,
    /// Opacity of the dimming gradient at its leading edge.
    DimmedBegin,
    /// Opacity of the dimming gradient at its trailing edge.
    DimmedEnd,
}

impl AnimatedField {
    /// Number of animatable fields.
    pub const COUNT: usize = 8;

    /// Every field, in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::X,
        Self::Y,
        Self::ScaleX,
        Self::ScaleY,
        Self::Opacity,
        Self::Tilt,
        Self::DimmedBegin,
        Self::DimmedEnd,
    ];

    /// Returns this field's slot in a [`FieldAnimations`] table.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns whether the field stores an integer, in which case evaluated
    /// values are rounded to the nearest integer.
    #[inline]
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::X | Self::Y)
    }
}

/// The raised-cosine ease.
///
/// Maps progress `t` in `[0, 1]` to `(1 - cos(pi * t)) / 2`. Inputs outside
/// the unit interval are clamped.
#[must_use]
pub fn ease(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    (1.0 - (PI * t).cos()) / 2.0
}

/// Rounds an evaluated value for an integer field.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "positions are pixel coordinates well inside i32 range; `as` saturates"
)]
pub fn round_to_i32(value: f64) -> i32 {
    value.round() as i32
}

/// A value the field reaches at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe {
    /// Field value.
    pub value: f64,
    /// When the value is reached.
    pub time: HostTime,
}

/// Interpolates one scalar field through a chain of keyframes.
///
/// Keyframe times strictly increase from the start keyframe to the end one.
#[derive(Clone, Debug, PartialEq)]
pub struct Animator {
    start: Keyframe,
    end: Keyframe,
    /// Keyframes strictly between `start` and `end`, oldest first.
    between: Vec<Keyframe>,
}

impl Animator {
    /// Creates an animator starting at `start_time` and lasting `duration`.
    ///
    /// A zero duration never reaches here: mutators apply such requests
    /// immediately instead.
    #[must_use]
    pub fn new(start_value: f64, end_value: f64, start_time: HostTime, duration: Duration) -> Self {
        let mut animator = Self::starting_at(start_value, start_time);
        animator.append_keyframe(end_value, duration);
        animator
    }

    /// Creates an animator holding `value` at `time`, with no keyframes yet.
    ///
    /// It evaluates as finished until [`append_keyframe`](Self::append_keyframe)
    /// extends it.
    #[must_use]
    pub const fn starting_at(value: f64, time: HostTime) -> Self {
        let start = Keyframe { value, time };
        Self {
            start,
            end: start,
            between: Vec::new(),
        }
    }

    /// Extends the chain to `value`, reached `delay` after the current end.
    pub fn append_keyframe(&mut self, value: f64, delay: Duration) {
        debug_assert!(!delay.is_zero(), "keyframes need a non-zero delay");
        let delay = if delay.is_zero() { Duration(1) } else { delay };
        if self.end.time > self.start.time {
            self.between.push(self.end);
        }
        self.end = Keyframe {
            value,
            time: self.end.time.saturating_add(delay),
        };
    }

    /// The value the field had when this animator was installed.
    #[inline]
    #[must_use]
    pub const fn start_value(&self) -> f64 {
        self.start.value
    }

    /// The value the field will hold when the animation finishes.
    #[inline]
    #[must_use]
    pub const fn end_value(&self) -> f64 {
        self.end.value
    }

    /// When the animation started.
    #[inline]
    #[must_use]
    pub const fn start_time(&self) -> HostTime {
        self.start.time
    }

    /// When the animation finishes.
    #[inline]
    #[must_use]
    pub const fn end_time(&self) -> HostTime {
        self.end.time
    }

    /// Number of keyframes after the start one.
    #[must_use]
    pub fn keyframe_count(&self) -> usize {
        self.between.len() + usize::from(self.end.time > self.start.time)
    }

    /// Evaluates the animation at `now`.
    ///
    /// Returns the interpolated value and whether the animation is finished.
    /// At or after the end time the end value is returned exactly.
    #[must_use]
    pub fn eval(&self, now: HostTime) -> (f64, bool) {
        if now >= self.end.time {
            return (self.end.value, true);
        }
        if now <= self.start.time {
            return (self.start.value, false);
        }
        let mut prev = self.start;
        let mut next = self.end;
        for &k in &self.between {
            if now <= k.time {
                next = k;
                break;
            }
            prev = k;
        }
        let total = next.time.saturating_duration_since(prev.time).nanos();
        let elapsed = now.saturating_duration_since(prev.time).nanos();
        let x = ease(elapsed as f64 / total as f64);
        (prev.value + x * (next.value - prev.value), false)
    }
}

/// Per-node table of in-flight animators, one optional slot per field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldAnimations {
    slots: [Option<Animator>; AnimatedField::COUNT],
}

impl FieldAnimations {
    /// An empty table.
    pub const EMPTY: Self = Self {
        slots: [const { None }; AnimatedField::COUNT],
    };

    /// Returns the animator driving `field`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, field: AnimatedField) -> Option<&Animator> {
        self.slots[field.index()].as_ref()
    }

    /// Returns whether `field` has an in-flight animator.
    #[inline]
    #[must_use]
    pub fn is_animating(&self, field: AnimatedField) -> bool {
        self.slots[field.index()].is_some()
    }

    /// Returns whether no field is animating.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Number of fields currently animating.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Installs `animator` for `field`, replacing any existing one.
    ///
    /// Returns `true` if the field was not animating before.
    pub fn install(&mut self, field: AnimatedField, animator: Animator) -> bool {
        self.slots[field.index()].replace(animator).is_none()
    }

    /// Removes and returns the animator for `field`.
    pub fn remove(&mut self, field: AnimatedField) -> Option<Animator> {
        self.slots[field.index()].take()
    }

    /// Removes every animator.
    pub fn clear(&mut self) {
        self.slots = [const { None }; AnimatedField::COUNT];
    }

    /// Iterates over the in-flight animators in field order.
    pub fn iter(&self) -> impl Iterator<Item = (AnimatedField, &Animator)> + '_ {
        AnimatedField::ALL
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(&field, slot)| slot.as_ref().map(|a| (field, a)))
    }
}
