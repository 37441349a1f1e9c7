// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Animated property changes and the per-step update pass.
//!
//! Every animated property change goes through [`NodeStore::animate`]:
//!
//! - With no duration, the field is written immediately and any animator on
//!   it is dropped.
//! - With a duration, an [`Animator`] is installed from the field's current
//!   value to the target. If the field was already animating, the new
//!   animator replaces the old one and starts from the value already reached,
//!   so there is no visible jump.
//!
//! [`NodeStore::animate_keyframes`] installs a chain of keyframes the same way.
//!
//! [`NodeStore::update`] advances every animator to the step time. Finished
//! animators snap their field to the exact end value and are removed.
//!
//! The store keeps [`num_animating`](NodeStore::num_animating) equal to the
//! number of live nodes with at least one animator.

use understory_dirty::EagerPolicy;

use super::id::{INVALID, NodeId};
use super::store::NodeStore;
use crate::animation::{AnimatedField, Animator, round_to_i32};
use crate::dirty;
use crate::time::{Duration, HostTime};

/// What one [`NodeStore::animate`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnimateOutcome {
    /// Nothing changed (stale handle, or an immediate write of the value the
    /// field already holds).
    Unchanged,
    /// The field was written immediately.
    Applied,
    /// An animator was installed on a field that was not animating.
    Started,
    /// An in-flight animator was replaced.
    Retargeted,
}

impl AnimateOutcome {
    /// Whether the call changed anything that needs drawing.
    #[inline]
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Totals from one [`NodeStore::update`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UpdateReport {
    /// Nodes reached by walking the tree from the root, root included.
    pub visited: u32,
    /// Nodes (attached or not) that had at least one animator.
    pub animated: u32,
    /// Animators that finished during this pass.
    pub finished: u32,
}

impl NodeStore {
    /// Returns the current value of `field`, possibly mid-animation.
    #[must_use]
    pub fn field_value(&self, id: NodeId, field: AnimatedField) -> f64 {
        assert!(self.is_alive(id), "stale NodeId: {id:?}");
        self.read_field(id.idx, field)
    }

    /// Changes `field` to `target`, immediately when `duration` is `None`,
    /// otherwise animated from `now`.
    pub fn animate(
        &mut self,
        id: NodeId,
        field: AnimatedField,
        target: f64,
        duration: Option<Duration>,
        now: HostTime,
    ) -> AnimateOutcome {
        if !self.check(id) {
            return AnimateOutcome::Unchanged;
        }
        let idx = id.idx;
        let i = idx as usize;
        let target = snap(field, target);
        let current = self.read_field(idx, field);

        match duration {
            Some(duration) => {
                self.install(idx, field, Animator::new(current, target, now, duration))
            }
            None => {
                let dropped = self.animations[i].remove(field).is_some();
                if dropped && self.animations[i].is_empty() {
                    self.num_animating -= 1;
                }
                if !dropped && current == target {
                    return AnimateOutcome::Unchanged;
                }
                self.write_field(idx, field, target);
                AnimateOutcome::Applied
            }
        }
    }

    /// Animates `field` through a chain of `(value, delay)` keyframes, each
    /// delay counted from the previous keyframe and the first one from `now`.
    ///
    /// Every segment follows the raised-cosine curve and the field ends on
    /// the last value exactly. Any animator already on the field is replaced,
    /// starting from the value it reached. An empty chain changes nothing.
    pub fn animate_keyframes(
        &mut self,
        id: NodeId,
        field: AnimatedField,
        keyframes: impl IntoIterator<Item = (f64, Duration)>,
        now: HostTime,
    ) -> AnimateOutcome {
        if !self.check(id) {
            return AnimateOutcome::Unchanged;
        }
        let mut animator = Animator::starting_at(self.read_field(id.idx, field), now);
        for (value, delay) in keyframes {
            animator.append_keyframe(snap(field, value), delay);
        }
        if animator.keyframe_count() == 0 {
            return AnimateOutcome::Unchanged;
        }
        self.install(id.idx, field, animator)
    }

    fn install(&mut self, idx: u32, field: AnimatedField, animator: Animator) -> AnimateOutcome {
        let i = idx as usize;
        let was_idle = self.animations[i].is_empty();
        let fresh = self.animations[i].install(field, animator);
        if was_idle {
            self.num_animating += 1;
        }
        if fresh {
            AnimateOutcome::Started
        } else {
            AnimateOutcome::Retargeted
        }
    }

    /// Advances every animator to `now`.
    ///
    /// Walks the tree from `root` in child-list order, counting each visited
    /// node once, then advances animators on live nodes the walk did not
    /// reach (detached subtrees) without counting them.
    pub fn update(&mut self, root: NodeId, now: HostTime) -> UpdateReport {
        let mut report = UpdateReport::default();
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.update_stamp.fill(0);
            self.stamp = 1;
        }
        let stamp = self.stamp;

        if self.is_alive(root) {
            let mut stack = core::mem::take(&mut self.stack);
            stack.clear();
            stack.push(root.idx);
            while let Some(idx) = stack.pop() {
                self.update_stamp[idx as usize] = stamp;
                report.visited += 1;
                self.step_node(idx, now, &mut report);

                // Push in reverse so the topmost child is popped last.
                let mut c = self.last_child[idx as usize];
                while c != INVALID {
                    stack.push(c);
                    c = self.prev_sibling[c as usize];
                }
            }
            self.stack = stack;
        }

        for idx in 0..self.len {
            let i = idx as usize;
            if self.alive[i] && self.update_stamp[i] != stamp {
                self.update_stamp[i] = stamp;
                self.step_node(idx, now, &mut report);
            }
        }
        report
    }

    /// Advances the animators of one node.
    fn step_node(&mut self, idx: u32, now: HostTime, report: &mut UpdateReport) {
        let i = idx as usize;
        if self.animations[i].is_empty() {
            return;
        }
        report.animated += 1;
        for field in AnimatedField::ALL {
            let Some((value, finished)) = self.animations[i].get(field).map(|a| a.eval(now)) else {
                continue;
            };
            self.write_field(idx, field, value);
            if finished {
                self.animations[i].remove(field);
                report.finished += 1;
            }
        }
        if self.animations[i].is_empty() {
            self.num_animating -= 1;
        }
    }

    pub(crate) fn read_field(&self, idx: u32, field: AnimatedField) -> f64 {
        let i = idx as usize;
        match field {
            AnimatedField::X => f64::from(self.x[i]),
            AnimatedField::Y => f64::from(self.y[i]),
            AnimatedField::ScaleX => self.scale_x[i],
            AnimatedField::ScaleY => self.scale_y[i],
            AnimatedField::Opacity => self.opacity[i],
            AnimatedField::Tilt => self.tilt[i],
            AnimatedField::DimmedBegin => self.dimmed_begin[i],
            AnimatedField::DimmedEnd => self.dimmed_end[i],
        }
    }

    /// Writes a field and marks the matching dirty channel.
    fn write_field(&mut self, idx: u32, field: AnimatedField, value: f64) {
        let i = idx as usize;
        match field {
            AnimatedField::X => self.x[i] = round_to_i32(value),
            AnimatedField::Y => self.y[i] = round_to_i32(value),
            AnimatedField::ScaleX => self.scale_x[i] = value,
            AnimatedField::ScaleY => self.scale_y[i] = value,
            AnimatedField::Opacity => self.opacity[i] = value,
            AnimatedField::Tilt => self.tilt[i] = value,
            AnimatedField::DimmedBegin => self.dimmed_begin[i] = value,
            AnimatedField::DimmedEnd => self.dimmed_end[i] = value,
        }
        match field {
            AnimatedField::Opacity => self.dirty.mark_with(idx, dirty::OPACITY, &EagerPolicy),
            AnimatedField::DimmedBegin | AnimatedField::DimmedEnd => {
                self.dirty.mark(idx, dirty::CONTENT);
            }
            _ => self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy),
        }
    }
}

/// Rounds targets of integer fields.
fn snap(field: AnimatedField, value: f64) -> f64 {
    if field.is_integer() {
        f64::from(round_to_i32(value))
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Color;

    fn at(ms: u64) -> HostTime {
        HostTime::from_millis(ms)
    }

    fn ms(n: u64) -> Option<Duration> {
        Some(Duration::from_millis(n))
    }

    #[test]
    fn immediate_write_sets_field_exactly() {
        let mut store = NodeStore::new();
        let q = store.create_quad(1, 1, Color::WHITE);
        let out = store.animate(q, AnimatedField::Opacity, 0.25, None, at(0));
        assert_eq!(out, AnimateOutcome::Applied);
        assert_eq!(store.opacity(q), 0.25);
        assert_eq!(store.num_animating(), 0);
    }

    #[test]
    fn immediate_write_of_same_value_is_unchanged() {
        let mut store = NodeStore::new();
        let q = store.create_quad(1, 1, Color::WHITE);
        let out = store.animate(q, AnimatedField::Opacity, 1.0, None, at(0));
        assert_eq!(out, AnimateOutcome::Unchanged);
        assert!(!out.changed());
    }

    #[test]
    fn animation_counts_nodes_not_fields() {
        let mut store = NodeStore::new();
        let q = store.create_quad(1, 1, Color::WHITE);
        assert_eq!(
            store.animate(q, AnimatedField::X, 100.0, ms(100), at(0)),
            AnimateOutcome::Started
        );
        assert_eq!(
            store.animate(q, AnimatedField::Y, 50.0, ms(100), at(0)),
            AnimateOutcome::Started
        );
        assert_eq!(
            store.animate(q, AnimatedField::X, 10.0, ms(100), at(0)),
            AnimateOutcome::Retargeted
        );
        assert_eq!(store.num_animating(), 1);
        assert_eq!(store.animations(q).len(), 2);
    }

    #[test]
    fn zero_duration_drops_animator() {
        let mut store = NodeStore::new();
        let q = store.create_quad(1, 1, Color::WHITE);
        store.animate(q, AnimatedField::Opacity, 0.0, ms(200), at(0));
        assert_eq!(store.num_animating(), 1);

        // Same value as the current one, but an animator was dropped.
        let out = store.animate(q, AnimatedField::Opacity, 1.0, None, at(50));
        assert_eq!(out, AnimateOutcome::Applied);
        assert_eq!(store.opacity(q), 1.0);
        assert!(store.animations(q).is_empty());
        assert_eq!(store.num_animating(), 0);
    }

    #[test]
    fn update_walks_to_completion() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let q = store.create_quad(1, 1, Color::WHITE);
        store.add_child(root, q);
        store.animate(q, AnimatedField::X, 100.0, ms(100), at(0));

        let r = store.update(root, at(50));
        assert_eq!(r.visited, 2);
        assert_eq!(r.animated, 1);
        assert_eq!(r.finished, 0);
        assert_eq!(store.position(q).0, 50);

        let r = store.update(root, at(100));
        assert_eq!(r.finished, 1);
        assert_eq!(store.position(q).0, 100);
        assert_eq!(store.num_animating(), 0);
    }

    #[test]
    fn retarget_starts_from_reached_value() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let q = store.create_quad(1, 1, Color::WHITE);
        store.add_child(root, q);
        store.animate(q, AnimatedField::ScaleX, 2.0, ms(100), at(0));
        store.update(root, at(50));
        let reached = store.scale(q).0;
        assert!((reached - 1.5).abs() < 1e-9, "midpoint of 1 -> 2");

        store.animate(q, AnimatedField::ScaleX, 3.0, ms(100), at(50));
        store.update(root, at(50));
        assert_eq!(store.scale(q).0, reached, "no jump at the retarget instant");

        store.update(root, at(150));
        assert_eq!(store.scale(q).0, 3.0);
    }

    #[test]
    fn keyframe_chain_rests_on_each_value_and_ends_exactly() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let q = store.create_quad(1, 1, Color::WHITE);
        store.add_child(root, q);
        let chain = [
            (40.0, Duration::from_millis(100)),
            (-7.4, Duration::from_millis(50)),
        ];
        assert_eq!(
            store.animate_keyframes(q, AnimatedField::X, chain, at(0)),
            AnimateOutcome::Started
        );
        assert_eq!(store.num_animating(), 1);

        store.update(root, at(50));
        assert_eq!(store.position(q).0, 20);
        store.update(root, at(100));
        assert_eq!(store.position(q).0, 40, "first keyframe is reached exactly");
        assert!(store.animations(q).is_animating(AnimatedField::X));

        let r = store.update(root, at(150));
        assert_eq!(r.finished, 1);
        assert_eq!(store.position(q).0, -7, "integer keyframes are rounded");
        assert_eq!(store.num_animating(), 0);
    }

    #[test]
    fn keyframes_retarget_from_the_reached_value() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let q = store.create_quad(1, 1, Color::WHITE);
        store.add_child(root, q);
        store.animate(q, AnimatedField::Opacity, 0.0, ms(100), at(0));
        store.update(root, at(50));

        let out = store.animate_keyframes(
            q,
            AnimatedField::Opacity,
            [(1.0, Duration::from_millis(10)), (0.0, Duration::from_millis(10))],
            at(50),
        );
        assert_eq!(out, AnimateOutcome::Retargeted);
        let animator = store.animations(q).get(AnimatedField::Opacity).expect("animating");
        assert!((animator.start_value() - 0.5).abs() < 1e-9);
        assert_eq!(animator.keyframe_count(), 2);

        store.update(root, at(60));
        assert!((store.opacity(q) - 1.0).abs() < 1e-9);
        store.update(root, at(70));
        assert_eq!(store.opacity(q), 0.0);
        assert_eq!(store.num_animating(), 0);
    }

    #[test]
    fn empty_keyframe_chain_is_unchanged() {
        let mut store = NodeStore::new();
        let q = store.create_quad(1, 1, Color::WHITE);
        let chain: [(f64, Duration); 0] = [];
        assert_eq!(
            store.animate_keyframes(q, AnimatedField::Tilt, chain, at(0)),
            AnimateOutcome::Unchanged
        );
        assert_eq!(store.num_animating(), 0);
    }

    #[test]
    fn detached_nodes_advance_without_counting() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let loose = store.create_quad(1, 1, Color::WHITE);
        store.animate(loose, AnimatedField::Opacity, 0.0, ms(10), at(0));

        let r = store.update(root, at(10));
        assert_eq!(r.visited, 1);
        assert_eq!(r.animated, 1);
        assert_eq!(store.opacity(loose), 0.0);
        assert_eq!(store.num_animating(), 0);
    }

    #[test]
    fn destroy_releases_animation_count() {
        let mut store = NodeStore::new();
        let q = store.create_quad(1, 1, Color::WHITE);
        store.animate(q, AnimatedField::Tilt, 1.0, ms(10), at(0));
        store.animate(q, AnimatedField::Opacity, 0.0, ms(10), at(0));
        assert_eq!(store.num_animating(), 1);
        store.destroy(q);
        assert_eq!(store.num_animating(), 0);
    }

    #[test]
    fn integer_targets_are_rounded() {
        let mut store = NodeStore::new();
        let q = store.create_quad(1, 1, Color::WHITE);
        store.animate(q, AnimatedField::Y, 7.6, None, at(0));
        assert_eq!(store.position(q).1, 8);
        assert_eq!(store.field_value(q, AnimatedField::Y), 8.0);
    }

    #[test]
    fn update_visits_in_child_list_order_once() {
        let mut store = NodeStore::new();
        let root = store.create_container();
        let a = store.create_container();
        let b = store.create_quad(1, 1, Color::WHITE);
        let c = store.create_quad(1, 1, Color::WHITE);
        store.add_child(root, a);
        store.add_child(a, b);
        store.add_child(root, c);
        let r = store.update(root, at(0));
        assert_eq!(r.visited, 4);
        assert_eq!(r.animated, 0);
    }
}
