// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame change sets and the frame handed to the render backend.
//!
//! Property writes mark channels in the store's dirty tracker. Once per
//! drawn frame the engine drains every channel into a [`FrameChanges`],
//! which tells a retained-mode backend what moved since the previous frame.
//! Immediate-mode backends can ignore it and redraw [`Frame::draw_order`].
//!
//! [`FrameChanges`] uses raw slot indices (`u32`) rather than [`NodeId`]
//! handles. A slot index may have been destroyed and reused between frames;
//! the `removed` and `added` lists say when that happened.

use alloc::vec::Vec;

use kurbo::Rect;

use crate::dirty;
use crate::node::{NodeId, NodeStore};
use crate::time::HostTime;

/// What changed in the tree since the previous drawn frame.
#[derive(Clone, Debug, Default)]
pub struct FrameChanges {
    /// Nodes whose stage-space transform or bounds may have changed.
    pub geometry: Vec<u32>,
    /// Nodes whose effective opacity or visibility may have changed.
    pub opacities: Vec<u32>,
    /// Nodes whose fill, border, dimming or surface contents changed.
    pub content: Vec<u32>,
    /// Slots allocated since the previous frame.
    pub added: Vec<u32>,
    /// Slots destroyed since the previous frame.
    pub removed: Vec<u32>,
    /// `true` when any parent/child link or sibling order changed.
    pub topology_changed: bool,
}

impl FrameChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.geometry.clear();
        self.opacities.clear();
        self.content.clear();
        self.added.clear();
        self.removed.clear();
        self.topology_changed = false;
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
            && self.opacities.is_empty()
            && self.content.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
            && !self.topology_changed
    }
}

impl NodeStore {
    /// Drains every dirty channel and the lifecycle lists into `changes`.
    pub(crate) fn drain_changes_into(&mut self, changes: &mut FrameChanges) {
        changes.clear();

        changes.geometry = self
            .dirty
            .drain(dirty::GEOMETRY)
            .affected()
            .deterministic()
            .run()
            .collect();
        changes.opacities = self
            .dirty
            .drain(dirty::OPACITY)
            .affected()
            .deterministic()
            .run()
            .collect();
        changes.content = self
            .dirty
            .drain(dirty::CONTENT)
            .deterministic()
            .run()
            .collect();
        changes.topology_changed = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .count()
            > 0;

        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);
    }
}

/// Everything a backend needs to draw one frame.
///
/// The store has already been through the update and depth passes, so
/// every node's depth, stage-space transform and effective opacity are
/// current.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    /// Monotonic count of drawn frames, starting at 0.
    pub frame_index: u64,
    /// Host time the frame was built for.
    pub now: HostTime,
    /// The node tree.
    pub store: &'a NodeStore,
    /// The stage node.
    pub stage: NodeId,
    /// Visible drawable nodes, back to front.
    pub draw_order: &'a [u32],
    /// Changes since the previous drawn frame.
    pub changes: &'a FrameChanges,
    /// `true` if the stage was resized since the previous frame.
    pub stage_resized: bool,
    /// `true` if the stage colour changed since the previous frame.
    pub stage_color_changed: bool,
    /// Stage-space region reported damaged by surface owners, if any.
    pub damage: Option<Rect>,
    /// The opaque texture surface covering the whole stage with nothing
    /// drawn above it, if any.
    pub top_fullscreen: Option<NodeId>,
    /// `true` if [`top_fullscreen`](Self::top_fullscreen) differs from the
    /// previous drawn frame.
    pub top_fullscreen_changed: bool,
}

impl Frame<'_> {
    /// Iterates the draw order as node handles, back to front.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.draw_order.iter().map(|&idx| self.store.id_at(idx))
    }
}
