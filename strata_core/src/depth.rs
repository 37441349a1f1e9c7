// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Depth assignment, inherited visibility and draw-order construction.
//!
//! The [`DepthPass`] walks the tree from the stage in pre-order, children in
//! list order (bottom first). Every visited node, containers included,
//! consumes one depth slot, and later slots are nearer the viewer:
//!
//! ```text
//!   stage            slot 1
//!   ├── desktop      slot 2
//!   │   └── window   slot 3
//!   └── panel        slot 4   (nearest)
//! ```
//!
//! With `n` visited nodes the range is split into `n + 1` equal steps and
//! slot `k` gets `min + k * step`, so no node sits on either end of the
//! range. A container is always behind its own subtree, and a subtree
//! occupies a contiguous run of slots.
//!
//! While walking, the pass also computes each node's stage-space transform
//! and bounds, its effective opacity (product over ancestors) and whether it
//! is visible at all. Hidden subtrees still receive depth so the slot count
//! matches the update pass, but they are left out of the draw order.
//!
//! The opaque flag is advisory: backends may skip blending for opaque nodes,
//! and [`DepthPass::finish`] uses it to cull nodes hidden behind an opaque
//! node covering the whole stage. Ignoring it never changes the picture.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use kurbo::{Affine, Rect};

use crate::node::{INVALID, NodeId, NodeKind, NodeStore};

/// Nearest-to-farthest bound of the default depth range.
pub const MIN_DEPTH: f64 = 0.0;

/// Far bound of the default depth range.
pub const MAX_DEPTH: f64 = 4096.0;

/// Effective opacity above which a node may be treated as opaque.
pub const OPAQUE_THRESHOLD: f64 = 0.999;

/// Effective opacity at or below which a node is not drawn.
pub const VISIBLE_THRESHOLD: f64 = 0.001;

/// The numeric range depth values are drawn from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthRange {
    /// Lower bound (exclusive for assigned values).
    pub min: f64,
    /// Upper bound (exclusive for assigned values).
    pub max: f64,
}

impl DepthRange {
    /// `MIN_DEPTH..MAX_DEPTH`.
    pub const DEFAULT: Self = Self::new(MIN_DEPTH, MAX_DEPTH);

    /// Creates a range.
    #[inline]
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Depth of 1-based `slot` when `count` nodes share the range.
    #[must_use]
    pub fn slot(&self, slot: u32, count: u32) -> f64 {
        let step = (self.max - self.min) / f64::from(count.max(1) + 1);
        self.min + f64::from(slot) * step
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Totals from one [`DepthPass::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DepthReport {
    /// Nodes that received a depth slot.
    pub assigned: u32,
    /// Visible drawable nodes, before surface refresh and culling.
    pub candidates: u32,
}

/// Totals from one [`DepthPass::finish`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CullReport {
    /// Nodes in the draw order.
    pub drawn: u32,
    /// Surfaces left out because they have no valid image.
    pub unbound: u32,
    /// Nodes left out because they are off the stage or fully covered.
    pub culled: u32,
    /// Slot of the topmost drawn node when it is an opaque texture surface
    /// covering the whole stage.
    pub top_fullscreen: Option<u32>,
}

/// Assigns depth and builds the draw order.
#[derive(Clone, Copy, Debug, Default)]
pub struct DepthPass {
    range: DepthRange,
}

struct Visit {
    idx: u32,
    transform: Affine,
    opacity: f64,
    visible: bool,
}

impl DepthPass {
    /// Creates a pass over `range`.
    #[must_use]
    pub const fn new(range: DepthRange) -> Self {
        Self { range }
    }

    /// The range depths are drawn from.
    #[must_use]
    pub const fn range(&self) -> DepthRange {
        self.range
    }

    /// Walks the tree from `root`, writing depth, stage-space geometry,
    /// effective opacity, visibility and the opaque flag, and collecting the
    /// visible drawable nodes back to front into `candidates`.
    ///
    /// `node_count` is the number of nodes the update pass visited. A
    /// non-empty `active_groups` hides every node outside those groups,
    /// except the stage.
    pub fn run(
        &self,
        store: &mut NodeStore,
        root: NodeId,
        node_count: u32,
        active_groups: &BTreeSet<u32>,
        candidates: &mut Vec<u32>,
    ) -> DepthReport {
        candidates.clear();
        let mut report = DepthReport::default();
        if !store.is_alive(root) {
            return report;
        }

        let mut stack = Vec::new();
        stack.push(Visit {
            idx: root.idx,
            transform: Affine::IDENTITY,
            opacity: 1.0,
            visible: true,
        });
        while let Some(visit) = stack.pop() {
            let i = visit.idx as usize;
            report.assigned += 1;
            store.depth[i] = self.range.slot(report.assigned, node_count);

            let is_stage = matches!(store.kind[i], NodeKind::Stage(_));
            let (local, opacity, in_group) = if is_stage {
                (Affine::IDENTITY, 1.0, true)
            } else {
                let local = Affine::translate((f64::from(store.x[i]), f64::from(store.y[i])))
                    * Affine::scale_non_uniform(store.scale_x[i], store.scale_y[i]);
                let in_group = active_groups.is_empty()
                    || store.groups[i].iter().any(|g| active_groups.contains(g));
                (local, visit.opacity * store.opacity[i], in_group)
            };
            let transform = visit.transform * local;
            let visible = visit.visible
                && store.shown[i]
                && in_group
                && (is_stage || opacity > VISIBLE_THRESHOLD);
            let size = Rect::new(
                0.0,
                0.0,
                f64::from(store.width[i]),
                f64::from(store.height[i]),
            );

            store.world_transform[i] = transform;
            store.world_bounds[i] = transform.transform_rect_bbox(size);
            store.effective_opacity[i] = opacity;
            store.effective_visible[i] = visible;
            store.culled[i] = false;
            store.is_opaque[i] = visible && node_is_opaque(&store.kind[i], opacity);

            if visible && store.kind[i].is_drawable() && size.area() > 0.0 {
                candidates.push(visit.idx);
                report.candidates += 1;
            }

            // Push in reverse so children are visited bottom first.
            let mut c = store.last_child[i];
            while c != INVALID {
                stack.push(Visit {
                    idx: c,
                    transform,
                    opacity,
                    visible,
                });
                c = store.prev_sibling[c as usize];
            }
        }
        report
    }

    /// Turns the candidates from [`run`](Self::run) into the final draw
    /// order, back to front.
    ///
    /// Call after stale surfaces have been refreshed. Texture surfaces
    /// without a valid image are left out, their opaque flag is recomputed
    /// from the image, and nodes off the stage or behind an opaque node
    /// covering all of `stage_bounds` are culled. If that occluder is a
    /// texture surface with nothing drawn above it, it is reported as
    /// [`CullReport::top_fullscreen`].
    pub fn finish(
        &self,
        store: &mut NodeStore,
        candidates: &[u32],
        stage_bounds: Rect,
        draw_order: &mut Vec<u32>,
    ) -> CullReport {
        let mut report = CullReport::default();
        draw_order.clear();
        for &idx in candidates {
            let i = idx as usize;
            if let Some(binding) = store.kind[i].surface() {
                if !binding.is_valid() {
                    report.unbound += 1;
                    continue;
                }
                store.is_opaque[i] = node_is_opaque(&store.kind[i], store.effective_opacity[i]);
            }
            if store.world_bounds[i].intersect(stage_bounds).area() <= 0.0 {
                store.culled[i] = true;
                report.culled += 1;
                continue;
            }
            draw_order.push(idx);
        }

        // Everything below the topmost opaque node that covers the stage is
        // invisible.
        let occluder = draw_order.iter().rposition(|&idx| {
            let i = idx as usize;
            store.is_opaque[i] && store.tilt[i] == 0.0 && covers(store.world_bounds[i], stage_bounds)
        });
        if let Some(pos) = occluder {
            let top = draw_order[pos];
            if pos + 1 == draw_order.len()
                && matches!(store.kind[top as usize], NodeKind::TextureSurface(..))
            {
                report.top_fullscreen = Some(top);
            }
            for &idx in &draw_order[..pos] {
                store.culled[idx as usize] = true;
            }
            report.culled += u32::try_from(pos).unwrap_or(u32::MAX);
            draw_order.drain(..pos);
        }

        report.drawn = u32::try_from(draw_order.len()).unwrap_or(u32::MAX);
        report
    }
}

fn node_is_opaque(kind: &NodeKind, effective_opacity: f64) -> bool {
    if effective_opacity <= OPAQUE_THRESHOLD {
        return false;
    }
    match kind {
        NodeKind::Container | NodeKind::Stage(_) => false,
        NodeKind::Quad(q) => q.color.is_opaque(),
        NodeKind::TextureSurface(q, s) => {
            q.color.is_opaque() && s.is_valid() && !s.has_alpha() && s.alpha_mask().is_none()
        }
    }
}

fn covers(outer: Rect, inner: Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1
}
