// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render plan: an ordered sequence of draw items for one frame.

use alloc::vec::Vec;

use kurbo::Rect;
use strata_core::frame::Frame;
use strata_core::node::{Color, NodeId, NodeKind, OutputId};
use strata_core::surface::AlphaMask;

use crate::damage::DamageRegion;
use crate::matrix::ModelView;
use crate::resource::ResourceKey;

/// Blend mode for compositing a render item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard source-over alpha compositing.
    #[default]
    SourceOver,
    /// The item covers what is behind it; blending can be skipped.
    Opaque,
}

/// What a render item fills its rectangle with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ItemContent {
    /// A flat colour.
    Solid(Color),
    /// A surface image, multiplied by `tint`.
    Image {
        /// The image to sample.
        image: ResourceKey,
        /// Tint colour, white for none.
        tint: Color,
    },
}

/// A node's border, drawn inside its rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Border {
    /// Border colour.
    pub color: Color,
    /// Width in pixels.
    pub width: u32,
}

/// A single draw command in the render plan.
///
/// Items are produced in back-to-front order.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderItem {
    /// The node this item originates from.
    pub node: NodeId,
    /// Fill.
    pub content: ItemContent,
    /// Rectangle size in local coordinates, anchored at the origin.
    pub size: [f32; 2],
    /// Model-view matrix (column-major 4x4) with the node's depth in z.
    pub model_view: [f32; 16],
    /// Depth, larger is nearer.
    pub depth: f32,
    /// Effective opacity (0.0–1.0, accumulated from ancestors).
    pub opacity: f32,
    /// Blend mode.
    pub blend_mode: BlendMode,
    /// Border, if it has a width.
    pub border: Option<Border>,
    /// Dimming gradient opacities (left, right), if the node is dimmed.
    pub dimmed: Option<[f32; 2]>,
    /// Perspective tilt, zero for none.
    pub tilt: f32,
    /// Coverage mask stretched over the rectangle, for shaped surfaces.
    pub alpha_mask: Option<AlphaMask>,
}

/// An ordered list of draw commands for a single frame on a single output.
///
/// Backends translate this into GPU draw calls. Opaque items may be drawn
/// front to back with depth testing before translucent items are blended
/// back to front.
#[derive(Clone, Debug, Default)]
pub struct RenderPlan {
    /// Target output for this plan.
    pub output: OutputId,
    /// Stage size in pixels.
    pub viewport: [u32; 2],
    /// Background colour.
    pub clear_color: Color,
    /// Draw items in back-to-front order.
    pub items: Vec<RenderItem>,
    /// What needs repainting compared with the previous plan.
    pub damage: DamageRegion,
}

impl RenderPlan {
    /// Creates an empty render plan for the given output.
    #[must_use]
    pub fn new(output: OutputId) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    /// Clears the plan for reuse.
    pub fn clear(&mut self) {
        self.items.clear();
        self.damage = DamageRegion::None;
    }

    /// Builds a plan from an evaluated frame.
    #[must_use]
    pub fn from_frame(frame: &Frame<'_>) -> Self {
        let mut plan = Self::default();
        plan.rebuild(frame);
        plan
    }

    /// Rebuilds the plan in place from an evaluated frame, reusing the item
    /// buffer.
    pub fn rebuild(&mut self, frame: &Frame<'_>) {
        self.clear();
        let store = frame.store;
        let (width, height) = store.size(frame.stage);
        self.viewport = [width, height];
        if let NodeKind::Stage(stage) = store.kind(frame.stage) {
            self.output = stage.output;
            self.clear_color = stage.color;
        }

        for &idx in frame.draw_order {
            let Some(item) = build_item(frame, idx) else {
                continue;
            };
            self.items.push(item);
        }

        self.damage = frame_damage(frame);
    }

    /// Number of items that need blending.
    #[must_use]
    pub fn blended_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.blend_mode == BlendMode::SourceOver)
            .count()
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "GPU parameters are single precision"
)]
fn build_item(frame: &Frame<'_>, idx: u32) -> Option<RenderItem> {
    let store = frame.store;
    let (content, quad, alpha_mask) = match store.kind_at(idx) {
        NodeKind::Quad(q) => (ItemContent::Solid(q.color), q, None),
        NodeKind::TextureSurface(q, binding) => (
            ItemContent::Image {
                image: binding.image()?.into(),
                tint: q.color,
            },
            q,
            binding.alpha_mask().cloned(),
        ),
        NodeKind::Container | NodeKind::Stage(_) => return None,
    };
    let (w, h) = store.size_at(idx);
    let depth = store.depth_at(idx);
    let (dim_begin, dim_end) = store.dimmed_opacities_at(idx);
    Some(RenderItem {
        node: store.id_at(idx),
        content,
        size: [w as f32, h as f32],
        model_view: ModelView::from_affine(store.world_transform_at(idx), depth).to_cols_f32(),
        depth: depth as f32,
        opacity: store.effective_opacity_at(idx) as f32,
        blend_mode: if store.is_opaque_at(idx) {
            BlendMode::Opaque
        } else {
            BlendMode::SourceOver
        },
        border: (quad.border_width > 0).then_some(Border {
            color: quad.border_color,
            width: quad.border_width,
        }),
        dimmed: (dim_begin > 0.0 || dim_end > 0.0).then_some([dim_begin as f32, dim_end as f32]),
        tilt: store.tilt_at(idx) as f32,
        alpha_mask,
    })
}

/// Geometry, opacity, topology or stage changes repaint everything;
/// content changes and surface damage repaint their rectangles.
fn frame_damage(frame: &Frame<'_>) -> DamageRegion {
    let changes = frame.changes;
    if frame.stage_resized
        || frame.stage_color_changed
        || changes.topology_changed
        || !changes.geometry.is_empty()
        || !changes.opacities.is_empty()
        || !changes.added.is_empty()
        || !changes.removed.is_empty()
    {
        return DamageRegion::Full;
    }
    let mut damage = DamageRegion::None;
    for &idx in &changes.content {
        damage.add_rect(frame.store.world_bounds_at(idx));
    }
    if let Some(rect) = frame.damage {
        damage.add_rect(rect);
    }
    damage
}

/// Stage-space bounds of the frame, for clipping damage.
#[must_use]
pub fn stage_rect(frame: &Frame<'_>) -> Rect {
    let (w, h) = frame.store.size(frame.stage);
    Rect::new(0.0, 0.0, f64::from(w), f64::from(h))
}
