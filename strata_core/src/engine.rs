// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The compositing engine: node tree, redraw scheduling and the step loop.
//!
//! An [`Engine`] owns the [`NodeStore`], the stage, a [`RenderBackend`] and a
//! [`FrameTimer`]. Collaborators create nodes and change their properties
//! through the engine; every change marks the engine dirty and enables the
//! [`RedrawScheduler`]. When the timer fires, the host calls
//! [`Engine::step`]:
//!
//! ```text
//!   cancel pending tick
//!       │
//!       ▼
//!   update animators ──► dirty? ──► depth pass ──► refresh stale surfaces
//!                          │                              │
//!                          │                              ▼
//!                          │                finish draw order, drain changes
//!                          │                              │
//!                          │                              ▼
//!                          │                     RenderBackend::draw
//!                          ▼                              │
//!   animations left? ◄─────┴──────────────────────────────┘
//!     yes: re-arm      no: disable
//! ```
//!
//! The scheduler is enabled exactly when the engine is dirty or some node
//! is animating, so an idle engine costs nothing.
//!
//! Animated mutators take a duration in milliseconds as an `i32`; zero or a
//! negative value applies the change immediately.

use core::any::Any;

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;

use kurbo::Rect;
use understory_dirty::EagerPolicy;

use crate::animation::AnimatedField;
use crate::backend::{FrameTimer, RenderBackend};
use crate::depth::{DepthPass, DepthRange};
use crate::dirty;
use crate::frame::{Frame, FrameChanges};
use crate::node::{AnimateOutcome, Color, NodeId, NodeKind, NodeStore, OutputId, StageData, SurfaceId};
use crate::scheduler::{RedrawScheduler, SchedulerConfig};
use crate::surface::{AlphaMask, SurfaceBinding};
use crate::time::{Duration, HostTime};
use crate::trace::{
    FrameCounts, FrameSummaryBuilder, PhaseBeginEvent, PhaseEndEvent, PhaseKind, SchedulerEvent,
    StepBeginEvent, StepEndEvent, SurfaceEvent, SurfaceOutcome, Tracer,
};

/// Dimmed-gradient opacities used by [`Engine::show_dimmed`].
pub const DIMMED_OPACITY_BEGIN: f64 = 0.2;

/// See [`DIMMED_OPACITY_BEGIN`].
pub const DIMMED_OPACITY_END: f64 = 0.6;

/// Engine configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    /// Redraw pacing.
    pub scheduler: SchedulerConfig,
    /// Range depth values are drawn from.
    pub depth_range: DepthRange,
    /// Initial stage width.
    pub stage_width: u32,
    /// Initial stage height.
    pub stage_height: u32,
    /// Initial stage background colour.
    pub stage_color: Color,
    /// Output the stage is presented on.
    pub output: OutputId,
}

impl EngineConfig {
    /// 16 ms frames, the default depth range and a black 1280x800 stage.
    pub const DEFAULT: Self = Self {
        scheduler: SchedulerConfig::DEFAULT,
        depth_range: DepthRange::DEFAULT,
        stage_width: 1280,
        stage_height: 800,
        stage_color: Color::BLACK,
        output: OutputId(0),
    };

    /// Returns this configuration with a different stage size.
    #[must_use]
    pub const fn with_stage_size(mut self, width: u32, height: u32) -> Self {
        self.stage_width = width;
        self.stage_height = height;
        self
    }

    /// Returns this configuration with a different draw interval.
    #[must_use]
    pub const fn with_draw_interval(mut self, interval: Duration) -> Self {
        self.scheduler = SchedulerConfig::with_interval(interval);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A compositing engine instance.
///
/// All node handles passed to an engine must have been created by it.
/// Property reads go through [`store`](Self::store); writes go through the
/// engine so that redraws get scheduled.
pub struct Engine<B: RenderBackend, T: FrameTimer> {
    config: EngineConfig,
    store: NodeStore,
    stage: NodeId,
    backend: B,
    timer: T,
    scheduler: RedrawScheduler,
    depth_pass: DepthPass,
    dirty: bool,
    active_groups: BTreeSet<u32>,
    step_index: u64,
    frame_index: u64,
    discarded: u32,
    candidates: Vec<u32>,
    draw_order: Vec<u32>,
    changes: FrameChanges,
    top_fullscreen: Option<NodeId>,
}

impl<B: RenderBackend, T: FrameTimer> core::fmt::Debug for Engine<B, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("stage", &self.stage)
            .field("live_nodes", &self.store.live_count())
            .field("num_animations", &self.store.num_animating())
            .field("dirty", &self.dirty)
            .field("scheduler", &self.scheduler)
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

impl<B: RenderBackend, T: FrameTimer> Engine<B, T> {
    /// Creates an engine with a fresh stage and schedules its first frame.
    pub fn new(config: EngineConfig, backend: B, timer: T) -> Self {
        let mut store = NodeStore::new();
        let stage = store.create_stage(
            StageData::new(config.output, config.stage_color),
            config.stage_width,
            config.stage_height,
        );
        store.set_name(stage, "stage");
        let mut engine = Self {
            config,
            store,
            stage,
            backend,
            timer,
            scheduler: RedrawScheduler::new(config.scheduler),
            depth_pass: DepthPass::new(config.depth_range),
            dirty: false,
            active_groups: BTreeSet::new(),
            step_index: 0,
            frame_index: 0,
            discarded: 0,
            candidates: Vec::new(),
            draw_order: Vec::new(),
            changes: FrameChanges::default(),
            top_fullscreen: None,
        };
        engine.mark_dirty();
        engine
    }

    // -- Accessors --

    /// The configuration the engine was created with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The stage.
    #[inline]
    #[must_use]
    pub const fn stage(&self) -> NodeId {
        self.stage
    }

    /// Read access to every node.
    #[inline]
    #[must_use]
    pub const fn store(&self) -> &NodeStore {
        &self.store
    }

    /// The render backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the render backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The timer.
    #[must_use]
    pub const fn timer(&self) -> &T {
        &self.timer
    }

    /// Mutable access to the timer.
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Whether a redraw has been requested since the last step.
    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Nodes with at least one running animation.
    #[inline]
    #[must_use]
    pub fn num_animations(&self) -> u32 {
        self.store.num_animating()
    }

    /// Whether the redraw timer is running.
    #[inline]
    #[must_use]
    pub const fn is_scheduler_enabled(&self) -> bool {
        self.scheduler.is_enabled()
    }

    /// The redraw scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &RedrawScheduler {
        &self.scheduler
    }

    /// Number of frames drawn so far.
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame_index
    }

    /// The opaque texture surface that covered the whole stage, with nothing
    /// above it, in the last drawn frame.
    #[must_use]
    pub const fn top_fullscreen(&self) -> Option<NodeId> {
        self.top_fullscreen
    }

    /// The active visibility groups. Empty means no filtering.
    #[must_use]
    pub const fn active_visibility_groups(&self) -> &BTreeSet<u32> {
        &self.active_groups
    }

    // -- Node lifecycle --

    /// Creates a detached, empty container.
    pub fn create_container(&mut self) -> NodeId {
        self.store.create_container()
    }

    /// Creates a detached quad.
    pub fn create_quad(&mut self, width: u32, height: u32, color: Color) -> NodeId {
        self.store.create_quad(width, height, color)
    }

    /// Creates a detached 0x0 texture surface with no surface bound.
    pub fn create_texture_surface(&mut self) -> NodeId {
        self.store.create_texture_surface()
    }

    /// Creates a detached copy of a node. See [`NodeStore::clone_node`].
    pub fn clone_node(&mut self, id: NodeId) -> Option<NodeId> {
        self.store.clone_node(id)
    }

    /// Destroys a node, discarding its surface image first.
    pub fn destroy(&mut self, id: NodeId) {
        if !self.store.check(id) {
            return;
        }
        let attached = self.store.parent(id).is_some();
        if let Some(binding) = self.store.kind[id.idx as usize].surface_mut() {
            discard_image(binding, &mut self.backend, &mut self.discarded);
        }
        self.store.destroy(id);
        if attached {
            self.mark_dirty();
        }
    }

    // -- Topology --

    /// Adds `child` on top of `parent`'s children. Returns whether the tree
    /// changed.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let changed = self.store.add_child(parent, child);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Removes `child` from `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let changed = self.store.remove_child(parent, child);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Detaches `child` from its parent, if any.
    pub fn remove_from_parent(&mut self, child: NodeId) -> bool {
        let changed = self.store.remove_from_parent(child);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Moves `child` on top of `new_parent`'s children.
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) -> bool {
        let changed = self.store.reparent(child, new_parent);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Moves `node` directly above its sibling `above`.
    pub fn raise(&mut self, node: NodeId, above: NodeId) -> bool {
        let changed = self.store.raise(node, above);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Moves `node` directly below its sibling `below`.
    pub fn lower(&mut self, node: NodeId, below: NodeId) -> bool {
        let changed = self.store.lower(node, below);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Moves `node` above all its siblings.
    pub fn raise_to_top(&mut self, node: NodeId) -> bool {
        let changed = self.store.raise_to_top(node);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// Moves `node` below all its siblings.
    pub fn lower_to_bottom(&mut self, node: NodeId) -> bool {
        let changed = self.store.lower_to_bottom(node);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    // -- Animated mutators --

    /// Moves a node to `(x, y)` in its parent's coordinates.
    pub fn move_to(&mut self, id: NodeId, x: i32, y: i32, duration_ms: i32) {
        self.animate(id, AnimatedField::X, f64::from(x), duration_ms);
        self.animate(id, AnimatedField::Y, f64::from(y), duration_ms);
    }

    /// Moves a node horizontally.
    pub fn move_x(&mut self, id: NodeId, x: i32, duration_ms: i32) {
        self.animate(id, AnimatedField::X, f64::from(x), duration_ms);
    }

    /// Moves a node vertically.
    pub fn move_y(&mut self, id: NodeId, y: i32, duration_ms: i32) {
        self.animate(id, AnimatedField::Y, f64::from(y), duration_ms);
    }

    /// Scales a node about its top-left corner.
    pub fn set_scale(&mut self, id: NodeId, scale_x: f64, scale_y: f64, duration_ms: i32) {
        self.animate(id, AnimatedField::ScaleX, scale_x, duration_ms);
        self.animate(id, AnimatedField::ScaleY, scale_y, duration_ms);
    }

    /// Fades a node. The target is clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, id: NodeId, opacity: f64, duration_ms: i32) {
        self.animate(id, AnimatedField::Opacity, opacity.clamp(0.0, 1.0), duration_ms);
    }

    /// Tilts a node.
    pub fn set_tilt(&mut self, id: NodeId, tilt: f64, duration_ms: i32) {
        self.animate(id, AnimatedField::Tilt, tilt, duration_ms);
    }

    /// Fades a node's dimming gradient in or out.
    pub fn show_dimmed(&mut self, id: NodeId, dimmed: bool, duration_ms: i32) {
        let (begin, end) = if dimmed {
            (DIMMED_OPACITY_BEGIN, DIMMED_OPACITY_END)
        } else {
            (0.0, 0.0)
        };
        self.animate(id, AnimatedField::DimmedBegin, begin, duration_ms);
        self.animate(id, AnimatedField::DimmedEnd, end, duration_ms);
    }

    /// Changes any animated field. Returns what happened.
    pub fn animate(
        &mut self,
        id: NodeId,
        field: AnimatedField,
        target: f64,
        duration_ms: i32,
    ) -> AnimateOutcome {
        let now = self.timer.now();
        let duration = Duration::from_signed_millis(duration_ms);
        let outcome = self.store.animate(id, field, target, duration, now);
        if outcome.changed() {
            self.mark_dirty();
        }
        outcome
    }

    /// Animates a field through `(value, delay_ms)` keyframes, each delay
    /// counted from the previous keyframe.
    ///
    /// Every delay must be positive; otherwise the call is rejected and
    /// nothing changes.
    pub fn animate_keyframes(
        &mut self,
        id: NodeId,
        field: AnimatedField,
        keyframes: &[(f64, i32)],
    ) -> AnimateOutcome {
        if keyframes.iter().any(|&(_, delay_ms)| delay_ms <= 0) {
            tracing::warn!(?id, ?field, "keyframe delays must be positive");
            return AnimateOutcome::Unchanged;
        }
        let now = self.timer.now();
        let chain = keyframes
            .iter()
            .filter_map(|&(value, delay_ms)| Some((value, Duration::from_signed_millis(delay_ms)?)));
        let outcome = self.store.animate_keyframes(id, field, chain, now);
        if outcome.changed() {
            self.mark_dirty();
        }
        outcome
    }

    // -- Immediate mutators --

    /// Sets the diagnostic name.
    pub fn set_name(&mut self, id: NodeId, name: &str) {
        self.store.set_name(id, name);
    }

    /// Resizes a quad or texture surface. A texture surface's image no
    /// longer fits and is discarded.
    pub fn set_size(&mut self, id: NodeId, width: u32, height: u32) {
        if !self.store.set_size(id, width, height) {
            return;
        }
        if let Some(binding) = self.store.kind[id.idx as usize].surface_mut() {
            discard_image(binding, &mut self.backend, &mut self.discarded);
        }
        self.mark_dirty();
    }

    /// Shows or hides a node and its subtree.
    pub fn set_shown(&mut self, id: NodeId, shown: bool) {
        if self.store.set_shown(id, shown) {
            self.mark_dirty();
        }
    }

    /// Sets the fill colour of a quad or texture surface.
    pub fn set_color(&mut self, id: NodeId, color: Color) {
        if self.store.set_color(id, color) {
            self.mark_dirty();
        }
    }

    /// Sets the border of a quad or texture surface.
    pub fn set_border(&mut self, id: NodeId, color: Color, width: u32) {
        if self.store.set_border(id, color, width) {
            self.mark_dirty();
        }
    }

    // -- Visibility groups --

    /// Adds a node to a visibility group.
    pub fn add_to_visibility_group(&mut self, id: NodeId, group: u32) {
        if self.store.add_to_visibility_group(id, group) {
            self.mark_dirty();
        }
    }

    /// Removes a node from a visibility group.
    pub fn remove_from_visibility_group(&mut self, id: NodeId, group: u32) {
        if self.store.remove_from_visibility_group(id, group) {
            self.mark_dirty();
        }
    }

    /// Restricts drawing to nodes in at least one of `groups`. An empty set
    /// draws everything. The stage is never filtered.
    pub fn set_active_visibility_groups(&mut self, groups: impl IntoIterator<Item = u32>) {
        let groups: BTreeSet<u32> = groups.into_iter().collect();
        if groups == self.active_groups {
            return;
        }
        self.active_groups = groups;
        self.store
            .dirty
            .mark_with(self.stage.idx, dirty::OPACITY, &EagerPolicy);
        self.mark_dirty();
    }

    // -- Stage --

    /// The stage size.
    #[must_use]
    pub fn stage_size(&self) -> (u32, u32) {
        self.store.size(self.stage)
    }

    /// The stage background colour.
    #[must_use]
    pub fn stage_color(&self) -> Color {
        self.stage_data().map_or(self.config.stage_color, |d| d.color)
    }

    /// Resizes the stage. The next frame reports
    /// [`stage_resized`](Frame::stage_resized).
    pub fn set_stage_size(&mut self, width: u32, height: u32) {
        if !self.store.write_size(self.stage.idx, width, height) {
            return;
        }
        if let NodeKind::Stage(data) = &mut self.store.kind[self.stage.idx as usize] {
            data.was_resized = true;
        }
        self.mark_dirty();
    }

    /// Changes the stage background colour. The next frame reports
    /// [`stage_color_changed`](Frame::stage_color_changed).
    pub fn set_stage_color(&mut self, color: Color) {
        let NodeKind::Stage(data) = &mut self.store.kind[self.stage.idx as usize] else {
            return;
        };
        if data.color == color {
            return;
        }
        data.color = color;
        data.color_changed = true;
        self.mark_dirty();
    }

    fn stage_data(&self) -> Option<&StageData> {
        match &self.store.kind[self.stage.idx as usize] {
            NodeKind::Stage(data) => Some(data),
            _ => None,
        }
    }

    // -- Surfaces --

    /// Binds a texture surface to `surface`. The image is produced lazily
    /// before the node is next drawn.
    pub fn set_surface(&mut self, id: NodeId, surface: SurfaceId) {
        let Some(binding) = binding_mut(&mut self.store, id) else {
            return;
        };
        binding.set_surface(surface);
        self.store.dirty.mark(id.idx, dirty::CONTENT);
        self.mark_dirty();
    }

    /// Shapes a texture surface with an 8-bit coverage mask, one byte per
    /// pixel. A masked surface is never opaque.
    ///
    /// Returns `false` if the node is not a texture surface or `bytes` does
    /// not hold `width * height` bytes.
    pub fn set_alpha_mask(&mut self, id: NodeId, bytes: &[u8], width: u32, height: u32) -> bool {
        let Some(mask) = AlphaMask::new(bytes, width, height) else {
            tracing::warn!(?id, width, height, len = bytes.len(), "malformed alpha mask");
            return false;
        };
        let Some(binding) = binding_mut(&mut self.store, id) else {
            return false;
        };
        if binding.set_alpha_mask(mask) {
            self.store.dirty.mark(id.idx, dirty::CONTENT);
            self.mark_dirty();
        }
        true
    }

    /// Removes a texture surface's alpha mask.
    pub fn clear_alpha_mask(&mut self, id: NodeId) {
        let Some(binding) = binding_mut(&mut self.store, id) else {
            return;
        };
        if binding.clear_alpha_mask() {
            self.store.dirty.mark(id.idx, dirty::CONTENT);
            self.mark_dirty();
        }
    }

    /// Marks a texture surface's image stale.
    pub fn invalidate_surface(&mut self, id: NodeId) {
        let Some(binding) = binding_mut(&mut self.store, id) else {
            return;
        };
        binding.invalidate();
        self.store.dirty.mark(id.idx, dirty::CONTENT);
        self.mark_dirty();
    }

    /// Refreshes a texture surface's image now instead of waiting for the
    /// next drawn frame. Returns whether the node holds a valid image.
    ///
    /// A failure is logged and leaves the node stale.
    pub fn refresh_surface(&mut self, id: NodeId) -> bool {
        if !self.store.check(id) {
            return false;
        }
        let Some(binding) = self.store.kind[id.idx as usize].surface_mut() else {
            tracing::warn!(?id, "not a texture surface");
            return false;
        };
        match binding.refresh(&mut self.backend) {
            Ok(_) => {
                self.store.dirty.mark(id.idx, dirty::CONTENT);
                self.mark_dirty();
                true
            }
            Err(error) => {
                tracing::debug!(?id, %error, "surface refresh failed");
                false
            }
        }
    }

    /// Releases a texture surface's image. The surface stays bound and is
    /// refreshed again before the node is next drawn.
    pub fn discard_surface(&mut self, id: NodeId) {
        let Some(binding) = binding_mut(&mut self.store, id) else {
            return;
        };
        let had_image = binding.image().is_some();
        discard_image(binding, &mut self.backend, &mut self.discarded);
        if had_image {
            self.store.dirty.mark(id.idx, dirty::CONTENT);
            self.mark_dirty();
        }
    }

    /// Reports new contents for `surface`. Every node showing it goes stale
    /// and `damage` (surface coordinates, `None` for everything) is merged
    /// into its damage region. Returns the number of nodes affected.
    pub fn notify_surface_changed(&mut self, surface: SurfaceId, damage: Option<Rect>) -> u32 {
        let mut affected = 0;
        for idx in 0..self.store.len {
            let i = idx as usize;
            if !self.store.alive[i] {
                continue;
            }
            let full = Rect::new(
                0.0,
                0.0,
                f64::from(self.store.width[i]),
                f64::from(self.store.height[i]),
            );
            let Some(binding) = bound_to(&mut self.store.kind[i], surface) else {
                continue;
            };
            binding.invalidate();
            binding.add_damage(damage.unwrap_or(full));
            self.store.dirty.mark(idx, dirty::CONTENT);
            affected += 1;
        }
        if affected > 0 {
            self.mark_dirty();
        }
        affected
    }

    /// Reports that `surface` changed size. Every node showing it is resized
    /// and its image discarded. Returns the number of nodes affected.
    pub fn notify_surface_resized(&mut self, surface: SurfaceId, width: u32, height: u32) -> u32 {
        let mut affected = 0;
        for idx in 0..self.store.len {
            let i = idx as usize;
            if !self.store.alive[i] {
                continue;
            }
            let Some(binding) = bound_to(&mut self.store.kind[i], surface) else {
                continue;
            };
            discard_image(binding, &mut self.backend, &mut self.discarded);
            self.store.write_size(idx, width, height);
            self.store.dirty.mark(idx, dirty::CONTENT);
            affected += 1;
        }
        if affected > 0 {
            self.mark_dirty();
        }
        affected
    }

    /// Reports that `surface` no longer exists. Every node showing it drops
    /// its image and forgets the surface. Returns the number of nodes
    /// affected.
    pub fn notify_surface_destroyed(&mut self, surface: SurfaceId) -> u32 {
        let mut affected = 0;
        for idx in 0..self.store.len {
            let i = idx as usize;
            if !self.store.alive[i] {
                continue;
            }
            let Some(binding) = bound_to(&mut self.store.kind[i], surface) else {
                continue;
            };
            if binding.image().is_some() {
                self.discarded += 1;
            }
            binding.unbind(&mut self.backend);
            self.store.dirty.mark(idx, dirty::CONTENT);
            affected += 1;
        }
        if affected > 0 {
            self.mark_dirty();
        }
        affected
    }

    // -- Scheduling --

    /// Requests a redraw and enables the scheduler.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.scheduler.enable(&mut self.timer);
    }

    /// Runs one step at `now`. Returns whether a frame was drawn.
    ///
    /// The host calls this when the timer fires. Calling it at other times
    /// is harmless.
    pub fn step(&mut self, now: HostTime) -> bool {
        self.step_traced(now, &mut Tracer::none())
    }

    /// Like [`step`](Self::step), reporting progress to `tracer`.
    pub fn step_traced(&mut self, now: HostTime, tracer: &mut Tracer<'_>) -> bool {
        let step_index = self.step_index;
        self.step_index += 1;
        self.scheduler.cancel(&mut self.timer);
        tracer.step_begin(&StepBeginEvent {
            step_index,
            now,
            dirty: self.dirty,
            num_animations: self.store.num_animating(),
        });

        let mut summary = FrameSummaryBuilder::new(self.frame_index, now);
        self.phase_begin(tracer, &mut summary, step_index, PhaseKind::Update);
        let report = self.store.update(self.stage, now);
        self.phase_end(tracer, &mut summary, step_index, PhaseKind::Update);
        if report.animated > 0 {
            self.dirty = true;
        }

        let drew = self.dirty;
        if drew {
            let mut counts = FrameCounts {
                nodes: report.visited,
                animating: self.store.num_animating(),
                ..FrameCounts::default()
            };

            self.phase_begin(tracer, &mut summary, step_index, PhaseKind::Depth);
            self.depth_pass.run(
                &mut self.store,
                self.stage,
                report.visited,
                &self.active_groups,
                &mut self.candidates,
            );
            self.phase_end(tracer, &mut summary, step_index, PhaseKind::Depth);

            self.phase_begin(tracer, &mut summary, step_index, PhaseKind::Refresh);
            self.refresh_candidates(tracer, step_index, &mut counts);
            self.phase_end(tracer, &mut summary, step_index, PhaseKind::Refresh);

            let (width, height) = self.store.size(self.stage);
            let stage_bounds = Rect::new(0.0, 0.0, f64::from(width), f64::from(height));
            let cull = self.depth_pass.finish(
                &mut self.store,
                &self.candidates,
                stage_bounds,
                &mut self.draw_order,
            );
            counts.drawn = cull.drawn;
            counts.culled = cull.culled;
            counts.unbound = cull.unbound;
            let top_fullscreen = cull.top_fullscreen.map(|idx| self.store.id_at(idx));
            let top_fullscreen_changed = top_fullscreen != self.top_fullscreen;
            if top_fullscreen_changed {
                tracing::debug!(?top_fullscreen, "top fullscreen surface changed");
                self.top_fullscreen = top_fullscreen;
            }

            let damage = self.take_damage();
            let (stage_resized, stage_color_changed) = self.take_stage_flags();
            self.store.drain_changes_into(&mut self.changes);

            self.phase_begin(tracer, &mut summary, step_index, PhaseKind::Draw);
            let frame = Frame {
                frame_index: self.frame_index,
                now,
                store: &self.store,
                stage: self.stage,
                draw_order: &self.draw_order,
                changes: &self.changes,
                stage_resized,
                stage_color_changed,
                damage,
                top_fullscreen,
                top_fullscreen_changed,
            };
            self.backend.draw(&frame);
            self.phase_end(tracer, &mut summary, step_index, PhaseKind::Draw);

            counts.discarded = core::mem::take(&mut self.discarded);
            tracer.frame_summary(&summary.finish(counts));
            self.scheduler.record_draw(now);
            self.frame_index += 1;
        }
        self.dirty = false;

        if self.store.num_animating() == 0 {
            self.scheduler.disable(&mut self.timer);
            tracer.scheduler(&SchedulerEvent {
                step_index,
                now,
                enabled: false,
                delay: None,
            });
        } else {
            let delay = self.scheduler.next_delay(self.timer.now());
            if !self.scheduler.enable(&mut self.timer) {
                self.scheduler.arm(&mut self.timer);
            }
            tracer.scheduler(&SchedulerEvent {
                step_index,
                now,
                enabled: true,
                delay: Some(delay),
            });
        }

        tracer.step_end(&StepEndEvent {
            step_index,
            now,
            drew,
            num_animations: self.store.num_animating(),
        });
        drew
    }

    /// Refreshes every stale surface among the draw candidates.
    fn refresh_candidates(&mut self, tracer: &mut Tracer<'_>, step_index: u64, counts: &mut FrameCounts) {
        for &idx in &self.candidates {
            let Some(binding) = self.store.kind[idx as usize].surface_mut() else {
                continue;
            };
            let Some(surface) = binding.surface() else {
                continue;
            };
            if !binding.needs_refresh() {
                continue;
            }
            let outcome = match binding.refresh(&mut self.backend) {
                Ok(handle) => {
                    counts.refreshed += 1;
                    SurfaceOutcome::Refreshed(handle)
                }
                Err(error) => {
                    tracing::debug!(node = idx, ?surface, %error, "surface refresh failed");
                    counts.refresh_failed += 1;
                    SurfaceOutcome::Failed(error)
                }
            };
            tracer.surface(&SurfaceEvent {
                step_index,
                node_index: idx,
                surface,
                outcome,
            });
        }
    }

    /// Collects and resets surface damage, in stage coordinates.
    fn take_damage(&mut self) -> Option<Rect> {
        let mut damage: Option<Rect> = None;
        for idx in 0..self.store.len {
            let i = idx as usize;
            if !self.store.alive[i] {
                continue;
            }
            let Some(rect) = self.store.kind[i]
                .surface_mut()
                .and_then(SurfaceBinding::take_damage)
            else {
                continue;
            };
            if !self.store.effective_visible[i] {
                continue;
            }
            let rect = self.store.world_transform[i].transform_rect_bbox(rect);
            damage = Some(damage.map_or(rect, |d| d.union(rect)));
        }
        damage
    }

    fn take_stage_flags(&mut self) -> (bool, bool) {
        match &mut self.store.kind[self.stage.idx as usize] {
            NodeKind::Stage(data) => (
                core::mem::take(&mut data.was_resized),
                core::mem::take(&mut data.color_changed),
            ),
            _ => (false, false),
        }
    }

    fn phase_begin(
        &self,
        tracer: &mut Tracer<'_>,
        summary: &mut FrameSummaryBuilder,
        step_index: u64,
        phase: PhaseKind,
    ) {
        let timestamp = self.timer.now();
        summary.phase_begin(phase, timestamp);
        tracer.phase_begin(&PhaseBeginEvent {
            step_index,
            phase,
            timestamp,
        });
    }

    fn phase_end(
        &self,
        tracer: &mut Tracer<'_>,
        summary: &mut FrameSummaryBuilder,
        step_index: u64,
        phase: PhaseKind,
    ) {
        let timestamp = self.timer.now();
        summary.phase_end(phase, timestamp);
        tracer.phase_end(&PhaseEndEvent {
            step_index,
            phase,
            timestamp,
        });
    }

    // -- Diagnostics --

    /// Renders the subtree rooted at `root`. See [`NodeStore::debug_string`].
    #[must_use]
    pub fn debug_string(&self, root: NodeId) -> String {
        self.store.debug_string(root)
    }

    // -- Per-node cache --

    /// Stores a backend value on a node. See [`NodeStore::set_cache`].
    pub fn set_cache<V: Any>(&mut self, id: NodeId, tag: u32, value: V) {
        self.store.set_cache(id, tag, value);
    }

    /// Mutable access to a cached value.
    pub fn cache_mut<V: Any>(&mut self, id: NodeId, tag: u32) -> Option<&mut V> {
        self.store.cache_mut(id, tag)
    }

    /// Removes and returns a cached value.
    pub fn take_cache<V: Any>(&mut self, id: NodeId, tag: u32) -> Option<V> {
        self.store.take_cache(id, tag)
    }
}

/// The binding of a live texture surface, warning about other kinds.
fn binding_mut(store: &mut NodeStore, id: NodeId) -> Option<&mut SurfaceBinding> {
    if !store.check(id) {
        return None;
    }
    let binding = store.kind[id.idx as usize].surface_mut();
    if binding.is_none() {
        tracing::warn!(?id, "not a texture surface");
    }
    binding
}

/// The binding of a texture surface showing `surface`.
fn bound_to(kind: &mut NodeKind, surface: SurfaceId) -> Option<&mut SurfaceBinding> {
    kind.surface_mut().filter(|b| b.surface() == Some(surface))
}

impl<B: RenderBackend, T: FrameTimer> Drop for Engine<B, T> {
    /// Releases every surface image still held and cancels the pending tick.
    fn drop(&mut self) {
        for kind in &mut self.store.kind {
            if let Some(binding) = kind.surface_mut() {
                discard_image(binding, &mut self.backend, &mut self.discarded);
            }
        }
        self.scheduler.disable(&mut self.timer);
    }
}

fn discard_image<B: RenderBackend>(binding: &mut SurfaceBinding, backend: &mut B, discarded: &mut u32) {
    if binding.image().is_some() {
        *discarded += 1;
    }
    binding.discard(backend);
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::RefCell;

    use super::*;
    use crate::backend::{SurfaceError, SurfaceImage};
    use crate::node::ImageHandle;
    use crate::surface::SurfaceState;

    #[derive(Debug)]
    struct DrawnFrame {
        now: HostTime,
        order: Vec<NodeId>,
        changes: FrameChanges,
        stage_resized: bool,
        stage_color_changed: bool,
        damage: Option<Rect>,
        top_fullscreen: Option<NodeId>,
        top_fullscreen_changed: bool,
    }

    #[derive(Debug, Default)]
    struct RecordingBackend {
        next_image: u64,
        refreshed: Vec<(SurfaceId, Option<ImageHandle>)>,
        released: Vec<ImageHandle>,
        /// Outlives the backend, for checking releases made on drop.
        release_log: Rc<RefCell<Vec<ImageHandle>>>,
        failing: BTreeSet<u32>,
        frames: Vec<DrawnFrame>,
    }

    impl RenderBackend for RecordingBackend {
        fn refresh_surface_image(
            &mut self,
            surface: SurfaceId,
            current: Option<ImageHandle>,
        ) -> Result<SurfaceImage, SurfaceError> {
            self.refreshed.push((surface, current));
            if self.failing.contains(&surface.0) {
                return Err(SurfaceError::Gone(surface));
            }
            let handle = current.unwrap_or_else(|| {
                self.next_image += 1;
                ImageHandle(self.next_image)
            });
            Ok(SurfaceImage {
                handle,
                has_alpha: false,
            })
        }

        fn release_surface_image(&mut self, image: ImageHandle) {
            self.released.push(image);
            self.release_log.borrow_mut().push(image);
        }

        fn draw(&mut self, frame: &Frame<'_>) {
            self.frames.push(DrawnFrame {
                now: frame.now,
                order: frame.nodes().collect(),
                changes: frame.changes.clone(),
                stage_resized: frame.stage_resized,
                stage_color_changed: frame.stage_color_changed,
                damage: frame.damage,
                top_fullscreen: frame.top_fullscreen,
                top_fullscreen_changed: frame.top_fullscreen_changed,
            });
        }
    }

    #[derive(Debug, Default)]
    struct ManualTimer {
        now: HostTime,
        scheduled: Vec<Duration>,
        cancels: u32,
    }

    impl FrameTimer for ManualTimer {
        fn now(&self) -> HostTime {
            self.now
        }

        fn schedule_once(&mut self, delay: Duration) {
            self.scheduled.push(delay);
        }

        fn cancel(&mut self) {
            self.cancels += 1;
        }
    }

    type TestEngine = Engine<RecordingBackend, ManualTimer>;

    fn engine() -> TestEngine {
        let config = EngineConfig::DEFAULT.with_stage_size(100, 100);
        let mut e = Engine::new(config, RecordingBackend::default(), ManualTimer::default());
        e.step(HostTime(0));
        e
    }

    /// Moves the clock to `ms` and runs a step there.
    fn step_at(e: &mut TestEngine, ms: u64) -> bool {
        let now = HostTime::from_millis(ms);
        e.timer_mut().now = now;
        e.step(now)
    }

    fn set_clock(e: &mut TestEngine, ms: u64) {
        e.timer_mut().now = HostTime::from_millis(ms);
    }

    fn assert_scheduler_invariant(e: &TestEngine) {
        assert_eq!(
            e.is_scheduler_enabled(),
            e.is_dirty() || e.num_animations() > 0,
            "scheduler enabled iff dirty or animating"
        );
    }

    fn last_frame(e: &TestEngine) -> &DrawnFrame {
        e.backend().frames.last().expect("a frame was drawn")
    }

    fn surface_node(e: &mut TestEngine, surface: u32) -> NodeId {
        let s = e.create_texture_surface();
        e.set_size(s, 50, 50);
        e.set_surface(s, SurfaceId(surface));
        let stage = e.stage();
        e.add_child(stage, s);
        s
    }

    #[test]
    fn new_engine_draws_first_frame_then_idles() {
        let config = EngineConfig::DEFAULT.with_stage_size(100, 100);
        let mut e = Engine::new(config, RecordingBackend::default(), ManualTimer::default());
        assert!(e.is_dirty());
        assert!(e.is_scheduler_enabled());
        assert_eq!(e.timer().scheduled, [Duration::ZERO]);

        assert!(e.step(HostTime(0)));
        assert_eq!(e.backend().frames.len(), 1);
        assert!(!e.is_dirty());
        assert!(!e.is_scheduler_enabled());
        assert_eq!(e.timer().cancels, 1, "the pending tick was consumed");
        assert!(e.backend().frames[0].changes.added.contains(&e.stage().index()));
    }

    #[test]
    fn stray_wakeup_is_a_noop_that_disables() {
        let mut e = engine();
        assert!(!step_at(&mut e, 40));
        assert_eq!(e.backend().frames.len(), 1);
        assert!(!e.is_scheduler_enabled());
        assert_scheduler_invariant(&e);
    }

    #[test]
    fn topology_noops_leave_the_engine_idle() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        assert!(!e.remove_from_parent(q));
        assert!(!e.is_dirty());
        assert!(!e.is_scheduler_enabled());

        let stage = e.stage();
        assert!(e.add_child(stage, q));
        assert!(e.is_dirty());
        assert_scheduler_invariant(&e);
    }

    #[test]
    fn mutation_schedules_paced_redraw() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        let stage = e.stage();
        set_clock(&mut e, 5);
        e.add_child(stage, q);
        assert!(e.is_scheduler_enabled());
        assert_eq!(
            e.timer().scheduled.last(),
            Some(&Duration::from_millis(11)),
            "16 ms interval measured from the draw at t=0"
        );
        assert_scheduler_invariant(&e);
        assert!(step_at(&mut e, 16));
        assert_eq!(last_frame(&e).order, [q]);
    }

    #[test]
    fn animation_accounting() {
        let mut e = engine();
        let stage = e.stage();
        let a = e.create_quad(10, 10, Color::WHITE);
        let b = e.create_quad(10, 10, Color::WHITE);
        e.add_child(stage, a);

        e.set_opacity(a, 0.0, 100);
        e.move_to(a, 30, 40, 100);
        assert_eq!(e.num_animations(), 1, "counts nodes, not fields");
        e.set_opacity(b, 0.0, 200);
        assert_eq!(e.num_animations(), 2, "detached nodes count too");
        e.set_opacity(a, 0.5, 100);
        assert_eq!(e.num_animations(), 2, "retargeting does not count again");
        assert_scheduler_invariant(&e);

        step_at(&mut e, 50);
        assert_eq!(e.num_animations(), 2);
        assert!(e.is_scheduler_enabled());
        assert_scheduler_invariant(&e);

        step_at(&mut e, 150);
        assert_eq!(e.num_animations(), 1);
        assert_eq!(e.store().position(a), (30, 40));
        assert_eq!(e.store().opacity(a), 0.5);

        step_at(&mut e, 200);
        assert_eq!(e.num_animations(), 0);
        assert_eq!(e.store().opacity(b), 0.0);
        assert!(!e.is_scheduler_enabled());
        assert_scheduler_invariant(&e);
    }

    #[test]
    fn destroying_an_animating_node_releases_its_count() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.move_x(q, 100, 100);
        assert_eq!(e.num_animations(), 1);
        e.destroy(q);
        assert_eq!(e.num_animations(), 0);
        step_at(&mut e, 16);
        assert!(!e.is_scheduler_enabled());
    }

    #[test]
    fn zero_duration_is_exact_and_drops_the_animator() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.set_tilt(q, 1.0, 100);
        step_at(&mut e, 30);
        e.set_tilt(q, 0.25, 0);
        assert_eq!(e.store().tilt(q), 0.25);
        assert!(e.store().animations(q).is_empty());
        assert_eq!(e.num_animations(), 0);

        e.set_tilt(q, 0.5, -10);
        assert_eq!(e.store().tilt(q), 0.5, "negative durations apply immediately");
    }

    #[test]
    fn unchanged_immediate_write_does_not_dirty() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        let outcome = e.animate(q, AnimatedField::Opacity, 1.0, 0);
        assert_eq!(outcome, AnimateOutcome::Unchanged);
        assert!(!e.is_dirty());
        assert!(!e.is_scheduler_enabled());
    }

    #[test]
    fn keyframe_chains_schedule_until_the_last_value() {
        let mut e = engine();
        let stage = e.stage();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.add_child(stage, q);
        step_at(&mut e, 16);

        set_clock(&mut e, 16);
        let chain = [(0.0, 32), (1.0, 32)];
        assert_eq!(
            e.animate_keyframes(q, AnimatedField::Opacity, &chain),
            AnimateOutcome::Started
        );
        assert_eq!(e.num_animations(), 1);
        assert!(e.is_scheduler_enabled());

        step_at(&mut e, 48);
        assert_eq!(e.store().opacity(q), 0.0, "first keyframe");
        assert!(e.is_scheduler_enabled(), "chain continues");
        step_at(&mut e, 64);
        assert!((e.store().opacity(q) - 0.5).abs() < 1e-9);
        step_at(&mut e, 80);
        assert_eq!(e.store().opacity(q), 1.0);
        assert_eq!(e.num_animations(), 0);
        assert!(!e.is_scheduler_enabled());
        assert_scheduler_invariant(&e);

        assert_eq!(
            e.animate_keyframes(q, AnimatedField::Opacity, &[(0.5, 16), (0.0, 0)]),
            AnimateOutcome::Unchanged
        );
        assert!(!e.is_dirty());
        assert_eq!(e.num_animations(), 0);
    }

    #[test]
    fn retarget_continues_from_the_current_value() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.move_x(q, 100, 100);
        step_at(&mut e, 50);
        let mid = e.store().position(q).0;
        assert_eq!(mid, 50);

        assert_eq!(
            e.animate(q, AnimatedField::X, 200.0, 100),
            AnimateOutcome::Retargeted
        );
        assert_eq!(e.store().position(q).0, mid, "no jump at the retarget instant");
        step_at(&mut e, 60);
        assert!(e.store().position(q).0 >= mid);
        step_at(&mut e, 150);
        assert_eq!(e.store().position(q).0, 200);
        assert_eq!(e.num_animations(), 0);
    }

    #[test]
    fn fade_in_then_reparent() {
        let mut e = engine();
        let stage = e.stage();
        let c = e.create_container();
        e.add_child(stage, c);
        let q = e.create_quad(10, 10, Color::WHITE);
        e.set_opacity(q, 0.0, 0);
        e.set_opacity(q, 1.0, 200);

        step_at(&mut e, 100);
        let opacity = e.store().opacity(q);
        assert!((opacity - 0.5).abs() < 1e-9, "midpoint of the ease, got {opacity}");

        e.add_child(c, q);
        let later = e.create_quad(10, 10, Color::WHITE);
        e.add_child(stage, later);
        step_at(&mut e, 116);
        let (dc, dq, dl) = (
            e.store().depth(c),
            e.store().depth(q),
            e.store().depth(later),
        );
        assert!(dc < dq && dq < dl, "q sits inside c's slot range");
        assert_eq!(e.num_animations(), 1, "still mid-animation");
        assert!(e.store().opacity(q) > 0.5);
    }

    #[test]
    fn raise_and_lower_change_draw_order() {
        let mut e = engine();
        let stage = e.stage();
        let a = e.create_quad(10, 10, Color::WHITE);
        let b = e.create_quad(10, 10, Color::WHITE);
        e.add_child(stage, a);
        e.add_child(stage, b);
        step_at(&mut e, 16);
        assert_eq!(last_frame(&e).order, [a, b]);
        assert!(e.store().depth(b) > e.store().depth(a));

        assert!(e.raise(a, b));
        step_at(&mut e, 32);
        assert_eq!(last_frame(&e).order, [b, a]);
        assert!(last_frame(&e).changes.topology_changed);

        assert!(e.lower(a, b));
        step_at(&mut e, 48);
        assert_eq!(last_frame(&e).order, [a, b]);
    }

    #[test]
    fn surface_invalidate_refresh_release_once() {
        let mut e = engine();
        let s = surface_node(&mut e, 7);
        assert!(e.refresh_surface(s));
        let binding = e.store().surface_binding(s).expect("texture surface");
        assert!(binding.is_valid());

        e.invalidate_surface(s);
        assert!(!e.store().surface_binding(s).expect("texture surface").is_valid());

        assert!(e.refresh_surface(s));
        let binding = e.store().surface_binding(s).expect("texture surface");
        assert!(binding.is_valid());
        assert_eq!(binding.image(), Some(ImageHandle(1)));
        assert!(e.backend().released.is_empty(), "updated in place");

        e.destroy(s);
        assert_eq!(e.backend().released, [ImageHandle(1)]);
    }

    #[test]
    fn stale_surfaces_refresh_lazily_before_drawing() {
        let mut e = engine();
        let s = surface_node(&mut e, 7);
        assert!(e.backend().refreshed.is_empty());
        step_at(&mut e, 16);
        assert_eq!(e.backend().refreshed, [(SurfaceId(7), None)]);
        assert_eq!(last_frame(&e).order, [s]);
        assert!(e.store().is_opaque(s));

        step_at(&mut e, 32);
        assert_eq!(e.backend().refreshed.len(), 1, "bound surfaces are reused");
    }

    #[test]
    fn hidden_surfaces_are_not_refreshed() {
        let mut e = engine();
        let s = surface_node(&mut e, 7);
        e.set_shown(s, false);
        step_at(&mut e, 16);
        assert!(e.backend().refreshed.is_empty());
        assert!(last_frame(&e).order.is_empty());
    }

    #[test]
    fn failed_refresh_leaves_surface_undrawn() {
        let mut e = engine();
        e.backend_mut().failing.insert(7);
        let s = surface_node(&mut e, 7);
        assert!(step_at(&mut e, 16));
        assert!(last_frame(&e).order.is_empty());
        assert_eq!(
            e.store().surface_binding(s).expect("texture surface").state(),
            SurfaceState::Stale,
            "a failed refresh changes nothing"
        );

        e.backend_mut().failing.clear();
        e.mark_dirty();
        step_at(&mut e, 32);
        assert_eq!(last_frame(&e).order, [s], "a later refresh succeeds");
    }

    #[test]
    fn resize_discards_the_image() {
        let mut e = engine();
        let s = surface_node(&mut e, 7);
        step_at(&mut e, 16);
        e.set_size(s, 60, 60);
        assert_eq!(e.backend().released, [ImageHandle(1)]);
        step_at(&mut e, 32);
        assert_eq!(e.backend().refreshed.len(), 2);
        assert_eq!(
            e.store().surface_binding(s).expect("texture surface").image(),
            Some(ImageHandle(2))
        );
    }

    #[test]
    fn surface_damage_is_reported_in_stage_space() {
        let mut e = engine();
        let s = surface_node(&mut e, 7);
        e.move_to(s, 10, 20, 0);
        step_at(&mut e, 16);
        assert_eq!(last_frame(&e).damage, None);

        assert_eq!(
            e.notify_surface_changed(SurfaceId(7), Some(Rect::new(0.0, 0.0, 5.0, 5.0))),
            1
        );
        assert!(e.is_scheduler_enabled());
        step_at(&mut e, 32);
        assert_eq!(e.backend().refreshed.len(), 2);
        assert_eq!(last_frame(&e).damage, Some(Rect::new(10.0, 20.0, 15.0, 25.0)));
        assert_eq!(last_frame(&e).changes.content, [s.index()]);

        e.mark_dirty();
        step_at(&mut e, 48);
        assert_eq!(last_frame(&e).damage, None, "damage resets after drawing");
    }

    #[test]
    fn unrelated_surface_notifications_are_ignored() {
        let mut e = engine();
        surface_node(&mut e, 7);
        step_at(&mut e, 16);
        assert_eq!(e.notify_surface_changed(SurfaceId(8), None), 0);
        assert!(!e.is_dirty());
    }

    #[test]
    fn surface_resize_and_destroy_notifications() {
        let mut e = engine();
        let s = surface_node(&mut e, 7);
        step_at(&mut e, 16);

        assert_eq!(e.notify_surface_resized(SurfaceId(7), 80, 30), 1);
        assert_eq!(e.store().size(s), (80, 30));
        assert_eq!(e.backend().released, [ImageHandle(1)]);

        step_at(&mut e, 32);
        assert_eq!(e.notify_surface_destroyed(SurfaceId(7)), 1);
        assert_eq!(e.backend().released, [ImageHandle(1), ImageHandle(2)]);
        let binding = e.store().surface_binding(s).expect("texture surface");
        assert_eq!(binding.surface(), None);
        step_at(&mut e, 48);
        assert!(last_frame(&e).order.is_empty());
    }

    #[test]
    fn top_fullscreen_surface_changes_are_reported_once() {
        let mut e = engine();
        let stage = e.stage();
        let s = surface_node(&mut e, 1);
        e.set_size(s, 100, 100);
        step_at(&mut e, 16);
        assert_eq!(last_frame(&e).top_fullscreen, Some(s));
        assert!(last_frame(&e).top_fullscreen_changed);
        assert_eq!(e.top_fullscreen(), Some(s));

        e.mark_dirty();
        step_at(&mut e, 32);
        assert_eq!(last_frame(&e).top_fullscreen, Some(s));
        assert!(!last_frame(&e).top_fullscreen_changed, "same surface on top");

        // Anything drawn above it ends the fullscreen state.
        let q = e.create_quad(10, 10, Color::WHITE);
        e.add_child(stage, q);
        step_at(&mut e, 48);
        assert_eq!(last_frame(&e).order, [s, q]);
        assert_eq!(last_frame(&e).top_fullscreen, None);
        assert!(last_frame(&e).top_fullscreen_changed);

        e.set_opacity(q, 0.5, 0);
        step_at(&mut e, 64);
        assert!(!last_frame(&e).top_fullscreen_changed);
        assert_eq!(e.top_fullscreen(), None);
    }

    #[test]
    fn fullscreen_quads_are_not_reported_as_top_surfaces() {
        let mut e = engine();
        let stage = e.stage();
        surface_node(&mut e, 1);
        let q = e.create_quad(100, 100, Color::WHITE);
        e.add_child(stage, q);
        step_at(&mut e, 16);
        assert_eq!(last_frame(&e).order, [q], "the quad occludes the surface");
        assert_eq!(last_frame(&e).top_fullscreen, None);
        assert!(!last_frame(&e).top_fullscreen_changed);
    }

    #[test]
    fn masked_fullscreen_surface_does_not_occlude() {
        let mut e = engine();
        let stage = e.stage();
        let below = e.create_quad(20, 20, Color::WHITE);
        e.add_child(stage, below);
        let s = surface_node(&mut e, 1);
        e.set_size(s, 100, 100);
        step_at(&mut e, 16);
        assert_eq!(last_frame(&e).order, [s]);

        assert!(e.set_alpha_mask(s, &[255, 0, 0, 255], 2, 2));
        assert!(e.is_dirty());
        step_at(&mut e, 32);
        assert_eq!(last_frame(&e).order, [below, s]);
        assert!(last_frame(&e).changes.content.contains(&s.index()));
        assert!(!e.store().is_opaque(s));
        assert_eq!(e.top_fullscreen(), None);

        assert!(!e.set_alpha_mask(s, &[255; 3], 2, 2), "wrong length");
        assert!(!e.set_alpha_mask(below, &[255; 4], 2, 2), "not a surface");
        assert!(e.set_alpha_mask(s, &[255, 0, 0, 255], 2, 2));
        assert!(!e.is_dirty(), "same mask again");

        e.clear_alpha_mask(s);
        step_at(&mut e, 48);
        assert_eq!(last_frame(&e).order, [s]);
        assert_eq!(e.top_fullscreen(), Some(s));
    }

    #[test]
    fn dropping_the_engine_releases_held_images() {
        let mut e = engine();
        let a = surface_node(&mut e, 1);
        surface_node(&mut e, 2);
        let detached = e.create_texture_surface();
        e.set_size(detached, 10, 10);
        e.set_surface(detached, SurfaceId(3));
        step_at(&mut e, 16);
        e.destroy(a);
        assert_eq!(e.backend().released, [ImageHandle(1)]);

        let log = Rc::clone(&e.backend().release_log);
        drop(e);
        // The detached node never got an image; each held image goes once.
        assert_eq!(*log.borrow(), [ImageHandle(1), ImageHandle(2)]);
    }

    #[test]
    fn stage_flags_are_reported_once() {
        let mut e = engine();
        e.set_stage_size(200, 150);
        e.set_stage_color(Color::WHITE);
        step_at(&mut e, 16);
        assert!(last_frame(&e).stage_resized);
        assert!(last_frame(&e).stage_color_changed);
        assert_eq!(e.stage_size(), (200, 150));
        assert_eq!(e.stage_color(), Color::WHITE);

        e.mark_dirty();
        step_at(&mut e, 32);
        assert!(!last_frame(&e).stage_resized);
        assert!(!last_frame(&e).stage_color_changed);
    }

    #[test]
    fn visibility_groups_filter_the_draw_order() {
        let mut e = engine();
        let stage = e.stage();
        let a = e.create_quad(10, 10, Color::WHITE);
        let b = e.create_quad(10, 10, Color::WHITE);
        e.add_child(stage, a);
        e.add_child(stage, b);
        e.add_to_visibility_group(a, 1);
        e.add_to_visibility_group(b, 2);

        e.set_active_visibility_groups([1]);
        step_at(&mut e, 16);
        assert_eq!(last_frame(&e).order, [a]);

        e.set_active_visibility_groups([0_u32; 0]);
        step_at(&mut e, 32);
        assert_eq!(last_frame(&e).order, [a, b]);
    }

    #[test]
    fn show_dimmed_animates_the_gradient() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.show_dimmed(q, true, 100);
        step_at(&mut e, 100);
        assert_eq!(
            e.store().dimmed_opacities(q),
            (DIMMED_OPACITY_BEGIN, DIMMED_OPACITY_END)
        );
        e.show_dimmed(q, false, 0);
        assert_eq!(e.store().dimmed_opacities(q), (0.0, 0.0));
    }

    #[test]
    fn frames_carry_their_time() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.move_x(q, 10, 100);
        step_at(&mut e, 20);
        assert_eq!(last_frame(&e).now, HostTime::from_millis(20));
        assert_eq!(e.frame_count(), 2);
    }

    #[test]
    fn clone_copies_properties_not_placement() {
        let mut e = engine();
        let stage = e.stage();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.add_child(stage, q);
        e.move_to(q, 3, 4, 0);
        let copy = e.clone_node(q).expect("quads can be cloned");
        assert_eq!(e.store().position(copy), (3, 4));
        assert_eq!(e.store().parent(copy), None);
        assert_eq!(e.clone_node(stage), None);
    }

    #[test]
    fn debug_string_lists_the_tree() {
        let mut e = engine();
        let stage = e.stage();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.set_name(q, "q");
        e.add_child(stage, q);
        let dump = e.debug_string(stage);
        assert!(dump.starts_with("\"stage\" (Stage)"), "{dump}");
        assert!(dump.contains("\n  \"q\" (Quad)"), "{dump}");
    }

    #[test]
    fn cache_entries_live_and_die_with_the_node() {
        let mut e = engine();
        let q = e.create_quad(10, 10, Color::WHITE);
        e.set_cache(q, 7, 41_u32);
        *e.cache_mut::<u32>(q, 7).expect("stored") += 1;
        assert_eq!(e.take_cache::<u32>(q, 7), Some(42));
        assert_eq!(e.take_cache::<u32>(q, 7), None);

        e.set_cache(q, 7, 1_u32);
        e.destroy(q);
        let reused = e.create_quad(10, 10, Color::WHITE);
        assert_eq!(reused.index(), q.index(), "slot is recycled");
        assert_eq!(e.cache_mut::<u32>(reused, 7), None);
    }

    #[cfg(feature = "trace")]
    #[test]
    fn traced_step_reports_phases_and_summary() {
        use crate::trace::{FrameSummary, TraceSink};

        #[derive(Default)]
        struct Sink {
            phases: Vec<PhaseKind>,
            summaries: Vec<FrameSummary>,
            scheduler: Vec<bool>,
            surfaces: Vec<SurfaceOutcome>,
        }
        impl TraceSink for Sink {
            fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
                self.phases.push(e.phase);
            }
            fn on_frame_summary(&mut self, s: &FrameSummary) {
                self.summaries.push(*s);
            }
            fn on_scheduler(&mut self, e: &SchedulerEvent) {
                self.scheduler.push(e.enabled);
            }
            fn on_surface(&mut self, e: &SurfaceEvent) {
                self.surfaces.push(e.outcome);
            }
        }

        let mut e = engine();
        surface_node(&mut e, 7);
        let mut sink = Sink::default();
        e.step_traced(HostTime::from_millis(16), &mut Tracer::new(&mut sink));
        assert_eq!(sink.phases, PhaseKind::ALL);
        assert_eq!(sink.summaries.len(), 1);
        assert_eq!(sink.summaries[0].counts.drawn, 1);
        assert_eq!(sink.summaries[0].counts.refreshed, 1);
        assert_eq!(sink.scheduler, [false]);
        assert_eq!(sink.surfaces, [SurfaceOutcome::Refreshed(ImageHandle(1))]);
    }
}
