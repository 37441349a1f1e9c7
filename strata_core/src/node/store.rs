// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays node storage with allocation, topology, and property management.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;
use core::any::Any;

use kurbo::{Affine, Rect};
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use super::id::{INVALID, NodeId};
use super::kind::{Color, NodeKind, QuadData, StageData};
use super::traverse::Children;
use crate::animation::FieldAnimations;
use crate::dirty;
use crate::surface::SurfaceBinding;

/// Struct-of-arrays storage for every node an engine has created.
///
/// Nodes are addressed by [`NodeId`] handles. Each node occupies a slot in
/// parallel arrays; destroyed slots are recycled through a free list and
/// their generation is bumped so old handles go stale.
///
/// The store doubles as the registry of live nodes: the update pass visits
/// every live slot whether or not it is attached to the stage.
///
/// Passing a stale handle to a mutator is a caller bug. It panics in debug
/// builds and is logged and ignored otherwise. Getters panic on stale
/// handles in all builds, since there is no value to return.
#[derive(Debug)]
pub struct NodeStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) last_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Identity --
    pub(crate) kind: Vec<NodeKind>,
    pub(crate) name: Vec<String>,

    // -- Local properties --
    pub(crate) x: Vec<i32>,
    pub(crate) y: Vec<i32>,
    pub(crate) width: Vec<u32>,
    pub(crate) height: Vec<u32>,
    pub(crate) scale_x: Vec<f64>,
    pub(crate) scale_y: Vec<f64>,
    pub(crate) opacity: Vec<f64>,
    pub(crate) tilt: Vec<f64>,
    pub(crate) shown: Vec<bool>,
    pub(crate) dimmed_begin: Vec<f64>,
    pub(crate) dimmed_end: Vec<f64>,
    pub(crate) groups: Vec<BTreeSet<u32>>,
    pub(crate) animations: Vec<FieldAnimations>,
    pub(crate) cache: Vec<BTreeMap<u32, Box<dyn Any>>>,

    // -- Computed by the depth pass --
    pub(crate) depth: Vec<f64>,
    pub(crate) is_opaque: Vec<bool>,
    pub(crate) effective_opacity: Vec<f64>,
    pub(crate) effective_visible: Vec<bool>,
    pub(crate) world_transform: Vec<Affine>,
    pub(crate) world_bounds: Vec<Rect>,
    pub(crate) culled: Vec<bool>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Animation accounting --
    pub(crate) num_animating: u32,
    pub(crate) update_stamp: Vec<u32>,
    pub(crate) stamp: u32,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,

    // -- Scratch --
    pub(crate) stack: Vec<u32>,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            last_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            kind: Vec::new(),
            name: Vec::new(),
            x: Vec::new(),
            y: Vec::new(),
            width: Vec::new(),
            height: Vec::new(),
            scale_x: Vec::new(),
            scale_y: Vec::new(),
            opacity: Vec::new(),
            tilt: Vec::new(),
            shown: Vec::new(),
            dimmed_begin: Vec::new(),
            dimmed_end: Vec::new(),
            groups: Vec::new(),
            animations: Vec::new(),
            cache: Vec::new(),
            depth: Vec::new(),
            is_opaque: Vec::new(),
            effective_opacity: Vec::new(),
            effective_visible: Vec::new(),
            world_transform: Vec::new(),
            world_bounds: Vec::new(),
            culled: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            num_animating: 0,
            update_stamp: Vec::new(),
            stamp: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
            stack: Vec::new(),
        }
    }

    // -- Allocation API --

    /// Creates an empty container.
    pub fn create_container(&mut self) -> NodeId {
        self.create_node(NodeKind::Container, 0, 0)
    }

    /// Creates a quad of the given size and fill colour.
    pub fn create_quad(&mut self, width: u32, height: u32, color: Color) -> NodeId {
        let data = QuadData {
            color,
            ..QuadData::default()
        };
        self.create_node(NodeKind::Quad(data), width, height)
    }

    /// Creates an unbound texture surface.
    ///
    /// It has no size until one is set or the bound surface reports its
    /// dimensions.
    pub fn create_texture_surface(&mut self) -> NodeId {
        self.create_node(
            NodeKind::TextureSurface(QuadData::default(), SurfaceBinding::new()),
            0,
            0,
        )
    }

    pub(crate) fn create_stage(&mut self, data: StageData, width: u32, height: u32) -> NodeId {
        self.create_node(NodeKind::Stage(data), width, height)
    }

    /// Creates a copy of `id`.
    ///
    /// The copy has the same kind, name, local properties, visibility groups
    /// and kind data, but no parent, children, animations or cache entries.
    /// A texture-surface copy shares the surface but starts stale, holding
    /// no image of its own. Containers are copied without their children.
    ///
    /// Returns `None` for the stage, which cannot be cloned, or for a stale
    /// handle.
    pub fn clone_node(&mut self, id: NodeId) -> Option<NodeId> {
        if !self.check(id) {
            return None;
        }
        let src = id.idx as usize;
        let kind = match &self.kind[src] {
            NodeKind::Stage(_) => {
                tracing::warn!(?id, "the stage cannot be cloned");
                return None;
            }
            NodeKind::Container => NodeKind::Container,
            NodeKind::Quad(q) => NodeKind::Quad(*q),
            NodeKind::TextureSurface(q, s) => NodeKind::TextureSurface(*q, s.detached_copy()),
        };
        let copy = self.create_node(kind, self.width[src], self.height[src]);
        let dst = copy.idx as usize;
        self.name[dst] = self.name[src].clone();
        self.x[dst] = self.x[src];
        self.y[dst] = self.y[src];
        self.scale_x[dst] = self.scale_x[src];
        self.scale_y[dst] = self.scale_y[src];
        self.opacity[dst] = self.opacity[src];
        self.tilt[dst] = self.tilt[src];
        self.shown[dst] = self.shown[src];
        self.dimmed_begin[dst] = self.dimmed_begin[src];
        self.dimmed_end[dst] = self.dimmed_end[src];
        self.groups[dst] = self.groups[src].clone();
        Some(copy)
    }

    /// Destroys a node, freeing its slot for reuse.
    ///
    /// The node is detached from its parent and its children are detached
    /// from it (they stay alive; their owners destroy them). In-flight
    /// animations are dropped and no longer count as animating.
    ///
    /// Texture surfaces must have discarded their image first;
    /// [`Engine::destroy`](crate::engine::Engine::destroy) does this.
    pub fn destroy(&mut self, id: NodeId) {
        if !self.check(id) {
            return;
        }
        let idx = id.idx;
        let i = idx as usize;
        if !contract!(
            !matches!(self.kind[i], NodeKind::Stage(_)),
            "the stage cannot be destroyed"
        ) {
            return;
        }
        debug_assert!(
            self.kind[i].surface().is_none_or(|s| s.image().is_none()),
            "surface image must be discarded before destroying {id:?}"
        );

        if self.parent[i] != INVALID {
            let p = self.parent[i];
            self.unlink_from_parent(idx);
            self.dirty.mark(p, dirty::TOPOLOGY);
        }
        while self.first_child[i] != INVALID {
            let c = self.first_child[i];
            self.unlink_from_parent(c);
            self.mark_subtree_inherited_dirty(c);
        }

        if !self.animations[i].is_empty() {
            self.animations[i].clear();
            self.num_animating -= 1;
        }
        self.cache[i].clear();
        self.groups[i].clear();
        self.name[i].clear();
        self.kind[i] = NodeKind::Container;

        self.dirty.remove_key(idx);

        self.generation[i] = self.generation[i].wrapping_add(1);
        self.alive[i] = false;
        self.free_list.push(idx);
        self.pending_removed.push(idx);
    }

    /// Returns whether the handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        id.idx < self.len
            && self.alive[id.idx as usize]
            && self.generation[id.idx as usize] == id.generation
    }

    /// Number of live nodes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.len as usize - self.free_list.len()
    }

    /// Number of nodes with at least one in-flight animation.
    #[inline]
    #[must_use]
    pub fn num_animating(&self) -> u32 {
        self.num_animating
    }

    // -- Topology API --

    /// Adds `child` on top of `parent`'s existing children.
    ///
    /// `parent` must be a container or the stage, `child` must not have a
    /// parent, and the edge must not create a cycle. Returns whether the
    /// child was added.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.check(parent) || !self.check(child) {
            return false;
        }
        let p = parent.idx;
        let c = child.idx;
        if !contract!(
            self.kind[p as usize].is_container(),
            "{parent:?} is a {} and cannot hold children",
            self.kind[p as usize]
        ) || !contract!(
            self.parent[c as usize] == INVALID,
            "{child:?} already has a parent"
        ) || !contract!(
            !matches!(self.kind[c as usize], NodeKind::Stage(_)),
            "the stage cannot be a child"
        ) || !contract!(
            !self.is_ancestor_or_self(c, p),
            "adding {child:?} under {parent:?} would create a cycle"
        ) {
            return false;
        }
        self.link_last(p, c);
        true
    }

    /// Removes `child` from `parent`.
    ///
    /// `child` must currently be a child of `parent`. Returns whether it
    /// was removed.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.check(parent) || !self.check(child) {
            return false;
        }
        if !contract!(
            self.parent[child.idx as usize] == parent.idx,
            "{child:?} is not a child of {parent:?}"
        ) {
            return false;
        }
        self.detach(child.idx);
        true
    }

    /// Detaches `child` from whatever parent it has. No-op for a detached
    /// node. Returns whether it had a parent.
    pub fn remove_from_parent(&mut self, child: NodeId) -> bool {
        if !self.check(child) || self.parent[child.idx as usize] == INVALID {
            return false;
        }
        self.detach(child.idx);
        true
    }

    /// Moves `child` on top of `new_parent`'s children, detaching it from
    /// its current parent first. Returns whether the child moved.
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) -> bool {
        if !self.check(child) || !self.check(new_parent) {
            return false;
        }
        let c = child.idx;
        let p = new_parent.idx;
        if !contract!(
            self.kind[p as usize].is_container(),
            "{new_parent:?} is a {} and cannot hold children",
            self.kind[p as usize]
        ) || !contract!(
            !matches!(self.kind[c as usize], NodeKind::Stage(_)),
            "the stage cannot be a child"
        ) || !contract!(
            !self.is_ancestor_or_self(c, p),
            "moving {child:?} under {new_parent:?} would create a cycle"
        ) {
            return false;
        }
        if self.parent[c as usize] != INVALID {
            self.detach(c);
        }
        self.link_last(p, c);
        true
    }

    /// Moves `node` directly above its sibling `above`.
    ///
    /// Returns whether the order changed. A detached node is left alone.
    pub fn raise(&mut self, node: NodeId, above: NodeId) -> bool {
        if !self.check_sibling_op(node, above) {
            return false;
        }
        let (n, s) = (node.idx, above.idx);
        let p = self.parent[n as usize];
        self.unlink_from_parent(n);
        self.link_after(p, n, s);
        self.dirty.mark(p, dirty::TOPOLOGY);
        true
    }

    /// Moves `node` directly below its sibling `below`.
    ///
    /// Returns whether the order changed. A detached node is left alone.
    pub fn lower(&mut self, node: NodeId, below: NodeId) -> bool {
        if !self.check_sibling_op(node, below) {
            return false;
        }
        let (n, s) = (node.idx, below.idx);
        let p = self.parent[n as usize];
        self.unlink_from_parent(n);
        self.link_before(p, n, s);
        self.dirty.mark(p, dirty::TOPOLOGY);
        true
    }

    /// Moves `node` above all of its siblings.
    pub fn raise_to_top(&mut self, node: NodeId) -> bool {
        if !self.check(node) {
            return false;
        }
        let n = node.idx;
        let p = self.parent[n as usize];
        if p == INVALID {
            tracing::debug!(?node, "raise_to_top on a detached node");
            return false;
        }
        self.unlink_from_parent(n);
        self.link_after(p, n, self.last_child[p as usize]);
        self.dirty.mark(p, dirty::TOPOLOGY);
        true
    }

    /// Moves `node` below all of its siblings.
    pub fn lower_to_bottom(&mut self, node: NodeId) -> bool {
        if !self.check(node) {
            return false;
        }
        let n = node.idx;
        let p = self.parent[n as usize];
        if p == INVALID {
            tracing::debug!(?node, "lower_to_bottom on a detached node");
            return false;
        }
        self.unlink_from_parent(n);
        self.link_before(p, n, self.first_child[p as usize]);
        self.dirty.mark(p, dirty::TOPOLOGY);
        true
    }

    /// Returns the parent of a node, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        let p = self.parent[id.idx as usize];
        (p != INVALID).then(|| self.id_at(p))
    }

    /// Returns an iterator over the direct children of a node, bottom first.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    // -- Property getters --

    /// The node's kind and kind data.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        self.validate(id);
        &self.kind[id.idx as usize]
    }

    /// The node's diagnostic name.
    #[must_use]
    pub fn name(&self, id: NodeId) -> &str {
        self.validate(id);
        &self.name[id.idx as usize]
    }

    /// Current position relative to the parent, possibly mid-animation.
    #[must_use]
    pub fn position(&self, id: NodeId) -> (i32, i32) {
        self.validate(id);
        (self.x[id.idx as usize], self.y[id.idx as usize])
    }

    /// Current size in pixels.
    #[must_use]
    pub fn size(&self, id: NodeId) -> (u32, u32) {
        self.validate(id);
        (self.width[id.idx as usize], self.height[id.idx as usize])
    }

    /// Current scale factors.
    #[must_use]
    pub fn scale(&self, id: NodeId) -> (f64, f64) {
        self.validate(id);
        (self.scale_x[id.idx as usize], self.scale_y[id.idx as usize])
    }

    /// Current local opacity.
    #[must_use]
    pub fn opacity(&self, id: NodeId) -> f64 {
        self.validate(id);
        self.opacity[id.idx as usize]
    }

    /// Current tilt.
    #[must_use]
    pub fn tilt(&self, id: NodeId) -> f64 {
        self.validate(id);
        self.tilt[id.idx as usize]
    }

    /// Whether the node has been shown (ignores ancestors and opacity).
    #[must_use]
    pub fn is_shown(&self, id: NodeId) -> bool {
        self.validate(id);
        self.shown[id.idx as usize]
    }

    /// Current dimming gradient opacities, leading edge first.
    #[must_use]
    pub fn dimmed_opacities(&self, id: NodeId) -> (f64, f64) {
        self.validate(id);
        (
            self.dimmed_begin[id.idx as usize],
            self.dimmed_end[id.idx as usize],
        )
    }

    /// Visibility groups the node belongs to.
    #[must_use]
    pub fn visibility_groups(&self, id: NodeId) -> &BTreeSet<u32> {
        self.validate(id);
        &self.groups[id.idx as usize]
    }

    /// The node's in-flight animations.
    #[must_use]
    pub fn animations(&self, id: NodeId) -> &FieldAnimations {
        self.validate(id);
        &self.animations[id.idx as usize]
    }

    /// Assigned depth. Larger values are nearer the viewer.
    ///
    /// Only meaningful after a drawn step.
    #[must_use]
    pub fn depth(&self, id: NodeId) -> f64 {
        self.validate(id);
        self.depth[id.idx as usize]
    }

    /// Whether the node fully covers what is behind it.
    ///
    /// Only meaningful after a drawn step.
    #[must_use]
    pub fn is_opaque(&self, id: NodeId) -> bool {
        self.validate(id);
        self.is_opaque[id.idx as usize]
    }

    /// Product of the node's and its ancestors' opacities.
    ///
    /// Only meaningful after a drawn step.
    #[must_use]
    pub fn effective_opacity(&self, id: NodeId) -> f64 {
        self.validate(id);
        self.effective_opacity[id.idx as usize]
    }

    /// Whether the node would be drawn: it and every ancestor are shown,
    /// its effective opacity is above the visibility threshold and it is in
    /// an active visibility group.
    ///
    /// Only meaningful after a drawn step.
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        self.validate(id);
        self.effective_visible[id.idx as usize]
    }

    /// Axis-aligned bounds in stage coordinates.
    ///
    /// Only meaningful after a drawn step.
    #[must_use]
    pub fn world_bounds(&self, id: NodeId) -> Rect {
        self.validate(id);
        self.world_bounds[id.idx as usize]
    }

    /// The surface binding of a texture surface.
    #[must_use]
    pub fn surface_binding(&self, id: NodeId) -> Option<&SurfaceBinding> {
        self.validate(id);
        self.kind[id.idx as usize].surface()
    }

    // -- Immediate mutators --

    /// Sets the diagnostic name.
    pub fn set_name(&mut self, id: NodeId, name: &str) {
        if !self.check(id) {
            return;
        }
        let n = &mut self.name[id.idx as usize];
        n.clear();
        n.push_str(name);
    }

    /// Sets the size of a quad or texture surface. Returns whether the size
    /// changed.
    ///
    /// Containers have no size of their own and ignore this; the stage is
    /// resized through the engine.
    pub fn set_size(&mut self, id: NodeId, width: u32, height: u32) -> bool {
        if !self.check(id) {
            return false;
        }
        let i = id.idx as usize;
        if !self.kind[i].is_drawable() {
            tracing::warn!(?id, kind = self.kind[i].type_name(), "ignoring set_size");
            return false;
        }
        self.write_size(id.idx, width, height)
    }

    pub(crate) fn write_size(&mut self, idx: u32, width: u32, height: u32) -> bool {
        let i = idx as usize;
        if self.width[i] == width && self.height[i] == height {
            return false;
        }
        self.width[i] = width;
        self.height[i] = height;
        self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy);
        true
    }

    /// Shows or hides a node and its subtree. Returns whether it changed.
    pub fn set_shown(&mut self, id: NodeId, shown: bool) -> bool {
        if !self.check(id) {
            return false;
        }
        let i = id.idx as usize;
        if self.shown[i] == shown {
            return false;
        }
        self.shown[i] = shown;
        self.dirty.mark_with(id.idx, dirty::OPACITY, &EagerPolicy);
        true
    }

    /// Sets the fill colour of a quad or texture surface.
    pub fn set_color(&mut self, id: NodeId, color: Color) -> bool {
        self.edit_quad(id, |q| q.color = color)
    }

    /// Sets the border of a quad or texture surface.
    pub fn set_border(&mut self, id: NodeId, color: Color, width: u32) -> bool {
        self.edit_quad(id, |q| {
            q.border_color = color;
            q.border_width = width;
        })
    }

    /// Adds the node to a visibility group. Returns whether it was added.
    pub fn add_to_visibility_group(&mut self, id: NodeId, group: u32) -> bool {
        if !self.check(id) {
            return false;
        }
        let added = self.groups[id.idx as usize].insert(group);
        if added {
            self.dirty.mark_with(id.idx, dirty::OPACITY, &EagerPolicy);
        }
        added
    }

    /// Removes the node from a visibility group. Returns whether it was a
    /// member.
    pub fn remove_from_visibility_group(&mut self, id: NodeId, group: u32) -> bool {
        if !self.check(id) {
            return false;
        }
        let removed = self.groups[id.idx as usize].remove(&group);
        if removed {
            self.dirty.mark_with(id.idx, dirty::OPACITY, &EagerPolicy);
        }
        removed
    }

    // -- Backend cache --

    /// Stores an opaque value under `tag`, replacing any previous one.
    ///
    /// Backends use this to keep per-node GPU resources without the node
    /// knowing their type. Entries are dropped when the node is destroyed.
    pub fn set_cache<T: Any>(&mut self, id: NodeId, tag: u32, value: T) {
        if !self.check(id) {
            return;
        }
        self.cache[id.idx as usize].insert(tag, Box::new(value));
    }

    /// Returns the value stored under `tag` if it has type `T`.
    #[must_use]
    pub fn cache<T: Any>(&self, id: NodeId, tag: u32) -> Option<&T> {
        self.validate(id);
        self.cache[id.idx as usize]
            .get(&tag)
            .and_then(|v| v.downcast_ref())
    }

    /// Mutable access to the value stored under `tag`.
    pub fn cache_mut<T: Any>(&mut self, id: NodeId, tag: u32) -> Option<&mut T> {
        self.validate(id);
        self.cache[id.idx as usize]
            .get_mut(&tag)
            .and_then(|v| v.downcast_mut())
    }

    /// Removes and returns the value stored under `tag`.
    ///
    /// An entry of a different type is left in place.
    pub fn take_cache<T: Any>(&mut self, id: NodeId, tag: u32) -> Option<T> {
        self.validate(id);
        let entries = &mut self.cache[id.idx as usize];
        if !entries.get(&tag).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        let value = entries.remove(&tag)?;
        value.downcast().ok().map(|b| *b)
    }

    // -- Raw-index accessors for backends --
    //
    // These take raw slot indices, as found in the draw order and
    // `FrameChanges`, and skip generation checks.

    /// Returns the handle currently occupying slot `idx`.
    #[must_use]
    pub fn id_at(&self, idx: u32) -> NodeId {
        self.check_slot(idx);
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns the kind at raw slot `idx`.
    #[must_use]
    pub fn kind_at(&self, idx: u32) -> &NodeKind {
        self.check_slot(idx);
        &self.kind[idx as usize]
    }

    /// Returns the name at raw slot `idx`.
    #[must_use]
    pub fn name_at(&self, idx: u32) -> &str {
        self.check_slot(idx);
        &self.name[idx as usize]
    }

    /// Returns the size at raw slot `idx`.
    #[must_use]
    pub fn size_at(&self, idx: u32) -> (u32, u32) {
        self.check_slot(idx);
        (self.width[idx as usize], self.height[idx as usize])
    }

    /// Returns the tilt at raw slot `idx`.
    #[must_use]
    pub fn tilt_at(&self, idx: u32) -> f64 {
        self.check_slot(idx);
        self.tilt[idx as usize]
    }

    /// Returns the dimming gradient opacities at raw slot `idx`.
    #[must_use]
    pub fn dimmed_opacities_at(&self, idx: u32) -> (f64, f64) {
        self.check_slot(idx);
        (self.dimmed_begin[idx as usize], self.dimmed_end[idx as usize])
    }

    /// Returns the assigned depth at raw slot `idx`.
    #[must_use]
    pub fn depth_at(&self, idx: u32) -> f64 {
        self.check_slot(idx);
        self.depth[idx as usize]
    }

    /// Returns the opaque flag at raw slot `idx`.
    #[must_use]
    pub fn is_opaque_at(&self, idx: u32) -> bool {
        self.check_slot(idx);
        self.is_opaque[idx as usize]
    }

    /// Returns the effective opacity at raw slot `idx`.
    #[must_use]
    pub fn effective_opacity_at(&self, idx: u32) -> f64 {
        self.check_slot(idx);
        self.effective_opacity[idx as usize]
    }

    /// Returns the stage-space transform at raw slot `idx`.
    #[must_use]
    pub fn world_transform_at(&self, idx: u32) -> Affine {
        self.check_slot(idx);
        self.world_transform[idx as usize]
    }

    /// Returns the stage-space bounds at raw slot `idx`.
    #[must_use]
    pub fn world_bounds_at(&self, idx: u32) -> Rect {
        self.check_slot(idx);
        self.world_bounds[idx as usize]
    }

    // -- Internal helpers --

    /// Reports a stale handle as a contract violation.
    pub(crate) fn check(&self, id: NodeId) -> bool {
        contract!(self.is_alive(id), "stale NodeId: {id:?}")
    }

    /// Panics if the handle is stale.
    fn validate(&self, id: NodeId) {
        assert!(
            self.is_alive(id),
            "stale NodeId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    fn check_slot(&self, idx: u32) {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
    }

    fn check_sibling_op(&self, node: NodeId, reference: NodeId) -> bool {
        if !self.check(node) || !self.check(reference) {
            return false;
        }
        let p = self.parent[node.idx as usize];
        if p == INVALID {
            tracing::debug!(?node, "restacking a detached node");
            return false;
        }
        contract!(
            node != reference && self.parent[reference.idx as usize] == p,
            "{reference:?} is not a sibling of {node:?}"
        )
    }

    fn create_node(&mut self, kind: NodeKind, width: u32, height: u32) -> NodeId {
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.last_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.kind[i] = kind;
            self.x[i] = 0;
            self.y[i] = 0;
            self.width[i] = width;
            self.height[i] = height;
            self.scale_x[i] = 1.0;
            self.scale_y[i] = 1.0;
            self.opacity[i] = 1.0;
            self.tilt[i] = 0.0;
            self.shown[i] = true;
            self.dimmed_begin[i] = 0.0;
            self.dimmed_end[i] = 0.0;
            self.animations[i] = FieldAnimations::EMPTY;
            self.depth[i] = 0.0;
            self.is_opaque[i] = false;
            self.effective_opacity[i] = 1.0;
            self.effective_visible[i] = false;
            self.world_transform[i] = Affine::IDENTITY;
            self.world_bounds[i] = Rect::ZERO;
            self.culled[i] = false;
            self.alive[i] = true;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.last_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.kind.push(kind);
            self.name.push(String::new());
            self.x.push(0);
            self.y.push(0);
            self.width.push(width);
            self.height.push(height);
            self.scale_x.push(1.0);
            self.scale_y.push(1.0);
            self.opacity.push(1.0);
            self.tilt.push(0.0);
            self.shown.push(true);
            self.dimmed_begin.push(0.0);
            self.dimmed_end.push(0.0);
            self.groups.push(BTreeSet::new());
            self.animations.push(FieldAnimations::EMPTY);
            self.cache.push(BTreeMap::new());
            self.depth.push(0.0);
            self.is_opaque.push(false);
            self.effective_opacity.push(1.0);
            self.effective_visible.push(false);
            self.world_transform.push(Affine::IDENTITY);
            self.world_bounds.push(Rect::ZERO);
            self.culled.push(false);
            self.generation.push(0);
            self.alive.push(true);
            self.update_stamp.push(0);
            idx
        };

        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);

        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    fn edit_quad(&mut self, id: NodeId, edit: impl FnOnce(&mut QuadData)) -> bool {
        if !self.check(id) {
            return false;
        }
        let Some(quad) = self.kind[id.idx as usize].quad_mut() else {
            tracing::warn!(?id, "only quads and texture surfaces have a fill");
            return false;
        };
        edit(quad);
        self.dirty.mark(id.idx, dirty::CONTENT);
        true
    }

    fn is_ancestor_or_self(&self, ancestor: u32, mut idx: u32) -> bool {
        while idx != INVALID {
            if idx == ancestor {
                return true;
            }
            idx = self.parent[idx as usize];
        }
        false
    }

    /// Detaches `c` from its parent and updates dirty state.
    fn detach(&mut self, c: u32) {
        let p = self.parent[c as usize];
        self.unlink_from_parent(c);
        self.dirty.remove_dependency(c, p, dirty::GEOMETRY);
        self.dirty.remove_dependency(c, p, dirty::OPACITY);
        self.mark_subtree_inherited_dirty(c);
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Appends `c` as the topmost child of `p` and updates dirty state.
    fn link_last(&mut self, p: u32, c: u32) {
        self.link_after(p, c, self.last_child[p as usize]);
        let _ = self.dirty.add_dependency(c, p, dirty::GEOMETRY);
        let _ = self.dirty.add_dependency(c, p, dirty::OPACITY);
        self.mark_subtree_inherited_dirty(c);
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Links detached `c` into `p`'s list right after `prev`, or first when
    /// `prev` is [`INVALID`].
    fn link_after(&mut self, p: u32, c: u32, prev: u32) {
        let next = if prev == INVALID {
            self.first_child[p as usize]
        } else {
            self.next_sibling[prev as usize]
        };
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = prev;
        self.next_sibling[c as usize] = next;
        if prev == INVALID {
            self.first_child[p as usize] = c;
        } else {
            self.next_sibling[prev as usize] = c;
        }
        if next == INVALID {
            self.last_child[p as usize] = c;
        } else {
            self.prev_sibling[next as usize] = c;
        }
    }

    /// Links detached `c` into `p`'s list right before `next`, or last when
    /// `next` is [`INVALID`].
    fn link_before(&mut self, p: u32, c: u32, next: u32) {
        let prev = if next == INVALID {
            self.last_child[p as usize]
        } else {
            self.prev_sibling[next as usize]
        };
        self.link_after(p, c, prev);
    }

    /// Removes `idx` from its parent's child list without touching dirty state.
    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev == INVALID {
            self.first_child[p as usize] = next;
        } else {
            self.next_sibling[prev as usize] = next;
        }
        if next == INVALID {
            self.last_child[p as usize] = prev;
        } else {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    /// Marks the subtree rooted at `idx` dirty for inherited channels.
    pub(crate) fn mark_subtree_inherited_dirty(&mut self, idx: u32) {
        self.dirty.mark_with(idx, dirty::GEOMETRY, &EagerPolicy);
        self.dirty.mark_with(idx, dirty::OPACITY, &EagerPolicy);
    }
}
