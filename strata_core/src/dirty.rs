// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants.
//!
//! The node store records *what kind* of change happened to each node using
//! [`understory_dirty`] channels. The engine's own `dirty` flag only answers
//! "must the next step draw?"; the channels answer "what must a backend
//! re-upload?" and are drained into
//! [`FrameChanges`](crate::frame::FrameChanges) on every drawn frame.
//!
//! # Propagation
//!
//! - [`GEOMETRY`] and [`OPACITY`] are marked with
//!   [`EagerPolicy`](understory_dirty::EagerPolicy) and carry child-to-parent
//!   dependency edges. Moving or fading a container therefore reports every
//!   descendant, since their world bounds and effective opacities changed.
//!   Show/hide goes through [`OPACITY`] because it changes the same
//!   inherited visibility computation.
//! - [`CONTENT`] is local: fill colours, borders, surface bindings, damage
//!   and the dimmed gradient belong to one node.
//! - [`TOPOLOGY`] is local and marks the parent whose child list changed
//!   (add, remove, raise, lower) or the node that was created or destroyed.

use understory_dirty::Channel;

/// Position, size, scale or tilt changed.
pub const GEOMETRY: Channel = Channel::new(0);

/// Opacity or shown state changed.
pub const OPACITY: Channel = Channel::new(1);

/// Per-node drawable content changed.
pub const CONTENT: Channel = Channel::new(2);

/// A child list changed.
pub const TOPOLOGY: Channel = Channel::new(3);
