// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node tree data model.
//!
//! A *node* is one element of the compositor's scene. Every node has:
//!
//! - An identity ([`NodeId`]), a generational handle that goes stale when the
//!   node is destroyed.
//! - A [`NodeKind`]: [`Container`](NodeKind::Container) and
//!   [`Stage`](NodeKind::Stage) group children,
//!   [`Quad`](NodeKind::Quad) and [`TextureSurface`](NodeKind::TextureSurface)
//!   draw.
//! - Topology: parent, first/last child and sibling links. A node has at most
//!   one parent. Later children paint over earlier ones.
//! - **Local properties**: position, size, scale, opacity, tilt, shown flag,
//!   dimming gradient, visibility groups, name. Numeric properties change
//!   through [`NodeStore::animate`] and may be mid-animation when read.
//! - **Computed properties** written by the [depth pass](crate::depth): depth,
//!   opaque flag, effective opacity, effective visibility and stage-space
//!   bounds.
//! - A tag-keyed cache where backends keep per-node resources.
//!
//! Containers do not own their children: destroying a container only
//! detaches them.

mod animate;
mod dump;
mod id;
mod kind;
mod store;
mod traverse;

pub use animate::{AnimateOutcome, UpdateReport};
pub use id::{INVALID, ImageHandle, NodeId, OutputId, SurfaceId};
pub use kind::{Color, NodeKind, QuadData, StageData};
pub use store::NodeStore;
pub use traverse::Children;
