// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render plans and damage tracking for strata frames.
//!
//! This crate sits between [`strata_core`]'s [`Frame`](strata_core::frame::Frame)
//! and a GPU backend. A backend's `draw` builds a [`RenderPlan`] from the
//! frame and replays it:
//!
//! - [`RenderItem`]: one textured or solid rectangle with its model-view
//!   matrix, depth and effective opacity.
//! - [`RenderPlan`]: the items of one frame in back-to-front order, plus the
//!   clear colour and the [`DamageRegion`] to repaint.
//! - [`ModelView`]: a column-major 4x4 matrix carrying a node's 2D world
//!   transform and its depth.
//! - [`ResourceKey`]: opaque key for a backend image.

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

mod damage;
mod matrix;
mod plan;
mod resource;

pub use damage::DamageRegion;
pub use matrix::ModelView;
pub use plan::{BlendMode, Border, ItemContent, RenderItem, RenderPlan, stage_rect};
pub use resource::ResourceKey;
