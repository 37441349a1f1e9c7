// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node tree, property animation, depth ordering and redraw scheduling for a
//! window compositor.
//!
//! `strata_core` keeps the scene a compositor draws: a tree of nodes rooted
//! at a stage, whose numeric properties animate over time with a single
//! raised-cosine ease. It is `no_std` compatible (with `alloc`) and stores
//! nodes in struct-of-arrays form behind generational handles.
//!
//! # Architecture
//!
//! Work happens only when something changed:
//!
//! ```text
//!   mutator (move, fade, add_child, ...)
//!       │
//!       ▼
//!   mark dirty ──► RedrawScheduler::enable ──► FrameTimer::schedule_once
//!                                                     │
//!                 ┌───────────────────────────────────┘
//!                 ▼
//!   Engine::step(now) ──► NodeStore::update ──► DepthPass ──► RenderBackend::draw
//!                                                                  │
//!                 ┌────────────────────────────────────────────────┘
//!                 ▼
//!   animations left? re-arm : disable
//! ```
//!
//! **[`node`]**: struct-of-arrays node tree with generational handles.
//! Containers order their children; later children paint over earlier ones.
//!
//! **[`animation`]**: per-field animators and the easing law.
//!
//! **[`depth`]**: assigns depth in paint order, computes inherited opacity
//! and visibility, and builds the back-to-front draw order.
//!
//! **[`surface`]**: the texture-surface state machine (unbound, stale,
//! bound) and its image lifetime.
//!
//! **[`dirty`]**: multi-channel dirty tracking via `understory_dirty`,
//! drained into [`FrameChanges`](frame::FrameChanges) once per drawn frame.
//!
//! **[`scheduler`]**: the single redraw timer.
//!
//! **[`backend`]**: the [`RenderBackend`](backend::RenderBackend) and
//! [`FrameTimer`](backend::FrameTimer) traits hosts implement.
//!
//! **[`engine`]**: ties the above together.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! step instrumentation, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Misuse
//!
//! Passing a stale handle, restacking relative to a non-sibling, or
//! creating a cycle is a caller bug. Debug builds panic; release builds log
//! a `tracing` warning and leave the tree unchanged.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

/// Checks a caller contract. Panics in debug builds; otherwise logs a
/// warning. Evaluates to whether the contract held.
macro_rules! contract {
    ($cond:expr, $($arg:tt)+) => {{
        let held: bool = $cond;
        if !held {
            debug_assert!(held, $($arg)+);
            tracing::warn!($($arg)+);
        }
        held
    }};
}

pub mod animation;
pub mod backend;
pub mod depth;
pub mod dirty;
pub mod engine;
pub mod frame;
pub mod node;
pub mod scheduler;
pub mod surface;
pub mod time;
pub mod trace;

pub use engine::{Engine, EngineConfig};
