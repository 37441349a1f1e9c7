// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contracts the engine consumes from its host.
//!
//! The engine never touches a GPU or a clock directly. The host process
//! supplies two collaborators:
//!
//! - A [`RenderBackend`] that turns a drawn [`Frame`] into pixels and owns
//!   the GPU images mirrored from external surfaces. Images are referenced by
//!   [`ImageHandle`]; the engine asks for them lazily, right before a surface
//!   node is drawn, and releases them when the node is resized, unbound or
//!   destroyed.
//!
//! - A [`FrameTimer`] providing monotonic time and a single one-shot callback
//!   slot. When the callback fires, the host calls
//!   [`Engine::step`](crate::engine::Engine::step).
//!
//! Both traits are object-safe, and tests drive the engine with in-memory
//! doubles that record every call.

use crate::frame::Frame;
use crate::node::{ImageHandle, SurfaceId};
use crate::time::{Duration, HostTime};

/// A GPU image produced from a surface's current contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceImage {
    /// Backend handle for the image.
    pub handle: ImageHandle,
    /// Whether the image carries an alpha channel. Images with alpha are
    /// never treated as opaque.
    pub has_alpha: bool,
}

/// Why a surface image could not be produced.
///
/// These are recovered locally: the node stays stale and is left out of the
/// draw order until a later refresh succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    /// The node has no surface bound.
    #[error("no surface is bound")]
    Unbound,
    /// The windowing system no longer knows the surface.
    #[error("surface {0:?} no longer exists")]
    Gone(SurfaceId),
    /// The backend could not import the surface's pixels.
    #[error("failed to import the contents of surface {0:?}")]
    ImportFailed(SurfaceId),
}

/// Produces pixels for the engine.
pub trait RenderBackend {
    /// Produces an image of the surface's current contents.
    ///
    /// `current` is the image the node already holds, if any. Backends may
    /// update it in place and return the same handle; if a different handle
    /// comes back, the engine releases `current`.
    fn refresh_surface_image(
        &mut self,
        surface: SurfaceId,
        current: Option<ImageHandle>,
    ) -> Result<SurfaceImage, SurfaceError>;

    /// Releases an image previously returned by
    /// [`refresh_surface_image`](Self::refresh_surface_image).
    ///
    /// Called exactly once per distinct handle.
    fn release_surface_image(&mut self, image: ImageHandle);

    /// Draws a frame.
    ///
    /// Only called on steps where something changed. The frame borrows the
    /// node store for reading properties via the `*_at()` accessors.
    fn draw(&mut self, frame: &Frame<'_>);
}

/// Monotonic time and a one-shot callback slot.
///
/// The engine keeps at most one callback pending. When it fires, the host
/// calls [`Engine::step`](crate::engine::Engine::step) with the current time.
pub trait FrameTimer {
    /// Current monotonic time.
    fn now(&self) -> HostTime;

    /// Arranges for a step to run once after `delay`.
    ///
    /// The engine cancels any pending callback before scheduling another.
    fn schedule_once(&mut self, delay: Duration);

    /// Cancels the pending callback, if any.
    fn cancel(&mut self);
}
