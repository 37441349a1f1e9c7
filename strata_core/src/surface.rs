// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binding between a texture-surface node and its external pixel source.
//!
//! A [`SurfaceBinding`] moves between three states:
//!
//! ```text
//!             set_surface / invalidate
//!   Unbound ─────────────────────────────► Stale
//!      ▲                                    │  ▲
//!      │ discard                    refresh │  │ invalidate / set_surface
//!      │                                    ▼  │
//!      └──────────────────────────────────  Bound
//! ```
//!
//! [`refresh`](SurfaceBinding::refresh) is the only way back to
//! [`SurfaceState::Bound`]. The engine calls it lazily, immediately before a
//! visible node is drawn. A failed refresh leaves the state untouched.
//!
//! A stale binding may still hold its previous image. The handle is offered
//! back to the backend on refresh so it can be updated in place.
//!
//! A binding may also carry an [`AlphaMask`] shaping the node. The mask is
//! independent of the image lifecycle above.

use alloc::sync::Arc;

use kurbo::Rect;

use crate::backend::{RenderBackend, SurfaceError, SurfaceImage};
use crate::node::{ImageHandle, SurfaceId};

/// Where a [`SurfaceBinding`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceState {
    /// No image is held.
    Unbound,
    /// The held image (if any) no longer matches the surface.
    Stale,
    /// The held image matches the surface.
    Bound,
}

/// An 8-bit coverage mask applied on top of a surface's image.
///
/// One byte per pixel, rows packed without padding. Cloning shares the bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    bytes: Arc<[u8]>,
}

impl AlphaMask {
    /// Wraps `bytes` as a `width` by `height` mask.
    ///
    /// Returns `None` if the length does not match the dimensions or either
    /// dimension is zero.
    #[must_use]
    pub fn new(bytes: &[u8], width: u32, height: u32) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?;
        (expected > 0 && bytes.len() == expected).then(|| Self {
            width,
            height,
            bytes: Arc::from(bytes),
        })
    }

    /// Width in pixels.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major coverage bytes.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A texture-surface node's link to a surface and its cached image.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceBinding {
    surface: Option<SurfaceId>,
    state: SurfaceState,
    image: Option<SurfaceImage>,
    damage: Option<Rect>,
    alpha_mask: Option<AlphaMask>,
}

impl Default for SurfaceBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceBinding {
    /// Creates an unbound binding with no surface.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            surface: None,
            state: SurfaceState::Unbound,
            image: None,
            damage: None,
            alpha_mask: None,
        }
    }

    /// The bound surface, if any.
    #[inline]
    #[must_use]
    pub const fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    /// The current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SurfaceState {
        self.state
    }

    /// Whether the cached image matches the surface.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state == SurfaceState::Bound
    }

    /// Whether a refresh is needed before drawing.
    #[inline]
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.surface.is_some() && self.state != SurfaceState::Bound
    }

    /// The cached image handle, if any.
    #[inline]
    #[must_use]
    pub fn image(&self) -> Option<ImageHandle> {
        self.image.map(|i| i.handle)
    }

    /// Whether the cached image has an alpha channel.
    ///
    /// `true` when there is no image.
    #[inline]
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.image.is_none_or(|i| i.has_alpha)
    }

    /// The shape mask, if any. A masked node is never opaque.
    #[inline]
    #[must_use]
    pub const fn alpha_mask(&self) -> Option<&AlphaMask> {
        self.alpha_mask.as_ref()
    }

    /// Replaces the shape mask. Returns whether it changed.
    pub fn set_alpha_mask(&mut self, mask: AlphaMask) -> bool {
        if self.alpha_mask.as_ref() == Some(&mask) {
            return false;
        }
        self.alpha_mask = Some(mask);
        true
    }

    /// Removes the shape mask. Returns whether one was set.
    pub fn clear_alpha_mask(&mut self) -> bool {
        self.alpha_mask.take().is_some()
    }

    /// Damage accumulated since the last drawn frame, in surface coordinates.
    #[inline]
    #[must_use]
    pub const fn damage(&self) -> Option<Rect> {
        self.damage
    }

    /// Records `surface` and marks the binding stale.
    pub fn set_surface(&mut self, surface: SurfaceId) {
        self.surface = Some(surface);
        self.state = SurfaceState::Stale;
    }

    /// Marks the binding stale regardless of its current state.
    pub fn invalidate(&mut self) {
        self.state = SurfaceState::Stale;
    }

    /// Merges `rect` into the accumulated damage.
    pub fn add_damage(&mut self, rect: Rect) {
        self.damage = Some(match self.damage {
            Some(d) => d.union(rect),
            None => rect,
        });
    }

    /// Takes and resets the accumulated damage.
    pub fn take_damage(&mut self) -> Option<Rect> {
        self.damage.take()
    }

    /// Asks `backend` for a fresh image of the surface.
    ///
    /// On success the binding becomes [`SurfaceState::Bound`]. If the backend
    /// returned a different handle than the one held, the old one is released.
    /// On failure nothing changes.
    pub fn refresh<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<ImageHandle, SurfaceError> {
        let surface = self.surface.ok_or(SurfaceError::Unbound)?;
        let current = self.image();
        let image = backend.refresh_surface_image(surface, current)?;
        if let Some(old) = current
            && old != image.handle
        {
            backend.release_surface_image(old);
        }
        self.image = Some(image);
        self.state = SurfaceState::Bound;
        Ok(image.handle)
    }

    /// Releases the cached image and returns to [`SurfaceState::Unbound`].
    ///
    /// The surface id is kept, so a later refresh can rebind.
    pub fn discard<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(image) = self.image.take() {
            backend.release_surface_image(image.handle);
        }
        self.state = SurfaceState::Unbound;
    }

    /// Discards the image and forgets the surface.
    pub fn unbind<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.discard(backend);
        self.surface = None;
        self.damage = None;
    }

    /// Returns a copy that shares the surface and mask but holds no image.
    #[must_use]
    pub fn detached_copy(&self) -> Self {
        Self {
            surface: self.surface,
            state: if self.surface.is_some() {
                SurfaceState::Stale
            } else {
                SurfaceState::Unbound
            },
            image: None,
            damage: None,
            alpha_mask: self.alpha_mask.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::frame::Frame;

    /// Backend double that hands out sequential handles.
    #[derive(Debug, Default)]
    struct ImageBackend {
        next: u64,
        reuse: bool,
        fail: bool,
        refreshed: Vec<(SurfaceId, Option<ImageHandle>)>,
        released: Vec<ImageHandle>,
    }

    impl RenderBackend for ImageBackend {
        fn refresh_surface_image(
            &mut self,
            surface: SurfaceId,
            current: Option<ImageHandle>,
        ) -> Result<SurfaceImage, SurfaceError> {
            self.refreshed.push((surface, current));
            if self.fail {
                return Err(SurfaceError::Gone(surface));
            }
            let handle = match current {
                Some(h) if self.reuse => h,
                _ => {
                    self.next += 1;
                    ImageHandle(self.next)
                }
            };
            Ok(SurfaceImage {
                handle,
                has_alpha: false,
            })
        }

        fn release_surface_image(&mut self, image: ImageHandle) {
            self.released.push(image);
        }

        fn draw(&mut self, frame: &Frame<'_>) {
            _ = frame;
        }
    }

    #[test]
    fn starts_unbound() {
        let b = SurfaceBinding::new();
        assert_eq!(b.state(), SurfaceState::Unbound);
        assert!(!b.is_valid());
        assert!(!b.needs_refresh(), "nothing to refresh without a surface");
        assert!(b.has_alpha());
    }

    #[test]
    fn set_surface_then_refresh_binds() {
        let mut backend = ImageBackend::default();
        let mut b = SurfaceBinding::new();
        b.set_surface(SurfaceId(7));
        assert_eq!(b.state(), SurfaceState::Stale);
        assert!(b.needs_refresh());

        let handle = b.refresh(&mut backend).unwrap();
        assert_eq!(b.state(), SurfaceState::Bound);
        assert_eq!(b.image(), Some(handle));
        assert!(!b.has_alpha());
        assert_eq!(backend.refreshed, [(SurfaceId(7), None)]);
    }

    #[test]
    fn invalidate_forces_stale_and_keeps_image() {
        let mut backend = ImageBackend {
            reuse: true,
            ..Default::default()
        };
        let mut b = SurfaceBinding::new();
        b.set_surface(SurfaceId(7));
        let first = b.refresh(&mut backend).unwrap();

        b.invalidate();
        assert!(!b.is_valid());
        assert_eq!(b.image(), Some(first));

        let second = b.refresh(&mut backend).unwrap();
        assert_eq!(first, second, "backend updated the image in place");
        assert!(backend.released.is_empty());
        assert_eq!(backend.refreshed[1], (SurfaceId(7), Some(first)));
    }

    #[test]
    fn refresh_with_new_handle_releases_old() {
        let mut backend = ImageBackend::default();
        let mut b = SurfaceBinding::new();
        b.set_surface(SurfaceId(1));
        let first = b.refresh(&mut backend).unwrap();
        b.invalidate();
        let second = b.refresh(&mut backend).unwrap();
        assert_ne!(first, second);
        assert_eq!(backend.released, [first]);
    }

    #[test]
    fn failed_refresh_leaves_state() {
        let mut backend = ImageBackend {
            fail: true,
            ..Default::default()
        };
        let mut b = SurfaceBinding::new();
        b.set_surface(SurfaceId(3));
        assert_eq!(
            b.refresh(&mut backend),
            Err(SurfaceError::Gone(SurfaceId(3)))
        );
        assert_eq!(b.state(), SurfaceState::Stale);
        assert_eq!(b.image(), None);
    }

    #[test]
    fn refresh_without_surface_fails() {
        let mut backend = ImageBackend::default();
        let mut b = SurfaceBinding::new();
        b.invalidate();
        assert_eq!(b.refresh(&mut backend), Err(SurfaceError::Unbound));
        assert!(backend.refreshed.is_empty());
    }

    #[test]
    fn discard_releases_once() {
        let mut backend = ImageBackend::default();
        let mut b = SurfaceBinding::new();
        b.set_surface(SurfaceId(2));
        let handle = b.refresh(&mut backend).unwrap();
        b.discard(&mut backend);
        b.discard(&mut backend);
        assert_eq!(backend.released, [handle]);
        assert_eq!(b.state(), SurfaceState::Unbound);
        assert_eq!(b.surface(), Some(SurfaceId(2)));
        assert!(b.needs_refresh(), "surface is still known");
    }

    #[test]
    fn unbind_forgets_surface() {
        let mut backend = ImageBackend::default();
        let mut b = SurfaceBinding::new();
        b.set_surface(SurfaceId(2));
        b.add_damage(Rect::new(0.0, 0.0, 4.0, 4.0));
        b.unbind(&mut backend);
        assert_eq!(b.surface(), None);
        assert_eq!(b.damage(), None);
        assert!(!b.needs_refresh());
    }

    #[test]
    fn alpha_mask_must_match_its_dimensions() {
        assert!(AlphaMask::new(&[0; 6], 3, 2).is_some());
        assert!(AlphaMask::new(&[0; 5], 3, 2).is_none());
        assert!(AlphaMask::new(&[], 0, 0).is_none());
    }

    #[test]
    fn alpha_mask_set_and_clear_report_changes() {
        let mask = AlphaMask::new(&[255, 0, 0, 255], 2, 2).unwrap();
        let mut b = SurfaceBinding::new();
        assert!(b.set_alpha_mask(mask.clone()));
        assert!(!b.set_alpha_mask(mask.clone()), "same mask");
        assert_eq!(b.alpha_mask().map(AlphaMask::bytes), Some(&[255, 0, 0, 255][..]));
        assert_eq!(b.detached_copy().alpha_mask(), Some(&mask));
        assert!(b.clear_alpha_mask());
        assert!(!b.clear_alpha_mask());
        assert_eq!(b.alpha_mask(), None);
    }

    #[test]
    fn damage_accumulates_as_union() {
        let mut b = SurfaceBinding::new();
        b.add_damage(Rect::new(0.0, 0.0, 10.0, 10.0));
        b.add_damage(Rect::new(20.0, 5.0, 30.0, 15.0));
        assert_eq!(b.damage(), Some(Rect::new(0.0, 0.0, 30.0, 15.0)));
        assert_eq!(b.take_damage(), Some(Rect::new(0.0, 0.0, 30.0, 15.0)));
        assert_eq!(b.damage(), None);
    }

    #[test]
    fn detached_copy_has_no_image() {
        let mut backend = ImageBackend::default();
        let mut b = SurfaceBinding::new();
        b.set_surface(SurfaceId(5));
        b.refresh(&mut backend).unwrap();
        let copy = b.detached_copy();
        assert_eq!(copy.surface(), Some(SurfaceId(5)));
        assert_eq!(copy.state(), SurfaceState::Stale);
        assert_eq!(copy.image(), None);
        assert_eq!(SurfaceBinding::new().detached_copy().state(), SurfaceState::Unbound);
    }
}
