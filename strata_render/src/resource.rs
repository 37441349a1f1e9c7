// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Opaque resource keys for backend-managed resources.

use core::fmt;

use strata_core::node::ImageHandle;

/// An opaque handle to a backend-managed resource (texture, buffer, etc.).
///
/// Surface images become resource keys unchanged, so a backend can look up
/// the texture it returned from
/// [`refresh_surface_image`](strata_core::backend::RenderBackend::refresh_surface_image).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(pub u64);

impl From<ImageHandle> for ResourceKey {
    fn from(image: ImageHandle) -> Self {
        Self(image.0)
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({})", self.0)
    }
}
