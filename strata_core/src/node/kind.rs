// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed set of node kinds and their kind-specific data.

use core::fmt;

use super::id::OutputId;
use crate::surface::SurfaceBinding;

/// A straight-alpha RGBA colour with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Color {
    /// Red.
    pub r: f32,
    /// Green.
    pub g: f32,
    /// Blue.
    pub b: f32,
    /// Alpha.
    pub a: f32,
}

impl Color {
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);

    /// Creates a colour from all four components.
    #[inline]
    #[must_use]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates an opaque colour.
    #[inline]
    #[must_use]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Whether alpha is close enough to one to skip blending.
    #[inline]
    #[must_use]
    pub fn is_opaque(self) -> bool {
        self.a > 0.999
    }
}

/// Data carried by quads and texture surfaces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadData {
    /// Fill colour. For texture surfaces this tints the image.
    pub color: Color,
    /// Border colour.
    pub border_color: Color,
    /// Border width in pixels.
    pub border_width: u32,
}

impl Default for QuadData {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            border_color: Color::TRANSPARENT,
            border_width: 0,
        }
    }
}

/// Data carried by the stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StageData {
    /// Background colour.
    pub color: Color,
    /// Output the stage is presented on.
    pub output: OutputId,
    pub(crate) was_resized: bool,
    pub(crate) color_changed: bool,
}

impl StageData {
    /// Creates stage data for `output` with the given background colour.
    #[must_use]
    pub const fn new(output: OutputId, color: Color) -> Self {
        Self {
            color,
            output,
            was_resized: false,
            color_changed: false,
        }
    }

    /// Whether the stage was resized since the flag was last taken.
    #[inline]
    #[must_use]
    pub const fn was_resized(&self) -> bool {
        self.was_resized
    }

    /// Whether the background colour changed since the flag was last taken.
    #[inline]
    #[must_use]
    pub const fn color_changed(&self) -> bool {
        self.color_changed
    }
}

/// What a node is.
///
/// Containers and the stage group children; quads and texture surfaces draw.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// A group of child nodes with no content of its own.
    Container,
    /// The root container, bound to an output.
    Stage(StageData),
    /// A flat-coloured rectangle.
    Quad(QuadData),
    /// A quad whose image mirrors an external surface.
    TextureSurface(QuadData, SurfaceBinding),
}

impl NodeKind {
    /// Whether this kind can hold children.
    #[inline]
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Container | Self::Stage(_))
    }

    /// Whether this kind produces pixels.
    #[inline]
    #[must_use]
    pub const fn is_drawable(&self) -> bool {
        matches!(self, Self::Quad(_) | Self::TextureSurface(..))
    }

    /// The quad data of drawable kinds.
    #[inline]
    #[must_use]
    pub const fn quad(&self) -> Option<&QuadData> {
        match self {
            Self::Quad(q) | Self::TextureSurface(q, _) => Some(q),
            _ => None,
        }
    }

    /// The surface binding of texture surfaces.
    #[inline]
    #[must_use]
    pub const fn surface(&self) -> Option<&SurfaceBinding> {
        match self {
            Self::TextureSurface(_, s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn quad_mut(&mut self) -> Option<&mut QuadData> {
        match self {
            Self::Quad(q) | Self::TextureSurface(q, _) => Some(q),
            _ => None,
        }
    }

    pub(crate) fn surface_mut(&mut self) -> Option<&mut SurfaceBinding> {
        match self {
            Self::TextureSurface(_, s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in debug dumps.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Container => "Container",
            Self::Stage(_) => "Stage",
            Self::Quad(_) => "Quad",
            Self::TextureSurface(..) => "TextureSurface",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
