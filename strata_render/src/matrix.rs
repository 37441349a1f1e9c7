// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Column-major 4×4 model-view matrices for GPU upload.
//!
//! The node tree works in 2-D with [`kurbo::Affine`]. Backends drawing with
//! a depth buffer want a 4×4 matrix with the node's depth in the z
//! translation, which is all this type adds.

use core::ops::Mul;

use kurbo::Affine;

/// A column-major 4×4 matrix stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix, matching the memory layout
/// GPU APIs expect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelView {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl ModelView {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Embeds a 2-D affine transform, placing the result at depth `z`.
    #[must_use]
    pub fn from_affine(affine: Affine, z: f64) -> Self {
        let [a, b, c, d, e, f] = affine.as_coeffs();
        Self {
            cols: [
                [a, b, 0.0, 0.0],
                [c, d, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [e, f, z, 1.0],
            ],
        }
    }

    /// Creates a pure translation.
    #[inline]
    #[must_use]
    pub const fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// Creates a non-uniform scale.
    #[inline]
    #[must_use]
    pub const fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            cols: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Returns column `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// The z translation, which carries the node's depth.
    #[inline]
    #[must_use]
    pub const fn depth(self) -> f64 {
        self.cols[3][2]
    }

    /// Whether every element is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }

    /// Narrows to `f32`, flattened column by column.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "GPU uniforms are single precision"
    )]
    pub fn to_cols_f32(self) -> [f32; 16] {
        let mut out = [0.0_f32; 16];
        for (o, v) in out.iter_mut().zip(self.cols.iter().flatten()) {
            *o = *v as f32;
        }
        out
    }
}

impl Default for ModelView {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for ModelView {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        for (col, bj) in out.iter_mut().zip(b) {
            for (i, v) in col.iter_mut().enumerate() {
                *v = a[0][i] * bj[0] + a[1][i] * bj[1] + a[2][i] * bj[2] + a[3][i] * bj[3];
            }
        }
        Self { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_multiply() {
        let t = ModelView::from_translation(1.0, 2.0, 3.0);
        assert_eq!(ModelView::IDENTITY * t, t);
        assert_eq!(t * ModelView::IDENTITY, t);
        assert_eq!(ModelView::default(), ModelView::IDENTITY);
    }

    #[test]
    fn affine_embedding_matches_composition() {
        let affine = Affine::translate((3.0, 4.0)) * Affine::scale_non_uniform(2.0, 5.0);
        let m = ModelView::from_affine(affine, 10.0);
        let composed =
            ModelView::from_translation(3.0, 4.0, 10.0) * ModelView::from_scale(2.0, 5.0, 1.0);
        assert_eq!(m, composed);
        assert_eq!(m.depth(), 10.0);
    }

    #[test]
    fn f32_layout_is_column_major() {
        let m = ModelView::from_translation(7.0, 8.0, 9.0);
        let f = m.to_cols_f32();
        assert_eq!(&f[12..], &[7.0, 8.0, 9.0, 1.0]);
        assert_eq!(f[0], 1.0);
    }

    #[test]
    fn non_finite_detected() {
        let mut m = ModelView::IDENTITY;
        assert!(m.is_finite());
        m.cols[2][1] = f64::NAN;
        assert!(!m.is_finite());
    }
}
