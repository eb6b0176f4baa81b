//! 2×3 affine matrices for window transforms.
//!
//! The compositor builds one matrix per transformed window blit:
//! translation to screen position, optional rotation about the window
//! center, optional scale for resize previews and animations. The blitter
//! inverts the matrix once and walks destination pixels, so a singular
//! matrix (zero scale) must never be constructed; scale factors are
//! clamped by the callers.

/// Row-major 2×3 affine transform. `apply` maps `(x, y)` to
/// `(m00*x + m01*y + m02, m10*x + m11*y + m12)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix(pub [[f64; 3]; 2]);

impl Matrix {
    pub fn identity() -> Self {
        Matrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
    }

    /// Post-compose a translation.
    pub fn translate(&mut self, x: f64, y: f64) {
        self.0[0][2] += self.0[0][0] * x + self.0[0][1] * y;
        self.0[1][2] += self.0[1][0] * x + self.0[1][1] * y;
    }

    /// Post-compose a rotation of `r` radians.
    pub fn rotate(&mut self, r: f64) {
        let s = r.sin();
        let c = r.cos();
        let m00 = self.0[0][0];
        let m01 = self.0[0][1];
        let m10 = self.0[1][0];
        let m11 = self.0[1][1];
        self.0[0][0] = m00 * c + m01 * s;
        self.0[0][1] = m01 * c - m00 * s;
        self.0[1][0] = m10 * c + m11 * s;
        self.0[1][1] = m11 * c - m10 * s;
    }

    /// Post-compose a non-uniform scale.
    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.0[0][0] *= sx;
        self.0[0][1] *= sy;
        self.0[1][0] *= sx;
        self.0[1][1] *= sy;
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.0[0][0] * x + self.0[0][1] * y + self.0[0][2],
            self.0[1][0] * x + self.0[1][1] * y + self.0[1][2],
        )
    }

    /// True when the linear part is the identity, i.e. the matrix is a pure
    /// translation. The blitter uses this to skip the per-pixel inverse
    /// mapping and take the straight alpha-blit path.
    pub fn is_translation(&self) -> bool {
        self.0[0][0] == 1.0 && self.0[0][1] == 0.0 && self.0[1][0] == 0.0 && self.0[1][1] == 1.0
    }

    /// Inverse transform, or `None` for a (near-)singular matrix.
    pub fn inverse(&self) -> Option<Matrix> {
        let det = self.0[0][0] * self.0[1][1] - self.0[0][1] * self.0[1][0];
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let m00 = self.0[1][1] * inv_det;
        let m01 = -self.0[0][1] * inv_det;
        let m10 = -self.0[1][0] * inv_det;
        let m11 = self.0[0][0] * inv_det;
        let tx = -(m00 * self.0[0][2] + m01 * self.0[1][2]);
        let ty = -(m10 * self.0[0][2] + m11 * self.0[1][2]);
        Some(Matrix([[m00, m01, tx], [m10, m11, ty]]))
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::identity()
    }
}
