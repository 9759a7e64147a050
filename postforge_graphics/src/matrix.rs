//! 3×2 affine transformation matrices.
//!
//! PostScript matrices are six-element arrays `[a b c d tx ty]` mapping
//! user space to device space:
//!
//! ```text
//! x' = a·x + c·y + tx
//! y' = b·x + d·y + ty
//! ```

use postforge_core::{ErrorKind, PsResult};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    #[inline]
    pub fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub fn from_slice(m: &[f64; 6]) -> Self {
        Self::new(m[0], m[1], m[2], m[3], m[4], m[5])
    }

    pub fn to_array(self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.tx, self.ty]
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Rotation by `degrees` counterclockwise.
    pub fn rotation(degrees: f64) -> Self {
        let r = degrees.to_radians();
        let (sin, cos) = r.sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// `self ∘ other`: apply `self` first, then `other`.
    pub fn concat(self, other: Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            tx: self.tx * other.a + self.ty * other.c + other.tx,
            ty: self.tx * other.b + self.ty * other.d + other.ty,
        }
    }

    /// Inverse, raising `undefinedresult` for singular matrices.
    pub fn invert(self) -> PsResult<Matrix> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-12 {
            return Err(ErrorKind::UndefinedResult.into());
        }
        let inv = 1.0 / det;
        Ok(Matrix {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            tx: (self.c * self.ty - self.d * self.tx) * inv,
            ty: (self.b * self.tx - self.a * self.ty) * inv,
        })
    }

    /// Transform a point.
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// Transform a distance vector (translation ignored).
    #[inline]
    pub fn apply_distance(&self, dx: f64, dy: f64) -> (f64, f64) {
        (self.a * dx + self.c * dy, self.b * dx + self.d * dy)
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identity_is_noop() {
        let (x, y) = Matrix::IDENTITY.apply(3.5, -2.0);
        assert!(close(x, 3.5) && close(y, -2.0));
    }

    #[test]
    fn concat_applies_left_first() {
        let m = Matrix::scaling(2.0, 2.0).concat(Matrix::translation(10.0, 0.0));
        let (x, y) = m.apply(1.0, 1.0);
        assert!(close(x, 12.0) && close(y, 2.0));
    }

    #[test]
    fn inverse_round_trips() {
        let m = Matrix::rotation(30.0)
            .concat(Matrix::scaling(2.0, 3.0))
            .concat(Matrix::translation(5.0, 7.0));
        let inv = m.invert().unwrap();
        let (x, y) = m.apply(4.0, -1.0);
        let (rx, ry) = inv.apply(x, y);
        assert!(close(rx, 4.0) && close(ry, -1.0));
    }

    #[test]
    fn singular_matrix_is_undefinedresult() {
        let m = Matrix::new(0.0, 0.0, 0.0, 0.0, 1.0, 1.0);
        assert!(m.invert().is_err());
    }

    #[test]
    fn distance_transform_ignores_translation() {
        let m = Matrix::translation(100.0, 100.0);
        let (dx, dy) = m.apply_distance(3.0, 4.0);
        assert!(close(dx, 3.0) && close(dy, 4.0));
    }
}
