// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// 2D affine transforms in PDF `[a b c d e f]` form.

use docforge_core::BoundingBox;
use lopdf::Object;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix(pub [f32; 6]);

impl Matrix {
    pub const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// Parse six numeric operands or array items.
    pub fn from_objects(objects: &[Object]) -> Option<Self> {
        if objects.len() < 6 {
            return None;
        }
        let mut m = [0.0f32; 6];
        for (slot, obj) in m.iter_mut().zip(objects) {
            *slot = number(obj)?;
        }
        Some(Matrix(m))
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    pub fn invert(&self) -> Option<Matrix> {
        let [a, b, c, d, e, f] = self.0;
        let det = a * d - b * c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let ia = d / det;
        let ib = -b / det;
        let ic = -c / det;
        let id = a / det;
        Some(Matrix([ia, ib, ic, id, -(e * ia + f * ic), -(e * ib + f * id)]))
    }

    /// Bounding box of `rect` after transformation.
    pub fn transform_box(&self, rect: &BoundingBox) -> BoundingBox {
        let corners = [
            self.apply(rect.x0, rect.y0),
            self.apply(rect.x1, rect.y0),
            self.apply(rect.x0, rect.y1),
            self.apply(rect.x1, rect.y1),
        ];
        BoundingBox::from_points(&corners).unwrap_or(*rect)
    }

    /// Placement of the unit square, as used by image XObjects.
    pub fn unit_square(&self) -> BoundingBox {
        self.transform_box(&BoundingBox::new(0.0, 0.0, 1.0, 1.0))
    }
}

/// Numeric value of an integer or real operand.
pub fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenation_applies_left_first() {
        let scale = Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let shift = Matrix::translate(10.0, 5.0);
        assert_eq!(scale.then(&shift).apply(1.0, 1.0), (12.0, 7.0));
        assert_eq!(shift.then(&scale).apply(1.0, 1.0), (22.0, 12.0));
    }

    #[test]
    fn inverse_round_trips() {
        let m = Matrix([200.0, 0.0, 0.0, 150.0, 100.0, 300.0]);
        let inv = m.invert().unwrap();
        let (x, y) = m.apply(0.25, 0.5);
        let (u, v) = inv.apply(x, y);
        assert!((u - 0.25).abs() < 1e-4 && (v - 0.5).abs() < 1e-4);
    }

    #[test]
    fn image_placement_box() {
        let m = Matrix([200.0, 0.0, 0.0, 150.0, 100.0, 300.0]);
        assert_eq!(m.unit_square(), BoundingBox::new(100.0, 300.0, 300.0, 450.0));
    }
}
