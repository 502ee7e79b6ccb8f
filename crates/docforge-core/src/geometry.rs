// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Axis-aligned rectangles in PDF user space (points, origin bottom-left).

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in PDF user space.
///
/// Always normalised so that `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Build a box from two opposite corners in any order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Build a box from an origin and a size.
    pub fn from_origin(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Smallest box containing every point.
    pub fn from_points(points: &[(f32, f32)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::new(first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            bbox.x0 = bbox.x0.min(x);
            bbox.y0 = bbox.y0.min(y);
            bbox.x1 = bbox.x1.max(x);
            bbox.y1 = bbox.y1.max(y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// True when the box has no area.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// True when the interiors of the two boxes overlap.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    /// True when the boxes overlap or touch along an edge.
    pub fn touches(&self, other: &BoundingBox) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1 && self.y0 <= other.y1 && other.y0 <= self.y1
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x0 >= self.x0 && other.x1 <= self.x1 && other.y0 >= self.y0 && other.y1 <= self.y1
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Overlapping area of both boxes, if any.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let bbox = BoundingBox {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        (!bbox.is_empty()).then_some(bbox)
    }

    /// Grow the box by `amount` on every side.
    pub fn expand(&self, amount: f32) -> BoundingBox {
        BoundingBox::new(
            self.x0 - amount,
            self.y0 - amount,
            self.x1 + amount,
            self.y1 + amount,
        )
    }
}

/// Merge overlapping boxes by repeated axis-aligned union until no two
/// remaining boxes overlap. Input order is preserved for the survivors.
pub fn merge_overlapping(boxes: &[BoundingBox]) -> Vec<BoundingBox> {
    let mut merged: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for bbox in boxes {
        let mut current = *bbox;
        loop {
            let Some(pos) = merged.iter().position(|m| m.touches(&current)) else {
                break;
            };
            current = current.union(&merged.remove(pos));
        }
        merged.push(current);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_normalises_corners() {
        let bbox = BoundingBox::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(bbox, BoundingBox::new(0.0, 5.0, 10.0, 20.0));
        assert_eq!(bbox.width(), 10.0);
        assert_eq!(bbox.height(), 15.0);
    }

    #[test]
    fn disjoint_boxes_do_not_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn merge_chains_transitive_overlaps() {
        let boxes = [
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(20.0, 0.0, 30.0, 10.0),
            BoundingBox::new(8.0, 0.0, 22.0, 10.0),
            BoundingBox::new(100.0, 100.0, 110.0, 110.0),
        ];
        let merged = merge_overlapping(&boxes);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&BoundingBox::new(0.0, 0.0, 30.0, 10.0)));
    }

    fn arb_box() -> impl Strategy<Value = BoundingBox> {
        (0f32..500.0, 0f32..500.0, 1f32..100.0, 1f32..100.0)
            .prop_map(|(x, y, w, h)| BoundingBox::from_origin(x, y, w, h))
    }

    proptest! {
        #[test]
        fn merged_boxes_never_overlap(boxes in prop::collection::vec(arb_box(), 0..20)) {
            let merged = merge_overlapping(&boxes);
            for (i, a) in merged.iter().enumerate() {
                for b in merged.iter().skip(i + 1) {
                    prop_assert!(!a.touches(b));
                }
            }
        }

        #[test]
        fn merged_boxes_cover_every_input(boxes in prop::collection::vec(arb_box(), 0..20)) {
            let merged = merge_overlapping(&boxes);
            for bbox in &boxes {
                prop_assert!(merged.iter().any(|m| m.contains(bbox)));
            }
        }
    }
}
