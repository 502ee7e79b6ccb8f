// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fill drawn over redacted areas. The content underneath is already gone by
// the time these operators run.

use docforge_core::BoundingBox;
use docforge_core::settings::{Color, FillPattern, RedactionStyle};
use lopdf::content::Operation;
use lopdf::{Object, dictionary};

use crate::model::ResourceEntry;

/// Distance between hatch lines and dot centres, in points.
const HATCH_SPACING: f32 = 6.0;
const HATCH_WIDTH: f32 = 1.5;
const DOT_SIZE: f32 = 2.0;
const BORDER_WIDTH: f32 = 1.0;

/// Resource name of the transparency state used when opacity is below 1.
pub const OPACITY_STATE: &[u8] = b"DFgs0";

fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

fn nums(values: &[f32]) -> Vec<Object> {
    values.iter().map(|v| Object::Real(*v)).collect()
}

fn rect(bbox: &BoundingBox) -> Operation {
    op("re", nums(&[bbox.x0, bbox.y0, bbox.width(), bbox.height()]))
}

fn fill_color(color: &Color) -> Operation {
    op("rg", nums(&color.components()))
}

fn stroke_color(color: &Color) -> Operation {
    op("RG", nums(&color.components()))
}

/// Diagonal lines across `bbox`, rising to the right, or falling when
/// `falling` is set. Callers clip to the box.
fn hatch(bbox: &BoundingBox, falling: bool, out: &mut Vec<Operation>) {
    let h = bbox.height();
    let mut offset = -h;
    while offset <= bbox.width() {
        let x = bbox.x0 + offset;
        let (start, end) = if falling {
            ((x, bbox.y1), (x + h, bbox.y0))
        } else {
            ((x, bbox.y0), (x + h, bbox.y1))
        };
        out.push(op("m", nums(&[start.0, start.1])));
        out.push(op("l", nums(&[end.0, end.1])));
        offset += HATCH_SPACING;
    }
}

fn draw_region(bbox: &BoundingBox, style: &RedactionStyle, out: &mut Vec<Operation>) {
    match style.pattern {
        FillPattern::Solid => {
            out.push(rect(bbox));
            out.push(op("f", vec![]));
        }
        FillPattern::Striped | FillPattern::Crosshatch => {
            out.push(op("q", vec![]));
            out.push(rect(bbox));
            out.push(op("W", vec![]));
            out.push(op("n", vec![]));
            out.push(stroke_color(&style.fill_color));
            out.push(op("w", nums(&[HATCH_WIDTH])));
            hatch(bbox, false, out);
            if style.pattern == FillPattern::Crosshatch {
                hatch(bbox, true, out);
            }
            out.push(op("S", vec![]));
            out.push(op("Q", vec![]));
        }
        FillPattern::Dots => {
            let mut y = bbox.y0 + HATCH_SPACING / 2.0;
            while y < bbox.y1 {
                let mut x = bbox.x0 + HATCH_SPACING / 2.0;
                while x < bbox.x1 {
                    let dot = BoundingBox::from_origin(x - DOT_SIZE / 2.0, y - DOT_SIZE / 2.0, DOT_SIZE, DOT_SIZE);
                    if let Some(clipped) = dot.intersection(bbox) {
                        out.push(rect(&clipped));
                    }
                    x += HATCH_SPACING;
                }
                y += HATCH_SPACING;
            }
            out.push(op("f", vec![]));
        }
    }

    if let Some(border) = &style.border_color {
        out.push(stroke_color(border));
        out.push(op("w", nums(&[BORDER_WIDTH])));
        out.push(rect(bbox));
        out.push(op("S", vec![]));
    }
}

/// Operators painting `regions` in `style`, plus the resources they use.
pub fn fill_operations(regions: &[BoundingBox], style: &RedactionStyle) -> (Vec<Operation>, Vec<ResourceEntry>) {
    let mut ops = vec![op("q", vec![])];
    let mut resources = Vec::new();

    if style.opacity < 1.0 {
        let alpha = style.opacity.max(0.0);
        resources.push((
            b"ExtGState".as_slice(),
            OPACITY_STATE.to_vec(),
            Object::Dictionary(dictionary! {
                "Type" => "ExtGState",
                "ca" => Object::Real(alpha),
                "CA" => Object::Real(alpha),
            }),
        ));
        ops.push(op("gs", vec![Object::Name(OPACITY_STATE.to_vec())]));
    }

    ops.push(fill_color(&style.fill_color));
    for bbox in regions {
        draw_region(bbox, style, &mut ops);
    }
    ops.push(op("Q", vec![]));
    (ops, resources)
}
