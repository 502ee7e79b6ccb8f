// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grouping of interpreted glyphs into text lines.

use std::ops::Range;

use docforge_core::BoundingBox;

use super::content::Glyph;

/// A piece of a line's text and the glyph box it was drawn in. Synthetic
/// word gaps carry no box.
#[derive(Debug, Clone, PartialEq)]
pub struct LinePiece {
    /// Byte offset of the piece in [`TextLine::text`].
    pub offset: usize,
    pub bbox: Option<BoundingBox>,
}

/// A run of glyphs sharing a baseline, in content-stream order.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// Drawing position of the first glyph.
    pub seq: usize,
    pub text: String,
    pub bbox: BoundingBox,
    pub pieces: Vec<LinePiece>,
}

impl TextLine {
    fn start(glyph: &Glyph) -> Self {
        let mut line = TextLine {
            seq: glyph.seq,
            text: String::new(),
            bbox: glyph.bbox,
            pieces: Vec::new(),
        };
        line.push(glyph);
        line
    }

    fn push(&mut self, glyph: &Glyph) {
        self.pieces.push(LinePiece {
            offset: self.text.len(),
            bbox: Some(glyph.bbox),
        });
        self.text.push_str(&glyph.text);
        self.bbox = self.bbox.union(&glyph.bbox);
    }

    fn push_gap(&mut self) {
        self.pieces.push(LinePiece {
            offset: self.text.len(),
            bbox: None,
        });
        self.text.push(' ');
    }

    /// Box enclosing the glyphs that produced `range` of the line's text.
    pub fn bbox_of(&self, range: Range<usize>) -> Option<BoundingBox> {
        self.pieces
            .iter()
            .enumerate()
            .filter(|(i, piece)| {
                let end = self
                    .pieces
                    .get(i + 1)
                    .map(|next| next.offset)
                    .unwrap_or(self.text.len());
                piece.offset < range.end && end > range.start
            })
            .filter_map(|(_, piece)| piece.bbox)
            .reduce(|a, b| a.union(&b))
    }
}

/// Group glyphs into lines. A new line starts when the baseline moves by more
/// than half the font size or the pen jumps backwards; a space is inserted
/// where the gap between glyphs exceeds a fifth of the font size.
pub fn build_lines(glyphs: &[Glyph]) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = Vec::new();
    let mut last: Option<&Glyph> = None;

    for glyph in glyphs {
        if glyph.text.is_empty() {
            continue;
        }
        match (last, lines.last_mut()) {
            (Some(prev), Some(line)) => {
                let size = prev.size.max(glyph.size).max(1.0);
                let same_baseline = (glyph.origin.1 - prev.origin.1).abs() <= size * 0.5;
                let backwards = glyph.bbox.x0 < prev.bbox.x0 - size;
                if !same_baseline || backwards {
                    lines.push(TextLine::start(glyph));
                } else {
                    let gap = glyph.bbox.x0 - prev.bbox.x1;
                    if gap > size * 0.2 && !prev.is_blank() && !glyph.is_blank() {
                        line.push_gap();
                    }
                    line.push(glyph);
                }
            }
            _ => lines.push(TextLine::start(glyph)),
        }
        last = Some(glyph);
    }
    lines
}
