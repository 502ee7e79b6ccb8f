// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-level operations: page number stamps and crop boxes.

use docforge_core::error::{ForgeError, Result};
use docforge_core::results::PageOpResult;
use docforge_core::settings::{CropSettings, PageNumberSettings, StampPosition, page_selected};
use docforge_core::{BoundingBox, CancelToken};
use lopdf::content::Operation;
use lopdf::Object;
use tracing::{info, instrument};

use crate::model::fonts::{encode_ascii, helvetica, helvetica_width};
use crate::model::{PdfDocument, ResourceEntry};

/// Font resource name of page number stamps.
pub const STAMP_FONT: &[u8] = b"DFnum";

/// Expand `{n}` and `{total}` in a page number format.
pub fn format_label(format: &str, n: u32, total: u32) -> String {
    format.replace("{n}", &n.to_string()).replace("{total}", &total.to_string())
}

/// Baseline origin of a label `width` points wide on a page showing `visible`.
fn stamp_origin(visible: &BoundingBox, width: f32, settings: &PageNumberSettings) -> (f32, f32) {
    let left = visible.x0 + settings.margin;
    let center = visible.x0 + (visible.width() - width) / 2.0;
    let right = visible.x1 - settings.margin - width;
    let top = visible.y1 - settings.margin - settings.font_size;
    let bottom = visible.y0 + settings.margin;
    match settings.position {
        StampPosition::TopLeft => (left, top),
        StampPosition::TopCenter => (center, top),
        StampPosition::TopRight => (right, top),
        StampPosition::BottomLeft => (left, bottom),
        StampPosition::BottomCenter => (center, bottom),
        StampPosition::BottomRight => (right, bottom),
    }
}

/// Stamp a page number on every selected page. Numbering counts selected
/// pages from `start_at`; `{total}` is the last number stamped.
#[instrument(skip_all, fields(format = %settings.format))]
pub fn number_pages(doc: &mut PdfDocument, settings: &PageNumberSettings, cancel: &CancelToken) -> Result<PageOpResult> {
    let selected: Vec<_> = doc
        .pages()
        .into_iter()
        .filter(|p| page_selected(&settings.pages, p.number))
        .collect();
    let total = settings.start_at + selected.len().saturating_sub(1) as u32;

    let mut modified = Vec::with_capacity(selected.len());
    for (i, page) in selected.iter().enumerate() {
        cancel.check()?;
        let label = format_label(&settings.format, settings.start_at + i as u32, total);
        let width = helvetica_width(&label, settings.font_size);
        let (x, y) = stamp_origin(&doc.crop_box(page), width, settings);

        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
            Operation::new(
                "Tf",
                vec![Object::Name(STAMP_FONT.to_vec()), Object::Real(settings.font_size)],
            ),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new("Tj", vec![Object::string_literal(encode_ascii(&label))]),
            Operation::new("ET", vec![]),
        ];
        let resources: Vec<ResourceEntry> =
            vec![(b"Font".as_slice(), STAMP_FONT.to_vec(), Object::Dictionary(helvetica()))];
        doc.append_content(page, ops, resources)?;
        modified.push(page.number);
    }

    info!(pages = modified.len(), "page numbers stamped");
    Ok(PageOpResult {
        pages_modified: modified,
    })
}

/// Set the CropBox of every selected page to its MediaBox less `margins`.
#[instrument(skip_all)]
pub fn crop_pages(doc: &mut PdfDocument, settings: &CropSettings, cancel: &CancelToken) -> Result<PageOpResult> {
    let m = &settings.margins;
    let mut updates = Vec::new();
    for page in doc.pages() {
        cancel.check()?;
        if !page_selected(&settings.pages, page.number) {
            continue;
        }
        let media = doc.media_box(&page);
        let crop = BoundingBox::new(media.x0 + m.left, media.y0 + m.bottom, media.x1 - m.right, media.y1 - m.top);
        if crop.width() <= 0.0 || crop.height() <= 0.0 {
            return Err(ForgeError::InvalidSettings(format!(
                "margins leave nothing of page {} ({}x{} points)",
                page.number,
                media.width(),
                media.height()
            )));
        }
        updates.push((page, crop));
    }

    for (page, crop) in &updates {
        doc.set_crop_box(page, crop)?;
    }
    info!(pages = updates.len(), "pages cropped");
    Ok(PageOpResult {
        pages_modified: updates.iter().map(|(p, _)| p.number).collect(),
    })
}
