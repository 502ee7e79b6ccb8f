// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR job: recognise text in page images and lay it back over the page as an
// invisible text layer, so the page becomes searchable and scannable.

#[cfg(feature = "ocr")]
pub mod engine;
pub mod preprocess;

use docforge_core::error::{ForgeError, Result};
use docforge_core::results::{OcrPageResult, OcrResult};
use docforge_core::settings::{OcrSettings, page_selected};
use docforge_core::{BoundingBox, CancelToken};
use image::GrayImage;
use lopdf::content::Operation;
use lopdf::Object;
use tracing::{debug, info, instrument, warn};

use crate::model::fonts::{encode_ascii, helvetica, helvetica_width};
use crate::model::images::decode_image;
use crate::model::{ImagePlacement, Page, PdfDocument, ResourceEntry};

#[cfg(feature = "ocr")]
pub use engine::{ModelPaths, OcrsRecognizer};

/// Font resource name of the invisible text layer.
pub const OCR_FONT: &[u8] = b"DFocr";

/// A line's box in image pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedLine {
    pub text: String,
    pub rect: PixelRect,
}

/// Turns a prepared grayscale image into lines of text.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RecognizedLine>>;
}

/// Where `rect` of an image `width`×`height` lands on the page.
pub fn line_box(placement: &ImagePlacement, rect: &PixelRect, width: u32, height: u32) -> BoundingBox {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let unit = BoundingBox::new(
        rect.x / w,
        1.0 - (rect.y + rect.height) / h,
        (rect.x + rect.width) / w,
        1.0 - rect.y / h,
    );
    placement.matrix.transform_box(&unit)
}

/// Invisible (render mode 3) text operators placing `text` over `bbox`.
fn text_layer(text: &str, bbox: &BoundingBox) -> Vec<Operation> {
    let size = bbox.height().max(1.0);
    let natural = helvetica_width(text, size);
    let scale = if natural > 0.0 {
        bbox.width() / natural * 100.0
    } else {
        100.0
    };
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tr", vec![3.into()]),
        Operation::new("Tf", vec![Object::Name(OCR_FONT.to_vec()), Object::Real(size)]),
        Operation::new("Tz", vec![Object::Real(scale)]),
        Operation::new(
            "Tm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                Object::Real(bbox.x0),
                Object::Real(bbox.y0),
            ],
        ),
        Operation::new("Tj", vec![Object::string_literal(encode_ascii(text))]),
        Operation::new("ET", vec![]),
    ]
}

/// Recognise the images on one page and stamp the text layer.
fn ocr_page(doc: &mut PdfDocument, page: &Page, recognizer: &dyn TextRecognizer) -> Result<OcrPageResult> {
    let content = doc.content(page)?;
    let mut ops = Vec::new();
    let mut texts = Vec::new();

    for placement in &content.images {
        let Some(id) = placement.object else {
            debug!(page = page.number, "inline image skipped");
            continue;
        };
        let Ok(stream) = doc.inner().get_object(id).and_then(Object::as_stream) else {
            continue;
        };
        let Some(rgb) = decode_image(stream) else {
            warn!(page = page.number, object = id.0, "image format not decodable, skipped");
            continue;
        };
        let prepared = preprocess::prepare(&rgb);
        for line in recognizer.recognize(&prepared)? {
            let bbox = line_box(placement, &line.rect, rgb.width(), rgb.height());
            ops.extend(text_layer(&line.text, &bbox));
            texts.push(line.text);
        }
    }

    if !ops.is_empty() {
        let resources: Vec<ResourceEntry> =
            vec![(b"Font".as_slice(), OCR_FONT.to_vec(), Object::Dictionary(helvetica()))];
        doc.append_content(page, ops, resources)?;
    }
    Ok(OcrPageResult {
        page: page.number,
        lines: texts.len(),
        text: texts.join("\n"),
    })
}

/// Run OCR over the selected pages of `doc`. Pages that already carry text
/// are skipped unless `force` is set.
#[instrument(skip_all, fields(language = %settings.language, force = settings.force))]
pub fn ocr(
    doc: &mut PdfDocument,
    settings: &OcrSettings,
    recognizer: Option<&dyn TextRecognizer>,
    cancel: &CancelToken,
) -> Result<OcrResult> {
    let recognizer = recognizer.ok_or_else(|| {
        ForgeError::OcrUnavailable(if cfg!(feature = "ocr") {
            "OCR models are not loaded".into()
        } else {
            "built without the ocr feature".into()
        })
    })?;

    let mut pages = Vec::new();
    let mut skipped = Vec::new();
    for page in doc.pages() {
        cancel.check()?;
        if !page_selected(&settings.pages, page.number) {
            continue;
        }
        if !settings.force && doc.content(&page)?.has_text() {
            skipped.push(page.number);
            continue;
        }
        pages.push(ocr_page(doc, &page, recognizer)?);
    }

    info!(
        pages = pages.len(),
        skipped = skipped.len(),
        lines = pages.iter().map(|p| p.lines).sum::<usize>(),
        "OCR complete"
    );
    Ok(OcrResult {
        language: settings.language.clone(),
        pages,
        pages_skipped: skipped,
    })
}
