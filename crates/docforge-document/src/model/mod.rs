// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document model adapter over the lopdf object graph.
//
// Engines never touch lopdf pages directly for text or removal; they go
// through `PdfDocument` so that extraction, scanning, removal and
// verification share one interpretation of the content streams.

pub mod content;
pub mod fonts;
pub mod images;
pub mod matrix;
pub mod removal;
pub mod text;

use std::collections::BTreeMap;

use docforge_core::BoundingBox;
use docforge_core::error::{ForgeError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, instrument, warn};

pub use content::{Glyph, ImagePlacement, PageContent, covers};
pub use matrix::Matrix;
pub use removal::RemovalStats;
pub use text::TextLine;

/// US Letter, used when a page carries no usable MediaBox.
const DEFAULT_MEDIA_BOX: BoundingBox = BoundingBox {
    x0: 0.0,
    y0: 0.0,
    x1: 612.0,
    y1: 792.0,
};

/// Follow indirect references until a direct object is reached.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    let mut current = obj;
    for _ in 0..32 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

/// A `[x0 y0 x1 y1]` rectangle stored under `key`.
pub(crate) fn rect_of(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<BoundingBox> {
    let Object::Array(items) = resolve(doc, dict.get(key).ok()?) else {
        return None;
    };
    if items.len() != 4 {
        return None;
    }
    let values: Vec<f32> = items
        .iter()
        .filter_map(|o| matrix::number(resolve(doc, o)))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] => Some(BoundingBox::new(*x0, *y0, *x1, *y1)),
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise PDFDocEncoding,
/// treated as Latin-1).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .map(|c| ((c[0] as u16) << 8) | c.get(1).copied().unwrap_or(0) as u16)
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|b| *b as char).collect()
    }
}

/// A page handle: 1-based number plus the page object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub id: ObjectId,
}

/// A resource entry to add to a page: `(category, name, value)`.
pub type ResourceEntry = (&'static [u8], Vec<u8>, Object);

/// A loaded PDF document.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    inner: Document,
}

impl PdfDocument {
    /// Parse `bytes`. Anything lopdf cannot load, or a file without a
    /// catalog, is a corrupt document.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let inner = Document::load_mem(bytes)
            .map_err(|e| ForgeError::CorruptDocument(format!("unable to parse PDF: {e}")))?;
        if inner.catalog().is_err() {
            return Err(ForgeError::CorruptDocument(
                "document has no catalog".into(),
            ));
        }
        let doc = Self { inner };
        debug!(pages = doc.page_count(), "document loaded");
        Ok(doc)
    }

    pub fn from_lopdf(inner: Document) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Document {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Document {
        &mut self.inner
    }

    pub fn page_count(&self) -> u32 {
        self.inner.get_pages().len() as u32
    }

    pub fn pages(&self) -> Vec<Page> {
        self.inner
            .get_pages()
            .into_iter()
            .map(|(number, id)| Page { number, id })
            .collect()
    }

    /// The page with 1-based index `number`.
    pub fn page(&self, number: u32) -> Result<Page> {
        self.inner
            .get_pages()
            .get(&number)
            .map(|id| Page { number, id: *id })
            .ok_or(ForgeError::PageIndexOutOfRange {
                page: number,
                page_count: self.page_count(),
            })
    }

    /// Interpret everything drawn on `page`.
    pub fn content(&self, page: &Page) -> Result<PageContent> {
        content::interpret_page(&self.inner, page.id)
    }

    /// Text lines of `page` with their boxes, in content-stream order.
    pub fn extract_text(&self, page: &Page) -> Result<Vec<TextLine>> {
        Ok(text::build_lines(&self.content(page)?.glyphs))
    }

    /// Plain text of `page`, one line per text line.
    pub fn page_text(&self, page: &Page) -> Result<String> {
        Ok(self
            .extract_text(page)?
            .into_iter()
            .map(|line| line.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Non-blank text of every glyph that lies in `region`.
    pub fn text_in_region(&self, page: &Page, region: &BoundingBox) -> Result<String> {
        Ok(self
            .content(page)?
            .glyphs
            .iter()
            .filter(|g| !g.is_blank() && g.lies_in(region))
            .map(|g| g.text.as_str())
            .collect())
    }

    /// Destructively remove glyphs, image pixels, fully covered paths and
    /// annotations inside `region`.
    pub fn remove_region(&mut self, page: &Page, region: &BoundingBox) -> Result<RemovalStats> {
        removal::remove_region(&mut self.inner, page.id, region)
    }

    /// Draw `operations` on top of the page. Existing content is wrapped in
    /// `q`/`Q` so its graphics state cannot leak into the new operators.
    pub fn append_content(
        &mut self,
        page: &Page,
        operations: Vec<Operation>,
        resources: Vec<ResourceEntry>,
    ) -> Result<()> {
        let existing: Vec<Object> = {
            let dict = self.page_dict(page)?;
            match dict.get(b"Contents") {
                Ok(Object::Array(items)) => items.clone(),
                Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
                Ok(other) => {
                    warn!(?other, "unexpected /Contents, replacing");
                    Vec::new()
                }
                Err(_) => Vec::new(),
            }
        };

        let mut ops = vec![Operation::new("Q", vec![])];
        ops.extend(operations);
        let encoded = Content { operations: ops }
            .encode()
            .map_err(|e| ForgeError::Pdf(format!("encoding content: {e}")))?;
        let open = self.inner.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let mut stream = Stream::new(Dictionary::new(), encoded);
        stream
            .compress()
            .map_err(|e| ForgeError::Pdf(format!("compressing content: {e}")))?;
        let close = self.inner.add_object(stream);

        let mut contents = vec![Object::Reference(open)];
        contents.extend(existing);
        contents.push(Object::Reference(close));

        let mut merged = content::page_resources(&self.inner, page.id);
        for (category, name, value) in resources {
            let mut entries = match merged.get(category).map(|o| resolve(&self.inner, o)) {
                Ok(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            };
            entries.set(name, value);
            merged.set(category.to_vec(), entries);
        }

        let dict = self.page_dict_mut(page)?;
        dict.set("Contents", contents);
        dict.set("Resources", merged);
        Ok(())
    }

    fn page_dict(&self, page: &Page) -> Result<&Dictionary> {
        self.inner
            .get_dictionary(page.id)
            .map_err(|e| ForgeError::Pdf(format!("page {}: {e}", page.number)))
    }

    fn page_dict_mut(&mut self, page: &Page) -> Result<&mut Dictionary> {
        self.inner
            .get_dictionary_mut(page.id)
            .map_err(|e| ForgeError::Pdf(format!("page {}: {e}", page.number)))
    }

    /// An inheritable page attribute (MediaBox, CropBox, Rotate, Resources).
    fn inherited_rect(&self, page: &Page, key: &[u8]) -> Option<BoundingBox> {
        let mut node = self.inner.get_dictionary(page.id).ok();
        for _ in 0..32 {
            let dict = node?;
            if let Some(rect) = rect_of(&self.inner, dict, key) {
                return Some(rect);
            }
            node = match dict.get(b"Parent") {
                Ok(Object::Reference(id)) => self.inner.get_dictionary(*id).ok(),
                _ => None,
            };
        }
        None
    }

    pub fn media_box(&self, page: &Page) -> BoundingBox {
        self.inherited_rect(page, b"MediaBox")
            .unwrap_or(DEFAULT_MEDIA_BOX)
    }

    /// Visible area: the CropBox clipped to the MediaBox.
    pub fn crop_box(&self, page: &Page) -> BoundingBox {
        let media = self.media_box(page);
        self.inherited_rect(page, b"CropBox")
            .and_then(|crop| crop.intersection(&media))
            .unwrap_or(media)
    }

    pub fn set_crop_box(&mut self, page: &Page, bbox: &BoundingBox) -> Result<()> {
        let rect: Vec<Object> = [bbox.x0, bbox.y0, bbox.x1, bbox.y1]
            .into_iter()
            .map(Object::Real)
            .collect();
        self.page_dict_mut(page)?.set("CropBox", rect);
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.inner.trailer.get(b"Encrypt").is_ok()
    }

    /// Info dictionary entries as text.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let Ok(info) = self.inner.trailer.get(b"Info") else {
            return out;
        };
        if let Object::Dictionary(dict) = resolve(&self.inner, info) {
            for (key, value) in dict.iter() {
                if let Object::String(bytes, _) = resolve(&self.inner, value) {
                    out.insert(String::from_utf8_lossy(key).into_owned(), decode_text_string(bytes));
                }
            }
        }
        out
    }

    /// Drop the Info dictionary, the catalog's XMP stream and per-page
    /// metadata. Returns whether anything was removed.
    #[instrument(skip_all)]
    pub fn scrub_metadata(&mut self) -> bool {
        let mut removed = self.inner.trailer.remove(b"Info").is_some();
        if let Ok(catalog) = self.inner.catalog_mut() {
            removed |= catalog.remove(b"Metadata").is_some();
            removed |= catalog.remove(b"PieceInfo").is_some();
        }
        for page in self.pages() {
            if let Ok(dict) = self.inner.get_dictionary_mut(page.id) {
                removed |= dict.remove(b"Metadata").is_some();
                removed |= dict.remove(b"PieceInfo").is_some();
            }
        }
        debug!(removed, "metadata scrubbed");
        removed
    }

    /// Write the document with a fresh cross-reference table and no
    /// incremental-update history.
    #[instrument(skip_all)]
    pub fn serialize(&mut self) -> Result<Vec<u8>> {
        self.inner.trailer.remove(b"Prev");
        self.inner.trailer.remove(b"XRefStm");
        let mut buf = Vec::new();
        self.inner
            .save_to(&mut buf)
            .map_err(|e| ForgeError::Pdf(format!("serialisation failed: {e}")))?;
        debug!(bytes = buf.len(), "document serialised");
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn load_rejects_garbage() {
        let err = PdfDocument::load(b"not a pdf").unwrap_err();
        assert_eq!(err.kind(), docforge_core::ErrorKind::CorruptDocument);
    }

    #[test]
    fn page_index_is_one_based_and_checked() {
        let doc = PdfDocument::load(&fixtures::text_document(&["one", "two"])).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page(1).unwrap().number, 1);
        assert!(matches!(
            doc.page(3),
            Err(ForgeError::PageIndexOutOfRange { page: 3, page_count: 2 })
        ));
        assert!(doc.page(0).is_err());
    }

    #[test]
    fn round_trip_preserves_pages_and_text() {
        let bytes = fixtures::text_document(&["Hello world", "Second page\nwith two lines"]);
        let mut doc = PdfDocument::load(&bytes).unwrap();
        let before: Vec<String> = doc
            .pages()
            .iter()
            .map(|p| doc.page_text(p).unwrap())
            .collect();

        let reloaded = PdfDocument::load(&doc.serialize().unwrap()).unwrap();
        let after: Vec<String> = reloaded
            .pages()
            .iter()
            .map(|p| reloaded.page_text(p).unwrap())
            .collect();
        assert_eq!(before, after);
        assert_eq!(before[1], "Second page\nwith two lines");
    }

    #[test]
    fn remove_region_destroys_only_covered_text() {
        let mut doc = PdfDocument::load(&fixtures::text_document(&["keep SECRET keep"])).unwrap();
        let page = doc.page(1).unwrap();
        let line = doc.extract_text(&page).unwrap().remove(0);
        let start = line.text.find("SECRET").unwrap();
        let region = line.bbox_of(start..start + 6).unwrap();

        let stats = doc.remove_region(&page, &region).unwrap();
        assert_eq!(stats.glyphs, 6);

        let reloaded = PdfDocument::load(&doc.serialize().unwrap()).unwrap();
        let page = reloaded.page(1).unwrap();
        assert_eq!(reloaded.text_in_region(&page, &region).unwrap(), "");
        let text = reloaded.page_text(&page).unwrap();
        assert!(text.starts_with("keep") && text.ends_with("keep"));
        assert!(!text.contains("SECRET"));
    }

    #[test]
    fn remove_region_handles_images() {
        let mut doc = PdfDocument::load(&fixtures::image_document()).unwrap();
        let page = doc.page(1).unwrap();
        let placement = doc.content(&page).unwrap().images[0].bbox;

        let half = BoundingBox::new(placement.x0, placement.y0, placement.x1, placement.y0 + placement.height() / 2.0);
        let stats = doc.remove_region(&page, &half).unwrap();
        assert_eq!(stats.images, 1);
        let images = doc.content(&page).unwrap().images;
        assert_eq!(images.len(), 1);
        assert!(images[0].name.starts_with(b"DFim"));

        let stats = doc.remove_region(&page, &placement.expand(1.0)).unwrap();
        assert_eq!(stats.images, 1);
        assert!(doc.content(&page).unwrap().images.is_empty());
    }

    #[test]
    fn append_content_keeps_existing_text() {
        let mut doc = PdfDocument::load(&fixtures::text_document(&["body"])).unwrap();
        let page = doc.page(1).unwrap();
        doc.append_content(
            &page,
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"DFf0".to_vec()), 10.into()]),
                Operation::new("Td", vec![300.into(), 20.into()]),
                Operation::new("Tj", vec![Object::string_literal("7")]),
                Operation::new("ET", vec![]),
            ],
            vec![(b"Font", b"DFf0".to_vec(), fixtures::helvetica_font().into())],
        )
        .unwrap();
        let text = doc.page_text(&page).unwrap();
        assert_eq!(text, "body\n7");
    }

    #[test]
    fn metadata_scrub_removes_info() {
        let mut doc = PdfDocument::load(&fixtures::text_document(&["x"])).unwrap();
        assert_eq!(doc.metadata().get("Author").map(String::as_str), Some("Docforge Fixtures"));
        assert!(doc.scrub_metadata());
        let reloaded = PdfDocument::load(&doc.serialize().unwrap()).unwrap();
        assert!(reloaded.metadata().is_empty());
    }
}
