// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content stream interpreter.
//
// Walks a page's operators (and, recursively, the Form XObjects it paints)
// tracking the graphics and text state, and records every glyph, image
// placement and painted path with its position in user space and the exact
// operator that produced it. Extraction, scanning and region removal all work
// from the same record so that what is found is exactly what gets removed.

use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use docforge_core::BoundingBox;
use docforge_core::error::{ForgeError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{trace, warn};

use super::fonts::FontInfo;
use super::matrix::{Matrix, number};
use super::resolve;

/// Form XObjects nested deeper than this are not interpreted.
const MAX_FORM_DEPTH: usize = 8;

/// Extent, as a fraction of the font size, given to a glyph box that zero
/// widths or zero horizontal scaling collapsed.
const MIN_GLYPH_EXTENT: f32 = 0.5;
/// Floor in user space for glyphs set at size zero.
const MIN_GLYPH_POINTS: f32 = 1.0;

/// Where the operators of a [`ContentStream`] live in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSource {
    /// The page's own /Contents.
    Page,
    /// A Form XObject painted by operator `op` of stream `parent`.
    Form {
        object: ObjectId,
        name: Vec<u8>,
        parent: usize,
        op: usize,
    },
}

/// One decoded operator list together with the resources it resolves names in.
#[derive(Debug, Clone)]
pub struct ContentStream {
    pub source: StreamSource,
    pub operations: Vec<Operation>,
    pub resources: Dictionary,
}

/// Exact position of a glyph's bytes inside a content stream.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphLoc {
    /// Index into [`PageContent::streams`].
    pub stream: usize,
    pub op: usize,
    /// Element of a TJ array; `None` for Tj, ' and ".
    pub element: Option<usize>,
    pub bytes: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    pub bbox: BoundingBox,
    /// Baseline origin in user space.
    pub origin: (f32, f32),
    /// Effective font size in user space.
    pub size: f32,
    /// TJ displacement (thousandths of text space) that reproduces this
    /// glyph's advance once the glyph itself is gone.
    pub adjust: f32,
    pub loc: GlyphLoc,
    /// Position among everything drawn on the page.
    pub seq: usize,
}

impl Glyph {
    pub fn is_blank(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }

    /// Whether the glyph belongs to `region`: its box overlaps it, or its
    /// origin lies strictly inside it.
    pub fn lies_in(&self, region: &BoundingBox) -> bool {
        const EPS: f32 = 0.01;
        let (x, y) = self.origin;
        covers(region, &self.bbox)
            || (x > region.x0 + EPS && x < region.x1 - EPS && y > region.y0 + EPS && y < region.y1 - EPS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub name: Vec<u8>,
    /// Image XObject; `None` for inline images.
    pub object: Option<ObjectId>,
    /// Maps the unit square onto the page.
    pub matrix: Matrix,
    pub bbox: BoundingBox,
    pub stream: usize,
    pub op: usize,
    pub seq: usize,
}

impl ImagePlacement {
    pub fn is_inline(&self) -> bool {
        self.object.is_none()
    }
}

/// A constructed and painted path, from its first construction operator to
/// the painting operator inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintedPath {
    pub bbox: BoundingBox,
    pub stream: usize,
    pub ops: Range<usize>,
}

/// Everything drawn on one page, in content-stream order.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub streams: Vec<ContentStream>,
    pub glyphs: Vec<Glyph>,
    pub images: Vec<ImagePlacement>,
    pub paths: Vec<PaintedPath>,
}

impl PageContent {
    pub fn has_text(&self) -> bool {
        self.glyphs.iter().any(|g| !g.is_blank())
    }
}

/// True when `bbox` overlaps `region` by a non-degenerate area.
pub fn covers(region: &BoundingBox, bbox: &BoundingBox) -> bool {
    const EPS: f32 = 0.01;
    region
        .intersection(bbox)
        .is_some_and(|i| i.width() > EPS && i.height() > EPS)
}

/// Widen a collapsed glyph box so text drawn with `Tz 0`, zero /Widths or a
/// zero font size still occupies area that regions can cover.
fn ensure_extent(mut bbox: BoundingBox, size: f32) -> BoundingBox {
    let min = (size * MIN_GLYPH_EXTENT).max(MIN_GLYPH_POINTS);
    let collapsed = (size * 0.05).max(0.01);
    if bbox.width() < collapsed {
        bbox.x1 = bbox.x0 + min;
    }
    if bbox.height() < collapsed {
        bbox.y1 = bbox.y0 + min;
    }
    bbox
}

// -- Stream access ------------------------------------------------------------

/// Decoded bytes of a stream; raw bytes when the filter is unsupported.
pub fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Concatenated /Contents of a page. A page without contents is blank.
pub fn page_content_bytes(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| ForgeError::CorruptDocument(format!("page {page_id:?}: {e}")))?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };
    let mut data = Vec::new();
    match resolve(doc, contents) {
        Object::Stream(stream) => data = stream_bytes(stream),
        Object::Array(parts) => {
            for part in parts {
                match resolve(doc, part) {
                    Object::Stream(stream) => {
                        data.extend(stream_bytes(stream));
                        data.push(b'\n');
                    }
                    other => warn!(?other, "skipping non-stream content part"),
                }
            }
        }
        other => {
            return Err(ForgeError::CorruptDocument(format!(
                "page {page_id:?} /Contents is not a stream: {other:?}"
            )));
        }
    }
    Ok(data)
}

pub fn decode_operations(data: &[u8]) -> Result<Vec<Operation>> {
    Content::decode(data)
        .map(|content| content.operations)
        .map_err(|e| ForgeError::CorruptDocument(format!("content stream: {e}")))
}

/// The page's resource dictionary, following /Parent inheritance.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut node = doc.get_dictionary(page_id).ok();
    for _ in 0..32 {
        let Some(dict) = node else { break };
        if let Ok(res) = dict.get(b"Resources")
            && let Object::Dictionary(res) = resolve(doc, res)
        {
            return res.clone();
        }
        node = match dict.get(b"Parent") {
            Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
            _ => None,
        };
    }
    Dictionary::new()
}

/// Look up `name` in resource category `category` (e.g. `XObject`).
pub fn lookup_resource<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    category: &[u8],
    name: &[u8],
) -> Option<(Option<ObjectId>, &'a Object)> {
    let Object::Dictionary(entries) = resolve(doc, resources.get(category).ok()?) else {
        return None;
    };
    match entries.get(name).ok()? {
        Object::Reference(id) => doc.get_object(*id).ok().map(|obj| (Some(*id), obj)),
        direct => Some((None, direct)),
    }
}

fn subtype(dict: &Dictionary) -> &[u8] {
    match dict.get(b"Subtype") {
        Ok(Object::Name(name)) => name,
        _ => b"",
    }
}

// -- Interpreter --------------------------------------------------------------

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Rc<FontInfo>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            font: Rc::new(FontInfo::default()),
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

struct TextState {
    tm: Matrix,
    tlm: Matrix,
}

impl TextState {
    fn new_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }
}

struct Interpreter<'d> {
    doc: &'d Document,
    out: PageContent,
    forms: Vec<ObjectId>,
    seq: usize,
}

/// Interpret every operator drawn on `page_id`.
pub fn interpret_page(doc: &Document, page_id: ObjectId) -> Result<PageContent> {
    let operations = decode_operations(&page_content_bytes(doc, page_id)?)?;
    let mut interp = Interpreter {
        doc,
        out: PageContent::default(),
        forms: Vec::new(),
        seq: 0,
    };
    interp.out.streams.push(ContentStream {
        source: StreamSource::Page,
        operations,
        resources: page_resources(doc, page_id),
    });
    interp.run(0, GraphicsState::new(Matrix::IDENTITY))?;
    trace!(
        glyphs = interp.out.glyphs.len(),
        images = interp.out.images.len(),
        paths = interp.out.paths.len(),
        "page interpreted"
    );
    Ok(interp.out)
}

impl Interpreter<'_> {
    fn next_seq(&mut self) -> usize {
        self.seq += 1;
        self.seq
    }

    fn run(&mut self, idx: usize, initial: GraphicsState) -> Result<()> {
        let operations = self.out.streams[idx].operations.clone();
        let resources = self.out.streams[idx].resources.clone();
        let mut fonts: HashMap<Vec<u8>, Rc<FontInfo>> = HashMap::new();

        let mut gs = initial;
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut ts = TextState {
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
        };
        let mut path_start: Option<usize> = None;
        let mut path_points: Vec<(f32, f32)> = Vec::new();

        for (i, op) in operations.iter().enumerate() {
            let nums: Vec<f32> = op.operands.iter().filter_map(number).collect();
            match op.operator.as_str() {
                "q" => stack.push(gs.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        gs = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_objects(&op.operands) {
                        gs.ctm = m.then(&gs.ctm);
                    }
                }

                // Text state
                "BT" => {
                    ts.tm = Matrix::IDENTITY;
                    ts.tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let (Some(Object::Name(name)), Some(size)) =
                        (op.operands.first(), op.operands.get(1).and_then(number))
                    {
                        gs.font_size = size;
                        gs.font = fonts
                            .entry(name.clone())
                            .or_insert_with(|| Rc::new(self.load_font(&resources, name)))
                            .clone();
                    }
                }
                "Tc" => gs.char_spacing = nums.first().copied().unwrap_or(0.0),
                "Tw" => gs.word_spacing = nums.first().copied().unwrap_or(0.0),
                "Tz" => gs.h_scale = nums.first().copied().unwrap_or(100.0) / 100.0,
                "TL" => gs.leading = nums.first().copied().unwrap_or(0.0),
                "Ts" => gs.rise = nums.first().copied().unwrap_or(0.0),
                "Td" if nums.len() >= 2 => ts.new_line(nums[0], nums[1]),
                "TD" if nums.len() >= 2 => {
                    gs.leading = -nums[1];
                    ts.new_line(nums[0], nums[1]);
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_objects(&op.operands) {
                        ts.tm = m;
                        ts.tlm = m;
                    }
                }
                "T*" => ts.new_line(0.0, -gs.leading),

                // Text showing
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(&gs, &mut ts, bytes, idx, i, None);
                    }
                }
                "'" => {
                    ts.new_line(0.0, -gs.leading);
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        self.show(&gs, &mut ts, bytes, idx, i, None);
                    }
                }
                "\"" => {
                    if let [aw, ac, Object::String(bytes, _)] = op.operands.as_slice() {
                        gs.word_spacing = number(aw).unwrap_or(0.0);
                        gs.char_spacing = number(ac).unwrap_or(0.0);
                        ts.new_line(0.0, -gs.leading);
                        self.show(&gs, &mut ts, bytes, idx, i, None);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for (element, item) in items.iter().enumerate() {
                            match item {
                                Object::String(bytes, _) => {
                                    self.show(&gs, &mut ts, bytes, idx, i, Some(element))
                                }
                                other => {
                                    if let Some(n) = number(other) {
                                        let tx = -n / 1000.0 * gs.font_size * gs.h_scale;
                                        ts.tm = Matrix::translate(tx, 0.0).then(&ts.tm);
                                    }
                                }
                            }
                        }
                    }
                }

                // Path construction and painting
                "m" | "l" if nums.len() >= 2 => {
                    path_start.get_or_insert(i);
                    path_points.push(gs.ctm.apply(nums[0], nums[1]));
                }
                "c" | "v" | "y" => {
                    path_start.get_or_insert(i);
                    for pair in nums.chunks_exact(2) {
                        path_points.push(gs.ctm.apply(pair[0], pair[1]));
                    }
                }
                "re" if nums.len() >= 4 => {
                    path_start.get_or_insert(i);
                    let (x, y, w, h) = (nums[0], nums[1], nums[2], nums[3]);
                    for (px, py) in [(x, y), (x + w, y), (x, y + h), (x + w, y + h)] {
                        path_points.push(gs.ctm.apply(px, py));
                    }
                }
                "h" | "W" | "W*" => {}
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    if let (Some(start), Some(bbox)) =
                        (path_start.take(), BoundingBox::from_points(&path_points))
                    {
                        self.out.paths.push(PaintedPath {
                            bbox,
                            stream: idx,
                            ops: start..i + 1,
                        });
                    }
                    path_points.clear();
                }
                "n" => {
                    path_start = None;
                    path_points.clear();
                }

                // XObjects and inline images
                "Do" => {
                    if let Some(Object::Name(name)) = op.operands.first() {
                        self.paint_xobject(&resources, &gs, name, idx, i)?;
                    }
                }
                "BI" => {
                    let seq = self.next_seq();
                    self.out.images.push(ImagePlacement {
                        name: Vec::new(),
                        object: None,
                        matrix: gs.ctm,
                        bbox: gs.ctm.unit_square(),
                        stream: idx,
                        op: i,
                        seq,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn load_font(&self, resources: &Dictionary, name: &[u8]) -> FontInfo {
        match lookup_resource(self.doc, resources, b"Font", name) {
            Some((_, obj)) => match resolve(self.doc, obj) {
                Object::Dictionary(dict) => FontInfo::from_dict(self.doc, dict),
                _ => FontInfo::default(),
            },
            None => {
                warn!(font = %String::from_utf8_lossy(name), "font not in resources, using Helvetica metrics");
                FontInfo::default()
            }
        }
    }

    fn show(
        &mut self,
        gs: &GraphicsState,
        ts: &mut TextState,
        bytes: &[u8],
        stream: usize,
        op: usize,
        element: Option<usize>,
    ) {
        let fs = gs.font_size;
        let th = gs.h_scale;
        for (code, range) in gs.font.codes(bytes) {
            let w0 = gs.font.width(code) / 1000.0;
            let trm = Matrix([fs * th, 0.0, 0.0, fs, 0.0, gs.rise])
                .then(&ts.tm)
                .then(&gs.ctm);
            let spacing = gs.char_spacing
                + if gs.font.is_word_space(code, range.len()) {
                    gs.word_spacing
                } else {
                    0.0
                };
            let tx = (w0 * fs + spacing) * th;
            let adjust = if fs * th != 0.0 {
                -tx * 1000.0 / (fs * th)
            } else {
                0.0
            };

            let size = (trm.0[2] * trm.0[2] + trm.0[3] * trm.0[3]).sqrt();
            let bbox = ensure_extent(trm.transform_box(&BoundingBox::new(0.0, -0.2, w0, 0.8)), size);

            let seq = self.next_seq();
            self.out.glyphs.push(Glyph {
                text: gs.font.decode(code),
                bbox,
                origin: trm.apply(0.0, 0.0),
                size,
                adjust,
                loc: GlyphLoc {
                    stream,
                    op,
                    element,
                    bytes: range,
                },
                seq,
            });
            ts.tm = Matrix::translate(tx, 0.0).then(&ts.tm);
        }
    }

    fn paint_xobject(
        &mut self,
        resources: &Dictionary,
        gs: &GraphicsState,
        name: &[u8],
        idx: usize,
        op: usize,
    ) -> Result<()> {
        let doc = self.doc;
        let Some((id, Object::Stream(stream))) = lookup_resource(doc, resources, b"XObject", name)
        else {
            warn!(name = %String::from_utf8_lossy(name), "unresolvable XObject");
            return Ok(());
        };

        match subtype(&stream.dict) {
            b"Image" => {
                let seq = self.next_seq();
                self.out.images.push(ImagePlacement {
                    name: name.to_vec(),
                    object: id,
                    matrix: gs.ctm,
                    bbox: gs.ctm.unit_square(),
                    stream: idx,
                    op,
                    seq,
                });
            }
            b"Form" => {
                let Some(form_id) = id else {
                    return Ok(());
                };
                if self.forms.len() >= MAX_FORM_DEPTH || self.forms.contains(&form_id) {
                    warn!(?form_id, "form nesting too deep or cyclic, not interpreted");
                    return Ok(());
                }
                let form_matrix = match stream.dict.get(b"Matrix") {
                    Ok(Object::Array(items)) => {
                        Matrix::from_objects(items).unwrap_or(Matrix::IDENTITY)
                    }
                    _ => Matrix::IDENTITY,
                };
                let form_resources = match stream.dict.get(b"Resources").map(|r| resolve(doc, r)) {
                    Ok(Object::Dictionary(dict)) => dict.clone(),
                    _ => resources.clone(),
                };
                let operations = decode_operations(&stream_bytes(stream))?;

                self.out.streams.push(ContentStream {
                    source: StreamSource::Form {
                        object: form_id,
                        name: name.to_vec(),
                        parent: idx,
                        op,
                    },
                    operations,
                    resources: form_resources,
                });
                let child = self.out.streams.len() - 1;
                let mut form_gs = gs.clone();
                form_gs.ctm = form_matrix.then(&gs.ctm);

                self.forms.push(form_id);
                let result = self.run(child, form_gs);
                self.forms.pop();
                result?;
            }
            other => trace!(subtype = %String::from_utf8_lossy(other), "ignoring XObject"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream, dictionary};

    fn single_page(doc: &mut Document, content: &[u8], resources: Dictionary) -> ObjectId {
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);
        page_id
    }

    fn helvetica() -> Dictionary {
        dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                },
            },
        }
    }

    #[test]
    fn glyphs_follow_text_matrix_and_widths() {
        let mut doc = Document::with_version("1.5");
        let page = single_page(&mut doc, b"BT /F1 10 Tf 100 700 Td (AB) Tj ET", helvetica());
        let content = interpret_page(&doc, page).unwrap();
        assert_eq!(content.glyphs.len(), 2);

        let a = &content.glyphs[0];
        assert_eq!(a.text, "A");
        assert!((a.bbox.x0 - 100.0).abs() < 1e-3);
        assert!((a.bbox.x1 - 106.67).abs() < 1e-2);
        assert!((a.bbox.y0 - 698.0).abs() < 1e-3);
        assert!((a.bbox.y1 - 708.0).abs() < 1e-3);
        assert!((a.adjust + 667.0).abs() < 1e-2);

        let b = &content.glyphs[1];
        assert!((b.origin.0 - 106.67).abs() < 1e-2);
        assert_eq!(b.loc.bytes, 1..2);
    }

    #[test]
    fn tj_numbers_shift_following_glyphs() {
        let mut doc = Document::with_version("1.5");
        let page = single_page(&mut doc, b"BT /F1 10 Tf 0 0 Td [(A) -1000 (B)] TJ ET", helvetica());
        let content = interpret_page(&doc, page).unwrap();
        let b = &content.glyphs[1];
        // 6.67 for A plus 10 for the -1000 displacement.
        assert!((b.origin.0 - 16.67).abs() < 1e-2);
        assert_eq!(b.loc.element, Some(2));
    }

    #[test]
    fn ctm_and_paths_are_tracked() {
        let mut doc = Document::with_version("1.5");
        let page = single_page(
            &mut doc,
            b"q 2 0 0 2 10 10 cm 0 0 5 5 re f Q 0 0 m 1 1 l n",
            Dictionary::new(),
        );
        let content = interpret_page(&doc, page).unwrap();
        assert_eq!(content.paths.len(), 1);
        assert_eq!(content.paths[0].bbox, BoundingBox::new(10.0, 10.0, 20.0, 20.0));
        assert_eq!(content.paths[0].ops, 2..4);
    }

    #[test]
    fn forms_are_interpreted_with_their_matrix() {
        let mut doc = Document::with_version("1.5");
        let form = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
                "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 50.into(), 50.into()],
                "Resources" => helvetica(),
            },
            b"BT /F1 10 Tf (X) Tj ET".to_vec(),
        ));
        let resources = dictionary! { "XObject" => dictionary! { "Fm0" => form } };
        let page = single_page(&mut doc, b"/Fm0 Do", resources);

        let content = interpret_page(&doc, page).unwrap();
        assert_eq!(content.streams.len(), 2);
        assert_eq!(content.glyphs.len(), 1);
        assert_eq!(content.glyphs[0].loc.stream, 1);
        assert!((content.glyphs[0].origin.0 - 50.0).abs() < 1e-3);
    }

    #[test]
    fn covers_ignores_edge_contact() {
        let region = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(covers(&region, &BoundingBox::new(5.0, 5.0, 15.0, 15.0)));
        assert!(!covers(&region, &BoundingBox::new(10.0, 0.0, 20.0, 10.0)));
    }
}
