// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Destructive removal of everything drawn inside a page region.
//
// Covered glyphs are cut out of their string operands and replaced by TJ
// displacements so that surrounding text keeps its position. Covered image
// placements are dropped when fully inside the region and otherwise pointed
// at a copy whose pixels under the region are blanked. Painted paths that lie
// entirely inside the region are dropped, as are annotations over it. Form
// XObjects touched by any of this are copied per placement, so other
// placements of the same form are left alone.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use docforge_core::BoundingBox;
use docforge_core::error::{ForgeError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, instrument};

use super::content::{ContentStream, StreamSource, covers, interpret_page};
use super::images::blank_region;
use super::matrix::number;
use super::{rect_of, resolve};

/// What a single removal destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalStats {
    /// Non-blank glyphs removed.
    pub glyphs: usize,
    pub images: usize,
    pub paths: usize,
    pub annotations: usize,
}

impl RemovalStats {
    pub fn is_empty(&self) -> bool {
        *self == RemovalStats::default()
    }

    pub fn add(&mut self, other: &RemovalStats) {
        self.glyphs += other.glyphs;
        self.images += other.images;
        self.paths += other.paths;
        self.annotations += other.annotations;
    }
}

struct GlyphCut {
    element: Option<usize>,
    bytes: Range<usize>,
    adjust: f32,
}

#[derive(Default)]
struct StreamEdits {
    cuts: BTreeMap<usize, Vec<GlyphCut>>,
    drop: BTreeSet<usize>,
    /// `Do` operators redirected to a new resource name.
    rename: BTreeMap<usize, Vec<u8>>,
    xobjects: Vec<(Vec<u8>, ObjectId)>,
}

impl StreamEdits {
    fn is_empty(&self) -> bool {
        self.cuts.is_empty() && self.drop.is_empty() && self.rename.is_empty()
    }
}

/// Remove everything drawn inside `region` on the page `page_id`.
#[instrument(skip(doc))]
pub fn remove_region(
    doc: &mut Document,
    page_id: ObjectId,
    region: &BoundingBox,
) -> Result<RemovalStats> {
    let content = interpret_page(doc, page_id)?;
    let mut stats = RemovalStats::default();
    let mut edits: Vec<StreamEdits> = content.streams.iter().map(|_| StreamEdits::default()).collect();
    let mut names = NameAllocator::default();

    for glyph in content.glyphs.iter().filter(|g| g.lies_in(region)) {
        edits[glyph.loc.stream]
            .cuts
            .entry(glyph.loc.op)
            .or_default()
            .push(GlyphCut {
                element: glyph.loc.element,
                bytes: glyph.loc.bytes.clone(),
                adjust: glyph.adjust,
            });
        if !glyph.is_blank() {
            stats.glyphs += 1;
        }
    }

    for path in content.paths.iter().filter(|p| region.contains(&p.bbox)) {
        edits[path.stream].drop.extend(path.ops.clone());
        stats.paths += 1;
    }

    for image in content.images.iter().filter(|i| covers(region, &i.bbox)) {
        stats.images += 1;
        let partial = !region.contains(&image.bbox);
        let blanked = match image.object {
            Some(id) if partial => match doc.get_object(id) {
                Ok(Object::Stream(stream)) => blank_region(stream, &image.matrix, region)?,
                _ => None,
            },
            _ => None,
        };
        let target = &mut edits[image.stream];
        match blanked {
            Some(stream) => {
                let id = doc.add_object(stream);
                let name = names.fresh(&content.streams[image.stream], b"DFim");
                target.rename.insert(image.op, name.clone());
                target.xobjects.push((name, id));
            }
            None => {
                target.drop.insert(image.op);
            }
        }
    }

    stats.annotations = remove_annotations(doc, page_id, region)?;

    for idx in (0..content.streams.len()).rev() {
        let stream_edits = std::mem::take(&mut edits[idx]);
        if stream_edits.is_empty() {
            continue;
        }
        let stream = &content.streams[idx];
        let operations = rewrite_operations(&stream.operations, &stream_edits);
        let encoded = Content { operations }
            .encode()
            .map_err(|e| ForgeError::Pdf(format!("encoding content stream: {e}")))?;
        let resources = with_xobjects(doc, &stream.resources, &stream_edits.xobjects);

        match &stream.source {
            StreamSource::Page => {
                let mut new_stream = Stream::new(Dictionary::new(), encoded);
                new_stream
                    .compress()
                    .map_err(|e| ForgeError::Pdf(format!("compressing content: {e}")))?;
                let content_id = doc.add_object(new_stream);
                let page = page_dict_mut(doc, page_id)?;
                page.set("Contents", content_id);
                if !stream_edits.xobjects.is_empty() {
                    page.set("Resources", resources);
                }
            }
            StreamSource::Form {
                object,
                parent,
                op,
                ..
            } => {
                let Ok(Object::Stream(original)) = doc.get_object(*object) else {
                    return Err(ForgeError::Pdf(format!("form {object:?} vanished")));
                };
                let mut dict = original.dict.clone();
                let stale: [&[u8]; 3] = [b"Length", b"Filter", b"DecodeParms"];
                for key in stale {
                    dict.remove(key);
                }
                dict.set("Resources", resources);
                let mut form = Stream::new(dict, encoded);
                form.compress()
                    .map_err(|e| ForgeError::Pdf(format!("compressing form: {e}")))?;
                let form_id = doc.add_object(form);

                let name = names.fresh(&content.streams[*parent], b"DFfm");
                edits[*parent].rename.insert(*op, name.clone());
                edits[*parent].xobjects.push((name, form_id));
            }
        }
    }

    debug!(?stats, "region removed");
    Ok(stats)
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_dictionary_mut(page_id)
        .map_err(|e| ForgeError::Pdf(format!("page {page_id:?}: {e}")))
}

/// Hands out XObject names unused by the stream's resources.
#[derive(Default)]
struct NameAllocator {
    next: usize,
}

impl NameAllocator {
    fn fresh(&mut self, stream: &ContentStream, prefix: &[u8]) -> Vec<u8> {
        let existing = match stream.resources.get(b"XObject") {
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        };
        loop {
            let mut name = prefix.to_vec();
            name.extend(self.next.to_string().into_bytes());
            self.next += 1;
            if existing.is_none_or(|dict| !dict.has(&name)) {
                return name;
            }
        }
    }
}

/// `resources` with the given XObject entries added, as a direct dictionary.
fn with_xobjects(doc: &Document, resources: &Dictionary, entries: &[(Vec<u8>, ObjectId)]) -> Dictionary {
    let mut resources = resources.clone();
    if entries.is_empty() {
        return resources;
    }
    let mut xobjects = match resources.get(b"XObject").map(|o| resolve(doc, o)) {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    for (name, id) in entries {
        xobjects.set(name.clone(), *id);
    }
    resources.set("XObject", xobjects);
    resources
}

fn remove_annotations(doc: &mut Document, page_id: ObjectId, region: &BoundingBox) -> Result<usize> {
    let annots = match doc.get_dictionary(page_id).ok().and_then(|p| p.get(b"Annots").ok()) {
        Some(annots) => match resolve(doc, annots) {
            Object::Array(items) => items.clone(),
            _ => return Ok(0),
        },
        None => return Ok(0),
    };
    let before = annots.len();
    let kept: Vec<Object> = annots
        .into_iter()
        .filter(|annot| match resolve(doc, annot) {
            Object::Dictionary(dict) => !rect_of(doc, dict, b"Rect").is_some_and(|r| covers(region, &r)),
            _ => true,
        })
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        page_dict_mut(doc, page_id)?.set("Annots", kept);
    }
    Ok(removed)
}

fn push_adjust(items: &mut Vec<Object>, adjust: f32) {
    if let Some(last) = items.last_mut()
        && let Some(prev) = number(last)
    {
        *last = Object::Real(prev + adjust);
        return;
    }
    items.push(Object::Real(adjust));
}

/// Append `bytes` to a TJ array with the glyphs in `cuts` replaced by their
/// displacement.
fn push_cut_string(items: &mut Vec<Object>, bytes: &[u8], format: StringFormat, cuts: &[&GlyphCut]) {
    let mut cuts = cuts.to_vec();
    cuts.sort_by_key(|c| c.bytes.start);
    let mut pos = 0;
    for cut in cuts {
        if cut.bytes.start > pos {
            items.push(Object::String(bytes[pos..cut.bytes.start].to_vec(), format.clone()));
        }
        push_adjust(items, cut.adjust);
        pos = pos.max(cut.bytes.end);
    }
    if pos < bytes.len() {
        items.push(Object::String(bytes[pos..].to_vec(), format));
    }
}

fn cut_show(operands: &[Object], cuts: &[GlyphCut]) -> Option<Operation> {
    let Some(Object::String(bytes, format)) = operands.last() else {
        return None;
    };
    let cuts: Vec<&GlyphCut> = cuts.iter().filter(|c| c.element.is_none()).collect();
    let mut items = Vec::new();
    push_cut_string(&mut items, bytes, format.clone(), &cuts);
    Some(Operation::new("TJ", vec![Object::Array(items)]))
}

fn rewrite_operations(operations: &[Operation], edits: &StreamEdits) -> Vec<Operation> {
    let mut out = Vec::with_capacity(operations.len());
    for (i, op) in operations.iter().enumerate() {
        if edits.drop.contains(&i) {
            continue;
        }
        if let Some(name) = edits.rename.get(&i) {
            out.push(Operation::new("Do", vec![Object::Name(name.clone())]));
            continue;
        }
        let Some(cuts) = edits.cuts.get(&i) else {
            out.push(op.clone());
            continue;
        };

        match op.operator.as_str() {
            "TJ" => {
                let Some(Object::Array(elements)) = op.operands.first() else {
                    out.push(op.clone());
                    continue;
                };
                let mut items = Vec::with_capacity(elements.len());
                for (e, element) in elements.iter().enumerate() {
                    match element {
                        Object::String(bytes, format) => {
                            let here: Vec<&GlyphCut> =
                                cuts.iter().filter(|c| c.element == Some(e)).collect();
                            push_cut_string(&mut items, bytes, format.clone(), &here);
                        }
                        other => match number(other) {
                            Some(n) => push_adjust(&mut items, n),
                            None => items.push(other.clone()),
                        },
                    }
                }
                out.push(Operation::new("TJ", vec![Object::Array(items)]));
            }
            "Tj" => out.extend(cut_show(&op.operands, cuts)),
            "'" => {
                out.push(Operation::new("T*", vec![]));
                out.extend(cut_show(&op.operands, cuts));
            }
            "\"" => {
                if let [aw, ac, _] = op.operands.as_slice() {
                    out.push(Operation::new("Tw", vec![aw.clone()]));
                    out.push(Operation::new("Tc", vec![ac.clone()]));
                }
                out.push(Operation::new("T*", vec![]));
                out.extend(cut_show(&op.operands, cuts));
            }
            _ => out.push(op.clone()),
        }
    }
    out
}
