// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Small PDFs built with lopdf, for tests and benchmarks.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;
const FONT_SIZE: i64 = 12;
const LEADING: i64 = 14;

pub fn helvetica_font() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}

/// A simple font with explicit /Widths: `width` for every code in 32..=126.
pub fn widths_font(width: i64) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => "DocforgeSans",
        "FirstChar" => 32,
        "LastChar" => 126,
        "Widths" => vec![Object::Integer(width); 95],
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Operators drawing `text` at the top of the page, one line per `\n`.
pub fn text_operations(text: &str) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
    ];
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            ops.push(Operation::new("Td", vec![0.into(), (-LEADING).into()]));
        }
        ops.push(Operation::new("Tj", vec![Object::string_literal(line)]));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

fn encode(ops: Vec<Operation>) -> Vec<u8> {
    Content { operations: ops }
        .encode()
        .expect("fixture content encodes")
}

struct Builder {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    xobjects: Dictionary,
    kids: Vec<Object>,
}

impl Builder {
    fn new() -> Self {
        Self::with_font(helvetica_font())
    }

    fn with_font(font: Dictionary) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(font);
        Self {
            doc,
            pages_id,
            font_id,
            xobjects: Dictionary::new(),
            kids: Vec::new(),
        }
    }

    fn page(&mut self, ops: Vec<Operation>) -> ObjectId {
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encode(ops)));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        page_id
    }

    fn finish(mut self) -> Vec<u8> {
        let count = self.kids.len() as i64;
        let resources_id = self.doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => self.font_id },
            "XObject" => self.xobjects,
        });
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => Object::string_literal("Fixture"),
            "Author" => Object::string_literal("Docforge Fixtures"),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        let mut buf = Vec::new();
        self.doc.save_to(&mut buf).expect("fixture saves");
        buf
    }
}

/// One page per entry, each drawn in 12pt Helvetica from the top left.
pub fn text_document(pages: &[&str]) -> Vec<u8> {
    let mut builder = Builder::new();
    for text in pages {
        builder.page(text_operations(text));
    }
    builder.finish()
}

/// One page drawn by `ops`, with `font` as resource /F1.
pub fn operations_document(font: Dictionary, ops: Vec<Operation>) -> Vec<u8> {
    let mut builder = Builder::with_font(font);
    builder.page(ops);
    builder.finish()
}

/// Offset between a character and its code in [`type0_document`], so text
/// only decodes correctly through the ToUnicode map.
const TYPE0_CODE_OFFSET: u32 = 0x100;

/// One page showing `text` (printable ASCII) in a two-byte Type0 font whose
/// codes map back to Unicode through a ToUnicode CMap.
pub fn type0_document(text: &str) -> Vec<u8> {
    let mut builder = Builder::new();
    let cmap = format!(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n\
         1 beginbfrange\n<{:04X}> <{:04X}> <0020>\nendbfrange\n\
         endcmap\nend\nend\n",
        0x20 + TYPE0_CODE_OFFSET,
        0x7E + TYPE0_CODE_OFFSET,
    );
    let to_unicode = builder.doc.add_object(Stream::new(dictionary! {}, cmap.into_bytes()));
    let font = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "DocforgeCID",
        "Encoding" => "Identity-H",
        "ToUnicode" => to_unicode,
        "DescendantFonts" => vec![Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "DocforgeCID",
            "DW" => 600,
            "W" => vec![
                Object::Integer(i64::from(0x20 + TYPE0_CODE_OFFSET)),
                Object::Integer(i64::from(0x7E + TYPE0_CODE_OFFSET)),
                Object::Integer(600),
            ],
        })],
    };
    builder.doc.objects.insert(builder.font_id, Object::Dictionary(font));

    let codes: Vec<u8> = text
        .chars()
        .filter(|c| (' '..='~').contains(c))
        .flat_map(|c| ((c as u32 + TYPE0_CODE_OFFSET) as u16).to_be_bytes())
        .collect();
    builder.page(vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
        Operation::new("Td", vec![72.into(), 720.into()]),
        Operation::new("Tj", vec![Object::String(codes, StringFormat::Hexadecimal)]),
        Operation::new("ET", vec![]),
    ]);
    builder.finish()
}

/// `count` pages reading "Page N" plus a line unique to that page.
pub fn numbered_document(count: usize) -> Vec<u8> {
    let texts: Vec<String> = (1..=count)
        .map(|n| format!("Page {n}\nThis page talks about topic number {n} only."))
        .collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    text_document(&refs)
}

/// A 20x20 8-bit gray image XObject, white with a black diagonal.
pub fn gray_image() -> Stream {
    let mut pixels = vec![255u8; 400];
    for i in 0..20 {
        pixels[i * 20 + i] = 0;
    }
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 20,
            "Height" => 20,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        pixels,
    )
}

/// A caption line plus one image placed at (100, 400) scaled to 200x200.
pub fn image_document() -> Vec<u8> {
    let mut builder = Builder::new();
    let image_id = builder.doc.add_object(gray_image());
    builder.xobjects.set("Im0", image_id);

    let mut ops = text_operations("Scanned page");
    ops.extend([
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![200.into(), 0.into(), 0.into(), 200.into(), 100.into(), 400.into()],
        ),
        Operation::new("Do", vec!["Im0".into()]),
        Operation::new("Q", vec![]),
    ]);
    builder.page(ops);
    builder.finish()
}

/// Text drawn through a Form XObject, placed twice on the page.
pub fn form_document(text: &str) -> Vec<u8> {
    let mut builder = Builder::new();
    let font_id = builder.font_id;
    let form_id = builder.doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), 100.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        },
        encode(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("Td", vec![72.into(), 50.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]),
    ));
    builder.xobjects.set("Fm0", form_id);
    builder.page(vec![
        Operation::new("q", vec![]),
        Operation::new("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 600.into()]),
        Operation::new("Do", vec!["Fm0".into()]),
        Operation::new("Q", vec![]),
        Operation::new("q", vec![]),
        Operation::new("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 100.into()]),
        Operation::new("Do", vec!["Fm0".into()]),
        Operation::new("Q", vec![]),
    ]);
    builder.finish()
}

/// `bytes` with the cross-reference table, trailer and startxref cut off.
pub fn strip_xref(bytes: &[u8]) -> Vec<u8> {
    let cut = bytes
        .windows(5)
        .rposition(|w| w == b"\nxref")
        .map(|i| i + 1)
        .unwrap_or(bytes.len());
    let mut out = bytes[..cut].to_vec();
    out.extend_from_slice(b"%%EOF\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PdfDocument;

    #[test]
    fn fixtures_load() {
        assert_eq!(PdfDocument::load(&numbered_document(4)).unwrap().page_count(), 4);
        assert_eq!(PdfDocument::load(&image_document()).unwrap().page_count(), 1);
        assert_eq!(PdfDocument::load(&form_document("x")).unwrap().page_count(), 1);
        assert_eq!(PdfDocument::load(&type0_document("x")).unwrap().page_count(), 1);
    }

    #[test]
    fn type0_text_decodes_through_to_unicode() {
        let doc = PdfDocument::load(&type0_document("Ref 42")).unwrap();
        assert_eq!(doc.page_text(&doc.page(1).unwrap()).unwrap(), "Ref 42");
    }

    #[test]
    fn explicit_widths_position_glyphs() {
        let doc = PdfDocument::load(&operations_document(widths_font(1000), text_operations("ab"))).unwrap();
        let content = doc.content(&doc.page(1).unwrap()).unwrap();
        let advance = content.glyphs[1].origin.0 - content.glyphs[0].origin.0;
        assert!((advance - 12.0).abs() < 1e-3);
    }

    #[test]
    fn stripped_document_has_no_xref() {
        let stripped = strip_xref(&text_document(&["a"]));
        assert!(!stripped.windows(5).any(|w| w == b"\nxref"));
        assert!(stripped.ends_with(b"%%EOF\n"));
    }
}
