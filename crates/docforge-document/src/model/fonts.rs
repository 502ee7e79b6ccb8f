// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Font metrics and character decoding for the content interpreter.
//
// Glyph positions come from /Widths (simple fonts), /W (CID fonts) or the
// built-in metrics of the standard 14 fonts; text comes from /ToUnicode when
// present and from the single-byte code otherwise.

use std::collections::HashMap;
use std::ops::Range;

use lazy_static::lazy_static;
use lopdf::{Dictionary, Document, Object, dictionary};
use regex::bytes::Regex;
use tracing::debug;

use super::matrix::number;
use super::resolve;

lazy_static! {
    static ref CMAP_TOKEN: Regex = Regex::new(r"<([0-9A-Fa-f\s]*)>|\[|\]").expect("static regex");
}

/// Helvetica advance widths for codes 32..=126, in 1/1000 text space units.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

/// Font dictionary for standard Helvetica, for text the engine draws itself.
pub fn helvetica() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}

/// `text` as single-byte codes for a Helvetica resource. Characters outside
/// printable ASCII become `?`.
pub fn encode_ascii(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (' '..='~').contains(&c) { c as u8 } else { b'?' })
        .collect()
}

/// Width of `encode_ascii(text)` set in Helvetica at `size`.
pub fn helvetica_width(text: &str, size: f32) -> f32 {
    let units: f32 = encode_ascii(text)
        .into_iter()
        .map(|b| f32::from(HELVETICA_WIDTHS[(b - 32) as usize]))
        .sum();
    units * size / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StandardMetrics {
    Proportional,
    Monospace,
}

/// Everything the interpreter needs to place and decode glyphs of one font.
#[derive(Debug, Clone)]
pub struct FontInfo {
    two_byte: bool,
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    standard: Option<StandardMetrics>,
    to_unicode: HashMap<u32, String>,
}

impl Default for FontInfo {
    /// Helvetica metrics; used when a Tf names a font the resources lack.
    fn default() -> Self {
        Self {
            two_byte: false,
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: 500.0,
            standard: Some(StandardMetrics::Proportional),
            to_unicode: HashMap::new(),
        }
    }
}

impl FontInfo {
    pub fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let subtype = name_of(dict.get(b"Subtype").ok());
        let base_font = name_of(dict.get(b"BaseFont").ok()).unwrap_or_default();
        let mut info = FontInfo {
            standard: None,
            ..FontInfo::default()
        };

        if subtype.as_deref() == Some("Type0") {
            info.two_byte = true;
            info.default_width = 1000.0;
            if let Some(Object::Array(descendants)) = dict.get(b"DescendantFonts").ok().map(|o| resolve(doc, o))
                && let Some(Object::Dictionary(cid)) = descendants.first().map(|o| resolve(doc, o))
            {
                if let Some(dw) = cid.get(b"DW").ok().and_then(number) {
                    info.default_width = dw;
                }
                if let Some(Object::Array(w)) = cid.get(b"W").ok().map(|o| resolve(doc, o)) {
                    info.cid_widths = parse_cid_widths(doc, w);
                }
            }
        } else {
            info.first_char = dict
                .get(b"FirstChar")
                .ok()
                .and_then(number)
                .map(|v| v as u32)
                .unwrap_or(0);
            if let Some(Object::Array(widths)) = dict.get(b"Widths").ok().map(|o| resolve(doc, o)) {
                info.widths = widths
                    .iter()
                    .map(|w| number(resolve(doc, w)).unwrap_or(0.0))
                    .collect();
            }
            if let Some(Object::Dictionary(descriptor)) =
                dict.get(b"FontDescriptor").ok().map(|o| resolve(doc, o))
                && let Some(missing) = descriptor.get(b"MissingWidth").ok().and_then(number)
            {
                info.default_width = missing;
            }
            if info.widths.is_empty() {
                info.standard = Some(if base_font.contains("Courier") {
                    StandardMetrics::Monospace
                } else {
                    StandardMetrics::Proportional
                });
            }
        }

        if let Some(Object::Stream(stream)) = dict.get(b"ToUnicode").ok().map(|o| resolve(doc, o)) {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            info.to_unicode = parse_to_unicode(&data);
            debug!(entries = info.to_unicode.len(), %base_font, "ToUnicode map loaded");
        }
        info
    }

    /// Split a string operand into character codes with their byte ranges.
    pub fn codes(&self, bytes: &[u8]) -> Vec<(u32, Range<usize>)> {
        if self.two_byte {
            bytes
                .chunks(2)
                .enumerate()
                .map(|(i, chunk)| {
                    let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                    (code, i * 2..i * 2 + chunk.len())
                })
                .collect()
        } else {
            bytes
                .iter()
                .enumerate()
                .map(|(i, b)| (*b as u32, i..i + 1))
                .collect()
        }
    }

    /// Whether word spacing applies: only to the single-byte code 32.
    pub fn is_word_space(&self, code: u32, len: usize) -> bool {
        code == 32 && len == 1
    }

    /// Advance width in 1/1000 text space units.
    pub fn width(&self, code: u32) -> f32 {
        if self.two_byte {
            return self.cid_widths.get(&code).copied().unwrap_or(self.default_width);
        }
        if code >= self.first_char
            && let Some(w) = self.widths.get((code - self.first_char) as usize)
        {
            return *w;
        }
        match self.standard {
            Some(StandardMetrics::Monospace) => 600.0,
            Some(StandardMetrics::Proportional) if (32..=126).contains(&code) => {
                HELVETICA_WIDTHS[(code - 32) as usize] as f32
            }
            _ => self.default_width,
        }
    }

    /// Unicode text for one character code.
    pub fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.get(&code) {
            return text.clone();
        }
        if self.two_byte {
            char::from_u32(code).unwrap_or('\u{FFFD}').to_string()
        } else {
            win_ansi(code as u8).to_string()
        }
    }
}

fn name_of(obj: Option<&Object>) -> Option<String> {
    match obj {
        Some(Object::Name(n)) => Some(String::from_utf8_lossy(n).into_owned()),
        _ => None,
    }
}

/// WinAnsi differs from Latin-1 only in 0x80–0x9F.
fn win_ansi(byte: u8) -> char {
    match byte {
        0x80 => '€',
        0x85 => '…',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x95 => '•',
        0x96 => '–',
        0x97 => '—',
        b => b as char,
    }
}

/// `/W [c [w1 w2 ...] cfirst clast w ...]`
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = number(resolve(doc, &w[i])) else {
            break;
        };
        match w.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    if let Some(width) = number(resolve(doc, width)) {
                        widths.insert(first as u32 + offset as u32, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (number(last), w.get(i + 2).and_then(number)) else {
                    break;
                };
                for code in first as u32..=last as u32 {
                    widths.insert(code, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

fn hex_value(token: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = token
        .iter()
        .filter(|b| b.is_ascii_hexdigit())
        .copied()
        .collect();
    digits
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
            let lo = pair
                .get(1)
                .and_then(|b| (*b as char).to_digit(16))
                .unwrap_or(0) as u8;
            (hi << 4) | lo
        })
        .collect()
}

fn code_of(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| ((c[0] as u16) << 8) | c.get(1).copied().unwrap_or(0) as u16)
        .collect();
    String::from_utf16_lossy(&units)
}

#[derive(Debug)]
enum CmapToken {
    Hex(Vec<u8>),
    Open,
    Close,
}

fn section<'a>(data: &'a [u8], begin: &[u8], end: &[u8]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut rest = data;
    while let Some(start) = find(rest, begin) {
        let after = &rest[start + begin.len()..];
        let Some(stop) = find(after, end) else {
            break;
        };
        out.push(&after[..stop]);
        rest = &after[stop + end.len()..];
    }
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn tokens(body: &[u8]) -> Vec<CmapToken> {
    CMAP_TOKEN
        .captures_iter(body)
        .map(|cap| match cap.get(1) {
            Some(hex) => CmapToken::Hex(hex_value(hex.as_bytes())),
            None if &cap[0] == b"[" => CmapToken::Open,
            None => CmapToken::Close,
        })
        .collect()
}

/// Parse the bfchar and bfrange sections of a ToUnicode CMap.
pub fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let mut map = HashMap::new();

    for body in section(data, b"beginbfchar", b"endbfchar") {
        let toks = tokens(body);
        for pair in toks.chunks(2) {
            if let [CmapToken::Hex(src), CmapToken::Hex(dst)] = pair {
                map.insert(code_of(src), utf16_text(dst));
            }
        }
    }

    for body in section(data, b"beginbfrange", b"endbfrange") {
        let toks = tokens(body);
        let mut i = 0;
        while i + 2 < toks.len() {
            let (CmapToken::Hex(lo), CmapToken::Hex(hi)) = (&toks[i], &toks[i + 1]) else {
                i += 1;
                continue;
            };
            let (lo, hi) = (code_of(lo), code_of(hi));
            match &toks[i + 2] {
                CmapToken::Hex(dst) => {
                    let base: Vec<u16> = utf16_text(dst).encode_utf16().collect();
                    for (offset, code) in (lo..=hi).enumerate() {
                        let mut units = base.clone();
                        if let Some(last) = units.last_mut() {
                            *last = last.wrapping_add(offset as u16);
                        }
                        map.insert(code, String::from_utf16_lossy(&units));
                    }
                    i += 3;
                }
                CmapToken::Open => {
                    let mut j = i + 3;
                    let mut code = lo;
                    while j < toks.len() {
                        match &toks[j] {
                            CmapToken::Hex(dst) if code <= hi => {
                                map.insert(code, utf16_text(dst));
                                code += 1;
                            }
                            CmapToken::Close => break,
                            _ => {}
                        }
                        j += 1;
                    }
                    i = j + 1;
                }
                CmapToken::Close => i += 3,
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_text_is_measured_in_helvetica() {
        assert_eq!(encode_ascii("Pagé 1"), b"Pag? 1".to_vec());
        assert!((helvetica_width("ii", 10.0) - 4.44).abs() < 1e-3);
    }

    #[test]
    fn helvetica_fallback_widths() {
        let font = FontInfo::default();
        assert_eq!(font.width(b' ' as u32), 278.0);
        assert_eq!(font.width(b'W' as u32), 944.0);
        assert_eq!(font.decode(b'A' as u32), "A");
    }

    #[test]
    fn two_byte_codes_split_in_pairs() {
        let font = FontInfo {
            two_byte: true,
            ..FontInfo::default()
        };
        let codes = font.codes(&[0x00, 0x41, 0x00, 0x42]);
        assert_eq!(codes, vec![(0x41, 0..2), (0x42, 2..4)]);
    }

    #[test]
    fn to_unicode_bfchar_and_bfrange() {
        let cmap = b"/CIDInit /ProcSet findresource begin
            2 beginbfchar
            <0003> <0020>
            <0024> <0041>
            endbfchar
            1 beginbfrange
            <0044> <0046> <0061>
            endbfrange
            1 beginbfrange
            <0050> <0051> [<0058> <0059>]
            endbfrange";
        let map = parse_to_unicode(cmap);
        assert_eq!(map[&0x03], " ");
        assert_eq!(map[&0x24], "A");
        assert_eq!(map[&0x44], "a");
        assert_eq!(map[&0x46], "c");
        assert_eq!(map[&0x51], "Y");
    }
}
