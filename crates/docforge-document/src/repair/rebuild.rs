// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Linear object scan and cross-reference synthesis.
//
// When the declared xref table is missing or wrong, the file is walked from
// the start looking for `N G obj ... endobj` bodies. A fresh table pointing
// at the last definition of each object number is appended together with a
// trailer, and the result is handed back to lopdf to parse.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::ops::Range;

use lazy_static::lazy_static;
use lopdf::{Document, ObjectId};
use regex::bytes::Regex;
use tracing::{debug, instrument};

lazy_static! {
    static ref OBJECT_HEADER: Regex =
        Regex::new(r"\b(\d{1,10})[ \t\r\n]+(\d{1,5})[ \t\r\n]+obj\b").expect("static regex");
    static ref CATALOG_TYPE: Regex = Regex::new(r"/Type\s*/Catalog\b").expect("static regex");
    static ref INFO_KEYS: Regex =
        Regex::new(r"/(?:Producer|Creator|Title|Author|CreationDate|ModDate)\b").expect("static regex");
    static ref TYPED: Regex = Regex::new(r"/Type\s*/").expect("static regex");
}

/// One `obj ... endobj` body found by the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedObject {
    pub id: ObjectId,
    /// Offset of the object number.
    pub offset: usize,
    /// Bytes between `obj` and `endobj`, or to the next header when the
    /// object is unterminated.
    pub body: Range<usize>,
    /// Whether the body passed minimal validation.
    pub well_formed: bool,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Dictionary delimiters must balance outside stream data.
fn delimiters_balance(body: &[u8]) -> bool {
    let head = match find(body, b"stream", 0) {
        Some(at) => &body[..at],
        None => body,
    };
    let mut depth: i32 = 0;
    let mut i = 0;
    while i + 1 < head.len() {
        match &head[i..i + 2] {
            b"<<" => {
                depth += 1;
                i += 2;
            }
            b">>" => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    depth == 0
}

/// Walk `bytes` and collect every object definition, in file order. Stream
/// data is skipped so binary content cannot be mistaken for a header.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn scan_objects(bytes: &[u8]) -> Vec<ScannedObject> {
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(cap) = OBJECT_HEADER.captures_at(bytes, pos) {
        let (Some(whole), Some(num), Some(generation)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            break;
        };
        let parsed = std::str::from_utf8(num.as_bytes())
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .zip(
                std::str::from_utf8(generation.as_bytes())
                    .ok()
                    .and_then(|s| s.parse::<u16>().ok()),
            );
        let start = whole.end();
        let Some(id) = parsed else {
            pos = start;
            continue;
        };

        let next_header = OBJECT_HEADER
            .find_at(bytes, start)
            .map_or(bytes.len(), |m| m.start());
        let stream_at = find(bytes, b"stream", start).filter(|at| *at < next_header);
        let endobj = match stream_at {
            Some(at) => find(bytes, b"endstream", at)
                .and_then(|e| find(bytes, b"endobj", e + b"endstream".len())),
            None => find(bytes, b"endobj", start).filter(|e| *e < next_header),
        };

        let (body, well_formed, resume) = match endobj {
            Some(end) => {
                let body = start..end;
                let ok = !bytes[body.clone()].iter().all(u8::is_ascii_whitespace)
                    && delimiters_balance(&bytes[body.clone()]);
                (body, ok, end + b"endobj".len())
            }
            None => (start..next_header, false, next_header.max(start)),
        };
        found.push(ScannedObject {
            id,
            offset: num.start(),
            body,
            well_formed,
        });
        pos = resume;
    }
    debug!(objects = found.len(), "object scan complete");
    found
}

/// What the rebuild kept and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub recovered: usize,
    pub discarded: Vec<ObjectId>,
}

/// Append a synthesised xref table and trailer to `bytes` covering the last
/// definition of every scanned object. Malformed objects are left out when
/// `discard_malformed` is set.
pub fn synthesize_xref(bytes: &[u8], objects: &[ScannedObject], discard_malformed: bool) -> (Vec<u8>, RebuildStats) {
    let mut latest: BTreeMap<u32, &ScannedObject> = BTreeMap::new();
    for object in objects {
        latest.insert(object.id.0, object);
    }

    let mut stats = RebuildStats::default();
    let mut kept: BTreeMap<u32, &ScannedObject> = BTreeMap::new();
    for (number, object) in latest {
        if !object.well_formed && discard_malformed {
            stats.discarded.push(object.id);
        } else {
            kept.insert(number, object);
        }
    }
    stats.recovered = kept.len();

    let body = |o: &ScannedObject| &bytes[o.body.clone()];
    let root = kept
        .values()
        .rev()
        .find(|o| CATALOG_TYPE.is_match(body(o)))
        .map(|o| o.id);
    let info = kept
        .values()
        .rev()
        .find(|o| !TYPED.is_match(body(o)) && INFO_KEYS.is_match(body(o)) && !body(o).windows(6).any(|w| w == b"stream"))
        .map(|o| o.id);

    let size = kept.keys().next_back().map_or(1, |max| max + 1);
    let mut out = bytes.to_vec();
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    let xref_offset = out.len();

    let mut table = format!("xref\n0 {size}\n");
    for number in 0..size {
        match kept.get(&number) {
            Some(o) => {
                let _ = write!(table, "{:010} {:05} n\r\n", o.offset, o.id.1);
            }
            None if number == 0 => table.push_str("0000000000 65535 f\r\n"),
            None => table.push_str("0000000000 00000 f\r\n"),
        }
    }
    table.push_str(&format!("trailer\n<< /Size {size}"));
    if let Some((num, generation)) = root {
        let _ = write!(table, " /Root {num} {generation} R");
    }
    if let Some((num, generation)) = info {
        let _ = write!(table, " /Info {num} {generation} R");
    }
    let _ = write!(table, " >>\nstartxref\n{xref_offset}\n%%EOF\n");
    out.extend_from_slice(table.as_bytes());

    debug!(
        kept = stats.recovered,
        discarded = stats.discarded.len(),
        has_root = root.is_some(),
        "xref synthesised"
    );
    (out, stats)
}

/// Scan `bytes`, synthesise a table and parse the result.
pub fn rebuild_document(bytes: &[u8], discard_malformed: bool) -> Option<(Document, RebuildStats)> {
    let objects = scan_objects(bytes);
    if objects.is_empty() {
        return None;
    }
    let (rebuilt, stats) = synthesize_xref(bytes, &objects, discard_malformed);
    match Document::load_mem(&rebuilt) {
        Ok(doc) => Some((doc, stats)),
        Err(e) => {
            debug!(error = %e, "rebuilt file still unparseable");
            None
        }
    }
}
