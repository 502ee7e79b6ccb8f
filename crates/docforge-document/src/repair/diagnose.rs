// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structural checks. Byte-level checks run on the raw file; object-level
// checks run on whatever lopdf could load, falling back to a document parsed
// through a synthesised xref table when the declared one is unusable.

use std::collections::{BTreeSet, HashSet};

use docforge_core::results::{IssueCode, RepairIssue};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument};

use super::rebuild::rebuild_document;
use crate::model::content::{decode_operations, page_content_bytes, page_resources};
use crate::model::resolve;

const SNIFF_WINDOW: usize = 1024;

/// How the diagnosed document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// lopdf parsed the file as it is.
    Declared,
    /// Parsed only after a linear object scan.
    Rescanned,
    /// Nothing could be parsed.
    Unreadable,
}

/// Issues found in a file, plus the document they were found in.
#[derive(Debug)]
pub struct Diagnosis {
    pub issues: Vec<RepairIssue>,
    pub source: Source,
    pub document: Option<Document>,
}

impl Diagnosis {
    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn last_position(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// The offset named by the last `startxref`, if it points at a table or an
/// xref stream.
fn declared_xref_valid(bytes: &[u8]) -> bool {
    let Some(at) = last_position(bytes, b"startxref") else {
        return false;
    };
    let digits: String = bytes[at + b"startxref".len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|b| *b as char)
        .collect();
    let Ok(offset) = digits.parse::<usize>() else {
        return false;
    };
    let Some(target) = bytes.get(offset..) else {
        return false;
    };
    let head = &target[..target.len().min(64)];
    head.starts_with(b"xref") || (head.first().is_some_and(u8::is_ascii_digit) && contains(head, b"obj"))
}

fn byte_checks(bytes: &[u8], issues: &mut Vec<RepairIssue>) {
    let head = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    if !contains(head, b"%PDF-") {
        issues.push(RepairIssue::new(IssueCode::MissingHeader, true));
    }
    let tail = &bytes[bytes.len().saturating_sub(SNIFF_WINDOW)..];
    if !contains(tail, b"%%EOF") {
        issues.push(RepairIssue::new(IssueCode::MissingEof, true));
    }
    if !contains(bytes, b"trailer") && !contains(bytes, b"/XRef") {
        issues.push(RepairIssue::new(IssueCode::MissingTrailer, true));
    }
    if !declared_xref_valid(bytes) {
        issues.push(RepairIssue::new(IssueCode::InvalidXref, true));
    }
}

fn is_type(dict: &Dictionary, name: &[u8]) -> bool {
    matches!(dict.get(b"Type"), Ok(Object::Name(n)) if n == name)
}

/// Every page object in the file, reachable or not.
pub fn page_objects(doc: &Document) -> BTreeSet<ObjectId> {
    doc.objects
        .iter()
        .filter(|(_, obj)| matches!(obj, Object::Dictionary(d) if is_type(d, b"Page")))
        .map(|(id, _)| *id)
        .collect()
}

fn collect_references(obj: &Object, out: &mut Vec<ObjectId>) {
    match obj {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => items.iter().for_each(|o| collect_references(o, out)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, o)| collect_references(o, out)),
        Object::Stream(stream) => stream.dict.iter().for_each(|(_, o)| collect_references(o, out)),
        _ => {}
    }
}

/// Objects holding a reference to something that does not exist.
pub fn dangling_referrers(doc: &Document) -> Vec<(ObjectId, ObjectId)> {
    let mut out = Vec::new();
    for (id, obj) in &doc.objects {
        let mut refs = Vec::new();
        collect_references(obj, &mut refs);
        let missing: BTreeSet<ObjectId> = refs
            .into_iter()
            .filter(|r| !doc.objects.contains_key(r))
            .collect();
        out.extend(missing.into_iter().map(|target| (*id, target)));
    }
    out
}

fn is_flate(dict: &Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"FlateDecode",
        Ok(Object::Array(filters)) => filters
            .iter()
            .all(|f| matches!(f, Object::Name(n) if n == b"FlateDecode")),
        _ => false,
    }
}

/// Flate streams that do not inflate.
pub fn corrupt_streams(doc: &Document) -> Vec<ObjectId> {
    doc.objects
        .iter()
        .filter_map(|(id, obj)| match obj {
            Object::Stream(stream) if is_flate(&stream.dict) => {
                stream.decompressed_content().is_err().then_some(*id)
            }
            _ => None,
        })
        .collect()
}

/// Font resource names of a page that do not resolve to a dictionary.
pub fn unresolved_fonts(doc: &Document, page_id: ObjectId) -> Vec<Vec<u8>> {
    let resources = page_resources(doc, page_id);
    let Ok(fonts) = resources.get(b"Font").map(|f| resolve(doc, f)) else {
        return Vec::new();
    };
    let Object::Dictionary(fonts) = fonts else {
        return Vec::new();
    };
    fonts
        .iter()
        .filter(|(_, font)| !matches!(resolve(doc, font), Object::Dictionary(_)))
        .map(|(name, _)| name.clone())
        .collect()
}

fn object_checks(doc: &Document, issues: &mut Vec<RepairIssue>) {
    if doc.trailer.get(b"Encrypt").is_ok() {
        issues.push(RepairIssue::new(IssueCode::Encrypted, false));
    }

    let catalog = doc.catalog().ok();
    if catalog.is_none() {
        issues.push(RepairIssue::new(IssueCode::MissingCatalog, true));
    }
    let pages = doc.get_pages();
    let all_pages = page_objects(doc);
    if catalog.is_some() && pages.is_empty() {
        issues.push(
            RepairIssue::new(IssueCode::BrokenPageTree, !all_pages.is_empty())
                .with_detail("no page reachable from the catalog"),
        );
    }

    let reachable: HashSet<ObjectId> = pages.values().copied().collect();
    for orphan in all_pages.iter().filter(|id| !reachable.contains(id)) {
        issues.push(RepairIssue::new(IssueCode::OrphanedPage, true).with_object(orphan.0));
    }

    let mut referrers = BTreeSet::new();
    for (referrer, target) in dangling_referrers(doc) {
        if referrers.insert(referrer) {
            issues.push(
                RepairIssue::new(IssueCode::DanglingReference, true)
                    .with_object(referrer.0)
                    .with_detail(format!("{} {} R", target.0, target.1)),
            );
        }
    }

    for id in corrupt_streams(doc) {
        issues.push(RepairIssue::new(IssueCode::CorruptStream, true).with_object(id.0));
    }

    for (number, page_id) in &pages {
        for name in unresolved_fonts(doc, *page_id) {
            issues.push(
                RepairIssue::new(IssueCode::MissingFont, true)
                    .with_page(*number)
                    .with_detail(String::from_utf8_lossy(&name)),
            );
        }
        let undecodable = page_content_bytes(doc, *page_id)
            .and_then(|data| decode_operations(&data))
            .is_err();
        if undecodable {
            issues.push(
                RepairIssue::new(IssueCode::MalformedObject, true)
                    .with_page(*number)
                    .with_object(page_id.0)
                    .with_detail("content stream does not parse"),
            );
        }
    }

    let has_info = doc
        .trailer
        .get(b"Info")
        .map(|info| matches!(resolve(doc, info), Object::Dictionary(_)))
        .unwrap_or(false);
    if !has_info {
        issues.push(RepairIssue::new(IssueCode::MissingInfo, true));
    }
}

/// Diagnose `bytes`. Never fails: an unreadable file is a diagnosis too.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn diagnose(bytes: &[u8]) -> Diagnosis {
    let mut issues = Vec::new();
    byte_checks(bytes, &mut issues);

    let (document, source) = match Document::load_mem(bytes) {
        Ok(doc) => (Some(doc), Source::Declared),
        Err(e) => {
            debug!(error = %e, "declared structure unreadable, scanning objects");
            match rebuild_document(bytes, false) {
                Some((doc, _)) => (Some(doc), Source::Rescanned),
                None => (None, Source::Unreadable),
            }
        }
    };

    if source != Source::Declared && !issues.iter().any(|i| i.code == IssueCode::InvalidXref) {
        issues.push(
            RepairIssue::new(IssueCode::InvalidXref, true).with_detail("declared table does not load"),
        );
    }

    match &document {
        Some(doc) => object_checks(doc, &mut issues),
        None => issues.push(
            RepairIssue::new(IssueCode::BrokenPageTree, false).with_detail("no objects could be recovered"),
        ),
    }

    debug!(issues = issues.len(), ?source, "diagnosis complete");
    Diagnosis {
        issues,
        source,
        document,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn codes(d: &Diagnosis) -> Vec<IssueCode> {
        d.issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn healthy_document_has_no_issues() {
        let d = diagnose(&fixtures::numbered_document(2));
        assert_eq!(codes(&d), vec![]);
        assert_eq!(d.source, Source::Declared);
    }

    #[test]
    fn missing_xref_is_diagnosed_from_a_rescan() {
        let d = diagnose(&fixtures::strip_xref(&fixtures::text_document(&["a"])));
        assert!(d.has(IssueCode::InvalidXref));
        assert!(d.has(IssueCode::MissingTrailer));
        assert!(!d.has(IssueCode::MissingEof));
        assert_eq!(d.source, Source::Rescanned);
        assert_eq!(d.document.unwrap().get_pages().len(), 1);
    }

    #[test]
    fn garbage_is_unreadable() {
        let d = diagnose(b"not a pdf at all");
        assert_eq!(d.source, Source::Unreadable);
        assert!(d.has(IssueCode::MissingHeader));
        assert!(d.has(IssueCode::BrokenPageTree));
        assert!(d.issues.iter().any(|i| !i.fixable));
    }

    #[test]
    fn orphans_dangling_references_and_bad_streams() {
        let mut doc = Document::load_mem(&fixtures::numbered_document(3)).unwrap();
        let pages = doc.get_pages();
        let orphan = pages[&3];
        let pages_id = doc.catalog().unwrap().get(b"Pages").unwrap().as_reference().unwrap();
        {
            let root = doc.get_dictionary_mut(pages_id).unwrap();
            let kids: Vec<Object> = root
                .get(b"Kids")
                .unwrap()
                .as_array()
                .unwrap()
                .iter()
                .filter(|k| k.as_reference().ok() != Some(orphan))
                .cloned()
                .collect();
            root.set("Kids", kids);
            root.set("Count", 2i64);
        }
        let bad = doc.add_object(lopdf::Stream::new(
            lopdf::dictionary! { "Filter" => "FlateDecode" },
            b"definitely not zlib".to_vec(),
        ));
        doc.get_dictionary_mut(pages[&1])
            .unwrap()
            .set("Thumb", Object::Reference((9999, 0)));
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let d = diagnose(&bytes);
        let orphaned: Vec<Option<u32>> = d
            .issues
            .iter()
            .filter(|i| i.code == IssueCode::OrphanedPage)
            .map(|i| i.object)
            .collect();
        assert_eq!(orphaned, vec![Some(orphan.0)]);
        assert!(d.issues.iter().any(|i| i.code == IssueCode::CorruptStream && i.object == Some(bad.0)));
        assert!(d.issues.iter().any(|i| i.code == IssueCode::DanglingReference && i.object == Some(pages[&1].0)));
    }
}
