// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structural repair engine.
//
// A document moves Unknown -> Diagnosed -> Repaired | PartiallyRepaired |
// Unrepairable. Each level enables a superset of the previous one's fixes:
//
//   basic       re-serialise what the declared structure loads (fresh xref)
//   standard    + linear object scan, orphan relinking, reference and font
//                 fixes, Info synthesis
//   aggressive  + drop objects and streams that fail minimal validation
//   recovery    aggressive, keeps only reachable pages and skips the
//               post-repair validation gate

pub mod diagnose;
pub mod rebuild;

use std::collections::{BTreeSet, HashSet};

use docforge_core::error::{ForgeError, Result};
use docforge_core::results::{IssueCode, RepairIssue, RepairReport, RepairState, health_score};
use docforge_core::settings::RepairLevel;
use docforge_core::CancelToken;
use docforge_security::NewAuditEntry;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument, warn};

use self::diagnose::{
    Diagnosis, Source, corrupt_streams, dangling_referrers, diagnose, page_objects, unresolved_fonts,
};
use self::rebuild::rebuild_document;
use crate::model::PdfDocument;

/// Everything a finished repair hands back to the job layer.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub bytes: Vec<u8>,
    pub report: RepairReport,
    pub audit: Vec<NewAuditEntry>,
}

/// Fixes actually applied, by issue code.
#[derive(Debug, Default)]
struct Applied {
    codes: HashSet<IssueCode>,
    discarded: Vec<ObjectId>,
}

impl Applied {
    fn mark(&mut self, code: IssueCode) {
        self.codes.insert(code);
    }

    fn covers(&self, code: IssueCode) -> bool {
        self.codes.contains(&code)
    }
}

fn root_pages(doc: &Document) -> Option<ObjectId> {
    doc.catalog()
        .ok()
        .and_then(|c| c.get(b"Pages").ok())
        .and_then(|p| p.as_reference().ok())
        .filter(|id| doc.get_dictionary(*id).is_ok())
}

/// Hang every unreachable page under the root page node, creating the node
/// and the catalog when they are missing.
fn relink_orphans(doc: &mut Document) -> usize {
    let reachable: BTreeSet<ObjectId> = doc.get_pages().values().copied().collect();
    let orphans: Vec<ObjectId> = page_objects(doc).difference(&reachable).copied().collect();
    if orphans.is_empty() {
        return 0;
    }

    let pages_id = match root_pages(doc) {
        Some(id) => id,
        None => {
            let pages_id = doc.add_object(dictionary! {
                "Type" => "Pages",
                "Kids" => Vec::<Object>::new(),
                "Count" => 0i64,
            });
            match doc.catalog_mut() {
                Ok(catalog) => catalog.set("Pages", pages_id),
                Err(_) => {
                    let catalog_id = doc.add_object(dictionary! {
                        "Type" => "Catalog",
                        "Pages" => pages_id,
                    });
                    doc.trailer.set("Root", catalog_id);
                }
            }
            pages_id
        }
    };

    for orphan in &orphans {
        if let Ok(page) = doc.get_dictionary_mut(*orphan) {
            page.set("Parent", pages_id);
        }
    }
    let reachable_count = reachable.len() as i64;
    if let Ok(node) = doc.get_dictionary_mut(pages_id) {
        let mut kids = match node.get(b"Kids") {
            Ok(Object::Array(kids)) => kids.clone(),
            _ => Vec::new(),
        };
        kids.extend(orphans.iter().map(|id| Object::Reference(*id)));
        node.set("Kids", kids);
        let count = node.get(b"Count").ok().and_then(|c| c.as_i64().ok()).unwrap_or(reachable_count);
        node.set("Count", count + orphans.len() as i64);
    }
    debug!(relinked = orphans.len(), "orphaned pages relinked");
    orphans.len()
}

fn strip_dangling(obj: &mut Object, missing: &BTreeSet<ObjectId>) {
    let is_missing = |o: &Object| matches!(o, Object::Reference(id) if missing.contains(id));
    match obj {
        Object::Array(items) => {
            items.retain(|o| !is_missing(o));
            items.iter_mut().for_each(|o| strip_dangling(o, missing));
        }
        Object::Dictionary(dict) => strip_dangling_dict(dict, missing),
        Object::Stream(stream) => strip_dangling_dict(&mut stream.dict, missing),
        _ => {}
    }
}

fn strip_dangling_dict(dict: &mut Dictionary, missing: &BTreeSet<ObjectId>) {
    let dead: Vec<Vec<u8>> = dict
        .iter()
        .filter(|(_, o)| matches!(o, Object::Reference(id) if missing.contains(id)))
        .map(|(k, _)| k.clone())
        .collect();
    for k in dead {
        dict.remove(&k);
    }
    for (_, value) in dict.iter_mut() {
        strip_dangling(value, missing);
    }
}

/// Remove references to objects that do not exist.
fn fix_dangling(doc: &mut Document) -> usize {
    let missing: BTreeSet<ObjectId> = dangling_referrers(doc).into_iter().map(|(_, t)| t).collect();
    if missing.is_empty() {
        return 0;
    }
    for obj in doc.objects.values_mut() {
        strip_dangling(obj, &missing);
    }
    missing.len()
}

/// Point unresolvable font names at a standard Helvetica.
fn fix_fonts(doc: &mut Document) -> usize {
    let mut fixed = 0;
    let pages: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    for page_id in pages {
        let names = unresolved_fonts(doc, page_id);
        if names.is_empty() {
            continue;
        }
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let mut resources = crate::model::content::page_resources(doc, page_id);
        let mut fonts = match resources.get(b"Font").map(|f| crate::model::resolve(doc, f)) {
            Ok(Object::Dictionary(d)) => d.clone(),
            _ => Dictionary::new(),
        };
        for name in names {
            fonts.set(name, font_id);
            fixed += 1;
        }
        resources.set("Font", fonts);
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            page.set("Resources", resources);
        }
    }
    fixed
}

/// Replace streams that do not inflate with empty ones.
fn discard_corrupt_streams(doc: &mut Document) -> Vec<ObjectId> {
    let corrupt = corrupt_streams(doc);
    for id in &corrupt {
        if let Some(Object::Stream(stream)) = doc.objects.get_mut(id) {
            let mut dict = stream.dict.clone();
            dict.remove(b"Filter");
            dict.remove(b"DecodeParms");
            *stream = Stream::new(dict, Vec::new());
        }
    }
    corrupt
}

/// Pages whose content does not parse lose that content.
fn discard_unparseable_content(doc: &mut Document) -> Vec<ObjectId> {
    let broken: Vec<ObjectId> = doc
        .get_pages()
        .values()
        .copied()
        .filter(|id| {
            crate::model::content::page_content_bytes(doc, *id)
                .and_then(|data| crate::model::content::decode_operations(&data))
                .is_err()
        })
        .collect();
    for id in &broken {
        let empty = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        if let Ok(page) = doc.get_dictionary_mut(*id) {
            page.set("Contents", empty);
        }
    }
    broken
}

fn ensure_info(doc: &mut Document) -> bool {
    let present = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|o| o.as_reference().ok())
        .is_some_and(|id| doc.get_dictionary(id).is_ok())
        || matches!(doc.trailer.get(b"Info"), Ok(Object::Dictionary(_)));
    if present {
        return false;
    }
    let info = doc.add_object(dictionary! {
        "Producer" => Object::string_literal("docforge repair"),
    });
    doc.trailer.set("Info", info);
    true
}

/// Whether `code` is something `level` knows how to fix.
fn level_fixes(level: RepairLevel, code: IssueCode) -> bool {
    match code {
        IssueCode::MissingHeader | IssueCode::MissingEof | IssueCode::MissingTrailer | IssueCode::InvalidXref => true,
        IssueCode::MissingCatalog | IssueCode::BrokenPageTree | IssueCode::OrphanedPage => {
            level.recovers_content() && level.validates()
        }
        IssueCode::DanglingReference | IssueCode::MissingFont | IssueCode::MissingInfo => {
            level.recovers_content()
        }
        IssueCode::CorruptStream | IssueCode::MalformedObject => level.discards_malformed(),
        IssueCode::Encrypted => false,
    }
}

/// Obtain a document to work on at `level`: the declared structure, or a
/// rescan when the level allows one.
fn working_document(
    bytes: &[u8],
    diagnosis: Diagnosis,
    level: RepairLevel,
    applied: &mut Applied,
) -> Option<(Document, usize)> {
    match diagnosis.source {
        Source::Declared => {
            let doc = diagnosis.document?;
            let count = doc.objects.len();
            Some((doc, count))
        }
        Source::Rescanned | Source::Unreadable if level.rescans_objects() => {
            let (doc, stats) = rebuild_document(bytes, level.discards_malformed())?;
            applied.discarded.extend(stats.discarded.iter().copied());
            if !stats.discarded.is_empty() {
                applied.mark(IssueCode::MalformedObject);
            }
            Some((doc, stats.recovered))
        }
        _ => None,
    }
}

/// Diagnose and repair `bytes` at `level`.
#[instrument(skip(bytes, cancel), fields(bytes = bytes.len()))]
pub fn repair(bytes: &[u8], level: RepairLevel, cancel: &CancelToken) -> Result<RepairOutcome> {
    let mut diagnosis = diagnose(bytes);
    let mut issues = std::mem::take(&mut diagnosis.issues);
    info!(issues = issues.len(), source = ?diagnosis.source, "document diagnosed");
    cancel.check()?;

    if issues.iter().any(|i| i.code == IssueCode::Encrypted) {
        warn!("encrypted document left untouched");
        let report = build_report(RepairState::PartiallyRepaired, level, issues, 0, 0, 0);
        return Ok(RepairOutcome {
            bytes: bytes.to_vec(),
            report,
            audit: Vec::new(),
        });
    }

    let mut applied = Applied::default();
    let Some((mut doc, objects_recovered)) = working_document(bytes, diagnosis, level, &mut applied) else {
        return Err(ForgeError::Unrepairable(format!(
            "no readable structure at {level:?} level"
        )));
    };
    cancel.check()?;

    if level.recovers_content() {
        if level.validates() && relink_orphans(&mut doc) > 0 {
            applied.mark(IssueCode::OrphanedPage);
        }
        if level.validates() && root_pages(&doc).is_some() {
            applied.mark(IssueCode::MissingCatalog);
            applied.mark(IssueCode::BrokenPageTree);
        }
        if fix_dangling(&mut doc) > 0 {
            applied.mark(IssueCode::DanglingReference);
        }
        if fix_fonts(&mut doc) > 0 {
            applied.mark(IssueCode::MissingFont);
        }
        if ensure_info(&mut doc) {
            applied.mark(IssueCode::MissingInfo);
        }
    }
    if level.discards_malformed() {
        let streams = discard_corrupt_streams(&mut doc);
        if !streams.is_empty() {
            applied.mark(IssueCode::CorruptStream);
        }
        let pages = discard_unparseable_content(&mut doc);
        if !pages.is_empty() {
            applied.mark(IssueCode::MalformedObject);
        }
        applied.discarded.extend(streams);
    }
    cancel.check()?;

    if !level.validates() {
        let dropped = doc.prune_objects();
        debug!(dropped = dropped.len(), "unreachable objects dropped");
    }

    let pages_recovered = doc.get_pages().len() as u32;
    if pages_recovered == 0 {
        return Err(ForgeError::Unrepairable("no pages could be recovered".into()));
    }

    let mut output = PdfDocument::from_lopdf(doc);
    let out_bytes = output.serialize()?;
    for code in [
        IssueCode::MissingHeader,
        IssueCode::MissingEof,
        IssueCode::MissingTrailer,
        IssueCode::InvalidXref,
    ] {
        applied.mark(code);
    }

    for issue in issues.iter_mut() {
        issue.fixed = issue.fixable && level_fixes(level, issue.code) && applied.covers(issue.code);
    }

    if level.validates() {
        let check = diagnose(&out_bytes);
        if check.source != Source::Declared {
            return Err(ForgeError::Unrepairable(
                "repaired output failed validation".into(),
            ));
        }
        for issue in issues.iter_mut().filter(|i| i.fixed) {
            let survives = check
                .issues
                .iter()
                .any(|c| c.code == issue.code && c.object == issue.object && c.page == issue.page);
            if survives {
                issue.fixed = false;
            }
        }
    }

    let fixed = issues.iter().filter(|i| i.fixed).count();
    let state = if fixed == issues.len() {
        RepairState::Repaired
    } else {
        RepairState::PartiallyRepaired
    };

    let mut audit: Vec<NewAuditEntry> = issues
        .iter()
        .filter(|i| i.fixed)
        .map(|i| NewAuditEntry::new(i.page, "repaired", i.description.clone()))
        .collect();
    audit.extend(
        applied
            .discarded
            .iter()
            .map(|id| NewAuditEntry::new(None, "discarded", format!("object {} {}", id.0, id.1))),
    );

    let report = build_report(
        state,
        level,
        issues,
        pages_recovered,
        objects_recovered,
        applied.discarded.len(),
    );
    info!(
        state = ?report.state,
        found = report.issues_found,
        fixed = report.issues_fixed,
        health = report.health_score,
        "repair complete"
    );
    Ok(RepairOutcome {
        bytes: out_bytes,
        report,
        audit,
    })
}

fn build_report(
    state: RepairState,
    level: RepairLevel,
    issues: Vec<RepairIssue>,
    pages_recovered: u32,
    objects_recovered: usize,
    objects_discarded: usize,
) -> RepairReport {
    let found = issues.len();
    let fixed = issues.iter().filter(|i| i.fixed).count();
    RepairReport {
        state,
        level,
        issues_found: found,
        issues_fixed: fixed,
        remaining_issues: issues.iter().filter(|i| !i.fixed).cloned().collect(),
        health_score: health_score(found, fixed),
        issues,
        pages_recovered,
        objects_recovered,
        objects_discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn run(bytes: &[u8], level: RepairLevel) -> Result<RepairOutcome> {
        repair(bytes, level, &CancelToken::new())
    }

    #[test]
    fn healthy_document_scores_full_health() {
        let outcome = run(&fixtures::numbered_document(2), RepairLevel::Standard).unwrap();
        assert_eq!(outcome.report.issues_found, 0);
        assert_eq!(outcome.report.health_score, 100.0);
        assert_eq!(outcome.report.state, RepairState::Repaired);
        assert_eq!(outcome.report.pages_recovered, 2);
    }

    #[test]
    fn missing_xref_is_rebuilt_at_standard_level() {
        let original = fixtures::text_document(&["alpha", "beta"]);
        let outcome = run(&fixtures::strip_xref(&original), RepairLevel::Standard).unwrap();
        let report = &outcome.report;
        assert!(report.issues_found > 0);
        assert!(report.remaining_issues.iter().all(|i| i.code != IssueCode::InvalidXref));
        assert!(report.health_score >= 100.0 / report.issues_found as f32);
        assert!(report.issues_fixed <= report.issues_found);

        let doc = PdfDocument::load(&outcome.bytes).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_text(&doc.page(2).unwrap()).unwrap(), "beta");
        assert!(outcome.audit.iter().all(|e| e.action == "repaired"));
    }

    #[test]
    fn basic_level_cannot_rescan() {
        let damaged = fixtures::strip_xref(&fixtures::text_document(&["x"]));
        assert!(matches!(
            run(&damaged, RepairLevel::Basic),
            Err(ForgeError::Unrepairable(_))
        ));
    }

    #[test]
    fn nothing_recoverable_is_unrepairable() {
        for level in [RepairLevel::Standard, RepairLevel::Recovery] {
            assert!(matches!(
                run(b"%PDF-1.4\n%%EOF\n", level),
                Err(ForgeError::Unrepairable(_))
            ));
        }
    }

    fn orphaned_with_corrupt_stream() -> (Vec<u8>, ObjectId) {
        let mut doc = Document::load_mem(&fixtures::numbered_document(3)).unwrap();
        let pages = doc.get_pages();
        let orphan = pages[&3];
        let pages_id = root_pages(&doc).unwrap();
        {
            let root = doc.get_dictionary_mut(pages_id).unwrap();
            root.set("Kids", vec![Object::Reference(pages[&1]), Object::Reference(pages[&2])]);
            root.set("Count", 2i64);
        }
        doc.add_object(Stream::new(
            dictionary! { "Filter" => "FlateDecode" },
            b"not deflate data".to_vec(),
        ));
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        (bytes, orphan)
    }

    #[test]
    fn standard_relinks_orphans_but_keeps_corrupt_streams() {
        let (bytes, _) = orphaned_with_corrupt_stream();
        let outcome = run(&bytes, RepairLevel::Standard).unwrap();
        assert_eq!(outcome.report.state, RepairState::PartiallyRepaired);
        assert_eq!(outcome.report.pages_recovered, 3);
        let remaining: Vec<IssueCode> = outcome.report.remaining_issues.iter().map(|i| i.code).collect();
        assert_eq!(remaining, vec![IssueCode::CorruptStream]);
    }

    #[test]
    fn aggressive_discards_corrupt_streams() {
        let (bytes, _) = orphaned_with_corrupt_stream();
        let outcome = run(&bytes, RepairLevel::Aggressive).unwrap();
        assert_eq!(outcome.report.state, RepairState::Repaired);
        assert_eq!(outcome.report.health_score, 100.0);
        assert_eq!(outcome.report.objects_discarded, 1);
        assert!(outcome.audit.iter().any(|e| e.action == "discarded"));
    }

    #[test]
    fn recovery_keeps_only_reachable_pages() {
        let (bytes, orphan) = orphaned_with_corrupt_stream();
        let outcome = run(&bytes, RepairLevel::Recovery).unwrap();
        assert_eq!(outcome.report.pages_recovered, 2);
        assert!(outcome
            .report
            .remaining_issues
            .iter()
            .any(|i| i.code == IssueCode::OrphanedPage && i.object == Some(orphan.0)));
        let doc = Document::load_mem(&outcome.bytes).unwrap();
        assert!(doc.get_object(orphan).is_err());
    }

    #[test]
    fn fixed_never_exceeds_found() {
        for level in [
            RepairLevel::Basic,
            RepairLevel::Standard,
            RepairLevel::Aggressive,
            RepairLevel::Recovery,
        ] {
            let (bytes, _) = orphaned_with_corrupt_stream();
            let report = run(&bytes, level).unwrap().report;
            assert!(report.issues_fixed <= report.issues_found);
            assert!((0.0..=100.0).contains(&report.health_score));
            assert_eq!(report.issues_found, report.issues_fixed + report.remaining_issues.len());
        }
    }

    #[test]
    fn cancellation_is_honoured() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            repair(&fixtures::numbered_document(1), RepairLevel::Standard, &cancel),
            Err(ForgeError::Cancelled)
        ));
    }
}
