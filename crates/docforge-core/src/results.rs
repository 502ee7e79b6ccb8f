// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Result objects written by each engine when a job succeeds.

use serde::{Deserialize, Serialize};

use crate::settings::{RepairLevel, SecurityLevel};
use crate::types::{DiffRecord, Finding, RedactionRegion};

/// Outcome of a successful job, tagged by job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "camelCase")]
pub enum JobResult {
    Redact(RedactionResult),
    Repair(RepairReport),
    Compare(ComparisonResult),
    Ocr(OcrResult),
    Protect(ProtectResult),
    PageNumber(PageOpResult),
    Crop(PageOpResult),
    Scan(ScanResult),
}

// -- Redaction ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionResult {
    /// Merged regions, each stamped with the time it was applied.
    pub regions: Vec<RedactionRegion>,
    pub pages_modified: Vec<u32>,
    pub glyphs_removed: usize,
    pub images_redacted: usize,
    pub paths_removed: usize,
    pub security_level: SecurityLevel,
    pub passes: u32,
    pub metadata_scrubbed: bool,
    /// SHA-256 of the serialised output document.
    pub output_hash: String,
}

// -- Repair ------------------------------------------------------------------

/// Progress of a document through the repair engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepairState {
    Unknown,
    Diagnosed,
    Repaired,
    PartiallyRepaired,
    Unrepairable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueCategory {
    Corruption,
    Structure,
    Content,
    Metadata,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueCode {
    MissingHeader,
    MissingEof,
    MissingTrailer,
    InvalidXref,
    MissingCatalog,
    BrokenPageTree,
    OrphanedPage,
    DanglingReference,
    CorruptStream,
    MissingFont,
    MalformedObject,
    MissingInfo,
    Encrypted,
}

impl IssueCode {
    pub fn category(&self) -> IssueCategory {
        match self {
            Self::MissingHeader | Self::MissingEof | Self::CorruptStream | Self::MalformedObject => {
                IssueCategory::Corruption
            }
            Self::MissingTrailer
            | Self::InvalidXref
            | Self::MissingCatalog
            | Self::BrokenPageTree
            | Self::OrphanedPage
            | Self::DanglingReference => IssueCategory::Structure,
            Self::MissingFont => IssueCategory::Content,
            Self::MissingInfo => IssueCategory::Metadata,
            Self::Encrypted => IssueCategory::Security,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingHeader => "Missing %PDF header",
            Self::MissingEof => "Missing %%EOF marker",
            Self::MissingTrailer => "Missing or unreadable trailer",
            Self::InvalidXref => "Invalid cross-reference table",
            Self::MissingCatalog => "Document catalog not found",
            Self::BrokenPageTree => "Page tree is broken or unreachable",
            Self::OrphanedPage => "Page object not reachable from the page tree",
            Self::DanglingReference => "Reference to a missing object",
            Self::CorruptStream => "Stream cannot be decompressed",
            Self::MissingFont => "Font resource cannot be resolved",
            Self::MalformedObject => "Object failed validation",
            Self::MissingInfo => "Document information dictionary missing",
            Self::Encrypted => "Document is encrypted",
        }
    }
}

/// One problem found during diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairIssue {
    pub code: IssueCode,
    pub category: IssueCategory,
    pub description: String,
    pub fixable: bool,
    pub fixed: bool,
    pub object: Option<u32>,
    pub page: Option<u32>,
}

impl RepairIssue {
    pub fn new(code: IssueCode, fixable: bool) -> Self {
        Self {
            code,
            category: code.category(),
            description: code.description().to_string(),
            fixable,
            fixed: false,
            object: None,
            page: None,
        }
    }

    pub fn with_object(mut self, object: u32) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_detail(mut self, detail: impl AsRef<str>) -> Self {
        self.description = format!("{}: {}", self.description, detail.as_ref());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub state: RepairState,
    pub level: RepairLevel,
    pub issues_found: usize,
    pub issues_fixed: usize,
    pub remaining_issues: Vec<RepairIssue>,
    pub issues: Vec<RepairIssue>,
    /// 0.0–100.0.
    pub health_score: f32,
    pub pages_recovered: u32,
    pub objects_recovered: usize,
    pub objects_discarded: usize,
}

/// `fixed / found * 100`, or 100 when nothing was found.
pub fn health_score(found: usize, fixed: usize) -> f32 {
    if found == 0 {
        return 100.0;
    }
    (fixed.min(found) as f32 / found as f32) * 100.0
}

// -- Comparison --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub pages_a: u32,
    pub pages_b: u32,
    pub diffs: Vec<DiffRecord>,
    pub additions: usize,
    pub deletions: usize,
    pub modifications: usize,
    pub movements: usize,
}

// -- OCR ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrPageResult {
    pub page: u32,
    pub lines: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub language: String,
    pub pages: Vec<OcrPageResult>,
    pub pages_skipped: Vec<u32>,
}

// -- Protect / page operations / scan ---------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectResult {
    pub algorithm: String,
    pub key_bits: u32,
    pub permissions: i32,
    pub objects_encrypted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOpResult {
    pub pages_modified: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub pages_scanned: u32,
    pub findings: Vec<Finding>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_diagnosis_is_fully_healthy() {
        assert_eq!(health_score(0, 0), 100.0);
    }

    #[test]
    fn invalid_xref_description() {
        let issue = RepairIssue::new(IssueCode::InvalidXref, true);
        assert_eq!(issue.description, "Invalid cross-reference table");
        assert_eq!(issue.category, IssueCategory::Structure);
    }

    #[test]
    fn result_is_tagged_by_kind() {
        let result = JobResult::Crop(PageOpResult {
            pages_modified: vec![1, 2],
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "crop");
        assert_eq!(json["result"]["pagesModified"][1], 2);
    }

    proptest! {
        #[test]
        fn health_is_bounded(found in 0usize..1000, fixed in 0usize..1000) {
            let score = health_score(found, fixed);
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }
}
