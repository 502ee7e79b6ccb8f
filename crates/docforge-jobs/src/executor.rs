// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Runs one job's engine over loaded bytes. Synchronous: the worker pool calls
// it on a blocking thread.

use docforge_core::error::{ForgeError, Result};
use docforge_core::results::{JobResult, ScanResult};
use docforge_core::settings::JobSettings;
use docforge_core::CancelToken;
use docforge_document::{PdfDocument, TextRecognizer};
use docforge_security::NewAuditEntry;
use tracing::{debug, instrument};

/// What a successful engine run hands back to the pool.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub result: JobResult,
    /// New document bytes. Only mutating jobs produce them.
    pub bytes: Option<Vec<u8>>,
    pub audit: Vec<NewAuditEntry>,
}

impl ExecutionOutput {
    fn read_only(result: JobResult) -> Self {
        Self {
            result,
            bytes: None,
            audit: Vec::new(),
        }
    }

    fn rewritten(result: JobResult, doc: &mut PdfDocument) -> Result<Self> {
        Ok(Self {
            result,
            bytes: Some(doc.serialize()?),
            audit: Vec::new(),
        })
    }
}

/// Execute `settings` against `input`. `other` is the second document of a
/// comparison.
#[instrument(skip_all, fields(kind = %settings.kind(), bytes = input.len()))]
pub fn execute(
    settings: &JobSettings,
    input: &[u8],
    other: Option<&[u8]>,
    recognizer: Option<&dyn TextRecognizer>,
    cancel: &CancelToken,
) -> Result<ExecutionOutput> {
    cancel.check()?;
    match settings {
        JobSettings::Redact(s) => {
            let mut doc = PdfDocument::load(input)?;
            let outcome = docforge_document::redact(&mut doc, s, cancel)?;
            Ok(ExecutionOutput {
                result: JobResult::Redact(outcome.result),
                bytes: Some(outcome.bytes),
                audit: outcome.audit,
            })
        }
        JobSettings::Repair(s) => {
            let outcome = docforge_document::repair(input, s.level, cancel)?;
            Ok(ExecutionOutput {
                result: JobResult::Repair(outcome.report),
                bytes: Some(outcome.bytes),
                audit: outcome.audit,
            })
        }
        JobSettings::Compare(s) => {
            let other = other.ok_or_else(|| {
                ForgeError::Internal("comparison started without its second document".into())
            })?;
            let a = PdfDocument::load(input)?;
            let b = PdfDocument::load(other)?;
            let result = docforge_document::compare(&a, &b, s, cancel)?;
            Ok(ExecutionOutput::read_only(JobResult::Compare(result)))
        }
        JobSettings::Ocr(s) => {
            let mut doc = PdfDocument::load(input)?;
            let result = docforge_document::ocr(&mut doc, s, recognizer, cancel)?;
            ExecutionOutput::rewritten(JobResult::Ocr(result), &mut doc)
        }
        JobSettings::Protect(s) => {
            let mut doc = PdfDocument::load(input)?;
            let (_, result) = docforge_document::protect(&mut doc, s, cancel)?;
            ExecutionOutput::rewritten(JobResult::Protect(result), &mut doc)
        }
        JobSettings::PageNumber(s) => {
            let mut doc = PdfDocument::load(input)?;
            let result = docforge_document::number_pages(&mut doc, s, cancel)?;
            ExecutionOutput::rewritten(JobResult::PageNumber(result), &mut doc)
        }
        JobSettings::Crop(s) => {
            let mut doc = PdfDocument::load(input)?;
            let result = docforge_document::crop_pages(&mut doc, s, cancel)?;
            ExecutionOutput::rewritten(JobResult::Crop(result), &mut doc)
        }
        JobSettings::Scan(s) => {
            let doc = PdfDocument::load(input)?;
            let mut findings = Vec::new();
            let mut pages_scanned = 0;
            for page in docforge_document::scan(&doc, &s.ruleset, s.include_images)? {
                cancel.check()?;
                let page = page?;
                pages_scanned += 1;
                findings.extend(page.findings);
            }
            debug!(pages_scanned, findings = findings.len(), "scan complete");
            Ok(ExecutionOutput::read_only(JobResult::Scan(ScanResult {
                pages_scanned,
                findings,
            })))
        }
    }
}
