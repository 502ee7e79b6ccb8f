// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for people submitting documents.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The taxonomy uses four severity levels that drive presentation.

use crate::error::ForgeError;

/// Severity of an error from the submitter's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Contention or a slow job; resubmitting may succeed.
    Transient,
    /// The submitter must change something (settings, pattern, page range).
    ActionRequired,
    /// The document itself cannot be processed.
    Permanent,
    /// The server is missing something only an operator can install.
    OperatorRequired,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the submitter should try.
    pub suggestion: String,
    /// Whether resubmitting the same job can succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `ForgeError` into a `HumanError`.
pub fn humanize_error(err: &ForgeError) -> HumanError {
    match err {
        // -- Document errors --
        ForgeError::CorruptDocument(detail) => HumanError {
            message: "This PDF is damaged and can't be opened.".into(),
            suggestion: format!("Run a repair job on the document first, then try again. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        ForgeError::PageIndexOutOfRange { page, page_count } => HumanError {
            message: format!("Page {page} doesn't exist."),
            suggestion: format!("This document has {page_count} pages. Choose a page between 1 and {page_count}."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ForgeError::Unrepairable(_) => HumanError {
            message: "No pages could be recovered from this PDF.".into(),
            suggestion: "Try the recovery repair level, or find another copy of the document.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ForgeError::Pdf(detail) => HumanError {
            message: "Something went wrong while editing the PDF.".into(),
            suggestion: format!("Try again. If this keeps happening, repair the document first. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        // -- Settings --
        ForgeError::InvalidPattern { pattern, reason } => HumanError {
            message: "One of your search patterns isn't valid.".into(),
            suggestion: format!("Check the pattern {pattern:?} and fix it: {reason}"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ForgeError::InvalidSettings(detail) => HumanError {
            message: "Some settings for this job aren't valid.".into(),
            suggestion: format!("Correct the settings and submit again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Redaction --
        ForgeError::IncompleteRedaction { page, .. } => HumanError {
            message: format!("Some text on page {page} could not be fully removed."),
            suggestion: "The document was left unchanged. Draw a larger region over the text, or repair the document and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Jobs --
        ForgeError::DocumentBusy(_) => HumanError {
            message: "This document is already being changed by another job.".into(),
            suggestion: "Wait for the other job to finish, then submit again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ForgeError::Timeout(after) => HumanError {
            message: "The job took too long and was stopped.".into(),
            suggestion: format!(
                "Try a smaller page range, or ask an operator to raise the time limit (currently {}s).",
                after.as_secs()
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        ForgeError::Cancelled => HumanError {
            message: "The job was cancelled.".into(),
            suggestion: "Nothing was changed. Submit the job again if you still need it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ForgeError::DocumentNotFound(_) => HumanError {
            message: "We couldn't find that document.".into(),
            suggestion: "Upload the document again, then use the new document id.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ForgeError::JobNotFound(_) => HumanError {
            message: "We couldn't find that job.".into(),
            suggestion: "Finished jobs are removed after a while. Submit it again if needed.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- OCR --
        ForgeError::OcrUnavailable(_) => HumanError {
            message: "Text recognition isn't available on this server.".into(),
            suggestion: "Ask an operator to install the OCR models.".into(),
            retriable: false,
            severity: Severity::OperatorRequired,
        },

        ForgeError::Ocr(detail) | ForgeError::Image(detail) => HumanError {
            message: "We couldn't read the images in this document.".into(),
            suggestion: format!("Check the scan is clear and not too small. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Security --
        ForgeError::Encryption(detail) => HumanError {
            message: "The document couldn't be password-protected.".into(),
            suggestion: format!("If the document already has a password, remove it first. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        ForgeError::IntegrityMismatch { .. } => HumanError {
            message: "The stored document no longer matches what was uploaded.".into(),
            suggestion: "Upload the document again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Storage / internal --
        ForgeError::Database(_)
        | ForgeError::Io(_)
        | ForgeError::Serialization(_)
        | ForgeError::Internal(_) => HumanError {
            message: "Something went wrong on our side.".into(),
            suggestion: format!("Try again in a moment. ({err})"),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    #[test]
    fn busy_is_transient() {
        let human = humanize_error(&ForgeError::DocumentBusy(DocumentId::new()));
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn bad_pattern_is_action_required() {
        let err = ForgeError::InvalidPattern {
            pattern: "([a-z".into(),
            reason: "unclosed group".into(),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
        assert!(human.suggestion.contains("([a-z"));
    }

    #[test]
    fn unrepairable_is_permanent() {
        let human = humanize_error(&ForgeError::Unrepairable("no pages".into()));
        assert_eq!(human.severity, Severity::Permanent);
    }

    #[test]
    fn missing_ocr_needs_operator() {
        let human = humanize_error(&ForgeError::OcrUnavailable("feature disabled".into()));
        assert_eq!(human.severity, Severity::OperatorRequired);
    }
}
