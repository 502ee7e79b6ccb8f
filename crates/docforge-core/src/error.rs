// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Docforge.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DocumentId, JobId};

/// Top-level error type for all Docforge operations.
#[derive(Debug, Error)]
pub enum ForgeError {
    // -- Document errors --
    #[error("document is corrupt: {0}")]
    CorruptDocument(String),

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageIndexOutOfRange { page: u32, page_count: u32 },

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("document cannot be repaired: {0}")]
    Unrepairable(String),

    // -- Settings --
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    // -- Redaction --
    #[error("redaction incomplete on page {page}: {residual:?} still extractable")]
    IncompleteRedaction { page: u32, residual: String },

    // -- Jobs and concurrency --
    #[error("document {0} is locked by another mutating job")]
    DocumentBusy(DocumentId),

    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    #[error("job was cancelled")]
    Cancelled,

    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    // -- OCR --
    #[error("no OCR engine available: {0}")]
    OcrUnavailable(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("image processing failed: {0}")]
    Image(String),

    // -- Security --
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Machine-readable error classification carried by failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    CorruptDocument,
    InvalidPattern,
    DocumentBusy,
    IncompleteRedaction,
    Unrepairable,
    Timeout,
    PageIndexOutOfRange,
    Cancelled,
    DocumentNotFound,
    JobNotFound,
    InvalidSettings,
    OcrUnavailable,
    Internal,
}

impl ForgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CorruptDocument(_) => ErrorKind::CorruptDocument,
            Self::PageIndexOutOfRange { .. } => ErrorKind::PageIndexOutOfRange,
            Self::Unrepairable(_) => ErrorKind::Unrepairable,
            Self::InvalidPattern { .. } => ErrorKind::InvalidPattern,
            Self::InvalidSettings(_) => ErrorKind::InvalidSettings,
            Self::IncompleteRedaction { .. } => ErrorKind::IncompleteRedaction,
            Self::DocumentBusy(_) => ErrorKind::DocumentBusy,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DocumentNotFound(_) => ErrorKind::DocumentNotFound,
            Self::JobNotFound(_) => ErrorKind::JobNotFound,
            Self::OcrUnavailable(_) => ErrorKind::OcrUnavailable,
            Self::Pdf(_)
            | Self::Ocr(_)
            | Self::Image(_)
            | Self::Encryption(_)
            | Self::IntegrityMismatch { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_variants() {
        assert_eq!(ForgeError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            ForgeError::Timeout(Duration::from_secs(3)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            ForgeError::Database("locked".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn kind_serialises_camel_case() {
        let json = serde_json::to_string(&ErrorKind::IncompleteRedaction).unwrap();
        assert_eq!(json, "\"incompleteRedaction\"");
    }

    #[test]
    fn messages_are_readable() {
        let err = ForgeError::PageIndexOutOfRange {
            page: 7,
            page_count: 3,
        };
        assert_eq!(err.to_string(), "page 7 out of range (document has 3 pages)");
    }
}
