// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docforge-document — PDF engines for the Docforge job server.
//
// Wraps lopdf in a page-oriented model (content interpretation, text
// extraction, region removal) and builds the scanner, redaction, repair,
// comparison, OCR, protection and page operations on top of it.

pub mod compare;
pub mod model;
pub mod ocr;
pub mod pages;
pub mod protect;
pub mod redact;
pub mod repair;
pub mod scan;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

// Re-export the entry points so callers can use `docforge_document::redact` etc.
pub use compare::compare;
pub use model::{Page, PdfDocument};
pub use ocr::{TextRecognizer, ocr};
pub use pages::{crop_pages, number_pages};
pub use protect::protect;
pub use redact::{RedactionOutcome, redact};
pub use repair::{RepairOutcome, repair};
pub use scan::{PageFindings, Scanner, scan};

#[cfg(feature = "ocr")]
pub use ocr::OcrsRecognizer;
