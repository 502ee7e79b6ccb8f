// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docforge-security — audit trail, document fingerprints and the PDF
// standard security handler used by the protect job.

pub mod audit;
pub mod encryption;
pub mod integrity;

pub use audit::{AuditEntry, AuditLog, NewAuditEntry};
pub use encryption::SecurityHandler;
pub use integrity::{DIGEST_HEX_LEN, hash_bytes, verify_revision};
