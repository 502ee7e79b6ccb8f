// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content scanner: PII patterns, keywords, custom expressions and image
// placements, reported as typed findings page by page.

pub mod patterns;
pub mod rules;
pub mod scanner;

pub use rules::{CompiledRuleset, TextMatch, validate_ruleset};
pub use scanner::{PageFindings, Scanner, scan};
