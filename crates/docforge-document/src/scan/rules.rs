// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compiled detection rules: built-in patterns, keywords and custom regexes.

use std::ops::Range;

use docforge_core::error::{ForgeError, Result};
use docforge_core::settings::{PageRange, Ruleset, page_selected};
use docforge_core::PiiCategory;
use regex::Regex;

use super::patterns::{Builtins, find_builtin};

const KEYWORD_EXACT: u8 = 100;
const KEYWORD_FUZZY: u8 = 60;
const CUSTOM_PATTERN: u8 = 80;

/// A rule hit inside a line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub range: Range<usize>,
    pub category: PiiCategory,
    pub confidence: u8,
    pub rule: String,
}

#[derive(Debug, Clone)]
struct Keyword {
    source: String,
    tokens: Vec<String>,
}

/// A [`Ruleset`] with every pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledRuleset {
    builtins: Builtins,
    keywords: Vec<Keyword>,
    custom: Vec<(String, Regex)>,
    case_sensitive: bool,
    fuzzy: bool,
    pages: Option<PageRange>,
}

impl CompiledRuleset {
    /// Compile `ruleset`. An invalid custom pattern fails here, before any
    /// document is touched.
    pub fn compile(ruleset: &Ruleset) -> Result<Self> {
        let custom = ruleset
            .custom_patterns
            .iter()
            .map(|p| {
                Regex::new(&p.pattern)
                    .map(|re| (p.name.clone(), re))
                    .map_err(|e| ForgeError::InvalidPattern {
                        pattern: p.pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let keywords = ruleset
            .keywords
            .iter()
            .map(|k| Keyword {
                source: k.clone(),
                tokens: tokens(k)
                    .into_iter()
                    .map(|(_, t)| normalise(t, ruleset.case_sensitive))
                    .collect(),
            })
            .filter(|k| !k.tokens.is_empty())
            .collect();

        Ok(Self {
            builtins: Builtins {
                ssn: ruleset.ssn,
                credit_card: ruleset.credit_card,
                phone: ruleset.phone,
                email: ruleset.email,
                bank_account: ruleset.bank_account,
            },
            keywords,
            custom,
            case_sensitive: ruleset.case_sensitive,
            fuzzy: ruleset.fuzzy,
            pages: ruleset.pages.clone(),
        })
    }

    pub fn is_empty(&self) -> bool {
        !self.builtins.any() && self.keywords.is_empty() && self.custom.is_empty()
    }

    pub fn applies_to(&self, page: u32) -> bool {
        page_selected(&self.pages, page)
    }

    /// Every rule hit in `text`, ordered by position.
    pub fn find(&self, text: &str) -> Vec<TextMatch> {
        let mut out: Vec<TextMatch> = find_builtin(text, self.builtins)
            .into_iter()
            .map(|m| TextMatch {
                range: m.range,
                category: m.category,
                confidence: m.confidence,
                rule: m.rule.to_string(),
            })
            .collect();

        if !self.keywords.is_empty() {
            let text_tokens: Vec<(Range<usize>, String)> = tokens(text)
                .into_iter()
                .map(|(r, t)| (r, normalise(t, self.case_sensitive)))
                .collect();
            for keyword in &self.keywords {
                self.find_keyword(keyword, &text_tokens, &mut out);
            }
        }

        for (name, re) in &self.custom {
            for m in re.find_iter(text).filter(|m| !m.as_str().trim().is_empty()) {
                out.push(TextMatch {
                    range: m.range(),
                    category: PiiCategory::Custom,
                    confidence: CUSTOM_PATTERN,
                    rule: name.clone(),
                });
            }
        }

        out.sort_by_key(|m| (m.range.start, m.range.end));
        out
    }

    fn find_keyword(&self, keyword: &Keyword, text: &[(Range<usize>, String)], out: &mut Vec<TextMatch>) {
        let n = keyword.tokens.len();
        if text.len() < n {
            return;
        }
        for window in text.windows(n) {
            let exact = window.iter().zip(&keyword.tokens).all(|((_, t), k)| t == k);
            let fuzzy = !exact
                && self.fuzzy
                && window
                    .iter()
                    .zip(&keyword.tokens)
                    .all(|((_, t), k)| edit_distance(t, k) <= 1);
            if exact || fuzzy {
                out.push(TextMatch {
                    range: window[0].0.start..window[n - 1].0.end,
                    category: PiiCategory::Keyword,
                    confidence: if exact { KEYWORD_EXACT } else { KEYWORD_FUZZY },
                    rule: keyword.source.clone(),
                });
            }
        }
    }
}

/// Check that every custom pattern in `ruleset` compiles.
pub fn validate_ruleset(ruleset: &Ruleset) -> Result<()> {
    CompiledRuleset::compile(ruleset).map(|_| ())
}

fn normalise(token: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        token.to_string()
    } else {
        token.to_lowercase()
    }
}

/// Whitespace-separated tokens with surrounding punctuation trimmed.
pub fn tokens(text: &str) -> Vec<(Range<usize>, &str)> {
    let mut raw = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                raw.push(s..i);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        raw.push(s..text.len());
    }

    raw.into_iter()
        .filter_map(|range| {
            let token = &text[range.clone()];
            let lead = token.len() - token.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
            let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
            (!trimmed.is_empty()).then(|| {
                let begin = range.start + lead;
                (begin..begin + trimmed.len(), trimmed)
            })
        })
        .collect()
}

/// Levenshtein distance over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
