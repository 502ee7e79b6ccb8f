// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Built-in PII patterns: a fixed regex per category plus a validator where
// the identifier carries a checksum or a structural rule.
//
// Confidence: checksum-validated hits score 95–100, pattern-only hits 70–90.

use std::ops::Range;

use docforge_core::PiiCategory;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SSN: Regex =
        Regex::new(r"\b(\d{3})([- ]?)(\d{2})([- ]?)(\d{4})\b").expect("static regex");

    /// A run of digits, optionally grouped by single spaces or hyphens. Runs
    /// may be longer than a card number; see `find_credit_cards`.
    static ref CARD_CANDIDATE: Regex =
        Regex::new(r"\b\d(?:[ -]?\d){12,}\b").expect("static regex");

    static ref DIGIT_GROUP: Regex = Regex::new(r"\d+").expect("static regex");

    static ref PHONE: Regex = Regex::new(
        r"(?:\+1[-. ]?)?(?:\(\d{3}\)\s?|\b\d{3}[-. ])\d{3}[-. ]\d{4}\b"
    ).expect("static regex");

    static ref PHONE_INTL: Regex =
        Regex::new(r"\+\d{1,3}(?:[ -]\d{2,4}){2,4}\b").expect("static regex");

    static ref EMAIL: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("static regex");

    static ref IBAN: Regex =
        Regex::new(r"\b[A-Z]{2}\d{2}(?: ?[A-Z0-9]{4}){2,7}(?: ?[A-Z0-9]{1,3})?\b").expect("static regex");

    static ref ACCOUNT_NUMBER: Regex = Regex::new(
        r"(?i)\b(?:account|acct)\.?\s*(?:no\.?|number|#)?\s*:?\s*(\d{8,17})\b"
    ).expect("static regex");
}

/// A built-in pattern hit inside a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub range: Range<usize>,
    pub category: PiiCategory,
    pub confidence: u8,
    pub rule: &'static str,
}

/// Which built-in categories to look for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Builtins {
    pub ssn: bool,
    pub credit_card: bool,
    pub phone: bool,
    pub email: bool,
    pub bank_account: bool,
}

impl Builtins {
    pub fn any(&self) -> bool {
        self.ssn || self.credit_card || self.phone || self.email || self.bank_account
    }
}

fn digits(s: &str) -> Vec<u32> {
    s.chars().filter_map(|c| c.to_digit(10)).collect()
}

/// Luhn checksum over the digits of `s`.
pub fn luhn_valid(s: &str) -> bool {
    let digits = digits(s);
    if digits.len() < 2 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                *d
            }
        })
        .sum();
    sum % 10 == 0
}

/// ISO 13616 mod-97 check.
pub fn iban_valid(s: &str) -> bool {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 15 || compact.len() > 34 {
        return false;
    }
    let (head, tail) = compact.split_at(4);
    let mut remainder: u64 = 0;
    for c in tail.chars().chain(head.chars()) {
        let value = match c {
            '0'..='9' => c as u64 - '0' as u64,
            'A'..='Z' => c as u64 - 'A' as u64 + 10,
            _ => return false,
        };
        let width = if value >= 10 { 100 } else { 10 };
        remainder = (remainder * width + value) % 97;
    }
    remainder == 1
}

/// Area 000, 666 and 9xx, group 00 and serial 0000 are never issued.
fn ssn_structurally_valid(area: &str, group: &str, serial: &str) -> bool {
    area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
}

fn card_issuer_known(number: &[u32]) -> bool {
    match number {
        [4, ..] => true,
        [5, 1..=5, ..] => true,
        [2, 2..=7, ..] => true,
        [3, 4 | 7, ..] => true,
        [6, 0, 1, 1, ..] | [6, 5, ..] => true,
        _ => false,
    }
}

fn find_ssn(text: &str, out: &mut Vec<PatternMatch>) {
    for cap in SSN.captures_iter(text) {
        let (Some(whole), Some(area), Some(sep1), Some(group), Some(sep2), Some(serial)) = (
            cap.get(0),
            cap.get(1),
            cap.get(2),
            cap.get(3),
            cap.get(4),
            cap.get(5),
        ) else {
            continue;
        };
        if !ssn_structurally_valid(area.as_str(), group.as_str(), serial.as_str()) {
            continue;
        }
        let separated = !sep1.as_str().is_empty() && sep1.as_str() == sep2.as_str();
        if !separated && (!sep1.as_str().is_empty() || !sep2.as_str().is_empty()) {
            continue;
        }
        out.push(PatternMatch {
            range: whole.range(),
            category: PiiCategory::Ssn,
            confidence: if separated { 95 } else { 75 },
            rule: "ssn",
        });
    }
}

/// Group layouts printed on cards: 4-4-4-4 with an optional short tail,
/// Amex 4-6-5, Diners 4-6-4, or one unbroken 13-19 digit run.
fn card_layout(groups: &[Range<usize>]) -> bool {
    let lens: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    matches!(
        lens.as_slice(),
        [13..=19] | [4, 4, 4, 4] | [4, 4, 4, 4, 1..=3] | [4, 6, 4 | 5]
    )
}

fn push_card(text: &str, range: Range<usize>, out: &mut Vec<PatternMatch>) {
    let number = digits(&text[range.clone()]);
    out.push(PatternMatch {
        range,
        category: PiiCategory::CreditCard,
        confidence: if card_issuer_known(&number) { 100 } else { 95 },
        rule: "credit_card",
    });
}

/// A candidate run that passes Luhn as a whole is a card. Otherwise the run
/// may hold a card plus neighbouring digits (a CVV, a postcode, a reference),
/// so consecutive digit groups that form a card layout are tried, longest
/// first.
fn find_credit_cards(text: &str, out: &mut Vec<PatternMatch>) {
    for m in CARD_CANDIDATE.find_iter(text) {
        let count = digits(m.as_str()).len();
        if (13..=19).contains(&count) && luhn_valid(m.as_str()) {
            push_card(text, m.range(), out);
            continue;
        }

        let groups: Vec<Range<usize>> = DIGIT_GROUP
            .find_iter(m.as_str())
            .map(|g| m.start() + g.start()..m.start() + g.end())
            .collect();
        let mut first = 0;
        while first < groups.len() {
            let found = (first + 1..=groups.len()).rev().find(|&last| {
                let window = &groups[first..last];
                card_layout(window) && luhn_valid(&text[window[0].start..window[window.len() - 1].end])
            });
            match found {
                Some(last) => {
                    push_card(text, groups[first].start..groups[last - 1].end, out);
                    first = last;
                }
                None => first += 1,
            }
        }
    }
}

fn find_phones(text: &str, out: &mut Vec<PatternMatch>) {
    for m in PHONE.find_iter(text) {
        out.push(PatternMatch {
            range: m.range(),
            category: PiiCategory::Phone,
            confidence: 80,
            rule: "phone",
        });
    }
    for m in PHONE_INTL.find_iter(text) {
        out.push(PatternMatch {
            range: m.range(),
            category: PiiCategory::Phone,
            confidence: 70,
            rule: "phone_international",
        });
    }
}

fn find_emails(text: &str, out: &mut Vec<PatternMatch>) {
    for m in EMAIL.find_iter(text) {
        out.push(PatternMatch {
            range: m.range(),
            category: PiiCategory::Email,
            confidence: 90,
            rule: "email",
        });
    }
}

fn find_bank_accounts(text: &str, out: &mut Vec<PatternMatch>) {
    for m in IBAN.find_iter(text) {
        if iban_valid(m.as_str()) {
            out.push(PatternMatch {
                range: m.range(),
                category: PiiCategory::BankAccount,
                confidence: 100,
                rule: "iban",
            });
        }
    }
    for cap in ACCOUNT_NUMBER.captures_iter(text) {
        if let Some(number) = cap.get(1) {
            out.push(PatternMatch {
                range: number.range(),
                category: PiiCategory::BankAccount,
                confidence: 70,
                rule: "account_number",
            });
        }
    }
}

/// Fold overlapping hits into one. The most confident hit (the earliest on
/// ties) names the merged span, which covers every overlapping hit so that
/// redacting it leaves no part of any of them behind.
pub fn resolve_overlaps(mut matches: Vec<PatternMatch>) -> Vec<PatternMatch> {
    matches.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then(a.range.start.cmp(&b.range.start))
            .then(b.range.len().cmp(&a.range.len()))
    });
    let mut kept: Vec<PatternMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        match kept.iter_mut().find(|k| overlaps(&k.range, &m.range)) {
            Some(k) => k.range = k.range.start.min(m.range.start)..k.range.end.max(m.range.end),
            None => kept.push(m),
        }
    }

    // Widened spans can reach each other.
    kept.sort_by_key(|m| m.range.start);
    let mut merged: Vec<PatternMatch> = Vec::with_capacity(kept.len());
    for m in kept {
        match merged.last_mut() {
            Some(last) if overlaps(&last.range, &m.range) => {
                let range = last.range.start..last.range.end.max(m.range.end);
                if m.confidence > last.confidence {
                    *last = m;
                }
                last.range = range;
            }
            _ => merged.push(m),
        }
    }
    merged
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// All enabled built-in hits in `text`, overlaps merged, in text order.
pub fn find_builtin(text: &str, enabled: Builtins) -> Vec<PatternMatch> {
    let mut out = Vec::new();
    if enabled.ssn {
        find_ssn(text, &mut out);
    }
    if enabled.credit_card {
        find_credit_cards(text, &mut out);
    }
    if enabled.phone {
        find_phones(text, &mut out);
    }
    if enabled.email {
        find_emails(text, &mut out);
    }
    if enabled.bank_account {
        find_bank_accounts(text, &mut out);
    }
    resolve_overlaps(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: Builtins = Builtins {
        ssn: true,
        credit_card: true,
        phone: true,
        email: true,
        bank_account: true,
    };

    #[test]
    fn luhn() {
        assert!(luhn_valid("4111 1111 1111 1111"));
        assert!(luhn_valid("79927398713"));
        assert!(!luhn_valid("4111 1111 1111 1112"));
    }

    #[test]
    fn iban_checksum() {
        assert!(iban_valid("GB82 WEST 1234 5698 7654 32"));
        assert!(iban_valid("DE89370400440532013000"));
        assert!(!iban_valid("GB82 WEST 1234 5698 7654 33"));
    }

    #[test]
    fn ssn_with_separators_is_high_confidence() {
        let hits = find_builtin("SSN: 123-45-6789", ALL);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, PiiCategory::Ssn);
        assert_eq!(hits[0].range, 5..16);
        assert!(hits[0].confidence >= 95);
    }

    #[test]
    fn never_issued_ssns_are_ignored() {
        let only_ssn = Builtins {
            ssn: true,
            ..Builtins::default()
        };
        assert!(find_builtin("000-12-3456 666-12-3456 912-34-5678", only_ssn).is_empty());
        assert!(find_builtin("123-45 6789", only_ssn).is_empty());
    }

    #[test]
    fn card_requires_luhn() {
        let hits = find_builtin("card 4111-1111-1111-1111 and 4111-1111-1111-1112", ALL);
        let cards: Vec<_> = hits
            .iter()
            .filter(|h| h.category == PiiCategory::CreditCard)
            .collect();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].confidence, 100);
    }

    #[test]
    fn email_phone_and_accounts() {
        let text = "mail jane.doe@example.com or call (555) 123-4567, IBAN DE89 3704 0044 0532 0130 00, acct no. 12345678";
        let hits = find_builtin(text, ALL);
        let cats: Vec<PiiCategory> = hits.iter().map(|h| h.category).collect();
        assert_eq!(
            cats,
            vec![
                PiiCategory::Email,
                PiiCategory::Phone,
                PiiCategory::BankAccount,
                PiiCategory::BankAccount
            ]
        );
        assert_eq!(&text[hits[0].range.clone()], "jane.doe@example.com");
        assert_eq!(hits[2].confidence, 100);
        assert_eq!(&text[hits[3].range.clone()], "12345678");
        assert_eq!(hits[3].confidence, 70);
    }

    #[test]
    fn card_next_to_cvv_or_postcode_is_found() {
        let only_cards = Builtins {
            credit_card: true,
            ..Builtins::default()
        };
        let text = "Card 4111 1111 1111 1111 123 exp 12/28";
        let hits = find_builtin(text, only_cards);
        assert_eq!(hits.len(), 1);
        assert_eq!(&text[hits[0].range.clone()], "4111 1111 1111 1111");
        assert_eq!(hits[0].confidence, 100);

        let text = "ship to 4111-1111-1111-1111 90210";
        let hits = find_builtin(text, only_cards);
        assert_eq!(hits.len(), 1);
        assert_eq!(&text[hits[0].range.clone()], "4111-1111-1111-1111");

        let text = "ref 12 3782 822463 10005";
        let hits = find_builtin(text, only_cards);
        assert_eq!(hits.len(), 1);
        assert_eq!(&text[hits[0].range.clone()], "3782 822463 10005");
    }

    #[test]
    fn long_digit_runs_without_a_card_layout_are_ignored() {
        let only_cards = Builtins {
            credit_card: true,
            ..Builtins::default()
        };
        assert!(find_builtin("order 12 345 678 901 234 567 890", only_cards).is_empty());
    }

    #[test]
    fn overlapping_hits_merge_under_the_most_confident() {
        let a = PatternMatch {
            range: 0..10,
            category: PiiCategory::Phone,
            confidence: 70,
            rule: "phone",
        };
        let b = PatternMatch {
            range: 5..15,
            category: PiiCategory::CreditCard,
            confidence: 100,
            rule: "credit_card",
        };
        let kept = resolve_overlaps(vec![a, b.clone()]);
        assert_eq!(kept, vec![PatternMatch { range: 0..15, ..b }]);
    }

    #[test]
    fn widened_spans_merge_with_their_neighbours() {
        let hit = |range: Range<usize>, confidence| PatternMatch {
            range,
            category: PiiCategory::Phone,
            confidence,
            rule: "phone",
        };
        let kept = resolve_overlaps(vec![hit(0..4, 90), hit(10..14, 90), hit(3..11, 70), hit(20..22, 70)]);
        assert_eq!(kept.iter().map(|m| m.range.clone()).collect::<Vec<_>>(), vec![0..14, 20..22]);
    }

    fn luhn_check_digit(payload: &[u32]) -> u32 {
        let sum: u32 = payload
            .iter()
            .rev()
            .enumerate()
            .map(|(i, d)| {
                if i % 2 == 0 {
                    let doubled = d * 2;
                    if doubled > 9 { doubled - 9 } else { doubled }
                } else {
                    *d
                }
            })
            .sum();
        (10 - sum % 10) % 10
    }

    fn mod97(s: &str) -> u64 {
        s.chars().fold(0, |rem, c| {
            let value = c.to_digit(36).map_or(0, u64::from);
            let width = if value >= 10 { 100 } else { 10 };
            (rem * width + value) % 97
        })
    }

    proptest! {
        #[test]
        fn luhn_accepts_numbers_with_their_check_digit(
            payload in prop::collection::vec(0u32..10, 12..19)
        ) {
            let check = luhn_check_digit(&payload);
            let number: String = payload
                .iter()
                .chain(std::iter::once(&check))
                .map(|d| char::from_digit(*d, 10).unwrap())
                .collect();
            prop_assert!(luhn_valid(&number));
            let wrong = char::from_digit((check + 1) % 10, 10).unwrap();
            let tampered = format!("{}{wrong}", &number[..number.len() - 1]);
            prop_assert!(!luhn_valid(&tampered));
        }

        #[test]
        fn iban_accepts_a_computed_check(country in "[A-Z]{2}", bban in "[0-9A-Z]{11,30}") {
            let check = 98 - mod97(&format!("{bban}{country}00"));
            let iban = format!("{country}{check:02}{bban}");
            prop_assert!(iban_valid(&iban));
        }

        #[test]
        fn resolved_hits_are_disjoint_and_cover_their_inputs(
            spans in prop::collection::vec((0usize..60, 1usize..12, 60u8..=100), 0..16)
        ) {
            let hits: Vec<PatternMatch> = spans
                .iter()
                .map(|&(start, len, confidence)| PatternMatch {
                    range: start..start + len,
                    category: PiiCategory::Phone,
                    confidence,
                    rule: "phone",
                })
                .collect();
            let kept = resolve_overlaps(hits.clone());
            for pair in kept.windows(2) {
                prop_assert!(pair[0].range.end <= pair[1].range.start);
            }
            for hit in &hits {
                prop_assert!(kept
                    .iter()
                    .any(|k| k.range.start <= hit.range.start && hit.range.end <= k.range.end));
            }
        }
    }
}
