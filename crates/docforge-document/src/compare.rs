// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document comparison.
//
// Pages are paired by position, or through a longest-common-subsequence pass
// over page fingerprints when structure-aware alignment is requested. Paired
// pages are diffed word by word. Removed and added runs that closely match
// each other anywhere in the document are reported as movements.

use docforge_core::error::Result;
use docforge_core::results::ComparisonResult;
use docforge_core::settings::CompareSettings;
use docforge_core::types::{DiffLocation, DiffRecord, DiffType};
use docforge_core::{BoundingBox, CancelToken};
use docforge_security::hash_bytes;
use tracing::{debug, info, instrument};

use crate::model::{Page, PdfDocument};
use crate::scan::rules::{edit_distance, tokens};

/// Runs shorter than this are never considered moved.
pub const MIN_MOVEMENT_CHARS: usize = 8;

#[derive(Debug, Clone)]
struct Word {
    text: String,
    bbox: Option<BoundingBox>,
}

#[derive(Debug)]
struct PageWords {
    number: u32,
    words: Vec<Word>,
}

impl PageWords {
    fn read(doc: &PdfDocument, page: &Page) -> Result<Self> {
        let mut words = Vec::new();
        for line in doc.extract_text(page)? {
            for (range, token) in tokens(&line.text) {
                words.push(Word {
                    text: token.to_string(),
                    bbox: line.bbox_of(range),
                });
            }
        }
        Ok(Self {
            number: page.number,
            words,
        })
    }

    fn fingerprint(&self) -> String {
        let joined: Vec<&str> = self.words.iter().map(|w| w.text.as_str()).collect();
        hash_bytes(joined.join(" ").as_bytes())
    }

    fn location(&self, start: usize, end: usize) -> DiffLocation {
        let run = &self.words[start..end];
        DiffLocation {
            page: self.number,
            word_index: start,
            bounding_box: run.iter().filter_map(|w| w.bbox).reduce(|a, b| a.union(&b)),
            text: run.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" "),
        }
    }

    fn whole(&self) -> DiffLocation {
        self.location(0, self.words.len())
    }
}

/// Index pairs of a longest common subsequence of `a` and `b`. Memory stays
/// linear in the input lengths, so long pages and long documents are safe.
fn lcs_pairs<T: PartialEq>(a: &[T], b: &[T]) -> Vec<(usize, usize)> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (ma, mb) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);

    let mut pairs: Vec<(usize, usize)> = (0..prefix).map(|i| (i, i)).collect();
    split_lcs(ma, mb, (prefix, prefix), &mut pairs);
    pairs.extend((0..suffix).map(|k| (a.len() - suffix + k, b.len() - suffix + k)));
    pairs
}

/// LCS lengths of all of `a` against every prefix of `b`, one row at a time.
fn lcs_row<'a, T: PartialEq + 'a>(a: impl Iterator<Item = &'a T>, b: &[&'a T]) -> Vec<u32> {
    let mut row = vec![0u32; b.len() + 1];
    for x in a {
        let mut diagonal = 0;
        for (j, y) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if x == *y { diagonal + 1 } else { above.max(row[j]) };
            diagonal = above;
        }
    }
    row
}

/// Hirschberg's split: halve `a`, find where the halves divide `b` with the
/// forward and backward length rows, and recurse on both sides.
fn split_lcs<T: PartialEq>(a: &[T], b: &[T], offset: (usize, usize), out: &mut Vec<(usize, usize)>) {
    if a.is_empty() || b.is_empty() {
        return;
    }
    if a.len() == 1 {
        if let Some(j) = b.iter().position(|y| *y == a[0]) {
            out.push((offset.0, offset.1 + j));
        }
        return;
    }

    let mid = a.len() / 2;
    let (top, bottom) = a.split_at(mid);
    let forward = lcs_row(top.iter(), &b.iter().collect::<Vec<_>>());
    let backward = lcs_row(bottom.iter().rev(), &b.iter().rev().collect::<Vec<_>>());
    let m = b.len();
    let split = (0..=m)
        .rev()
        .max_by_key(|&j| forward[j] + backward[m - j])
        .unwrap_or(0);

    split_lcs(top, &b[..split], offset, out);
    split_lcs(bottom, &b[split..], (offset.0 + mid, offset.1 + split), out);
}

/// Gaps between matched index pairs: `(a_range, b_range)` spans of
/// unmatched items, including the tails.
fn gaps(pairs: &[(usize, usize)], a_len: usize, b_len: usize) -> Vec<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let mut out = Vec::new();
    let (mut ai, mut bi) = (0, 0);
    for &(pa, pb) in pairs.iter().chain(std::iter::once(&(a_len, b_len))) {
        if pa > ai || pb > bi {
            out.push((ai..pa, bi..pb));
        }
        ai = pa + 1;
        bi = pb + 1;
    }
    out
}

/// How the pages of both documents line up.
#[derive(Debug, PartialEq, Eq)]
enum Alignment {
    Pair(usize, usize),
    OnlyA(usize),
    OnlyB(usize),
}

fn positional(a_len: usize, b_len: usize) -> Vec<Alignment> {
    (0..a_len.max(b_len))
        .map(|i| match (i < a_len, i < b_len) {
            (true, true) => Alignment::Pair(i, i),
            (true, false) => Alignment::OnlyA(i),
            _ => Alignment::OnlyB(i),
        })
        .collect()
}

fn structural(a: &[PageWords], b: &[PageWords]) -> Vec<Alignment> {
    let fa: Vec<String> = a.iter().map(PageWords::fingerprint).collect();
    let fb: Vec<String> = b.iter().map(PageWords::fingerprint).collect();
    let pairs = lcs_pairs(&fa, &fb);

    let mut out = Vec::new();
    let mut matched = pairs.iter().peekable();
    for (ga, gb) in gaps(&pairs, a.len(), b.len()) {
        while let Some(&&(pa, pb)) = matched.peek() {
            if pa >= ga.start && pb >= gb.start {
                break;
            }
            out.push(Alignment::Pair(pa, pb));
            matched.next();
        }
        let common = ga.len().min(gb.len());
        for k in 0..common {
            out.push(Alignment::Pair(ga.start + k, gb.start + k));
        }
        out.extend((ga.start + common..ga.end).map(Alignment::OnlyA));
        out.extend((gb.start + common..gb.end).map(Alignment::OnlyB));
    }
    out.extend(matched.map(|&(pa, pb)| Alignment::Pair(pa, pb)));
    out
}

/// A change before movement pairing, with its sort position.
#[derive(Debug, Clone)]
struct Change {
    page: u32,
    position: usize,
    diff_type: DiffType,
    a: Option<DiffLocation>,
    b: Option<DiffLocation>,
}

impl Change {
    fn changed_chars(&self) -> usize {
        let len = |l: &Option<DiffLocation>| l.as_ref().map_or(0, |l| l.text.chars().count());
        match (&self.a, &self.b) {
            (Some(a), Some(b)) => edit_distance(&a.text, &b.text),
            _ => len(&self.a) + len(&self.b),
        }
    }
}

fn diff_pages(a: &PageWords, b: &PageWords, out: &mut Vec<Change>) {
    let ta: Vec<&str> = a.words.iter().map(|w| w.text.as_str()).collect();
    let tb: Vec<&str> = b.words.iter().map(|w| w.text.as_str()).collect();
    let pairs = lcs_pairs(&ta, &tb);
    for (ga, gb) in gaps(&pairs, ta.len(), tb.len()) {
        let change = match (ga.is_empty(), gb.is_empty()) {
            (false, false) => Change {
                page: a.number,
                position: ga.start,
                diff_type: DiffType::Modification,
                a: Some(a.location(ga.start, ga.end)),
                b: Some(b.location(gb.start, gb.end)),
            },
            (false, true) => Change {
                page: a.number,
                position: ga.start,
                diff_type: DiffType::Deletion,
                a: Some(a.location(ga.start, ga.end)),
                b: None,
            },
            _ => Change {
                page: a.number,
                position: ga.start,
                diff_type: DiffType::Addition,
                a: None,
                b: Some(b.location(gb.start, gb.end)),
            },
        };
        out.push(change);
    }
}

/// 1.0 for identical strings, falling towards 0.0 with edit distance.
fn similarity(a: &str, b: &str) -> f32 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f32 / longest as f32
}

/// Fold close deletion/addition pairs into movements.
fn pair_movements(changes: Vec<Change>, threshold: f32) -> Vec<Change> {
    let movable = |c: &Change, kind: DiffType| {
        c.diff_type == kind
            && c.a.as_ref().or(c.b.as_ref()).is_some_and(|l| l.text.chars().count() >= MIN_MOVEMENT_CHARS)
    };
    let mut taken = vec![false; changes.len()];
    let mut moves = Vec::new();

    for (i, deletion) in changes.iter().enumerate() {
        if !movable(deletion, DiffType::Deletion) {
            continue;
        }
        let Some(removed) = deletion.a.as_ref() else { continue };
        let best = changes
            .iter()
            .enumerate()
            .filter(|(j, c)| !taken[*j] && movable(c, DiffType::Addition))
            .filter_map(|(j, c)| {
                let added = c.b.as_ref()?;
                Some((j, similarity(&removed.text, &added.text)))
            })
            .filter(|(_, score)| *score >= threshold)
            .max_by(|x, y| x.1.total_cmp(&y.1));
        if let Some((j, score)) = best {
            taken[i] = true;
            taken[j] = true;
            moves.push((
                Change {
                    page: deletion.page,
                    position: deletion.position,
                    diff_type: DiffType::Movement,
                    a: deletion.a.clone(),
                    b: changes[j].b.clone(),
                },
                score,
            ));
        }
    }

    let mut out: Vec<Change> = changes
        .into_iter()
        .zip(taken)
        .filter_map(|(c, t)| (!t).then_some(c))
        .collect();
    out.extend(moves.into_iter().map(|(c, _)| c));
    out
}

fn confidence(change: &Change) -> u8 {
    match (&change.diff_type, &change.a, &change.b) {
        (DiffType::Movement, Some(a), Some(b)) => (similarity(&a.text, &b.text) * 100.0).round() as u8,
        _ => 100,
    }
}

/// Compare `a` against `b`.
#[instrument(skip_all, fields(structure_aware = settings.structure_aware))]
pub fn compare(
    a: &PdfDocument,
    b: &PdfDocument,
    settings: &CompareSettings,
    cancel: &CancelToken,
) -> Result<ComparisonResult> {
    let mut pages_a = Vec::new();
    for page in a.pages() {
        cancel.check()?;
        pages_a.push(PageWords::read(a, &page)?);
    }
    let mut pages_b = Vec::new();
    for page in b.pages() {
        cancel.check()?;
        pages_b.push(PageWords::read(b, &page)?);
    }

    let alignment = if settings.structure_aware {
        structural(&pages_a, &pages_b)
    } else {
        positional(pages_a.len(), pages_b.len())
    };
    debug!(aligned = alignment.len(), "pages aligned");

    let mut changes = Vec::new();
    for step in &alignment {
        cancel.check()?;
        match *step {
            Alignment::Pair(i, j) => diff_pages(&pages_a[i], &pages_b[j], &mut changes),
            Alignment::OnlyA(i) if !pages_a[i].words.is_empty() => changes.push(Change {
                page: pages_a[i].number,
                position: 0,
                diff_type: DiffType::Deletion,
                a: Some(pages_a[i].whole()),
                b: None,
            }),
            Alignment::OnlyB(j) if !pages_b[j].words.is_empty() => changes.push(Change {
                page: pages_b[j].number,
                position: 0,
                diff_type: DiffType::Addition,
                a: None,
                b: Some(pages_b[j].whole()),
            }),
            _ => {}
        }
    }

    let threshold = settings.movement_threshold.clamp(0.0, 1.0);
    let mut changes: Vec<Change> = pair_movements(changes, threshold)
        .into_iter()
        .filter(|c| c.diff_type == DiffType::Movement || c.changed_chars() >= settings.sensitivity.max(1))
        .collect();
    changes.sort_by_key(|c| (c.page, c.position));

    let diffs: Vec<DiffRecord> = changes
        .iter()
        .map(|c| DiffRecord {
            page: c.page,
            diff_type: c.diff_type,
            location_a: c.a.clone(),
            location_b: c.b.clone(),
            confidence: confidence(c),
        })
        .collect();
    let count = |kind: DiffType| diffs.iter().filter(|d| d.diff_type == kind).count();
    let result = ComparisonResult {
        pages_a: a.page_count(),
        pages_b: b.page_count(),
        additions: count(DiffType::Addition),
        deletions: count(DiffType::Deletion),
        modifications: count(DiffType::Modification),
        movements: count(DiffType::Movement),
        diffs,
    };
    info!(
        additions = result.additions,
        deletions = result.deletions,
        modifications = result.modifications,
        movements = result.movements,
        "comparison complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::fixtures;
    use docforge_core::types::DocumentId;

    fn settings(structure_aware: bool) -> CompareSettings {
        CompareSettings {
            other_document_id: DocumentId::new(),
            structure_aware,
            sensitivity: 1,
            movement_threshold: 0.9,
        }
    }

    fn doc(pages: &[&str]) -> PdfDocument {
        PdfDocument::load(&fixtures::text_document(pages)).unwrap()
    }

    fn run(a: &PdfDocument, b: &PdfDocument, structure_aware: bool) -> ComparisonResult {
        compare(a, b, &settings(structure_aware), &CancelToken::new()).unwrap()
    }

    const PAGES: [&str; 4] = [
        "Quarterly report for the northern region",
        "Revenue grew by twelve percent this quarter",
        "Headcount remained stable across all offices",
        "Outlook for next year is cautiously positive",
    ];

    #[test]
    fn identical_documents_have_no_diffs() {
        let d = doc(&PAGES);
        for structure_aware in [false, true] {
            let result = run(&d, &d, structure_aware);
            assert!(result.diffs.is_empty());
            assert_eq!(result.pages_a, 4);
        }
    }

    #[test]
    fn deleted_page_is_a_single_deletion() {
        let a = doc(&PAGES);
        let b = doc(&[PAGES[0], PAGES[2], PAGES[3]]);
        let result = run(&a, &b, true);
        assert_eq!(result.diffs.len(), 1);
        let diff = &result.diffs[0];
        assert_eq!(diff.diff_type, DiffType::Deletion);
        assert_eq!(diff.page, 2);
        assert_eq!(diff.location_a.as_ref().unwrap().text, PAGES[1]);
        assert!(diff.location_b.is_none());
    }

    #[test]
    fn positional_alignment_cascades() {
        let a = doc(&PAGES);
        let b = doc(&[PAGES[0], PAGES[2], PAGES[3]]);
        let result = run(&a, &b, false);
        assert!(result.modifications >= 2);
    }

    #[test]
    fn word_changes_are_modifications() {
        let a = doc(&["the total is 400 dollars"]);
        let b = doc(&["the total is 450 dollars"]);
        let result = run(&a, &b, false);
        assert_eq!(result.modifications, 1);
        let diff = &result.diffs[0];
        assert_eq!(diff.location_a.as_ref().unwrap().text, "400");
        assert_eq!(diff.location_b.as_ref().unwrap().text, "450");
        assert_eq!(diff.location_a.as_ref().unwrap().word_index, 3);
        assert!(diff.location_a.as_ref().unwrap().bounding_box.is_some());
    }

    #[test]
    fn sensitivity_hides_small_changes() {
        let a = doc(&["the total is 400 dollars"]);
        let b = doc(&["the total is 450 dollars"]);
        let mut quiet = settings(false);
        quiet.sensitivity = 2;
        let result = compare(&a, &b, &quiet, &CancelToken::new()).unwrap();
        assert!(result.diffs.is_empty());
    }

    #[test]
    fn moved_pages_are_movements() {
        let a = doc(&PAGES);
        let b = doc(&[PAGES[0], PAGES[2], PAGES[3], PAGES[1]]);
        let result = run(&a, &b, true);
        assert_eq!(result.movements, 1);
        assert_eq!(result.diffs.len(), 1);
        let diff = &result.diffs[0];
        assert_eq!(diff.location_a.as_ref().unwrap().page, 2);
        assert_eq!(diff.location_b.as_ref().unwrap().page, 4);
        assert_eq!(diff.confidence, 100);
    }

    #[test]
    fn a_strict_threshold_disables_movements() {
        let a = doc(&PAGES);
        let b = doc(&[PAGES[0], PAGES[2], PAGES[3], "Revenue grew by ten percent this quarter"]);
        let mut strict = settings(true);
        strict.movement_threshold = 1.0;
        let result = compare(&a, &b, &strict, &CancelToken::new()).unwrap();
        assert_eq!(result.movements, 0);
        assert_eq!(result.deletions, 1);
        assert_eq!(result.additions, 1);
    }

    #[test]
    fn diffs_are_ordered_by_page() {
        let a = doc(&["one two three", "four five six"]);
        let b = doc(&["one 2 three", "four 5 six"]);
        let result = run(&a, &b, false);
        let pages: Vec<u32> = result.diffs.iter().map(|d| d.page).collect();
        assert_eq!(pages, vec![1, 2]);
    }

    #[test]
    fn lcs_handles_common_prefix_and_suffix() {
        let pairs = lcs_pairs(&[1, 2, 3, 4], &[1, 3, 4]);
        assert_eq!(pairs, vec![(0, 0), (2, 1), (3, 2)]);
        assert_eq!(gaps(&pairs, 4, 3), vec![(1..2, 1..1)]);
    }

    #[test]
    fn lcs_finds_the_longest_subsequence() {
        let a: Vec<char> = "ABCBDAB".chars().collect();
        let b: Vec<char> = "BDCABA".chars().collect();
        let pairs = lcs_pairs(&a, &b);
        assert_eq!(pairs.len(), 4);
        assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1));
        assert!(pairs.iter().all(|&(i, j)| a[i] == b[j]));
    }

    #[test]
    fn lcs_of_long_unrelated_runs_stays_small() {
        let a: Vec<u32> = (0..4_000).collect();
        let b: Vec<u32> = (0..4_000).map(|i| if i % 2 == 0 { i } else { i + 1_000_000 }).rev().collect();
        let pairs = lcs_pairs(&a, &b);
        assert_eq!(pairs.len(), 1);

        let shuffled: Vec<u32> = (0..4_000).map(|i| if i % 3 == 0 { i } else { u32::MAX - i }).collect();
        assert_eq!(lcs_pairs(&a, &shuffled).len(), (0..4_000).filter(|i| i % 3 == 0).count());
    }

    fn lcs_length(a: &[u8], b: &[u8]) -> usize {
        let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
        for i in 0..a.len() {
            for j in 0..b.len() {
                table[i + 1][j + 1] = if a[i] == b[j] {
                    table[i][j] + 1
                } else {
                    table[i][j + 1].max(table[i + 1][j])
                };
            }
        }
        table[a.len()][b.len()]
    }

    proptest! {
        #[test]
        fn lcs_pairs_are_a_longest_common_subsequence(
            a in prop::collection::vec(0u8..4, 0..40),
            b in prop::collection::vec(0u8..4, 0..40)
        ) {
            let pairs = lcs_pairs(&a, &b);
            prop_assert_eq!(pairs.len(), lcs_length(&a, &b));
            prop_assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1));
            prop_assert!(pairs.iter().all(|&(i, j)| a[i] == b[j]));
        }
    }

    #[test]
    fn cancellation_stops_comparison() {
        let d = doc(&PAGES);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(compare(&d, &d, &settings(false), &cancel).is_err());
    }
}
