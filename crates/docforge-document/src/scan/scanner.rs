// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-by-page finding producer.

use docforge_core::error::Result;
use docforge_core::settings::Ruleset;
use docforge_core::types::{Finding, FindingContent, FindingKind};
use tracing::{debug, instrument};

use super::rules::CompiledRuleset;
use crate::model::{Page, PdfDocument, text};

/// Findings of one page, in content-stream order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFindings {
    pub page: u32,
    pub findings: Vec<Finding>,
}

/// Lazy sequence of [`PageFindings`], one per selected page, in page order.
///
/// Pages are interpreted only when the iterator reaches them, so a caller
/// polling a cancellation flag between items stops between pages. The same
/// document and rules always yield the same sequence; [`Scanner::restart`]
/// begins it again from the first page.
pub struct Scanner<'a> {
    doc: &'a PdfDocument,
    rules: CompiledRuleset,
    include_images: bool,
    pages: Vec<Page>,
    cursor: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(doc: &'a PdfDocument, ruleset: &Ruleset, include_images: bool) -> Result<Self> {
        let rules = CompiledRuleset::compile(ruleset)?;
        let pages = doc
            .pages()
            .into_iter()
            .filter(|p| rules.applies_to(p.number))
            .collect();
        Ok(Self {
            doc,
            rules,
            include_images,
            pages,
            cursor: 0,
        })
    }

    /// Number of pages the scanner visits.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn restart(&mut self) {
        self.cursor = 0;
    }

    #[instrument(skip(self), fields(page = page.number))]
    fn scan_page(&self, page: &Page) -> Result<Vec<Finding>> {
        let content = self.doc.content(page)?;
        let mut keyed: Vec<((usize, usize), Finding)> = Vec::new();

        if !self.rules.is_empty() {
            for line in text::build_lines(&content.glyphs) {
                for hit in self.rules.find(&line.text) {
                    let Some(bbox) = line.bbox_of(hit.range.clone()) else {
                        continue;
                    };
                    keyed.push((
                        (line.seq, hit.range.start),
                        Finding {
                            page: page.number,
                            kind: FindingKind::Text,
                            bounding_box: bbox,
                            content: FindingContent::Text(line.text[hit.range].to_string()),
                            category: Some(hit.category),
                            confidence: hit.confidence,
                            rule: Some(hit.rule),
                        },
                    ));
                }
            }
        }

        if self.include_images {
            for image in &content.images {
                let name = if image.is_inline() {
                    "inline".to_string()
                } else {
                    String::from_utf8_lossy(&image.name).into_owned()
                };
                keyed.push((
                    (image.seq, 0),
                    Finding {
                        page: page.number,
                        kind: FindingKind::Image,
                        bounding_box: image.bbox,
                        content: FindingContent::Image {
                            name,
                            object: image.object.map(|id| id.0),
                        },
                        category: None,
                        confidence: 100,
                        rule: None,
                    },
                ));
            }
        }

        keyed.sort_by_key(|(key, _)| *key);
        debug!(findings = keyed.len(), "page scanned");
        Ok(keyed.into_iter().map(|(_, f)| f).collect())
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<PageFindings>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = *self.pages.get(self.cursor)?;
        self.cursor += 1;
        Some(self.scan_page(&page).map(|findings| PageFindings {
            page: page.number,
            findings,
        }))
    }
}

/// Start a scan of `doc`. Fails with `InvalidPattern` before any page is read
/// when a custom pattern does not compile.
pub fn scan<'a>(doc: &'a PdfDocument, ruleset: &Ruleset, include_images: bool) -> Result<Scanner<'a>> {
    Scanner::new(doc, ruleset, include_images)
}
