// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Redaction engine.
//
// Findings from the scanner and manual regions are merged per page, the
// content under each merged region is destroyed, the fill style is drawn,
// affected streams are rewritten into fresh objects once per security pass,
// and the serialised output is reloaded to prove nothing is left to extract.

pub mod style;

use std::collections::BTreeMap;

use chrono::Utc;
use docforge_core::error::{ForgeError, Result};
use docforge_core::geometry::merge_overlapping;
use docforge_core::results::RedactionResult;
use docforge_core::settings::RedactionSettings;
use docforge_core::types::{FindingKind, PiiCategory, RedactionRegion, RegionSource};
use docforge_core::{BoundingBox, CancelToken};
use docforge_security::{NewAuditEntry, hash_bytes};
use lopdf::{Document, Object, ObjectId, Stream};
use tracing::{debug, info, instrument, warn};

use crate::model::{PdfDocument, RemovalStats};
use crate::scan::Scanner;

/// Audit action recorded once per applied region.
pub const AUDIT_ACTION: &str = "redacted";

/// Everything a finished redaction hands back to the job layer.
#[derive(Debug, Clone)]
pub struct RedactionOutcome {
    pub bytes: Vec<u8>,
    pub result: RedactionResult,
    pub audit: Vec<NewAuditEntry>,
}

fn source_of(kind: FindingKind, category: Option<PiiCategory>) -> RegionSource {
    match (kind, category) {
        (FindingKind::Image, _) | (_, None) => RegionSource::Auto,
        (_, Some(PiiCategory::Keyword)) => RegionSource::Keyword,
        (_, Some(_)) => RegionSource::Pattern,
    }
}

/// Manual regions followed by scanner findings, unmerged, in page order.
#[instrument(skip_all)]
pub fn collect_regions(
    doc: &PdfDocument,
    settings: &RedactionSettings,
    cancel: &CancelToken,
) -> Result<Vec<RedactionRegion>> {
    let mut regions = Vec::new();
    for manual in &settings.manual_regions {
        doc.page(manual.page)?;
        regions.push(RedactionRegion::pending(
            manual.page,
            manual.bounding_box,
            RegionSource::Manual,
        ));
    }

    let scanner = Scanner::new(doc, &settings.ruleset, settings.redact_images)?;
    for page in scanner {
        cancel.check()?;
        let page = page?;
        regions.extend(page.findings.into_iter().map(|f| {
            RedactionRegion::pending(f.page, f.bounding_box, source_of(f.kind, f.category))
        }));
    }
    regions.sort_by_key(|r| r.page);
    Ok(regions)
}

/// Merge overlapping regions page by page. A merged region takes the source
/// of the first region folded into it.
pub fn merge_regions(regions: &[RedactionRegion]) -> BTreeMap<u32, Vec<RedactionRegion>> {
    let mut by_page: BTreeMap<u32, Vec<&RedactionRegion>> = BTreeMap::new();
    for region in regions {
        by_page.entry(region.page).or_default().push(region);
    }

    by_page
        .into_iter()
        .map(|(page, group)| {
            let boxes: Vec<BoundingBox> = group.iter().map(|r| r.bounding_box).collect();
            let merged = merge_overlapping(&boxes)
                .into_iter()
                .map(|bbox| {
                    let source = group
                        .iter()
                        .find(|r| bbox.contains(&r.bounding_box))
                        .map_or(RegionSource::Auto, |r| r.source);
                    RedactionRegion::pending(page, bbox, source)
                })
                .collect();
            (page, merged)
        })
        .collect()
}

/// Redact `doc` in place and serialise the result.
#[instrument(skip_all, fields(level = ?settings.security_level))]
pub fn redact(
    doc: &mut PdfDocument,
    settings: &RedactionSettings,
    cancel: &CancelToken,
) -> Result<RedactionOutcome> {
    let regions = collect_regions(doc, settings, cancel)?;
    let merged = merge_regions(&regions);
    debug!(found = regions.len(), pages = merged.len(), "regions merged");

    let mut stats = RemovalStats::default();
    let mut applied: Vec<RedactionRegion> = Vec::new();
    let mut touched: Vec<ObjectId> = Vec::new();

    for (number, page_regions) in &merged {
        cancel.check()?;
        let page = doc.page(*number)?;
        for region in page_regions {
            let removed = doc.remove_region(&page, &region.bounding_box)?;
            debug!(page = number, ?removed, "region removed");
            stats.add(&removed);
        }

        let boxes: Vec<BoundingBox> = page_regions.iter().map(|r| r.bounding_box).collect();
        let (ops, resources) = style::fill_operations(&boxes, &settings.style);
        doc.append_content(&page, ops, resources)?;
        touched.push(page.id);

        let now = Utc::now();
        applied.extend(page_regions.iter().cloned().map(|mut r| {
            r.applied_at = Some(now);
            r
        }));
    }

    let metadata_scrubbed = !settings.preserve_metadata && doc.scrub_metadata();

    let passes = settings.security_level.passes();
    for pass in 1..=passes {
        cancel.check()?;
        let moved = relocate_page_streams(doc.inner_mut(), &touched)?;
        debug!(pass, moved, "rewrite pass");
    }
    let pruned = doc.inner_mut().prune_objects();
    debug!(pruned = pruned.len(), "superseded objects dropped");

    let bytes = doc.serialize()?;
    verify(&bytes, &applied)?;

    let audit = applied
        .iter()
        .map(|r| {
            let b = &r.bounding_box;
            NewAuditEntry::new(
                Some(r.page),
                AUDIT_ACTION,
                format!(
                    "{} region [{:.1} {:.1} {:.1} {:.1}]",
                    r.source.as_str(),
                    b.x0,
                    b.y0,
                    b.x1,
                    b.y1
                ),
            )
        })
        .collect();

    let result = RedactionResult {
        pages_modified: merged.keys().copied().collect(),
        regions: applied,
        glyphs_removed: stats.glyphs,
        images_redacted: stats.images,
        paths_removed: stats.paths,
        security_level: settings.security_level,
        passes,
        metadata_scrubbed,
        output_hash: hash_bytes(&bytes),
    };
    info!(
        regions = result.regions.len(),
        glyphs = stats.glyphs,
        images = stats.images,
        "redaction complete"
    );

    Ok(RedactionOutcome {
        bytes,
        result,
        audit,
    })
}

/// Reload the output and fail if any region still yields text. The error
/// reports how much survived, never the text itself.
fn verify(bytes: &[u8], regions: &[RedactionRegion]) -> Result<()> {
    let doc = PdfDocument::load(bytes)?;
    for region in regions {
        let page = doc.page(region.page)?;
        let residual = doc.text_in_region(&page, &region.bounding_box)?;
        let left = residual.chars().filter(|c| !c.is_whitespace()).count();
        if left > 0 {
            warn!(page = region.page, left, "text survived redaction");
            return Err(ForgeError::IncompleteRedaction {
                page: region.page,
                residual: format!("{left} characters"),
            });
        }
    }
    Ok(())
}

/// Copy `id` into a new object, decoded and recompressed where the filter
/// allows it.
fn relocate_stream(doc: &mut Document, id: ObjectId) -> Result<Option<ObjectId>> {
    let Ok(Object::Stream(stream)) = doc.get_object(id) else {
        return Ok(None);
    };
    let fresh = match stream.decompressed_content() {
        Ok(data) => {
            let mut dict = stream.dict.clone();
            for key in [b"Filter".as_slice(), b"DecodeParms", b"Length"] {
                dict.remove(key);
            }
            let mut fresh = Stream::new(dict, data);
            fresh
                .compress()
                .map_err(|e| ForgeError::Pdf(format!("compressing stream {id:?}: {e}")))?;
            fresh
        }
        Err(_) if stream.dict.has(b"Filter") => stream.clone(),
        Err(_) => Stream::new(stream.dict.clone(), stream.content.clone()),
    };
    Ok(Some(doc.add_object(fresh)))
}

/// Move every content stream of `pages`, and every XObject the redaction
/// wrote for them, into fresh objects.
fn relocate_page_streams(doc: &mut Document, pages: &[ObjectId]) -> Result<usize> {
    let mut moved = 0;
    for &page_id in pages {
        let contents: Vec<ObjectId> = match doc.get_dictionary(page_id).ok().and_then(|d| d.get(b"Contents").ok()) {
            Some(Object::Array(items)) => items.iter().filter_map(|o| o.as_reference().ok()).collect(),
            Some(Object::Reference(id)) => vec![*id],
            _ => Vec::new(),
        };
        let mut relocated = Vec::with_capacity(contents.len());
        for id in contents {
            relocated.push(Object::Reference(relocate_stream(doc, id)?.unwrap_or(id)));
            moved += 1;
        }

        let written: Vec<(Vec<u8>, ObjectId)> = doc
            .get_dictionary(page_id)
            .ok()
            .and_then(|d| d.get(b"Resources").ok())
            .and_then(|r| r.as_dict().ok())
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| x.as_dict().ok())
            .map(|x| {
                x.iter()
                    .filter(|(name, _)| name.starts_with(b"DF"))
                    .filter_map(|(name, obj)| obj.as_reference().ok().map(|id| (name.clone(), id)))
                    .collect()
            })
            .unwrap_or_default();
        let mut renamed = Vec::with_capacity(written.len());
        for (name, id) in written {
            if let Some(new_id) = relocate_stream(doc, id)? {
                renamed.push((name, new_id));
                moved += 1;
            }
        }

        let dict = doc
            .get_dictionary_mut(page_id)
            .map_err(|e| ForgeError::Pdf(format!("page {page_id:?}: {e}")))?;
        dict.set("Contents", relocated);
        if !renamed.is_empty()
            && let Ok(Object::Dictionary(resources)) = dict.get_mut(b"Resources")
            && let Ok(Object::Dictionary(xobjects)) = resources.get_mut(b"XObject")
        {
            for (name, id) in renamed {
                xobjects.set(name, id);
            }
        }
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::scan::scan;
    use docforge_core::settings::{
        FillPattern, ManualRegion, RedactionStyle, Ruleset, SecurityLevel,
    };

    fn ssn_settings(level: SecurityLevel) -> RedactionSettings {
        RedactionSettings {
            ruleset: Ruleset {
                ssn: true,
                ..Ruleset::default()
            },
            security_level: level,
            ..RedactionSettings::default()
        }
    }

    fn load(bytes: &[u8]) -> PdfDocument {
        PdfDocument::load(bytes).unwrap()
    }

    /// `text` at 12pt with `extra` operators applied after the font is set.
    fn drawn_with(font: lopdf::Dictionary, extra: Vec<lopdf::content::Operation>, text: &str) -> Vec<u8> {
        use lopdf::content::Operation;
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
        ];
        ops.extend(extra);
        ops.extend([
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]);
        fixtures::operations_document(font, ops)
    }

    fn assert_ssn_destroyed(bytes: &[u8]) {
        let mut doc = load(bytes);
        assert!(doc.page_text(&doc.page(1).unwrap()).unwrap().contains("123-45-6789"));

        let outcome = redact(&mut doc, &ssn_settings(SecurityLevel::Standard), &CancelToken::new()).unwrap();
        assert_eq!(outcome.result.regions.len(), 1);
        assert!(outcome.result.glyphs_removed >= 9);

        let out = load(&outcome.bytes);
        let page = out.page(1).unwrap();
        assert!(!out.page_text(&page).unwrap().contains("6789"));
        assert_eq!(out.text_in_region(&page, &outcome.result.regions[0].bounding_box).unwrap(), "");
    }

    #[test]
    fn ssn_is_destroyed_and_audited_once() {
        let mut doc = load(&fixtures::text_document(&["Employee SSN: 123-45-6789 on file"]));
        let outcome = redact(&mut doc, &ssn_settings(SecurityLevel::Standard), &CancelToken::new()).unwrap();

        assert_eq!(outcome.result.regions.len(), 1);
        assert_eq!(outcome.audit.len(), 1);
        assert_eq!(outcome.audit[0].action, "redacted");
        assert_eq!(outcome.result.pages_modified, vec![1]);
        assert_eq!(outcome.result.glyphs_removed, 11);

        let out = load(&outcome.bytes);
        let text = out.page_text(&out.page(1).unwrap()).unwrap();
        assert!(!text.contains("123-45-6789"));
        assert!(!text.contains("6789"));
        assert!(text.contains("Employee SSN:"));
        assert!(text.contains("on file"));
    }

    #[test]
    fn zero_horizontal_scaling_does_not_hide_text() {
        let tz = lopdf::content::Operation::new("Tz", vec![0.into()]);
        assert_ssn_destroyed(&drawn_with(fixtures::helvetica_font(), vec![tz], "SSN: 123-45-6789"));
    }

    #[test]
    fn zero_width_glyphs_are_removed() {
        assert_ssn_destroyed(&drawn_with(fixtures::widths_font(0), Vec::new(), "SSN: 123-45-6789"));
    }

    #[test]
    fn invisible_text_is_removed() {
        let tr = lopdf::content::Operation::new("Tr", vec![3.into()]);
        assert_ssn_destroyed(&drawn_with(fixtures::helvetica_font(), vec![tr], "SSN: 123-45-6789"));
    }

    #[test]
    fn card_beside_cvv_is_redacted_without_the_cvv() {
        let bytes = drawn_with(
            fixtures::helvetica_font(),
            Vec::new(),
            "Card 4111 1111 1111 1111 123 exp",
        );
        let settings = RedactionSettings {
            ruleset: Ruleset {
                credit_card: true,
                ..Ruleset::default()
            },
            security_level: SecurityLevel::High,
            ..RedactionSettings::default()
        };
        let mut doc = load(&bytes);
        let outcome = redact(&mut doc, &settings, &CancelToken::new()).unwrap();
        assert_eq!(outcome.result.regions.len(), 1);

        let out = load(&outcome.bytes);
        let text = out.page_text(&out.page(1).unwrap()).unwrap();
        assert!(!text.contains("1111"));
        assert!(text.contains("123"));
    }

    #[test]
    fn explicit_widths_font_is_redacted_precisely() {
        let bytes = drawn_with(fixtures::widths_font(600), Vec::new(), "SSN 123-45-6789 kept");
        let mut doc = load(&bytes);
        let outcome = redact(&mut doc, &ssn_settings(SecurityLevel::High), &CancelToken::new()).unwrap();
        assert_eq!(outcome.result.glyphs_removed, 11);
        let out = load(&outcome.bytes);
        let text = out.page_text(&out.page(1).unwrap()).unwrap();
        assert!(text.starts_with("SSN"));
        assert!(text.ends_with("kept"));
        assert!(!text.contains("45"));
    }

    #[test]
    fn type0_text_is_redacted() {
        let mut doc = load(&fixtures::type0_document("Card SSN 123-45-6789 end"));
        let outcome = redact(&mut doc, &ssn_settings(SecurityLevel::Standard), &CancelToken::new()).unwrap();
        assert_eq!(outcome.result.regions.len(), 1);
        let out = load(&outcome.bytes);
        let text = out.page_text(&out.page(1).unwrap()).unwrap();
        assert!(!text.contains("6789"));
        assert!(text.contains("Card SSN"));
        assert!(text.contains("end"));
    }

    #[test]
    fn residual_text_fails_verification() {
        let bytes = drawn_with(fixtures::helvetica_font(), Vec::new(), "SSN: 123-45-6789");
        let region = RedactionRegion::pending(1, BoundingBox::new(60.0, 700.0, 300.0, 740.0), RegionSource::Manual);
        assert!(matches!(
            verify(&bytes, &[region]),
            Err(ForgeError::IncompleteRedaction { page: 1, .. })
        ));

        let tz = lopdf::content::Operation::new("Tz", vec![0.into()]);
        let collapsed = drawn_with(fixtures::helvetica_font(), vec![tz], "SSN: 123-45-6789");
        let around_origin = RedactionRegion::pending(1, BoundingBox::new(71.0, 719.0, 73.0, 721.0), RegionSource::Manual);
        assert!(verify(&collapsed, &[around_origin]).is_err());
    }

    #[test]
    fn every_security_level_leaves_regions_empty() {
        for level in [
            SecurityLevel::Standard,
            SecurityLevel::High,
            SecurityLevel::Military,
            SecurityLevel::Legal,
        ] {
            let mut doc = load(&fixtures::text_document(&["a 123-45-6789 b", "123-45-6789"]));
            let outcome = redact(&mut doc, &ssn_settings(level), &CancelToken::new()).unwrap();
            assert_eq!(outcome.result.passes, level.passes());
            let out = load(&outcome.bytes);
            for region in &outcome.result.regions {
                let page = out.page(region.page).unwrap();
                assert_eq!(out.text_in_region(&page, &region.bounding_box).unwrap(), "");
            }
            assert_eq!(out.page_count(), 2);
        }
    }

    #[test]
    fn redaction_is_idempotent() {
        let mut doc = load(&fixtures::text_document(&["call 555-123-4567 now"]));
        let settings = RedactionSettings {
            ruleset: Ruleset {
                phone: true,
                ..Ruleset::default()
            },
            ..RedactionSettings::default()
        };
        let first = redact(&mut doc, &settings, &CancelToken::new()).unwrap();
        let once = load(&first.bytes);
        let text_once = once.page_text(&once.page(1).unwrap()).unwrap();

        let mut again = load(&first.bytes);
        let second = redact(&mut again, &settings, &CancelToken::new()).unwrap();
        assert!(second.result.regions.is_empty());
        let twice = load(&second.bytes);
        assert_eq!(twice.page_text(&twice.page(1).unwrap()).unwrap(), text_once);
    }

    #[test]
    fn manual_regions_merge_and_keep_their_source() {
        let region = |x0, x1| ManualRegion {
            page: 1,
            bounding_box: BoundingBox::new(x0, 700.0, x1, 740.0),
        };
        let mut doc = load(&fixtures::text_document(&["Top secret heading"]));
        let settings = RedactionSettings {
            manual_regions: vec![region(60.0, 100.0), region(90.0, 200.0)],
            style: RedactionStyle {
                pattern: FillPattern::Striped,
                ..RedactionStyle::default()
            },
            ..RedactionSettings::default()
        };
        let outcome = redact(&mut doc, &settings, &CancelToken::new()).unwrap();
        assert_eq!(outcome.result.regions.len(), 1);
        assert_eq!(outcome.result.regions[0].source, RegionSource::Manual);
        assert!(outcome.result.regions[0].applied_at.is_some());
        assert_eq!(outcome.audit.len(), 1);

        let out = load(&outcome.bytes);
        assert_eq!(out.page_text(&out.page(1).unwrap()).unwrap().trim(), "");
    }

    #[test]
    fn manual_region_on_missing_page_fails() {
        let mut doc = load(&fixtures::text_document(&["x"]));
        let settings = RedactionSettings {
            manual_regions: vec![ManualRegion {
                page: 3,
                bounding_box: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            }],
            ..RedactionSettings::default()
        };
        assert!(matches!(
            redact(&mut doc, &settings, &CancelToken::new()),
            Err(ForgeError::PageIndexOutOfRange { page: 3, .. })
        ));
    }

    #[test]
    fn metadata_is_scrubbed_on_request() {
        let mut doc = load(&fixtures::text_document(&["nothing sensitive"]));
        let settings = RedactionSettings {
            preserve_metadata: false,
            ..RedactionSettings::default()
        };
        let outcome = redact(&mut doc, &settings, &CancelToken::new()).unwrap();
        assert!(outcome.result.metadata_scrubbed);
        assert!(load(&outcome.bytes).metadata().is_empty());
    }

    #[test]
    fn images_are_redacted_when_requested() {
        let mut doc = load(&fixtures::image_document());
        let settings = RedactionSettings {
            redact_images: true,
            ..RedactionSettings::default()
        };
        let outcome = redact(&mut doc, &settings, &CancelToken::new()).unwrap();
        assert_eq!(outcome.result.images_redacted, 1);

        let out = load(&outcome.bytes);
        let remaining = scan(&out, &Ruleset::default(), true)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert!(remaining.findings.is_empty());
    }

    #[test]
    fn cancelled_token_stops_redaction() {
        let mut doc = load(&fixtures::numbered_document(3));
        let cancel = CancelToken::new();
        cancel.cancel();
        let settings = RedactionSettings {
            ruleset: Ruleset {
                keywords: vec!["topic".into()],
                ..Ruleset::default()
            },
            ..RedactionSettings::default()
        };
        assert!(matches!(redact(&mut doc, &settings, &cancel), Err(ForgeError::Cancelled)));
    }
}
