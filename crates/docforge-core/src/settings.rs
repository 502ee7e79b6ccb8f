// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-operation settings. Every job carries exactly one of these, tagged by
// kind, and they are validated when the job is submitted.

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};
use crate::geometry::BoundingBox;
use crate::types::{DocumentId, JobKind};

/// Inclusive 1-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && page <= self.end
    }

    fn validate(&self) -> Result<()> {
        if self.start == 0 || self.end < self.start {
            return Err(ForgeError::InvalidSettings(format!(
                "page range {}-{} is invalid",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// `None` means every page.
pub fn page_selected(range: &Option<PageRange>, page: u32) -> bool {
    range.as_ref().is_none_or(|r| r.contains(page))
}

/// A user-supplied regular expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPattern {
    pub name: String,
    pub pattern: String,
}

/// Detection rules shared by the scan and redact jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ruleset {
    pub ssn: bool,
    pub credit_card: bool,
    pub phone: bool,
    pub email: bool,
    pub bank_account: bool,
    pub keywords: Vec<String>,
    pub case_sensitive: bool,
    /// Allow one edit per keyword token. Off by default.
    pub fuzzy: bool,
    pub custom_patterns: Vec<CustomPattern>,
    pub pages: Option<PageRange>,
}

impl Ruleset {
    /// True when no rule would ever produce a finding.
    pub fn is_empty(&self) -> bool {
        !self.ssn
            && !self.credit_card
            && !self.phone
            && !self.email
            && !self.bank_account
            && self.keywords.is_empty()
            && self.custom_patterns.is_empty()
    }
}

/// RGB colour, serialised as `[r, g, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const BLACK: Color = Color([0, 0, 0]);

    /// Components in the 0.0–1.0 range used by PDF colour operators.
    pub fn components(&self) -> [f32; 3] {
        self.0.map(|c| c as f32 / 255.0)
    }
}

/// Fill pattern drawn over a redacted area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FillPattern {
    #[default]
    Solid,
    Striped,
    Crosshatch,
    Dots,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedactionStyle {
    pub pattern: FillPattern,
    pub fill_color: Color,
    pub border_color: Option<Color>,
    /// 0.0–1.0.
    pub opacity: f32,
}

impl Default for RedactionStyle {
    fn default() -> Self {
        Self {
            pattern: FillPattern::Solid,
            fill_color: Color::BLACK,
            border_color: None,
            opacity: 1.0,
        }
    }
}

/// Redaction thoroughness. Each level maps to a number of rewrite passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityLevel {
    #[default]
    Standard,
    High,
    Military,
    Legal,
}

impl SecurityLevel {
    pub fn passes(&self) -> u32 {
        match self {
            Self::Standard => 1,
            Self::High => 3,
            Self::Military => 7,
            Self::Legal => 5,
        }
    }
}

/// A region the user drew by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualRegion {
    pub page: u32,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedactionSettings {
    pub ruleset: Ruleset,
    pub manual_regions: Vec<ManualRegion>,
    pub style: RedactionStyle,
    pub security_level: SecurityLevel,
    pub preserve_metadata: bool,
    /// Also redact every image placement the scanner reports.
    pub redact_images: bool,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            ruleset: Ruleset::default(),
            manual_regions: Vec::new(),
            style: RedactionStyle::default(),
            security_level: SecurityLevel::Standard,
            preserve_metadata: true,
            redact_images: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepairLevel {
    Basic,
    #[default]
    Standard,
    Aggressive,
    Recovery,
}

impl RepairLevel {
    /// Whether the level may rebuild an xref table from a linear object scan.
    pub fn rescans_objects(&self) -> bool {
        !matches!(self, Self::Basic)
    }

    /// Whether the level re-links orphaned pages and recovers content.
    pub fn recovers_content(&self) -> bool {
        !matches!(self, Self::Basic)
    }

    /// Whether malformed objects are discarded instead of failing the scan.
    pub fn discards_malformed(&self) -> bool {
        matches!(self, Self::Aggressive | Self::Recovery)
    }

    /// Whether the post-repair validation pass runs.
    pub fn validates(&self) -> bool {
        !matches!(self, Self::Recovery)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepairSettings {
    pub level: RepairLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareSettings {
    /// Document B; the job's own document is document A.
    pub other_document_id: DocumentId,
    #[serde(default)]
    pub structure_aware: bool,
    /// Minimum number of changed characters for a run to be reported.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: usize,
    /// Similarity (0.0–1.0) above which a removed/added run pair is a move.
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,
}

fn default_sensitivity() -> usize {
    1
}

fn default_movement_threshold() -> f32 {
    0.9
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcrSettings {
    /// Language hint recorded with the result.
    pub language: String,
    /// Run OCR even on pages that already carry a text layer.
    pub force: bool,
    pub pages: Option<PageRange>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".into(),
            force: false,
            pages: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permissions {
    pub print: bool,
    pub modify: bool,
    pub copy: bool,
    pub annotate: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            print: true,
            modify: false,
            copy: false,
            annotate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectSettings {
    pub user_password: String,
    /// Defaults to the user password when absent.
    #[serde(default)]
    pub owner_password: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StampPosition {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageNumberSettings {
    pub position: StampPosition,
    /// `{n}` is replaced by the page number, `{total}` by the page count.
    pub format: String,
    pub start_at: u32,
    pub font_size: f32,
    /// Distance from the page edge in points.
    pub margin: f32,
    pub pages: Option<PageRange>,
}

impl Default for PageNumberSettings {
    fn default() -> Self {
        Self {
            position: StampPosition::BottomCenter,
            format: "{n}".into(),
            start_at: 1,
            font_size: 10.0,
            margin: 24.0,
            pages: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CropSettings {
    /// Margins in points trimmed from the media box.
    pub margins: Margins,
    pub pages: Option<PageRange>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    pub ruleset: Ruleset,
    pub include_images: bool,
}

/// Settings for one job, tagged by the job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "settings", rename_all = "camelCase")]
pub enum JobSettings {
    Redact(RedactionSettings),
    Repair(RepairSettings),
    Compare(CompareSettings),
    Ocr(OcrSettings),
    Protect(ProtectSettings),
    PageNumber(PageNumberSettings),
    Crop(CropSettings),
    Scan(ScanSettings),
}

impl JobSettings {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Redact(_) => JobKind::Redact,
            Self::Repair(_) => JobKind::Repair,
            Self::Compare(_) => JobKind::Compare,
            Self::Ocr(_) => JobKind::Ocr,
            Self::Protect(_) => JobKind::Protect,
            Self::PageNumber(_) => JobKind::PageNumber,
            Self::Crop(_) => JobKind::Crop,
            Self::Scan(_) => JobKind::Scan,
        }
    }

    /// Structural validation that needs no document. Pattern compilation is
    /// checked separately by the scanner when the job is submitted.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Redact(s) => {
                validate_ruleset(&s.ruleset)?;
                if !(0.0..=1.0).contains(&s.style.opacity) {
                    return Err(ForgeError::InvalidSettings(format!(
                        "opacity {} outside 0.0–1.0",
                        s.style.opacity
                    )));
                }
                for region in &s.manual_regions {
                    if region.page == 0 || region.bounding_box.is_empty() {
                        return Err(ForgeError::InvalidSettings(format!(
                            "manual region on page {} is empty or unpaged",
                            region.page
                        )));
                    }
                }
                Ok(())
            }
            Self::Scan(s) => validate_ruleset(&s.ruleset),
            Self::Repair(_) => Ok(()),
            Self::Compare(s) => {
                if !(0.0..=1.0).contains(&s.movement_threshold) {
                    return Err(ForgeError::InvalidSettings(format!(
                        "movement threshold {} outside 0.0–1.0",
                        s.movement_threshold
                    )));
                }
                Ok(())
            }
            Self::Ocr(s) => s.pages.as_ref().map_or(Ok(()), PageRange::validate),
            Self::Protect(s) => {
                if s.user_password.is_empty() && s.owner_password.as_deref().is_none_or(str::is_empty) {
                    return Err(ForgeError::InvalidSettings(
                        "protect needs a user or owner password".into(),
                    ));
                }
                Ok(())
            }
            Self::PageNumber(s) => {
                if s.font_size <= 0.0 {
                    return Err(ForgeError::InvalidSettings("font size must be positive".into()));
                }
                if !s.format.contains("{n}") {
                    return Err(ForgeError::InvalidSettings(
                        "page number format must contain {n}".into(),
                    ));
                }
                s.pages.as_ref().map_or(Ok(()), PageRange::validate)
            }
            Self::Crop(s) => {
                let m = &s.margins;
                if [m.top, m.right, m.bottom, m.left].iter().any(|v| *v < 0.0) {
                    return Err(ForgeError::InvalidSettings("crop margins must be >= 0".into()));
                }
                s.pages.as_ref().map_or(Ok(()), PageRange::validate)
            }
        }
    }

    /// The second document a comparison reads, if any.
    pub fn secondary_document(&self) -> Option<DocumentId> {
        match self {
            Self::Compare(s) => Some(s.other_document_id),
            _ => None,
        }
    }
}

fn validate_ruleset(ruleset: &Ruleset) -> Result<()> {
    if ruleset.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ForgeError::InvalidSettings("empty keyword".into()));
    }
    ruleset.pages.as_ref().map_or(Ok(()), PageRange::validate)
}
