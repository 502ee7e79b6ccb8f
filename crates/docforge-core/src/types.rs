// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Docforge job engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, ForgeError};
use crate::geometry::BoundingBox;
use crate::results::JobResult;
use crate::settings::JobSettings;

/// Unique identifier for a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier handed out by the document store for uploaded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The operations a job can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    Redact,
    Repair,
    Compare,
    Ocr,
    Protect,
    PageNumber,
    Crop,
    /// Detection-only preview of what a redaction ruleset would hit.
    Scan,
}

impl JobKind {
    pub const ALL: [JobKind; 8] = [
        JobKind::Redact,
        JobKind::Repair,
        JobKind::Compare,
        JobKind::Ocr,
        JobKind::Protect,
        JobKind::PageNumber,
        JobKind::Crop,
        JobKind::Scan,
    ];

    /// Whether the job rewrites its input document and therefore needs the
    /// document's exclusive write lock.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Compare | Self::Scan)
    }

    /// Whether the job writes audit entries.
    pub fn is_audited(&self) -> bool {
        matches!(self, Self::Redact | Self::Repair)
    }

    /// Stable keyword used in logs and configuration keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redact => "redact",
            Self::Repair => "repair",
            Self::Compare => "compare",
            Self::Ocr => "ocr",
            Self::Protect => "protect",
            Self::PageNumber => "pageNumber",
            Self::Crop => "crop",
            Self::Scan => "scan",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states of a job.
///
/// `Queued -> Running -> {Succeeded, Failed, Cancelled}`; a queued job may
/// also go straight to `Cancelled` (explicit cancel) or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match self {
            Self::Queued => matches!(next, Self::Running | Self::Cancelled | Self::Failed),
            Self::Running => next.is_terminal(),
            Self::Succeeded | Self::Failed | Self::Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What a finding points at on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FindingKind {
    Text,
    Image,
}

/// Detection category attached to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PiiCategory {
    Ssn,
    Email,
    CreditCard,
    Phone,
    BankAccount,
    Keyword,
    Custom,
}

/// Content covered by a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum FindingContent {
    Text(String),
    /// An image XObject, by resource name and object number when indirect.
    Image { name: String, object: Option<u32> },
}

/// A typed hit produced by the content scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// 1-based page index.
    pub page: u32,
    pub kind: FindingKind,
    pub bounding_box: BoundingBox,
    pub content: FindingContent,
    pub category: Option<PiiCategory>,
    /// 0–100.
    pub confidence: u8,
    /// Name of the rule that produced the hit (pattern name or keyword).
    pub rule: Option<String>,
}

/// Where a redaction region came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionSource {
    Manual,
    Auto,
    Keyword,
    Pattern,
}

impl RegionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Keyword => "keyword",
            Self::Pattern => "pattern",
        }
    }
}

/// An area of a page whose content is (or will be) destroyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionRegion {
    pub page: u32,
    pub bounding_box: BoundingBox,
    pub source: RegionSource,
    pub applied_at: Option<DateTime<Utc>>,
}

impl RedactionRegion {
    pub fn pending(page: u32, bounding_box: BoundingBox, source: RegionSource) -> Self {
        Self {
            page,
            bounding_box,
            source,
            applied_at: None,
        }
    }
}

/// Kind of change reported by the comparison engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffType {
    Addition,
    Deletion,
    Modification,
    Movement,
}

/// One side of a diff record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLocation {
    /// 1-based page index in that document.
    pub page: u32,
    /// Word offset of the run within the page text.
    pub word_index: usize,
    pub bounding_box: Option<BoundingBox>,
    pub text: String,
}

/// A single typed change between two documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
    /// Page the record is ordered by (document A page where one exists).
    pub page: u32,
    #[serde(rename = "type")]
    pub diff_type: DiffType,
    pub location_a: Option<DiffLocation>,
    pub location_b: Option<DiffLocation>,
    /// 0–100.
    pub confidence: u8,
}

/// Machine-readable failure attached to a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ForgeError> for JobError {
    fn from(err: &ForgeError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A complete job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub document_id: DocumentId,
    pub settings: JobSettings,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
}

impl Job {
    pub fn new(document_id: DocumentId, settings: JobSettings) -> Self {
        Self {
            id: JobId::new(),
            kind: settings.kind(),
            state: JobState::Queued,
            document_id,
            settings,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_monotonic() {
        assert!(JobState::Queued.can_transition_to(JobState::Running));
        assert!(JobState::Queued.can_transition_to(JobState::Cancelled));
        assert!(JobState::Running.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Running.can_transition_to(JobState::Queued));
        assert!(!JobState::Running.can_transition_to(JobState::Running));
        for terminal in [JobState::Succeeded, JobState::Failed, JobState::Cancelled] {
            for next in [
                JobState::Queued,
                JobState::Running,
                JobState::Succeeded,
                JobState::Failed,
                JobState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn read_only_kinds_do_not_mutate() {
        assert!(!JobKind::Compare.is_mutating());
        assert!(!JobKind::Scan.is_mutating());
        assert!(JobKind::Redact.is_mutating());
        assert!(JobKind::Repair.is_mutating());
    }

    #[test]
    fn kind_serialises_camel_case() {
        let json = serde_json::to_string(&JobKind::PageNumber).unwrap();
        assert_eq!(json, "\"pageNumber\"");
        for kind in JobKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn diff_record_uses_type_field() {
        let record = DiffRecord {
            page: 2,
            diff_type: DiffType::Deletion,
            location_a: None,
            location_b: None,
            confidence: 100,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "deletion");
    }
}
