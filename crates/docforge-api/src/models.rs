// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docforge_core::results::JobResult;
use docforge_core::settings::{JobSettings, SecurityLevel};
use docforge_core::types::{DocumentId, Job, JobError, JobId, JobKind, JobState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub kind: JobKind,
    pub document_id: DocumentId,
    /// Kind-specific settings; omitted fields take their defaults.
    #[serde(default)]
    pub settings: Value,
}

impl SubmitJobRequest {
    /// Typed settings for this request. A redaction that leaves the security
    /// level unset gets `default_level`.
    pub fn job_settings(&self, default_level: SecurityLevel) -> serde_json::Result<JobSettings> {
        let mut settings = match &self.settings {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        if self.kind == JobKind::Redact
            && let Value::Object(map) = &mut settings
            && !map.contains_key("securityLevel")
        {
            map.insert("securityLevel".into(), serde_json::to_value(default_level)?);
        }
        serde_json::from_value(serde_json::json!({
            "kind": self.kind,
            "settings": settings,
        }))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub state: JobState,
}

/// A job as reported to clients. Settings are left out: protect jobs carry
/// passwords.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub document_id: DocumentId,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            state: job.state,
            document_id: job.document_id,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            result: job.result,
            error: job.error,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub document_id: DocumentId,
    pub hash: String,
    pub size: usize,
    pub version: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub workers: usize,
    pub ocr_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: JobKind, settings: Value) -> SubmitJobRequest {
        SubmitJobRequest {
            kind,
            document_id: DocumentId::new(),
            settings,
        }
    }

    #[test]
    fn missing_settings_take_defaults() {
        let settings = request(JobKind::Repair, Value::Null)
            .job_settings(SecurityLevel::Standard)
            .expect("settings");
        assert_eq!(settings.kind(), JobKind::Repair);
    }

    #[test]
    fn redaction_gets_the_configured_level() {
        let settings = request(JobKind::Redact, serde_json::json!({ "ruleset": { "ssn": true } }))
            .job_settings(SecurityLevel::Military)
            .expect("settings");
        let JobSettings::Redact(s) = settings else {
            panic!("expected redaction settings");
        };
        assert_eq!(s.security_level, SecurityLevel::Military);
        assert!(s.ruleset.ssn);
    }

    #[test]
    fn explicit_level_wins() {
        let settings = request(JobKind::Redact, serde_json::json!({ "securityLevel": "legal" }))
            .job_settings(SecurityLevel::Military)
            .expect("settings");
        let JobSettings::Redact(s) = settings else {
            panic!("expected redaction settings");
        };
        assert_eq!(s.security_level, SecurityLevel::Legal);
    }

    #[test]
    fn compare_without_other_document_is_rejected() {
        assert!(request(JobKind::Compare, Value::Null)
            .job_settings(SecurityLevel::Standard)
            .is_err());
    }
}
