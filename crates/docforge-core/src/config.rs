// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};
use crate::settings::SecurityLevel;
use crate::types::JobKind;

/// File name of the persisted configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Per-kind execution time limits, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobTimeouts {
    pub redact: u64,
    pub repair: u64,
    pub compare: u64,
    pub ocr: u64,
    pub protect: u64,
    pub page_number: u64,
    pub crop: u64,
    pub scan: u64,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            redact: 300,
            repair: 300,
            compare: 300,
            ocr: 900,
            protect: 120,
            page_number: 120,
            crop: 60,
            scan: 300,
        }
    }
}

impl JobTimeouts {
    pub fn for_kind(&self, kind: JobKind) -> Duration {
        let secs = match kind {
            JobKind::Redact => self.redact,
            JobKind::Repair => self.repair,
            JobKind::Compare => self.compare,
            JobKind::Ocr => self.ocr,
            JobKind::Protect => self.protect,
            JobKind::PageNumber => self.page_number,
            JobKind::Crop => self.crop,
            JobKind::Scan => self.scan,
        };
        Duration::from_secs(secs)
    }

    /// Apply the same limit to every kind.
    pub fn uniform(secs: u64) -> Self {
        Self {
            redact: secs,
            repair: secs,
            compare: secs,
            ocr: secs,
            protect: secs,
            page_number: secs,
            crop: secs,
            scan: secs,
        }
    }
}

/// Persistent engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Number of worker tasks (default: CPU count).
    pub workers: usize,
    pub timeouts: JobTimeouts,
    /// Finished jobs older than this are purged along with their audit entries.
    pub retention_hours: u64,
    /// How often the retention purge runs, in seconds.
    pub purge_interval_secs: u64,
    /// Holds `jobs.db`, `audit.db` and `config.json`.
    pub data_dir: PathBuf,
    pub listen_addr: String,
    /// Directory holding `text-detection.rten` and `text-recognition.rten`.
    pub ocr_model_dir: Option<PathBuf>,
    /// Applied when a redaction request leaves the level unset.
    pub default_security_level: SecurityLevel,
    /// Upper bound on uploaded document size, in bytes.
    pub max_document_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            timeouts: JobTimeouts::default(),
            retention_hours: 24,
            purge_interval_secs: 600,
            data_dir: PathBuf::from("docforge-data"),
            listen_addr: "127.0.0.1:8080".into(),
            ocr_model_dir: None,
            default_security_level: SecurityLevel::Standard,
            max_document_bytes: 64 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Load `config.json` from `data_dir`, falling back to defaults when the
    /// file does not exist. The result's `data_dir` is always `data_dir`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str::<EngineConfig>(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EngineConfig::default(),
            Err(e) => return Err(e.into()),
        };
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Load from the directory named by `DOCFORGE_DATA_DIR` (or the default),
    /// then apply the remaining `DOCFORGE_*` overrides.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("DOCFORGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| EngineConfig::default().data_dir);
        let mut config = Self::load(&data_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `DOCFORGE_LISTEN_ADDR`, `DOCFORGE_WORKERS` and
    /// `DOCFORGE_OCR_MODELS` from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup("DOCFORGE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(workers) = lookup("DOCFORGE_WORKERS") {
            self.workers = workers.parse().map_err(|_| {
                ForgeError::InvalidSettings(format!("DOCFORGE_WORKERS={workers:?} is not a number"))
            })?;
        }
        if let Some(dir) = lookup("DOCFORGE_OCR_MODELS") {
            self.ocr_model_dir = Some(PathBuf::from(dir));
        }
        self.validate()
    }

    pub fn persist(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(self.data_dir.join(CONFIG_FILE), json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ForgeError::InvalidSettings("workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }
}
