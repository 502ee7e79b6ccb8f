// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of what redaction and repair jobs did
// to a document.
//
// Schema:
//   audit_log(
//     id         INTEGER PRIMARY KEY AUTOINCREMENT,
//     job_id     TEXT    NOT NULL,   -- UUID of the job
//     page       INTEGER,            -- 1-based page, NULL for document-wide actions
//     action     TEXT    NOT NULL,   -- e.g. "redacted", "repaired", "discarded"
//     detail     TEXT    NOT NULL,   -- free-form context (region, issue, ...)
//     timestamp  TEXT    NOT NULL    -- RFC 3339
//   )

use std::path::Path;

use chrono::{DateTime, Utc};
use docforge_core::error::{ForgeError, Result};
use docforge_core::types::JobId;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

// ---------------------------------------------------------------------------
// Local error helpers
// ---------------------------------------------------------------------------

fn db_err(e: rusqlite::Error) -> ForgeError {
    ForgeError::Database(e.to_string())
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id     TEXT    NOT NULL,
    page       INTEGER,
    action     TEXT    NOT NULL,
    detail     TEXT    NOT NULL,
    timestamp  TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_job ON audit_log(job_id);";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A single entry in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub job_id: JobId,
    pub page: Option<u32>,
    pub action: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// An entry waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub page: Option<u32>,
    pub action: String,
    pub detail: String,
}

impl NewAuditEntry {
    pub fn new(page: Option<u32>, action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            page,
            action: action.into(),
            detail: detail.into(),
        }
    }
}

/// Append-only audit log backed by a SQLite database.
///
/// Entries are never updated. They are only removed together with their job
/// when the retention window expires.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("in-memory audit log opened");
        Ok(Self { conn })
    }

    /// Append one entry.
    #[instrument(skip(self, detail), fields(%job_id, %action))]
    pub fn record(&self, job_id: JobId, page: Option<u32>, action: &str, detail: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO audit_log (job_id, page, action, detail, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![job_id.to_string(), page, action, detail, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// Append every entry for a job in one transaction, so a job's trail is
    /// either fully present or absent.
    #[instrument(skip(self, entries), fields(%job_id, count = entries.len()))]
    pub fn record_all(&self, job_id: JobId, entries: &[NewAuditEntry]) -> Result<()> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO audit_log (job_id, page, action, detail, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(db_err)?;
            let job = job_id.to_string();
            for entry in entries {
                stmt.execute(params![
                    job,
                    entry.page,
                    entry.action,
                    entry.detail,
                    Utc::now().to_rfc3339()
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;

        debug!("audit entries recorded");
        Ok(())
    }

    /// All entries for a job, in insertion order.
    pub fn entries_for_job(&self, job_id: JobId) -> Result<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, job_id, page, action, detail, timestamp
                 FROM audit_log
                 WHERE job_id = ?1
                 ORDER BY id ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![job_id.to_string()], row_to_entry)
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }

    /// Remove the trails of purged jobs. Returns the number of entries removed.
    #[instrument(skip_all, fields(jobs = job_ids.len()))]
    pub fn purge_jobs(&self, job_ids: &[JobId]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let mut removed = 0;
        for job_id in job_ids {
            removed += tx
                .execute(
                    "DELETE FROM audit_log WHERE job_id = ?1",
                    params![job_id.to_string()],
                )
                .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;

        debug!(removed, "audit entries purged");
        Ok(removed)
    }

    /// Return the total number of entries in the audit log.
    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    let job_id: String = row.get(1)?;
    let timestamp: String = row.get(5)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        job_id: job_id
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?,
        page: row.get(2)?,
        action: row.get(3)?,
        detail: row.get(4)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?,
    })
}
