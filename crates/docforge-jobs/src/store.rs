// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent job records backed by SQLite.
//
// The store keeps job metadata, settings and results (but NOT document
// bytes) so that job status survives a process restart. Settings, results
// and errors are stored as JSON text.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument, warn};

use docforge_core::error::{ErrorKind, ForgeError, Result};
use docforge_core::types::{DocumentId, Job, JobError, JobId, JobKind, JobState};

/// SQLite schema for the jobs table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        state TEXT NOT NULL,
        document_id TEXT NOT NULL,
        settings TEXT NOT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        result TEXT,
        error TEXT
    );
    CREATE INDEX IF NOT EXISTS jobs_created ON jobs (created_at);
"#;

const SELECT_COLUMNS: &str = "SELECT id, kind, state, document_id, settings, created_at, \
                              started_at, completed_at, result, error FROM jobs";

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> ForgeError + '_ {
    move |e| ForgeError::Database(format!("{context}: {e}"))
}

/// Fixed-width UTC timestamps, so SQL text comparison orders them correctly.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ForgeError::Database(format!("serialize {what}: {e}")))
}

/// Persistent job store backed by a SQLite database.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively. Callers hold the store behind a mutex and keep each call short.
pub struct JobStore {
    conn: Connection,
}

impl JobStore {
    /// Open (or create) the job database at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err("open"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err("WAL pragma"))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(db_err("create table"))?;
        info!("job database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("open in-memory"))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(db_err("create table"))?;
        debug!("in-memory job database opened");
        Ok(Self { conn })
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind))]
    pub fn insert(&self, job: &Job) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO jobs (id, kind, state, document_id, settings, created_at,
                 started_at, completed_at, result, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    job.id.to_string(),
                    job.kind.as_str(),
                    job.state.as_str(),
                    job.document_id.to_string(),
                    to_json(&job.settings, "settings")?,
                    timestamp(&job.created_at),
                    job.started_at.as_ref().map(timestamp),
                    job.completed_at.as_ref().map(timestamp),
                    job.result.as_ref().map(|r| to_json(r, "result")).transpose()?,
                    job.error.as_ref().map(|e| to_json(e, "error")).transpose()?,
                ],
            )
            .map_err(db_err("insert job"))?;
        debug!("job inserted");
        Ok(())
    }

    /// Write the mutable half of `job`: state, timestamps, result and error.
    #[instrument(skip(self, job), fields(job_id = %job.id, state = job.state.as_str()))]
    pub fn update(&self, job: &Job) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE jobs SET state = ?1, started_at = ?2, completed_at = ?3,
                 result = ?4, error = ?5 WHERE id = ?6",
                params![
                    job.state.as_str(),
                    job.started_at.as_ref().map(timestamp),
                    job.completed_at.as_ref().map(timestamp),
                    job.result.as_ref().map(|r| to_json(r, "result")).transpose()?,
                    job.error.as_ref().map(|e| to_json(e, "error")).transpose()?,
                    job.id.to_string(),
                ],
            )
            .map_err(db_err("update job"))?;
        if rows == 0 {
            return Err(ForgeError::JobNotFound(job.id));
        }
        Ok(())
    }

    /// Returns `None` if the job does not exist.
    pub fn get(&self, job_id: &JobId) -> Result<Option<Job>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .map_err(db_err("prepare get"))?;
        let mut rows = stmt
            .query_map(params![job_id.to_string()], row_to_job)
            .map_err(db_err("query get"))?;
        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(ForgeError::Database(format!("row parse: {e}"))),
            None => Ok(None),
        }
    }

    /// The most recent `limit` jobs, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<Job>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC LIMIT ?1"))
            .map_err(db_err("prepare list"))?;
        let jobs = stmt
            .query_map(params![limit as i64], row_to_job)
            .map_err(db_err("query list"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err("collect rows"))?;
        Ok(jobs)
    }

    /// Fail every job left Queued or Running by a previous process. Their
    /// documents lived in memory and are gone.
    pub fn fail_interrupted(&self) -> Result<usize> {
        self.fail_unfinished("interrupted by an engine restart")
    }

    /// Fail every Queued or Running job with an internal error carrying
    /// `reason`. Returns the number of jobs changed.
    #[instrument(skip(self))]
    pub fn fail_unfinished(&self, reason: &str) -> Result<usize> {
        let error = JobError {
            kind: ErrorKind::Internal,
            message: reason.into(),
        };
        let rows = self
            .conn
            .execute(
                "UPDATE jobs SET state = ?1, completed_at = ?2, error = ?3
                 WHERE state IN (?4, ?5)",
                params![
                    JobState::Failed.as_str(),
                    timestamp(&Utc::now()),
                    to_json(&error, "error")?,
                    JobState::Queued.as_str(),
                    JobState::Running.as_str(),
                ],
            )
            .map_err(db_err("fail interrupted"))?;
        if rows > 0 {
            warn!(jobs = rows, reason, "unfinished jobs marked failed");
        }
        Ok(rows)
    }

    /// Delete finished jobs completed before `cutoff`, returning their ids.
    #[instrument(skip(self))]
    pub fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobId>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(db_err("begin purge"))?;
        let ids: Vec<JobId> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id FROM jobs WHERE completed_at IS NOT NULL AND completed_at < ?1
                     AND state IN (?2, ?3, ?4)",
                )
                .map_err(db_err("prepare purge"))?;
            stmt.query_map(
                params![
                    timestamp(&cutoff),
                    JobState::Succeeded.as_str(),
                    JobState::Failed.as_str(),
                    JobState::Cancelled.as_str(),
                ],
                |row| row.get::<_, String>(0),
            )
            .map_err(db_err("query purge"))?
            .filter_map(|id| id.ok().and_then(|s| s.parse().ok()))
            .collect()
        };
        for id in &ids {
            tx.execute("DELETE FROM jobs WHERE id = ?1", params![id.to_string()])
                .map_err(db_err("delete job"))?;
        }
        tx.commit().map_err(db_err("commit purge"))?;
        if !ids.is_empty() {
            info!(purged = ids.len(), "expired jobs purged");
        }
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion(column: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_time(column: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(column, e))
}

fn parse_enum<T: serde::de::DeserializeOwned>(column: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string())).map_err(|e| conversion(column, e))
}

/// Column indices must match `SELECT_COLUMNS`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let state: String = row.get(2)?;
    let document_id: String = row.get(3)?;
    let settings: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let started_at: Option<String> = row.get(6)?;
    let completed_at: Option<String> = row.get(7)?;
    let result: Option<String> = row.get(8)?;
    let error: Option<String> = row.get(9)?;

    Ok(Job {
        id: JobId(uuid::Uuid::parse_str(&id).map_err(|e| conversion(0, e))?),
        kind: parse_enum::<JobKind>(1, &kind)?,
        state: parse_enum::<JobState>(2, &state)?,
        document_id: DocumentId(uuid::Uuid::parse_str(&document_id).map_err(|e| conversion(3, e))?),
        settings: serde_json::from_str(&settings).map_err(|e| conversion(4, e))?,
        created_at: parse_time(5, &created_at)?,
        started_at: started_at.as_deref().map(|t| parse_time(6, t)).transpose()?,
        completed_at: completed_at.as_deref().map(|t| parse_time(7, t)).transpose()?,
        result: result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| conversion(8, e))?,
        error: error
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| conversion(9, e))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_core::results::{JobResult, PageOpResult};
    use docforge_core::settings::{JobSettings, RepairSettings};

    fn test_job() -> Job {
        Job::new(DocumentId::new(), JobSettings::Repair(RepairSettings::default()))
    }

    #[test]
    fn insert_and_retrieve_job() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let job = test_job();
        store.insert(&job).expect("insert");

        let retrieved = store.get(&job.id).expect("get").expect("found");
        assert_eq!(retrieved.id, job.id);
        assert_eq!(retrieved.kind, JobKind::Repair);
        assert_eq!(retrieved.state, JobState::Queued);
        assert_eq!(retrieved.document_id, job.document_id);
        assert_eq!(retrieved.settings, job.settings);
    }

    #[test]
    fn update_persists_result_and_timestamps() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let mut job = test_job();
        store.insert(&job).expect("insert");

        job.state = JobState::Succeeded;
        job.started_at = Some(Utc::now());
        job.completed_at = Some(Utc::now());
        job.result = Some(JobResult::Crop(PageOpResult {
            pages_modified: vec![1, 2],
        }));
        store.update(&job).expect("update");

        let updated = store.get(&job.id).expect("get").expect("found");
        assert_eq!(updated.state, JobState::Succeeded);
        assert!(updated.completed_at.is_some());
        assert_eq!(updated.result, job.result);
    }

    #[test]
    fn update_with_error() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let mut job = test_job();
        store.insert(&job).expect("insert");

        job.state = JobState::Failed;
        job.error = Some(JobError::from(&ForgeError::Unrepairable("no pages".into())));
        store.update(&job).expect("update");

        let updated = store.get(&job.id).expect("get").expect("found");
        let error = updated.error.expect("error stored");
        assert_eq!(error.kind, ErrorKind::Unrepairable);
        assert!(error.message.contains("no pages"));
    }

    #[test]
    fn list_returns_newest_first() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let first = test_job();
        let second = test_job();
        store.insert(&first).expect("insert 1");
        store.insert(&second).expect("insert 2");

        let all = store.list(10).expect("list");
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at >= all[1].created_at);
        assert_eq!(store.list(1).expect("list").len(), 1);
    }

    #[test]
    fn interrupted_jobs_fail_on_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobs.db");
        let job = test_job();
        {
            let store = JobStore::open(&path).expect("open");
            store.insert(&job).expect("insert");
        }
        let store = JobStore::open(&path).expect("reopen");
        assert_eq!(store.fail_interrupted().expect("fail"), 1);
        let job = store.get(&job.id).expect("get").expect("found");
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.expect("error").kind, ErrorKind::Internal);
    }

    #[test]
    fn fail_unfinished_leaves_finished_jobs_alone() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let queued = test_job();
        let mut done = test_job();
        store.insert(&queued).expect("insert queued");
        store.insert(&done).expect("insert done");
        done.state = JobState::Succeeded;
        done.completed_at = Some(Utc::now());
        store.update(&done).expect("update");

        assert_eq!(store.fail_unfinished("engine shut down").expect("fail"), 1);
        let failed = store.get(&queued.id).expect("get").expect("found");
        assert_eq!(failed.state, JobState::Failed);
        assert!(failed.completed_at.is_some());
        assert_eq!(failed.error.expect("error").message, "engine shut down");
        let kept = store.get(&done.id).expect("get").expect("found");
        assert_eq!(kept.state, JobState::Succeeded);
    }

    #[test]
    fn purge_removes_only_old_finished_jobs() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        let mut old = test_job();
        let pending = test_job();
        store.insert(&old).expect("insert");
        store.insert(&pending).expect("insert");

        old.state = JobState::Succeeded;
        old.completed_at = Some(Utc::now() - chrono::Duration::hours(48));
        store.update(&old).expect("update");

        let purged = store
            .purge_finished_before(Utc::now() - chrono::Duration::hours(24))
            .expect("purge");
        assert_eq!(purged, vec![old.id]);
        assert!(store.get(&old.id).expect("get").is_none());
        assert!(store.get(&pending.id).expect("get").is_some());
    }

    #[test]
    fn update_nonexistent_job_returns_error() {
        let store = JobStore::open_in_memory().expect("open in-memory db");
        assert!(matches!(store.update(&test_job()), Err(ForgeError::JobNotFound(_))));
    }
}
