// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job engine: submission, the worker pool, cancellation, timeouts and the
// retention purge.
//
// `JobStore` and `AuditLog` hold rusqlite connections, which are `Send` but
// not `Sync`, so both sit behind a `std::sync::Mutex`. Every call made under
// those locks is a short SQLite statement; no lock is held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use docforge_core::error::{ForgeError, Result};
use docforge_core::settings::JobSettings;
use docforge_core::types::{DocumentId, Job, JobError, JobId, JobState};
use docforge_core::{CancelToken, EngineConfig};
use docforge_document::TextRecognizer;
use docforge_document::scan::validate_ruleset;
use docforge_security::{AuditEntry, AuditLog, verify_revision};

use crate::documents::{DocumentStore, ReadGuard, WriteClaim};
use crate::executor::{ExecutionOutput, execute};
use crate::store::JobStore;

struct Shared {
    config: EngineConfig,
    jobs: Mutex<JobStore>,
    audit: Mutex<AuditLog>,
    documents: DocumentStore,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    queue: mpsc::UnboundedSender<JobId>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<JobId>>,
    /// Cancel flags of running jobs. Also serialises the Queued -> Running
    /// and Queued -> Cancelled transitions.
    running: Mutex<HashMap<JobId, CancelToken>>,
    /// Write claims of submitted mutating jobs, released when they finish.
    claims: Mutex<HashMap<JobId, WriteClaim>>,
}

/// Handle to the job engine. Cloning is cheap.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

/// Background tasks started by [`Engine::start`].
pub struct EngineTasks {
    engine: Engine,
    workers: Vec<JoinHandle<()>>,
    purge: JoinHandle<()>,
}

impl EngineTasks {
    /// Stop the workers and the purge task, then fail every job that never
    /// finished. Engines still busy on blocking threads have their cancel
    /// flag raised and their output is discarded.
    pub async fn shutdown(self) {
        let workers = self.workers.len();
        for task in self.workers.iter().chain(std::iter::once(&self.purge)) {
            task.abort();
        }
        for task in self.workers.into_iter().chain(std::iter::once(self.purge)) {
            let _ = task.await;
        }
        let failed = self.engine.abandon_unfinished();
        info!(workers, failed, "engine stopped");
    }
}

#[cfg(feature = "ocr")]
fn default_recognizer(config: &EngineConfig) -> Option<Arc<dyn TextRecognizer>> {
    match docforge_document::OcrsRecognizer::from_model_dir(config.ocr_model_dir.as_deref()) {
        Ok(recognizer) => Some(Arc::new(recognizer)),
        Err(e) => {
            warn!("OCR unavailable: {e}");
            None
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn default_recognizer(_config: &EngineConfig) -> Option<Arc<dyn TextRecognizer>> {
    None
}

impl Engine {
    /// Open `jobs.db` and `audit.db` in the configured data directory. Jobs a
    /// previous process left unfinished are marked failed.
    #[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
    pub fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;
        let jobs = JobStore::open(config.data_dir.join("jobs.db"))?;
        jobs.fail_interrupted()?;
        let audit = AuditLog::open(config.data_dir.join("audit.db"))?;
        let recognizer = default_recognizer(&config);
        Ok(Self::assemble(config, jobs, audit, recognizer))
    }

    /// Engine backed by in-memory databases (useful for tests).
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let jobs = JobStore::open_in_memory()?;
        let audit = AuditLog::open_in_memory()?;
        Ok(Self::assemble(config, jobs, audit, None))
    }

    fn assemble(
        config: EngineConfig,
        jobs: JobStore,
        audit: AuditLog,
        recognizer: Option<Arc<dyn TextRecognizer>>,
    ) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        let documents = DocumentStore::new(config.max_document_bytes);
        Self {
            shared: Arc::new(Shared {
                config,
                jobs: Mutex::new(jobs),
                audit: Mutex::new(audit),
                documents,
                recognizer,
                queue,
                receiver: tokio::sync::Mutex::new(receiver),
                running: Mutex::new(HashMap::new()),
                claims: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Replace the OCR recognizer. Call before [`Engine::start`].
    pub fn with_recognizer(self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        match Arc::try_unwrap(self.shared) {
            Ok(mut shared) => {
                shared.recognizer = Some(recognizer);
                Self {
                    shared: Arc::new(shared),
                }
            }
            Err(shared) => {
                warn!("engine already shared; recognizer not replaced");
                Self { shared }
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.shared.documents
    }

    pub fn ocr_available(&self) -> bool {
        self.shared.recognizer.is_some()
    }

    /// Spawn the worker pool and the retention purge task.
    pub fn start(&self) -> EngineTasks {
        let workers = (0..self.shared.config.workers)
            .map(|n| {
                let engine = self.clone();
                tokio::spawn(async move { engine.worker(n).await })
            })
            .collect();
        let engine = self.clone();
        let purge = tokio::spawn(async move { engine.purge_loop().await });
        info!(workers = self.shared.config.workers, "engine started");
        EngineTasks {
            engine: self.clone(),
            workers,
            purge,
        }
    }

    // -- Submission ----------------------------------------------------------

    /// Validate and enqueue a job. Returns at once; the job is visible to
    /// [`Engine::status`] as Queued.
    #[instrument(skip(self, settings), fields(kind = %settings.kind()))]
    pub fn submit(&self, document_id: DocumentId, settings: JobSettings) -> Result<JobId> {
        settings.validate()?;
        match &settings {
            JobSettings::Redact(s) => validate_ruleset(&s.ruleset)?,
            JobSettings::Scan(s) => validate_ruleset(&s.ruleset)?,
            _ => {}
        }
        for id in std::iter::once(document_id).chain(settings.secondary_document()) {
            if !self.shared.documents.contains(id) {
                return Err(ForgeError::DocumentNotFound(id));
            }
        }

        let job = Job::new(document_id, settings);
        let claim = if job.kind.is_mutating() {
            Some(self.shared.documents.claim_write(document_id, job.id)?)
        } else {
            None
        };
        self.shared.jobs.lock().expect("job store poisoned").insert(&job)?;
        if let Some(claim) = claim {
            self.shared
                .claims
                .lock()
                .expect("claim table poisoned")
                .insert(job.id, claim);
        }
        self.shared
            .queue
            .send(job.id)
            .map_err(|_| ForgeError::Internal("job queue closed".into()))?;

        info!(job_id = %job.id, document_id = %document_id, "job submitted");
        Ok(job.id)
    }

    // -- Queries -------------------------------------------------------------

    pub fn status(&self, job_id: JobId) -> Result<Job> {
        self.shared
            .jobs
            .lock()
            .expect("job store poisoned")
            .get(&job_id)?
            .ok_or(ForgeError::JobNotFound(job_id))
    }

    /// The most recent `limit` jobs, newest first.
    pub fn list(&self, limit: usize) -> Result<Vec<Job>> {
        self.shared.jobs.lock().expect("job store poisoned").list(limit)
    }

    /// Audit entries of a job. Only redaction and repair jobs write any.
    pub fn audit(&self, job_id: JobId) -> Result<Vec<AuditEntry>> {
        let job = self.status(job_id)?;
        if !job.kind.is_audited() {
            return Ok(Vec::new());
        }
        self.shared
            .audit
            .lock()
            .expect("audit log poisoned")
            .entries_for_job(job_id)
    }

    // -- Cancellation --------------------------------------------------------

    /// Cancel a job. A queued job is cancelled at once; a running job has its
    /// flag raised and ends Cancelled at the engine's next page boundary.
    /// Finished jobs are returned unchanged.
    #[instrument(skip(self))]
    pub fn cancel(&self, job_id: JobId) -> Result<Job> {
        let running = self.shared.running.lock().expect("running table poisoned");
        if let Some(token) = running.get(&job_id) {
            token.cancel();
            info!(job_id = %job_id, "cancellation requested");
            return self.status(job_id);
        }

        let mut job = self.status(job_id)?;
        if job.state == JobState::Queued {
            job.state = JobState::Cancelled;
            job.completed_at = Some(Utc::now());
            self.shared.jobs.lock().expect("job store poisoned").update(&job)?;
            drop(running);
            self.release_claim(job_id);
            info!(job_id = %job_id, "queued job cancelled");
        }
        Ok(job)
    }

    fn release_claim(&self, job_id: JobId) {
        let claim = self
            .shared
            .claims
            .lock()
            .expect("claim table poisoned")
            .remove(&job_id);
        drop(claim);
    }

    /// Cancel running engines, drop their claims and fail every job still
    /// Queued or Running. Only called once no worker is left.
    fn abandon_unfinished(&self) -> usize {
        let mut running = self.shared.running.lock().expect("running table poisoned");
        for token in running.values() {
            token.cancel();
        }
        running.clear();
        drop(running);
        self.shared.claims.lock().expect("claim table poisoned").clear();

        match self
            .shared
            .jobs
            .lock()
            .expect("job store poisoned")
            .fail_unfinished("engine shut down")
        {
            Ok(failed) => failed,
            Err(e) => {
                error!(error = %e, "failed to record unfinished jobs");
                0
            }
        }
    }

    // -- Retention -----------------------------------------------------------

    /// Delete finished jobs past the retention window with their audit
    /// entries. Returns the number of jobs removed.
    #[instrument(skip(self))]
    pub fn purge_expired(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.shared.config.retention();
        let ids = self
            .shared
            .jobs
            .lock()
            .expect("job store poisoned")
            .purge_finished_before(cutoff)?;
        if !ids.is_empty() {
            let entries = self
                .shared
                .audit
                .lock()
                .expect("audit log poisoned")
                .purge_jobs(&ids)?;
            info!(jobs = ids.len(), entries, "retention purge");
        }
        Ok(ids.len())
    }

    async fn purge_loop(self) {
        let period = std::time::Duration::from_secs(self.shared.config.purge_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = self.purge_expired() {
                error!(error = %e, "retention purge failed");
            }
        }
    }

    // -- Workers -------------------------------------------------------------

    async fn worker(self, n: usize) {
        debug!(worker = n, "worker started");
        loop {
            let next = self.shared.receiver.lock().await.recv().await;
            let Some(job_id) = next else { break };
            self.process(job_id).await;
        }
        debug!(worker = n, "worker stopped");
    }

    /// Move a queued job to Running and hand back its cancel flag. `None`
    /// when the job was cancelled (or vanished) while queued.
    fn begin(&self, job_id: JobId) -> Option<(Job, CancelToken)> {
        let mut running = self.shared.running.lock().expect("running table poisoned");
        let mut job = match self.status(job_id) {
            Ok(job) if job.state == JobState::Queued => job,
            Ok(job) => {
                debug!(job_id = %job_id, state = job.state.as_str(), "skipping dequeued job");
                return None;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "dequeued job not found");
                return None;
            }
        };
        job.state = JobState::Running;
        job.started_at = Some(Utc::now());
        if let Err(e) = self.shared.jobs.lock().expect("job store poisoned").update(&job) {
            error!(job_id = %job_id, error = %e, "failed to mark job running");
            return None;
        }
        let token = CancelToken::new();
        running.insert(job_id, token.clone());
        Some((job, token))
    }

    #[instrument(skip(self), fields(kind))]
    async fn process(&self, job_id: JobId) {
        let Some((mut job, token)) = self.begin(job_id) else {
            self.release_claim(job_id);
            return;
        };
        tracing::Span::current().record("kind", job.kind.as_str());
        info!(job_id = %job_id, "job running");

        // The worker owns the claim from here and drops it when done.
        let claim = self
            .shared
            .claims
            .lock()
            .expect("claim table poisoned")
            .remove(&job_id);
        let outcome = self.run(&job, claim.as_ref(), &token).await;
        self.finish(&mut job, outcome);

        self.shared
            .running
            .lock()
            .expect("running table poisoned")
            .remove(&job_id);
        drop(claim);
    }

    /// Take the document locks, run the engine on a blocking thread under
    /// the kind's time limit, and store the output.
    async fn run(&self, job: &Job, claim: Option<&WriteClaim>, token: &CancelToken) -> Result<ExecutionOutput> {
        let mut guards: Vec<ReadGuard> = Vec::new();
        if job.kind.is_mutating() {
            let claim = claim.ok_or_else(|| {
                ForgeError::Internal("mutating job started without its write claim".into())
            })?;
            claim.begin().await;
        } else {
            let mut ids: Vec<DocumentId> =
                std::iter::once(job.document_id).chain(job.settings.secondary_document()).collect();
            ids.sort_by_key(|id| id.0);
            ids.dedup();
            for id in ids {
                guards.push(self.shared.documents.read(id).await);
            }
        }
        token.check()?;

        let input = self.shared.documents.get(job.document_id)?;
        let other = job
            .settings
            .secondary_document()
            .map(|id| self.shared.documents.get(id))
            .transpose()?;
        for doc in std::iter::once(&input).chain(other.as_ref()) {
            verify_revision(&doc.bytes, &doc.hash)?;
        }

        let settings = job.settings.clone();
        let recognizer = self.shared.recognizer.clone();
        let cancel = token.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            execute(
                &settings,
                &input.bytes,
                other.as_ref().map(|d| d.bytes.as_slice()),
                recognizer.as_deref(),
                &cancel,
            )
        });

        let limit = self.shared.config.timeouts.for_kind(job.kind);
        let output = match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined.map_err(|e| ForgeError::Internal(format!("job task failed: {e}")))??,
            Err(_) => {
                warn!(job_id = %job.id, ?limit, "time limit reached, cancelling");
                token.cancel();
                let _ = handle.await;
                return Err(ForgeError::Timeout(limit));
            }
        };

        // A cancel raised while the last page ran still discards the output.
        token.check()?;
        if job.kind.is_mutating()
            && let Some(bytes) = &output.bytes
        {
            self.shared.documents.replace(job.document_id, bytes.clone())?;
        }
        if !output.audit.is_empty() {
            self.shared
                .audit
                .lock()
                .expect("audit log poisoned")
                .record_all(job.id, &output.audit)?;
        }
        drop(guards);
        Ok(output)
    }

    fn finish(&self, job: &mut Job, outcome: Result<ExecutionOutput>) {
        job.completed_at = Some(Utc::now());
        match outcome {
            Ok(output) => {
                job.state = JobState::Succeeded;
                job.result = Some(output.result);
                info!(job_id = %job.id, "job succeeded");
            }
            Err(ForgeError::Cancelled) => {
                job.state = JobState::Cancelled;
                info!(job_id = %job.id, "job cancelled");
            }
            Err(e) => {
                job.state = JobState::Failed;
                job.error = Some(JobError::from(&e));
                warn!(job_id = %job.id, kind = ?e.kind(), error = %e, "job failed");
            }
        }
        if let Err(e) = self.shared.jobs.lock().expect("job store poisoned").update(job) {
            error!(job_id = %job.id, error = %e, "failed to record job outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_core::settings::{CropSettings, CustomPattern, RepairSettings, Ruleset, ScanSettings};
    use docforge_document::fixtures;

    fn engine() -> Engine {
        Engine::in_memory(EngineConfig {
            workers: 1,
            ..EngineConfig::default()
        })
        .expect("in-memory engine")
    }

    fn upload(engine: &Engine, bytes: Vec<u8>) -> DocumentId {
        engine.documents().insert(bytes).expect("upload").id
    }

    #[test]
    fn submitted_jobs_are_queued() {
        let engine = engine();
        let doc = upload(&engine, fixtures::numbered_document(1));
        let id = engine
            .submit(doc, JobSettings::Repair(RepairSettings::default()))
            .expect("submit");
        let job = engine.status(id).expect("status");
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.document_id, doc);
        assert_eq!(engine.list(10).expect("list").len(), 1);
    }

    #[test]
    fn unknown_documents_are_rejected() {
        let engine = engine();
        let missing = DocumentId::new();
        let err = engine
            .submit(missing, JobSettings::Crop(CropSettings::default()))
            .unwrap_err();
        assert!(matches!(err, ForgeError::DocumentNotFound(d) if d == missing));
    }

    #[test]
    fn bad_patterns_fail_at_submission() {
        let engine = engine();
        let doc = upload(&engine, fixtures::numbered_document(1));
        let settings = JobSettings::Scan(ScanSettings {
            ruleset: Ruleset {
                custom_patterns: vec![CustomPattern {
                    name: "broken".into(),
                    pattern: "([a-z".into(),
                }],
                ..Ruleset::default()
            },
            include_images: false,
        });
        let err = engine.submit(doc, settings).unwrap_err();
        assert!(matches!(err, ForgeError::InvalidPattern { .. }));
        assert!(engine.list(10).expect("list").is_empty());
    }

    #[test]
    fn cancelling_a_queued_job_releases_the_document() {
        let engine = engine();
        let doc = upload(&engine, fixtures::numbered_document(1));
        let first = engine
            .submit(doc, JobSettings::Crop(CropSettings::default()))
            .expect("first");
        assert!(matches!(
            engine.submit(doc, JobSettings::Crop(CropSettings::default())),
            Err(ForgeError::DocumentBusy(_))
        ));

        let cancelled = engine.cancel(first).expect("cancel");
        assert_eq!(cancelled.state, JobState::Cancelled);
        assert!(cancelled.completed_at.is_some());
        assert_eq!(engine.documents().writer(doc), None);

        engine
            .submit(doc, JobSettings::Crop(CropSettings::default()))
            .expect("submit after cancel");
    }

    #[test]
    fn cancelling_a_finished_job_changes_nothing() {
        let engine = engine();
        let doc = upload(&engine, fixtures::numbered_document(1));
        let id = engine
            .submit(doc, JobSettings::Scan(ScanSettings::default()))
            .expect("submit");
        engine.cancel(id).expect("cancel");
        let again = engine.cancel(id).expect("cancel again");
        assert_eq!(again.state, JobState::Cancelled);
    }

    #[test]
    fn unknown_jobs_are_not_found() {
        let engine = engine();
        let id = JobId::new();
        assert!(matches!(engine.status(id), Err(ForgeError::JobNotFound(_))));
        assert!(matches!(engine.cancel(id), Err(ForgeError::JobNotFound(_))));
        assert!(matches!(engine.audit(id), Err(ForgeError::JobNotFound(_))));
    }

    #[test]
    fn purge_keeps_recent_jobs() {
        let engine = engine();
        let doc = upload(&engine, fixtures::numbered_document(1));
        let id = engine
            .submit(doc, JobSettings::Scan(ScanSettings::default()))
            .expect("submit");
        engine.cancel(id).expect("cancel");
        assert_eq!(engine.purge_expired().expect("purge"), 0);
        assert!(engine.status(id).is_ok());
    }

    #[tokio::test]
    async fn shutdown_fails_running_and_queued_jobs() {
        let engine = engine();
        let doc = upload(&engine, fixtures::numbered_document(1));
        let running = engine
            .submit(doc, JobSettings::Crop(CropSettings::default()))
            .expect("submit running");
        let (_, token) = engine.begin(running).expect("job begins");
        let queued = engine
            .submit(doc, JobSettings::Scan(ScanSettings::default()))
            .expect("submit queued");

        engine.abandon_unfinished();

        assert!(token.is_cancelled());
        for id in [running, queued] {
            let job = engine.status(id).expect("status");
            assert_eq!(job.state, JobState::Failed);
            assert_eq!(job.error.expect("error").message, "engine shut down");
        }
        assert_eq!(engine.documents().writer(doc), None);
        assert!(engine.shared.running.lock().expect("running table").is_empty());
    }

    #[tokio::test]
    async fn stopped_engine_leaves_no_job_in_flight() {
        let engine = engine();
        let doc = upload(&engine, fixtures::numbered_document(2));
        let tasks = engine.start();
        let id = engine
            .submit(doc, JobSettings::Scan(ScanSettings::default()))
            .expect("submit");
        tasks.shutdown().await;

        let job = engine.status(id).expect("status");
        assert!(matches!(job.state, JobState::Succeeded | JobState::Failed));
    }

    #[test]
    fn on_disk_engine_fails_interrupted_jobs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = EngineConfig {
            workers: 1,
            data_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let id = {
            let engine = Engine::open(config.clone()).expect("open");
            let doc = upload(&engine, fixtures::numbered_document(1));
            engine
                .submit(doc, JobSettings::Scan(ScanSettings::default()))
                .expect("submit")
        };
        let engine = Engine::open(config).expect("reopen");
        let job = engine.status(id).expect("status");
        assert_eq!(job.state, JobState::Failed);
    }
}
