// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory document store and per-document locks.
//
// Lock discipline:
//
// - A mutating job claims its document's write lock when it is submitted. A
//   second claim on the same document fails fast with `DocumentBusy`.
// - When the claimed job starts it raises the `writing` flag, which holds
//   back new readers, then waits for readers already inside to leave.
// - Read-only jobs take a read guard, waiting while a write is in progress.
//
// The write claim is released when its `WriteClaim` is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info, instrument};

use docforge_core::error::{ForgeError, Result};
use docforge_core::types::{DocumentId, JobId};
use docforge_security::hash_bytes;

/// A snapshot of one stored document.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub bytes: Arc<Vec<u8>>,
    /// SHA-256 of `bytes`, hex-encoded.
    pub hash: String,
    /// Bumped each time a job writes the document back.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LockState {
    writer: Option<JobId>,
    writing: bool,
    readers: usize,
}

impl LockState {
    fn is_idle(&self) -> bool {
        self.writer.is_none() && !self.writing && self.readers == 0
    }
}

#[derive(Default)]
struct Shared {
    documents: Mutex<HashMap<DocumentId, StoredDocument>>,
    locks: Mutex<HashMap<DocumentId, LockState>>,
    changed: Notify,
}

impl Shared {
    fn with_lock<T>(&self, id: DocumentId, f: impl FnOnce(&mut LockState) -> T) -> T {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        let state = locks.entry(id).or_default();
        let out = f(state);
        if state.is_idle() {
            locks.remove(&id);
        }
        out
    }
}

/// Cheaply cloneable handle to the document store.
#[derive(Clone)]
pub struct DocumentStore {
    shared: Arc<Shared>,
    max_bytes: usize,
}

impl DocumentStore {
    /// A store that rejects documents larger than `max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            max_bytes,
        }
    }

    /// Store `bytes` as a new document. The bytes are not parsed: damaged
    /// files must be accepted so they can be repaired.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn insert(&self, bytes: Vec<u8>) -> Result<StoredDocument> {
        if bytes.is_empty() {
            return Err(ForgeError::CorruptDocument("empty upload".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(ForgeError::InvalidSettings(format!(
                "document of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.max_bytes
            )));
        }
        let now = Utc::now();
        let doc = StoredDocument {
            id: DocumentId::new(),
            hash: hash_bytes(&bytes),
            bytes: Arc::new(bytes),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.shared
            .documents
            .lock()
            .expect("document map poisoned")
            .insert(doc.id, doc.clone());
        info!(document_id = %doc.id, hash = %doc.hash, "document stored");
        Ok(doc)
    }

    pub fn get(&self, id: DocumentId) -> Result<StoredDocument> {
        self.shared
            .documents
            .lock()
            .expect("document map poisoned")
            .get(&id)
            .cloned()
            .ok_or(ForgeError::DocumentNotFound(id))
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.shared
            .documents
            .lock()
            .expect("document map poisoned")
            .contains_key(&id)
    }

    /// Replace the bytes of `id` with a job's output. Only the holder of the
    /// write claim calls this.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub fn replace(&self, id: DocumentId, bytes: Vec<u8>) -> Result<StoredDocument> {
        let mut documents = self.shared.documents.lock().expect("document map poisoned");
        let doc = documents.get_mut(&id).ok_or(ForgeError::DocumentNotFound(id))?;
        doc.hash = hash_bytes(&bytes);
        doc.bytes = Arc::new(bytes);
        doc.version += 1;
        doc.updated_at = Utc::now();
        debug!(version = doc.version, hash = %doc.hash, "document replaced");
        Ok(doc.clone())
    }

    // -- Locks ---------------------------------------------------------------

    /// Claim the write lock of `id` for `job`.
    pub fn claim_write(&self, id: DocumentId, job: JobId) -> Result<WriteClaim> {
        self.shared.with_lock(id, |state| match state.writer {
            Some(holder) => {
                debug!(document_id = %id, holder = %holder, "write claim refused");
                Err(ForgeError::DocumentBusy(id))
            }
            None => {
                state.writer = Some(job);
                Ok(())
            }
        })?;
        debug!(document_id = %id, job_id = %job, "write lock claimed");
        Ok(WriteClaim {
            shared: Arc::clone(&self.shared),
            document: id,
            job,
        })
    }

    /// Which job holds the write claim on `id`, if any.
    pub fn writer(&self, id: DocumentId) -> Option<JobId> {
        self.shared
            .locks
            .lock()
            .expect("lock table poisoned")
            .get(&id)
            .and_then(|s| s.writer)
    }

    /// Wait until no write is in progress on `id`, then enter as a reader.
    pub async fn read(&self, id: DocumentId) -> ReadGuard {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let entered = self.shared.with_lock(id, |state| {
                if state.writing {
                    false
                } else {
                    state.readers += 1;
                    true
                }
            });
            if entered {
                return ReadGuard {
                    shared: Arc::clone(&self.shared),
                    document: id,
                };
            }
            notified.await;
        }
    }
}

/// Exclusive right to rewrite one document, held from submission until the
/// job finishes.
pub struct WriteClaim {
    shared: Arc<Shared>,
    document: DocumentId,
    job: JobId,
}

impl std::fmt::Debug for WriteClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteClaim")
            .field("document", &self.document)
            .field("job", &self.job)
            .finish()
    }
}

impl WriteClaim {
    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// Hold back new readers and wait for current ones to leave.
    pub async fn begin(&self) {
        self.shared.with_lock(self.document, |state| state.writing = true);
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let readers = self.shared.with_lock(self.document, |state| state.readers);
            if readers == 0 {
                return;
            }
            debug!(document_id = %self.document, readers, "waiting for readers");
            notified.await;
        }
    }
}

impl Drop for WriteClaim {
    fn drop(&mut self) {
        let job = self.job;
        self.shared.with_lock(self.document, |state| {
            if state.writer == Some(job) {
                state.writer = None;
                state.writing = false;
            }
        });
        self.shared.changed.notify_waiters();
        debug!(document_id = %self.document, job_id = %job, "write lock released");
    }
}

/// Shared read access to one document.
pub struct ReadGuard {
    shared: Arc<Shared>,
    document: DocumentId,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.shared
            .with_lock(self.document, |state| state.readers = state.readers.saturating_sub(1));
        self.shared.changed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store() -> DocumentStore {
        DocumentStore::new(1024)
    }

    #[test]
    fn insert_get_and_replace() {
        let store = store();
        let doc = store.insert(b"%PDF-1.5 one".to_vec()).expect("insert");
        assert_eq!(doc.version, 1);
        assert_eq!(doc.hash, hash_bytes(b"%PDF-1.5 one"));

        let replaced = store.replace(doc.id, b"%PDF-1.5 two".to_vec()).expect("replace");
        assert_eq!(replaced.version, 2);
        let fetched = store.get(doc.id).expect("get");
        assert_eq!(fetched.bytes.as_slice(), b"%PDF-1.5 two");
        assert_eq!(fetched.hash, hash_bytes(b"%PDF-1.5 two"));
    }

    #[test]
    fn empty_and_oversized_uploads_are_rejected() {
        let store = store();
        assert!(matches!(store.insert(Vec::new()), Err(ForgeError::CorruptDocument(_))));
        assert!(matches!(
            store.insert(vec![b'x'; 2048]),
            Err(ForgeError::InvalidSettings(_))
        ));
    }

    #[test]
    fn unknown_documents_are_not_found() {
        let id = DocumentId::new();
        assert!(matches!(store().get(id), Err(ForgeError::DocumentNotFound(d)) if d == id));
    }

    #[test]
    fn second_write_claim_is_busy_until_the_first_drops() {
        let store = store();
        let id = store.insert(b"%PDF".to_vec()).expect("insert").id;
        let first = JobId::new();
        let claim = store.claim_write(id, first).expect("first claim");
        assert_eq!(store.writer(id), Some(first));

        let err = store.claim_write(id, JobId::new()).unwrap_err();
        assert!(matches!(err, ForgeError::DocumentBusy(d) if d == id));

        drop(claim);
        assert_eq!(store.writer(id), None);
        store.claim_write(id, JobId::new()).expect("claim after release");
    }

    #[tokio::test]
    async fn readers_share_the_document() {
        let store = store();
        let id = store.insert(b"%PDF".to_vec()).expect("insert").id;
        let a = store.read(id).await;
        let b = tokio::time::timeout(Duration::from_secs(1), store.read(id))
            .await
            .expect("second reader enters");
        drop((a, b));
    }

    #[tokio::test]
    async fn readers_wait_behind_an_active_writer() {
        let store = store();
        let id = store.insert(b"%PDF".to_vec()).expect("insert").id;
        let claim = store.claim_write(id, JobId::new()).expect("claim");
        claim.begin().await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), store.read(id)).await;
        assert!(blocked.is_err(), "reader entered during a write");

        let waiting = tokio::spawn({
            let store = store.clone();
            async move { store.read(id).await }
        });
        drop(claim);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("reader woke")
            .expect("reader task");
    }

    #[tokio::test]
    async fn writer_waits_for_readers_to_leave() {
        let store = store();
        let id = store.insert(b"%PDF".to_vec()).expect("insert").id;
        let reader = store.read(id).await;
        let claim = store.claim_write(id, JobId::new()).expect("claim");

        let begin = tokio::time::timeout(Duration::from_millis(50), claim.begin()).await;
        assert!(begin.is_err(), "writer began with a reader inside");

        drop(reader);
        tokio::time::timeout(Duration::from_secs(1), claim.begin())
            .await
            .expect("writer began after the reader left");
    }
}
