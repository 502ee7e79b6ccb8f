// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docforge-jobs — job store, document store and locks, and the worker pool
// that runs the document engines.

pub mod documents;
pub mod executor;
pub mod pool;
pub mod store;

pub use documents::{DocumentStore, ReadGuard, StoredDocument, WriteClaim};
pub use executor::{ExecutionOutput, execute};
pub use pool::{Engine, EngineTasks};
pub use store::JobStore;
