// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docforge-core — Core types, job settings and error definitions shared across all crates.

pub mod cancel;
pub mod config;
pub mod error;
pub mod geometry;
pub mod human_errors;
pub mod results;
pub mod settings;
pub mod types;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use error::{ErrorKind, ForgeError};
pub use geometry::BoundingBox;
pub use results::*;
pub use settings::*;
pub use types::*;
