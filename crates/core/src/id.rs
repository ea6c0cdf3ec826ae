// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier generation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a job.
///
/// Ids are assigned at creation, strictly increase over a server lifetime,
/// and are never reused: on restart the generator resumes past the highest
/// persisted id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the job URI. Format: `job:<id>`.
    pub fn uri(&self) -> String {
        format!("job:{}", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotone job id generator.
///
/// Thread-safe; `advance_to` is used during restart recovery to continue
/// past the highest persisted id.
#[derive(Debug, Default)]
pub struct JobIdGen {
    last: AtomicU64,
}

impl JobIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next(&self) -> JobId {
        JobId(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Ensure future ids are strictly greater than `id`.
    pub fn advance_to(&self, id: JobId) {
        self.last.fetch_max(id.0, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
