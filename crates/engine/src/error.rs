// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the job engine

use thiserror::Error;
use tm_core::JobId;

/// A job preparation failure.
///
/// Carries the job result code (20-29 range) reported to the submitter;
/// the job transitions to the error state.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PrepareError {
    pub code: i32,
    pub message: String,
}

impl PrepareError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Dependency resolution failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cyclic dependency involving {0}")]
    CyclicDependency(String),

    #[error("missing dependency {0}")]
    Missing(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Errors from the engine runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("preparation failed: {0}")]
    Prepare(#[from] PrepareError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persist(String),

    #[error("signal delivery failed: {0}")]
    Signal(String),

    #[error("{0}")]
    Internal(String),
}
