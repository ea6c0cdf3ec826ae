// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error and control-flow types for the runtime

use thiserror::Error;

/// Errors raised inside a test component.
///
/// `Stopped`, `Killed` and `Cancelled` are control flow: they unwind the
/// current behaviour rather than report a defect. Anything else is a real
/// error and drives the verdict to `error`.
#[derive(Debug, Error)]
pub enum TcError {
    /// The component (or the whole testcase) was stopped.
    #[error("stopped")]
    Stopped { retcode: Option<i32> },

    /// The component was killed.
    #[error("killed")]
    Killed,

    /// The ATS was cancelled; no further testcase may run.
    #[error("ats cancelled")]
    Cancelled,

    /// A TTCN-3 restriction was violated (bad connect/map/start, ...).
    #[error("invalid operation: {0}")]
    Rule(String),

    /// A matching mechanism was used in a sent message but cannot produce
    /// a concrete value.
    #[error("template cannot be valuated: {0}")]
    NotValuable(String),

    #[error("codec {codec}: {message}")]
    Codec { codec: String, message: String },

    #[error("adapter error: {0}")]
    Adapter(String),

    #[error("{0}")]
    Internal(String),
}

impl TcError {
    pub fn stopped() -> Self {
        TcError::Stopped { retcode: None }
    }

    /// True for the control-flow variants that are not defects.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            TcError::Stopped { .. } | TcError::Killed | TcError::Cancelled
        )
    }
}

pub type TcResult<T> = Result<T, TcError>;
