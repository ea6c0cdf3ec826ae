// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job state machine, signals, branches and result codes.

use crate::id::JobId;
use crate::session::SessionParameters;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job result codes.
///
/// The classification applies to all job types:
/// 0 complete, 1 cancelled, 2 killed, 3 runtime low-level error
/// (segfault and friends), 4-9 other low-level errors, 10-19 reserved,
/// 20-29 preparation errors (never executed), 30-49 reserved,
/// 50-99 reserved for client-side retcodes, 100+ userland retcodes.
pub mod retcode {
    pub const OK: i32 = 0;
    pub const CANCELLED: i32 = 1;
    pub const KILLED: i32 = 2;
    pub const RUNTIME_CRASH: i32 = 3;
    pub const OK_WITH_FAILED_TC: i32 = 4;

    // Preparation errors (20-29)
    pub const PACKAGING_ERROR: i32 = 20;
    pub const SYNTAX_ERROR: i32 = 21;
    pub const CHECK_ERROR: i32 = 22;
    pub const EXECUTION_SETUP_ERROR: i32 = 23;
    pub const STAGING_MOVE_ERROR: i32 = 24;
    pub const DEPENDENCY_ERROR: i32 = 25;
    pub const UNSUPPORTED_API_ERROR: i32 = 26;
}

/// Job type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Ats,
    Campaign,
    Group,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Ats => write!(f, "ats"),
            JobType::Campaign => write!(f, "campaign"),
            JobType::Group => write!(f, "group"),
        }
    }
}

/// Job states.
///
/// Basic machine: initializing -> waiting -> running -> complete.
/// `Crashed` is only assigned during restart recovery, for jobs that were
/// in flight when the server went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Initializing,
    Waiting,
    Running,
    Killing,
    Cancelling,
    Paused,
    // Final states
    Complete,
    Cancelled,
    Killed,
    Error,
    Crashed,
}

impl JobState {
    /// Terminal states are absorbing: the job is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Complete
                | JobState::Cancelled
                | JobState::Killed
                | JobState::Error
                | JobState::Crashed
        )
    }

    /// True once the job has left the queue and begun executing.
    pub fn is_started(&self) -> bool {
        matches!(self, JobState::Running | JobState::Killing | JobState::Paused)
    }

    /// Map a restored state to the state it should resume in.
    ///
    /// Jobs that were in flight when the server stopped cannot be resumed:
    /// anything running-ish becomes `Crashed`, an interrupted kill is
    /// considered done.
    pub fn sanitize(self) -> JobState {
        match self {
            JobState::Running | JobState::Paused | JobState::Cancelling | JobState::Initializing => {
                JobState::Crashed
            }
            JobState::Killing => JobState::Killed,
            other => other,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Initializing => "initializing",
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Killing => "killing",
            JobState::Cancelling => "cancelling",
            JobState::Paused => "paused",
            JobState::Complete => "complete",
            JobState::Cancelled => "cancelled",
            JobState::Killed => "killed",
            JobState::Error => "error",
            JobState::Crashed => "crashed",
        };
        write!(f, "{s}")
    }
}

/// Child branches of a job.
///
/// `Success` children run when the parent terminates with result 0,
/// `Error` children otherwise. `Unconditional` holds the root children of
/// a campaign (and every child of a parallel group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Success,
    Error,
    Unconditional,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Success => write!(f, "success"),
            Branch::Error => write!(f, "error"),
            Branch::Unconditional => write!(f, "unconditional"),
        }
    }
}

/// Abstract signals a job accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSignal {
    Pause,
    Resume,
    Cancel,
    Kill,
    ActionPerformed,
}

impl fmt::Display for JobSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobSignal::Pause => write!(f, "pause"),
            JobSignal::Resume => write!(f, "resume"),
            JobSignal::Cancel => write!(f, "cancel"),
            JobSignal::Kill => write!(f, "kill"),
            JobSignal::ActionPerformed => write!(f, "action_performed"),
        }
    }
}

/// Job info record, as published with every JOB-EVENT and returned by
/// the job info queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub state: JobState,
    pub result: Option<i32>,
    pub username: String,
    /// 0 for root jobs.
    #[serde(rename = "parent-id")]
    pub parent_id: JobId,
    #[serde(rename = "scheduled-at")]
    pub scheduled_at: f64,
    #[serde(rename = "start-time")]
    pub start_time: Option<f64>,
    #[serde(rename = "stop-time")]
    pub stop_time: Option<f64>,
    #[serde(rename = "running-time")]
    pub running_time: Option<f64>,
    pub path: Option<String>,
    #[serde(rename = "log-filename")]
    pub log_filename: Option<String>,
}

/// Detailed job info: the base record plus execution internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    #[serde(flatten)]
    pub info: JobInfo,
    pub source: Option<String>,
    #[serde(rename = "te-command-line")]
    pub te_command_line: Option<String>,
    #[serde(rename = "te-filename")]
    pub te_filename: Option<String>,
    #[serde(rename = "te-input-parameters")]
    pub te_input_parameters: Option<SessionParameters>,
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
