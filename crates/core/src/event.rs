// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job event notifications.
//!
//! Every job state change is published as a JOB-EVENT on the job's own
//! uri (`job:<id>`) and mirrored on `system:jobs`, so subscribers can
//! follow either a single job or the whole queue.

use crate::job::JobInfo;
use serde::{Deserialize, Serialize};

/// Well-known uri carrying every job event.
pub const URI_SYSTEM_JOBS: &str = "system:jobs";

/// Well-known uri carrying probe registry events.
pub const URI_SYSTEM_PROBES: &str = "system:probes";

/// A JOB-EVENT notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub uri: String,
    #[serde(flatten)]
    pub info: JobInfo,
}

impl JobEvent {
    pub fn new(info: JobInfo) -> Self {
        Self {
            uri: info.id.uri(),
            info,
        }
    }
}

/// Sink for job event notifications.
///
/// The engine publishes through this seam; the server wires it to the Xc
/// notification bus, tests capture events in memory.
pub trait EventPublisher: Send + Sync {
    fn publish_job_event(&self, event: &JobEvent);
}

/// Default publisher: events only reach the logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish_job_event(&self, event: &JobEvent) {
        tracing::debug!(
            uri = %event.uri,
            state = %event.info.state,
            "job event"
        );
    }
}
