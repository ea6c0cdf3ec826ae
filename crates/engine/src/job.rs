// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job tree.
//!
//! Jobs are organized in trees with two result-dependent child branches
//! (success, error) plus the unconditional branch holding a campaign's
//! root children. A group job is a pseudo-container: it keeps its
//! children for traversal, but the children's parent pointer skips group
//! ancestors so that verdict propagation and purge ignore groups.

use crate::ats::AtsData;
use crate::campaign_run::CampaignData;
use crate::env::{EngineEnv, REPOSITORY_DIR};
use crate::error::PrepareError;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tm_core::{
    Branch, JobEvent, JobId, JobState, JobType, SessionParameters,
};

/// Type-specific job payload.
pub enum JobKind {
    Ats(AtsData),
    Campaign(CampaignData),
    Group,
}

/// Mutable job attributes, guarded by one mutex.
pub(crate) struct JobCore {
    pub state: JobState,
    pub result: Option<i32>,
    pub scheduled_start: f64,
    pub scheduled_session: SessionParameters,
    pub mapping: SessionParameters,
    pub output_session: SessionParameters,
    pub username: String,
    pub path: Option<String>,
    /// Docroot path of the log file, filled by pre_run.
    pub log_filename: Option<String>,
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
}

/// A job instance. Shared: the registry, the scheduler and a running
/// parent campaign all hold the same `Arc`.
pub struct Job {
    id: JobId,
    name: String,
    job_type: JobType,
    kind: JobKind,
    env: Arc<EngineEnv>,
    core: Mutex<JobCore>,
    parent: Mutex<Weak<Job>>,
    children: Mutex<Vec<(Branch, Arc<Job>)>>,
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} (job:{})", self.job_type, self.name, self.id)
    }
}

impl Job {
    fn new(
        env: &Arc<EngineEnv>,
        name: impl Into<String>,
        job_type: JobType,
        kind: JobKind,
        path: Option<String>,
    ) -> Arc<Job> {
        let id = env.ids.next();
        let now = env.clock.epoch();
        Arc::new(Job {
            id,
            name: name.into(),
            job_type,
            kind,
            env: Arc::clone(env),
            core: Mutex::new(JobCore {
                state: JobState::Initializing,
                result: None,
                // immediate execution by default; the 1s delay lets the
                // submitter subscribe for logs first
                scheduled_start: now + 1.0,
                scheduled_session: SessionParameters::new(),
                mapping: SessionParameters::new(),
                output_session: SessionParameters::new(),
                username: String::new(),
                path,
                log_filename: None,
                start_time: None,
                stop_time: None,
            }),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Create an ATS job. A missing path is derived from the name as a
    /// repository path.
    pub fn new_ats(
        env: &Arc<EngineEnv>,
        name: impl Into<String>,
        source: Option<String>,
        path: Option<String>,
    ) -> Arc<Job> {
        let name = name.into();
        let path = normalize_path(path.unwrap_or_else(|| format!("/{REPOSITORY_DIR}/{name}")));
        Self::new(
            env,
            name,
            JobType::Ats,
            JobKind::Ats(AtsData::new(source)),
            Some(path),
        )
    }

    /// Create a campaign job.
    pub fn new_campaign(
        env: &Arc<EngineEnv>,
        name: impl Into<String>,
        source: Option<String>,
        path: Option<String>,
    ) -> Arc<Job> {
        let name = name.into();
        let path = normalize_path(path.unwrap_or_else(|| {
            let dir = name.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
            format!("/{REPOSITORY_DIR}/{dir}")
        }));
        Self::new(
            env,
            name,
            JobType::Campaign,
            JobKind::Campaign(CampaignData::new(source)),
            Some(path),
        )
    }

    /// Create a parallel group pseudo-job.
    pub fn new_group(env: &Arc<EngineEnv>, name: impl Into<String>) -> Arc<Job> {
        Self::new(env, name, JobType::Group, JobKind::Group, None)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub(crate) fn env(&self) -> &Arc<EngineEnv> {
        &self.env
    }

    pub fn uri(&self) -> String {
        self.id.uri()
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, JobKind::Group)
    }

    // Tree

    pub fn parent(&self) -> Option<Arc<Job>> {
        self.parent.lock().upgrade()
    }

    /// Children on one branch, in declaration order.
    pub fn children(&self, branch: Branch) -> Vec<Arc<Job>> {
        self.children
            .lock()
            .iter()
            .filter(|(b, _)| *b == branch)
            .map(|(_, j)| Arc::clone(j))
            .collect()
    }

    /// Attach a child job.
    ///
    /// Group children always live on the unconditional branch, and the
    /// child's parent pointer is the first non-group ancestor.
    pub fn add_child(self: &Arc<Self>, child: &Arc<Job>, branch: Branch) {
        let effective = if self.is_group() {
            Branch::Unconditional
        } else {
            branch
        };
        self.children.lock().push((effective, Arc::clone(child)));

        let mut ancestor = Arc::clone(self);
        while ancestor.is_group() {
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }
        *child.parent.lock() = Arc::downgrade(&ancestor);
    }

    // Attributes

    pub fn state(&self) -> JobState {
        self.core.lock().state
    }

    pub fn result(&self) -> Option<i32> {
        self.core.lock().result
    }

    pub fn set_result(&self, result: i32) {
        self.core.lock().result = Some(result);
    }

    pub fn username(&self) -> String {
        self.core.lock().username.clone()
    }

    pub fn set_username(&self, username: impl Into<String>) {
        self.core.lock().username = username.into();
    }

    pub fn path(&self) -> Option<String> {
        self.core.lock().path.clone()
    }

    pub fn scheduled_start(&self) -> f64 {
        self.core.lock().scheduled_start
    }

    /// Schedule the start time; None means an immediate run (with a 1 s
    /// grace so the client can register for logs), and past timestamps
    /// are clamped to now.
    pub fn set_scheduled_start(&self, timestamp: Option<f64>) {
        let now = self.env.clock.epoch();
        let timestamp = match timestamp {
            None => now + 1.0,
            Some(t) if t < now => now,
            Some(t) => t,
        };
        self.core.lock().scheduled_start = timestamp;
    }

    pub fn scheduled_session(&self) -> SessionParameters {
        self.core.lock().scheduled_session.clone()
    }

    pub fn set_scheduled_session(&self, session: SessionParameters) {
        self.core.lock().scheduled_session = session;
    }

    pub fn mapping(&self) -> SessionParameters {
        self.core.lock().mapping.clone()
    }

    pub fn set_mapping(&self, mapping: SessionParameters) {
        self.core.lock().mapping = mapping;
    }

    pub fn output_session(&self) -> SessionParameters {
        self.core.lock().output_session.clone()
    }

    pub(crate) fn set_output_session(&self, session: SessionParameters) {
        self.core.lock().output_session = session;
    }

    pub fn log_filename(&self) -> Option<String> {
        self.core.lock().log_filename.clone()
    }

    pub(crate) fn set_log_filename(&self, filename: impl Into<String>) {
        self.core.lock().log_filename = Some(filename.into());
    }

    pub fn start_time(&self) -> Option<f64> {
        self.core.lock().start_time
    }

    pub fn stop_time(&self) -> Option<f64> {
        self.core.lock().stop_time
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_started(&self) -> bool {
        self.state().is_started()
    }

    /// Transition to a new state.
    ///
    /// Handles start/stop time assignment (the stop time is set exactly
    /// once), runs cleanup on terminal entry and publishes a JOB-EVENT.
    pub fn set_state(&self, state: JobState) {
        let now = self.env.clock.epoch();
        {
            let mut core = self.core.lock();
            if core.state == state {
                return;
            }
            core.state = state;
            if state == JobState::Running && core.start_time.is_none() {
                core.start_time = Some(now);
            } else if state.is_terminal() && core.stop_time.is_none() {
                // also the failure time for jobs that never started
                core.stop_time = Some(now);
            }
        }
        tracing::info!(job = %self, state = %state, "job changed state");

        if state.is_terminal() {
            self.cleanup();
        }
        self.notify_state_change();
    }

    fn notify_state_change(&self) {
        self.env.publisher.publish_job_event(&JobEvent::new(self.info()));
    }

    /// Reschedule the job. Only possible before it started.
    pub fn reschedule(&self, at: f64) -> bool {
        let can = self.scheduled_start() > self.env.clock.epoch();
        if can {
            self.set_scheduled_start(Some(at));
            self.notify_state_change();
        }
        can
    }

    /// The job info record published with every state change.
    pub fn info(&self) -> tm_core::JobInfo {
        let core = self.core.lock();
        let running_time = match (core.start_time, core.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            _ => None,
        };
        tm_core::JobInfo {
            id: self.id,
            name: self.name.clone(),
            job_type: self.job_type,
            state: core.state,
            result: core.result,
            username: core.username.clone(),
            parent_id: self.parent().map(|p| p.id()).unwrap_or(JobId(0)),
            scheduled_at: core.scheduled_start,
            start_time: core.start_time,
            stop_time: core.stop_time,
            running_time,
            path: core.path.clone(),
            log_filename: core.log_filename.clone(),
        }
    }

    /// Detailed info: the base record plus execution internals.
    pub fn details(&self) -> tm_core::job::JobDetails {
        let (source, te_command_line, te_filename, te_input_parameters) = match &self.kind {
            JobKind::Ats(data) => data.details(),
            JobKind::Campaign(data) => (data.source(), None, None, None),
            JobKind::Group => (None, None, None, None),
        };
        tm_core::job::JobDetails {
            info: self.info(),
            source,
            te_command_line,
            te_filename,
            te_input_parameters,
        }
    }

    // Life cycle dispatch

    /// Prepare the job for a run. On success the job is waiting; on
    /// failure it carries a 20-29 result code and is in error.
    pub fn prepare(self: &Arc<Self>) -> Result<(), PrepareError> {
        match &self.kind {
            JobKind::Ats(_) => crate::ats::prepare(self),
            JobKind::Campaign(_) => crate::campaign_run::prepare(self),
            JobKind::Group => Ok(()),
        }
    }

    /// Compute run paths (log file, artefact directory) just before run.
    pub fn pre_run(self: &Arc<Self>) {
        match &self.kind {
            JobKind::Ats(_) => crate::ats::pre_run(self),
            JobKind::Campaign(_) => crate::campaign_run::pre_run(self),
            JobKind::Group => {}
        }
    }

    /// Run the job to completion. Returns the result code.
    pub fn run(
        self: &Arc<Self>,
        registry: &Arc<crate::registry::JobRegistry>,
        input_session: SessionParameters,
    ) -> i32 {
        match &self.kind {
            JobKind::Ats(_) => crate::ats::run(self, input_session),
            JobKind::Campaign(_) => crate::campaign_run::run(self, registry, input_session),
            JobKind::Group => {
                tracing::warn!(job = %self, "group jobs are not directly runnable");
                0
            }
        }
    }

    /// Handle an abstract job signal.
    pub fn handle_signal(self: &Arc<Self>, signal: tm_core::JobSignal) {
        tracing::info!(job = %self, signal = %signal, "job received signal");
        match &self.kind {
            JobKind::Ats(_) => crate::ats::handle_signal(self, signal),
            JobKind::Campaign(_) => crate::campaign_run::handle_signal(self, signal),
            JobKind::Group => {
                tracing::warn!(job = %self, signal = %signal, "no signal handler for groups");
            }
        }
    }

    fn cleanup(&self) {
        if let JobKind::Ats(data) = &self.kind {
            data.cleanup(self);
        }
    }

    /// The branch a direct child sits on.
    pub fn branch_of(&self, child: &Arc<Job>) -> Option<Branch> {
        self.children
            .lock()
            .iter()
            .find(|(_, j)| Arc::ptr_eq(j, child))
            .map(|(b, _)| *b)
    }

    // Restart recovery plumbing

    /// Rebuild a job from its persisted snapshot, keeping its id.
    pub(crate) fn from_persisted(
        env: &Arc<EngineEnv>,
        persisted: &crate::persist::PersistedJob,
    ) -> Arc<Job> {
        let kind = match persisted.job_type {
            tm_core::JobType::Ats => {
                let data = AtsData::new(persisted.source.clone());
                data.set_selected_groups(persisted.selected_groups.clone());
                JobKind::Ats(data)
            }
            tm_core::JobType::Campaign => {
                JobKind::Campaign(CampaignData::new(persisted.source.clone()))
            }
            tm_core::JobType::Group => JobKind::Group,
        };
        let job = Arc::new(Job {
            id: persisted.id,
            name: persisted.name.clone(),
            job_type: persisted.job_type,
            kind,
            env: Arc::clone(env),
            core: Mutex::new(JobCore {
                state: JobState::Initializing,
                result: None,
                scheduled_start: persisted.scheduled_at,
                scheduled_session: SessionParameters::new(),
                mapping: SessionParameters::new(),
                output_session: SessionParameters::new(),
                username: String::new(),
                path: persisted.path.clone(),
                log_filename: None,
                start_time: None,
                stop_time: None,
            }),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
        });

        let restored_state = persisted.state.sanitize();
        if restored_state != persisted.state {
            tracing::info!(job = %job, from = %persisted.state, to = %restored_state,
                "job state sanitized during restore");
        }
        let result = match (persisted.result, restored_state) {
            (None, JobState::Killed) => Some(tm_core::retcode::KILLED),
            (result, _) => result,
        };
        job.restore_core(
            restored_state,
            result,
            persisted.scheduled_at,
            persisted.scheduled_session.clone(),
            persisted.mapping.clone(),
            persisted.output_session.clone(),
            persisted.username.clone(),
            persisted.log_filename.clone(),
            persisted.start_time,
            persisted.stop_time,
        );
        job
    }

    /// Snapshot for persistence.
    pub(crate) fn to_persisted(self: &Arc<Self>) -> crate::persist::PersistedJob {
        let core = self.core.lock();
        let (source, selected_groups) = match &self.kind {
            JobKind::Ats(data) => (data.source(), data.selected_groups()),
            JobKind::Campaign(data) => (data.source(), Vec::new()),
            JobKind::Group => (None, Vec::new()),
        };
        let parent = self.parent();
        crate::persist::PersistedJob {
            id: self.id,
            name: self.name.clone(),
            job_type: self.job_type,
            state: core.state,
            result: core.result,
            username: core.username.clone(),
            path: core.path.clone(),
            log_filename: core.log_filename.clone(),
            scheduled_at: core.scheduled_start,
            scheduled_session: core.scheduled_session.clone(),
            mapping: core.mapping.clone(),
            output_session: core.output_session.clone(),
            start_time: core.start_time,
            stop_time: core.stop_time,
            parent_id: parent.as_ref().map(|p| p.id()),
            branch: parent.and_then(|p| p.branch_of(self)),
            source,
            selected_groups,
        }
    }

    pub(crate) fn restore_core(
        &self,
        state: JobState,
        result: Option<i32>,
        scheduled_start: f64,
        scheduled_session: SessionParameters,
        mapping: SessionParameters,
        output_session: SessionParameters,
        username: String,
        log_filename: Option<String>,
        start_time: Option<f64>,
        stop_time: Option<f64>,
    ) {
        let mut core = self.core.lock();
        core.state = state;
        core.result = result;
        core.scheduled_start = scheduled_start;
        core.scheduled_session = scheduled_session;
        core.mapping = mapping;
        core.output_session = output_session;
        core.username = username;
        core.log_filename = log_filename;
        core.start_time = start_time;
        core.stop_time = stop_time;
        if core.state.is_terminal() && core.stop_time.is_none() {
            core.stop_time = Some(self.env.clock.epoch());
        }
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
