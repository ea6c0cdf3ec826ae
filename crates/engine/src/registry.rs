// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The global job registry.
//!
//! Holds every job registered during the current process lifetime (the
//! "queue"), owns the scheduler, and is the entry point for submissions,
//! signals, rescheduling, purge and persistence. Preparation runs inline
//! in `submit` so errors reach the submitter synchronously.

use crate::env::EngineEnv;
use crate::error::EngineError;
use crate::job::Job;
use crate::logger::read_log;
use crate::persist::{self, PersistedJob, QUEUE_FILENAME};
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tm_core::{JobId, JobSignal, JobState};

/// The job table plus the scheduler.
pub struct JobRegistry {
    env: Arc<EngineEnv>,
    jobs: Mutex<Vec<Arc<Job>>>,
    /// Jobs already handed to a worker; a job is launched at most once
    /// even when it stays in the waiting state for a few more ticks.
    launched: Mutex<HashSet<JobId>>,
    scheduler: Scheduler,
}

impl JobRegistry {
    /// Build the registry, restoring any persisted queue.
    pub fn new(env: Arc<EngineEnv>) -> Arc<Self> {
        let scheduler = Scheduler::new(env.config.scheduler_interval);
        let registry = Arc::new(Self {
            env,
            jobs: Mutex::new(Vec::new()),
            launched: Mutex::new(HashSet::new()),
            scheduler,
        });
        registry.restore();
        registry
    }

    pub fn env(&self) -> &Arc<EngineEnv> {
        &self.env
    }

    /// Start the scheduler task.
    pub fn start(self: &Arc<Self>) {
        self.scheduler.start(Arc::downgrade(self));
    }

    /// Stop the scheduler and persist the queue.
    pub fn stop(&self) {
        self.scheduler.stop();
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "unable to persist the job queue");
        }
    }

    /// Register a job in the queue without touching its state. Campaigns
    /// use this for the children they manage themselves.
    pub fn register(&self, job: Arc<Job>) {
        self.jobs.lock().push(job);
    }

    /// Submit a new job: register, prepare inline, wake the scheduler.
    ///
    /// Preparation errors are forwarded to the caller; the job stays in
    /// the queue in the error state.
    pub fn submit(self: &Arc<Self>, job: Arc<Job>) -> Result<JobId, EngineError> {
        let id = job.id();
        self.register(Arc::clone(&job));
        job.prepare()?;
        tracing::info!(job = %job, scheduled_at = job.scheduled_start(), "new job submitted");
        // maybe an instant run is due
        self.scheduler.notify();
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> Option<Arc<Job>> {
        self.jobs.lock().iter().find(|j| j.id() == id).cloned()
    }

    /// Every job, in registration order.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.jobs.lock().clone()
    }

    /// Waiting root jobs: non-root children are started by their parent
    /// campaign, not by the scheduler.
    fn waiting_root_jobs(&self) -> Vec<Arc<Job>> {
        self.jobs
            .lock()
            .iter()
            .filter(|j| j.parent().is_none() && j.state() == JobState::Waiting)
            .cloned()
            .collect()
    }

    /// One scheduler tick: launch every due waiting root job.
    pub(crate) fn check_schedule(self: &Arc<Self>) {
        let now = self.env.clock.epoch();
        for job in self.waiting_root_jobs() {
            if job.scheduled_start() < now {
                if !self.launched.lock().insert(job.id()) {
                    continue;
                }
                tracing::info!(job = %job, "scheduler: starting job");
                job.pre_run();
                let registry = Arc::clone(self);
                let worker = Arc::clone(&job);
                let spawned = thread::Builder::new()
                    .name(format!("tm-job-{}", job.id()))
                    .spawn(move || {
                        worker.run(&registry, worker.scheduled_session());
                    });
                if let Err(e) = spawned {
                    tracing::error!(job = %job, error = %e, "unable to spawn job worker");
                }
            }
        }
    }

    // Queries

    /// Info records, either for one job or the whole queue.
    pub fn job_info(&self, id: Option<JobId>) -> Vec<tm_core::JobInfo> {
        self.jobs
            .lock()
            .iter()
            .filter(|j| id.map(|id| j.id() == id).unwrap_or(true))
            .map(|j| j.info())
            .collect()
    }

    pub fn job_details(&self, id: JobId) -> Option<tm_core::job::JobDetails> {
        self.get(id).map(|j| j.details())
    }

    /// The job's log, wrapped in a well-formed document.
    pub fn job_log(&self, id: JobId) -> Option<String> {
        let job = self.get(id)?;
        let log_filename = job.log_filename()?;
        Some(read_log(&self.env.absolute(&log_filename)))
    }

    pub fn job_log_filename(&self, id: JobId) -> Option<String> {
        self.get(id).and_then(|j| j.log_filename())
    }

    // Control

    /// Dispatch a signal to a job. Returns false for unknown ids.
    pub fn send_signal(&self, id: JobId, signal: JobSignal) -> bool {
        match self.get(id) {
            Some(job) => {
                job.handle_signal(signal);
                true
            }
            None => false,
        }
    }

    /// Reschedule a job that has not started yet.
    pub fn reschedule(&self, id: JobId, at: f64) -> bool {
        self.get(id).map(|j| j.reschedule(at)).unwrap_or(false)
    }

    /// Kill every job (shutdown).
    pub fn kill_all(&self) {
        for job in self.jobs() {
            job.handle_signal(JobSignal::Kill);
        }
    }

    /// Purge terminal jobs stopped before `older_than` whose whole
    /// bottom-up ancestry is terminal too. Returns the purge count.
    pub fn purge(&self, older_than: f64) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|job| {
            let stopped_before = job
                .stop_time()
                .map(|stop| stop < older_than)
                .unwrap_or(false);
            !(stopped_before && ancestry_terminal(job))
        });
        before - jobs.len()
    }

    // Persistence

    fn queue_path(&self) -> Option<PathBuf> {
        self.env
            .config
            .var_root
            .as_ref()
            .map(|root| root.join(QUEUE_FILENAME))
    }

    /// Serialize the queue to the state directory.
    pub fn persist(&self) -> Result<(), EngineError> {
        let Some(path) = self.queue_path() else {
            return Ok(());
        };
        let snapshot: Vec<PersistedJob> = self.jobs().iter().map(|j| j.to_persisted()).collect();
        tracing::debug!(path = %path.display(), jobs = snapshot.len(), "persisting job queue");
        persist::save(&path, &snapshot)
    }

    /// Reload the persisted queue, sanitizing in-flight states and
    /// advancing the id generator past the highest recovered id.
    fn restore(&self) {
        let Some(path) = self.queue_path() else {
            return;
        };
        let persisted = match persist::load(&path) {
            Ok(Some(jobs)) => jobs,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "unable to restore the job queue");
                return;
            }
        };

        let mut by_id: HashMap<JobId, Arc<Job>> = HashMap::new();
        let mut restored: Vec<Arc<Job>> = Vec::new();
        let mut max_id = JobId(0);
        for entry in &persisted {
            let job = Job::from_persisted(&self.env, entry);
            by_id.insert(job.id(), Arc::clone(&job));
            restored.push(job);
            max_id = max_id.max(entry.id);
        }
        // relink the trees
        for entry in &persisted {
            let (Some(parent_id), Some(child)) = (entry.parent_id, by_id.get(&entry.id)) else {
                continue;
            };
            if let Some(parent) = by_id.get(&parent_id) {
                parent.add_child(child, entry.branch.unwrap_or(tm_core::Branch::Unconditional));
            }
        }

        let count = restored.len();
        *self.jobs.lock() = restored;
        self.env.ids.advance_to(max_id);
        tracing::info!(jobs = count, next_id = max_id.as_u64() + 1, "job queue restored");
    }
}

/// True when the job and every ancestor are stopped.
fn ancestry_terminal(job: &Arc<Job>) -> bool {
    if job.stop_time().is_none() {
        return false;
    }
    let mut current = job.parent();
    while let Some(ancestor) = current {
        if ancestor.stop_time().is_none() {
            return false;
        }
        current = ancestor.parent();
    }
    true
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
