// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Campaign job life cycle.
//!
//! `prepare` parses the campaign source into the child job tree without
//! fetching any child source: a child ATS edited after the campaign was
//! scheduled runs with its updated content. `run` walks the tree; each
//! normal child is registered, prepared and run synchronously on its own
//! worker, then the next branch is selected by its result. Parallel
//! groups spawn an asynchronous walk joined before campaign completion.

use crate::env::ARCHIVES_DIR;
use crate::error::PrepareError;
use crate::job::{Job, JobKind};
use crate::logger::JobLogger;
use crate::registry::JobRegistry;
use chrono::Local;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tm_campaign::{CampaignPlan, PlanNode, PlanNodeKind};
use tm_core::{
    merge_session_parameters, retcode, Branch, JobSignal, JobState, MergeMode, SessionParameters,
};

/// Campaign-specific job state.
pub struct CampaignData {
    source: Mutex<Option<String>>,
    absolute_log: Mutex<Option<PathBuf>>,
    /// Parallel group walks started by this campaign; joined on
    /// completion.
    group_threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl CampaignData {
    pub fn new(source: Option<String>) -> Self {
        Self {
            source: Mutex::new(source),
            absolute_log: Mutex::new(None),
            group_threads: Mutex::new(Vec::new()),
        }
    }

    pub fn source(&self) -> Option<String> {
        self.source.lock().clone()
    }

    fn set_source(&self, source: String) {
        *self.source.lock() = Some(source);
    }
}

fn fail(job: &Arc<Job>, code: i32, description: String) -> Result<(), PrepareError> {
    tracing::error!(job = %job, "{description}");
    job.set_result(code);
    job.set_state(JobState::Error);
    Err(PrepareError::new(code, description))
}

/// Build a child job from a plan node and attach it under `parent`.
fn materialize(env: &Arc<crate::env::EngineEnv>, parent: &Arc<Job>, node: &PlanNode, username: &str) {
    let child = match &node.kind {
        PlanNodeKind::Ats { path, groups } => {
            let job = Job::new_ats(env, node.name(), None, Some(path.clone()));
            if let JobKind::Ats(data) = job.kind() {
                data.set_selected_groups(groups.clone());
            }
            job
        }
        PlanNodeKind::Campaign { path } => {
            Job::new_campaign(env, node.name(), None, Some(path.clone()))
        }
        PlanNodeKind::Group { .. } => Job::new_group(env, node.name()),
    };
    child.set_username(username);
    child.set_mapping(node.mapping.clone());
    parent.add_child(&child, node.branch);
    tracing::debug!(parent = %parent, child = %child, branch = %node.branch, "campaign child created");

    for grandchild in &node.children {
        materialize(env, &child, grandchild, username);
    }
}

/// Parse the campaign and materialize its child job tree.
pub(crate) fn prepare(job: &Arc<Job>) -> Result<(), PrepareError> {
    let JobKind::Campaign(data) = job.kind() else {
        return Ok(());
    };
    let env = job.env().clone();

    let source = match data.source() {
        Some(source) => source,
        None => {
            let path = job.path().unwrap_or_default();
            match std::fs::read_to_string(env.absolute(&path)) {
                Ok(source) => {
                    data.set_source(source.clone());
                    source
                }
                Err(e) => {
                    return fail(
                        job,
                        retcode::DEPENDENCY_ERROR,
                        format!("unable to read campaign source {path}: {e}"),
                    )
                }
            }
        }
    };

    tracing::info!(job = %job, "parsing campaign");
    let campaign_dir = {
        let path = job.path().unwrap_or_default();
        path.rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or(path)
    };
    let plan: CampaignPlan = match tm_campaign::parse(&source, &campaign_dir) {
        Ok(plan) => plan,
        Err(e) => {
            return fail(
                job,
                retcode::DEPENDENCY_ERROR,
                format!("unable to prepare the campaign: {e}"),
            )
        }
    };

    let username = job.username();
    for node in &plan.roots {
        materialize(&env, job, node, &username);
    }

    tracing::info!(job = %job, "campaign parsed, all children created");
    job.set_state(JobState::Waiting);
    Ok(())
}

/// Compute the campaign log paths.
pub(crate) fn pre_run(job: &Arc<Job>) {
    let JobKind::Campaign(data) = job.kind() else {
        return;
    };
    let env = job.env();

    let base_docroot_dir = format!("/{ARCHIVES_DIR}/{}", job.name());
    let now = Local::now();
    let basename = format!(
        "{}-{:03}-{}-{}",
        now.format("%Y%m%d-%H%M%S"),
        now.timestamp_subsec_millis(),
        job.id(),
        job.username()
    );
    let base_dir = env.absolute(&base_docroot_dir);
    if let Err(e) = std::fs::create_dir_all(&base_dir) {
        tracing::warn!(job = %job, error = %e, "unable to create archive directory");
    }

    job.set_log_filename(format!("{base_docroot_dir}/{basename}.log"));
    *data.absolute_log.lock() = Some(base_dir.join(format!("{basename}.log")));
}

fn log_event(job: &Arc<Job>, element: &str, attributes: &[(&str, String)], class: &str) {
    let JobKind::Campaign(data) = job.kind() else {
        return;
    };
    let Some(path) = data.absolute_log.lock().clone() else {
        return;
    };
    let logger = JobLogger::new(path, job.env().clock.epoch());
    let mut attrs: Vec<(&str, String)> = attributes.to_vec();
    attrs.push(("class", class.to_string()));
    if let Err(e) = logger.log_event(element, &attrs, "") {
        tracing::warn!(job = %job, error = %e, "unable to append to the campaign log");
    }
}

/// Execute the campaign and return its result code.
///
/// A campaign reports 0 once it ran to completion, whatever its children
/// returned; only cancellation yields a non-zero result.
pub(crate) fn run(
    job: &Arc<Job>,
    registry: &Arc<JobRegistry>,
    input_session: SessionParameters,
) -> i32 {
    log_event(
        job,
        "campaign-started",
        &[("id", job.name().to_string())],
        "event",
    );
    job.set_state(JobState::Running);

    run_branch(job, job, registry, &input_session, Branch::Unconditional);
    wait_for_groups(job);

    match job.state() {
        JobState::Running => {
            job.set_result(retcode::OK);
            job.set_state(JobState::Complete);
        }
        JobState::Cancelling => {
            job.set_result(retcode::CANCELLED);
            job.set_state(JobState::Cancelled);
        }
        _ => {}
    }

    let result = job.result().unwrap_or(retcode::OK);
    log_event(
        job,
        "campaign-stopped",
        &[
            ("id", job.name().to_string()),
            ("result", result.to_string()),
        ],
        "event",
    );
    result
}

/// Run every child of `calling` on `branch`, recursing by result.
fn run_branch(
    campaign: &Arc<Job>,
    calling: &Arc<Job>,
    registry: &Arc<JobRegistry>,
    input_session: &SessionParameters,
    branch: Branch,
) {
    if campaign.state() != JobState::Running {
        // cancelled or killed: stop the recursion
        return;
    }

    let env = campaign.env().clone();
    let JobKind::Campaign(data) = campaign.kind() else {
        return;
    };

    let signature = {
        let source = data.source().unwrap_or_default();
        match env.te_factory.metadata(&source) {
            Ok(metadata) => metadata.signature,
            Err(e) => {
                tracing::error!(campaign = %campaign, error = %e, "unable to extract the campaign signature");
                campaign.set_result(retcode::EXECUTION_SETUP_ERROR);
                campaign.set_state(JobState::Error);
                return;
            }
        }
    };

    let merged = merge_session_parameters(
        input_session,
        &signature,
        &calling.mapping(),
        MergeMode::Loose,
    );

    for child in calling.children(branch) {
        if campaign.state() != JobState::Running {
            return;
        }

        if child.is_group() {
            tracing::info!(campaign = %campaign, group = %child, "starting parallel group");
            let session = merge_session_parameters(
                input_session,
                &signature,
                &child.mapping(),
                MergeMode::Loose,
            );
            let campaign_clone = Arc::clone(campaign);
            let registry_clone = Arc::clone(registry);
            let handle = thread::spawn(move || {
                run_branch(
                    &campaign_clone,
                    &child,
                    &registry_clone,
                    &session,
                    Branch::Unconditional,
                );
            });
            data.group_threads.lock().push(handle);
            // do not wait, no include marker: straight to the next sibling
            continue;
        }

        // Normal child: synchronous execution, visible in the queue.
        registry.register(Arc::clone(&child));
        tracing::info!(campaign = %campaign, child = %child, branch = %branch, "preparing child job");
        let prepared = child.prepare().is_ok();

        if prepared {
            tracing::info!(campaign = %campaign, child = %child, "starting child job");
            child.pre_run();
            let worker_child = Arc::clone(&child);
            let worker_registry = Arc::clone(registry);
            let worker_session = merged.clone();
            let worker = thread::spawn(move || {
                worker_child.run(&worker_registry, worker_session);
            });
            if let Err(e) = worker.join() {
                tracing::error!(campaign = %campaign, child = %child, "child worker panicked: {e:?}");
            }
            // the include marker lets log readers weave the child log in
            log_event(
                campaign,
                "include",
                &[(
                    "url",
                    format!(
                        "testerman://{}",
                        child.log_filename().unwrap_or_default()
                    ),
                )],
                "core",
            );
        }

        let ret = child.result().unwrap_or(retcode::EXECUTION_SETUP_ERROR);
        tracing::info!(campaign = %campaign, child = %child, result = ret, "child job finished");

        let (next_branch, next_session) = if ret == retcode::OK {
            (Branch::Success, child.output_session())
        } else {
            // an error child may leave an empty output session: fall back
            // to the branch input
            let output = child.output_session();
            let next = if output.is_empty() {
                input_session.clone()
            } else {
                output
            };
            (Branch::Error, next)
        };

        run_branch(campaign, &child, registry, &next_session, next_branch);
    }
}

fn wait_for_groups(job: &Arc<Job>) {
    let JobKind::Campaign(data) = job.kind() else {
        return;
    };
    loop {
        let handle = data.group_threads.lock().pop();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    tracing::error!(job = %job, "a parallel group worker panicked");
                }
            }
            None => return,
        }
    }
}

/// Campaign signal handling: only cancel is meaningful.
pub(crate) fn handle_signal(job: &Arc<Job>, signal: JobSignal) {
    match signal {
        JobSignal::Cancel => {
            if job.state() == JobState::Waiting {
                job.set_result(retcode::CANCELLED);
                job.set_state(JobState::Cancelled);
            } else if !job.state().is_terminal() {
                job.set_state(JobState::Cancelling);
            }
        }
        other => {
            tracing::warn!(job = %job, signal = %other, "unhandled campaign signal");
        }
    }
}

#[cfg(test)]
#[path = "campaign_run_tests.rs"]
mod tests;
