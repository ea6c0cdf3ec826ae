// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ATS job life cycle.
//!
//! `prepare` builds a self-contained TE package in a staging directory
//! (so later source edits cannot leak into a queued run), `pre_run`
//! computes the final artefact paths, `run` moves the package into the
//! archives, merges the input session, forks the TE and supervises it to
//! completion. Job signals translate to Unix signals on the TE process.

use crate::env::ARCHIVES_DIR;
use crate::error::PrepareError;
use crate::job::{Job, JobKind};
use crate::prepare::{archive_staging_tree, build_staging_tree, move_tree, TE_MAIN};
use crate::supervise;
use crate::te::{dump_session, load_session, TeCommandSpec};
use chrono::Local;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tm_core::{
    merge_session_parameters, retcode, JobSignal, JobState, MergeMode, SessionParameters,
};

/// ATS-specific job state.
pub struct AtsData {
    source: Mutex<Option<String>>,
    selected_groups: Mutex<Vec<String>>,
    te_pid: Mutex<Option<u32>>,
    paths: Mutex<AtsPaths>,
    details: Mutex<AtsDetails>,
}

#[derive(Default)]
struct AtsPaths {
    /// Prepared package awaiting its run.
    staging_dir: Option<PathBuf>,
    /// Docroot directory of all runs of this ATS (`/archives/<name>`).
    base_docroot_dir: Option<String>,
    /// Absolute counterpart of `base_docroot_dir`.
    base_dir: Option<PathBuf>,
    /// Unique per-execution basename.
    basename: Option<String>,
    /// Final TE package directory.
    package_dir: Option<PathBuf>,
}

#[derive(Default)]
struct AtsDetails {
    te_command_line: Option<String>,
    te_filename: Option<String>,
    te_input_session: Option<SessionParameters>,
}

impl AtsData {
    pub fn new(source: Option<String>) -> Self {
        Self {
            source: Mutex::new(source),
            selected_groups: Mutex::new(Vec::new()),
            te_pid: Mutex::new(None),
            paths: Mutex::new(AtsPaths::default()),
            details: Mutex::new(AtsDetails::default()),
        }
    }

    pub fn source(&self) -> Option<String> {
        self.source.lock().clone()
    }

    fn set_source(&self, source: String) {
        *self.source.lock() = Some(source);
    }

    pub fn selected_groups(&self) -> Vec<String> {
        self.selected_groups.lock().clone()
    }

    pub fn set_selected_groups(&self, groups: Vec<String>) {
        *self.selected_groups.lock() = groups;
    }

    pub fn te_pid(&self) -> Option<u32> {
        *self.te_pid.lock()
    }

    pub(crate) fn details(
        &self,
    ) -> (
        Option<String>,
        Option<String>,
        Option<String>,
        Option<SessionParameters>,
    ) {
        let details = self.details.lock();
        (
            self.source(),
            details.te_command_line.clone(),
            details.te_filename.clone(),
            details.te_input_session.clone(),
        )
    }

    /// Delete the prepared staging tree, if any.
    pub(crate) fn cleanup(&self, job: &Job) {
        let staging = self.paths.lock().staging_dir.take();
        if let Some(dir) = staging {
            tracing::info!(job = %job, "cleaning up staging directory");
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(job = %job, error = %e, "unable to remove staging directory");
            }
        }
    }
}

fn fail(job: &Arc<Job>, code: i32, description: String) -> Result<(), PrepareError> {
    tracing::error!(job = %job, "{description}");
    job.set_result(code);
    job.set_state(JobState::Error);
    Err(PrepareError::new(code, description))
}

/// Load the job source, reading it from the repository when the job was
/// created from a path only (campaign children).
fn load_source(job: &Arc<Job>, data: &AtsData) -> Result<String, String> {
    if let Some(source) = data.source() {
        return Ok(source);
    }
    let path = job.path().unwrap_or_default();
    match std::fs::read_to_string(job.env().absolute(&path)) {
        Ok(source) => {
            data.set_source(source.clone());
            Ok(source)
        }
        Err(e) => Err(format!("unable to read source {path}: {e}")),
    }
}

/// Prepare the ATS: resolve dependencies, build and verify the TE, stage
/// and package it.
pub(crate) fn prepare(job: &Arc<Job>) -> Result<(), PrepareError> {
    let JobKind::Ats(data) = job.kind() else {
        return Ok(());
    };
    let env = job.env().clone();

    let source = match load_source(job, data) {
        Ok(source) => source,
        Err(desc) => return fail(job, retcode::DEPENDENCY_ERROR, desc),
    };

    let metadata = match env.te_factory.metadata(&source) {
        Ok(metadata) => metadata,
        Err(e) => return fail(job, e.code, e.message),
    };

    let path = job.path().unwrap_or_default();
    tracing::info!(job = %job, path = %path, "resolving dependencies");
    let dependencies =
        match env
            .resolver
            .resolve(&source, &path, &env.config.document_root)
        {
            Ok(deps) => deps,
            Err(e) => {
                return fail(
                    job,
                    retcode::DEPENDENCY_ERROR,
                    format!("unable to resolve dependencies: {e}"),
                )
            }
        };
    tracing::debug!(job = %job, deps = ?dependencies, "resolved dependencies");

    let ats_dir = path
        .rsplit_once('/')
        .map(|(dir, _)| dir.trim_start_matches('/').to_string())
        .unwrap_or_default();
    let te = match env.te_factory.create_executable(job.name(), &source, &ats_dir) {
        Ok(te) => te,
        Err(e) => return fail(job, retcode::UNSUPPORTED_API_ERROR, e.message),
    };

    tracing::info!(job = %job, "verifying TE");
    if let Err(e) = env.te_factory.check_syntax(&te) {
        return fail(job, e.code, e.message);
    }

    tracing::info!(job = %job, "preparing TE files");
    let staging_dir = env
        .config
        .document_root
        .join(".staging")
        .join(format!("te-{}", job.id()));
    if staging_dir.exists() {
        let _ = std::fs::remove_dir_all(&staging_dir);
    }

    let core_dependencies = env.te_factory.core_dependencies(metadata.api.as_deref());
    if let Err(e) = build_staging_tree(&env, &staging_dir, &te, &dependencies, &core_dependencies)
    {
        return fail(job, e.code, e.message);
    }
    if let Err(e) = archive_staging_tree(&staging_dir) {
        return fail(job, e.code, e.message);
    }

    data.paths.lock().staging_dir = Some(staging_dir);
    job.set_state(JobState::Waiting);
    Ok(())
}

/// Unique per-execution basename, the job id woven into the timestamp.
fn execution_basename(job: &Job) -> String {
    let now = Local::now();
    let datetime = now.format("%Y%m%d-%H%M%S");
    let ms = now.timestamp_subsec_millis();
    format!("{datetime}-{ms:03}-{}-{}", job.id(), job.username())
}

/// Compute the final artefact paths and ensure their directories exist.
pub(crate) fn pre_run(job: &Arc<Job>) {
    let JobKind::Ats(data) = job.kind() else {
        return;
    };
    let env = job.env();

    let base_docroot_dir = format!("/{ARCHIVES_DIR}/{}", job.name());
    let basename = execution_basename(job);
    let base_dir = env.absolute(&base_docroot_dir);
    let package_dir = base_dir.join(&basename);
    let log_filename = format!("{base_docroot_dir}/{basename}.log");

    if let Err(e) = std::fs::create_dir_all(&base_dir) {
        tracing::warn!(job = %job, error = %e, "unable to create archive directory");
    }

    job.set_log_filename(&log_filename);
    let mut paths = data.paths.lock();
    paths.base_docroot_dir = Some(base_docroot_dir);
    paths.base_dir = Some(base_dir);
    paths.basename = Some(basename);
    paths.package_dir = Some(package_dir);
}

fn run_error(job: &Arc<Job>, code: i32, description: String) -> i32 {
    tracing::error!(job = %job, "{description}");
    job.set_result(code);
    job.set_state(JobState::Error);
    code
}

/// Move the prepared TE to the archives, fork it and wait.
pub(crate) fn run(job: &Arc<Job>, input_session: SessionParameters) -> i32 {
    let JobKind::Ats(data) = job.kind() else {
        return retcode::EXECUTION_SETUP_ERROR;
    };
    let env = job.env().clone();

    let (staging_dir, base_dir, basename, package_dir) = {
        let paths = data.paths.lock();
        (
            paths.staging_dir.clone(),
            paths.base_dir.clone(),
            paths.basename.clone(),
            paths.package_dir.clone(),
        )
    };
    let (Some(staging_dir), Some(base_dir), Some(basename), Some(package_dir)) =
        (staging_dir, base_dir, basename, package_dir)
    else {
        return run_error(
            job,
            retcode::EXECUTION_SETUP_ERROR,
            "job was not prepared".to_string(),
        );
    };

    // Move the prepared tree to its final location in the archives.
    if let Err(e) = move_tree(&staging_dir, &package_dir) {
        return run_error(
            job,
            retcode::STAGING_MOVE_ERROR,
            format!("unable to move prepared TE to its final location: {e}"),
        );
    }
    data.paths.lock().staging_dir = None;

    // Merged input session: signature defaults, caller session, mapping.
    let source = data.source().unwrap_or_default();
    let signature = match env.te_factory.metadata(&source) {
        Ok(metadata) => metadata.signature,
        Err(e) => {
            return run_error(
                job,
                retcode::EXECUTION_SETUP_ERROR,
                format!("unable to extract the script signature: {e}"),
            )
        }
    };
    let merged = merge_session_parameters(
        &input_session,
        &signature,
        &job.mapping(),
        MergeMode::Loose,
    );
    tracing::info!(job = %job, session = ?merged, "using merged input session parameters");
    data.details.lock().te_input_session = Some(merged.clone());

    let input_session_filename = package_dir.join(format!("{basename}.input.session"));
    let output_session_filename = package_dir.join(format!("{basename}.output.session"));
    let dumped = match dump_session(&merged) {
        Ok(dumped) => dumped,
        Err(e) => {
            return run_error(
                job,
                retcode::STAGING_MOVE_ERROR,
                format!("unable to serialize the input session: {e}"),
            )
        }
    };
    if let Err(e) = std::fs::write(&input_session_filename, dumped) {
        return run_error(
            job,
            retcode::STAGING_MOVE_ERROR,
            format!("unable to create the input session file: {e}"),
        );
    }

    // Build the TE command line.
    let te_filename = package_dir.join("src").join(TE_MAIN);
    let te_log_filename = base_dir.join(format!("{basename}.log"));
    let command = env.te_factory.command_line(&TeCommandSpec {
        job_id: job.id().as_u64(),
        te_filename: te_filename.clone(),
        log_filename: te_log_filename,
        input_session_filename: input_session_filename.clone(),
        output_session_filename: output_session_filename.clone(),
        selected_groups: data.selected_groups(),
    });
    {
        let mut details = data.details.lock();
        details.te_command_line = Some(command.display_line());
        details.te_filename = te_filename
            .strip_prefix(&env.config.document_root)
            .map(|p| format!("/{}", p.display()))
            .ok();
    }
    tracing::info!(job = %job, command = %command.display_line(), "executing TE");

    // Fork and supervise.
    let mut process = match supervise::spawn(&command, &package_dir) {
        Ok(process) => process,
        Err(e) => {
            let _ = std::fs::remove_file(&input_session_filename);
            return run_error(
                job,
                retcode::EXECUTION_SETUP_ERROR,
                format!("unable to execute TE: {e}"),
            );
        }
    };
    *data.te_pid.lock() = Some(process.pid());
    job.set_state(JobState::Running);
    tracing::info!(job = %job, pid = process.pid(), "waiting for TE to complete");

    let outcome = process.wait();
    *data.te_pid.lock() = None;

    match outcome {
        Err(e) => {
            let _ = std::fs::remove_file(&input_session_filename);
            return run_error(
                job,
                retcode::EXECUTION_SETUP_ERROR,
                format!("unable to wait for TE: {e}"),
            );
        }
        Ok(outcome) => {
            if let Some(signal) = outcome.signal {
                tracing::info!(job = %job, signal, "TE terminated by signal");
                if signal == Signal::SIGKILL as i32 {
                    // a killed TE never reports an OK retcode
                    job.set_result(retcode::KILLED);
                    job.set_state(JobState::Killed);
                } else {
                    job.set_result(retcode::RUNTIME_CRASH);
                    job.set_state(JobState::Error);
                }
            } else {
                tracing::info!(job = %job, retcode = outcome.retcode, "TE returned");
                job.set_result(outcome.retcode);
                match outcome.retcode {
                    retcode::OK | retcode::OK_WITH_FAILED_TC => job.set_state(JobState::Complete),
                    retcode::CANCELLED => job.set_state(JobState::Cancelled),
                    _ => job.set_state(JobState::Error),
                }
            }
        }
    }

    // Collect the output session for job chaining.
    match std::fs::read_to_string(&output_session_filename) {
        Ok(content) => match load_session(&content) {
            Ok(session) => job.set_output_session(session),
            Err(e) => {
                tracing::warn!(job = %job, error = %e, "unable to parse the output session file");
            }
        },
        Err(e) => {
            tracing::warn!(job = %job, error = %e, "unable to read the output session file");
        }
    }
    for filename in [&input_session_filename, &output_session_filename] {
        if let Err(e) = std::fs::remove_file(filename) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(job = %job, error = %e, "unable to delete a session file");
            }
        }
    }

    job.result().unwrap_or(retcode::EXECUTION_SETUP_ERROR)
}

/// Translate an abstract job signal into Unix signals on the TE.
///
/// Each signal is idempotent with respect to terminal states.
pub(crate) fn handle_signal(job: &Arc<Job>, signal: JobSignal) {
    let JobKind::Ats(data) = job.kind() else {
        return;
    };
    let state = job.state();
    let pid = data.te_pid();

    let outcome = match (signal, pid) {
        (JobSignal::Kill, Some(pid)) if state != JobState::Killed => {
            // Violent kill of the whole TE process tree: probes may fork
            // into other sessions or process groups.
            job.set_state(JobState::Killing);
            supervise::kill_tree(pid);
            Ok(())
        }
        (JobSignal::Cancel, Some(pid)) if state == JobState::Paused => {
            job.set_state(JobState::Cancelling);
            // the TE must be running again to take the INT into account
            supervise::send_signal(pid, Signal::SIGCONT)
                .and_then(|_| supervise::send_signal(pid, Signal::SIGINT))
        }
        (JobSignal::Cancel, Some(pid)) if state == JobState::Running => {
            job.set_state(JobState::Cancelling);
            supervise::send_signal(pid, Signal::SIGINT)
        }
        (JobSignal::Cancel, _) if state == JobState::Waiting => {
            job.set_result(retcode::CANCELLED);
            job.set_state(JobState::Cancelled);
            Ok(())
        }
        (JobSignal::Pause, Some(pid)) if state == JobState::Running => {
            supervise::send_signal(pid, Signal::SIGSTOP).map(|_| {
                job.set_state(JobState::Paused);
            })
        }
        (JobSignal::Resume, Some(pid)) if state == JobState::Paused => {
            supervise::send_signal(pid, Signal::SIGCONT).map(|_| {
                job.set_state(JobState::Running);
            })
        }
        (JobSignal::ActionPerformed, Some(pid)) if state == JobState::Running => {
            supervise::send_signal(pid, Signal::SIGUSR1)
        }
        _ => Ok(()),
    };

    if let Err(e) = outcome {
        tracing::error!(job = %job, signal = %signal, error = %e, "unable to handle signal");
    }
}

#[cfg(test)]
#[path = "ats_tests.rs"]
mod tests;
