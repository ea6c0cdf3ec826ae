// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TE process supervision.
//!
//! The TE is a plain child process: spawned with a prepared command line,
//! supervised by a blocking wait, and driven through Unix signals. Kill
//! escalation must reach the whole process tree, because probes may fork
//! into other sessions or process groups and would miss a group signal.

use crate::error::EngineError;
use crate::te::TeCommand;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// How a TE run ended: the exit code, or the signal that took it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub retcode: i32,
    pub signal: Option<i32>,
}

/// A spawned TE under supervision.
pub struct TeProcess {
    child: Child,
}

impl TeProcess {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Block until the TE exits.
    pub fn wait(&mut self) -> Result<ExitOutcome, EngineError> {
        let status = self.child.wait()?;
        Ok(ExitOutcome {
            retcode: status.code().unwrap_or(0),
            signal: status.signal(),
        })
    }
}

/// Fork-exec a TE with its prepared environment and working directory.
pub fn spawn(command: &TeCommand, cwd: &Path) -> Result<TeProcess, EngineError> {
    let child = Command::new(&command.executable)
        .args(&command.args)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(cwd)
        .stdin(Stdio::null())
        .spawn()?;
    Ok(TeProcess { child })
}

/// Deliver a signal to a single process.
pub fn send_signal(pid: u32, signal: Signal) -> Result<(), EngineError> {
    kill(Pid::from_raw(pid as i32), signal)
        .map_err(|e| EngineError::Signal(format!("unable to signal pid {pid}: {e}")))
}

/// The pid plus every descendant, leaves last.
///
/// Children are discovered through `/proc/<pid>/task/*/children`.
pub fn process_tree(pid: u32) -> Vec<u32> {
    let mut tree = vec![pid];
    let mut i = 0;
    while i < tree.len() {
        let current = tree[i];
        i += 1;
        let task_dir = format!("/proc/{current}/task");
        let Ok(tasks) = std::fs::read_dir(&task_dir) else {
            continue;
        };
        for task in tasks.flatten() {
            let children_path = task.path().join("children");
            let Ok(children) = std::fs::read_to_string(&children_path) else {
                continue;
            };
            for child in children.split_whitespace() {
                if let Ok(child_pid) = child.parse::<u32>() {
                    if !tree.contains(&child_pid) {
                        tree.push(child_pid);
                    }
                }
            }
        }
    }
    tree
}

/// SIGKILL the process and all its descendants.
pub fn kill_tree(pid: u32) {
    for target in process_tree(pid) {
        tracing::info!(pid = target, "killing child process");
        if let Err(e) = send_signal(target, Signal::SIGKILL) {
            tracing::warn!(pid = target, error = %e, "unable to kill process");
        }
    }
}

#[cfg(test)]
#[path = "supervise_tests.rs"]
mod tests;
