// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job queue persistence.
//!
//! The whole queue is serialized to a single JSON file in the state
//! directory on shutdown and reloaded on start. The file is written
//! atomically (tmp + rename); a corrupt file is moved aside to `.bak`
//! rather than aborting startup. Serialisation is only used across
//! restarts of the same server, never for cross-process communication.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tm_core::{Branch, JobId, JobState, JobType, SessionParameters};

/// File name of the persisted queue inside the state directory.
pub const QUEUE_FILENAME: &str = "jobqueue.json";

/// Persistable snapshot of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub id: JobId,
    pub name: String,
    pub job_type: JobType,
    pub state: JobState,
    pub result: Option<i32>,
    pub username: String,
    pub path: Option<String>,
    pub log_filename: Option<String>,
    pub scheduled_at: f64,
    #[serde(default)]
    pub scheduled_session: SessionParameters,
    #[serde(default)]
    pub mapping: SessionParameters,
    #[serde(default)]
    pub output_session: SessionParameters,
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    /// Parent job, when any; the child's branch under it.
    pub parent_id: Option<JobId>,
    pub branch: Option<Branch>,
    /// ATS/campaign source, kept so restored waiting jobs can still run.
    pub source: Option<String>,
    #[serde(default)]
    pub selected_groups: Vec<String>,
}

/// Write the queue snapshot atomically.
pub fn save(path: &Path, jobs: &[PersistedJob]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, jobs)
            .map_err(|e| EngineError::Persist(e.to_string()))?;
        let file = writer
            .into_inner()
            .map_err(|e| EngineError::Persist(e.to_string()))?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load the persisted queue if present.
///
/// Returns `Ok(None)` when the file does not exist or cannot be parsed;
/// a corrupt file is moved to a `.bak` so the server still starts.
pub fn load(path: &Path) -> Result<Option<Vec<PersistedJob>>, EngineError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    match serde_json::from_reader(reader) {
        Ok(jobs) => Ok(Some(jobs)),
        Err(e) => {
            let bak_path = bak_path(path);
            tracing::warn!(
                error = %e,
                path = %path.display(),
                bak = %bak_path.display(),
                "corrupt job queue file, moving to .bak and starting empty",
            );
            fs::rename(path, &bak_path)?;
            Ok(None)
        }
    }
}

fn bak_path(path: &Path) -> PathBuf {
    path.with_extension("bak")
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
