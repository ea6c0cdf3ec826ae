// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TE staging tree construction and packaging.
//!
//! The staging tree is self-contained: the generated TE main module, the
//! resolved userland dependencies under `repository/` (with package-init
//! markers in intermediate directories), the fixed core modules and a
//! package metadata file. The tree is then packed into a `te.tar.gz`
//! artefact kept alongside it.

use crate::env::EngineEnv;
use crate::error::PrepareError;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tm_core::retcode;

/// Name of the TE main module inside the package.
pub const TE_MAIN: &str = "__main__";

/// Name of the packaged artefact.
pub const TE_ARCHIVE: &str = "te.tar.gz";

#[derive(Serialize)]
struct PackageInfo<'a> {
    name: &'a str,
    version: &'a str,
    sources: &'a [String],
}

fn packaging_error(message: impl Into<String>) -> PrepareError {
    PrepareError::new(retcode::PACKAGING_ERROR, message.into())
}

/// Build the staging tree under `staging_dir/src`.
///
/// Returns the list of packaged source paths (relative to `src/`).
pub fn build_staging_tree(
    env: &EngineEnv,
    staging_dir: &Path,
    te: &str,
    dependencies: &[String],
    core_dependencies: &[String],
) -> Result<Vec<String>, PrepareError> {
    let src = staging_dir.join("src");
    fs::create_dir_all(&src)
        .map_err(|e| packaging_error(format!("unable to create TE package: {e}")))?;

    let mut sources: Vec<String> = Vec::new();

    // The TE body itself
    fs::write(src.join(TE_MAIN), te)
        .map_err(|e| packaging_error(format!("unable to write TE main module: {e}")))?;
    sources.push(TE_MAIN.to_string());

    // Userland dependencies, docroot paths replicated under src/
    for dep in dependencies {
        let relative = dep.trim_start_matches('/');
        let target = src.join(relative);

        // intermediate directories carry an empty package-init marker
        let mut current = src.clone();
        for component in Path::new(relative)
            .parent()
            .map(Path::components)
            .into_iter()
            .flatten()
        {
            current = current.join(component);
            fs::create_dir_all(&current)
                .map_err(|e| packaging_error(format!("unable to create {current:?}: {e}")))?;
            let init = current.join("__init__");
            if !init.exists() {
                fs::write(&init, "")
                    .map_err(|e| packaging_error(format!("unable to write {init:?}: {e}")))?;
                if let Ok(marker) = init.strip_prefix(&src) {
                    sources.push(marker.display().to_string());
                }
            }
        }

        let content = fs::read_to_string(env.absolute(dep)).map_err(|e| {
            packaging_error(format!("unable to read dependency {dep}: {e}"))
        })?;
        let content = env.te_factory.create_dependency(&content);
        fs::write(&target, content)
            .map_err(|e| packaging_error(format!("unable to write dependency {dep}: {e}")))?;
        sources.push(relative.to_string());
    }

    // Fixed core modules copied from the server root
    if let Some(server_root) = &env.config.server_root {
        for core_dep in core_dependencies {
            let from = server_root.join(core_dep);
            let to = src.join(core_dep);
            fs::copy(&from, &to).map_err(|e| {
                packaging_error(format!("unable to copy core dependency {core_dep}: {e}"))
            })?;
            sources.push(core_dep.clone());
        }
    }

    // Package metadata
    let info = PackageInfo {
        name: "testerman-te",
        version: "1.0.0",
        sources: &sources,
    };
    let metadata = serde_json::to_string_pretty(&info)
        .map_err(|e| packaging_error(format!("unable to write package metadata: {e}")))?;
    fs::write(src.join("package.json"), metadata)
        .map_err(|e| packaging_error(format!("unable to write package metadata: {e}")))?;
    sources.push("package.json".to_string());

    Ok(sources)
}

/// Pack `staging_dir/src` into `staging_dir/te.tar.gz`.
pub fn archive_staging_tree(staging_dir: &Path) -> Result<PathBuf, PrepareError> {
    let src = staging_dir.join("src");
    let archive_path = staging_dir.join(TE_ARCHIVE);
    let file = fs::File::create(&archive_path)
        .map_err(|e| packaging_error(format!("unable to create TE archive: {e}")))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder
        .append_dir_all(".", &src)
        .map_err(|e| packaging_error(format!("unable to create TE archive: {e}")))?;
    let encoder = builder
        .into_inner()
        .map_err(|e| packaging_error(format!("unable to create TE archive: {e}")))?;
    encoder
        .finish()
        .map_err(|e| packaging_error(format!("unable to create TE archive: {e}")))?;
    Ok(archive_path)
}

/// Recursive directory copy (rename may cross filesystems).
pub fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Move the staging tree to its final location in the archives.
pub fn move_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_tree(from, to)?;
            fs::remove_dir_all(from)
        }
    }
}

#[cfg(test)]
#[path = "prepare_tests.rs"]
mod tests;
