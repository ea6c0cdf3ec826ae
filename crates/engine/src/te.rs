// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test Executable factory, dependency resolution and session files.
//!
//! The factory turns an ATS source into a self-contained runnable
//! artefact and later into a command line; the resolver walks `import`
//! statements recursively over the repository. Both are seams: the
//! engine never assumes a particular ATS language.

use crate::error::{PrepareError, ResolveError};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tm_core::{retcode, ParameterSpec, SessionParameters, SessionSignature};

/// Metadata extracted from an ATS or campaign source.
#[derive(Debug, Clone, Default)]
pub struct TeMetadata {
    /// Requested language API, if any.
    pub api: Option<String>,
    /// Declared session parameters with defaults.
    pub signature: SessionSignature,
    pub description: Option<String>,
}

/// Inputs for building a TE command line.
#[derive(Debug, Clone)]
pub struct TeCommandSpec {
    pub job_id: u64,
    pub te_filename: PathBuf,
    pub log_filename: PathBuf,
    pub input_session_filename: PathBuf,
    pub output_session_filename: PathBuf,
    pub selected_groups: Vec<String>,
}

/// A ready-to-spawn TE invocation.
#[derive(Debug, Clone)]
pub struct TeCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl TeCommand {
    /// Human-readable command line for job details and logs.
    pub fn display_line(&self) -> String {
        let env = self
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        let args = self.args.join(" ");
        format!("{env} {} {args}", self.executable.display())
    }
}

/// Builds Test Executables from job sources.
pub trait TeFactory: Send + Sync {
    /// Extract metadata (signature, api) from a source.
    fn metadata(&self, source: &str) -> Result<TeMetadata, PrepareError>;

    /// Generate the runnable TE body from the ATS source.
    fn create_executable(
        &self,
        name: &str,
        source: &str,
        ats_dir_in_package: &str,
    ) -> Result<String, PrepareError>;

    /// Verify the generated TE before packaging.
    fn check_syntax(&self, te: &str) -> Result<(), PrepareError>;

    /// Rewrite a dependency's content for inclusion in the package.
    fn create_dependency(&self, content: &str) -> String {
        content.to_string()
    }

    /// Fixed modules to copy from the server root into the package.
    fn core_dependencies(&self, api: Option<&str>) -> Vec<String> {
        let _ = api;
        Vec::new()
    }

    /// Build the TE command line (executable, args, environment).
    fn command_line(&self, spec: &TeCommandSpec) -> TeCommand;
}

/// Resolves the transitive dependencies of a source.
pub trait DependencyResolver: Send + Sync {
    /// Returns docroot paths of every dependency, recursively.
    fn resolve(
        &self,
        source: &str,
        source_path: &str,
        root: &Path,
    ) -> Result<Vec<String>, ResolveError>;
}

#[allow(clippy::unwrap_used)] // the patterns are compile-time constants
fn metadata_res() -> (&'static Regex, &'static Regex) {
    static PARAM: OnceLock<Regex> = OnceLock::new();
    static API: OnceLock<Regex> = OnceLock::new();
    (
        PARAM.get_or_init(|| Regex::new(r"^#\s*@param\s+([A-Za-z_0-9]+)\s*=\s*(.*)$").unwrap()),
        API.get_or_init(|| Regex::new(r"^#\s*@api\s+(\S+)\s*$").unwrap()),
    )
}

/// The default factory: the TE is the ATS source run by a configured
/// interpreter, with the job plumbing passed through the environment.
///
/// Metadata rides in the source's leading comment block:
/// `# @param PX_NAME=default` declares a session parameter,
/// `# @api <name>` selects a language API.
pub struct ScriptTeFactory {
    interpreter: PathBuf,
}

impl ScriptTeFactory {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl TeFactory for ScriptTeFactory {
    fn metadata(&self, source: &str) -> Result<TeMetadata, PrepareError> {
        let (param_re, api_re) = metadata_res();
        let mut metadata = TeMetadata::default();
        for line in source.lines() {
            if let Some(caps) = param_re.captures(line) {
                metadata.signature.insert(
                    caps[1].to_string(),
                    ParameterSpec {
                        default_value: caps[2].trim().to_string(),
                        param_type: "string".to_string(),
                    },
                );
            } else if let Some(caps) = api_re.captures(line) {
                metadata.api = Some(caps[1].to_string());
            }
        }
        Ok(metadata)
    }

    fn create_executable(
        &self,
        name: &str,
        source: &str,
        ats_dir_in_package: &str,
    ) -> Result<String, PrepareError> {
        let _ = (name, ats_dir_in_package);
        Ok(source.to_string())
    }

    fn check_syntax(&self, te: &str) -> Result<(), PrepareError> {
        if te.trim().is_empty() {
            return Err(PrepareError::new(
                retcode::SYNTAX_ERROR,
                "empty test executable",
            ));
        }
        Ok(())
    }

    fn command_line(&self, spec: &TeCommandSpec) -> TeCommand {
        TeCommand {
            executable: self.interpreter.clone(),
            args: vec![spec.te_filename.display().to_string()],
            env: vec![
                ("TM_JOB_ID".to_string(), spec.job_id.to_string()),
                (
                    "TM_LOG_FILENAME".to_string(),
                    spec.log_filename.display().to_string(),
                ),
                (
                    "TM_INPUT_SESSION".to_string(),
                    spec.input_session_filename.display().to_string(),
                ),
                (
                    "TM_OUTPUT_SESSION".to_string(),
                    spec.output_session_filename.display().to_string(),
                ),
                (
                    "TM_SELECTED_GROUPS".to_string(),
                    spec.selected_groups.join(","),
                ),
            ],
        }
    }
}

#[allow(clippy::unwrap_used)] // the pattern is a compile-time constant
fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*import\s+([A-Za-z_0-9./-]+)\s*$").unwrap())
}

/// Default resolver: `import <module>` statements name repository files.
///
/// A module resolves to `<module>.ats` next to the importing file, or
/// under the module root when prefixed with `/`. Resolution is
/// recursive; revisiting a file already on the resolution stack is a
/// cycle.
pub struct ImportResolver;

impl ImportResolver {
    fn resolve_inner(
        &self,
        source: &str,
        source_path: &str,
        root: &Path,
        resolved: &mut Vec<String>,
        stack: &mut HashSet<String>,
    ) -> Result<(), ResolveError> {
        for line in source.lines() {
            let Some(caps) = import_re().captures(line) else {
                continue;
            };
            let module = &caps[1];
            let dep_path = if let Some(absolute) = module.strip_prefix('/') {
                format!("/{absolute}.ats")
            } else {
                let dir = source_path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
                format!("{dir}/{module}.ats")
            };

            if stack.contains(&dep_path) {
                return Err(ResolveError::CyclicDependency(dep_path));
            }
            if resolved.contains(&dep_path) {
                continue;
            }

            let absolute = root.join(dep_path.trim_start_matches('/'));
            let content = std::fs::read_to_string(&absolute).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ResolveError::Missing(dep_path.clone())
                } else {
                    ResolveError::Io {
                        path: dep_path.clone(),
                        source: e,
                    }
                }
            })?;

            resolved.push(dep_path.clone());
            stack.insert(dep_path.clone());
            self.resolve_inner(&content, &dep_path, root, resolved, stack)?;
            stack.remove(&dep_path);
        }
        Ok(())
    }
}

impl DependencyResolver for ImportResolver {
    fn resolve(
        &self,
        source: &str,
        source_path: &str,
        root: &Path,
    ) -> Result<Vec<String>, ResolveError> {
        let mut resolved = Vec::new();
        let mut stack = HashSet::from([source_path.to_string()]);
        self.resolve_inner(source, source_path, root, &mut resolved, &mut stack)?;
        Ok(resolved)
    }
}

/// Serialize a session to its on-disk form (JSON object of strings).
pub fn dump_session(session: &SessionParameters) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(session)
}

/// Parse a session file.
pub fn load_session(content: &str) -> Result<SessionParameters, serde_json::Error> {
    serde_json::from_str(content)
}

#[cfg(test)]
#[path = "te_tests.rs"]
mod tests;
