// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration and shared services.

use crate::te::{DependencyResolver, ImportResolver, ScriptTeFactory, TeFactory};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tm_core::{Clock, EventPublisher, JobIdGen, SystemClock, TracingPublisher};

/// Filesystem layout constants under the document root.
pub const REPOSITORY_DIR: &str = "repository";
pub const ARCHIVES_DIR: &str = "archives";

/// Engine settings, environment-driven in the daemon.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Document root: `repository/` sources, `archives/` run artefacts.
    pub document_root: PathBuf,
    /// State directory for the persisted job queue. None disables
    /// persistence.
    pub var_root: Option<PathBuf>,
    /// Server installation root holding the fixed TE core modules. None
    /// when the factory packages none.
    pub server_root: Option<PathBuf>,
    /// Scheduler wake-up interval.
    pub scheduler_interval: Duration,
    /// Interpreter used to run generated Test Executables.
    pub te_interpreter: PathBuf,
}

impl EngineConfig {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Self {
            document_root: document_root.into(),
            var_root: None,
            server_root: None,
            scheduler_interval: Duration::from_secs(1),
            te_interpreter: PathBuf::from("/bin/sh"),
        }
    }

    pub fn with_var_root(mut self, var_root: impl Into<PathBuf>) -> Self {
        self.var_root = Some(var_root.into());
        self
    }

    pub fn with_scheduler_interval(mut self, interval: Duration) -> Self {
        self.scheduler_interval = interval;
        self
    }

    /// Read settings from `TM_DOCROOT`, `TM_VAR_ROOT`,
    /// `TM_SCHEDULER_INTERVAL_MS` and `TM_TE_INTERPRETER`.
    pub fn from_env() -> Self {
        let document_root = std::env::var("TM_DOCROOT").unwrap_or_else(|_| "/tmp/testerman".into());
        let mut config = Self::new(document_root);
        if let Ok(var_root) = std::env::var("TM_VAR_ROOT") {
            config.var_root = Some(PathBuf::from(var_root));
        }
        if let Ok(server_root) = std::env::var("TM_SERVER_ROOT") {
            config.server_root = Some(PathBuf::from(server_root));
        }
        if let Some(interval_ms) = std::env::var("TM_SCHEDULER_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.scheduler_interval = Duration::from_millis(interval_ms);
        }
        if let Ok(interpreter) = std::env::var("TM_TE_INTERPRETER") {
            config.te_interpreter = PathBuf::from(interpreter);
        }
        config
    }
}

/// Shared services injected into every job.
pub struct EngineEnv {
    pub config: EngineConfig,
    pub clock: Arc<dyn Clock>,
    pub publisher: Arc<dyn EventPublisher>,
    pub te_factory: Arc<dyn TeFactory>,
    pub resolver: Arc<dyn DependencyResolver>,
    pub ids: JobIdGen,
}

impl EngineEnv {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let interpreter = config.te_interpreter.clone();
        Arc::new(Self {
            config,
            clock: Arc::new(SystemClock),
            publisher: Arc::new(TracingPublisher),
            te_factory: Arc::new(ScriptTeFactory::new(interpreter)),
            resolver: Arc::new(ImportResolver),
            ids: JobIdGen::new(),
        })
    }

    /// Replace the event publisher (server wiring, tests).
    pub fn with_publisher(config: EngineConfig, publisher: Arc<dyn EventPublisher>) -> Arc<Self> {
        let interpreter = config.te_interpreter.clone();
        Arc::new(Self {
            config,
            clock: Arc::new(SystemClock),
            publisher,
            te_factory: Arc::new(ScriptTeFactory::new(interpreter)),
            resolver: Arc::new(ImportResolver),
            ids: JobIdGen::new(),
        })
    }

    /// Absolute path for a docroot-relative path.
    pub fn absolute(&self, docroot_path: &str) -> PathBuf {
        self.config
            .document_root
            .join(docroot_path.trim_start_matches('/'))
    }
}
