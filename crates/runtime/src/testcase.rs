// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Testcase orchestration.
//!
//! `TestCase::execute` creates the MTC and the system component, installs
//! a test adapter configuration when none is active, runs the body on the
//! caller's thread, and finalizes no matter how the body ended: every PTC
//! is stopped and joined, timers cancelled, TSI ports unmapped and the
//! adapter reset.

use crate::component::TestComponent;
use crate::context::TcContext;
use crate::error::{TcError, TcResult};
use crate::event::SystemEvent;
use crate::port::TsiPort;
use crate::runtime::{Runtime, TestCaseResult, DEFAULT_TEST_ADAPTER_CONFIGURATION};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tm_core::Verdict;

/// What a testcase is used for. Preambles and postambles log differently
/// on the reporting side but execute identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestCaseRole {
    #[default]
    Testcase,
    Preamble,
    Postamble,
}

impl std::fmt::Display for TestCaseRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestCaseRole::Testcase => write!(f, "testcase"),
            TestCaseRole::Preamble => write!(f, "preamble"),
            TestCaseRole::Postamble => write!(f, "postamble"),
        }
    }
}

/// The system component: the collection of TSI ports, created lazily on
/// first access.
#[derive(Default)]
pub struct SystemComponent {
    tsi_ports: Mutex<IndexMap<String, TsiPort>>,
}

impl SystemComponent {
    /// Get (or create) a TSI port by name.
    pub fn tsi_port(&self, name: &str) -> TsiPort {
        let mut ports = self.tsi_ports.lock();
        if let Some(port) = ports.get(name) {
            return port.clone();
        }
        let port = TsiPort::new(name);
        ports.insert(name.to_string(), port.clone());
        port
    }

    /// Unmap every mapped TSI port.
    fn finalize(&self) -> TcResult<()> {
        let ports: Vec<TsiPort> = self.tsi_ports.lock().values().cloned().collect();
        for port in ports {
            port.finalize()?;
        }
        Ok(())
    }
}

/// Shared per-testcase state: the component tree.
pub struct TestCaseCore {
    name: String,
    ptcs: Mutex<Vec<TestComponent>>,
    mtc: OnceLock<TestComponent>,
    system: SystemComponent,
    stop_on_failure: AtomicBool,
}

impl TestCaseCore {
    fn new(name: String, stop_on_failure: bool) -> Self {
        Self {
            name,
            ptcs: Mutex::new(Vec::new()),
            mtc: OnceLock::new(),
            system: SystemComponent::default(),
            stop_on_failure: AtomicBool::new(stop_on_failure),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn mtc(&self) -> Option<TestComponent> {
        self.mtc.get().cloned()
    }

    pub(crate) fn ptcs(&self) -> Vec<TestComponent> {
        self.ptcs.lock().clone()
    }

    pub(crate) fn any_ptc_alive(&self) -> bool {
        self.ptcs.lock().iter().any(TestComponent::alive)
    }

    pub fn system(&self) -> &SystemComponent {
        &self.system
    }

    pub(crate) fn stops_on_failure(&self) -> bool {
        self.stop_on_failure.load(Ordering::SeqCst)
    }

    /// Create a PTC bound to this testcase.
    pub(crate) fn create(
        self: &Arc<Self>,
        runtime: &Arc<Runtime>,
        name: Option<&str>,
        alive: bool,
    ) -> TestComponent {
        let tc = TestComponent::new(self, runtime, name, alive, false);
        self.ptcs.lock().push(tc.clone());
        // a stale all-killed no longer describes the component set
        runtime.remove_event(&SystemEvent::AllKilled);
        tc
    }
}

/// A TTCN-3 testcase.
#[derive(Debug, Clone, Default)]
pub struct TestCase {
    name: String,
    title: Option<String>,
    description: Option<String>,
    id_suffix: Option<String>,
    role: TestCaseRole,
    stop_on_failure: bool,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Distinguish repeated executions of the same testcase.
    pub fn with_id_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.id_suffix = Some(suffix.into());
        self
    }

    pub fn with_role(mut self, role: TestCaseRole) -> Self {
        self.role = role;
        self
    }

    /// Stop the testcase as soon as its verdict reaches fail.
    pub fn stop_testcase_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    /// The testcase identifier.
    pub fn id(&self) -> String {
        match &self.id_suffix {
            Some(suffix) => format!("{}_{}", self.name, suffix),
            None => self.name.clone(),
        }
    }

    /// Execute the testcase body and return the MTC verdict.
    ///
    /// Surfaces `Cancelled` when the ATS was cancelled during the run,
    /// and `Stopped` when ATS-level stop-on-failure tripped.
    pub fn execute<F>(&self, runtime: &Arc<Runtime>, body: F) -> TcResult<Verdict>
    where
        F: FnOnce(&mut TcContext) -> TcResult<()>,
    {
        let core = Arc::new(TestCaseCore::new(self.id(), self.stop_on_failure));
        let mtc = TestComponent::new(&core, runtime, Some("mtc"), false, true);
        let _ = core.mtc.set(mtc.clone());

        // No stale system event may leak into this testcase.
        runtime.system_queue().reset();

        tracing::info!(
            testcase = %self.id(),
            role = %self.role,
            title = self.title.as_deref().unwrap_or(""),
            "testcase started"
        );

        if runtime.current_configuration().is_none() {
            tracing::debug!("using default test adapter configuration");
            runtime.use_configuration(DEFAULT_TEST_ADAPTER_CONFIGURATION)?;
        }
        let tsi_ports = runtime
            .current_configuration()
            .map(|c| c.tsi_port_names())
            .unwrap_or_default();
        runtime
            .adapter()
            .tri_execute_testcase(&self.id(), &tsi_ports)?;

        let mut ctx = TcContext::new(mtc.clone());
        match body(&mut ctx) {
            Ok(()) => {}
            Err(TcError::Stopped { .. }) => {
                tracing::debug!(testcase = %self.id(), "testcase explicitly stopped");
            }
            Err(e) => {
                mtc.set_verdict(Verdict::Error);
                tracing::warn!(testcase = %self.id(), error = %e, "testcase stopped on error");
            }
        }

        if let Err(e) = self.finalize(&core, &mut ctx) {
            tracing::debug!(testcase = %self.id(), error = %e, "error while finalizing testcase");
        }

        if let Err(e) = runtime.adapter().tri_sa_reset() {
            tracing::debug!(error = %e, "tri_sa_reset failed");
        }
        runtime.system_queue().reset();

        let verdict = mtc.verdict();
        runtime.record_result(TestCaseResult {
            testcase_id: self.id(),
            verdict,
        });
        tracing::info!(
            testcase = %self.id(),
            verdict = %verdict,
            description = self.description.as_deref().unwrap_or(""),
            "testcase stopped"
        );

        if runtime.is_cancelled() {
            return Err(TcError::Cancelled);
        }
        if runtime.stops_on_testcase_failure() && verdict != Verdict::Pass {
            tracing::info!("stopping ats on testcase failure (autostop is set)");
            return Err(TcError::stopped());
        }
        Ok(verdict)
    }

    fn finalize(&self, core: &Arc<TestCaseCore>, ctx: &mut TcContext) -> TcResult<()> {
        // Two passes (stop everyone, then wait) settle faster than
        // stop+done one PTC at a time.
        for ptc in core.ptcs() {
            let _ = ptc.stop();
        }
        for ptc in core.ptcs() {
            ptc.done(ctx)?;
            ptc.join();
        }

        ctx.tc().finalize_ports();
        ctx.runtime().timers().cancel_all();
        core.system().finalize()
    }
}

#[cfg(test)]
#[path = "testcase_tests.rs"]
mod tests;
