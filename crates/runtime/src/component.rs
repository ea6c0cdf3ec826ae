// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test components (MTC and PTCs).
//!
//! Each started PTC runs its behaviour on a dedicated worker thread.
//! Termination flows through the system queue: `stop`/`kill` post trigger
//! events consumed by the target's alt prefix, and completion posts
//! done/killed state events (plus the all-done/all-killed aggregates when
//! the last sibling goes down).

use crate::alt::{alt, AltCondition, Alternative};
use crate::context::TcContext;
use crate::error::{TcError, TcResult};
use crate::event::{SystemEvent, SystemEventTemplate};
use crate::notify::Notifier;
use crate::port::Port;
use crate::runtime::Runtime;
use crate::testcase::TestCaseCore;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use tm_core::Verdict;

/// Component execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcState {
    Inactive,
    Running,
    Paused,
    Stopped,
    Killed,
}

pub(crate) struct TcShared {
    id: u64,
    name: String,
    alive: bool,
    mtc: bool,
    runtime: Arc<Runtime>,
    testcase: Arc<TestCaseCore>,
    state: Mutex<TcState>,
    verdict: Mutex<Verdict>,
    ports: Mutex<IndexMap<String, Port>>,
    notifier: Notifier,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

/// A test component handle. Clones alias the same component.
#[derive(Clone)]
pub struct TestComponent {
    shared: Arc<TcShared>,
}

impl std::fmt::Display for TestComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.shared.name)
    }
}

impl TestComponent {
    pub(crate) fn new(
        testcase: &Arc<TestCaseCore>,
        runtime: &Arc<Runtime>,
        name: Option<&str>,
        alive: bool,
        mtc: bool,
    ) -> TestComponent {
        let id = runtime.next_id();
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("tc_{id}"));
        tracing::debug!(tc = %name, alive, mtc, "test component created");
        TestComponent {
            shared: Arc::new(TcShared {
                id,
                name,
                alive,
                mtc,
                runtime: Arc::clone(runtime),
                testcase: Arc::clone(testcase),
                state: Mutex::new(TcState::Inactive),
                verdict: Mutex::new(Verdict::None),
                ports: Mutex::new(IndexMap::new()),
                notifier: Notifier::new(),
                join: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub(crate) fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn is_mtc(&self) -> bool {
        self.shared.mtc
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.shared.notifier
    }

    pub(crate) fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&self.shared.runtime)
    }

    pub(crate) fn testcase(&self) -> Arc<TestCaseCore> {
        Arc::clone(&self.shared.testcase)
    }

    pub fn same_as(&self, other: &TestComponent) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Get (or lazily create and start) a port by name.
    pub fn port(&self, name: &str) -> Port {
        let mut ports = self.shared.ports.lock();
        if let Some(port) = ports.get(name) {
            return port.clone();
        }
        let port = Port::new(self, name);
        port.start();
        ports.insert(name.to_string(), port.clone());
        port
    }

    pub fn state(&self) -> TcState {
        *self.shared.state.lock()
    }

    fn set_state(&self, state: TcState) {
        *self.shared.state.lock() = state;
        tracing::trace!(tc = %self.shared.name, state = ?state, "component state changed");
    }

    /// TTCN-3 alive(): whether the component can still run a behaviour.
    pub fn alive(&self) -> bool {
        if self.shared.mtc {
            return true;
        }
        if self.shared.alive {
            self.state() != TcState::Killed
        } else {
            matches!(self.state(), TcState::Inactive | TcState::Running)
        }
    }

    /// TTCN-3 running(): whether a behaviour is executing.
    pub fn running(&self) -> bool {
        if self.shared.mtc {
            return true;
        }
        self.state() == TcState::Running
    }

    pub fn verdict(&self) -> Verdict {
        *self.shared.verdict.lock()
    }

    /// Apply the verdict lattice. Returns true when the verdict moved.
    pub(crate) fn set_verdict(&self, verdict: Verdict) -> bool {
        let mut current = self.shared.verdict.lock();
        let updated = current.overwrites(verdict);
        if updated {
            *current = verdict;
        }
        let now = *current;
        drop(current);
        tracing::info!(tc = %self.shared.name, verdict = %now, "setverdict");
        updated
    }

    /// Start a behaviour on this component.
    ///
    /// Only valid on a non-MTC component that is alive and not already
    /// running. Stale done events for this component (and the all-done
    /// aggregate) are removed first: the previous "done" state is no
    /// longer observable after a restart.
    pub fn start<F>(&self, behaviour: F) -> TcResult<()>
    where
        F: FnOnce(&mut TcContext) -> TcResult<()> + Send + 'static,
    {
        if self.shared.mtc {
            // start() has no meaning on the MTC
            return Ok(());
        }
        if !self.alive() {
            return Err(TcError::Rule(
                "cannot start a behaviour on a PTC which is not alive anymore".to_string(),
            ));
        }
        if self.state() == TcState::Running {
            return Err(TcError::Rule(
                "cannot start a behaviour on a running PTC".to_string(),
            ));
        }

        self.shared.runtime.remove_event(&self.done_event());
        self.shared.runtime.remove_event(&SystemEvent::AllDone);

        tracing::debug!(tc = %self.shared.name, "starting component");
        self.set_state(TcState::Running);

        let tc = self.clone();
        let handle = thread::Builder::new()
            .name(format!("tc-{}", self.shared.name))
            .spawn(move || {
                let mut ctx = TcContext::new(tc.clone());
                let result = behaviour(&mut ctx);
                tc.on_behaviour_exit(result);
            })
            .map_err(|e| TcError::Internal(format!("unable to spawn component thread: {e}")))?;
        *self.shared.join.lock() = Some(handle);
        Ok(())
    }

    fn on_behaviour_exit(&self, result: TcResult<()>) {
        match result {
            Ok(()) => self.do_stop(true),
            Err(TcError::Stopped { .. }) => self.do_stop(true),
            Err(TcError::Killed) => {
                // violent death: the testcase verdict is not updated
                self.do_stop(false);
                self.do_kill();
            }
            Err(e) => {
                self.set_verdict(Verdict::Error);
                tracing::warn!(tc = %self.shared.name, error = %e, "PTC stopped on error");
                self.do_stop(true);
                self.do_kill();
            }
        }
    }

    /// Stop the component.
    ///
    /// On the MTC this stops the testcase (surfaced as control flow). On
    /// a running PTC it posts the stop trigger, consumed by the PTC's alt
    /// prefix.
    pub fn stop(&self) -> TcResult<()> {
        if self.shared.mtc {
            return Err(TcError::stopped());
        }
        if self.state() == TcState::Running {
            tracing::debug!(tc = %self.shared.name, "stopping component");
            self.shared.runtime.post_event(SystemEvent::StopTc {
                tc_id: self.shared.id,
            });
        }
        Ok(())
    }

    /// Kill the component. Killing the MTC stops the testcase.
    pub fn kill(&self) -> TcResult<()> {
        if self.shared.mtc {
            return Err(TcError::stopped());
        }
        if self.state() == TcState::Running {
            self.shared.runtime.post_event(SystemEvent::KillTc {
                tc_id: self.shared.id,
            });
        }
        Ok(())
    }

    fn done_event(&self) -> SystemEvent {
        SystemEvent::Done {
            tc_id: self.shared.id,
            tc_name: self.shared.name.clone(),
        }
    }

    fn killed_event(&self) -> SystemEvent {
        SystemEvent::Killed {
            tc_id: self.shared.id,
            tc_name: self.shared.name.clone(),
        }
    }

    /// Branch condition matching this component's done event.
    pub fn done_branch(&self) -> AltCondition {
        AltCondition::System(SystemEventTemplate::Done {
            tc_id: self.shared.id,
        })
    }

    /// Branch condition matching this component's killed event.
    pub fn killed_branch(&self) -> AltCondition {
        AltCondition::System(SystemEventTemplate::Killed {
            tc_id: self.shared.id,
        })
    }

    /// Block until the component is done. Returns immediately when it is
    /// not running.
    pub fn done(&self, ctx: &mut TcContext) -> TcResult<()> {
        if self.state() != TcState::Running {
            return Ok(());
        }
        alt(ctx, &[Alternative::when(self.done_branch())])
    }

    /// Block until the component is killed. Returns immediately when it
    /// already is.
    pub fn killed(&self, ctx: &mut TcContext) -> TcResult<()> {
        if self.state() == TcState::Killed {
            return Ok(());
        }
        alt(ctx, &[Alternative::when(self.killed_branch())])
    }

    /// Post-behaviour transition.
    ///
    /// A stopped non-alive component is a killed component: it emits done
    /// then killed and frees its ports. An alive component merely stops
    /// and can be restarted.
    fn do_stop(&self, forward_verdict: bool) {
        let verdict = self.verdict();
        tracing::debug!(tc = %self.shared.name, verdict = %verdict, "component stopped");
        if forward_verdict {
            if let Some(mtc) = self.shared.testcase.mtc() {
                mtc.set_verdict(verdict);
            }
        }

        if !self.shared.alive {
            if self.state() != TcState::Killed {
                self.set_state(TcState::Killed);
                self.finalize_ports();
                self.emit_done();
                self.emit_killed();
            }
        } else if self.state() != TcState::Stopped {
            self.set_state(TcState::Stopped);
            self.emit_done();
        }
    }

    fn do_kill(&self) {
        if self.state() != TcState::Killed {
            self.set_state(TcState::Killed);
            self.finalize_ports();
            self.emit_killed();
        }
    }

    fn emit_done(&self) {
        self.shared.runtime.post_event(self.done_event());
        if !self.shared.testcase.any_ptc_alive() {
            self.shared.runtime.post_event(SystemEvent::AllDone);
        }
    }

    fn emit_killed(&self) {
        self.shared.runtime.post_event(self.killed_event());
        if !self.shared.testcase.any_ptc_alive() {
            self.shared.runtime.post_event(SystemEvent::AllKilled);
        }
    }

    /// Alt prefix: every alt run by this component first matches its own
    /// stop/kill triggers so the component stays interruptible.
    pub(crate) fn prefix_alternatives(&self) -> Vec<Alternative> {
        let stop = Alternative::when(AltCondition::System(SystemEventTemplate::StopTc {
            tc_id: self.shared.id,
        }))
        .then(|_ctx| Err(TcError::stopped()));
        let kill = Alternative::when(AltCondition::System(SystemEventTemplate::KillTc {
            tc_id: self.shared.id,
        }))
        .then(|_ctx| Err(TcError::Killed));
        vec![stop, kill]
    }

    pub(crate) fn finalize_ports(&self) {
        for (_, port) in self.shared.ports.lock().iter() {
            port.stop();
            port.finalize();
        }
    }

    /// Join the behaviour thread, if any.
    pub(crate) fn join(&self) {
        if let Some(handle) = self.shared.join.lock().take() {
            let _ = handle.join();
        }
    }
}

// "all component" / "any component" operations, callable from the MTC.

pub fn all_done_branch() -> AltCondition {
    AltCondition::System(SystemEventTemplate::AllDone)
}

pub fn all_killed_branch() -> AltCondition {
    AltCondition::System(SystemEventTemplate::AllKilled)
}

pub fn any_done_branch() -> AltCondition {
    AltCondition::System(SystemEventTemplate::AnyDone)
}

pub fn any_killed_branch() -> AltCondition {
    AltCondition::System(SystemEventTemplate::AnyKilled)
}

/// Stop every PTC of the current testcase.
pub fn all_components_stop(ctx: &TcContext) -> TcResult<()> {
    for ptc in ctx.tc().testcase().ptcs() {
        ptc.stop()?;
    }
    Ok(())
}

/// Kill every PTC of the current testcase.
pub fn all_components_kill(ctx: &TcContext) -> TcResult<()> {
    for ptc in ctx.tc().testcase().ptcs() {
        ptc.kill()?;
    }
    Ok(())
}

/// Block until every PTC is done.
pub fn all_components_done(ctx: &mut TcContext) -> TcResult<()> {
    alt(ctx, &[Alternative::when(all_done_branch())])
}

/// Block until any PTC is done.
pub fn any_component_done(ctx: &mut TcContext) -> TcResult<()> {
    alt(ctx, &[Alternative::when(any_done_branch())])
}

/// Block until every PTC is killed.
pub fn all_components_killed(ctx: &mut TcContext) -> TcResult<()> {
    alt(ctx, &[Alternative::when(all_killed_branch())])
}

/// Block until any PTC is killed.
pub fn any_component_killed(ctx: &mut TcContext) -> TcResult<()> {
    alt(ctx, &[Alternative::when(any_killed_branch())])
}

/// True when every PTC is running. False when there is no PTC.
pub fn all_components_running(ctx: &TcContext) -> bool {
    let ptcs = ctx.tc().testcase().ptcs();
    !ptcs.is_empty() && ptcs.iter().all(TestComponent::running)
}

/// True when at least one PTC is running.
pub fn any_component_running(ctx: &TcContext) -> bool {
    ctx.tc().testcase().ptcs().iter().any(TestComponent::running)
}

/// True when every PTC is alive. False when there is no PTC.
pub fn all_components_alive(ctx: &TcContext) -> bool {
    let ptcs = ctx.tc().testcase().ptcs();
    !ptcs.is_empty() && ptcs.iter().all(TestComponent::alive)
}

/// True when at least one PTC is alive.
pub fn any_component_alive(ctx: &TcContext) -> bool {
    ctx.tc().testcase().ptcs().iter().any(TestComponent::alive)
}
