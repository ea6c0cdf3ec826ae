// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-component execution context.
//!
//! Owned by the component's worker task and passed explicitly to every
//! component-scoped operation: matched values and senders, activated
//! default altsteps, created timers. Nothing here is shared across
//! threads.

use crate::alt::Alternative;
use crate::component::TestComponent;
use crate::error::{TcError, TcResult};
use crate::runtime::Runtime;
use crate::testcase::TestCaseCore;
use crate::timer::Timer;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tm_core::Verdict;

/// The local context of a running test component.
pub struct TcContext {
    tc: TestComponent,
    values: HashMap<String, Value>,
    senders: HashMap<String, String>,
    altsteps: Vec<(String, Vec<Alternative>)>,
    timers: Vec<Timer>,
    altstep_seq: u64,
}

impl TcContext {
    pub fn new(tc: TestComponent) -> Self {
        Self {
            tc,
            values: HashMap::new(),
            senders: HashMap::new(),
            altsteps: Vec::new(),
            timers: Vec::new(),
            altstep_seq: 0,
        }
    }

    pub fn tc(&self) -> &TestComponent {
        &self.tc
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        self.tc.runtime()
    }

    pub(crate) fn testcase(&self) -> Arc<TestCaseCore> {
        self.tc.testcase()
    }

    /// Create a PTC attached to the current testcase.
    pub fn create(&self, name: Option<&str>, alive: bool) -> TestComponent {
        self.testcase().create(&self.runtime(), name, alive)
    }

    /// Get (or create) a TSI port on the system component.
    pub fn system_port(&self, name: &str) -> crate::port::TsiPort {
        self.testcase().system().tsi_port(name)
    }

    // Matched values and senders

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn sender(&self, name: &str) -> Option<&str> {
        self.senders.get(name).map(String::as_str)
    }

    pub fn set_sender(&mut self, name: impl Into<String>, sender: impl Into<String>) {
        self.senders.insert(name.into(), sender.into());
    }

    // Default altsteps

    /// Activate an altstep: its alternatives are appended to every alt of
    /// this component until deactivated. Returns a deactivation handle.
    pub fn activate(&mut self, altstep: Vec<Alternative>) -> String {
        self.altstep_seq += 1;
        let reference = format!("default_altstep_{}", self.altstep_seq);
        tracing::debug!(altstep = %reference, "activated default altstep");
        self.altsteps.push((reference.clone(), altstep));
        reference
    }

    /// Deactivate a previously activated altstep.
    pub fn deactivate(&mut self, reference: &str) -> bool {
        let before = self.altsteps.len();
        self.altsteps.retain(|(r, _)| r != reference);
        self.altsteps.len() != before
    }

    pub(crate) fn default_alternatives(&self) -> Vec<Alternative> {
        self.altsteps
            .iter()
            .flat_map(|(_, alts)| alts.iter().cloned())
            .collect()
    }

    // Timers

    pub(crate) fn register_timer(&mut self, timer: &Timer) {
        self.timers.push(timer.clone());
    }

    /// Convenience: sleep through a one-shot timer.
    pub fn wait(&mut self, duration: Duration) -> TcResult<()> {
        let timer = Timer::new(self, Some(duration), Some("wait"));
        timer.start(None)?;
        timer.timeout(self)
    }

    // Verdict and control

    /// Set the local verdict (the testcase verdict when running on the
    /// MTC). Stops the testcase when a fail verdict arrives and
    /// stop-on-failure is set.
    pub fn setverdict(&mut self, verdict: Verdict) -> TcResult<()> {
        self.tc.set_verdict(verdict);
        if self.tc.is_mtc()
            && verdict == Verdict::Fail
            && self.testcase().stops_on_failure()
        {
            tracing::debug!("stopping testcase on failure (autostop is set)");
            return Err(TcError::stopped());
        }
        Ok(())
    }

    pub fn getverdict(&self) -> Verdict {
        self.tc.verdict()
    }

    /// The TTCN-3 `stop` statement.
    pub fn stop<T>(&self) -> TcResult<T> {
        Err(TcError::stopped())
    }

    /// Log a user message at component level.
    pub fn log(&self, message: impl AsRef<str>) {
        tracing::info!(tc = %self.tc.name(), "{}", message.as_ref());
    }
}

/// A shared mutable cell for alt-driven state machines.
///
/// Alt actions are `Fn` closures; state they need to mutate lives in one
/// of these. Doubles as a general-purpose variable.
#[derive(Clone, Default)]
pub struct StateManager<T: Clone> {
    state: Rc<RefCell<T>>,
}

impl<T: Clone> StateManager<T> {
    pub fn new(initial: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(initial)),
        }
    }

    pub fn get(&self) -> T {
        self.state.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.state.borrow_mut() = value;
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
