// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared runtime state of one Test Executable.
//!
//! One [`Runtime`] lives for the duration of an ATS run. It owns the
//! system queue, the timer service, the TSI mapping table, the installed
//! test adapter, the variable store and the per-testcase result list.
//! Everything else (components, ports, contexts) is testcase-scoped.

use crate::adapter::{NoopAdapter, TestAdapter, TestAdapterConfiguration};
use crate::codec::CodecRegistry;
use crate::error::{TcError, TcResult};
use crate::event::SystemEvent;
use crate::notify::IdSource;
use crate::port::TsiTable;
use crate::queue::SystemQueue;
use crate::timer::TimerService;
use crate::value::Value;
use crate::variables::VariableStore;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tm_core::Verdict;

/// Name of the implicit test adapter configuration used when the ATS does
/// not install one.
pub const DEFAULT_TEST_ADAPTER_CONFIGURATION: &str = "__default__";

/// Execution record of one testcase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseResult {
    pub testcase_id: String,
    pub verdict: Verdict,
}

/// ATS-wide runtime state.
pub struct Runtime {
    ids: IdSource,
    queue: Arc<SystemQueue>,
    timers: TimerService,
    tsi: TsiTable,
    codecs: CodecRegistry,
    variables: VariableStore,
    adapter: RwLock<Arc<dyn TestAdapter>>,
    configurations: Mutex<HashMap<String, TestAdapterConfiguration>>,
    current_configuration: Mutex<Option<String>>,
    results: Mutex<Vec<TestCaseResult>>,
    cancelled: AtomicBool,
    stop_on_failure: AtomicBool,
}

impl Runtime {
    pub fn new() -> Arc<Self> {
        let queue = Arc::new(SystemQueue::new());
        let runtime = Arc::new(Self {
            ids: IdSource::default(),
            timers: TimerService::start(),
            queue,
            tsi: TsiTable::default(),
            codecs: CodecRegistry::new(),
            variables: VariableStore::new(),
            adapter: RwLock::new(Arc::new(NoopAdapter)),
            configurations: Mutex::new(HashMap::new()),
            current_configuration: Mutex::new(None),
            results: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            stop_on_failure: AtomicBool::new(false),
        });
        runtime.register_configuration(TestAdapterConfiguration::new(
            DEFAULT_TEST_ADAPTER_CONFIGURATION,
        ));
        runtime
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.ids.next()
    }

    pub fn system_queue(&self) -> &Arc<SystemQueue> {
        &self.queue
    }

    pub fn post_event(&self, event: SystemEvent) {
        self.queue.post(event);
    }

    pub fn remove_event(&self, event: &SystemEvent) {
        self.queue.remove(event);
    }

    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    pub(crate) fn tsi(&self) -> &TsiTable {
        &self.tsi
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    // Test adapter management

    pub fn set_adapter(&self, adapter: Arc<dyn TestAdapter>) {
        *self.adapter.write() = adapter;
    }

    pub fn adapter(&self) -> Arc<dyn TestAdapter> {
        Arc::clone(&self.adapter.read())
    }

    pub fn register_configuration(&self, config: TestAdapterConfiguration) {
        self.configurations
            .lock()
            .insert(config.name.clone(), config);
    }

    /// Activate a test adapter configuration, replacing any previous one.
    pub fn use_configuration(&self, name: &str) -> TcResult<()> {
        let configurations = self.configurations.lock();
        if !configurations.contains_key(name) {
            return Err(TcError::Rule(format!(
                "unknown test adapter configuration {name}"
            )));
        }
        *self.current_configuration.lock() = Some(name.to_string());
        tracing::debug!(configuration = name, "test adapter configuration installed");
        Ok(())
    }

    pub fn current_configuration(&self) -> Option<TestAdapterConfiguration> {
        let current = self.current_configuration.lock();
        let name = current.as_ref()?;
        self.configurations.lock().get(name).cloned()
    }

    /// Route a TRI-received message to the ports mapped on a TSI port.
    ///
    /// Late messages for unmapped TSI ports are discarded.
    pub fn tri_enqueue_msg(&self, tsi_port_id: &str, sut_address: Option<&str>, message: Value) {
        match self.tsi.get(tsi_port_id) {
            Some(tsi_port) => tsi_port.enqueue(message, sut_address),
            None => {
                tracing::debug!(
                    tsi_port = tsi_port_id,
                    "message for unmapped tsi port, discarding"
                );
            }
        }
    }

    // ATS-level state

    pub fn record_result(&self, result: TestCaseResult) {
        self.results.lock().push(result);
    }

    pub fn results(&self) -> Vec<TestCaseResult> {
        self.results.lock().clone()
    }

    /// Flag the ATS as cancelled; checked after each testcase.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn stop_ats_on_testcase_failure(&self, stop: bool) {
        self.stop_on_failure.store(stop, Ordering::SeqCst);
    }

    pub fn stops_on_testcase_failure(&self) -> bool {
        self.stop_on_failure.load(Ordering::SeqCst)
    }

    /// ATS result code derived from the recorded testcase verdicts.
    pub fn result_code(&self) -> i32 {
        if self.is_cancelled() {
            return tm_core::retcode::CANCELLED;
        }
        let results = self.results.lock();
        if results.iter().all(|r| r.verdict == Verdict::Pass) {
            tm_core::retcode::OK
        } else {
            tm_core::retcode::OK_WITH_FAILED_TC
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.timers.shutdown();
    }
}
