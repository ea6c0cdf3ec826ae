// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test adapter seam (TRI).
//!
//! The adapter carries abstract test operations over to the probe world:
//! in a deployed TE it proxies to the agent controller, in tests it loops
//! messages back or swallows them. The runtime only depends on this
//! trait.

use crate::error::TcResult;
use crate::runtime::Runtime;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// TRI operations invoked by the runtime.
pub trait TestAdapter: Send + Sync {
    fn tri_execute_testcase(&self, testcase: &str, tsi_ports: &[String]) -> TcResult<()> {
        let _ = (testcase, tsi_ports);
        Ok(())
    }

    /// Outbound message on a mapped TSI port.
    fn tri_send(&self, tsi_port: &str, sut_address: Option<&str>, message: &Value) -> TcResult<()>;

    fn tri_map(&self, port: &str, tsi_port: &str) -> TcResult<()> {
        let _ = (port, tsi_port);
        Ok(())
    }

    fn tri_unmap(&self, port: &str, tsi_port: &str) -> TcResult<()> {
        let _ = (port, tsi_port);
        Ok(())
    }

    /// Reset every probe binding (end of testcase).
    fn tri_sa_reset(&self) -> TcResult<()> {
        Ok(())
    }
}

/// Swallows everything. The default adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdapter;

impl TestAdapter for NoopAdapter {
    fn tri_send(&self, tsi_port: &str, _sut_address: Option<&str>, _message: &Value) -> TcResult<()> {
        tracing::debug!(tsi_port, "message sent to noop adapter, dropped");
        Ok(())
    }
}

/// Loops every sent message straight back into the same TSI port.
pub struct LoopbackAdapter {
    runtime: Weak<Runtime>,
}

impl LoopbackAdapter {
    pub fn install(runtime: &Arc<Runtime>) {
        runtime.set_adapter(Arc::new(Self {
            runtime: Arc::downgrade(runtime),
        }));
    }
}

impl TestAdapter for LoopbackAdapter {
    fn tri_send(&self, tsi_port: &str, sut_address: Option<&str>, message: &Value) -> TcResult<()> {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.tri_enqueue_msg(tsi_port, sut_address, message.clone());
        }
        Ok(())
    }
}

/// A TSI port binding: which probe answers behind a TSI port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub tsi_port: String,
    pub uri: String,
    pub probe_type: String,
    pub parameters: HashMap<String, String>,
}

/// A named set of TSI port bindings.
#[derive(Debug, Clone, Default)]
pub struct TestAdapterConfiguration {
    pub name: String,
    bindings: Vec<Binding>,
}

impl TestAdapterConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    /// Bind a TSI port to a probe uri.
    pub fn bind(
        mut self,
        tsi_port: impl Into<String>,
        uri: impl Into<String>,
        probe_type: impl Into<String>,
    ) -> Self {
        self.bindings.push(Binding {
            tsi_port: tsi_port.into(),
            uri: uri.into(),
            probe_type: probe_type.into(),
            parameters: HashMap::new(),
        });
        self
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn tsi_port_names(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.tsi_port.clone()).collect()
    }
}
