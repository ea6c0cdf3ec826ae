// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TTCN-3 ports, intra-test connections and TSI mappings.
//!
//! A port belongs to one component. Sending on a connected port enqueues
//! into each peer's queue; sending on a mapped port goes out through the
//! test adapter. The two are exclusive: a mapped port has no connections
//! and vice versa. Every enqueue signals the owning component's notifier
//! so a blocked `alt` wakes up.

use crate::alt::{alt, AltCondition, Alternative, ReceiveSpec};
use crate::component::TestComponent;
use crate::context::TcContext;
use crate::error::{TcError, TcResult};
use crate::template::Template;
use crate::timer::Timer;
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct PortInner {
    started: bool,
    pub(crate) queue: VecDeque<(Value, Option<String>)>,
    connected: Vec<Port>,
    mapped: Option<TsiPort>,
}

pub(crate) struct PortShared {
    name: String,
    owner: TestComponent,
    pub(crate) inner: Mutex<PortInner>,
}

/// A component port. Cheap to clone; clones alias the same port.
#[derive(Clone)]
pub struct Port {
    pub(crate) shared: Arc<PortShared>,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.shared.owner.name(), self.shared.name)
    }
}

impl Port {
    pub(crate) fn new(owner: &TestComponent, name: &str) -> Port {
        Port {
            shared: Arc::new(PortShared {
                name: name.to_string(),
                owner: owner.clone(),
                inner: Mutex::new(PortInner {
                    started: false,
                    queue: VecDeque::new(),
                    connected: Vec::new(),
                    mapped: None,
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub(crate) fn owner(&self) -> &TestComponent {
        &self.shared.owner
    }

    pub fn same_as(&self, other: &Port) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn is_started(&self) -> bool {
        self.shared.inner.lock().started
    }

    pub fn is_mapped(&self) -> bool {
        self.shared.inner.lock().mapped.is_some()
    }

    pub fn is_connected_to(&self, other: &Port) -> bool {
        self.shared
            .inner
            .lock()
            .connected
            .iter()
            .any(|p| p.same_as(other))
    }

    /// Start the port, purging its queue. Idempotent.
    pub fn start(&self) {
        let mut inner = self.shared.inner.lock();
        if !inner.started {
            inner.queue.clear();
            inner.started = true;
        }
        tracing::trace!(port = %self, "port started");
    }

    /// Stop the port: no further messages are accepted, queued messages
    /// are kept.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        inner.started = false;
        tracing::trace!(port = %self, "port stopped");
    }

    /// Purge the queue without stopping the port.
    pub fn clear(&self) {
        self.shared.inner.lock().queue.clear();
    }

    /// Enqueue an incoming message. Silently dropped when stopped.
    pub(crate) fn enqueue(&self, message: Value, from: Option<String>) {
        let mut inner = self.shared.inner.lock();
        if inner.started {
            inner.queue.push_back((message, from));
            drop(inner);
            self.shared.owner.notifier().signal();
        }
    }

    pub(crate) fn pop(&self) -> Option<(Value, Option<String>)> {
        self.shared.inner.lock().queue.pop_front()
    }

    pub(crate) fn has_messages(&self) -> bool {
        !self.shared.inner.lock().queue.is_empty()
    }

    /// Send a message through the port.
    ///
    /// The template is valuated (codec wrappers encoded) into a concrete
    /// value, then forwarded to the mapped TSI port or enqueued to each
    /// connected peer whose component matches `to` (all peers when `to`
    /// is None). Returns false if the port is stopped: nothing is sent.
    pub fn send(&self, message: &Template, to: Option<&str>) -> TcResult<bool> {
        let (started, mapped, peers) = {
            let inner = self.shared.inner.lock();
            (
                inner.started,
                inner.mapped.clone(),
                inner.connected.clone(),
            )
        };
        if !started {
            return Ok(false);
        }

        let runtime = self.shared.owner.runtime();
        let concrete = message.encode(runtime.codecs())?;

        if let Some(tsi) = mapped {
            tracing::debug!(
                from = %self,
                to = %tsi.name(),
                address = to.unwrap_or(""),
                "message sent to system"
            );
            tsi.send(&runtime, &concrete, to)?;
        } else {
            for peer in peers {
                if to.map(|t| peer.owner().name() == t).unwrap_or(true) {
                    tracing::debug!(from = %self, to = %peer, "message sent");
                    peer.enqueue(concrete.clone(), Some(self.shared.owner.name().to_string()));
                }
            }
        }
        Ok(true)
    }

    /// Branch condition for this port in `alt`.
    pub fn on_receive(&self, template: Option<Template>) -> ReceiveSpec {
        ReceiveSpec::new(self.clone(), template)
    }

    /// Blocking receive: `alt` with a single branch, plus an optional
    /// watchdog timeout.
    pub fn receive(
        &self,
        ctx: &mut TcContext,
        template: Option<Template>,
        value_name: Option<&str>,
        sender_name: Option<&str>,
        timeout: Option<Duration>,
    ) -> TcResult<()> {
        self.receive_with_timeout_action(ctx, template, value_name, sender_name, timeout, |_| {
            Ok(())
        })
    }

    /// Blocking receive, running `on_timeout` when the watchdog fires
    /// before a matching message arrives.
    pub fn receive_with_timeout_action<F>(
        &self,
        ctx: &mut TcContext,
        template: Option<Template>,
        value_name: Option<&str>,
        sender_name: Option<&str>,
        timeout: Option<Duration>,
        on_timeout: F,
    ) -> TcResult<()>
    where
        F: Fn(&mut TcContext) -> TcResult<()> + 'static,
    {
        if !self.is_started() {
            return Ok(());
        }
        let mut spec = self.on_receive(template);
        if let Some(name) = value_name {
            spec = spec.bind_value(name);
        }
        if let Some(name) = sender_name {
            spec = spec.bind_sender(name);
        }
        match timeout {
            Some(duration) => {
                let timer = Timer::new(ctx, Some(duration), Some("implicit receive timer"));
                timer.start(None)?;
                let result = alt(
                    ctx,
                    &[
                        Alternative::when(AltCondition::Receive(spec)),
                        Alternative::when(timer.timeout_branch()).then_do(on_timeout),
                    ],
                );
                timer.stop();
                result
            }
            None => alt(ctx, &[Alternative::when(AltCondition::Receive(spec))]),
        }
    }

    pub(crate) fn finalize(&self) {
        let mut inner = self.shared.inner.lock();
        inner.started = false;
        inner.queue.clear();
        inner.connected.clear();
        inner.mapped = None;
    }
}

/// Connect two ports (symmetric, bi-directional).
///
/// TTCN-3 restrictions enforced synchronously: a mapped port is not
/// connectable, and two ports may not link the same pair of components
/// twice (one-to-one per component pair).
pub fn connect(a: &Port, b: &Port) -> TcResult<()> {
    if a.is_connected_to(b) {
        tracing::debug!(a = %a, b = %b, "ports already connected, discarding");
        return Ok(());
    }
    if a.is_mapped() || b.is_mapped() {
        return Err(TcError::Rule(format!(
            "cannot connect {a} and {b}: at least one of these ports is already mapped"
        )));
    }
    {
        let inner = a.shared.inner.lock();
        if let Some(existing) = inner
            .connected
            .iter()
            .find(|p| p.owner().same_as(b.owner()))
        {
            return Err(TcError::Rule(format!(
                "cannot connect {a} and {b}: {a} is already connected to {existing}"
            )));
        }
    }
    {
        let inner = b.shared.inner.lock();
        if let Some(existing) = inner
            .connected
            .iter()
            .find(|p| p.owner().same_as(a.owner()))
        {
            return Err(TcError::Rule(format!(
                "cannot connect {a} and {b}: {b} is already connected to {existing}"
            )));
        }
    }

    a.shared.inner.lock().connected.push(b.clone());
    b.shared.inner.lock().connected.push(a.clone());
    Ok(())
}

/// Disconnect two ports. Does nothing if they are not connected.
pub fn disconnect(a: &Port, b: &Port) {
    a.shared.inner.lock().connected.retain(|p| !p.same_as(b));
    b.shared.inner.lock().connected.retain(|p| !p.same_as(a));
}

/// Map a port to a test system interface port.
pub fn port_map(port: &Port, tsi_port: &TsiPort) -> TcResult<()> {
    {
        let inner = port.shared.inner.lock();
        if inner.mapped.is_some() {
            return Err(TcError::Rule(format!(
                "cannot map {port} to {}: {port} is already mapped",
                tsi_port.name()
            )));
        }
        if !inner.connected.is_empty() {
            return Err(TcError::Rule(format!(
                "cannot map {port} to {}: {port} is connected",
                tsi_port.name()
            )));
        }
    }

    let runtime = port.owner().runtime();
    runtime
        .adapter()
        .tri_map(&port.to_string(), tsi_port.name())
        .map_err(|e| {
            TcError::Rule(format!(
                "cannot map {port} to {}: {e}, probably a missing binding",
                tsi_port.name()
            ))
        })?;

    runtime.tsi().insert(tsi_port);
    port.shared.inner.lock().mapped = Some(tsi_port.clone());
    tsi_port.shared.mapped.lock().push(port.clone());
    Ok(())
}

/// Unmap a mapped port. Does nothing if not mapped to this TSI port.
pub fn port_unmap(port: &Port, tsi_port: &TsiPort) -> TcResult<()> {
    let runtime = port.owner().runtime();
    runtime
        .adapter()
        .tri_unmap(&port.to_string(), tsi_port.name())?;

    port.shared.inner.lock().mapped = None;
    let mut mapped = tsi_port.shared.mapped.lock();
    mapped.retain(|p| !p.same_as(port));
    if mapped.is_empty() {
        // last user gone: drop the tri routing entry
        runtime.tsi().remove(tsi_port.name());
    }
    Ok(())
}

pub(crate) struct TsiShared {
    name: String,
    mapped: Mutex<Vec<Port>>,
}

/// A test system interface port: the boundary between the userland test
/// and the probe adapter.
#[derive(Clone)]
pub struct TsiPort {
    pub(crate) shared: Arc<TsiShared>,
}

impl TsiPort {
    pub(crate) fn new(name: &str) -> TsiPort {
        TsiPort {
            shared: Arc::new(TsiShared {
                name: name.to_string(),
                mapped: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Outbound: hand the message to the test adapter.
    fn send(
        &self,
        runtime: &Arc<crate::runtime::Runtime>,
        message: &Value,
        sut_address: Option<&str>,
    ) -> TcResult<()> {
        runtime
            .adapter()
            .tri_send(self.name(), sut_address, message)
    }

    /// Inbound: fan a TRI-received message to every mapped port.
    pub(crate) fn enqueue(&self, message: Value, sut_address: Option<&str>) {
        let mapped = self.shared.mapped.lock().clone();
        for port in mapped {
            tracing::debug!(from = %self.name(), to = %port, "message received from system");
            port.enqueue(message.clone(), sut_address.map(str::to_string));
        }
    }

    pub(crate) fn mapped_ports(&self) -> Vec<Port> {
        self.shared.mapped.lock().clone()
    }

    pub(crate) fn finalize(&self) -> TcResult<()> {
        for port in self.mapped_ports() {
            port_unmap(&port, self)?;
        }
        Ok(())
    }
}

/// Process-wide view of the currently mapped TSI ports, keyed by name.
///
/// This is what routes `tri_enqueue_msg` back into the userland.
#[derive(Default)]
pub struct TsiTable {
    map: Mutex<std::collections::HashMap<String, TsiPort>>,
}

impl TsiTable {
    pub(crate) fn insert(&self, tsi_port: &TsiPort) {
        self.map
            .lock()
            .insert(tsi_port.name().to_string(), tsi_port.clone());
    }

    pub(crate) fn get(&self, name: &str) -> Option<TsiPort> {
        self.map.lock().get(name).cloned()
    }

    pub(crate) fn remove(&self, name: &str) {
        self.map.lock().remove(name);
    }
}

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;
