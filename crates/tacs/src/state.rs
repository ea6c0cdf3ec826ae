// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker registry state.
//!
//! Pure table manipulation: agents, probes (with their lock sets),
//! subscriptions and connected northbound clients. Operations return the
//! PROBE-EVENTs to dispatch so the caller can send them after releasing
//! the state lock.

use crate::channel::ChannelId;
use crate::protocol::{headers, status, Notification};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tm_core::URI_SYSTEM_PROBES;

/// A broker-level failure, mapped onto a response status.
#[derive(Debug, Error)]
#[error("{reason}: {description}")]
pub struct TacsError {
    pub code: u16,
    pub reason: String,
    pub description: String,
}

impl TacsError {
    pub fn new(code: u16, reason: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            description: description.into(),
        }
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(status::NOT_FOUND, "Not Found", description)
    }

    pub fn locked(description: impl Into<String>) -> Self {
        Self::new(status::FORBIDDEN, "Probe Locked by Another Client", description)
    }

    pub fn not_lock_owner(description: impl Into<String>) -> Self {
        Self::new(status::FORBIDDEN, "Probe Not Locked by This Client", description)
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(status::INTERNAL_ERROR, "TACS Internal Error", description)
    }

    pub fn timeout(description: impl Into<String>) -> Self {
        Self::new(status::INTERNAL_ERROR, "Timeout", description)
    }

    pub fn not_supported(description: impl Into<String>) -> Self {
        Self::new(status::NOT_SUPPORTED, "Not Supported", description)
    }

    pub fn client_error(description: impl Into<String>) -> Self {
        Self::new(status::FORBIDDEN, "Client Error", description)
    }
}

/// A registered agent.
#[derive(Debug, Clone)]
pub struct RegisteredAgent {
    pub channel: ChannelId,
    pub uri: String,
    pub contact: String,
    pub supported_probes: Vec<String>,
    pub user_agent: String,
}

/// A registered probe, implicitly owned by its agent's channel.
#[derive(Debug, Clone)]
pub struct RegisteredProbe {
    pub channel: ChannelId,
    pub uri: String,
    pub probe_type: String,
    pub name: String,
    pub contact: String,
    pub agent_uri: String,
    /// Channels holding the lock; at most one at any time.
    pub locks: HashSet<ChannelId>,
}

impl RegisteredProbe {
    pub fn is_locked(&self) -> bool {
        !self.locks.is_empty()
    }

    fn info(&self) -> serde_json::Value {
        json!({
            "uri": self.uri,
            "type": self.probe_type,
            "name": self.name,
            "contact": self.contact,
            "agent-uri": self.agent_uri,
            "locked": self.is_locked(),
        })
    }
}

/// Registry event reasons dispatched on `system:probes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEventReason {
    AgentRegistered,
    AgentUnregistered,
    ProbeRegistered,
    ProbeUnregistered,
    ProbeLocked,
    ProbeUnlocked,
}

impl ProbeEventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeEventReason::AgentRegistered => "agent-registered",
            ProbeEventReason::AgentUnregistered => "agent-unregistered",
            ProbeEventReason::ProbeRegistered => "probe-registered",
            ProbeEventReason::ProbeUnregistered => "probe-unregistered",
            ProbeEventReason::ProbeLocked => "probe-locked",
            ProbeEventReason::ProbeUnlocked => "probe-unlocked",
        }
    }
}

/// A registry event ready for dispatch.
#[derive(Debug, Clone)]
pub struct ProbeEvent {
    pub reason: ProbeEventReason,
    pub body: serde_json::Value,
}

impl ProbeEvent {
    fn new(reason: ProbeEventReason, body: serde_json::Value) -> Self {
        Self { reason, body }
    }

    /// Render as a PROBE-EVENT notification on `system:probes`.
    pub fn to_notification(&self) -> Notification {
        Notification::new("PROBE-EVENT", URI_SYSTEM_PROBES)
            .with_header(headers::REASON, self.reason.as_str())
            .with_body(self.body.clone())
    }
}

/// The broker tables.
#[derive(Default)]
pub struct ControllerState {
    agents: HashMap<String, RegisteredAgent>,
    probes: HashMap<String, RegisteredProbe>,
    subscriptions: HashMap<String, HashSet<ChannelId>>,
    ia_clients: HashSet<ChannelId>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    // Agent registration

    pub fn register_agent(
        &mut self,
        channel: ChannelId,
        uri: &str,
        contact: &str,
        supported_probes: Vec<String>,
        user_agent: &str,
    ) -> ProbeEvent {
        self.agents.insert(
            uri.to_string(),
            RegisteredAgent {
                channel,
                uri: uri.to_string(),
                contact: contact.to_string(),
                supported_probes: supported_probes.clone(),
                user_agent: user_agent.to_string(),
            },
        );
        tracing::info!(agent = uri, "agent registered");
        ProbeEvent::new(
            ProbeEventReason::AgentRegistered,
            json!({
                "uri": uri,
                "user-agent": user_agent,
                "supported-probes": supported_probes,
                "contact": contact,
            }),
        )
    }

    /// Drop the agent connected on `channel` and everything it owns.
    ///
    /// Probes cascade first (one `probe-unregistered` each), then the
    /// agent itself.
    pub fn unregister_agent_channel(&mut self, channel: ChannelId) -> Vec<ProbeEvent> {
        let mut events = Vec::new();

        let probe_uris: Vec<String> = self
            .probes
            .values()
            .filter(|p| p.channel == channel)
            .map(|p| p.uri.clone())
            .collect();
        for uri in probe_uris {
            if let Some(event) = self.unregister_probe(&uri) {
                events.push(event);
            }
        }

        let agent_uri = self
            .agents
            .values()
            .find(|a| a.channel == channel)
            .map(|a| a.uri.clone());
        if let Some(uri) = agent_uri {
            self.agents.remove(&uri);
            tracing::info!(agent = %uri, "agent unregistered");
            events.push(ProbeEvent::new(
                ProbeEventReason::AgentUnregistered,
                json!({ "uri": uri }),
            ));
        }
        events
    }

    /// Explicit agent-scope UNREGISTER.
    pub fn unregister_agent(&mut self, uri: &str) -> Option<ProbeEvent> {
        self.agents.remove(uri).map(|agent| {
            tracing::info!(agent = %agent.uri, "agent unregistered");
            ProbeEvent::new(
                ProbeEventReason::AgentUnregistered,
                json!({ "uri": agent.uri }),
            )
        })
    }

    // Probe registration

    pub fn register_probe(
        &mut self,
        channel: ChannelId,
        uri: &str,
        contact: &str,
        name: &str,
        probe_type: &str,
        agent_uri: &str,
    ) -> ProbeEvent {
        self.probes.insert(
            uri.to_string(),
            RegisteredProbe {
                channel,
                uri: uri.to_string(),
                probe_type: probe_type.to_string(),
                name: name.to_string(),
                contact: contact.to_string(),
                agent_uri: agent_uri.to_string(),
                locks: HashSet::new(),
            },
        );
        tracing::info!(probe = uri, "probe registered");
        ProbeEvent::new(
            ProbeEventReason::ProbeRegistered,
            json!({
                "uri": uri,
                "type": probe_type,
                "name": name,
                "contact": contact,
                "agent-uri": agent_uri,
                "locked": false,
            }),
        )
    }

    pub fn unregister_probe(&mut self, uri: &str) -> Option<ProbeEvent> {
        self.probes.remove(uri).map(|probe| {
            tracing::info!(probe = uri, "probe unregistered");
            ProbeEvent::new(
                ProbeEventReason::ProbeUnregistered,
                json!({
                    "uri": probe.uri,
                    "type": probe.probe_type,
                    "name": probe.name,
                    "contact": probe.contact,
                    "agent-uri": probe.agent_uri,
                }),
            )
        })
    }

    // Locking

    /// Lock a probe for a client channel.
    ///
    /// Succeeds when the probe is unlocked or already locked by the same
    /// channel (re-lock is a no-op). The caller must also subscribe the
    /// channel to the probe uri.
    pub fn lock_probe(&mut self, channel: ChannelId, uri: &str) -> Result<ProbeEvent, TacsError> {
        let probe = self
            .probes
            .get_mut(uri)
            .ok_or_else(|| TacsError::not_found(format!("probe {uri} not available")))?;
        if probe.is_locked() && !probe.locks.contains(&channel) {
            return Err(TacsError::locked(format!(
                "probe {uri} is locked by another client"
            )));
        }
        probe.locks.insert(channel);
        tracing::info!(channel = %channel, probe = uri, "probe locked");
        Ok(ProbeEvent::new(
            ProbeEventReason::ProbeLocked,
            json!({ "uri": uri }),
        ))
    }

    /// Unlock a probe; only the lock owner may.
    pub fn unlock_probe(&mut self, channel: ChannelId, uri: &str) -> Result<ProbeEvent, TacsError> {
        let probe = self
            .probes
            .get_mut(uri)
            .ok_or_else(|| TacsError::not_found(format!("probe {uri} not available")))?;
        if !probe.locks.remove(&channel) {
            return Err(TacsError::not_lock_owner(format!(
                "probe {uri} is not locked by this client"
            )));
        }
        tracing::info!(channel = %channel, probe = uri, "probe unlocked");
        Ok(ProbeEvent::new(
            ProbeEventReason::ProbeUnlocked,
            json!({ "uri": uri }),
        ))
    }

    // Subscriptions

    pub fn subscribe(&mut self, channel: ChannelId, uri: &str) {
        self.subscriptions
            .entry(uri.to_string())
            .or_default()
            .insert(channel);
        tracing::debug!(channel = %channel, uri, "subscribed");
    }

    pub fn unsubscribe(&mut self, channel: ChannelId, uri: &str) {
        if let Some(subscribers) = self.subscriptions.get_mut(uri) {
            subscribers.remove(&channel);
            if subscribers.is_empty() {
                self.subscriptions.remove(uri);
            }
        }
        tracing::debug!(channel = %channel, uri, "unsubscribed");
    }

    /// Snapshot of a uri's subscribers, for dispatch outside the lock.
    pub fn subscribers(&self, uri: &str) -> Vec<ChannelId> {
        self.subscriptions
            .get(uri)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    // Northbound client lifetime

    pub fn register_ia_client(&mut self, channel: ChannelId) {
        self.ia_clients.insert(channel);
    }

    /// Purge a northbound channel: subscriptions dropped, every held
    /// lock released (one `probe-unlocked` each).
    pub fn unregister_ia_client(&mut self, channel: ChannelId) -> Vec<ProbeEvent> {
        self.subscriptions.retain(|_, subscribers| {
            subscribers.remove(&channel);
            !subscribers.is_empty()
        });
        self.ia_clients.remove(&channel);

        let mut events = Vec::new();
        for probe in self.probes.values_mut() {
            if probe.locks.remove(&channel) {
                tracing::info!(channel = %channel, probe = %probe.uri,
                    "probe unlocked on channel disconnection");
                events.push(ProbeEvent::new(
                    ProbeEventReason::ProbeUnlocked,
                    json!({ "uri": probe.uri }),
                ));
            }
        }
        events
    }

    // Queries

    pub fn probes_info(&self) -> Vec<serde_json::Value> {
        self.probes.values().map(RegisteredProbe::info).collect()
    }

    pub fn probe_info(&self, uri: &str) -> Option<serde_json::Value> {
        self.probes.get(uri).map(RegisteredProbe::info)
    }

    pub fn agents_info(&self) -> Vec<serde_json::Value> {
        self.agents
            .values()
            .map(|agent| {
                json!({
                    "uri": agent.uri,
                    "supported-probes": agent.supported_probes,
                    "contact": agent.contact,
                    "user-agent": agent.user_agent,
                })
            })
            .collect()
    }

    pub fn probe(&self, uri: &str) -> Option<&RegisteredProbe> {
        self.probes.get(uri)
    }

    pub fn agent(&self, uri: &str) -> Option<&RegisteredAgent> {
        self.agents.get(uri)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
