// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The broker itself.
//!
//! Translates between the two interfaces: registrations and
//! notifications coming up from agents, lock/subscription/query traffic
//! and probe-addressed requests coming down from clients. Proxied
//! requests are rewritten with minimal headers and forwarded to the
//! owning agent's channel; the caller's transaction blocks on the
//! response. The broker keeps no transaction state beyond that.

use crate::channel::{ChannelHandle, ChannelId, ChannelSide};
use crate::protocol::{headers, Notification, Request, Response};
use crate::state::{ControllerState, ProbeEvent, TacsError};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default timeout for proxied transactions.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Controller {
    state: Mutex<ControllerState>,
    channels: Mutex<HashMap<ChannelId, ChannelHandle>>,
    variables: Mutex<HashMap<String, serde_json::Value>>,
    document_root: PathBuf,
    proxy_timeout: Duration,
}

impl Controller {
    pub fn new(document_root: impl Into<PathBuf>, proxy_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(ControllerState::new()),
            channels: Mutex::new(HashMap::new()),
            variables: Mutex::new(HashMap::new()),
            document_root: document_root.into(),
            proxy_timeout,
        }
    }

    // Channel lifetime

    /// Track a newly accepted channel.
    pub fn attach(&self, channel: &ChannelHandle) {
        self.channels.lock().insert(channel.id(), channel.clone());
        if channel.side() == ChannelSide::Northbound {
            self.state.lock().register_ia_client(channel.id());
        }
        tracing::info!(channel = %channel.id(), side = ?channel.side(), "channel connected");
    }

    /// Tear a channel down: fail its transactions, purge its state and
    /// dispatch the cascade events.
    pub fn detach(&self, channel: &ChannelHandle) {
        tracing::info!(channel = %channel.id(), side = ?channel.side(), "channel disconnected");
        self.channels.lock().remove(&channel.id());
        channel.fail_pending();

        let events = match channel.side() {
            ChannelSide::Northbound => self.state.lock().unregister_ia_client(channel.id()),
            ChannelSide::Southbound => self.state.lock().unregister_agent_channel(channel.id()),
        };
        for event in events {
            self.dispatch(event.to_notification());
        }
    }

    fn channel(&self, id: ChannelId) -> Option<ChannelHandle> {
        self.channels.lock().get(&id).cloned()
    }

    // Notification dispatch

    /// Forward a notification to every subscriber of its uri.
    ///
    /// The subscriber set is snapshotted under the state lock; sends
    /// happen after release. A failing subscriber is logged and skipped.
    pub fn dispatch(&self, notification: Notification) {
        let subscribers = self.state.lock().subscribers(&notification.uri);
        let mut delivered = 0;
        for id in subscribers {
            if let Some(channel) = self.channel(id) {
                match channel.send_notification(notification.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::warn!(channel = %id, error = %e, "unable to notify a subscriber");
                    }
                }
            }
        }
        tracing::debug!(uri = %notification.uri, delivered, "notification dispatched");
    }

    fn dispatch_event(&self, event: ProbeEvent) {
        self.dispatch(event.to_notification());
    }

    // Variables

    pub fn set_variable(&self, name: impl Into<String>, value: serde_json::Value) {
        self.variables.lock().insert(name.into(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<serde_json::Value> {
        self.variables.lock().get(name).cloned()
    }

    // Request handling

    /// Handle one request, producing the response to send back.
    pub async fn handle_request(&self, channel: &ChannelHandle, request: Request) -> Response {
        let result = match channel.side() {
            ChannelSide::Northbound => self.handle_ia_request(channel, &request).await,
            ChannelSide::Southbound => self.handle_xa_request(channel, &request).await,
        };
        result.unwrap_or_else(|e| {
            Response::new(e.code, e.reason.clone()).with_body(json!(e.description))
        })
    }

    /// Handle one notification.
    pub fn handle_notification(&self, channel: &ChannelHandle, notification: Notification) {
        match channel.side() {
            ChannelSide::Northbound => self.handle_ia_notification(channel, notification),
            ChannelSide::Southbound => self.handle_xa_notification(channel, notification),
        }
    }

    // Northbound (Ia)

    async fn handle_ia_request(
        &self,
        channel: &ChannelHandle,
        request: &Request,
    ) -> Result<Response, TacsError> {
        match request.method.as_str() {
            // Probe-addressed requests, proxied to the owning agent
            "TRI-SEND" | "TRI-EXECUTE-TESTCASE" | "TRI-MAP" | "TRI-UNMAP" | "TRI-SA-RESET" => {
                self.proxy_to_probe(request).await
            }

            // Broker-addressed requests
            "LOCK" => {
                let uri = required_header(request, headers::PROBE_URI)?;
                let event = self.state.lock().lock_probe(channel.id(), &uri)?;
                // locking implies subscription to the probe's events
                self.state.lock().subscribe(channel.id(), &uri);
                self.dispatch_event(event);
                Ok(Response::ok())
            }
            "UNLOCK" => {
                let uri = required_header(request, headers::PROBE_URI)?;
                let event = self.state.lock().unlock_probe(channel.id(), &uri)?;
                self.state.lock().unsubscribe(channel.id(), &uri);
                self.dispatch_event(event);
                Ok(Response::ok())
            }
            "GET-PROBES" => Ok(Response::ok().with_body(json!(self.state.lock().probes_info()))),
            "GET-AGENTS" => Ok(Response::ok().with_body(json!(self.state.lock().agents_info()))),
            "GET-PROBE" => {
                let uri = required_header(request, headers::PROBE_URI)?;
                match self.state.lock().probe_info(&uri) {
                    Some(info) => Ok(Response::ok().with_body(info)),
                    None => Err(TacsError::not_found(format!("probe {uri} not available"))),
                }
            }
            "GET-VARIABLES" => {
                let variables = self.variables.lock().clone();
                Ok(Response::ok().with_body(json!(variables)))
            }
            "SUBSCRIBE" => {
                self.state.lock().subscribe(channel.id(), &request.uri);
                Ok(Response::ok())
            }
            "UNSUBSCRIBE" => {
                self.state.lock().unsubscribe(channel.id(), &request.uri);
                Ok(Response::ok())
            }

            // Agent-addressed requests
            "DEPLOY" => {
                let agent_uri = required_header(request, headers::AGENT_URI)?;
                let probe_type = request.body["probe-type"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                self.check_agent_capability(&agent_uri, &probe_type)?;
                self.proxy_to_agent(&agent_uri, "DEPLOY", request.body.clone())
                    .await
            }
            "UNDEPLOY" => {
                let agent_uri = required_header(request, headers::AGENT_URI)?;
                self.proxy_to_agent(&agent_uri, "UNDEPLOY", request.body.clone())
                    .await
            }
            "RESTART" => {
                let agent_uri = required_header(request, headers::AGENT_URI)?;
                self.proxy_to_agent(&agent_uri, "RESTART", serde_json::Value::Null)
                    .await
            }
            "UPDATE" => {
                let agent_uri = required_header(request, headers::AGENT_URI)?;
                self.proxy_to_agent(&agent_uri, "UPDATE", serde_json::Value::Null)
                    .await
            }

            other => Err(TacsError::not_supported(format!(
                "unsupported method {other}"
            ))),
        }
    }

    fn handle_ia_notification(&self, channel: &ChannelHandle, notification: Notification) {
        match notification.method.as_str() {
            "SUBSCRIBE" => self.state.lock().subscribe(channel.id(), &notification.uri),
            "UNSUBSCRIBE" => self
                .state
                .lock()
                .unsubscribe(channel.id(), &notification.uri),
            other => {
                tracing::info!(method = other, "unsupported northbound notification");
            }
        }
    }

    // Southbound (Xa)

    async fn handle_xa_request(
        &self,
        channel: &ChannelHandle,
        request: &Request,
    ) -> Result<Response, TacsError> {
        match request.method.as_str() {
            "REGISTER" => match request.uri_scheme() {
                "agent" => {
                    let supported = request
                        .header(headers::AGENT_SUPPORTED_PROBE_TYPES)
                        .unwrap_or_default()
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                    let event = self.state.lock().register_agent(
                        channel.id(),
                        &request.uri,
                        request.header(headers::CONTACT).unwrap_or_default(),
                        supported,
                        request.header(headers::USER_AGENT).unwrap_or_default(),
                    );
                    self.dispatch_event(event);
                    Ok(Response::ok())
                }
                "probe" => {
                    let event = self.state.lock().register_probe(
                        channel.id(),
                        &request.uri,
                        request.header(headers::CONTACT).unwrap_or_default(),
                        request.header(headers::PROBE_NAME).unwrap_or_default(),
                        request.header(headers::PROBE_TYPE).unwrap_or_default(),
                        request.header(headers::AGENT_URI).unwrap_or_default(),
                    );
                    self.dispatch_event(event);
                    Ok(Response::ok())
                }
                other => Err(TacsError::internal(format!(
                    "unsupported uri scheme for registration: {other}"
                ))),
            },
            "UNREGISTER" => match request.uri_scheme() {
                "agent" => {
                    let events = self.state.lock().unregister_agent_channel(channel.id());
                    for event in events {
                        self.dispatch_event(event);
                    }
                    Ok(Response::ok())
                }
                "probe" => {
                    let event = self.state.lock().unregister_probe(&request.uri);
                    if let Some(event) = event {
                        self.dispatch_event(event);
                    }
                    Ok(Response::ok())
                }
                other => Err(TacsError::internal(format!(
                    "unsupported uri scheme for unregistration: {other}"
                ))),
            },
            "GET" => {
                let path = required_header(request, headers::PATH)?;
                match self.get_file(&path) {
                    Some(content) => Ok(Response::ok().with_body(json!(content))),
                    None => Err(TacsError::not_found(format!("no such file: {path}"))),
                }
            }
            other => Err(TacsError::not_supported(format!(
                "unsupported method {other}"
            ))),
        }
    }

    fn handle_xa_notification(&self, _channel: &ChannelHandle, notification: Notification) {
        match notification.method.as_str() {
            // both flow to the probe uri's subscribers verbatim
            "LOG" | "TRI-ENQUEUE-MSG" => self.dispatch(notification),
            other => {
                tracing::info!(method = other, "unsupported southbound notification");
            }
        }
    }

    // Proxying

    /// Forward a probe-addressed request to the owning agent channel,
    /// rewritten with minimal headers.
    ///
    /// The probe's response is returned to the caller verbatim, whatever
    /// its status; only transport-level failures (channel gone, timeout)
    /// are mapped to broker errors.
    async fn proxy_to_probe(&self, request: &Request) -> Result<Response, TacsError> {
        let probe_channel = {
            let state = self.state.lock();
            state.probe(&request.uri).map(|p| p.channel).ok_or_else(|| {
                TacsError::not_found(format!("probe {} not available on controller", request.uri))
            })?
        };
        let channel = self.channel(probe_channel).ok_or_else(|| {
            TacsError::not_found(format!("probe {} not available on controller", request.uri))
        })?;

        let mut forwarded = Request::new(&request.method, &request.uri);
        if let Some(sut_address) = request.header(headers::SUT_ADDRESS) {
            forwarded = forwarded.with_header(headers::SUT_ADDRESS, sut_address);
        }
        forwarded.body = request.body.clone();

        let response = channel.request(forwarded, self.proxy_timeout).await?;
        if !response.is_ok() {
            tracing::debug!(
                method = %request.method,
                probe = %request.uri,
                status = response.status,
                reason = %response.reason,
                "probe rejected the proxied request"
            );
        }
        Ok(response)
    }

    /// Forward an agent-addressed request, relaying the agent's response
    /// verbatim.
    async fn proxy_to_agent(
        &self,
        agent_uri: &str,
        method: &str,
        body: serde_json::Value,
    ) -> Result<Response, TacsError> {
        let agent_channel = {
            let state = self.state.lock();
            state.agent(agent_uri).map(|a| a.channel).ok_or_else(|| {
                TacsError::not_found(format!("agent {agent_uri} not available on controller"))
            })?
        };
        let channel = self.channel(agent_channel).ok_or_else(|| {
            TacsError::not_found(format!("agent {agent_uri} not available on controller"))
        })?;

        let request = Request::new(method, agent_uri).with_body(body);
        let response = channel.request(request, self.proxy_timeout).await?;
        if !response.is_ok() {
            tracing::debug!(
                method,
                agent = agent_uri,
                status = response.status,
                reason = %response.reason,
                "agent rejected the proxied request"
            );
        }
        Ok(response)
    }

    fn check_agent_capability(&self, agent_uri: &str, probe_type: &str) -> Result<(), TacsError> {
        let state = self.state.lock();
        let agent = state.agent(agent_uri).ok_or_else(|| {
            TacsError::not_found(format!("agent {agent_uri} not available on controller"))
        })?;
        if !agent.supported_probes.iter().any(|t| t == probe_type) {
            return Err(TacsError::client_error(format!(
                "agent {agent_uri} does not support the probe type {probe_type}"
            )));
        }
        Ok(())
    }

    /// Read an update component from the document root.
    ///
    /// Paths escaping the document root are refused.
    fn get_file(&self, path: &str) -> Option<String> {
        if path.split('/').any(|c| c == "..") {
            tracing::warn!(path, "refusing a path outside the document root");
            return None;
        }
        let complete = self.document_root.join(path.trim_start_matches('/'));
        match std::fs::read_to_string(&complete) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!(path, error = %e, "unable to serve file");
                None
            }
        }
    }
}

fn required_header(request: &Request, name: &str) -> Result<String, TacsError> {
    request
        .header(name)
        .map(str::to_string)
        .ok_or_else(|| TacsError::internal(format!("missing {name} header")))
}
