// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tm-tacs: the Testerman Agent Controller Server.
//!
//! A stateless two-sided broker between the server/TE world (northbound,
//! Ia) and the agent/probe world (southbound, Xa). It keeps the
//! agent/probe registry, the probe lock table and the event
//! subscriptions, and proxies probe- and agent-addressed requests to the
//! owning agent channel, blocking the caller's transaction on the
//! response.

pub mod channel;
pub mod client;
pub mod config;
pub mod controller;
pub mod protocol;
pub mod server;
pub mod state;

pub use channel::{ChannelHandle, ChannelId, ChannelSide};
pub use client::TacsClient;
pub use config::TacsConfig;
pub use controller::Controller;
pub use protocol::{status, Frame, Notification, ProtocolError, Request, Response};
pub use server::TacsServer;
pub use state::{
    ControllerState, ProbeEvent, ProbeEventReason, RegisteredAgent, RegisteredProbe, TacsError,
};
