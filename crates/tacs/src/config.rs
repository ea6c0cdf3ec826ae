// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TACS daemon configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon settings, environment-driven.
#[derive(Debug, Clone)]
pub struct TacsConfig {
    /// Northbound (Ia) bind address: clients, TEs, the server.
    pub ia_address: SocketAddr,
    /// Southbound (Xa) bind address: agents.
    pub xa_address: SocketAddr,
    /// Document root serving agent update components.
    pub document_root: PathBuf,
    /// Proxied transaction timeout.
    pub proxy_timeout: Duration,
}

impl Default for TacsConfig {
    fn default() -> Self {
        Self {
            ia_address: "127.0.0.1:8087"
                .parse()
                .unwrap_or(SocketAddr::from(([127, 0, 0, 1], 8087))),
            xa_address: "0.0.0.0:40000"
                .parse()
                .unwrap_or(SocketAddr::from(([0, 0, 0, 0], 40000))),
            document_root: PathBuf::from("/tmp/testerman"),
            proxy_timeout: crate::controller::DEFAULT_PROXY_TIMEOUT,
        }
    }
}

impl TacsConfig {
    /// Read settings from `TM_TACS_IA_ADDRESS`, `TM_TACS_XA_ADDRESS`,
    /// `TM_DOCROOT` and `TM_TACS_PROXY_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(address) = std::env::var("TM_TACS_IA_ADDRESS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.ia_address = address;
        }
        if let Some(address) = std::env::var("TM_TACS_XA_ADDRESS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.xa_address = address;
        }
        if let Ok(document_root) = std::env::var("TM_DOCROOT") {
            config.document_root = PathBuf::from(document_root);
        }
        if let Some(timeout_ms) = std::env::var("TM_TACS_PROXY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.proxy_timeout = Duration::from_millis(timeout_ms);
        }
        config
    }
}
