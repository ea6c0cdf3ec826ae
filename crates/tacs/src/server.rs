// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The two TACS listeners.
//!
//! Each accepted connection becomes a channel with a writer task and a
//! read loop; requests dispatch into the controller, responses complete
//! pending proxy transactions, and a closed socket triggers the
//! controller's disconnect cascade.

use crate::channel::{ChannelHandle, ChannelSide};
use crate::config::TacsConfig;
use crate::controller::Controller;
use crate::protocol::{read_frame, write_frame, Frame, ProtocolError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A running TACS instance.
pub struct TacsServer {
    controller: Arc<Controller>,
    ia_address: SocketAddr,
    xa_address: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl TacsServer {
    /// Bind both interfaces and start accepting.
    pub async fn bind(config: TacsConfig) -> std::io::Result<TacsServer> {
        let controller = Arc::new(Controller::new(
            config.document_root.clone(),
            config.proxy_timeout,
        ));

        let ia_listener = TcpListener::bind(config.ia_address).await?;
        let xa_listener = TcpListener::bind(config.xa_address).await?;
        let ia_address = ia_listener.local_addr()?;
        let xa_address = xa_listener.local_addr()?;
        tracing::info!(%ia_address, %xa_address, "TACS listening");

        let tasks = vec![
            tokio::spawn(accept_loop(
                ia_listener,
                Arc::clone(&controller),
                ChannelSide::Northbound,
            )),
            tokio::spawn(accept_loop(
                xa_listener,
                Arc::clone(&controller),
                ChannelSide::Southbound,
            )),
        ];

        Ok(TacsServer {
            controller,
            ia_address,
            xa_address,
            tasks,
        })
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Actual northbound address (useful with port 0).
    pub fn ia_address(&self) -> SocketAddr {
        self.ia_address
    }

    /// Actual southbound address.
    pub fn xa_address(&self) -> SocketAddr {
        self.xa_address
    }

    /// Stop accepting connections.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TacsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn accept_loop(listener: TcpListener, controller: Arc<Controller>, side: ChannelSide) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, side = ?side, "connection accepted");
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    handle_connection(stream, controller, side).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, controller: Arc<Controller>, side: ChannelSide) {
    let (mut reader, mut writer) = stream.into_split();
    let (channel, mut outgoing) = ChannelHandle::new(side);
    controller.attach(&channel);

    // Writer task: drain the channel queue onto the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outgoing.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                tracing::debug!(error = %e, "write failed, closing channel");
                break;
            }
        }
    });

    // Read loop.
    loop {
        match read_frame(&mut reader).await {
            Ok(Frame::Request { tid, request }) => {
                let response = controller.handle_request(&channel, request).await;
                if channel.send_response(tid, response).is_err() {
                    break;
                }
            }
            Ok(Frame::Response { tid, response }) => {
                channel.complete(tid, response);
            }
            Ok(Frame::Notification { notification }) => {
                controller.handle_notification(&channel, notification);
            }
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                tracing::debug!(channel = %channel.id(), error = %e, "read failed, closing channel");
                break;
            }
        }
    }

    controller.detach(&channel);
    writer_task.abort();
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
