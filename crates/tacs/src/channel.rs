// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connected channels and their transaction tables.
//!
//! Each accepted connection becomes a channel: a writer queue drained by
//! a dedicated task, plus a table of in-flight outbound transactions so
//! a proxied request can block on its response.

use crate::protocol::{Frame, Notification, Request, Response};
use crate::state::TacsError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Which interface a channel connected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSide {
    /// Ia: clients, TEs, the server.
    Northbound,
    /// Xa: agents and their probes.
    Southbound,
}

/// Unique channel identity, stable for the connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct ChannelInner {
    id: ChannelId,
    side: ChannelSide,
    writer: mpsc::UnboundedSender<Frame>,
    transactions: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    next_tid: AtomicU64,
}

/// Handle to a connected channel. Cheap to clone.
#[derive(Clone)]
pub struct ChannelHandle {
    inner: Arc<ChannelInner>,
}

impl ChannelHandle {
    /// Create a handle; the returned receiver feeds the writer task.
    pub fn new(side: ChannelSide) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (writer, rx) = mpsc::unbounded_channel();
        (
            Self {
                inner: Arc::new(ChannelInner {
                    id: ChannelId::new(),
                    side,
                    writer,
                    transactions: Mutex::new(HashMap::new()),
                    next_tid: AtomicU64::new(1),
                }),
            },
            rx,
        )
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn side(&self) -> ChannelSide {
        self.inner.side
    }

    /// Queue a frame for the writer task. Errors when the peer is gone.
    pub fn send_frame(&self, frame: Frame) -> Result<(), TacsError> {
        self.inner
            .writer
            .send(frame)
            .map_err(|_| TacsError::internal("channel disconnected"))
    }

    pub fn send_response(&self, tid: u64, response: Response) -> Result<(), TacsError> {
        self.send_frame(Frame::Response { tid, response })
    }

    pub fn send_notification(&self, notification: Notification) -> Result<(), TacsError> {
        self.send_frame(Frame::Notification { notification })
    }

    /// Send a request and await its response.
    ///
    /// The transaction id is channel-local; a missing response within
    /// `timeout` yields a timeout error and forgets the transaction.
    pub async fn request(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, TacsError> {
        let tid = self.inner.next_tid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.transactions.lock().insert(tid, tx);

        if let Err(e) = self.send_frame(Frame::Request { tid, request }) {
            self.inner.transactions.lock().remove(&tid);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TacsError::internal(
                "channel closed while waiting for a response",
            )),
            Err(_) => {
                self.inner.transactions.lock().remove(&tid);
                Err(TacsError::timeout(format!(
                    "timeout after {}s waiting for a response",
                    timeout.as_secs()
                )))
            }
        }
    }

    /// Complete a pending transaction with an incoming response.
    pub fn complete(&self, tid: u64, response: Response) {
        match self.inner.transactions.lock().remove(&tid) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                tracing::warn!(channel = %self.id(), tid, "unexpected asynchronous response");
            }
        }
    }

    /// Fail every in-flight transaction (channel teardown).
    pub fn fail_pending(&self) {
        self.inner.transactions.lock().clear();
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
