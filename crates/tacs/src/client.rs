// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A channel client for either TACS interface.
//!
//! Used by Test Executables and the server on the northbound side, and
//! by agents on the southbound side. Incoming notifications are exposed
//! through an unbounded receiver; incoming requests (probe operations on
//! an agent channel) are answered by a caller-provided handler.

use crate::protocol::{read_frame, write_frame, Frame, Notification, ProtocolError, Request, Response};
use crate::state::TacsError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Answers requests arriving on this channel (agent side).
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &Request) -> Response;
}

/// Default handler: everything is unsupported.
struct RejectAll;

impl RequestHandler for RejectAll {
    fn handle(&self, _request: &Request) -> Response {
        Response::new(crate::protocol::status::NOT_SUPPORTED, "Not Supported")
    }
}

struct ClientInner {
    writer: mpsc::UnboundedSender<Frame>,
    transactions: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
    next_tid: AtomicU64,
}

/// A connected TACS channel.
pub struct TacsClient {
    inner: Arc<ClientInner>,
    notifications: tokio::sync::Mutex<mpsc::UnboundedReceiver<Notification>>,
    tasks: Vec<JoinHandle<()>>,
}

impl TacsClient {
    /// Connect with the default (rejecting) request handler.
    pub async fn connect(address: SocketAddr) -> std::io::Result<TacsClient> {
        Self::connect_with_handler(address, Arc::new(RejectAll)).await
    }

    /// Connect, answering incoming requests with `handler`.
    pub async fn connect_with_handler(
        address: SocketAddr,
        handler: Arc<dyn RequestHandler>,
    ) -> std::io::Result<TacsClient> {
        let stream = TcpStream::connect(address).await?;
        let (mut reader, mut writer) = stream.into_split();

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Frame>();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel::<Notification>();

        let inner = Arc::new(ClientInner {
            writer: writer_tx,
            transactions: Mutex::new(HashMap::new()),
            next_tid: AtomicU64::new(1),
        });

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = writer_rx.recv().await {
                if write_frame(&mut writer, &frame).await.is_err() {
                    break;
                }
            }
        });

        let reader_inner = Arc::clone(&inner);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Frame::Response { tid, response }) => {
                        if let Some(tx) = reader_inner.transactions.lock().remove(&tid) {
                            let _ = tx.send(response);
                        }
                    }
                    Ok(Frame::Notification { notification }) => {
                        if notify_tx.send(notification).is_err() {
                            break;
                        }
                    }
                    Ok(Frame::Request { tid, request }) => {
                        let response = handler.handle(&request);
                        if reader_inner
                            .writer
                            .send(Frame::Response { tid, response })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(ProtocolError::ConnectionClosed) => break,
                    Err(_) => break,
                }
            }
        });

        Ok(TacsClient {
            inner,
            notifications: tokio::sync::Mutex::new(notify_rx),
            tasks: vec![writer_task, reader_task],
        })
    }

    /// Send a request and await the response.
    pub async fn request(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, TacsError> {
        let tid = self.inner.next_tid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.transactions.lock().insert(tid, tx);
        self.inner
            .writer
            .send(Frame::Request { tid, request })
            .map_err(|_| TacsError::internal("channel disconnected"))?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TacsError::internal("channel closed")),
            Err(_) => {
                self.inner.transactions.lock().remove(&tid);
                Err(TacsError::timeout("no response"))
            }
        }
    }

    /// Send a notification (no response expected).
    pub fn notify(&self, notification: Notification) -> Result<(), TacsError> {
        self.inner
            .writer
            .send(Frame::Notification { notification })
            .map_err(|_| TacsError::internal("channel disconnected"))
    }

    /// Await the next incoming notification.
    pub async fn next_notification(&self, timeout: Duration) -> Option<Notification> {
        let mut receiver = self.notifications.lock().await;
        tokio::time::timeout(timeout, receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drop the connection.
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TacsClient {
    fn drop(&mut self) {
        self.close();
    }
}
