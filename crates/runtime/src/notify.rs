// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wake-up notifier shared by a component's ports and the system queue.
//!
//! Each test component owns one notifier handle. Every port of the
//! component signals it on enqueue, and the system queue signals every
//! registered listener's handle, so a blocked `alt` waits on a single
//! primitive regardless of how many sources it watches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    pending: Mutex<u64>,
    condvar: Condvar,
}

/// A cloneable wake-up handle.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    inner: Arc<Inner>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event and wake any waiter.
    pub fn signal(&self) {
        let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending += 1;
        self.inner.condvar.notify_all();
    }

    /// Clear pending signals. Call before re-scanning the watched queues.
    pub fn drain(&self) {
        let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = 0;
    }

    /// Wait until signalled or `timeout` elapses. Returns true if a signal
    /// arrived.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
        if *pending > 0 {
            *pending = 0;
            return true;
        }
        let (mut pending, result) = self
            .inner
            .condvar
            .wait_timeout(pending, timeout)
            .unwrap_or_else(|e| e.into_inner());
        let signalled = *pending > 0;
        *pending = 0;
        let _ = result;
        signalled
    }

    /// Identity for registration bookkeeping.
    pub fn same_as(&self, other: &Notifier) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Process-wide id source for components, ports and timers.
#[derive(Debug, Default)]
pub struct IdSource {
    last: AtomicU64,
}

impl IdSource {
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
