// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The background job scheduler.
//!
//! One task scans the queue for waiting root jobs whose scheduled time
//! has passed and launches each on an isolated worker thread. It wakes on
//! a fixed interval and immediately on submission, so instant runs do
//! not wait for the next tick.

use crate::registry::JobRegistry;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

struct SchedulerState {
    stopped: bool,
    notified: bool,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    wake: Condvar,
    interval: Duration,
}

/// Scheduler task handle, owned by the registry.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Scheduler {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState {
                    stopped: false,
                    notified: false,
                }),
                wake: Condvar::new(),
                interval,
            }),
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn start(&self, registry: Weak<JobRegistry>) {
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("tm-job-scheduler".to_string())
            .spawn(move || {
                tracing::info!("job scheduler started");
                loop {
                    {
                        let mut state = inner.state.lock();
                        if state.stopped {
                            break;
                        }
                        if !state.notified {
                            inner.wake.wait_for(&mut state, inner.interval);
                        }
                        if state.stopped {
                            break;
                        }
                        state.notified = false;
                    }
                    match registry.upgrade() {
                        Some(registry) => registry.check_schedule(),
                        None => break,
                    }
                }
                tracing::info!("job scheduler stopped");
            })
            .ok();
        *self.thread.lock() = handle;
    }

    /// Wake the scheduler now (a submission may be an instant run).
    pub fn notify(&self) {
        let mut state = self.inner.state.lock();
        state.notified = true;
        self.inner.wake.notify_one();
    }

    pub(crate) fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            state.stopped = true;
        }
        self.inner.wake.notify_one();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}
