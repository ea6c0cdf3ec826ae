// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TTCN-3 timers and the platform timer service.
//!
//! Timers do not own threads: a single service thread holds every armed
//! deadline and posts a timeout event to the system queue on expiry.
//! Restarting a timer invalidates both its armed deadline (generation
//! counter) and any stale timeout already sitting in the queue.

use crate::alt::{alt, AltCondition, Alternative};
use crate::context::TcContext;
use crate::error::{TcError, TcResult};
use crate::event::{SystemEvent, SystemEventTemplate};
use crate::runtime::Runtime;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

struct TimerState {
    running: bool,
    started_at: Option<Instant>,
    generation: u64,
}

pub(crate) struct TimerShared {
    id: u64,
    name: String,
    tc_name: String,
    default_duration: Option<Duration>,
    runtime: Arc<Runtime>,
    state: Mutex<TimerState>,
}

impl TimerShared {
    fn timeout_event(&self) -> SystemEvent {
        SystemEvent::Timeout {
            timer_id: self.id,
            timer_name: self.name.clone(),
        }
    }

    /// Called by the service when an armed deadline fires.
    fn fire(&self, generation: u64) {
        let mut state = self.state.lock();
        if !state.running || state.generation != generation {
            // restarted or stopped since this deadline was armed
            return;
        }
        state.running = false;
        drop(state);
        tracing::debug!(tc = %self.tc_name, timer = %self.name, "timer expired");
        self.runtime.post_event(self.timeout_event());
    }
}

/// A TTCN-3 timer.
#[derive(Clone)]
pub struct Timer {
    shared: Arc<TimerShared>,
}

impl Timer {
    /// Create a timer in the current component context.
    pub fn new(ctx: &mut TcContext, duration: Option<Duration>, name: Option<&str>) -> Timer {
        let runtime = ctx.runtime();
        let id = runtime.next_id();
        let timer = Timer {
            shared: Arc::new(TimerShared {
                id,
                name: name
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("timer_{id}")),
                tc_name: ctx.tc().name().to_string(),
                default_duration: duration,
                runtime,
                state: Mutex::new(TimerState {
                    running: false,
                    started_at: None,
                    generation: 0,
                }),
            }),
        };
        ctx.register_timer(&timer);
        timer
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Start (or restart) the timer.
    ///
    /// Any pending expiry is cancelled and a stale timeout event for this
    /// timer is removed from the system queue: once restarted, the
    /// previous "timeout" state is no longer observable.
    pub fn start(&self, duration: Option<Duration>) -> TcResult<()> {
        let duration = duration
            .or(self.shared.default_duration)
            .ok_or_else(|| TcError::Rule(format!("no duration set for timer {}", self.name())))?;

        let generation = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.running = true;
            state.started_at = Some(Instant::now());
            state.generation
        };

        self.shared.runtime.remove_event(&self.shared.timeout_event());
        self.shared.runtime.timers().arm(
            Instant::now() + duration,
            Arc::downgrade(&self.shared),
            generation,
        );
        tracing::debug!(
            tc = %self.shared.tc_name,
            timer = %self.shared.name,
            duration_s = duration.as_secs_f64(),
            "timer started"
        );
        Ok(())
    }

    /// Stop the timer. Does nothing if it is not running.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        if state.running {
            state.generation += 1;
            state.running = false;
            state.started_at = None;
            tracing::debug!(tc = %self.shared.tc_name, timer = %self.shared.name, "timer stopped");
        }
    }

    pub fn running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Elapsed running time, or 0 when not running.
    pub fn read(&self) -> Duration {
        let state = self.shared.state.lock();
        if state.running {
            state
                .started_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    /// Branch condition matching this timer's expiry in `alt`.
    pub fn timeout_branch(&self) -> AltCondition {
        AltCondition::System(SystemEventTemplate::Timeout {
            timer_id: self.shared.id,
        })
    }

    /// Block until the timer expires. Returns immediately if the timer is
    /// not running.
    pub fn timeout(&self, ctx: &mut TcContext) -> TcResult<()> {
        if !self.running() {
            return Ok(());
        }
        alt(ctx, &[Alternative::when(self.timeout_branch())])
    }
}

struct ArmedTimer {
    deadline: Instant,
    timer: Weak<TimerShared>,
    generation: u64,
}

#[derive(Default)]
struct ServiceState {
    armed: Vec<ArmedTimer>,
    shutdown: bool,
}

struct ServiceInner {
    state: Mutex<ServiceState>,
    wake: Condvar,
}

/// The platform timer service: one thread, every armed deadline.
pub struct TimerService {
    inner: Arc<ServiceInner>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl TimerService {
    pub fn start() -> Self {
        let inner = Arc::new(ServiceInner {
            state: Mutex::new(ServiceState::default()),
            wake: Condvar::new(),
        });
        let run_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name("tm-timer-service".to_string())
            .spawn(move || Self::run(run_inner))
            .ok();
        Self {
            inner,
            thread: Mutex::new(handle),
        }
    }

    fn run(inner: Arc<ServiceInner>) {
        let mut state = inner.state.lock();
        loop {
            if state.shutdown {
                return;
            }

            let now = Instant::now();
            let mut due = Vec::new();
            state.armed.retain(|armed| {
                if armed.deadline <= now {
                    due.push((armed.timer.clone(), armed.generation));
                    false
                } else {
                    true
                }
            });

            if !due.is_empty() {
                // fire outside the service lock
                drop(state);
                for (weak, generation) in due {
                    if let Some(timer) = weak.upgrade() {
                        timer.fire(generation);
                    }
                }
                state = inner.state.lock();
                continue;
            }

            match state.armed.iter().map(|a| a.deadline).min() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(now);
                    inner.wake.wait_for(&mut state, timeout);
                }
                None => {
                    inner.wake.wait(&mut state);
                }
            }
        }
    }

    pub(crate) fn arm(&self, deadline: Instant, timer: Weak<TimerShared>, generation: u64) {
        let mut state = self.inner.state.lock();
        state.armed.push(ArmedTimer {
            deadline,
            timer,
            generation,
        });
        self.inner.wake.notify_one();
    }

    /// Stop every armed timer (testcase finalization).
    pub fn cancel_all(&self) {
        let armed = {
            let mut state = self.inner.state.lock();
            std::mem::take(&mut state.armed)
        };
        for entry in armed {
            if let Some(timer) = entry.timer.upgrade() {
                let mut state = timer.state.lock();
                state.generation += 1;
                state.running = false;
                state.started_at = None;
            }
        }
    }

    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
        }
        self.inner.wake.notify_one();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
