// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-testcase system event queue.
//!
//! A single ordered stream shared by every component of a testcase.
//! Listeners register a notifier handle (reference-counted, one per
//! component context) and are signalled on every post. Unlike a normal
//! port, matched *state* events are not consumed: they remain readable by
//! later `alt`s. Only `remove` (state invalidation on restart) and
//! trigger consumption take events out.

use crate::event::SystemEvent;
use crate::notify::Notifier;
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Default)]
struct QueueInner {
    events: VecDeque<SystemEvent>,
    listeners: Vec<(Notifier, usize)>,
}

/// Shared system queue.
#[derive(Default)]
pub struct SystemQueue {
    inner: Mutex<QueueInner>,
}

impl SystemQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and signal every registered listener.
    pub fn post(&self, event: SystemEvent) {
        let mut inner = self.inner.lock();
        tracing::trace!(event = %event, "system queue: post");
        inner.events.push_back(event);
        for (notifier, _) in &inner.listeners {
            notifier.signal();
        }
    }

    /// Remove at most one matching event.
    ///
    /// Used to invalidate stale state: a restarted timer removes its
    /// pending timeout, a restarted component its stale done.
    pub fn remove(&self, event: &SystemEvent) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.events.iter().position(|e| e == event) {
            inner.events.remove(pos);
        }
    }

    /// Register `notifier` as a listener. Reference-counted: nested
    /// `alt`s in one component share a single registration.
    pub fn register_listener(&self, notifier: &Notifier) {
        let mut inner = self.inner.lock();
        match inner.listeners.iter().position(|(n, _)| n.same_as(notifier)) {
            Some(pos) => inner.listeners[pos].1 += 1,
            None => inner.listeners.push((notifier.clone(), 1)),
        }
    }

    /// Drop one registration reference for `notifier`.
    pub fn unregister_listener(&self, notifier: &Notifier) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.listeners.iter().position(|(n, _)| n.same_as(notifier)) {
            inner.listeners[pos].1 -= 1;
            if inner.listeners[pos].1 == 0 {
                inner.listeners.remove(pos);
            }
        }
    }

    /// Snapshot the queue for a scan pass.
    pub fn snapshot(&self) -> Vec<SystemEvent> {
        self.inner.lock().events.iter().cloned().collect()
    }

    /// Consume a trigger event after it matched.
    pub fn consume(&self, event: &SystemEvent) {
        self.remove(event);
    }

    /// Drop everything (testcase boundary).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.events.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
