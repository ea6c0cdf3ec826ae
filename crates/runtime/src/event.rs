// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System queue events.
//!
//! Two families share the queue: *state* events (timer timeouts,
//! component done/killed and their aggregates) that stay in the queue
//! when matched, and *trigger* events (stop/kill commands) that are
//! consumed by the component they target.

use std::fmt;

/// An event posted to the system queue.
///
/// Components and timers are identified by their runtime ids; names ride
/// along for the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// A timer expired.
    Timeout { timer_id: u64, timer_name: String },
    /// A component is done (stopped or killed).
    Done { tc_id: u64, tc_name: String },
    /// A component was killed.
    Killed { tc_id: u64, tc_name: String },
    /// No alive, not-done component remains.
    AllDone,
    AllKilled,
    /// Ask a component to stop at its next alt.
    StopTc { tc_id: u64 },
    /// Ask a component to die at its next alt.
    KillTc { tc_id: u64 },
}

impl SystemEvent {
    /// Trigger events are consumed on match; state events are kept.
    pub fn is_trigger(&self) -> bool {
        matches!(self, SystemEvent::StopTc { .. } | SystemEvent::KillTc { .. })
    }
}

impl fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemEvent::Timeout { timer_name, .. } => write!(f, "timeout({timer_name})"),
            SystemEvent::Done { tc_name, .. } => write!(f, "done({tc_name})"),
            SystemEvent::Killed { tc_name, .. } => write!(f, "killed({tc_name})"),
            SystemEvent::AllDone => write!(f, "all.done"),
            SystemEvent::AllKilled => write!(f, "all.killed"),
            SystemEvent::StopTc { tc_id } => write!(f, "stop-tc({tc_id})"),
            SystemEvent::KillTc { tc_id } => write!(f, "kill-tc({tc_id})"),
        }
    }
}

/// Template matched against system queue events in `alt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEventTemplate {
    Timeout { timer_id: u64 },
    Done { tc_id: u64 },
    Killed { tc_id: u64 },
    AllDone,
    AllKilled,
    /// Matches any individual done event, without consuming it.
    AnyDone,
    /// Matches any individual killed event, without consuming it.
    AnyKilled,
    StopTc { tc_id: u64 },
    KillTc { tc_id: u64 },
}

impl SystemEventTemplate {
    pub fn matches(&self, event: &SystemEvent) -> bool {
        match (self, event) {
            (SystemEventTemplate::Timeout { timer_id }, SystemEvent::Timeout { timer_id: id, .. }) => {
                timer_id == id
            }
            (SystemEventTemplate::Done { tc_id }, SystemEvent::Done { tc_id: id, .. }) => {
                tc_id == id
            }
            (SystemEventTemplate::Killed { tc_id }, SystemEvent::Killed { tc_id: id, .. }) => {
                tc_id == id
            }
            (SystemEventTemplate::AllDone, SystemEvent::AllDone) => true,
            (SystemEventTemplate::AllKilled, SystemEvent::AllKilled) => true,
            (SystemEventTemplate::AnyDone, SystemEvent::Done { .. }) => true,
            (SystemEventTemplate::AnyKilled, SystemEvent::Killed { .. }) => true,
            (SystemEventTemplate::StopTc { tc_id }, SystemEvent::StopTc { tc_id: id }) => {
                tc_id == id
            }
            (SystemEventTemplate::KillTc { tc_id }, SystemEvent::KillTc { tc_id: id }) => {
                tc_id == id
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
