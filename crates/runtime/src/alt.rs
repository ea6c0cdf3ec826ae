// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `alt` snapshot/matching primitive.
//!
//! An alt is a list of alternatives, each carrying an optional guard, a
//! branch condition (port receive or system event) and a list of actions.
//! Every pass scans the system queue first, then pops at most one message
//! per normal port; when nothing matches, the component blocks on its
//! notifier with a short poll and rescans. Messages arriving after a pass
//! started are only examined in the next pass.
//!
//! The component's own stop/kill triggers are prepended to every alt, and
//! activated default altsteps are appended.

use crate::component::TestComponent;
use crate::context::TcContext;
use crate::error::TcResult;
use crate::event::SystemEventTemplate;
use crate::matching::match_message;
use crate::notify::Notifier;
use crate::port::Port;
use crate::queue::SystemQueue;
use crate::template::Template;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// How long a blocked alt sleeps before rescanning anyway.
const ALT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Control flow returned by an alternative's action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltVerdict {
    /// Run the next action (leave the alt after the last one).
    Continue,
    /// Restart the alt from scratch.
    Repeat,
    /// Leave the alt immediately.
    Return,
}

pub type Guard = Rc<dyn Fn(&TcContext) -> bool>;
pub type Action = Rc<dyn Fn(&mut TcContext) -> TcResult<AltVerdict>>;

/// A port-receive branch condition.
#[derive(Clone)]
pub struct ReceiveSpec {
    pub(crate) port: Port,
    pub(crate) template: Option<Template>,
    pub(crate) value_name: Option<String>,
    pub(crate) sender_name: Option<String>,
    pub(crate) from: Option<String>,
}

impl ReceiveSpec {
    pub fn new(port: Port, template: Option<Template>) -> Self {
        Self {
            port,
            template,
            value_name: None,
            sender_name: None,
            from: None,
        }
    }

    /// Bind the received (decoded) message to a named value.
    pub fn bind_value(mut self, name: impl Into<String>) -> Self {
        self.value_name = Some(name.into());
        self
    }

    /// Bind the sender to a named value.
    pub fn bind_sender(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    /// Only match messages received from this sender.
    pub fn from(mut self, sender: impl Into<String>) -> Self {
        self.from = Some(sender.into());
        self
    }
}

/// A branch condition: a port receive or a system queue event.
#[derive(Clone)]
pub enum AltCondition {
    Receive(ReceiveSpec),
    System(SystemEventTemplate),
}

impl From<ReceiveSpec> for AltCondition {
    fn from(spec: ReceiveSpec) -> Self {
        AltCondition::Receive(spec)
    }
}

/// One alternative of an alt statement.
#[derive(Clone)]
pub struct Alternative {
    pub(crate) guard: Option<Guard>,
    pub(crate) condition: AltCondition,
    pub(crate) actions: Vec<Action>,
}

impl Alternative {
    pub fn when(condition: impl Into<AltCondition>) -> Self {
        Self {
            guard: None,
            condition: condition.into(),
            actions: Vec::new(),
        }
    }

    /// Attach a guard; the alternative only participates when it holds.
    pub fn guard(mut self, guard: impl Fn(&TcContext) -> bool + 'static) -> Self {
        self.guard = Some(Rc::new(guard));
        self
    }

    /// Append an action.
    pub fn then(mut self, action: impl Fn(&mut TcContext) -> TcResult<AltVerdict> + 'static) -> Self {
        self.actions.push(Rc::new(action));
        self
    }

    /// Append an action that always continues.
    pub fn then_do(self, action: impl Fn(&mut TcContext) -> TcResult<()> + 'static) -> Self {
        self.then(move |ctx| {
            action(ctx)?;
            Ok(AltVerdict::Continue)
        })
    }
}

struct SystemAlt {
    guard: Option<Guard>,
    template: SystemEventTemplate,
    actions: Vec<Action>,
}

struct PortAlt {
    guard: Option<Guard>,
    spec: ReceiveSpec,
    actions: Vec<Action>,
}

/// Ref-counted system queue listener registration, released on every exit
/// path out of the alt.
struct ListenerRegistration {
    queue: Arc<SystemQueue>,
    notifier: Notifier,
}

impl ListenerRegistration {
    fn new(queue: Arc<SystemQueue>, notifier: Notifier) -> Self {
        queue.register_listener(&notifier);
        Self { queue, notifier }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.queue.unregister_listener(&self.notifier);
    }
}

fn run_actions(ctx: &mut TcContext, actions: &[Action]) -> TcResult<AltVerdict> {
    for action in actions {
        match action(ctx)? {
            AltVerdict::Continue => continue,
            verdict => return Ok(verdict),
        }
    }
    Ok(AltVerdict::Continue)
}

fn log_selected(template: &SystemEventTemplate) {
    let branch = match template {
        SystemEventTemplate::Timeout { .. } => "timeout",
        SystemEventTemplate::Done { .. } => "done",
        SystemEventTemplate::Killed { .. } => "killed",
        SystemEventTemplate::AllDone => "all.done",
        SystemEventTemplate::AllKilled => "all.killed",
        SystemEventTemplate::AnyDone => "any.done",
        SystemEventTemplate::AnyKilled => "any.killed",
        SystemEventTemplate::StopTc { .. } => "stop",
        SystemEventTemplate::KillTc { .. } => "kill",
    };
    tracing::debug!(branch, "alt branch selected");
}

/// Run an alt statement in the given component context.
pub fn alt(ctx: &mut TcContext, alternatives: &[Alternative]) -> TcResult<()> {
    let tc: TestComponent = ctx.tc().clone();

    let mut all = tc.prefix_alternatives();
    all.extend(alternatives.iter().cloned());
    all.extend(ctx.default_alternatives());

    // Bucket alternatives per source, keeping declaration order.
    let mut system_alts: Vec<SystemAlt> = Vec::new();
    let mut port_buckets: Vec<(Port, Vec<PortAlt>)> = Vec::new();
    for alternative in all {
        match alternative.condition {
            AltCondition::System(template) => system_alts.push(SystemAlt {
                guard: alternative.guard,
                template,
                actions: alternative.actions,
            }),
            AltCondition::Receive(spec) => {
                // a stopped port never delivers: do not watch it
                if !spec.port.is_started() {
                    continue;
                }
                let port_alt = PortAlt {
                    guard: alternative.guard,
                    spec,
                    actions: alternative.actions,
                };
                match port_buckets
                    .iter()
                    .position(|(p, _)| p.same_as(&port_alt.spec.port))
                {
                    Some(pos) => port_buckets[pos].1.push(port_alt),
                    None => {
                        let port = port_alt.spec.port.clone();
                        port_buckets.push((port, vec![port_alt]));
                    }
                }
            }
        }
    }

    let runtime = ctx.runtime();
    let queue = Arc::clone(runtime.system_queue());
    let codecs = runtime.codecs().clone();
    let _registration = ListenerRegistration::new(Arc::clone(&queue), tc.notifier().clone());

    'restart: loop {
        // Acknowledge pending wake-ups before scanning: anything arriving
        // during the scan re-signals and short-circuits the wait below.
        tc.notifier().drain();

        // System queue first. The queue is scanned without popping; state
        // events stay in place, triggers are consumed on match.
        for event in queue.snapshot() {
            for system_alt in &system_alts {
                if let Some(guard) = &system_alt.guard {
                    if !guard(ctx) {
                        continue;
                    }
                }
                if !system_alt.template.matches(&event) {
                    continue;
                }
                if event.is_trigger() {
                    queue.consume(&event);
                }
                log_selected(&system_alt.template);
                match run_actions(ctx, &system_alt.actions)? {
                    AltVerdict::Repeat => continue 'restart,
                    _ => return Ok(()),
                }
            }
        }

        // Normal ports: pop at most one message per port per pass. The
        // popped message is consumed whether or not it matches.
        for (port, bucket) in &port_buckets {
            let (message, from) = match port.pop() {
                Some(entry) => entry,
                None => continue,
            };

            for port_alt in bucket {
                if let Some(guard) = &port_alt.guard {
                    if !guard(ctx) {
                        continue;
                    }
                }
                if let Some(expected) = &port_alt.spec.from {
                    if from.as_deref() != Some(expected.as_str()) {
                        tracing::debug!(
                            port = %port,
                            expected = %expected,
                            got = from.as_deref().unwrap_or(""),
                            "not matching: unexpected sender"
                        );
                        continue;
                    }
                }

                let template = port_alt
                    .spec
                    .template
                    .clone()
                    .unwrap_or(Template::AnyOrNone);
                let (outcome, bindings) = match_message(&message, &template, &codecs);

                if !outcome.matched {
                    tracing::debug!(
                        tc = %tc.name(),
                        port = %port,
                        path = outcome.mismatched_path.as_deref().unwrap_or(""),
                        "template mismatch"
                    );
                    continue;
                }

                tracing::debug!(tc = %tc.name(), port = %port, "template match");
                for (name, value) in bindings {
                    ctx.set_value(name, value);
                }
                if let Some(name) = &port_alt.spec.value_name {
                    ctx.set_value(name.clone(), outcome.decoded.clone());
                }
                if let Some(name) = &port_alt.spec.sender_name {
                    ctx.set_sender(name.clone(), from.clone().unwrap_or_default());
                }

                match run_actions(ctx, &port_alt.actions)? {
                    AltVerdict::Repeat => continue 'restart,
                    _ => return Ok(()),
                }
            }
        }

        // Nothing matched in this pass. If a port still holds unexamined
        // messages, rescan immediately; otherwise block until a producer
        // signals (or the poll interval elapses).
        let backlog = port_buckets.iter().any(|(port, _)| port.has_messages());
        if !backlog {
            tc.notifier().wait(ALT_POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
#[path = "alt_tests.rs"]
mod tests;
