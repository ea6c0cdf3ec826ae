// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn timeout(id: u64) -> SystemEvent {
    SystemEvent::Timeout {
        timer_id: id,
        timer_name: format!("t{id}"),
    }
}

#[test]
fn post_preserves_order() {
    let q = SystemQueue::new();
    q.post(timeout(1));
    q.post(timeout(2));
    q.post(timeout(3));
    let ids: Vec<u64> = q
        .snapshot()
        .iter()
        .map(|e| match e {
            SystemEvent::Timeout { timer_id, .. } => *timer_id,
            _ => 0,
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn post_signals_registered_listeners() {
    let q = SystemQueue::new();
    let n = Notifier::new();
    q.register_listener(&n);
    q.post(timeout(1));
    assert!(n.wait(std::time::Duration::from_millis(10)));
}

#[test]
fn unregistered_listener_is_not_signalled() {
    let q = SystemQueue::new();
    let n = Notifier::new();
    q.register_listener(&n);
    q.unregister_listener(&n);
    q.post(timeout(1));
    assert!(!n.wait(std::time::Duration::from_millis(10)));
}

#[test]
fn registration_is_reference_counted() {
    let q = SystemQueue::new();
    let n = Notifier::new();
    // two nested alts share one handle
    q.register_listener(&n);
    q.register_listener(&n);
    q.unregister_listener(&n);
    q.post(timeout(1));
    assert!(n.wait(std::time::Duration::from_millis(10)), "still registered");
    q.unregister_listener(&n);
    n.drain();
    q.post(timeout(2));
    assert!(!n.wait(std::time::Duration::from_millis(10)));
}

#[test]
fn remove_takes_at_most_one_matching_event() {
    let q = SystemQueue::new();
    q.post(timeout(1));
    q.post(timeout(1));
    q.remove(&timeout(1));
    assert_eq!(q.len(), 1);
    q.remove(&timeout(1));
    assert_eq!(q.len(), 0);
    // removing from an empty queue is fine
    q.remove(&timeout(1));
}

#[test]
fn reset_clears_everything() {
    let q = SystemQueue::new();
    q.post(timeout(1));
    q.post(SystemEvent::AllDone);
    q.reset();
    assert_eq!(q.len(), 0);
}
