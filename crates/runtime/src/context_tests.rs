// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::alt::Alternative;
use crate::component::any_done_branch;
use crate::testcase::TestCase;

fn with_mtc_context<F: FnOnce(&mut TcContext)>(f: F) {
    let runtime = Runtime::new();
    let tc = TestCase::new("ContextFixture");
    tc.execute(&runtime, |ctx| {
        f(ctx);
        Ok(())
    })
    .unwrap();
}

#[test]
fn values_and_senders_round_trip() {
    with_mtc_context(|ctx| {
        ctx.set_value("v", Value::Int(42));
        ctx.set_sender("s", "ptc_1");
        assert_eq!(ctx.value("v"), Some(&Value::Int(42)));
        assert_eq!(ctx.sender("s"), Some("ptc_1"));
        assert_eq!(ctx.value("missing"), None);
    });
}

#[test]
fn activate_deactivate_altsteps() {
    with_mtc_context(|ctx| {
        let step = vec![Alternative::when(any_done_branch())];
        let reference = ctx.activate(step);
        assert_eq!(ctx.default_alternatives().len(), 1);
        assert!(ctx.deactivate(&reference));
        assert!(ctx.default_alternatives().is_empty());
        assert!(!ctx.deactivate(&reference), "double deactivation");
    });
}

#[test]
fn state_manager_mutates_through_clones() {
    let s = StateManager::new("idle");
    let c = s.clone();
    c.set("ringing");
    assert_eq!(s.get(), "ringing");
}
