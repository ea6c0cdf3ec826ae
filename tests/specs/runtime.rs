//! TTCN-3 runtime properties exercised through the public API.

use std::sync::Arc;
use std::time::Duration;
use tm_core::Verdict;
use tm_runtime::{
    alt, connect, octetstring, Alternative, Condition, LoopbackAdapter, Runtime, Template,
    TestCase, Timer, Value,
};

#[test]
fn testcase_with_two_components_exchanging_messages() {
    let runtime = Runtime::new();
    let verdict = TestCase::new("TC_PING_PONG")
        .execute(&runtime, |ctx| {
            let ptc = ctx.create(Some("responder"), false);
            let mtc_port = ctx.tc().port("signalling");
            let ptc_port = ptc.port("signalling");
            connect(&mtc_port, &ptc_port)?;

            ptc.start(|ctx| {
                let port = ctx.tc().port("signalling");
                port.receive(ctx, Some(Template::from("ping")), None, Some("peer"), None)?;
                port.send(&Template::from("pong"), ctx.sender("peer"))?;
                Ok(())
            })?;

            mtc_port.send(&Template::from("ping"), None)?;
            mtc_port.receive(
                ctx,
                Some(Template::from("pong")),
                Some("reply"),
                None,
                Some(Duration::from_secs(5)),
            )?;
            if ctx.value("reply") == Some(&Value::from("pong")) {
                ctx.setverdict(Verdict::Pass)?;
            } else {
                ctx.setverdict(Verdict::Fail)?;
            }
            ptc.done(ctx)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(verdict, Verdict::Pass);
}

#[test]
fn send_receive_round_trips_structured_values() {
    let runtime = Runtime::new();
    TestCase::new("TC_ROUND_TRIP")
        .execute(&runtime, |ctx| {
            let ptc = ctx.create(Some("peer"), false);
            let tx = ctx.tc().port("tx");
            let rx = ptc.port("rx");
            connect(&tx, &rx)?;

            let message = Value::record([
                ("seq", Value::Int(1)),
                ("payload", octetstring("aabb00")),
                (
                    "options",
                    Value::List(vec![Value::from("a"), Value::from("b")]),
                ),
            ]);
            tx.send(&Template::Value(message.clone()), None)?;

            // matching the exact value decodes to the same value
            ptc.start(move |ctx| {
                let rx = ctx.tc().port("rx");
                rx.receive(ctx, Some(Template::Value(message.clone())), Some("got"), None, None)?;
                if ctx.value("got") == Some(&message) {
                    ctx.setverdict(Verdict::Pass)?;
                }
                Ok(())
            })?;
            ptc.done(ctx)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(
        runtime.results()[0].verdict,
        Verdict::Pass,
        "round-tripped value matched untouched"
    );
}

#[test]
fn alt_with_conditions_and_extraction() {
    let runtime = Runtime::new();
    let verdict = TestCase::new("TC_MATCHING")
        .execute(&runtime, |ctx| {
            let ptc = ctx.create(Some("peer"), false);
            let tx = ptc.port("tx");
            let rx = ctx.tc().port("rx");
            connect(&tx, &rx)?;

            tx.send(
                &Template::Value(Value::record([
                    ("code", Value::Int(204)),
                    ("reason", Value::from("No Content")),
                ])),
                None,
            )?;

            let template = Template::record([
                (
                    "code",
                    Template::extract("status", Condition::Between(200.0, 299.0).into()),
                ),
                ("reason", Template::Condition(Condition::Pattern("Content".into()))),
            ]);
            alt(
                ctx,
                &[Alternative::when(rx.on_receive(Some(template))).then(|ctx| {
                    let passed = ctx.value("status") == Some(&Value::Int(204));
                    ctx.setverdict(if passed { Verdict::Pass } else { Verdict::Fail })?;
                    Ok(tm_runtime::AltVerdict::Return)
                })],
            )?;
            Ok(())
        })
        .unwrap();
    assert_eq!(verdict, Verdict::Pass);
}

#[test]
fn variables_round_trip() {
    let runtime = Runtime::new();
    runtime.variables().set("PX_HOST", Value::from("sut-1"));
    assert_eq!(
        runtime.variables().get("PX_HOST", None),
        Some(Value::from("sut-1"))
    );
}

#[test]
fn zero_duration_timer_fires_at_the_next_tick() {
    let runtime = Runtime::new();
    TestCase::new("TC_T0")
        .execute(&runtime, |ctx| {
            let timer = Timer::new(ctx, Some(Duration::ZERO), Some("t0"));
            timer.start(None)?;
            let started = std::time::Instant::now();
            alt(ctx, &[Alternative::when(timer.timeout_branch())])?;
            assert!(started.elapsed() < Duration::from_secs(2));
            Ok(())
        })
        .unwrap();
}

#[test]
fn tsi_loopback_through_the_adapter() {
    let runtime = Runtime::new();
    LoopbackAdapter::install(&runtime);
    let verdict = TestCase::new("TC_TSI")
        .execute(&runtime, |ctx| {
            let port = ctx.tc().port("sut");
            let tsi = ctx.system_port("sut01");
            tm_runtime::port_map(&port, &tsi)?;

            port.send(&Template::from("echo"), Some("sut:1"))?;
            port.receive(
                ctx,
                Some(Template::from("echo")),
                None,
                None,
                Some(Duration::from_secs(5)),
            )?;
            ctx.setverdict(Verdict::Pass)?;
            tm_runtime::port_unmap(&port, &tsi)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(verdict, Verdict::Pass);
}

#[test]
fn mtc_verdict_is_the_supremum_of_finished_ptcs() {
    let runtime = Runtime::new();
    let verdict = TestCase::new("TC_VERDICTS")
        .execute(&runtime, |ctx| {
            let components: Vec<_> = [Verdict::Pass, Verdict::Inconc, Verdict::Pass]
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let ptc = ctx.create(Some(&format!("w{i}")), false);
                    ptc.start(move |ctx| ctx.setverdict(v)).map(|_| ptc)
                })
                .collect::<Result<_, _>>()?;
            for ptc in &components {
                ptc.done(ctx)?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(verdict, Verdict::Inconc);
}

#[test]
fn ats_cancellation_interrupts_between_testcases() {
    let runtime = Runtime::new();
    TestCase::new("TC_FIRST")
        .execute(&runtime, |ctx| {
            ctx.runtime().cancel();
            ctx.setverdict(Verdict::Pass)
        })
        .unwrap_err();
    // the ATS result reflects the cancellation
    assert_eq!(runtime.result_code(), tm_core::retcode::CANCELLED);
}

#[test]
fn any_or_none_matches_an_empty_tail_in_received_lists() {
    let runtime = Runtime::new();
    let verdict = TestCase::new("TC_WILDCARD")
        .execute(&runtime, |ctx| {
            let ptc = ctx.create(Some("peer"), false);
            let tx = ptc.port("tx");
            let rx = ctx.tc().port("rx");
            connect(&tx, &rx)?;
            tx.send(
                &Template::Value(Value::List(vec![Value::Int(1)])),
                None,
            )?;
            let template = Template::List(vec![Template::from(1i64), Template::AnyOrNone]);
            rx.receive(ctx, Some(template), None, None, Some(Duration::from_secs(5)))?;
            ctx.setverdict(Verdict::Pass)?;
            Ok(())
        })
        .unwrap();
    assert_eq!(verdict, Verdict::Pass);
}

#[test]
fn runtimes_are_isolated() {
    let a = Runtime::new();
    let b = Runtime::new();
    a.variables().set("PX_X", Value::Int(1));
    assert_eq!(b.variables().get("PX_X", None), None);
    drop(a);
    // b survives a's teardown
    TestCase::new("TC_B")
        .execute(&b, |ctx| ctx.setverdict(Verdict::Pass))
        .unwrap();
}

#[test]
fn loopback_adapter_does_not_keep_the_runtime_alive() {
    let runtime = Runtime::new();
    LoopbackAdapter::install(&runtime);
    let weak = Arc::downgrade(&runtime);
    drop(runtime);
    assert!(weak.upgrade().is_none());
}
