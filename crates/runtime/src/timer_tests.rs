// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::Runtime;
use crate::testcase::TestCase;

fn run<F: FnOnce(&mut TcContext)>(f: F) {
    let runtime = Runtime::new();
    TestCase::new("TimerFixture")
        .execute(&runtime, |ctx| {
            f(ctx);
            Ok(())
        })
        .unwrap();
}

#[test]
fn timer_posts_timeout_event_on_expiry() {
    run(|ctx| {
        let timer = Timer::new(ctx, Some(Duration::from_millis(20)), Some("t"));
        timer.start(None).unwrap();
        assert!(timer.running());
        timer.timeout(ctx).unwrap();
        assert!(!timer.running());
    });
}

#[test]
fn timeout_returns_immediately_when_not_started() {
    run(|ctx| {
        let timer = Timer::new(ctx, Some(Duration::from_secs(3600)), Some("t"));
        let start = Instant::now();
        timer.timeout(ctx).unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    });
}

#[test]
fn start_without_duration_anywhere_is_an_error() {
    run(|ctx| {
        let timer = Timer::new(ctx, None, Some("t"));
        assert!(timer.start(None).is_err());
    });
}

#[test]
fn zero_duration_timer_fires_promptly() {
    run(|ctx| {
        let timer = Timer::new(ctx, Some(Duration::ZERO), Some("t"));
        timer.start(None).unwrap();
        let start = Instant::now();
        timer.timeout(ctx).unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    });
}

#[test]
fn restart_removes_stale_timeout_from_system_queue() {
    run(|ctx| {
        let runtime = ctx.runtime();
        let timer = Timer::new(ctx, Some(Duration::from_millis(10)), Some("t"));
        timer.start(None).unwrap();
        // wait for the expiry to land in the queue
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(runtime.system_queue().len(), 1);

        // restart: the stale timeout state must disappear
        timer.start(Some(Duration::from_secs(3600))).unwrap();
        assert_eq!(runtime.system_queue().len(), 0);
        assert!(timer.running());
        timer.stop();
    });
}

#[test]
fn stopped_timer_does_not_fire() {
    run(|ctx| {
        let runtime = ctx.runtime();
        let timer = Timer::new(ctx, Some(Duration::from_millis(50)), Some("t"));
        timer.start(None).unwrap();
        timer.stop();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(runtime.system_queue().len(), 0);
        assert_eq!(timer.read(), Duration::ZERO);
    });
}

#[test]
fn read_reports_elapsed_time_while_running() {
    run(|ctx| {
        let timer = Timer::new(ctx, Some(Duration::from_secs(3600)), Some("t"));
        timer.start(None).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(timer.read() >= Duration::from_millis(20));
        timer.stop();
    });
}
