// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::env::{EngineConfig, EngineEnv};
use crate::job::JobKind;
use tm_core::retcode;

fn harness() -> (tempfile::TempDir, Arc<JobRegistry>) {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("repository")).unwrap();
    let config = EngineConfig::new(root.path()).with_var_root(root.path().join("var"));
    let registry = JobRegistry::new(EngineEnv::new(config));
    (root, registry)
}

#[test]
fn submit_prepares_and_queues() {
    let (_root, registry) = harness();
    let job = Job::new_ats(registry.env(), "a.ats", Some("exit 0\n".to_string()), None);
    let id = registry.submit(Arc::clone(&job)).unwrap();
    assert_eq!(id, job.id());
    assert_eq!(job.state(), JobState::Waiting);
    assert_eq!(registry.job_info(None).len(), 1);
}

#[test]
fn submit_surfaces_preparation_errors_synchronously() {
    let (_root, registry) = harness();
    let job = Job::new_ats(registry.env(), "bad.ats", Some(" \n".to_string()), None);
    let err = registry.submit(Arc::clone(&job)).unwrap_err();
    match err {
        EngineError::Prepare(e) => assert!((20..=29).contains(&e.code)),
        other => panic!("unexpected error: {other}"),
    }
    // the failed job stays visible in the queue
    assert_eq!(registry.job_info(Some(job.id())).len(), 1);
    assert_eq!(job.state(), JobState::Error);
}

#[test]
fn scheduler_starts_due_jobs() {
    let (_root, registry) = harness();
    registry.start();
    let job = Job::new_ats(registry.env(), "a.ats", Some("exit 0\n".to_string()), None);
    job.set_username("u");
    job.set_scheduled_start(Some(registry.env().clock.epoch() - 1.0));
    registry.submit(Arc::clone(&job)).unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while !job.state().is_terminal() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    assert_eq!(job.state(), JobState::Complete);
    assert_eq!(job.result(), Some(retcode::OK));
    registry.stop();
}

#[test]
fn future_jobs_stay_waiting() {
    let (_root, registry) = harness();
    registry.start();
    let job = Job::new_ats(registry.env(), "later.ats", Some("exit 0\n".to_string()), None);
    job.set_scheduled_start(Some(registry.env().clock.epoch() + 3600.0));
    registry.submit(Arc::clone(&job)).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(1500));
    assert_eq!(job.state(), JobState::Waiting);
    registry.stop();
}

#[test]
fn send_signal_dispatches_and_reports_unknown_ids() {
    let (_root, registry) = harness();
    let job = Job::new_ats(registry.env(), "a.ats", Some("exit 0\n".to_string()), None);
    registry.submit(Arc::clone(&job)).unwrap();

    assert!(registry.send_signal(job.id(), tm_core::JobSignal::Cancel));
    assert_eq!(job.state(), JobState::Cancelled);
    assert!(!registry.send_signal(tm_core::JobId(9999), tm_core::JobSignal::Cancel));
}

#[test]
fn reschedule_only_works_before_start() {
    let (_root, registry) = harness();
    let job = Job::new_ats(registry.env(), "a.ats", Some("exit 0\n".to_string()), None);
    let future = registry.env().clock.epoch() + 3600.0;
    job.set_scheduled_start(Some(future));
    registry.submit(Arc::clone(&job)).unwrap();
    assert!(registry.reschedule(job.id(), future + 60.0));
    assert!(!registry.reschedule(tm_core::JobId(9999), future));
}

#[test]
fn purge_requires_terminal_ancestry_and_age() {
    let (_root, registry) = harness();
    let env = registry.env().clone();
    let parent = Job::new_campaign(&env, "c.campaign", Some(String::new()), None);
    let child = Job::new_ats(&env, "a.ats", Some("exit 0\n".to_string()), None);
    parent.add_child(&child, tm_core::Branch::Unconditional);
    registry.register(Arc::clone(&parent));
    registry.register(Arc::clone(&child));

    // child terminal, parent still alive: nothing purged
    child.set_state(JobState::Error);
    let cutoff = env.clock.epoch() + 10.0;
    assert_eq!(registry.purge(cutoff), 0);

    // parent terminal too: both become purgeable
    parent.set_state(JobState::Complete);
    assert_eq!(registry.purge(cutoff), 2);
    assert!(registry.jobs().is_empty());
}

#[test]
fn purge_keeps_recent_jobs() {
    let (_root, registry) = harness();
    let job = Job::new_ats(registry.env(), "a.ats", Some("exit 0\n".to_string()), None);
    registry.register(Arc::clone(&job));
    job.set_state(JobState::Complete);
    // cutoff before the stop time
    assert_eq!(registry.purge(job.stop_time().unwrap() - 10.0), 0);
    assert_eq!(registry.jobs().len(), 1);
}

#[test]
fn persist_and_restore_round_trip() {
    let (root, registry) = harness();
    let done = Job::new_ats(registry.env(), "done.ats", Some("exit 0\n".to_string()), None);
    let running = Job::new_ats(registry.env(), "run.ats", Some("exit 0\n".to_string()), None);
    registry.register(Arc::clone(&done));
    registry.register(Arc::clone(&running));
    done.set_state(JobState::Complete);
    running.set_state(JobState::Running);
    let max_id = running.id();
    registry.persist().unwrap();

    // a fresh registry over the same state dir sees the same jobs
    let config = EngineConfig::new(root.path()).with_var_root(root.path().join("var"));
    let reborn = JobRegistry::new(EngineEnv::new(config));
    let jobs = reborn.jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].state(), JobState::Complete);
    assert_eq!(jobs[1].state(), JobState::Crashed, "running jobs crash on restart");

    // ids continue past the recovered maximum
    let next = Job::new_ats(reborn.env(), "new.ats", Some("exit 0\n".to_string()), None);
    assert!(next.id() > max_id);
}

#[test]
fn restore_relinks_parents() {
    let (root, registry) = harness();
    let parent = Job::new_campaign(registry.env(), "c.campaign", Some(String::new()), None);
    let child = Job::new_ats(registry.env(), "a.ats", Some("exit 0\n".to_string()), None);
    parent.add_child(&child, tm_core::Branch::Success);
    registry.register(Arc::clone(&parent));
    registry.register(Arc::clone(&child));
    parent.set_state(JobState::Complete);
    child.set_state(JobState::Complete);
    registry.persist().unwrap();

    let config = EngineConfig::new(root.path()).with_var_root(root.path().join("var"));
    let reborn = JobRegistry::new(EngineEnv::new(config));
    let restored_child = reborn.get(child.id()).unwrap();
    assert_eq!(restored_child.parent().unwrap().id(), parent.id());
    let restored_parent = reborn.get(parent.id()).unwrap();
    assert_eq!(
        restored_parent.branch_of(&restored_child),
        Some(tm_core::Branch::Success)
    );
}

#[test]
fn job_details_expose_the_source() {
    let (_root, registry) = harness();
    let job = Job::new_ats(registry.env(), "a.ats", Some("exit 0\n".to_string()), None);
    registry.submit(Arc::clone(&job)).unwrap();
    let details = registry.job_details(job.id()).unwrap();
    assert_eq!(details.source.as_deref(), Some("exit 0\n"));
    if let JobKind::Ats(_) = job.kind() {
    } else {
        panic!("kind mismatch");
    }
}
