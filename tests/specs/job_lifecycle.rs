//! ATS job life cycle, end to end through the scheduler.

use crate::prelude::*;
use std::time::Duration;
use tm_core::{retcode, JobSignal, JobState};

#[test]
fn simple_ats_runs_to_completion() {
    let server = Server::start();
    let job = server.submit_ats("simple.ats", "exit 0\n");
    assert_eq!(job.state(), JobState::Waiting);

    wait_for_state(&job, JobState::Complete, Duration::from_secs(10));
    assert_eq!(job.result(), Some(retcode::OK));
    assert!(job.output_session().is_empty());
    // the log filename is assigned even if the TE never wrote to it
    let log = job.log_filename().unwrap();
    assert!(log.starts_with("/archives/simple.ats/"));
    // info reflects the terminal state
    let info = &server.registry.job_info(Some(job.id()))[0];
    assert_eq!(info.state, JobState::Complete);
    assert!(info.stop_time.is_some());
    assert!(info.running_time.is_some());
}

#[test]
fn cancelling_a_waiting_job_never_forks() {
    let server = Server::start();
    let job = tm_engine::Job::new_ats(
        server.env(),
        "later.ats",
        Some("exit 0\n".to_string()),
        None,
    );
    job.set_username("spec");
    // scheduled 60s in the future: stays waiting
    job.set_scheduled_start(Some(server.env().clock.epoch() + 60.0));
    server.registry.submit(std::sync::Arc::clone(&job)).unwrap();
    assert_eq!(job.state(), JobState::Waiting);

    server.registry.send_signal(job.id(), JobSignal::Cancel);
    assert_eq!(job.state(), JobState::Cancelled);
    assert_eq!(job.result(), Some(retcode::CANCELLED));
    // no TE was forked, so no start time was ever assigned
    assert!(job.start_time().is_none());
}

#[test]
fn killing_a_running_te() {
    let server = Server::start();
    // a TE blocked for an hour; only a kill can end it
    let job = server.submit_ats("stuck.ats", "sleep 3600\n");
    wait_for_state(&job, JobState::Running, Duration::from_secs(10));

    let killed_at = std::time::Instant::now();
    server.registry.send_signal(job.id(), JobSignal::Kill);
    wait_for_state(&job, JobState::Killed, Duration::from_secs(5));
    assert!(killed_at.elapsed() < Duration::from_secs(5));
    assert_eq!(job.result(), Some(retcode::KILLED));
}

#[test]
fn pause_and_resume_a_running_te() {
    let server = Server::start();
    let job = server.submit_ats("pausable.ats", "sleep 2\nexit 0\n");
    wait_for_state(&job, JobState::Running, Duration::from_secs(10));

    server.registry.send_signal(job.id(), JobSignal::Pause);
    wait_for_state(&job, JobState::Paused, Duration::from_secs(5));

    server.registry.send_signal(job.id(), JobSignal::Resume);
    wait_for_state(&job, JobState::Running, Duration::from_secs(5));
    wait_for_state(&job, JobState::Complete, Duration::from_secs(10));
}

#[test]
fn restart_recovery_preserves_the_queue() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("repository")).unwrap();

    let submitted_ids = {
        let config = tm_engine::EngineConfig::new(root.path())
            .with_var_root(root.path().join("var"))
            .with_scheduler_interval(Duration::from_millis(100));
        let registry = tm_engine::JobRegistry::new(tm_engine::EngineEnv::new(config));
        registry.start();

        let done = tm_engine::Job::new_ats(
            registry.env(),
            "done.ats",
            Some("exit 0\n".to_string()),
            None,
        );
        done.set_username("spec");
        done.set_scheduled_start(Some(registry.env().clock.epoch() - 1.0));
        registry.submit(std::sync::Arc::clone(&done)).unwrap();
        wait_for_state(&done, JobState::Complete, Duration::from_secs(10));

        let pending = tm_engine::Job::new_ats(
            registry.env(),
            "pending.ats",
            Some("exit 0\n".to_string()),
            None,
        );
        pending.set_scheduled_start(Some(registry.env().clock.epoch() + 3600.0));
        registry.submit(std::sync::Arc::clone(&pending)).unwrap();

        // simulate an in-flight job at shutdown time
        let inflight = tm_engine::Job::new_ats(
            registry.env(),
            "inflight.ats",
            Some("exit 0\n".to_string()),
            None,
        );
        registry.register(std::sync::Arc::clone(&inflight));
        inflight.set_state(JobState::Running);

        registry.stop();
        vec![done.id(), pending.id(), inflight.id()]
    };

    // restart over the same state directory
    let config = tm_engine::EngineConfig::new(root.path())
        .with_var_root(root.path().join("var"));
    let registry = tm_engine::JobRegistry::new(tm_engine::EngineEnv::new(config));
    let jobs = registry.jobs();
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0].state(), JobState::Complete);
    assert_eq!(jobs[1].state(), JobState::Waiting);
    assert_eq!(jobs[2].state(), JobState::Crashed);

    // ids are never reused within a server lifetime
    let fresh = tm_engine::Job::new_ats(
        registry.env(),
        "fresh.ats",
        Some("exit 0\n".to_string()),
        None,
    );
    assert!(fresh.id() > *submitted_ids.iter().max().unwrap());
}

#[test]
fn job_log_reads_as_a_well_formed_document() {
    let server = Server::start();
    let job = server.submit_ats(
        "logging.ats",
        "printf '<event class=\"user\">hello</event>\\n' >> \"$TM_LOG_FILENAME\"\nexit 0\n",
    );
    wait_for_state(&job, JobState::Complete, Duration::from_secs(10));

    let log = server.registry.job_log(job.id()).unwrap();
    assert!(log.contains("<ats>"));
    assert!(log.contains("hello"));
    assert!(log.trim_end().ends_with("</ats>"));
}

#[test]
fn action_performed_reaches_the_te_as_usr1() {
    let server = Server::start();
    // the TE acknowledges USR1 by exiting cleanly
    let source = "trap 'exit 0' USR1\nwhile true; do sleep 0.1; done\n";
    let job = server.submit_ats("action.ats", source);
    wait_for_state(&job, JobState::Running, Duration::from_secs(10));

    server
        .registry
        .send_signal(job.id(), JobSignal::ActionPerformed);
    wait_for_state(&job, JobState::Complete, Duration::from_secs(10));
}
