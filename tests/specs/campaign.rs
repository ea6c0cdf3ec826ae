//! Campaign orchestration, end to end.

use crate::prelude::*;
use std::time::{Duration, Instant};
use tm_core::{retcode, Branch, JobState};

#[test]
fn branch_selection_follows_the_child_result() {
    let server = Server::start();
    server.write_ats("a.ats", "exit 1\n");
    server.write_ats("b.ats", "exit 0\n");
    server.write_ats("c.ats", "exit 0\n");
    let campaign = server.submit_campaign(
        "branching.campaign",
        "ats /a.ats\n\ton_error ats /b.ats\n\tats /c.ats\n",
    );

    wait_for_state(&campaign, JobState::Complete, Duration::from_secs(15));
    // a completed campaign always reports 0
    assert_eq!(campaign.result(), Some(retcode::OK));

    let a = &campaign.children(Branch::Unconditional)[0];
    let b = &a.children(Branch::Error)[0];
    let c = &a.children(Branch::Success)[0];
    assert!(b.state().is_terminal(), "error branch ran");
    assert_eq!(c.state(), JobState::Waiting, "success branch skipped");

    // exactly one include marker per executed child
    let log = server.registry.job_log(campaign.id()).unwrap();
    assert_eq!(log.matches("<include").count(), 2);
    let a_log = a.log_filename().unwrap();
    let b_log = b.log_filename().unwrap();
    assert!(log.contains(&a_log));
    assert!(log.contains(&b_log));
}

#[test]
fn empty_campaign_completes_with_result_zero() {
    let server = Server::start();
    let campaign = server.submit_campaign("empty.campaign", "");
    wait_for_state(&campaign, JobState::Complete, Duration::from_secs(10));
    assert_eq!(campaign.result(), Some(retcode::OK));
}

#[test]
fn parallel_group_overlaps_its_children() {
    let server = Server::start();
    server.write_ats("sleep1.ats", "sleep 2\nexit 0\n");
    server.write_ats("sleep2.ats", "sleep 2\nexit 0\n");
    let campaign = server.submit_campaign(
        "parallel.campaign",
        "group phase\n\tats /sleep1.ats\n\tats /sleep2.ats\n",
    );

    wait_for_state(&campaign, JobState::Running, Duration::from_secs(10));
    let started = Instant::now();
    wait_for_state(&campaign, JobState::Complete, Duration::from_secs(15));
    // two 2s children in parallel: well under the sequential 4s
    assert!(
        started.elapsed() < Duration::from_millis(3500),
        "campaign took {:?}",
        started.elapsed()
    );
}

#[test]
fn output_sessions_chain_across_children() {
    let server = Server::start();
    server.write_ats(
        "producer.ats",
        "printf '{\"PX_TOKEN\": \"42\"}' > \"$TM_OUTPUT_SESSION\"\nexit 0\n",
    );
    server.write_ats(
        "consumer.ats",
        "grep -q '\"42\"' \"$TM_INPUT_SESSION\" || exit 12\nexit 0\n",
    );
    let campaign = server.submit_campaign(
        "chain.campaign",
        "ats /producer.ats\n\tats /consumer.ats\n",
    );

    wait_for_state(&campaign, JobState::Complete, Duration::from_secs(15));
    let producer = &campaign.children(Branch::Unconditional)[0];
    let consumer = &producer.children(Branch::Success)[0];
    assert_eq!(consumer.result(), Some(retcode::OK), "consumer saw the token");
}

#[test]
fn session_mapping_rewrites_parameters_for_a_child() {
    let server = Server::start();
    server.write_ats(
        "mapped.ats",
        "# @param PX_TARGET=nobody\ngrep -q 'sut-17' \"$TM_INPUT_SESSION\" || exit 12\nexit 0\n",
    );
    let campaign = server.submit_campaign(
        "mapping.campaign",
        "ats /mapped.ats with PX_TARGET=sut-17\n",
    );
    wait_for_state(&campaign, JobState::Complete, Duration::from_secs(15));
    let child = &campaign.children(Branch::Unconditional)[0];
    assert_eq!(child.result(), Some(retcode::OK));
}

#[test]
fn missing_child_source_selects_the_error_branch() {
    let server = Server::start();
    server.write_ats("rescue.ats", "exit 0\n");
    let campaign = server.submit_campaign(
        "missing.campaign",
        "ats /absent.ats\n\ton_error ats /rescue.ats\n",
    );
    wait_for_state(&campaign, JobState::Complete, Duration::from_secs(15));

    let absent = &campaign.children(Branch::Unconditional)[0];
    assert_eq!(absent.state(), JobState::Error);
    assert!(absent.result().map(|r| (20..=29).contains(&r)).unwrap_or(false));
    let rescue = &absent.children(Branch::Error)[0];
    assert_eq!(rescue.state(), JobState::Complete);
}
