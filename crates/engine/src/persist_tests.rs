// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample(id: u64) -> PersistedJob {
    PersistedJob {
        id: JobId(id),
        name: format!("job-{id}.ats"),
        job_type: JobType::Ats,
        state: JobState::Complete,
        result: Some(0),
        username: "alice".to_string(),
        path: Some(format!("/repository/job-{id}.ats")),
        log_filename: None,
        scheduled_at: 1_700_000_000.0,
        scheduled_session: SessionParameters::new(),
        mapping: SessionParameters::new(),
        output_session: SessionParameters::new(),
        start_time: Some(1_700_000_001.0),
        stop_time: Some(1_700_000_002.0),
        parent_id: None,
        branch: None,
        source: Some("exit 0\n".to_string()),
        selected_groups: Vec::new(),
    }
}

#[test]
fn save_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("var").join(QUEUE_FILENAME);
    let jobs = vec![sample(1), sample(2)];
    save(&path, &jobs).unwrap();
    let loaded = load(&path).unwrap().unwrap();
    assert_eq!(loaded, jobs);
}

#[test]
fn load_of_missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load(&dir.path().join("absent.json")).unwrap().is_none());
}

#[test]
fn corrupt_file_moves_to_bak() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(QUEUE_FILENAME);
    std::fs::write(&path, "{ not json").unwrap();

    assert!(load(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn save_overwrites_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(QUEUE_FILENAME);
    save(&path, &[sample(1)]).unwrap();
    save(&path, &[sample(1), sample(2)]).unwrap();
    assert_eq!(load(&path).unwrap().unwrap().len(), 2);
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn optional_collections_default_on_old_snapshots() {
    // a snapshot written before the session fields existed still loads
    let json = r#"[{
        "id": 1, "name": "a.ats", "job_type": "ats", "state": "complete",
        "result": 0, "username": "u", "path": null, "log_filename": null,
        "scheduled_at": 0.0, "start_time": null, "stop_time": 1.0,
        "parent_id": null, "branch": null, "source": null
    }]"#;
    let jobs: Vec<PersistedJob> = serde_json::from_str(json).unwrap();
    assert!(jobs[0].scheduled_session.is_empty());
    assert!(jobs[0].selected_groups.is_empty());
}
