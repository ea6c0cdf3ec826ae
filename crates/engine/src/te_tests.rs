// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn metadata_parses_params_and_api() {
    let source = "\
# @api script.v1
# @param PX_HOST=sut-1
# @param PX_PORT=5060
echo hello
";
    let factory = ScriptTeFactory::new("/bin/sh");
    let metadata = factory.metadata(source).unwrap();
    assert_eq!(metadata.api.as_deref(), Some("script.v1"));
    assert_eq!(metadata.signature.len(), 2);
    assert_eq!(
        metadata.signature.get("PX_HOST").map(|s| s.default_value.as_str()),
        Some("sut-1")
    );
}

#[test]
fn metadata_of_plain_source_is_empty() {
    let factory = ScriptTeFactory::new("/bin/sh");
    let metadata = factory.metadata("echo hi\n").unwrap();
    assert!(metadata.api.is_none());
    assert!(metadata.signature.is_empty());
}

#[test]
fn check_syntax_rejects_empty_te() {
    let factory = ScriptTeFactory::new("/bin/sh");
    assert!(factory.check_syntax("  \n").is_err());
    assert!(factory.check_syntax("exit 0\n").is_ok());
}

#[test]
fn command_line_carries_the_session_plumbing() {
    let factory = ScriptTeFactory::new("/bin/sh");
    let command = factory.command_line(&TeCommandSpec {
        job_id: 7,
        te_filename: "/a/src/__main__".into(),
        log_filename: "/a/x.log".into(),
        input_session_filename: "/a/in.session".into(),
        output_session_filename: "/a/out.session".into(),
        selected_groups: vec!["sanity".to_string()],
    });
    assert_eq!(command.executable, std::path::PathBuf::from("/bin/sh"));
    assert_eq!(command.args, vec!["/a/src/__main__".to_string()]);
    let env: HashMap<_, _> = command.env.iter().cloned().collect();
    assert_eq!(env.get("TM_JOB_ID").map(String::as_str), Some("7"));
    assert_eq!(
        env.get("TM_OUTPUT_SESSION").map(String::as_str),
        Some("/a/out.session")
    );
    assert_eq!(
        env.get("TM_SELECTED_GROUPS").map(String::as_str),
        Some("sanity")
    );
}

#[test]
fn session_files_round_trip() {
    let mut session = SessionParameters::new();
    session.insert("PX_HOST".to_string(), "sut-1".to_string());
    let dumped = dump_session(&session).unwrap();
    assert_eq!(load_session(&dumped).unwrap(), session);
}

#[test]
fn resolver_walks_imports_recursively() {
    let root = tempfile::tempdir().unwrap();
    let repo = root.path().join("repository");
    std::fs::create_dir_all(repo.join("lib")).unwrap();
    std::fs::write(repo.join("lib/a.ats"), "import b\necho a\n").unwrap();
    std::fs::write(repo.join("lib/b.ats"), "echo b\n").unwrap();

    let resolver = ImportResolver;
    let deps = resolver
        .resolve("import lib/a\n", "/repository/main.ats", root.path())
        .unwrap();
    assert_eq!(
        deps,
        vec![
            "/repository/lib/a.ats".to_string(),
            "/repository/lib/b.ats".to_string(),
        ]
    );
}

#[test]
fn resolver_reports_missing_dependencies() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("repository")).unwrap();
    let resolver = ImportResolver;
    let result = resolver.resolve("import nope\n", "/repository/main.ats", root.path());
    assert!(matches!(result, Err(crate::error::ResolveError::Missing(_))));
}

#[test]
fn resolver_detects_cycles() {
    let root = tempfile::tempdir().unwrap();
    let repo = root.path().join("repository");
    std::fs::create_dir_all(&repo).unwrap();
    std::fs::write(repo.join("a.ats"), "import b\n").unwrap();
    std::fs::write(repo.join("b.ats"), "import a\n").unwrap();

    let resolver = ImportResolver;
    let result = resolver.resolve("import a\n", "/repository/main.ats", root.path());
    assert!(matches!(
        result,
        Err(crate::error::ResolveError::CyclicDependency(_))
    ));
}

#[test]
fn diamond_dependencies_resolve_once() {
    let root = tempfile::tempdir().unwrap();
    let repo = root.path().join("repository");
    std::fs::create_dir_all(&repo).unwrap();
    std::fs::write(repo.join("a.ats"), "import d\n").unwrap();
    std::fs::write(repo.join("b.ats"), "import d\n").unwrap();
    std::fs::write(repo.join("d.ats"), "echo d\n").unwrap();

    let resolver = ImportResolver;
    let deps = resolver
        .resolve("import a\nimport b\n", "/repository/main.ats", root.path())
        .unwrap();
    assert_eq!(
        deps.iter().filter(|d| d.ends_with("d.ats")).count(),
        1,
        "shared dependency packaged once"
    );
}
