// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ids_strictly_increase() {
    let gen = JobIdGen::new();
    let a = gen.next();
    let b = gen.next();
    let c = gen.next();
    assert!(a < b && b < c);
    assert_eq!(a, JobId(1));
}

#[test]
fn advance_to_skips_past_persisted_ids() {
    let gen = JobIdGen::new();
    gen.advance_to(JobId(41));
    assert_eq!(gen.next(), JobId(42));
}

#[test]
fn advance_to_never_goes_backwards() {
    let gen = JobIdGen::new();
    gen.advance_to(JobId(10));
    gen.advance_to(JobId(3));
    assert_eq!(gen.next(), JobId(11));
}

#[test]
fn uri_format() {
    assert_eq!(JobId(7).uri(), "job:7");
}

#[test]
fn serde_is_transparent() {
    let id = JobId(12);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "12");
    let back: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
