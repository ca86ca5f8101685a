// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use martian_core::Fqname;
use serde_json::json;

fn overrides(entries: serde_json::Value) -> Overrides {
    Overrides::from_table(serde_json::from_value(entries).unwrap())
}

#[test]
fn keys_drop_pipestance_prefix() {
    let o = overrides(json!({"P.S": {"chunk.threads": 4}}));
    let fq = Fqname::top("some_ps", "P").child("S");
    let res = o.resources_for(&fq, "chunk", Default::default());
    assert_eq!(res.threads, Some(4));
}

#[test]
fn phase_scoping() {
    let o = overrides(json!({"P.S": {"split.mem_gb": 2, "join.mem_gb": 8}}));
    let fq = Fqname::top("ps", "P").child("S");
    assert_eq!(o.resources_for(&fq, "split", Default::default()).mem_gb, Some(2));
    assert_eq!(o.resources_for(&fq, "join", Default::default()).mem_gb, Some(8));
    assert_eq!(o.resources_for(&fq, "chunk", Default::default()).mem_gb, None);
}

#[test]
fn profile_maps_to_special() {
    let o = overrides(json!({"P.S": {"chunk.profile": "highmem"}}));
    let fq = Fqname::top("ps", "P").child("S");
    assert_eq!(o.resources_for(&fq, "chunk", Default::default()).special.as_deref(), Some("highmem"));
}

#[test]
fn invalid_values_are_ignored() {
    let o = overrides(json!({"P.S": {"chunk.threads": "four", "chunk.mem_gb": 3}}));
    let fq = Fqname::top("ps", "P").child("S");
    let res = o.resources_for(&fq, "chunk", Default::default());
    assert_eq!(res.threads, None);
    assert_eq!(res.mem_gb, Some(3));
}

#[test]
fn overrides_beat_base_values() {
    let o = overrides(json!({"P.S": {"chunk.threads": 8}}));
    let fq = Fqname::top("ps", "P").child("S");
    let base = martian_core::JobResources::new(2, 4);
    let res = o.resources_for(&fq, "chunk", base);
    assert_eq!(res.threads, Some(8));
    assert_eq!(res.mem_gb, Some(4));
}

#[test]
fn load_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overrides.json");
    std::fs::write(&path, "[]").unwrap();
    assert!(matches!(Overrides::load(&path), Err(OverridesError::Parse { .. })));
}

#[test]
fn load_reads_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overrides.json");
    std::fs::write(&path, r#"{"P.S": {"join.threads": 16}}"#).unwrap();
    let o = Overrides::load(&path).unwrap();
    let fq = Fqname::top("ps", "P").child("S");
    assert_eq!(o.resources_for(&fq, "join", Default::default()).threads, Some(16));
}
