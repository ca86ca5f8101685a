// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn override_set_fields_win() {
    let base = JobResources::new(1, 4);
    let over = JobResources { threads: Some(8), ..Default::default() };
    let merged = base.overridden_by(over);
    assert_eq!(merged.threads, Some(8));
    assert_eq!(merged.mem_gb, Some(4));
}

#[test]
fn override_unset_fields_pass_through() {
    let base = JobResources { special: Some("gpu".to_string()), ..JobResources::new(2, 8) };
    let merged = base.clone().overridden_by(JobResources::default());
    assert_eq!(merged, base);
}

#[test]
fn defaults_fill_only_unset() {
    let res = JobResources { threads: Some(4), ..Default::default() };
    let filled = res.with_defaults(1, 6);
    assert_eq!(filled.threads, Some(4));
    assert_eq!(filled.mem_gb, Some(6));
}

#[test]
fn serde_skips_unset_fields() {
    let json = serde_json::to_string(&JobResources::new(2, 8)).unwrap();
    assert_eq!(json, r#"{"threads":2,"mem_gb":8}"#);
}
