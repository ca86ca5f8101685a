// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn top_level_fqname() {
    let fq = Fqname::top("PS1", "ANALYZER");
    assert_eq!(fq.as_str(), "ID.PS1.ANALYZER");
    assert_eq!(fq.psid(), Some("PS1"));
    assert_eq!(fq.base(), "ANALYZER");
}

#[test]
fn child_fqname() {
    let fq = Fqname::top("PS1", "ANALYZER").child("SORT");
    assert_eq!(fq.as_str(), "ID.PS1.ANALYZER.SORT");
    assert_eq!(fq.psid(), Some("PS1"));
    assert_eq!(fq.base(), "SORT");
}

#[test]
fn psid_requires_id_prefix() {
    let fq = Fqname::from_string("BOGUS.PS1.X");
    assert_eq!(fq.psid(), None);
}

#[test]
fn contains_self_and_descendants() {
    let parent = Fqname::top("PS1", "P");
    let child = parent.child("S");
    assert!(parent.contains(&parent));
    assert!(parent.contains(&child));
    assert!(!child.contains(&parent));
    // Prefix of a component is not an ancestor
    let sibling = Fqname::from_string("ID.PS1.P2");
    assert!(!parent.contains(&sibling));
}

#[test]
fn serde_transparent() {
    let fq = Fqname::top("PS1", "P");
    let json = serde_json::to_string(&fq).unwrap();
    assert_eq!(json, "\"ID.PS1.P\"");
    let back: Fqname = serde_json::from_str(&json).unwrap();
    assert_eq!(back, fq);
}

#[yare::parameterized(
    fork_zero = { 0, "fork0" },
    fork_ten = { 10, "fork10" },
)]
fn fork_dir_names(index: usize, expect: &str) {
    assert_eq!(fork_dir_name(index), expect);
}

#[test]
fn chunk_dir_names() {
    assert_eq!(chunk_dir_name(0, None), "chnk0");
    assert_eq!(chunk_dir_name(3, Some("0123456789")), "chnk3.u0123456789");
}
