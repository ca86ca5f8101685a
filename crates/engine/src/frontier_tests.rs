// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn add_remove_contains() {
    let frontier = Frontier::new();
    assert!(frontier.is_empty());
    frontier.add(NodeId(2));
    frontier.add(NodeId(0));
    assert!(frontier.contains(NodeId(0)));
    assert_eq!(frontier.len(), 2);
    frontier.remove(NodeId(0));
    assert!(!frontier.contains(NodeId(0)));
}

#[test]
fn snapshot_is_sorted() {
    let frontier = Frontier::new();
    for i in [3, 1, 2, 0] {
        frontier.add(NodeId(i));
    }
    assert_eq!(frontier.snapshot(), vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)]);
}

#[test]
fn add_is_idempotent() {
    let frontier = Frontier::new();
    frontier.add(NodeId(1));
    frontier.add(NodeId(1));
    assert_eq!(frontier.len(), 1);
}
