// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    complete = { MetadataState::Complete, true },
    disabled = { MetadataState::DisabledState, true },
    running = { MetadataState::Running, false },
    failed = { MetadataState::Failed, false },
    waiting = { MetadataState::Waiting, false },
)]
fn done_states(state: MetadataState, expect: bool) {
    assert_eq!(state.is_done(), expect);
}

#[yare::parameterized(
    queued = { MetadataState::Queued, true },
    queued_locally = { MetadataState::QueuedLocally, true },
    running = { MetadataState::Running, true },
    ready = { MetadataState::Ready, false },
    complete = { MetadataState::Complete, false },
)]
fn in_flight_states(state: MetadataState, expect: bool) {
    assert_eq!(state.is_in_flight(), expect);
}

#[test]
fn display_collapses_local_queueing() {
    assert_eq!(MetadataState::Queued.to_string(), "queued");
    assert_eq!(MetadataState::QueuedLocally.to_string(), "queued");
    assert_eq!(MetadataState::DisabledState.to_string(), "disabled");
}

#[test]
fn serde_round_trip() {
    let json = serde_json::to_string(&MetadataState::ForkWaiting).unwrap();
    assert_eq!(json, "\"fork_waiting\"");
    let back: MetadataState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, MetadataState::ForkWaiting);
}
