// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use martian_core::{FakeClock, Fqname};
use serde_json::json;
use std::time::Duration;

fn metadata_in(dir: &Path, clock: &FakeClock) -> Metadata {
    let md = Metadata::new(
        Fqname::top("PS", "P").child("S"),
        dir.join("S").join("fork0"),
        Arc::new(clock.clone()),
    );
    md.make_dirs().unwrap();
    md
}

#[test]
fn write_then_exists_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);

    assert!(!md.exists(MetadataKind::Outs));
    md.write(MetadataKind::Outs, &json!({"y": 2})).unwrap();
    assert!(md.exists(MetadataKind::Outs));
    let outs: serde_json::Value = md.read(MetadataKind::Outs).unwrap();
    assert_eq!(outs, json!({"y": 2}));
}

#[test]
fn write_is_atomic_no_tmp_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);
    md.write_raw(MetadataKind::Args, "{}").unwrap();
    let leftovers: Vec<_> = std::fs::read_dir(md.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    assert!(md.make_path(MetadataKind::Args).exists());
}

#[test]
fn cached_absence_is_invalidated_by_end_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);

    // Cache a negative observation at t0
    assert!(!md.exists(MetadataKind::Complete));
    let t0 = clock.epoch_ms();

    // The file lands behind the cache's back (another process wrote it)
    std::fs::write(md.make_path(MetadataKind::Complete), "").unwrap();
    assert!(!md.exists(MetadataKind::Complete), "stale cache still wins");

    // end_refresh with a start after the observation drops the stale miss
    clock.advance(Duration::from_millis(10));
    md.end_refresh(t0 + 1);
    assert!(md.exists(MetadataKind::Complete));
}

#[test]
fn end_refresh_keeps_fresh_negatives() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);
    clock.set_epoch_ms(5_000);
    assert!(!md.exists(MetadataKind::Complete));
    // A start before the observation keeps the entry
    md.end_refresh(4_000);
    std::fs::write(md.make_path(MetadataKind::Complete), "").unwrap();
    assert!(!md.exists(MetadataKind::Complete), "fresh negative is authoritative");
}

#[test]
fn cache_insert_reflects_journal_updates() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);
    assert!(!md.exists(MetadataKind::Complete));
    md.cache_insert(MetadataKind::Complete);
    assert!(md.exists(MetadataKind::Complete));
}

#[test]
fn load_cache_scans_directory_once() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);
    std::fs::write(md.make_path(MetadataKind::Errors), "boom").unwrap();
    md.load_cache();
    assert!(md.exists(MetadataKind::Errors));
    assert!(!md.exists(MetadataKind::Complete));
}

#[test]
fn get_state_prefers_failure() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);
    assert_eq!(md.get_state(), None);

    md.write_raw(MetadataKind::JobInfo, "{}").unwrap();
    assert_eq!(md.get_state(), Some(MetadataState::Queued));

    md.write_raw(MetadataKind::Log, "").unwrap();
    assert_eq!(md.get_state(), Some(MetadataState::Running));

    md.write_raw(MetadataKind::Complete, "").unwrap();
    assert_eq!(md.get_state(), Some(MetadataState::Complete));

    md.write_raw(MetadataKind::Errors, "boom").unwrap();
    assert_eq!(md.get_state(), Some(MetadataState::Failed));
}

#[test]
fn read_cap_rejects_oversized_files() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);
    md.write_raw(MetadataKind::Outs, "1234567890").unwrap();
    let err = md.read_raw_with_cap(MetadataKind::Outs, 4);
    assert!(matches!(err, Err(MetadataError::TooLarge { size: 10, cap: 4, .. })));

    let err = md.read_with_cap::<serde_json::Value>(MetadataKind::Outs, 4);
    assert!(matches!(err, Err(MetadataError::TooLarge { .. })));
    let ok: serde_json::Value = md.read_with_cap(MetadataKind::Outs, 64).unwrap();
    assert_eq!(ok, serde_json::json!(1234567890));
}

#[test]
fn remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);
    md.write_raw(MetadataKind::Errors, "x").unwrap();
    md.remove(MetadataKind::Errors).unwrap();
    md.remove(MetadataKind::Errors).unwrap();
    assert!(!md.exists(MetadataKind::Errors));
}

#[test]
fn heartbeat_expiry_synthesizes_failure() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::at_system_time();
    let md = metadata_in(dir.path(), &clock);
    md.write_raw(MetadataKind::Log, "").unwrap();
    md.write_raw(MetadataKind::Heartbeat, "").unwrap();

    // Fresh heartbeat: no failure
    assert!(!md.check_heartbeat().unwrap());

    // Push the clock past the threshold
    clock.advance(Duration::from_secs(HEARTBEAT_TIMEOUT_MINUTES * 60 + 60));
    assert!(md.check_heartbeat().unwrap());
    assert_eq!(md.get_state(), Some(MetadataState::Failed));
    let msg = md.read_raw(MetadataKind::Errors).unwrap();
    assert!(msg.contains("job has not updated heartbeat in"), "got {:?}", msg);
}

#[test]
fn heartbeat_ignores_completed_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::at_system_time();
    let md = metadata_in(dir.path(), &clock);
    md.write_raw(MetadataKind::Heartbeat, "").unwrap();
    md.write_raw(MetadataKind::Complete, "").unwrap();
    clock.advance(Duration::from_secs(HEARTBEAT_TIMEOUT_MINUTES * 60 + 60));
    assert!(!md.check_heartbeat().unwrap());
}

#[test]
fn remove_all_clears_directory_and_cache() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let md = metadata_in(dir.path(), &clock);
    md.write_raw(MetadataKind::Complete, "").unwrap();
    md.remove_all().unwrap();
    assert!(!md.path().exists());
    assert!(!md.exists(MetadataKind::Complete));
    // Idempotent
    md.remove_all().unwrap();
}
