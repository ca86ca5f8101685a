// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use martian_core::{FakeClock, MetadataState};

fn chunk(index: usize, uniq: Option<&str>) -> (tempfile::TempDir, Chunk) {
    let dir = tempfile::tempdir().unwrap();
    let chunk = Chunk::new(
        &Fqname::top("ps", "P").child("S").child("fork0"),
        &dir.path().join("fork0"),
        index,
        ChunkDef::default(),
        uniq.map(str::to_string),
        Arc::new(FakeClock::new()),
    );
    (dir, chunk)
}

#[test]
fn chunk_dir_includes_uniquifier() {
    let (dir, plain) = chunk(0, None);
    assert_eq!(plain.metadata().path(), dir.path().join("fork0/chnk0"));
    let (dir, uniq) = chunk(2, Some("abcdef0123"));
    assert_eq!(uniq.metadata().path(), dir.path().join("fork0/chnk2.uabcdef0123"));
}

#[test]
fn journal_matching_requires_index_and_uniquifier() {
    let (_dir, plain) = chunk(1, None);
    assert!(plain.matches_journal(1, None));
    assert!(!plain.matches_journal(0, None));
    assert!(!plain.matches_journal(1, Some("abcdef0123")));

    let (_dir, uniq) = chunk(1, Some("abcdef0123"));
    assert!(uniq.matches_journal(1, Some("abcdef0123")));
    assert!(!uniq.matches_journal(1, None));
}

#[test]
fn fresh_chunk_is_ready() {
    let (_dir, c) = chunk(0, None);
    assert_eq!(c.state(), MetadataState::Ready);
}
