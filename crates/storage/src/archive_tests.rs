// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn seed_pipestance(root: &Path) {
    std::fs::write(root.join("_invocation"), "call P(\n)\n").unwrap();
    std::fs::create_dir_all(root.join("journal")).unwrap();
    std::fs::create_dir_all(root.join("S/fork0/files")).unwrap();
    std::fs::write(root.join("S/fork0/_complete"), "").unwrap();
    std::fs::write(root.join("S/fork0/_outs"), "{\"y\":2}").unwrap();
    std::fs::write(root.join("S/fork0/files/big.bam"), "data").unwrap();
}

#[test]
fn archive_bundles_node_metadata_only() {
    let dir = tempfile::tempdir().unwrap();
    seed_pipestance(dir.path());

    let count = archive_metadata(dir.path()).unwrap();
    assert_eq!(count, 2);

    // Node metadata is gone, bundled into the zip
    assert!(!dir.path().join("S/fork0/_complete").exists());
    assert!(!dir.path().join("S/fork0/_outs").exists());
    assert!(dir.path().join(METADATA_ZIP).exists());

    // Seed files and stage outputs stay put
    assert!(dir.path().join("_invocation").exists());
    assert!(dir.path().join("S/fork0/files/big.bam").exists());
}

#[test]
fn unarchive_restores_missing_entries() {
    let dir = tempfile::tempdir().unwrap();
    seed_pipestance(dir.path());
    archive_metadata(dir.path()).unwrap();

    let restored = unarchive_metadata(dir.path()).unwrap();
    assert_eq!(restored, 2);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("S/fork0/_outs")).unwrap(),
        "{\"y\":2}"
    );
}

#[test]
fn unarchive_skips_files_already_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    seed_pipestance(dir.path());
    archive_metadata(dir.path()).unwrap();

    std::fs::write(dir.path().join("S/fork0/_outs"), "{\"y\":9}").unwrap();
    unarchive_metadata(dir.path()).unwrap();
    // The live file wins over the archived copy
    assert_eq!(
        std::fs::read_to_string(dir.path().join("S/fork0/_outs")).unwrap(),
        "{\"y\":9}"
    );
}

#[test]
fn unarchive_without_archive_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(unarchive_metadata(dir.path()).unwrap(), 0);
}
