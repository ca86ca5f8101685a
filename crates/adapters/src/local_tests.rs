// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::JobSpec;
use martian_core::{Fqname, JobResources, SystemClock};
use martian_storage::JournalPhase;
use std::path::Path;

fn spec(dir: &Path, cmd: &str, argv: Vec<String>) -> JobSpec {
    JobSpec {
        shell_cmd: cmd.to_string(),
        argv,
        env: vec![],
        resources: JobResources::default(),
        fqname: Fqname::top("ps", "P").child("S"),
        fork_index: 0,
        chunk_index: None,
        uniquifier: None,
        shell_name: "main".to_string(),
        phase: JournalPhase::Main,
        journal_dir: dir.join("journal"),
    }
}

fn metadata(dir: &Path) -> Arc<Metadata> {
    let md = Arc::new(Metadata::new(
        Fqname::top("ps", "P").child("S"),
        dir.join("S").join("fork0"),
        Arc::new(SystemClock),
    ));
    md.make_dirs().unwrap();
    md
}

async fn wait_for(md: &Metadata, kind: MetadataKind) -> bool {
    for _ in 0..200 {
        // exists() caches negatives; probe the path directly
        if md.make_path(kind).exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[test]
fn clamp_bounds_requests() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let jm = LocalJobManager::new(4, 8);

    let big = jm.get_system_reqs(&JobResources::new(64, 512));
    assert_eq!(big.threads, Some(4));
    assert_eq!(big.mem_gb, Some(8));

    let unset = jm.get_system_reqs(&JobResources::default());
    assert_eq!(unset.threads, Some(1));
    assert_eq!(unset.mem_gb, Some(1));
}

#[test]
fn free_mem_is_capped_at_one_gib() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    // 8 GB unreserved, but untracked reads never see more than 1 GiB
    let jm = LocalJobManager::new(4, 8);
    assert_eq!(jm.free_mem_bytes(), 1 << 30);
}

#[tokio::test]
async fn free_mem_reflects_reservations() {
    let dir = tempfile::tempdir().unwrap();
    let jm = LocalJobManager::new(1, 1);
    let md = metadata(dir.path());
    jm.exec_job(spec(dir.path(), "sleep", vec!["0.3".to_string()]), Arc::clone(&md), false);

    // Once the job holds the gate, no unreserved memory remains
    assert!(wait_for(&md, MetadataKind::Stdout).await);
    assert_eq!(jm.free_mem_bytes(), 0);
}

#[tokio::test]
async fn unmonitored_manager_ignores_reservations() {
    let dir = tempfile::tempdir().unwrap();
    let jm = LocalJobManager::new(1, 1).without_mem_monitoring();
    let md = metadata(dir.path());
    jm.exec_job(spec(dir.path(), "sleep", vec!["0.3".to_string()]), Arc::clone(&md), false);
    assert!(wait_for(&md, MetadataKind::Stdout).await);
    assert_eq!(jm.free_mem_bytes(), METADATA_READ_CAP);
}

#[test]
fn grace_is_zero_for_local() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let jm = LocalJobManager::new(1, 1);
    assert_eq!(jm.queue_check_grace(), Duration::ZERO);
}

#[tokio::test]
async fn failing_job_synthesizes_errors_and_breadcrumb() {
    let dir = tempfile::tempdir().unwrap();
    let jm = LocalJobManager::new(2, 2);
    let md = metadata(dir.path());
    let spec = spec(dir.path(), "false", vec![]);
    jm.exec_job(spec, Arc::clone(&md), false);

    assert!(wait_for(&md, MetadataKind::Errors).await, "no _errors synthesized");
    let message = md.read_raw(MetadataKind::Errors).unwrap();
    assert!(message.contains("job exited with code 1"), "got {:?}", message);

    let crumbs: Vec<String> = std::fs::read_dir(dir.path().join("journal"))
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(crumbs, vec!["ID.ps.P.S.fork0.errors".to_string()]);
}

#[tokio::test]
async fn successful_job_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let jm = LocalJobManager::new(2, 2);
    let md = metadata(dir.path());
    jm.exec_job(spec(dir.path(), "true", vec![]), Arc::clone(&md), false);

    // stdout file appears once the process has been spawned
    assert!(wait_for(&md, MetadataKind::Stdout).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!md.make_path(MetadataKind::Errors).exists());
}

#[tokio::test]
async fn missing_binary_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let jm = LocalJobManager::new(2, 2);
    let md = metadata(dir.path());
    jm.exec_job(spec(dir.path(), "/nonexistent/binary", vec![]), Arc::clone(&md), false);

    assert!(wait_for(&md, MetadataKind::Errors).await);
    let message = md.read_raw(MetadataKind::Errors).unwrap();
    assert!(message.contains("failed to spawn"), "got {:?}", message);
}

#[tokio::test]
async fn gate_serializes_oversubscribed_jobs() {
    let dir = tempfile::tempdir().unwrap();
    // Capacity one thread: the two sleeps cannot overlap
    let jm = LocalJobManager::new(1, 1);
    let md_a = metadata(&dir.path().join("a"));
    let md_b = metadata(&dir.path().join("b"));

    let start = std::time::Instant::now();
    jm.exec_job(spec(dir.path(), "sleep", vec!["0.2".to_string()]), md_a.clone(), false);
    jm.exec_job(spec(dir.path(), "sleep", vec!["0.2".to_string()]), md_b.clone(), false);

    // Both stdout files appear only after both jobs have started
    assert!(wait_for(&md_a, MetadataKind::Stdout).await);
    assert!(wait_for(&md_b, MetadataKind::Stdout).await);
    assert!(start.elapsed() >= Duration::from_millis(200), "second job started early");
}
