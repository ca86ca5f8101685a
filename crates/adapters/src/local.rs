// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local job manager: bounded process pool on this machine.
//!
//! Capacity is a `(threads, mem_gb, vmem_gb)` triple guarded by an async
//! gate; submissions queue until their clamped request fits. Jobs run as
//! child processes with stdout/stderr routed to their metadata files. A
//! job that exits nonzero without having written its own completion gets
//! a synthesized `_errors` plus a journal breadcrumb so the watcher sees
//! the failure promptly instead of waiting for heartbeat expiry.

use crate::{JobError, JobManager, JobSpec};
use martian_core::{Fqname, JobInfo, JobResources, MetadataKind};
use martian_storage::{journal, Metadata, METADATA_READ_CAP};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy)]
struct Avail {
    threads: i64,
    mem_gb: i64,
    vmem_gb: i64,
}

struct Gate {
    avail: Mutex<Avail>,
    notify: Notify,
}

impl Gate {
    async fn acquire(&self, need: Avail) {
        loop {
            let notified = self.notify.notified();
            {
                let mut avail = self.avail.lock();
                if avail.threads >= need.threads
                    && avail.mem_gb >= need.mem_gb
                    && avail.vmem_gb >= need.vmem_gb
                {
                    avail.threads -= need.threads;
                    avail.mem_gb -= need.mem_gb;
                    avail.vmem_gb -= need.vmem_gb;
                    return;
                }
            }
            notified.await;
        }
    }

    fn release(&self, got: Avail) {
        {
            let mut avail = self.avail.lock();
            avail.threads += got.threads;
            avail.mem_gb += got.mem_gb;
            avail.vmem_gb += got.vmem_gb;
        }
        self.notify.notify_waiters();
    }
}

/// Ceiling on untracked reads while memory monitoring is on.
const MAX_UNTRACKED_READ_BYTES: u64 = 1 << 30;

/// Job manager that runs work as local child processes.
pub struct LocalJobManager {
    max_threads: i64,
    max_mem_gb: i64,
    max_vmem_gb: i64,
    /// When on, `free_mem_bytes` reflects outstanding reservations.
    monitor_mem: bool,
    gate: Arc<Gate>,
    /// Live child pids keyed by node fqname, for kill delivery.
    pids: Arc<Mutex<HashMap<String, Vec<u32>>>>,
    handle: tokio::runtime::Handle,
}

impl LocalJobManager {
    /// Capacity is explicit; callers detect cores/memory and pass them in.
    pub fn new(max_threads: i64, max_mem_gb: i64) -> Self {
        let max_vmem_gb = max_mem_gb * 2;
        Self {
            max_threads,
            max_mem_gb,
            max_vmem_gb,
            monitor_mem: true,
            gate: Arc::new(Gate {
                avail: Mutex::new(Avail {
                    threads: max_threads,
                    mem_gb: max_mem_gb,
                    vmem_gb: max_vmem_gb,
                }),
                notify: Notify::new(),
            }),
            pids: Arc::new(Mutex::new(HashMap::new())),
            handle: tokio::runtime::Handle::current(),
        }
    }

    /// Stop reporting reservations through `free_mem_bytes`.
    pub fn without_mem_monitoring(mut self) -> Self {
        self.monitor_mem = false;
        self
    }

    fn clamp(&self, res: &JobResources) -> Avail {
        Avail {
            threads: res.threads.unwrap_or(1).clamp(1, self.max_threads),
            mem_gb: res.mem_gb.unwrap_or(1).clamp(1, self.max_mem_gb),
            vmem_gb: res.vmem_gb.unwrap_or(0).clamp(0, self.max_vmem_gb),
        }
    }
}

impl JobManager for LocalJobManager {
    fn exec_job(&self, spec: JobSpec, metadata: Arc<Metadata>, _local_override: bool) {
        let need = self.clamp(&spec.resources);
        let gate = Arc::clone(&self.gate);
        let pids = Arc::clone(&self.pids);
        self.handle.spawn(async move {
            gate.acquire(need).await;
            run_job(&spec, &metadata, &pids).await;
            gate.release(need);
        });
    }

    fn get_system_reqs(&self, res: &JobResources) -> JobResources {
        let clamped = self.clamp(res);
        JobResources {
            threads: Some(clamped.threads),
            mem_gb: Some(clamped.mem_gb),
            vmem_gb: Some(clamped.vmem_gb),
            special: res.special.clone(),
        }
    }

    fn queue_check_grace(&self) -> Duration {
        // Local jobs start as soon as the gate admits them
        Duration::ZERO
    }

    fn end_job(&self, _metadata: &Metadata) {
        // Reservations release when the child exits
    }

    fn refresh_resources(&self, _local_mode: bool) -> Result<(), JobError> {
        Ok(())
    }

    fn free_mem_bytes(&self) -> u64 {
        if !self.monitor_mem {
            return METADATA_READ_CAP;
        }
        let avail_gb = self.gate.avail.lock().mem_gb.max(0) as u64;
        (avail_gb << 30).min(MAX_UNTRACKED_READ_BYTES)
    }

    fn kill_job(&self, fqname: &Fqname) {
        let pids = self.pids.lock();
        for (key, job_pids) in pids.iter() {
            if key == fqname.as_str() || key.starts_with(&format!("{}.", fqname.as_str())) {
                for pid in job_pids {
                    let pid = nix::unistd::Pid::from_raw(*pid as i32);
                    if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM)
                    {
                        tracing::debug!(%pid, error = %e, "kill signal not delivered");
                    }
                }
            }
        }
    }
}

async fn run_job(spec: &JobSpec, metadata: &Metadata, pids: &Mutex<HashMap<String, Vec<u32>>>) {
    let stdout = metadata.make_path(MetadataKind::Stdout);
    let stderr = metadata.make_path(MetadataKind::Stderr);

    let mut cmd = tokio::process::Command::new(&spec.shell_cmd);
    cmd.args(&spec.argv)
        .envs(spec.env.iter().cloned())
        .current_dir(metadata.files_path());
    if let Ok(out) = std::fs::File::create(&stdout) {
        cmd.stdout(std::process::Stdio::from(out));
    }
    if let Ok(err) = std::fs::File::create(&stderr) {
        cmd.stderr(std::process::Stdio::from(err));
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            fail_job(spec, metadata, &format!("failed to spawn {}: {}", spec.shell_cmd, e));
            return;
        }
    };

    let pid = child.id();
    if let Some(pid) = pid {
        pids.lock().entry(spec.fqname.as_str().to_string()).or_default().push(pid);
    }

    let status = child.wait().await;

    if let Some(pid) = pid {
        let mut table = pids.lock();
        if let Some(list) = table.get_mut(spec.fqname.as_str()) {
            list.retain(|p| *p != pid);
            if list.is_empty() {
                table.remove(spec.fqname.as_str());
            }
        }
    }

    match status {
        Ok(status) if status.success() => {
            // The job wrote its own completion and breadcrumbs
        }
        Ok(status) => {
            if !metadata.exists(MetadataKind::Complete) && !metadata.exists(MetadataKind::Errors) {
                let message = match status.signal() {
                    Some(sig) => format!("signal: {}", sig),
                    None => format!("job exited with code {}", status.code().unwrap_or(-1)),
                };
                fail_job(spec, metadata, &message);
            }
        }
        Err(e) => fail_job(spec, metadata, &format!("failed to reap job: {}", e)),
    }
}

fn fail_job(spec: &JobSpec, metadata: &Metadata, message: &str) {
    tracing::warn!(fqname = %spec.fqname, shell = %spec.shell_name, message, "local job failed");
    if let Err(e) = metadata.write_raw(MetadataKind::Errors, message) {
        tracing::error!(fqname = %spec.fqname, error = %e, "could not record job failure");
    }
    let crumb = spec.breadcrumb(MetadataKind::Errors);
    if let Err(e) = journal::write_breadcrumb(&spec.journal_dir, &crumb) {
        tracing::error!(fqname = %spec.fqname, error = %e, "could not drop failure breadcrumb");
    }
}

/// Build the `_jobinfo` payload written at submission time.
pub fn job_info(spec: &JobSpec, job_mode: &str, clamped: &JobResources) -> JobInfo {
    JobInfo {
        name: format!("{}.{}", spec.fqname, spec.shell_name),
        job_mode: job_mode.to_string(),
        resources: clamped.clone(),
        uniquifier: spec.uniquifier.clone(),
        pid: None,
        host: std::env::var("HOSTNAME").ok(),
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
