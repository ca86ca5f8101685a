// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! martian-adapters: job submission boundaries.
//!
//! The engine talks to every job manager through [`JobManager`]; jobs
//! write their own metadata and journal breadcrumbs, so submission is
//! fire-and-forget. The local manager here owns a bounded multi-resource
//! gate and real processes; cluster managers live behind the same trait.

pub mod local;
pub mod retry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use martian_core::{Fqname, JobResources, MetadataKind};
use martian_storage::{JournalName, JournalPhase, Metadata};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use local::LocalJobManager;
pub use retry::RetryConfig;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to spawn {cmd}: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("job manager unavailable: {0}")]
    Unavailable(String),
}

/// Everything a job manager needs to run one phase of one fork.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub shell_cmd: String,
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub resources: JobResources,
    /// Node fqname; fork/chunk coordinates follow.
    pub fqname: Fqname,
    pub fork_index: usize,
    pub chunk_index: Option<usize>,
    pub uniquifier: Option<String>,
    /// `split`, `chunk`, `join`, or `main`.
    pub shell_name: String,
    pub phase: JournalPhase,
    pub journal_dir: PathBuf,
}

impl JobSpec {
    /// Journal breadcrumb name for this job and the given kind.
    pub fn breadcrumb(&self, kind: MetadataKind) -> JournalName {
        JournalName::new(
            self.fqname.as_str(),
            self.fork_index,
            self.chunk_index,
            self.uniquifier.clone(),
            self.phase,
            kind,
        )
    }
}

/// Submit/capacity interface every job manager implements.
///
/// `exec_job` is fire-and-forget: the job itself writes metadata files and
/// drops journal breadcrumbs; the engine observes them on the next tick.
pub trait JobManager: Send + Sync {
    fn exec_job(&self, spec: JobSpec, metadata: Arc<Metadata>, local_override: bool);

    /// Clamp a request to this manager's capacity.
    fn get_system_reqs(&self, res: &JobResources) -> JobResources;

    /// Duration subtracted from "now" before journal polling, covering
    /// queueing latency between submission and the job's first write.
    fn queue_check_grace(&self) -> Duration;

    /// Release any reservations held for a finished job.
    fn end_job(&self, metadata: &Metadata);

    /// Check queue health; local managers always succeed.
    fn refresh_resources(&self, local_mode: bool) -> Result<(), JobError>;

    /// Memory available for untracked reads of metadata files, at most
    /// 1 GiB while memory monitoring is on. Callers cap large reads
    /// (chunk outs, join outs) by this so they cannot starve jobs.
    fn free_mem_bytes(&self) -> u64;

    /// Ask the manager to signal any live processes for the fqname.
    fn kill_job(&self, fqname: &Fqname);
}
