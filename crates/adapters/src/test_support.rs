// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake job manager for engine and workspace tests.
//!
//! Submissions are recorded instead of executed; tests play the job's
//! role by completing or failing each submission, which writes the same
//! metadata files and journal breadcrumbs a real job would.

use crate::{JobError, JobManager, JobSpec};
use martian_core::{Fqname, JobResources, MetadataKind};
use martian_storage::{journal, Metadata};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One recorded `exec_job` call.
#[derive(Clone)]
pub struct Submission {
    pub spec: JobSpec,
    pub metadata: Arc<Metadata>,
}

impl Submission {
    fn drop_crumb(&self, kind: MetadataKind) {
        #[allow(clippy::unwrap_used)] // test plumbing
        journal::write_breadcrumb(&self.spec.journal_dir, &self.spec.breadcrumb(kind)).unwrap();
    }

    /// Play a job that starts running: write `_log` and its breadcrumb.
    pub fn start(&self) {
        #[allow(clippy::unwrap_used)]
        self.metadata.append_raw(MetadataKind::Log, "job started").unwrap();
        self.drop_crumb(MetadataKind::Log);
    }

    /// Play a successful job: write outs and completion.
    pub fn complete(&self, outs: &serde_json::Value) {
        #[allow(clippy::unwrap_used)]
        {
            self.metadata.write(MetadataKind::Outs, outs).unwrap();
            self.metadata.write_raw(MetadataKind::Complete, "").unwrap();
        }
        self.drop_crumb(MetadataKind::Outs);
        self.drop_crumb(MetadataKind::Complete);
    }

    /// Play a successful split: write stage defs and completion.
    pub fn complete_split(&self, stage_defs: &serde_json::Value) {
        #[allow(clippy::unwrap_used)]
        {
            self.metadata.write(MetadataKind::StageDefs, stage_defs).unwrap();
            self.metadata.write_raw(MetadataKind::Complete, "").unwrap();
        }
        self.drop_crumb(MetadataKind::StageDefs);
        self.drop_crumb(MetadataKind::Complete);
    }

    /// Play a failing job: write `_errors` and its breadcrumb.
    pub fn fail(&self, message: &str) {
        #[allow(clippy::unwrap_used)]
        self.metadata.write_raw(MetadataKind::Errors, message).unwrap();
        self.drop_crumb(MetadataKind::Errors);
    }

    pub fn shell_name(&self) -> &str {
        &self.spec.shell_name
    }

    pub fn fqname(&self) -> &Fqname {
        &self.spec.fqname
    }
}

/// Records submissions for tests to complete by hand.
#[derive(Default)]
pub struct FakeJobManager {
    submissions: Mutex<Vec<Submission>>,
    ended: Mutex<Vec<String>>,
    killed: Mutex<Vec<String>>,
    /// None reports the full read ceiling (no memory monitoring).
    free_mem: Mutex<Option<u64>>,
}

impl FakeJobManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend this much unreserved memory remains.
    pub fn set_free_mem_bytes(&self, bytes: u64) {
        *self.free_mem.lock() = Some(bytes);
    }

    /// Drain submissions recorded since the last call.
    pub fn take_submissions(&self) -> Vec<Submission> {
        std::mem::take(&mut *self.submissions.lock())
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn ended(&self) -> Vec<String> {
        self.ended.lock().clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().clone()
    }
}

impl JobManager for FakeJobManager {
    fn exec_job(&self, spec: JobSpec, metadata: Arc<Metadata>, _local_override: bool) {
        self.submissions.lock().push(Submission { spec, metadata });
    }

    fn get_system_reqs(&self, res: &JobResources) -> JobResources {
        res.clone().with_defaults(1, 1)
    }

    fn queue_check_grace(&self) -> Duration {
        Duration::ZERO
    }

    fn end_job(&self, metadata: &Metadata) {
        self.ended.lock().push(metadata.fqname().to_string());
    }

    fn refresh_resources(&self, _local_mode: bool) -> Result<(), JobError> {
        Ok(())
    }

    fn free_mem_bytes(&self) -> u64 {
        (*self.free_mem.lock()).unwrap_or(martian_storage::METADATA_READ_CAP)
    }

    fn kill_job(&self, fqname: &Fqname) {
        self.killed.lock().push(fqname.to_string());
    }
}
