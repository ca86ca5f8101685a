// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime collaborators shared by every pipestance.

use crate::graph::Graph;
use crate::node::Node;
use crate::overrides::Overrides;
use martian_adapters::{JobManager, RetryConfig};
use martian_core::Clock;
use martian_mro::{Compiler, MroCache};
use martian_storage::METADATA_READ_CAP;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Volatile Data Removal scheduling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdrMode {
    /// Reclaim after each node completes.
    Rolling,
    /// Reclaim once, after the whole pipestance completes.
    Post,
    Disable,
    /// Rolling, additionally covering strict-volatile stages.
    Strict,
}

martian_core::simple_display! {
    VdrMode {
        Rolling => "rolling",
        Post => "post",
        Disable => "disable",
        Strict => "strict",
    }
}

impl VdrMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rolling" => Some(VdrMode::Rolling),
            "post" => Some(VdrMode::Post),
            "disable" => Some(VdrMode::Disable),
            "strict" => Some(VdrMode::Strict),
            _ => None,
        }
    }

    /// Whether collection runs as nodes complete.
    pub fn is_rolling(self) -> bool {
        matches!(self, VdrMode::Rolling | VdrMode::Strict)
    }
}

/// Static runtime configuration.
pub struct RuntimeConfig {
    /// `local` or the name of a cluster mode served by `remote_jm`.
    pub jobmode: String,
    pub vdr_mode: VdrMode,
    /// Disable `local` routing except for preflights.
    pub never_local: bool,
    /// `reset()` removes the whole stage directory instead of fork state.
    pub full_stage_reset: bool,
    pub skip_preflight: bool,
    pub mropaths: Vec<PathBuf>,
    /// Stage-code adapter executable handed to job managers.
    pub adapter_cmd: String,
    /// Hook invoked with the final state after a run ends.
    pub onfinish: Option<String>,
    pub pipelines_version: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            jobmode: "local".to_string(),
            vdr_mode: VdrMode::Rolling,
            never_local: false,
            full_stage_reset: false,
            skip_preflight: false,
            mropaths: Vec::new(),
            adapter_cmd: "mrjob".to_string(),
            onfinish: None,
            pipelines_version: String::new(),
        }
    }
}

/// Shared collaborators: job managers, clock, retry policy, overrides,
/// and the MRO cache. Explicitly passed around, never a singleton.
pub struct Runtime {
    pub config: RuntimeConfig,
    pub clock: Arc<dyn Clock>,
    pub local_jm: Arc<dyn JobManager>,
    pub remote_jm: Option<Arc<dyn JobManager>>,
    pub retry: RetryConfig,
    pub overrides: Overrides,
    pub cache: MroCache,
    pub compiler: Arc<dyn Compiler>,
}

impl Runtime {
    /// Preflight and `local` stages always run locally; `never_local`
    /// strips `local` back to preflights only.
    pub fn routes_local(&self, node: &Node) -> bool {
        if node.preflight() {
            return true;
        }
        if node.local() && !self.config.never_local {
            return true;
        }
        self.config.jobmode == "local" || self.remote_jm.is_none()
    }

    pub fn job_manager(&self, node: &Node) -> &Arc<dyn JobManager> {
        if self.routes_local(node) {
            &self.local_jm
        } else {
            match &self.remote_jm {
                Some(jm) => jm,
                None => &self.local_jm,
            }
        }
    }

    /// Grace subtracted before journal polling; covers the slowest queue.
    pub fn queue_grace(&self) -> Duration {
        let local = self.local_jm.queue_check_grace();
        match &self.remote_jm {
            Some(jm) => local.max(jm.queue_check_grace()),
            None => local,
        }
    }

    /// Cap for engine-side metadata reads, bounded by the local manager's
    /// unreserved memory so reading large outs cannot starve jobs.
    pub fn metadata_read_cap(&self) -> u64 {
        self.local_jm.free_mem_bytes().min(METADATA_READ_CAP)
    }
}

/// Per-tick context handed down the step call tree.
pub struct StepContext<'a> {
    pub runtime: &'a Runtime,
    pub graph: &'a Graph,
    /// Pipestance root directory.
    pub path: &'a Path,
    pub journal_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub preflights_done: bool,
    pub read_only: bool,
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
