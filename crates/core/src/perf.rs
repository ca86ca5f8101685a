// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Perf records rolled up into `_perf`, plus the `_jobinfo` payload.

use crate::resources::JobResources;
use crate::state::MetadataState;
use serde::{Deserialize, Serialize};

/// One file removed by the VDR collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdrEvent {
    pub path: String,
    pub size: u64,
    pub timestamp: String,
}

/// Fork-level `_vdrkill` record.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VdrRecord {
    pub count: usize,
    pub size: u64,
    pub timestamp: String,
    pub paths: Vec<String>,
    #[serde(default)]
    pub events: Vec<VdrEvent>,
}

/// Payload of `_jobinfo`, written at submission time so the job shell and
/// reattachment can both see what was asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    /// `local` or the remote job mode the pipestance runs under.
    pub job_mode: String,
    #[serde(flatten)]
    pub resources: JobResources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniquifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Per-chunk perf entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPerf {
    pub index: usize,
    pub state: MetadataState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniquifier: Option<String>,
}

/// Per-fork perf record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkPerf {
    pub fqname: String,
    pub index: usize,
    /// Submission attempts, counting automatic retries.
    pub attempts: u32,
    pub state: MetadataState,
    #[serde(default)]
    pub chunks: Vec<ChunkPerf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdr: Option<VdrRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePerf {
    pub fqname: String,
    pub forks: Vec<ForkPerf>,
}

/// Pipestance-level `_perf` payload.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipestancePerf {
    pub nodes: Vec<NodePerf>,
}

#[cfg(test)]
#[path = "perf_tests.rs"]
mod tests;
