// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metadata file vocabulary.

crate::metadata_kinds! {
    /// Canonical MRO call statement the pipestance was invoked with.
    Invocation => "invocation",
    /// Concatenated MRO source the graph was compiled from.
    MroSource => "mrosource",
    JobMode => "jobmode",
    Versions => "versions",
    Tags => "tags",
    Uuid => "uuid",
    Timestamp => "timestamp",
    /// Resolved argument map a stage phase sees.
    Args => "args",
    /// Output map a fork or chunk produced.
    Outs => "outs",
    /// Chunk definitions plus join resource hint emitted by split.
    StageDefs => "stage_defs",
    Complete => "complete",
    Errors => "errors",
    Assert => "assert",
    Heartbeat => "heartbeat",
    Log => "log",
    Stdout => "stdout",
    Stderr => "stderr",
    StackVars => "stackvars",
    Perf => "perf",
    VdrKill => "vdrkill",
    JobInfo => "jobinfo",
    ChunkDefs => "chunk_defs",
    ChunkOuts => "chunk_outs",
    /// Free-text progress reported by a running job.
    Progress => "progress",
    /// Per-node/fork state tree written at terminal exit.
    FinalState => "finalstate",
    Lock => "lock",
}

impl MetadataKind {
    /// Kinds whose presence terminates a fork (failure side).
    pub fn is_failure(self) -> bool {
        matches!(self, MetadataKind::Errors | MetadataKind::Assert)
    }

    /// Kinds written once at pipestance creation and never mutated.
    pub fn is_immutable(self) -> bool {
        matches!(
            self,
            MetadataKind::Invocation
                | MetadataKind::MroSource
                | MetadataKind::JobMode
                | MetadataKind::Versions
                | MetadataKind::Tags
                | MetadataKind::Uuid
                | MetadataKind::Timestamp
        )
    }
}

#[cfg(test)]
#[path = "kinds_tests.rs"]
mod tests;
