// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The node/fork/chunk state lattice.

use serde::{Deserialize, Serialize};

/// State of a node, fork, or chunk, derived from metadata file presence.
///
/// Never stored durably for nodes; fork and chunk states follow directly
/// from which files exist under their directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataState {
    /// Upstream dependencies not yet satisfied.
    Waiting,
    /// Eligible for dispatch on the next step.
    Ready,
    /// Submitted to a job manager, not yet started.
    Queued,
    /// Submitted to the local job manager (tracked separately so
    /// reattachment can requeue local work whose process died).
    QueuedLocally,
    Running,
    Complete,
    Failed,
    /// A disabled binding resolved truthy; treated as complete for
    /// dependency purposes.
    DisabledState,
    /// Structurally alive but waiting on the parent fork's split.
    ForkWaiting,
}

crate::simple_display! {
    MetadataState {
        Waiting => "waiting",
        Ready => "ready",
        Queued => "queued",
        QueuedLocally => "queued",
        Running => "running",
        Complete => "complete",
        Failed => "failed",
        DisabledState => "disabled",
        ForkWaiting => "waiting",
    }
}

impl MetadataState {
    /// Satisfies downstream dependencies (complete or disabled).
    pub fn is_done(self) -> bool {
        matches!(self, MetadataState::Complete | MetadataState::DisabledState)
    }

    pub fn is_failed(self) -> bool {
        self == MetadataState::Failed
    }

    /// Has been handed to a job manager and may have a live process.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            MetadataState::Queued | MetadataState::QueuedLocally | MetadataState::Running
        )
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
