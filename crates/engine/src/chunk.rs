// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One shard of a stage's main phase.

use crate::fork::ChunkDef;
use crate::node::Node;
use crate::runtime::StepContext;
use martian_core::{chunk_dir_name, Clock, Fqname, MetadataKind, MetadataState};
use martian_storage::{JournalPhase, Metadata};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// A chunk: its definition from split, its metadata directory, and the
/// uniquifier distinguishing restarted attempts.
pub struct Chunk {
    index: usize,
    chunk_def: ChunkDef,
    metadata: Arc<Metadata>,
    uniquifier: Option<String>,
}

impl Chunk {
    pub fn new(
        fork_fqname: &Fqname,
        fork_path: &Path,
        index: usize,
        chunk_def: ChunkDef,
        uniquifier: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dir = chunk_dir_name(index, uniquifier.as_deref());
        let metadata = Arc::new(Metadata::new(
            fork_fqname.child(&dir),
            fork_path.join(dir),
            clock,
        ));
        Self { index, chunk_def, metadata, uniquifier }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn chunk_def(&self) -> &ChunkDef {
        &self.chunk_def
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn uniquifier(&self) -> Option<&str> {
        self.uniquifier.as_deref()
    }

    /// Whether a journal breadcrumb addresses this attempt.
    pub fn matches_journal(&self, chunk_index: usize, uniquifier: Option<&str>) -> bool {
        self.index == chunk_index && self.uniquifier.as_deref() == uniquifier
    }

    pub fn state(&self) -> MetadataState {
        self.metadata.get_state().unwrap_or(MetadataState::Ready)
    }

    /// Submit the chunk job if it has not been handed off yet.
    pub fn step(
        &self,
        ctx: &StepContext<'_>,
        node: &Node,
        fork_index: usize,
        fork_args: &serde_json::Map<String, Value>,
    ) {
        if self.state() != MetadataState::Ready {
            return;
        }
        if let Err(e) = self.metadata.make_dirs() {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "chunk mkdir failed");
            return;
        }

        // Chunk args layer the chunk-local values over the fork's args
        let mut args = fork_args.clone();
        for (key, value) in &self.chunk_def.args {
            args.insert(key.clone(), value.clone());
        }
        if let Err(e) = self.metadata.write(MetadataKind::Args, &Value::Object(args)) {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "chunk args write failed");
            return;
        }

        node.submit_job(
            ctx,
            &self.metadata,
            "chunk",
            JournalPhase::Main,
            fork_index,
            Some(self.index),
            self.uniquifier.clone(),
            self.chunk_def.resources(),
        );
    }
}

#[cfg(test)]
#[path = "chunk_tests.rs"]
mod tests;
