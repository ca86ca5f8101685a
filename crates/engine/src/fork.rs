// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fork: one sweep permutation of a node, driving split → chunks → join.
//!
//! All durable state lives in metadata files; the in-memory fork holds
//! only the chunk list, the retry counter, and cached path/permutation
//! topology, so a fork can be rebuilt from disk at any time.

use crate::binding::ResolveError;
use crate::chunk::Chunk;
use crate::graph::Graph;
use crate::node::Node;
use crate::runtime::StepContext;
use indexmap::IndexMap;
use martian_core::{
    fork_dir_name, Clock, ChunkPerf, ForkPerf, Fqname, JobResources, MetadataKind, MetadataState,
    VdrRecord,
};
use martian_storage::{JournalName, JournalPhase, Metadata, MetadataError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// One chunk definition from `_stage_defs`: a resource request plus
/// chunk-local arguments layered over the fork's args.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ChunkDef {
    #[serde(rename = "__threads", default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<i64>,
    #[serde(rename = "__mem_gb", default, skip_serializing_if = "Option::is_none")]
    pub mem_gb: Option<i64>,
    #[serde(rename = "__vmem_gb", default, skip_serializing_if = "Option::is_none")]
    pub vmem_gb: Option<i64>,
    #[serde(rename = "__special", default, skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
    #[serde(flatten)]
    pub args: serde_json::Map<String, Value>,
}

impl ChunkDef {
    pub fn resources(&self) -> JobResources {
        JobResources {
            threads: self.threads,
            mem_gb: self.mem_gb,
            vmem_gb: self.vmem_gb,
            special: self.special.clone(),
        }
    }
}

/// Payload of `_stage_defs`, produced by split.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StageDefs {
    #[serde(default)]
    pub chunks: Vec<ChunkDef>,
    #[serde(default)]
    pub join: JobResources,
}

impl StageDefs {
    /// The single-chunk defs synthesized for stages without a split.
    pub fn synthesized() -> Self {
        StageDefs { chunks: vec![ChunkDef::default()], join: JobResources::default() }
    }
}

const UNIQUIFIER_ALPHABET: [char; 16] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f'];

fn new_uniquifier() -> String {
    nanoid::nanoid!(10, &UNIQUIFIER_ALPHABET)
}

/// One permutation of sweep arguments for a node.
pub struct Fork {
    index: usize,
    /// Owning node's fqname; journal breadcrumbs key on it.
    node_fqname: Fqname,
    path: PathBuf,
    arg_permute: IndexMap<String, Value>,
    metadata: Arc<Metadata>,
    split_metadata: Option<Arc<Metadata>>,
    join_metadata: Option<Arc<Metadata>>,
    chunks: Mutex<Vec<Chunk>>,
    /// Index of the aligned fork on the parent pipeline node, if any.
    parent_fork: Option<usize>,
    /// In-memory only: automatic restarts consumed so far.
    retries: Mutex<u32>,
    clock: Arc<dyn Clock>,
}

impl Fork {
    pub fn new(
        node_fqname: Fqname,
        node_path: &std::path::Path,
        index: usize,
        arg_permute: IndexMap<String, Value>,
        has_split: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let path = node_path.join(fork_dir_name(index));
        let fork_fqname = node_fqname.child(&fork_dir_name(index));
        let metadata =
            Arc::new(Metadata::new(fork_fqname.clone(), path.clone(), Arc::clone(&clock)));
        let (split_metadata, join_metadata) = if has_split {
            (
                Some(Arc::new(Metadata::new(
                    fork_fqname.child("split"),
                    path.join("split"),
                    Arc::clone(&clock),
                ))),
                Some(Arc::new(Metadata::new(
                    fork_fqname.child("join"),
                    path.join("join"),
                    Arc::clone(&clock),
                ))),
            )
        } else {
            (None, None)
        };
        Self {
            index,
            node_fqname,
            path,
            arg_permute,
            metadata,
            split_metadata,
            join_metadata,
            chunks: Mutex::new(Vec::new()),
            parent_fork: None,
            retries: Mutex::new(0),
            clock,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn arg_permute(&self) -> &IndexMap<String, Value> {
        &self.arg_permute
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn split_metadata(&self) -> Option<&Arc<Metadata>> {
        self.split_metadata.as_ref()
    }

    pub fn join_metadata(&self) -> Option<&Arc<Metadata>> {
        self.join_metadata.as_ref()
    }

    pub fn parent_fork(&self) -> Option<usize> {
        self.parent_fork
    }

    pub(crate) fn set_parent_fork(&mut self, parent: Option<usize>) {
        self.parent_fork = parent;
    }

    pub fn retries(&self) -> u32 {
        *self.retries.lock()
    }

    pub fn make_dirs(&self) -> Result<(), MetadataError> {
        self.metadata.make_dirs()?;
        if let Some(split) = &self.split_metadata {
            split.make_dirs()?;
        }
        if let Some(join) = &self.join_metadata {
            join.make_dirs()?;
        }
        Ok(())
    }

    /// Whether the disabled bindings resolve truthy for this permutation.
    pub fn is_disabled(&self, graph: &Graph, node: &Node) -> Result<bool, ResolveError> {
        for binding in node.disabled_bindings() {
            let value = binding.resolve(graph, &self.arg_permute)?;
            if value.as_bool().unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn read_outs(&self) -> Result<Value, MetadataError> {
        self.metadata.read(MetadataKind::Outs)
    }

    /// Resolve the fork's argument map from its bindings.
    pub fn resolve_args(
        &self,
        graph: &Graph,
        node: &Node,
    ) -> Result<serde_json::Map<String, Value>, ResolveError> {
        let mut args = serde_json::Map::new();
        for (param, binding) in node.bindings() {
            args.insert(param.clone(), binding.resolve(graph, &self.arg_permute)?);
        }
        Ok(args)
    }

    /// Derived state for a stage fork, reflecting on-disk breadcrumbs.
    pub fn state(&self, graph: &Graph, node: &Node) -> MetadataState {
        if node.is_pipeline() {
            return self.state_pipeline(graph, node);
        }
        match self.is_disabled(graph, node) {
            Ok(true) => return MetadataState::DisabledState,
            Ok(false) => {}
            Err(_) => return MetadataState::ForkWaiting,
        }
        if self.metadata.exists(MetadataKind::Complete) {
            return MetadataState::Complete;
        }
        if self.metadata.get_state() == Some(MetadataState::Failed) {
            return MetadataState::Failed;
        }
        if let Some(split) = &self.split_metadata {
            match split.get_state() {
                Some(MetadataState::Failed) => return MetadataState::Failed,
                Some(MetadataState::Complete) => {}
                Some(state) => return state,
                None => return MetadataState::Ready,
            }
        }
        let chunks = self.chunks.lock();
        if chunks.is_empty() {
            return MetadataState::Ready;
        }
        let mut any_running = false;
        let mut any_queued = false;
        let mut any_ready = false;
        for chunk in chunks.iter() {
            match chunk.state() {
                MetadataState::Failed => return MetadataState::Failed,
                MetadataState::Running => any_running = true,
                MetadataState::Queued | MetadataState::QueuedLocally => any_queued = true,
                MetadataState::Ready => any_ready = true,
                _ => {}
            }
        }
        if any_running {
            return MetadataState::Running;
        }
        if any_ready {
            return MetadataState::Ready;
        }
        if any_queued {
            return MetadataState::Queued;
        }
        drop(chunks);
        // All chunks complete; join (or finalize) remains
        if let Some(join) = &self.join_metadata {
            match join.get_state() {
                Some(MetadataState::Failed) => MetadataState::Failed,
                Some(MetadataState::Complete) => MetadataState::Running,
                Some(state) => state,
                None => MetadataState::Ready,
            }
        } else {
            MetadataState::Running
        }
    }

    /// Pipeline forks mirror the matching forks of their subnodes.
    fn state_pipeline(&self, graph: &Graph, node: &Node) -> MetadataState {
        match self.is_disabled(graph, node) {
            Ok(true) => return MetadataState::DisabledState,
            Ok(false) => {}
            Err(_) => return MetadataState::ForkWaiting,
        }
        if self.metadata.exists(MetadataKind::Complete) {
            return MetadataState::Complete;
        }
        let mut all_done = true;
        for sub_id in node.subnodes() {
            let sub = graph.node(*sub_id);
            for sub_fork in sub.forks_agreeing(&self.arg_permute) {
                match sub_fork.state(graph, sub) {
                    MetadataState::Failed => return MetadataState::Failed,
                    state if state.is_done() => {}
                    _ => all_done = false,
                }
            }
        }
        if all_done {
            // Outs not yet materialized; finalize runs on the next step
            MetadataState::Ready
        } else {
            MetadataState::Running
        }
    }

    /// Advance the fork one step. Submission is idempotent: a phase with
    /// `_jobinfo` on disk reads as queued and is not re-submitted.
    pub fn step(&self, ctx: &StepContext<'_>, node: &Node) {
        let state = self.state(ctx.graph, node);
        match state {
            MetadataState::Failed => self.try_retry(ctx, node),
            MetadataState::Ready | MetadataState::Running => {
                if node.is_pipeline() {
                    self.finalize_pipeline(ctx, node);
                } else {
                    self.advance(ctx, node);
                }
            }
            _ => {}
        }
    }

    fn advance(&self, ctx: &StepContext<'_>, node: &Node) {
        if let Err(e) = self.make_dirs() {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "fork mkdir failed");
            return;
        }
        let args = match self.resolve_args(ctx.graph, node) {
            Ok(args) => args,
            Err(e) => {
                // Transient by policy: upstream outs may still be landing
                tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "args not resolvable");
                return;
            }
        };

        if let Some(split) = &self.split_metadata {
            match split.get_state() {
                None => {
                    self.submit_split(ctx, node, split, &args);
                    return;
                }
                Some(MetadataState::Complete) => {}
                Some(_) => return,
            }
        }

        if !self.ensure_chunks() {
            return;
        }
        let mut all_complete = true;
        {
            let chunks = self.chunks.lock();
            for chunk in chunks.iter() {
                chunk.step(ctx, node, self.index, &args);
                if chunk.state() != MetadataState::Complete {
                    all_complete = false;
                }
            }
        }
        if !all_complete {
            return;
        }

        if let Some(join) = &self.join_metadata {
            match join.get_state() {
                None => self.submit_join(ctx, node, join, &args),
                Some(MetadataState::Complete) => self.finalize(ctx, node, Some(join)),
                Some(_) => {}
            }
        } else {
            self.finalize(ctx, node, None);
        }
    }

    fn submit_split(
        &self,
        ctx: &StepContext<'_>,
        node: &Node,
        split: &Arc<Metadata>,
        args: &serde_json::Map<String, Value>,
    ) {
        if let Err(e) = split.write(MetadataKind::Args, &Value::Object(args.clone())) {
            tracing::warn!(fqname = %split.fqname(), error = %e, "split args write failed");
            return;
        }
        node.submit_job(
            ctx,
            split,
            "split",
            JournalPhase::Split,
            self.index,
            None,
            None,
            JobResources::default(),
        );
    }

    /// Create the chunk list from stage defs (split output or synthesized).
    /// Returns false when the defs are unavailable or empty.
    fn ensure_chunks(&self) -> bool {
        let mut chunks = self.chunks.lock();
        if !chunks.is_empty() {
            return true;
        }
        let defs = match &self.split_metadata {
            Some(split) => match split.read::<StageDefs>(MetadataKind::StageDefs) {
                Ok(defs) => defs,
                Err(e) => {
                    tracing::warn!(fqname = %split.fqname(), error = %e, "stage defs unreadable");
                    return false;
                }
            },
            None => StageDefs::synthesized(),
        };
        if defs.chunks.is_empty() {
            let _ = self
                .metadata
                .write_raw(MetadataKind::Errors, "split produced no chunk definitions");
            return false;
        }
        if let Err(e) = self.metadata.write(MetadataKind::ChunkDefs, &defs) {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "chunk defs write failed");
        }
        *chunks = self.build_chunks(&defs, None);
        true
    }

    fn build_chunks(&self, defs: &StageDefs, uniquifier: Option<&str>) -> Vec<Chunk> {
        defs.chunks
            .iter()
            .enumerate()
            .map(|(i, def)| {
                Chunk::new(
                    self.metadata.fqname(),
                    &self.path,
                    i,
                    def.clone(),
                    uniquifier.map(str::to_string),
                    Arc::clone(&self.clock),
                )
            })
            .collect()
    }

    fn submit_join(
        &self,
        ctx: &StepContext<'_>,
        node: &Node,
        join: &Arc<Metadata>,
        args: &serde_json::Map<String, Value>,
    ) {
        // Outs can be huge; bound the reads by the manager's free memory
        let read_cap = ctx.runtime.metadata_read_cap();
        let chunks = self.chunks.lock();
        let chunk_defs: Vec<ChunkDef> = chunks.iter().map(|c| c.chunk_def().clone()).collect();
        let mut chunk_outs = Vec::with_capacity(chunks.len());
        for chunk in chunks.iter() {
            match chunk.metadata().read_with_cap::<Value>(MetadataKind::Outs, read_cap) {
                Ok(outs) => chunk_outs.push(outs),
                Err(e) => {
                    tracing::warn!(fqname = %chunk.metadata().fqname(), error = %e, "chunk outs unreadable");
                    return;
                }
            }
        }
        drop(chunks);

        if let Err(e) = self.metadata.write(MetadataKind::ChunkOuts, &chunk_outs) {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "chunk outs write failed");
        }

        let join_resources = self
            .split_metadata
            .as_ref()
            .and_then(|split| split.read::<StageDefs>(MetadataKind::StageDefs).ok())
            .map(|defs| defs.join)
            .unwrap_or_default();

        let mut join_args = args.clone();
        join_args.insert("chunk_defs".to_string(), serde_json::json!(chunk_defs));
        join_args.insert("chunk_outs".to_string(), Value::Array(chunk_outs));
        if let Err(e) = join.write(MetadataKind::Args, &Value::Object(join_args)) {
            tracing::warn!(fqname = %join.fqname(), error = %e, "join args write failed");
            return;
        }
        node.submit_job(
            ctx,
            join,
            "join",
            JournalPhase::Join,
            self.index,
            None,
            None,
            join_resources,
        );
    }

    /// Write the fork-level outs and completion once the last phase is in.
    fn finalize(&self, ctx: &StepContext<'_>, node: &Node, join: Option<&Arc<Metadata>>) {
        if self.metadata.exists(MetadataKind::Complete) {
            return;
        }
        let read_cap = ctx.runtime.metadata_read_cap();
        let outs = match join {
            Some(join) => join.read_with_cap::<Value>(MetadataKind::Outs, read_cap),
            None => {
                let chunks = self.chunks.lock();
                match chunks.first() {
                    Some(chunk) => {
                        chunk.metadata().read_with_cap::<Value>(MetadataKind::Outs, read_cap)
                    }
                    None => return,
                }
            }
        };
        let outs = match outs {
            Ok(outs) => outs,
            Err(e) => {
                tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "outs unreadable at finalize");
                return;
            }
        };
        self.write_completion(ctx, node, outs);
    }

    /// Pipeline forks complete by materializing their return bindings.
    fn finalize_pipeline(&self, ctx: &StepContext<'_>, node: &Node) {
        if self.metadata.exists(MetadataKind::Complete) {
            return;
        }
        if self.state_pipeline(ctx.graph, node) != MetadataState::Ready {
            return;
        }
        if let Err(e) = self.make_dirs() {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "fork mkdir failed");
            return;
        }
        let mut outs = serde_json::Map::new();
        for (param, binding) in node.ret_bindings() {
            match binding.resolve(ctx.graph, &self.arg_permute) {
                Ok(value) => {
                    outs.insert(param.clone(), value);
                }
                Err(e) => {
                    tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "return binding unresolved");
                    return;
                }
            }
        }
        self.write_completion(ctx, node, Value::Object(outs));
    }

    fn write_completion(&self, ctx: &StepContext<'_>, node: &Node, outs: Value) {
        if let Err(e) = self.metadata.write(MetadataKind::Outs, &outs) {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "outs write failed");
            return;
        }
        let perf = self.perf(ctx.graph, node);
        if let Err(e) = self.metadata.write(MetadataKind::Perf, &perf) {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "perf write failed");
        }
        let _ = self.metadata.write_time(MetadataKind::Timestamp);
        if let Err(e) = self.metadata.write_raw(MetadataKind::Complete, "") {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "completion write failed");
            return;
        }
        ctx.runtime.job_manager(node).end_job(&self.metadata);
        tracing::info!(fqname = %self.metadata.fqname(), "fork complete");
    }

    /// Mark the fork complete without running it (preflight-skip mode).
    pub fn skip(&self, ctx: &StepContext<'_>, node: &Node) {
        if self.metadata.exists(MetadataKind::Complete) {
            return;
        }
        if let Err(e) = self.make_dirs() {
            tracing::warn!(fqname = %self.metadata.fqname(), error = %e, "fork mkdir failed");
            return;
        }
        tracing::info!(fqname = %self.metadata.fqname(), "skipping preflight");
        self.write_completion(ctx, node, Value::Object(serde_json::Map::new()));
    }

    /// Restart after a transient failure, within the retry budget.
    fn try_retry(&self, ctx: &StepContext<'_>, node: &Node) {
        let Some(errors) = self.first_error_text() else {
            return;
        };
        if !ctx.runtime.retry.is_error_transient(&errors) {
            return;
        }
        {
            let mut retries = self.retries.lock();
            if *retries >= ctx.runtime.retry.default_retries {
                return;
            }
            *retries += 1;
            tracing::info!(
                fqname = %self.metadata.fqname(),
                retry = *retries,
                "retrying fork after transient error"
            );
        }
        self.reset_failed_parts(ctx);
    }

    /// Clear failed phases, preserving completed chunks. Restarted chunks
    /// get a fresh uniquifier so stale journal breadcrumbs cannot collide.
    fn reset_failed_parts(&self, ctx: &StepContext<'_>) {
        let _ = self.metadata.remove(MetadataKind::Errors);
        let _ = self.metadata.remove(MetadataKind::Assert);

        if let Some(split) = &self.split_metadata {
            if split.get_state() == Some(MetadataState::Failed) {
                let _ = split.remove_all();
                let _ = split.make_dirs();
            }
        }
        if let Some(join) = &self.join_metadata {
            if join.get_state() == Some(MetadataState::Failed) {
                let _ = join.remove_all();
                let _ = join.make_dirs();
            }
        }

        {
            let mut chunks = self.chunks.lock();
            let old = std::mem::take(&mut *chunks);
            *chunks = old
                .into_iter()
                .map(|chunk| {
                    if chunk.state() == MetadataState::Complete {
                        chunk
                    } else {
                        let _ = chunk.metadata().remove_all();
                        Chunk::new(
                            self.metadata.fqname(),
                            &self.path,
                            chunk.index(),
                            chunk.chunk_def().clone(),
                            Some(new_uniquifier()),
                            Arc::clone(&self.clock),
                        )
                    }
                })
                .collect();
        }

        self.clear_journal(ctx);
    }

    /// Reset the fork so it can run again. Idempotent.
    ///
    /// `full` clears everything; otherwise completed chunks (and a
    /// completed split) survive and only the remaining phases re-run.
    pub fn reset(&self, ctx: &StepContext<'_>, full: bool) -> Result<(), MetadataError> {
        if full {
            {
                let mut chunks = self.chunks.lock();
                for chunk in chunks.iter() {
                    chunk.metadata().remove_all()?;
                }
                chunks.clear();
            }
            if let Some(split) = &self.split_metadata {
                split.remove_all()?;
            }
            if let Some(join) = &self.join_metadata {
                join.remove_all()?;
            }
            self.metadata.remove_all()?;
        } else {
            // Fork-level products go; completed chunks stay
            for kind in [
                MetadataKind::Outs,
                MetadataKind::Complete,
                MetadataKind::Errors,
                MetadataKind::Assert,
                MetadataKind::Perf,
                MetadataKind::VdrKill,
                MetadataKind::ChunkOuts,
                MetadataKind::Timestamp,
                MetadataKind::JobInfo,
                MetadataKind::Log,
                MetadataKind::Heartbeat,
            ] {
                self.metadata.remove(kind)?;
            }
            if let Some(split) = &self.split_metadata {
                if split.get_state() != Some(MetadataState::Complete) {
                    split.remove_all()?;
                    split.make_dirs()?;
                }
            }
            if let Some(join) = &self.join_metadata {
                join.remove_all()?;
                join.make_dirs()?;
            }
            let mut chunks = self.chunks.lock();
            let old = std::mem::take(&mut *chunks);
            let mut kept = Vec::with_capacity(old.len());
            for chunk in old {
                if chunk.state() == MetadataState::Complete {
                    kept.push(chunk);
                } else {
                    chunk.metadata().remove_all()?;
                    kept.push(Chunk::new(
                        self.metadata.fqname(),
                        &self.path,
                        chunk.index(),
                        chunk.chunk_def().clone(),
                        None,
                        Arc::clone(&self.clock),
                    ));
                }
            }
            *chunks = kept;
        }
        self.clear_journal(ctx);
        *self.retries.lock() = 0;
        Ok(())
    }

    /// Remove journal breadcrumbs addressed to this fork.
    fn clear_journal(&self, ctx: &StepContext<'_>) {
        let Ok(entries) = std::fs::read_dir(&ctx.journal_dir) else {
            return;
        };
        // Dotted prefix so fork1 does not also clear fork10
        let prefix = format!("{}.{}.", self.node_fqname, fork_dir_name(self.index));
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }

    /// Requeue phases whose jobs died with a previous runtime process.
    pub fn restart_in_flight(&self, ctx: &StepContext<'_>) {
        let mut phases: Vec<&Arc<Metadata>> = vec![&self.metadata];
        if let Some(split) = &self.split_metadata {
            phases.push(split);
        }
        if let Some(join) = &self.join_metadata {
            phases.push(join);
        }
        let chunks = self.chunks.lock();
        for chunk in chunks.iter() {
            phases.push(chunk.metadata());
        }
        let mut any_reset = false;
        for metadata in phases {
            if matches!(
                metadata.get_state(),
                Some(MetadataState::Queued | MetadataState::QueuedLocally | MetadataState::Running)
            ) {
                for kind in [
                    MetadataKind::JobInfo,
                    MetadataKind::Log,
                    MetadataKind::Heartbeat,
                    MetadataKind::Errors,
                    MetadataKind::Assert,
                ] {
                    let _ = metadata.remove(kind);
                }
                any_reset = true;
            }
        }
        drop(chunks);
        if any_reset {
            tracing::info!(fqname = %self.metadata.fqname(), "requeued in-flight work from dead run");
            self.clear_journal(ctx);
        }
    }

    /// Recreate the chunk list from disk on reattachment.
    pub fn restore_chunks(&self) {
        let mut chunks = self.chunks.lock();
        if !chunks.is_empty() {
            return;
        }
        if let Ok(defs) = self.metadata.read::<StageDefs>(MetadataKind::ChunkDefs) {
            *chunks = self.build_chunks(&defs, None);
        }
    }

    /// Route a journal breadcrumb to the right phase metadata.
    pub fn update_journal(&self, name: &JournalName) -> bool {
        let Some(kind) = name.kind() else {
            return false;
        };
        match (name.chunk_index, name.phase()) {
            (Some(chunk_index), JournalPhase::Main) => {
                let chunks = self.chunks.lock();
                match chunks
                    .iter()
                    .find(|c| c.matches_journal(chunk_index, name.uniquifier.as_deref()))
                {
                    Some(chunk) => {
                        chunk.metadata().cache_insert(kind);
                        true
                    }
                    None => false,
                }
            }
            (None, JournalPhase::Split) => match &self.split_metadata {
                Some(split) => {
                    split.cache_insert(kind);
                    true
                }
                None => false,
            },
            (None, JournalPhase::Join) => match &self.join_metadata {
                Some(join) => {
                    join.cache_insert(kind);
                    true
                }
                None => false,
            },
            (None, JournalPhase::Main) => {
                self.metadata.cache_insert(kind);
                true
            }
            _ => false,
        }
    }

    /// First error text across the fork's phase metadatas, if any.
    pub fn first_error_text(&self) -> Option<String> {
        let mut phases: Vec<&Arc<Metadata>> = Vec::new();
        if let Some(split) = &self.split_metadata {
            phases.push(split);
        }
        let chunks = self.chunks.lock();
        for chunk in chunks.iter() {
            phases.push(chunk.metadata());
        }
        if let Some(join) = &self.join_metadata {
            phases.push(join);
        }
        phases.push(&self.metadata);
        for metadata in phases {
            for kind in [MetadataKind::Errors, MetadataKind::Assert] {
                if metadata.exists(kind) {
                    if let Ok(text) = metadata.read_raw(kind) {
                        return Some(text);
                    }
                }
            }
        }
        None
    }

    /// Write a failure and ask the job manager to signal live processes.
    pub fn kill(&self, ctx: &StepContext<'_>, node: &Node, reason: &str) {
        let state = self.state(ctx.graph, node);
        if state.is_done() || state == MetadataState::Failed {
            return;
        }
        if state.is_in_flight() || state == MetadataState::Ready {
            let _ = self.metadata.write_raw(MetadataKind::Errors, reason);
            ctx.runtime.job_manager(node).kill_job(&self.node_fqname);
        }
    }

    /// Prime metadata caches from disk (reattachment).
    pub fn load_caches(&self) {
        self.metadata.load_cache();
        if let Some(split) = &self.split_metadata {
            split.load_cache();
        }
        if let Some(join) = &self.join_metadata {
            join.load_cache();
        }
        for chunk in self.chunks.lock().iter() {
            chunk.metadata().load_cache();
        }
    }

    pub fn end_refresh(&self, start_ms: u64) {
        self.metadata.end_refresh(start_ms);
        if let Some(split) = &self.split_metadata {
            split.end_refresh(start_ms);
        }
        if let Some(join) = &self.join_metadata {
            join.end_refresh(start_ms);
        }
        for chunk in self.chunks.lock().iter() {
            chunk.metadata().end_refresh(start_ms);
        }
    }

    /// Check heartbeats on running phases; returns true if any expired.
    pub fn check_heartbeats(&self) -> bool {
        let mut expired = false;
        let mut phases: Vec<Arc<Metadata>> =
            vec![Arc::clone(&self.metadata)];
        if let Some(split) = &self.split_metadata {
            phases.push(Arc::clone(split));
        }
        if let Some(join) = &self.join_metadata {
            phases.push(Arc::clone(join));
        }
        for chunk in self.chunks.lock().iter() {
            phases.push(Arc::clone(chunk.metadata()));
        }
        for metadata in phases {
            if metadata.get_state() == Some(MetadataState::Running) {
                match metadata.check_heartbeat() {
                    Ok(true) => expired = true,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(fqname = %metadata.fqname(), error = %e, "heartbeat check failed")
                    }
                }
            }
        }
        expired
    }

    /// Perf record for `_perf` roll-up.
    pub fn perf(&self, graph: &Graph, node: &Node) -> ForkPerf {
        let chunks = self.chunks.lock();
        let chunk_perf: Vec<ChunkPerf> = chunks
            .iter()
            .map(|chunk| ChunkPerf {
                index: chunk.index(),
                state: chunk.state(),
                uniquifier: chunk.uniquifier().map(str::to_string),
            })
            .collect();
        drop(chunks);
        let vdr: Option<VdrRecord> = self.metadata.read(MetadataKind::VdrKill).ok();
        ForkPerf {
            fqname: self.metadata.fqname().to_string(),
            index: self.index,
            attempts: self.retries() + 1,
            state: self.state(graph, node),
            chunks: chunk_perf,
            vdr,
        }
    }
}

#[cfg(test)]
#[path = "fork_tests.rs"]
mod tests;
