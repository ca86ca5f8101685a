// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node: one vertex of the pipestance graph.
//!
//! Topology is immutable after graph build. Relations are stored as ids
//! into the flat node table, so there are no cyclic object references;
//! everything walks through [`crate::graph::Graph`].

use crate::binding::Binding;
use crate::fork::Fork;
use crate::graph::{Graph, NodeId};
use crate::runtime::StepContext;
use indexmap::IndexMap;
use martian_core::{Fqname, JobResources, MetadataKind, MetadataState, NodePerf};
use martian_adapters::JobSpec;
use martian_storage::{JournalPhase, Metadata, MetadataError};
use martian_mro::StageCode;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Pipeline,
    Stage,
}

martian_core::simple_display! {
    NodeKind {
        Pipeline => "pipeline",
        Stage => "stage",
    }
}

/// Stage-specific pieces of a node.
pub struct StageSpec {
    pub code: StageCode,
    pub split: bool,
    pub resources: JobResources,
}

/// One sweep source: declaration-site id plus its value set.
#[derive(Debug, Clone)]
pub struct SweepRoot {
    pub id: String,
    pub values: Vec<Value>,
}

pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) fqname: Fqname,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) path: PathBuf,
    pub(crate) parent: Option<NodeId>,
    pub(crate) stage: Option<StageSpec>,
    pub(crate) bindings: IndexMap<String, Binding>,
    pub(crate) ret_bindings: IndexMap<String, Binding>,
    pub(crate) disabled: Vec<Binding>,
    pub(crate) prenodes: Vec<NodeId>,
    pub(crate) direct_prenodes: Vec<NodeId>,
    pub(crate) postnodes: Vec<NodeId>,
    pub(crate) subnodes: Vec<NodeId>,
    pub(crate) preflight: bool,
    pub(crate) local: bool,
    pub(crate) volatile: bool,
    pub(crate) strict_volatile: bool,
    pub(crate) sweep_roots: Vec<SweepRoot>,
    /// Output param → consumers that may read files it names. A `None`
    /// consumer marks a pipeline-level return: such outputs are pinned,
    /// because a reader outside the pipestance can always arrive later.
    pub(crate) file_post_nodes: BTreeMap<String, BTreeSet<Option<NodeId>>>,
    pub(crate) forks: Vec<Fork>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn fqname(&self) -> &Fqname {
        &self.fqname
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_pipeline(&self) -> bool {
        self.kind == NodeKind::Pipeline
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn preflight(&self) -> bool {
        self.preflight
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn volatile(&self) -> bool {
        self.volatile
    }

    pub fn strict_volatile(&self) -> bool {
        self.strict_volatile
    }

    pub fn stage(&self) -> Option<&StageSpec> {
        self.stage.as_ref()
    }

    pub fn bindings(&self) -> &IndexMap<String, Binding> {
        &self.bindings
    }

    pub fn ret_bindings(&self) -> &IndexMap<String, Binding> {
        &self.ret_bindings
    }

    pub fn disabled_bindings(&self) -> &[Binding] {
        &self.disabled
    }

    pub fn prenodes(&self) -> &[NodeId] {
        &self.prenodes
    }

    pub fn direct_prenodes(&self) -> &[NodeId] {
        &self.direct_prenodes
    }

    pub fn postnodes(&self) -> &[NodeId] {
        &self.postnodes
    }

    pub fn subnodes(&self) -> &[NodeId] {
        &self.subnodes
    }

    pub fn sweep_roots(&self) -> &[SweepRoot] {
        &self.sweep_roots
    }

    pub fn file_post_nodes(&self) -> &BTreeMap<String, BTreeSet<Option<NodeId>>> {
        &self.file_post_nodes
    }

    pub fn forks(&self) -> &[Fork] {
        &self.forks
    }

    /// The unique fork whose permutation is a subset of `permute`.
    ///
    /// Uniqueness follows from the sweep-root invariants; if they are ever
    /// violated the lowest index wins and the mismatch is logged.
    pub fn fork_matching(
        &self,
        permute: &IndexMap<String, Value>,
    ) -> Option<&Fork> {
        let mut matches = self
            .forks
            .iter()
            .filter(|f| crate::binding::permute_subset(f.arg_permute(), permute));
        let first = matches.next();
        if matches.next().is_some() {
            debug_assert!(false, "multiple forks of {} match one permutation", self.fqname);
            tracing::error!(fqname = %self.fqname, "multiple forks match one permutation");
        }
        first
    }

    /// Every fork agreeing with `permute` on shared sweep roots.
    pub fn forks_agreeing(&self, permute: &IndexMap<String, Value>) -> Vec<&Fork> {
        self.forks
            .iter()
            .filter(|f| crate::binding::permute_agrees(f.arg_permute(), permute))
            .collect()
    }

    /// Roll up fork states into the node state.
    pub fn state(&self, graph: &Graph) -> MetadataState {
        let fork_states: Vec<MetadataState> =
            self.forks.iter().map(|f| f.state(graph, self)).collect();

        if fork_states.iter().any(|s| s.is_failed()) {
            return MetadataState::Failed;
        }
        if !fork_states.is_empty()
            && fork_states.iter().all(|s| *s == MetadataState::DisabledState)
        {
            return MetadataState::DisabledState;
        }
        if fork_states.iter().all(|s| s.is_done()) {
            return MetadataState::Complete;
        }
        for pre in &self.prenodes {
            if !graph.node(*pre).state(graph).is_done() {
                return MetadataState::Waiting;
            }
        }
        MetadataState::Running
    }

    /// Step every fork in stable index order.
    pub fn step(&self, ctx: &StepContext<'_>) {
        if self.preflight && ctx.runtime.config.skip_preflight {
            for fork in &self.forks {
                fork.skip(ctx, self);
            }
            return;
        }
        // Non-preflight work holds until every preflight has passed
        if !self.preflight && !ctx.preflights_done && self.stage.is_some() {
            return;
        }
        for fork in &self.forks {
            fork.step(ctx, self);
        }
    }

    /// Create the node and fork directories.
    pub fn mkdirs(&self) -> Result<(), MetadataError> {
        for fork in &self.forks {
            fork.make_dirs()?;
        }
        Ok(())
    }

    /// Submit one phase job through the job manager this node routes to.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_job(
        &self,
        ctx: &StepContext<'_>,
        metadata: &Arc<Metadata>,
        shell_name: &str,
        phase: JournalPhase,
        fork_index: usize,
        chunk_index: Option<usize>,
        uniquifier: Option<String>,
        extra: JobResources,
    ) {
        let base = self
            .stage
            .as_ref()
            .map(|s| s.resources.clone())
            .unwrap_or_default()
            .overridden_by(extra);
        let requested =
            ctx.runtime.overrides.resources_for(&self.fqname, shell_name, base);
        let manager = ctx.runtime.job_manager(self);
        let clamped = manager.get_system_reqs(&requested);
        let job_mode = if ctx.runtime.routes_local(self) {
            "local".to_string()
        } else {
            ctx.runtime.config.jobmode.clone()
        };

        let spec = JobSpec {
            shell_cmd: ctx.runtime.config.adapter_cmd.clone(),
            argv: self.job_argv(metadata, shell_name),
            env: vec![("TMPDIR".to_string(), ctx.tmp_dir.to_string_lossy().into_owned())],
            resources: clamped.clone(),
            fqname: self.fqname.clone(),
            fork_index,
            chunk_index,
            uniquifier,
            shell_name: shell_name.to_string(),
            phase,
            journal_dir: ctx.journal_dir.clone(),
        };

        let info = martian_adapters::local::job_info(&spec, &job_mode, &clamped);
        if let Err(e) = metadata.write(MetadataKind::JobInfo, &info) {
            tracing::warn!(fqname = %metadata.fqname(), error = %e, "jobinfo write failed");
            return;
        }
        tracing::info!(
            fqname = %metadata.fqname(),
            shell = shell_name,
            mode = %job_mode,
            "submitting job"
        );
        manager.exec_job(spec, Arc::clone(metadata), ctx.runtime.routes_local(self));
    }

    /// Argv layout differs only by stage language.
    fn job_argv(&self, metadata: &Arc<Metadata>, shell_name: &str) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(stage) = &self.stage {
            argv.push(stage.code.lang.to_string());
            argv.push(stage.code.cmd.clone());
            argv.extend(stage.code.args.iter().cloned());
        }
        argv.push(self.fqname.to_string());
        argv.push(shell_name.to_string());
        argv.push(metadata.path().to_string_lossy().into_owned());
        argv
    }

    /// First observed fatal error among this node's forks.
    pub fn first_error(&self) -> Option<(Fqname, String)> {
        for fork in &self.forks {
            if let Some(text) = fork.first_error_text() {
                return Some((fork.metadata().fqname().clone(), text));
            }
        }
        None
    }

    /// Reset fork state on disk. `full` removes the whole stage directory.
    pub fn reset(&self, ctx: &StepContext<'_>, full: bool) -> Result<(), MetadataError> {
        if full {
            match std::fs::remove_dir_all(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(MetadataError::Io { path: self.path.clone(), source: e })
                }
            }
        }
        for fork in &self.forks {
            fork.reset(ctx, full)?;
        }
        for fork in &self.forks {
            fork.load_caches();
        }
        Ok(())
    }

    pub fn kill(&self, ctx: &StepContext<'_>, reason: &str) {
        for fork in &self.forks {
            fork.kill(ctx, self, reason);
        }
    }

    pub fn load_caches(&self) {
        for fork in &self.forks {
            fork.load_caches();
            fork.restore_chunks();
        }
    }

    pub fn end_refresh(&self, start_ms: u64) {
        for fork in &self.forks {
            fork.end_refresh(start_ms);
        }
    }

    pub fn check_heartbeats(&self) -> bool {
        let mut expired = false;
        for fork in &self.forks {
            if fork.check_heartbeats() {
                expired = true;
            }
        }
        expired
    }

    /// Requeue in-flight work after the previous runtime died.
    pub fn restart_in_flight(&self, ctx: &StepContext<'_>) {
        for fork in &self.forks {
            fork.restart_in_flight(ctx);
        }
    }

    pub fn perf(&self, graph: &Graph) -> NodePerf {
        NodePerf {
            fqname: self.fqname.to_string(),
            forks: self.forks.iter().map(|f| f.perf(graph, self)).collect(),
        }
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
