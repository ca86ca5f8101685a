// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipestance: one running instance of a pipeline, rooted at a directory.

use crate::frontier::Frontier;
use crate::graph::{Graph, GraphError};
use crate::journal;
use crate::runtime::{Runtime, StepContext, VdrMode};
use crate::vdr;
use fs2::FileExt as _;
use martian_core::{Fqname, MetadataKind, MetadataState, Versions};
use martian_mro::{equivalent_call, CompileError, InvocationData, ParseError};
use martian_storage::{archive_metadata, unarchive_metadata, ArchiveError, Metadata, MetadataError};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipestanceError {
    #[error("pipestance directory {0} already contains files")]
    Exists(PathBuf),
    #[error("{0} is not a pipestance (no _invocation)")]
    NotAPipestance(PathBuf),
    #[error("invocation on disk does not match the given source")]
    InvocationMismatch,
    #[error("mrosource call is not equivalent to the invocation")]
    SourceDrift,
    #[error("pipestance was invoked with jobmode {disk}, current is {current}")]
    JobModeMismatch { disk: String, current: String },
    #[error("invalid VDR mode {0:?}")]
    InvalidVdrMode(String),
    #[error("failed to acquire pipestance lock: another instance running?")]
    LockFailed(#[source] std::io::Error),
    #[error("preflight stage {fqname} failed: {message}")]
    PreflightFailure { fqname: String, message: String },
    #[error("stage {fqname} failed: {message}")]
    StageFailure { fqname: String, message: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipestanceError {
    /// Process exit code: 1 user error, 2 runtime fatal, 3 preflight.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipestanceError::Exists(_)
            | PipestanceError::NotAPipestance(_)
            | PipestanceError::InvocationMismatch
            | PipestanceError::SourceDrift
            | PipestanceError::JobModeMismatch { .. }
            | PipestanceError::InvalidVdrMode(_)
            | PipestanceError::Parse(_) => 1,
            PipestanceError::PreflightFailure { .. } => 3,
            _ => 2,
        }
    }
}

/// How to reattach to an existing pipestance.
#[derive(Default)]
pub struct ReattachOptions<'a> {
    /// Skip locking and all mutation (inspection only).
    pub read_only: bool,
    /// Byte-compare this source against `_invocation` before anything else.
    pub check_src: Option<&'a str>,
    /// Rebuild the call from `_invocation` instead of `_mrosource`; the
    /// two are checked for equivalence either way.
    pub from_invocation: bool,
}

#[derive(Debug, Serialize)]
struct ForkFinalState {
    index: usize,
    state: MetadataState,
}

#[derive(Debug, Serialize)]
struct NodeFinalState {
    fqname: String,
    state: MetadataState,
    forks: Vec<ForkFinalState>,
}

const STEP_INTERVAL: Duration = Duration::from_millis(500);

pub struct Pipestance {
    psid: String,
    path: PathBuf,
    runtime: Arc<Runtime>,
    graph: Graph,
    frontier: Frontier,
    /// Top-level seed metadata (`_invocation`, `_uuid`, ...).
    metadata: Arc<Metadata>,
    lock_file: Mutex<Option<std::fs::File>>,
    read_only: bool,
    terminate: AtomicBool,
    terminate_reason: Mutex<Option<String>>,
}

impl Pipestance {
    /// Create a new pipestance in an empty directory and build its graph.
    /// Any failure rolls the directory back off disk.
    pub fn invoke(
        runtime: Arc<Runtime>,
        psid: &str,
        path: &Path,
        src: &str,
        tags: &[String],
    ) -> Result<Self, PipestanceError> {
        ensure_empty(path)?;
        std::fs::create_dir_all(path).map_err(|e| io_err(path, e))?;
        match Self::invoke_inner(runtime, psid, path, src, tags) {
            Ok(ps) => Ok(ps),
            Err(e) => {
                let _ = std::fs::remove_dir_all(path);
                Err(e)
            }
        }
    }

    fn invoke_inner(
        runtime: Arc<Runtime>,
        psid: &str,
        path: &Path,
        src: &str,
        tags: &[String],
    ) -> Result<Self, PipestanceError> {
        std::fs::create_dir_all(path.join("journal")).map_err(|e| io_err(path, e))?;
        std::fs::create_dir_all(path.join("tmp")).map_err(|e| io_err(path, e))?;

        let ast = runtime.cache.compile(&*runtime.compiler, src, &runtime.config.mropaths)?;
        let graph = Graph::build(&ast, psid, path, Arc::clone(&runtime.clock))?;

        let metadata = Arc::new(Metadata::new(
            Fqname::from_string(format!("ID.{}", psid)),
            path.to_path_buf(),
            Arc::clone(&runtime.clock),
        ));

        let invocation = match &ast.call {
            Some(call) => InvocationData::from_call(call, ast.include.clone()),
            None => return Err(GraphError::NoCall.into()),
        };
        metadata.write_raw(MetadataKind::Invocation, &invocation.build_call_source())?;
        metadata.write_raw(MetadataKind::MroSource, src)?;
        metadata.write_raw(MetadataKind::JobMode, &runtime.config.jobmode)?;
        metadata
            .write(MetadataKind::Versions, &Versions::current(&runtime.config.pipelines_version))?;
        metadata.write(MetadataKind::Tags, &tags.to_vec())?;
        metadata.write_raw(MetadataKind::Uuid, &force_or_new_uuid())?;
        metadata.write_time(MetadataKind::Timestamp)?;

        let pipestance = Self {
            psid: psid.to_string(),
            path: path.to_path_buf(),
            runtime,
            graph,
            frontier: Frontier::new(),
            metadata,
            lock_file: Mutex::new(None),
            read_only: false,
            terminate: AtomicBool::new(false),
            terminate_reason: Mutex::new(None),
        };
        pipestance.acquire_lock()?;
        pipestance.graph.make_dirs()?;
        for id in pipestance.graph.node_ids() {
            pipestance.frontier.add(id);
        }
        tracing::info!(psid, path = %path.display(), "pipestance invoked");
        Ok(pipestance)
    }

    /// Reattach to a pipestance left on disk by a previous run.
    pub fn reattach(
        runtime: Arc<Runtime>,
        psid: &str,
        path: &Path,
        opts: ReattachOptions<'_>,
    ) -> Result<Self, PipestanceError> {
        let metadata = Arc::new(Metadata::new(
            Fqname::from_string(format!("ID.{}", psid)),
            path.to_path_buf(),
            Arc::clone(&runtime.clock),
        ));
        if !metadata.exists(MetadataKind::Invocation) {
            return Err(PipestanceError::NotAPipestance(path.to_path_buf()));
        }
        if let Some(src) = opts.check_src {
            if metadata.read_raw(MetadataKind::Invocation)? != src {
                return Err(PipestanceError::InvocationMismatch);
            }
        }
        let disk_jobmode = metadata.read_raw(MetadataKind::JobMode)?;
        if disk_jobmode != runtime.config.jobmode {
            return Err(PipestanceError::JobModeMismatch {
                disk: disk_jobmode,
                current: runtime.config.jobmode.clone(),
            });
        }
        if !opts.read_only {
            let restored = unarchive_metadata(path)?;
            if restored > 0 {
                tracing::info!(restored, "unarchived metadata bundle");
            }
        }

        let mrosource = metadata.read_raw(MetadataKind::MroSource)?;
        let ast_src =
            runtime.cache.compile(&*runtime.compiler, &mrosource, &runtime.config.mropaths)?;
        let ast = if opts.from_invocation {
            // Both rebuild paths exist; keep them honest against each other
            let invocation_text = metadata.read_raw(MetadataKind::Invocation)?;
            let data = InvocationData::build_call_data(&invocation_text)?;
            let call = data.to_call_stm();
            match &ast_src.call {
                Some(src_call) if equivalent_call(src_call, &call) => {}
                _ => return Err(PipestanceError::SourceDrift),
            }
            let mut ast = (*ast_src).clone();
            ast.include = data.include.clone();
            ast.call = Some(call);
            Arc::new(ast)
        } else {
            ast_src
        };

        let graph = Graph::build(&ast, psid, path, Arc::clone(&runtime.clock))?;
        let pipestance = Self {
            psid: psid.to_string(),
            path: path.to_path_buf(),
            runtime,
            graph,
            frontier: Frontier::new(),
            metadata,
            lock_file: Mutex::new(None),
            read_only: opts.read_only,
            terminate: AtomicBool::new(false),
            terminate_reason: Mutex::new(None),
        };
        if !pipestance.read_only {
            pipestance.acquire_lock()?;
        }
        for node in pipestance.graph.nodes() {
            node.load_caches();
        }
        if !pipestance.read_only {
            pipestance.restart_running_nodes();
        }
        for id in pipestance.graph.node_ids() {
            pipestance.frontier.add(id);
        }
        tracing::info!(psid, path = %path.display(), "pipestance reattached");
        Ok(pipestance)
    }

    fn acquire_lock(&self) -> Result<(), PipestanceError> {
        let lock_path = self.path.join(MetadataKind::Lock.file_name());
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_err(&lock_path, e))?;
        file.try_lock_exclusive().map_err(PipestanceError::LockFailed)?;
        *self.lock_file.lock() = Some(file);
        Ok(())
    }

    /// Release the advisory lock (also happens when dropped).
    pub fn unlock(&self) {
        *self.lock_file.lock() = None;
    }

    pub fn psid(&self) -> &str {
        &self.psid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn uuid(&self) -> Option<String> {
        self.metadata.read_raw(MetadataKind::Uuid).ok()
    }

    fn step_context(&self, preflights_done: bool) -> StepContext<'_> {
        StepContext {
            runtime: &self.runtime,
            graph: &self.graph,
            path: &self.path,
            journal_dir: self.path.join("journal"),
            tmp_dir: self.path.join("tmp"),
            preflights_done,
            read_only: self.read_only,
        }
    }

    fn preflights_done(&self) -> bool {
        self.graph
            .nodes()
            .filter(|n| n.preflight())
            .all(|n| n.state(&self.graph).is_done() || self.runtime.config.skip_preflight)
    }

    /// One scheduler tick: journal, heartbeats, then the frontier pass.
    pub fn step(&self) -> MetadataState {
        journal::process_tick(
            &self.graph,
            &self.frontier,
            &self.path.join("journal"),
            &*self.runtime.clock,
            self.runtime.queue_grace(),
            self.read_only,
        );

        for id in self.frontier.snapshot() {
            self.graph.node(id).check_heartbeats();
        }

        let ctx = self.step_context(self.preflights_done());
        for id in self.frontier.snapshot() {
            let node = self.graph.node(id);
            let state = node.state(&self.graph);
            if state == MetadataState::Running || state == MetadataState::Failed {
                if !self.read_only {
                    node.step(&ctx);
                }
            }
            match node.state(&self.graph) {
                MetadataState::Complete | MetadataState::DisabledState => {
                    if self.runtime.config.vdr_mode.is_rolling() && !self.read_only {
                        vdr::vdr_kill_node(
                            &self.graph,
                            node,
                            &*self.runtime.clock,
                            self.runtime.config.vdr_mode,
                        );
                        for pre in node.prenodes() {
                            vdr::vdr_kill_node(
                                &self.graph,
                                self.graph.node(*pre),
                                &*self.runtime.clock,
                                self.runtime.config.vdr_mode,
                            );
                        }
                    }
                    self.frontier.remove(id);
                    for post in node.postnodes() {
                        self.frontier.add(*post);
                    }
                }
                _ => {}
            }
        }
        self.get_state()
    }

    pub fn get_state(&self) -> MetadataState {
        self.graph.top().state(&self.graph)
    }

    /// Ask the run loop to stop; the next tick kills outstanding work.
    pub fn request_terminate(&self, reason: &str) {
        *self.terminate_reason.lock() = Some(reason.to_string());
        self.terminate.store(true, Ordering::SeqCst);
    }

    /// Drive the step loop until the pipestance reaches a terminal state.
    pub async fn run(&self) -> Result<MetadataState, PipestanceError> {
        let result = loop {
            if self.terminate.load(Ordering::SeqCst) {
                let reason = self
                    .terminate_reason
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "terminated".to_string());
                self.kill(&reason);
                // One more tick so the failure is observed and recorded
                self.step();
                break Err(self.failure_error());
            }
            match self.step() {
                state if state.is_done() => break Ok(state),
                MetadataState::Failed => break Err(self.failure_error()),
                _ => tokio::time::sleep(STEP_INTERVAL).await,
            }
        };
        if !self.read_only {
            if let Err(e) = self.write_terminal_state() {
                tracing::warn!(error = %e, "terminal state not fully recorded");
            }
        }
        self.run_onfinish(&result);
        result
    }

    /// Write an `_errors` into every live fork and signal their jobs.
    pub fn kill(&self, reason: &str) {
        tracing::warn!(psid = %self.psid, reason, "killing pipestance");
        let ctx = self.step_context(true);
        for node in self.graph.nodes() {
            node.kill(&ctx, reason);
        }
    }

    /// Reset failed nodes so a restarted pipestance can retry them.
    /// `full_stage_reset` removes the whole stage directory; otherwise
    /// completed chunks are preserved.
    pub fn reset_failed(&self) -> Result<(), PipestanceError> {
        let ctx = self.step_context(false);
        for node in self.graph.nodes() {
            if node.state(&self.graph) == MetadataState::Failed {
                tracing::info!(fqname = %node.fqname(), "resetting failed node");
                node.reset(&ctx, self.runtime.config.full_stage_reset)?;
                self.frontier.add(node.id());
            }
        }
        Ok(())
    }

    /// Requeue forks whose jobs died with a previous runtime process.
    fn restart_running_nodes(&self) {
        let ctx = self.step_context(false);
        for node in self.graph.nodes() {
            node.restart_in_flight(&ctx);
        }
    }

    fn failure_error(&self) -> PipestanceError {
        for node in self.graph.nodes() {
            if node.state(&self.graph) == MetadataState::Failed {
                let (fqname, message) = node
                    .first_error()
                    .map(|(fq, text)| (fq.to_string(), text))
                    .unwrap_or_else(|| (node.fqname().to_string(), "unknown failure".to_string()));
                return if node.preflight() {
                    PipestanceError::PreflightFailure { fqname, message }
                } else {
                    PipestanceError::StageFailure { fqname, message }
                };
            }
        }
        PipestanceError::StageFailure {
            fqname: self.graph.top().fqname().to_string(),
            message: "pipestance failed".to_string(),
        }
    }

    /// `_finalstate` and `_perf` are recorded on terminal exit regardless
    /// of success.
    fn write_terminal_state(&self) -> Result<(), PipestanceError> {
        let finalstate: Vec<NodeFinalState> = self
            .graph
            .nodes()
            .map(|node| NodeFinalState {
                fqname: node.fqname().to_string(),
                state: node.state(&self.graph),
                forks: node
                    .forks()
                    .iter()
                    .map(|fork| ForkFinalState {
                        index: fork.index(),
                        state: fork.state(&self.graph, node),
                    })
                    .collect(),
            })
            .collect();
        self.metadata.write(MetadataKind::FinalState, &finalstate)?;
        self.metadata.write(MetadataKind::Perf, &self.graph.perf())?;
        Ok(())
    }

    /// Post-run cleanup: post-mode VDR, metadata archival, tmp removal.
    pub fn post_process(&self) -> Result<(), PipestanceError> {
        if self.read_only {
            return Ok(());
        }
        if self.runtime.config.vdr_mode == VdrMode::Post {
            for node in self.graph.nodes() {
                vdr::vdr_kill_node(&self.graph, node, &*self.runtime.clock, VdrMode::Post);
            }
        }
        let archived = archive_metadata(&self.path)?;
        tracing::info!(archived, "metadata archived");
        let tmp = self.path.join("tmp");
        if tmp.exists() {
            std::fs::remove_dir_all(&tmp).map_err(|e| io_err(&tmp, e))?;
        }
        Ok(())
    }

    fn run_onfinish(&self, result: &Result<MetadataState, PipestanceError>) {
        let Some(hook) = &self.runtime.config.onfinish else {
            return;
        };
        let state = match result {
            Ok(state) => state.to_string(),
            Err(_) => MetadataState::Failed.to_string(),
        };
        match std::process::Command::new(hook)
            .arg(&self.path)
            .arg(&self.psid)
            .arg(&state)
            .spawn()
        {
            Ok(_) => tracing::info!(hook, state, "onfinish hook spawned"),
            Err(e) => tracing::warn!(hook, error = %e, "onfinish hook failed to spawn"),
        }
    }
}

/// Parse an operator-supplied VDR mode, as a user error when invalid.
pub fn parse_vdr_mode(value: &str) -> Result<VdrMode, PipestanceError> {
    VdrMode::parse(value).ok_or_else(|| PipestanceError::InvalidVdrMode(value.to_string()))
}

fn force_or_new_uuid() -> String {
    match std::env::var("MRO_FORCE_UUID") {
        Ok(uuid) if !uuid.is_empty() => uuid,
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

fn io_err(path: &Path, source: std::io::Error) -> PipestanceError {
    PipestanceError::Io { path: path.to_path_buf(), source }
}

/// A pipestance directory must start empty; dotfiles are tolerated.
fn ensure_empty(path: &Path) -> Result<(), PipestanceError> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(path, e)),
    };
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with('.') {
            return Err(PipestanceError::Exists(path.to_path_buf()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "pipestance_tests.rs"]
mod tests;
