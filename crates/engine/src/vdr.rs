// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Volatile Data Removal.
//!
//! A completed fork's output files become reclaimable once every tracked
//! consumer is complete or disabled; in strict mode a consumer that is
//! itself strict-volatile does not pin. Pipeline-level returns register a
//! `None` consumer, which never satisfies, so those files are pinned.
//! Collection is all-or-nothing per fork: it runs only when every
//! tracked output is consumable, then deletes the files those outputs
//! name and records the reclaim in `_vdrkill`.

use crate::fork::Fork;
use crate::graph::Graph;
use crate::node::Node;
use crate::runtime::VdrMode;
use martian_core::{Clock, MetadataKind, MetadataState, VdrEvent, VdrRecord};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Whether this node's outputs participate in VDR under `mode`.
pub fn node_eligible(node: &Node, mode: VdrMode) -> bool {
    match mode {
        VdrMode::Disable => false,
        VdrMode::Rolling | VdrMode::Post => node.volatile(),
        VdrMode::Strict => node.volatile() || node.strict_volatile(),
    }
}

/// Reclaim every completed fork of a node, if eligible.
pub fn vdr_kill_node(graph: &Graph, node: &Node, clock: &dyn Clock, mode: VdrMode) {
    if !node_eligible(node, mode) {
        return;
    }
    for fork in node.forks() {
        vdr_kill_fork(graph, node, fork, clock, mode);
    }
}

fn vdr_kill_fork(graph: &Graph, node: &Node, fork: &Fork, clock: &dyn Clock, mode: VdrMode) {
    if fork.metadata().exists(MetadataKind::VdrKill) {
        return;
    }
    if fork.state(graph, node) != MetadataState::Complete {
        return;
    }
    let tracked = node.file_post_nodes();
    if tracked.is_empty() {
        return;
    }
    for consumers in tracked.values() {
        for consumer in consumers {
            match consumer {
                // Pipeline-level output: pinned forever
                None => return,
                Some(id) => {
                    let consumer_node = graph.node(*id);
                    if consumer_node.state(graph).is_done() {
                        continue;
                    }
                    // Strict mode: a remaining strict-volatile consumer
                    // does not pin
                    if mode == VdrMode::Strict && consumer_node.strict_volatile() {
                        continue;
                    }
                    return;
                }
            }
        }
    }

    let outs: Value = match fork.metadata().read(MetadataKind::Outs) {
        Ok(outs) => outs,
        Err(e) => {
            tracing::warn!(fqname = %fork.metadata().fqname(), error = %e, "outs unreadable for VDR");
            return;
        }
    };

    let mut candidates = Vec::new();
    for output in tracked.keys() {
        if let Some(value) = outs.get(output) {
            collect_paths(value, &mut candidates);
        }
    }

    let mut events = Vec::new();
    let mut paths = Vec::new();
    let mut total = 0u64;
    for candidate in candidates {
        let Some(resolved) = resolve_candidate(&candidate, fork.path()) else {
            continue;
        };
        let Some(size) = remove_path(&resolved) else {
            continue;
        };
        total += size;
        paths.push(candidate.clone());
        events.push(VdrEvent { path: candidate, size, timestamp: clock.timestamp() });
    }

    let record = VdrRecord {
        count: events.len(),
        size: total,
        timestamp: clock.timestamp(),
        paths,
        events,
    };
    tracing::info!(
        fqname = %fork.metadata().fqname(),
        count = record.count,
        bytes = record.size,
        "VDR reclaimed"
    );
    if let Err(e) = fork.metadata().write(MetadataKind::VdrKill, &record) {
        tracing::warn!(fqname = %fork.metadata().fqname(), error = %e, "vdrkill write failed");
    }
}

/// Gather every string in the value tree as a candidate path.
fn collect_paths(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_paths(item, out);
            }
        }
        Value::Object(items) => {
            for item in items.values() {
                collect_paths(item, out);
            }
        }
        _ => {}
    }
}

/// Map an outs string to a deletable path, refusing anything that lands
/// outside the fork directory.
fn resolve_candidate(candidate: &str, fork_path: &Path) -> Option<PathBuf> {
    let path = Path::new(candidate);
    let resolved = if path.is_absolute() { path.to_path_buf() } else { fork_path.join(path) };
    if resolved.starts_with(fork_path) && !candidate.contains("..") {
        Some(resolved)
    } else {
        None
    }
}

/// Delete a file or directory, returning its size. `None` when absent.
fn remove_path(path: &Path) -> Option<u64> {
    let meta = std::fs::symlink_metadata(path).ok()?;
    if meta.is_dir() {
        let size = dir_size(path);
        std::fs::remove_dir_all(path).ok()?;
        Some(size)
    } else {
        std::fs::remove_file(path).ok()?;
        Some(meta.len())
    }
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let p = entry.path();
            match entry.metadata() {
                Ok(meta) if meta.is_dir() => dir_size(&p),
                Ok(meta) => meta.len(),
                Err(_) => 0,
            }
        })
        .sum()
}

#[cfg(test)]
#[path = "vdr_tests.rs"]
mod tests;
