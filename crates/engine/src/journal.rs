// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journal watcher: turn breadcrumb files into cache updates.
//!
//! Jobs report transitions by dropping tiny files into `journal/`. Each
//! tick globs the directory, routes every parsed name to its fork, then
//! calls `end_refresh(start)` on the frontier so that any "file absent"
//! observation cached before the tick began cannot mask a write that
//! landed during it.

use crate::frontier::Frontier;
use crate::graph::Graph;
use martian_core::Clock;
use martian_storage::JournalName;
use std::path::Path;
use std::time::Duration;

/// Process one journal tick. Returns the number of applied updates.
pub fn process_tick(
    graph: &Graph,
    frontier: &Frontier,
    journal_dir: &Path,
    clock: &dyn Clock,
    grace: Duration,
    read_only: bool,
) -> usize {
    let start_ms = clock.epoch_ms().saturating_sub(grace.as_millis() as u64);
    let mut updates = 0;

    let mut entries: Vec<(String, std::path::PathBuf)> = match std::fs::read_dir(journal_dir) {
        Ok(dir) => dir
            .flatten()
            .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "journal directory unreadable");
            Vec::new()
        }
    };
    entries.sort();

    for (name, path) in entries {
        if name.ends_with(".tmp") {
            continue;
        }
        match JournalName::parse(&name) {
            Some(parsed) => {
                let applied = graph
                    .node_by_fqname(&parsed.fqname)
                    .and_then(|id| graph.node(id).forks().get(parsed.fork_index))
                    .is_some_and(|fork| fork.update_journal(&parsed));
                if applied {
                    updates += 1;
                    tracing::info!(
                        fqname = %parsed.fqname,
                        fork = parsed.fork_index,
                        chunk = parsed.chunk_index,
                        state = %parsed.state,
                        "journal update"
                    );
                } else {
                    tracing::debug!(name = %name, "ignoring unmatched journal entry");
                }
            }
            None => tracing::debug!(name = %name, "ignoring unparsable journal entry"),
        }
        if !read_only {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "journal entry not removed");
            }
        }
    }

    // Invalidate stale absences observed before this tick began
    for id in frontier.snapshot() {
        graph.node(id).end_refresh(start_ms);
    }
    updates
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
