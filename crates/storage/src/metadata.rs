// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed, filesystem-backed metadata store for one node, fork, or chunk.
//!
//! Presence of a file is the primary signal, so the store keeps a small
//! existence cache. Negative observations carry the time they were made:
//! `end_refresh(start)` drops any "absent" entry observed before `start`,
//! which is what keeps a cached miss from masking a write that landed
//! after a journal tick began.

use martian_core::{Clock, Fqname, MetadataKind, MetadataState};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Cap on metadata reads. Large files (stage outs can be huge) are refused
/// rather than ballooning the step loop's memory.
pub const METADATA_READ_CAP: u64 = 1 << 30;

/// Minutes a running job may go without touching `_heartbeat` before the
/// fork is declared failed.
pub const HEARTBEAT_TIMEOUT_MINUTES: u64 = 60;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} is {size} bytes, over the {cap} byte read cap")]
    TooLarge { path: PathBuf, size: u64, cap: u64 },
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    exists: bool,
    /// Epoch ms when the observation was made; only meaningful for
    /// negative entries, which are the ones `end_refresh` can drop.
    observed_at_ms: u64,
}

/// Metadata store rooted at one directory.
pub struct Metadata {
    fqname: Fqname,
    path: PathBuf,
    clock: Arc<dyn Clock>,
    cache: Mutex<HashMap<MetadataKind, CacheEntry>>,
}

impl Metadata {
    pub fn new(fqname: Fqname, path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self { fqname, path, clock, cache: Mutex::new(HashMap::new()) }
    }

    pub fn fqname(&self) -> &Fqname {
        &self.fqname
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory where a stage writes its output files.
    pub fn files_path(&self) -> PathBuf {
        self.path.join("files")
    }

    pub fn make_path(&self, kind: MetadataKind) -> PathBuf {
        self.path.join(kind.file_name())
    }

    /// Create the metadata directory and its `files/` subdirectory.
    pub fn make_dirs(&self) -> Result<(), MetadataError> {
        std::fs::create_dir_all(self.files_path()).map_err(|e| self.io_err(self.files_path(), e))
    }

    fn io_err(&self, path: PathBuf, source: std::io::Error) -> MetadataError {
        MetadataError::Io { path, source }
    }

    /// Whether the file exists, consulting the cache first.
    pub fn exists(&self, kind: MetadataKind) -> bool {
        if let Some(entry) = self.cache.lock().get(&kind) {
            return entry.exists;
        }
        let exists = self.make_path(kind).exists();
        self.observe(kind, exists);
        exists
    }

    fn observe(&self, kind: MetadataKind, exists: bool) {
        let observed_at_ms = self.clock.epoch_ms();
        self.cache.lock().insert(kind, CacheEntry { exists, observed_at_ms });
    }

    /// Record that a journal breadcrumb announced this kind.
    pub fn cache_insert(&self, kind: MetadataKind) {
        self.observe(kind, true);
    }

    /// Scan the directory once and prime the cache for every kind.
    pub fn load_cache(&self) {
        let mut present = std::collections::HashSet::new();
        if let Ok(entries) = std::fs::read_dir(&self.path) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if let Some(bare) = name.to_string_lossy().strip_prefix('_') {
                    if let Some(kind) = MetadataKind::parse(bare) {
                        present.insert(kind);
                    }
                }
            }
        }
        let observed_at_ms = self.clock.epoch_ms();
        let mut cache = self.cache.lock();
        for kind in MetadataKind::ALL {
            cache.insert(*kind, CacheEntry { exists: present.contains(kind), observed_at_ms });
        }
    }

    /// Drop negative observations made before `start_ms`.
    ///
    /// A lookup that missed before the journal tick began must not mask a
    /// file written during the tick.
    pub fn end_refresh(&self, start_ms: u64) {
        self.cache.lock().retain(|_, entry| entry.exists || entry.observed_at_ms >= start_ms);
    }

    /// Write a JSON value atomically.
    pub fn write<T: Serialize>(&self, kind: MetadataKind, value: &T) -> Result<(), MetadataError> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| MetadataError::Json { path: self.make_path(kind), source: e })?;
        self.write_raw(kind, &text)
    }

    /// Write raw contents atomically (temp file + rename).
    pub fn write_raw(&self, kind: MetadataKind, contents: &str) -> Result<(), MetadataError> {
        let dest = self.make_path(kind);
        let tmp = dest.with_extension("tmp");
        std::fs::write(&tmp, contents).map_err(|e| self.io_err(tmp.clone(), e))?;
        std::fs::rename(&tmp, &dest).map_err(|e| self.io_err(dest.clone(), e))?;
        self.observe(kind, true);
        Ok(())
    }

    /// Append a line to the file (used for `_log`); not atomic.
    pub fn append_raw(&self, kind: MetadataKind, line: &str) -> Result<(), MetadataError> {
        use std::io::Write as _;
        let dest = self.make_path(kind);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&dest)
            .map_err(|e| self.io_err(dest.clone(), e))?;
        writeln!(file, "{}", line).map_err(|e| self.io_err(dest.clone(), e))?;
        self.observe(kind, true);
        Ok(())
    }

    /// Write the current timestamp.
    pub fn write_time(&self, kind: MetadataKind) -> Result<(), MetadataError> {
        self.write_raw(kind, &self.clock.timestamp())
    }

    pub fn read_raw(&self, kind: MetadataKind) -> Result<String, MetadataError> {
        self.read_raw_with_cap(kind, METADATA_READ_CAP)
    }

    pub fn read_raw_with_cap(
        &self,
        kind: MetadataKind,
        cap: u64,
    ) -> Result<String, MetadataError> {
        let path = self.make_path(kind);
        let meta = std::fs::metadata(&path).map_err(|e| self.io_err(path.clone(), e))?;
        if meta.len() > cap {
            return Err(MetadataError::TooLarge { path, size: meta.len(), cap });
        }
        std::fs::read_to_string(&path).map_err(|e| self.io_err(path, e))
    }

    /// Read and decode a JSON value.
    pub fn read<T: DeserializeOwned>(&self, kind: MetadataKind) -> Result<T, MetadataError> {
        self.read_with_cap(kind, METADATA_READ_CAP)
    }

    /// Read and decode a JSON value, refusing files over `cap` bytes.
    pub fn read_with_cap<T: DeserializeOwned>(
        &self,
        kind: MetadataKind,
        cap: u64,
    ) -> Result<T, MetadataError> {
        let path = self.make_path(kind);
        let text = self.read_raw_with_cap(kind, cap)?;
        serde_json::from_str(&text).map_err(|e| MetadataError::Json { path, source: e })
    }

    pub fn open_file(&self, kind: MetadataKind) -> Result<std::fs::File, MetadataError> {
        let path = self.make_path(kind);
        std::fs::File::open(&path).map_err(|e| self.io_err(path, e))
    }

    pub fn remove(&self, kind: MetadataKind) -> Result<(), MetadataError> {
        let path = self.make_path(kind);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_err(path, e)),
        }
        self.observe(kind, false);
        Ok(())
    }

    /// Delete the entire metadata directory. Reset support; idempotent.
    pub fn remove_all(&self) -> Result<(), MetadataError> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_err(self.path.clone(), e)),
        }
        self.cache.lock().clear();
        Ok(())
    }

    /// Clear the heartbeat file so a resubmitted job starts fresh.
    pub fn reset_heartbeat(&self) -> Result<(), MetadataError> {
        self.remove(MetadataKind::Heartbeat)
    }

    /// Declare the job failed if its heartbeat has gone stale.
    ///
    /// Returns true when a failure was synthesized. Only meaningful for
    /// metadata in the `Running` state; callers gate on that, and the
    /// check runs only after `load_cache` so a stale cache entry cannot
    /// falsely time out a live job.
    pub fn check_heartbeat(&self) -> Result<bool, MetadataError> {
        if self.exists(MetadataKind::Complete)
            || self.exists(MetadataKind::Errors)
            || self.exists(MetadataKind::Assert)
        {
            return Ok(false);
        }
        let probe = if self.exists(MetadataKind::Heartbeat) {
            MetadataKind::Heartbeat
        } else if self.exists(MetadataKind::Log) {
            MetadataKind::Log
        } else {
            return Ok(false);
        };
        let path = self.make_path(probe);
        let meta = match std::fs::metadata(&path) {
            Ok(m) => m,
            // Raced with completion cleanup; nothing to declare
            Err(_) => return Ok(false),
        };
        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let now_ms = self.clock.epoch_ms();
        let age_minutes = now_ms.saturating_sub(mtime_ms) / 60_000;
        if age_minutes >= HEARTBEAT_TIMEOUT_MINUTES {
            tracing::warn!(fqname = %self.fqname, age_minutes, "heartbeat expired");
            self.write_raw(
                MetadataKind::Errors,
                &format!("job has not updated heartbeat in {} minutes", age_minutes),
            )?;
            return Ok(true);
        }
        Ok(false)
    }

    /// State implied by file presence alone.
    ///
    /// Callers layer `Ready`, `ForkWaiting`, and `DisabledState` on top;
    /// those are structural, not on-disk.
    pub fn get_state(&self) -> Option<MetadataState> {
        if self.exists(MetadataKind::Errors) || self.exists(MetadataKind::Assert) {
            Some(MetadataState::Failed)
        } else if self.exists(MetadataKind::Complete) {
            Some(MetadataState::Complete)
        } else if self.exists(MetadataKind::Log) {
            Some(MetadataState::Running)
        } else if self.exists(MetadataKind::JobInfo) {
            Some(MetadataState::Queued)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
