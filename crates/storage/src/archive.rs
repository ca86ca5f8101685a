// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `_metadata.zip` archival.
//!
//! Post-processing bundles the per-node metadata files into one zip at the
//! pipestance root; reattachment extracts any entries missing on disk.
//! Top-level seed files (`_invocation`, `_uuid`, ...) stay outside the
//! bundle so a pipestance remains recognizable after archival.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;

pub const METADATA_ZIP: &str = "_metadata.zip";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io { path: path.to_path_buf(), source }
}

/// Bundle all node-level metadata files into `_metadata.zip` and remove
/// the originals. Returns the number of files archived.
pub fn archive_metadata(pipestance_path: &Path) -> Result<usize, ArchiveError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(pipestance_path).map_err(io_err(pipestance_path))? {
        let entry = entry.map_err(io_err(pipestance_path))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        // Only descend into node directories; top-level files stay put
        if entry.path().is_dir() && !name.starts_with('_') && name != "journal" && name != "tmp" {
            collect_metadata_files(&entry.path(), &mut files)?;
        }
    }

    let zip_path = pipestance_path.join(METADATA_ZIP);
    let file = std::fs::File::create(&zip_path).map_err(io_err(&zip_path))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for path in &files {
        let rel = path.strip_prefix(pipestance_path).unwrap_or(path);
        writer.start_file(rel.to_string_lossy(), options)?;
        let mut contents = Vec::new();
        std::fs::File::open(path)
            .and_then(|mut f| f.read_to_end(&mut contents))
            .map_err(io_err(path))?;
        writer.write_all(&contents).map_err(io_err(&zip_path))?;
    }
    writer.finish()?;

    for path in &files {
        std::fs::remove_file(path).map_err(io_err(path))?;
    }
    Ok(files.len())
}

fn collect_metadata_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ArchiveError> {
    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            // files/ holds stage outputs, not metadata
            if name != "files" {
                collect_metadata_files(&path, out)?;
            }
        } else if name.starts_with('_') && !name.ends_with(".tmp") {
            out.push(path);
        }
    }
    Ok(())
}

/// Extract entries from `_metadata.zip` that are missing on disk.
/// Returns the number of files restored; absent archive is not an error.
pub fn unarchive_metadata(pipestance_path: &Path) -> Result<usize, ArchiveError> {
    let zip_path = pipestance_path.join(METADATA_ZIP);
    let file = match std::fs::File::open(&zip_path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(ArchiveError::Io { path: zip_path, source: e }),
    };
    let mut archive = zip::ZipArchive::new(file)?;
    let mut restored = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            tracing::warn!(index = i, "skipping zip entry with unsafe path");
            continue;
        };
        let dest = pipestance_path.join(rel);
        if dest.exists() {
            continue;
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).map_err(io_err(&dest))?;
        std::fs::write(&dest, contents).map_err(io_err(&dest))?;
        restored += 1;
    }
    Ok(restored)
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
