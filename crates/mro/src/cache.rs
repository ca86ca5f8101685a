// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-hashed MRO source cache.
//!
//! The cache is an explicit collaborator passed into the runtime, never a
//! process-wide singleton. Two tables live under one reader/writer lock:
//! file path → source text, and source hash → compiled AST.

use crate::ast::Ast;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no callable named {0}")]
    MissingCallable(String),
    #[error("source has no top-level call statement")]
    NoCall,
}

/// The external MRO compiler, consumed as a seam.
pub trait Compiler: Send + Sync {
    /// Compile concatenated MRO source, resolving includes via `mropaths`.
    fn compile(&self, source: &str, mropaths: &[PathBuf]) -> Result<Ast, CompileError>;
}

#[derive(Default)]
struct CacheTables {
    sources: HashMap<PathBuf, String>,
    asts: HashMap<String, Arc<Ast>>,
}

/// Shared cache over MRO sources and their compiled ASTs.
#[derive(Default)]
pub struct MroCache {
    tables: RwLock<CacheTables>,
}

impl MroCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an MRO file through the source table.
    pub fn load_file(&self, path: &Path) -> Result<String, CompileError> {
        if let Some(source) = self.tables.read().sources.get(path) {
            return Ok(source.clone());
        }
        let source = std::fs::read_to_string(path)
            .map_err(|e| CompileError::Read(path.to_path_buf(), e))?;
        self.tables.write().sources.insert(path.to_path_buf(), source.clone());
        Ok(source)
    }

    /// Compile source through the AST table, keyed by content hash.
    pub fn compile(
        &self,
        compiler: &dyn Compiler,
        source: &str,
        mropaths: &[PathBuf],
    ) -> Result<Arc<Ast>, CompileError> {
        let key = content_key(source);
        if let Some(ast) = self.tables.read().asts.get(&key) {
            return Ok(Arc::clone(ast));
        }
        let ast = Arc::new(compiler.compile(source, mropaths)?);
        self.tables.write().asts.insert(key, Arc::clone(&ast));
        Ok(ast)
    }
}

fn content_key(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split a colon-separated `MROPATH` value into include directories.
pub fn split_mropath(value: &str) -> Vec<PathBuf> {
    value.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect()
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
