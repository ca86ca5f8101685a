// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parameter types and tables.

use indexmap::IndexMap;

/// Declared type of an MRO parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MroType {
    Int,
    Float,
    Bool,
    Str,
    Path,
    Map,
    /// User-declared file type (`bam`, `fastq.gz`, ...).
    UserFile(String),
}

impl MroType {
    /// Whether a value of this type can never name a file on disk.
    ///
    /// Anything else (strings, paths, maps, user file types) may carry a
    /// filename and therefore participates in VDR consumer tracking.
    pub fn is_scalar(&self) -> bool {
        matches!(self, MroType::Int | MroType::Float | MroType::Bool)
    }
}

impl std::fmt::Display for MroType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MroType::Int => f.write_str("int"),
            MroType::Float => f.write_str("float"),
            MroType::Bool => f.write_str("bool"),
            MroType::Str => f.write_str("string"),
            MroType::Path => f.write_str("path"),
            MroType::Map => f.write_str("map"),
            MroType::UserFile(ext) => f.write_str(ext),
        }
    }
}

/// One declared input or output parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub id: String,
    pub ty: MroType,
    /// Array nesting depth (`int[]` is 1).
    pub array_dims: usize,
}

impl Param {
    pub fn new(id: impl Into<String>, ty: MroType) -> Self {
        Self { id: id.into(), ty, array_dims: 0 }
    }

    pub fn array(id: impl Into<String>, ty: MroType) -> Self {
        Self { id: id.into(), ty, array_dims: 1 }
    }
}

/// Ordered parameter table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub table: IndexMap<String, Param>,
}

impl Params {
    pub fn new(params: impl IntoIterator<Item = Param>) -> Self {
        Self { table: params.into_iter().map(|p| (p.id.clone(), p)).collect() }
    }

    pub fn get(&self, id: &str) -> Option<&Param> {
        self.table.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
