// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binding resolver.
//!
//! A binding ties one input parameter of a call to a literal, a sweep, a
//! reference to an upstream node's output, or a container of nested
//! bindings. `self.param` expressions are substituted at graph-build time
//! with a clone of the enclosing pipeline's binding, so by the time a
//! binding lives on a node it only ever points at literals, sweeps, or
//! concrete upstream nodes.

use crate::graph::{Graph, NodeId};
use indexmap::IndexMap;
use martian_core::Fqname;
use martian_mro::equiv::value_equivalent;
use martian_mro::MroType;
use martian_storage::MetadataError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("upstream {fqname} has no completed fork for this permutation")]
    UpstreamNotReady { fqname: Fqname },
    #[error("upstream {fqname} has no output named {output}")]
    MissingOutput { fqname: Fqname, output: String },
    #[error("no fork of {fqname} matches the requested permutation")]
    NoMatchingFork { fqname: Fqname },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// How a binding produces its value.
#[derive(Debug, Clone)]
pub enum BindingMode {
    Null,
    Literal(Value),
    Sweep {
        /// Uniquely identifies the sweep's declaration site; forks align
        /// across nodes by agreeing on root ids.
        root_id: String,
        values: Vec<Value>,
    },
    Reference {
        node: NodeId,
        /// Output parameter name; empty selects the whole outs map.
        output: String,
    },
    Array(Vec<Binding>),
    Map(IndexMap<String, Binding>),
}

/// One resolved input (or return) parameter of a call.
#[derive(Debug, Clone)]
pub struct Binding {
    pub param: String,
    /// Declared type at the call boundary; `None` when unknown.
    pub ty: Option<MroType>,
    pub mode: BindingMode,
}

impl Binding {
    pub fn null(param: impl Into<String>) -> Self {
        Self { param: param.into(), ty: None, mode: BindingMode::Null }
    }

    /// Whether values of this binding could name files on disk.
    ///
    /// Only `int`/`float`/`bool` declarations are known file-free; an
    /// unknown type is assumed to carry filenames.
    pub fn is_file_like(&self) -> bool {
        match &self.ty {
            Some(ty) => !ty.is_scalar(),
            None => true,
        }
    }

    /// Collect sweep roots in this binding, keyed by root id.
    pub fn sweep_roots(&self, out: &mut BTreeMap<String, Vec<Value>>) {
        match &self.mode {
            BindingMode::Sweep { root_id, values } => {
                out.entry(root_id.clone()).or_insert_with(|| values.clone());
            }
            BindingMode::Array(items) => {
                for item in items {
                    item.sweep_roots(out);
                }
            }
            BindingMode::Map(items) => {
                for item in items.values() {
                    item.sweep_roots(out);
                }
            }
            _ => {}
        }
    }

    /// Collect upstream nodes referenced anywhere in this binding.
    pub fn referenced_nodes(&self, out: &mut BTreeSet<NodeId>) {
        match &self.mode {
            BindingMode::Reference { node, .. } => {
                out.insert(*node);
            }
            BindingMode::Array(items) => {
                for item in items {
                    item.referenced_nodes(out);
                }
            }
            BindingMode::Map(items) => {
                for item in items.values() {
                    item.referenced_nodes(out);
                }
            }
            _ => {}
        }
    }

    /// Collect `(upstream node, output)` pairs reachable through binds
    /// whose declared type could carry a filename. Drives VDR consumer
    /// accounting.
    pub fn file_references(&self, out: &mut Vec<(NodeId, String)>) {
        match &self.mode {
            BindingMode::Reference { node, output } => {
                if self.is_file_like() {
                    out.push((*node, output.clone()));
                }
            }
            BindingMode::Array(items) => {
                for item in items {
                    item.file_references(out);
                }
            }
            BindingMode::Map(items) => {
                for item in items.values() {
                    item.file_references(out);
                }
            }
            _ => {}
        }
    }

    /// Materialize the concrete value for one fork permutation.
    pub fn resolve(
        &self,
        graph: &Graph,
        permute: &IndexMap<String, Value>,
    ) -> Result<Value, ResolveError> {
        match &self.mode {
            BindingMode::Null => Ok(Value::Null),
            BindingMode::Literal(v) => Ok(v.clone()),
            BindingMode::Sweep { root_id, values } => {
                // A root missing from the permutation is an expansion bug;
                // fall back to the first value rather than poisoning the run.
                match permute.get(root_id) {
                    Some(v) => Ok(v.clone()),
                    None => {
                        debug_assert!(false, "sweep root {} missing from permutation", root_id);
                        tracing::error!(root_id, "sweep root missing from permutation");
                        Ok(values.first().cloned().unwrap_or(Value::Null))
                    }
                }
            }
            BindingMode::Reference { node, output } => {
                resolve_reference(graph, *node, output, permute)
            }
            BindingMode::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.resolve(graph, permute)?);
                }
                Ok(Value::Array(values))
            }
            BindingMode::Map(items) => {
                let mut map = serde_json::Map::new();
                for (key, item) in items {
                    map.insert(key.clone(), item.resolve(graph, permute)?);
                }
                Ok(Value::Object(map))
            }
        }
    }
}

fn resolve_reference(
    graph: &Graph,
    node_id: NodeId,
    output: &str,
    permute: &IndexMap<String, Value>,
) -> Result<Value, ResolveError> {
    let node = graph.node(node_id);
    let fork = node
        .fork_matching(permute)
        .ok_or_else(|| ResolveError::NoMatchingFork { fqname: node.fqname().clone() })?;

    // Disabled upstream contributes null, and satisfies the dependency
    if fork.is_disabled(graph, node).unwrap_or(false) {
        return Ok(Value::Null);
    }

    let outs = fork
        .read_outs()
        .map_err(|_| ResolveError::UpstreamNotReady { fqname: node.fqname().clone() })?;
    if output.is_empty() {
        return Ok(outs);
    }
    match outs.get(output) {
        Some(v) => Ok(v.clone()),
        None => Err(ResolveError::MissingOutput {
            fqname: node.fqname().clone(),
            output: output.to_string(),
        }),
    }
}

/// Whether `sub` agrees with `sup` on every root `sub` carries.
pub fn permute_subset(sub: &IndexMap<String, Value>, sup: &IndexMap<String, Value>) -> bool {
    sub.iter().all(|(root, v)| match sup.get(root) {
        Some(other) => value_equivalent(v, other),
        None => false,
    })
}

/// Whether two permutations agree on the roots they share.
pub fn permute_agrees(a: &IndexMap<String, Value>, b: &IndexMap<String, Value>) -> bool {
    a.iter().all(|(root, v)| match b.get(root) {
        Some(other) => value_equivalent(v, other),
        None => true,
    })
}

#[cfg(test)]
#[path = "binding_tests.rs"]
mod tests;
