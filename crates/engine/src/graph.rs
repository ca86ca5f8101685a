// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph build and sweep expansion.
//!
//! Nodes live in a flat table indexed by [`NodeId`]; relations are id
//! vectors, so the structure is cycle-free by construction. Build runs in
//! passes: allocate and fill the call tree, compute transitive sweep
//! roots, wire prenode/postnode/file-consumer edges, materialize forks
//! from the sweep cartesian product, then align forks across the
//! subpipeline boundary.

use crate::binding::{Binding, BindingMode};
use crate::fork::Fork;
use crate::node::{Node, NodeKind, StageSpec, SweepRoot};
use indexmap::IndexMap;
use martian_core::{Clock, Fqname, PipestancePerf};
use martian_storage::MetadataError;
use martian_mro::{Ast, CallStm, Callable, Exp, MroType};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Index into the flat node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("source has no top-level call statement")]
    NoCall,
    #[error("no callable named {0}")]
    UnknownCallable(String),
    #[error("call {call} references unknown sibling {reference}")]
    UnknownReference { call: String, reference: String },
    #[error("callable {callable} has no input parameter {param}")]
    UnknownParam { callable: String, param: String },
}

/// The pipestance call graph: immutable topology, stateful forks.
pub struct Graph {
    nodes: Vec<Node>,
    by_fqname: HashMap<String, NodeId>,
    top: NodeId,
}

impl Graph {
    /// Build the graph for `ast`'s top-level call, rooted at `root`.
    pub fn build(
        ast: &Ast,
        psid: &str,
        root: &Path,
        clock: Arc<dyn Clock>,
    ) -> Result<Graph, GraphError> {
        let call = ast.call.as_ref().ok_or(GraphError::NoCall)?;
        let mut builder = Builder {
            ast,
            clock,
            nodes: Vec::new(),
            by_fqname: HashMap::new(),
        };
        let fqname = Fqname::top(psid, &call.id);
        let top = builder.alloc(None, call, fqname, root.to_path_buf())?;
        builder.fill(top, call, &HashMap::new(), &IndexMap::new(), &[])?;
        builder.compute_sweep_roots();
        builder.wire_edges();
        builder.make_forks();
        builder.link_parent_forks();
        Ok(Graph { nodes: builder.nodes, by_fqname: builder.by_fqname, top })
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn top_id(&self) -> NodeId {
        self.top
    }

    pub fn top(&self) -> &Node {
        self.node(self.top)
    }

    pub fn node_by_fqname(&self, fqname: &str) -> Option<NodeId> {
        self.by_fqname.get(fqname).copied()
    }

    pub fn make_dirs(&self) -> Result<(), MetadataError> {
        for node in &self.nodes {
            node.mkdirs()?;
        }
        Ok(())
    }

    pub fn perf(&self) -> PipestancePerf {
        PipestancePerf { nodes: self.nodes.iter().map(|n| n.perf(self)).collect() }
    }
}

struct Builder<'a> {
    ast: &'a Ast,
    clock: Arc<dyn Clock>,
    nodes: Vec<Node>,
    by_fqname: HashMap<String, NodeId>,
}

impl<'a> Builder<'a> {
    fn alloc(
        &mut self,
        parent: Option<NodeId>,
        call: &CallStm,
        fqname: Fqname,
        path: PathBuf,
    ) -> Result<NodeId, GraphError> {
        let callable = self
            .ast
            .callable(&call.callable)
            .ok_or_else(|| GraphError::UnknownCallable(call.callable.clone()))?;
        let (kind, stage) = match callable {
            Callable::Stage(s) => (
                NodeKind::Stage,
                Some(StageSpec {
                    code: s.src.clone(),
                    split: s.has_split(),
                    resources: s.resources.clone(),
                }),
            ),
            Callable::Pipeline(_) => (NodeKind::Pipeline, None),
        };
        let id = NodeId(self.nodes.len());
        self.by_fqname.insert(fqname.to_string(), id);
        self.nodes.push(Node {
            id,
            fqname,
            name: call.id.clone(),
            kind,
            path,
            parent,
            stage,
            bindings: IndexMap::new(),
            ret_bindings: IndexMap::new(),
            disabled: Vec::new(),
            prenodes: Vec::new(),
            direct_prenodes: Vec::new(),
            postnodes: Vec::new(),
            subnodes: Vec::new(),
            preflight: call.mods.preflight,
            local: call.mods.local,
            volatile: call.mods.volatile,
            strict_volatile: call.mods.strict_volatile,
            sweep_roots: Vec::new(),
            file_post_nodes: BTreeMap::new(),
            forks: Vec::new(),
        });
        Ok(id)
    }

    fn fill(
        &mut self,
        id: NodeId,
        call: &CallStm,
        siblings: &HashMap<String, NodeId>,
        self_bindings: &IndexMap<String, Binding>,
        inherited_disabled: &[Binding],
    ) -> Result<(), GraphError> {
        let callable = self
            .ast
            .callable(&call.callable)
            .ok_or_else(|| GraphError::UnknownCallable(call.callable.clone()))?;
        let fqname = self.nodes[id.0].fqname.clone();
        let node_path = self.nodes[id.0].path.clone();

        for bound in call.bindings.keys() {
            if callable.in_params().get(bound).is_none() {
                return Err(GraphError::UnknownParam {
                    callable: call.callable.clone(),
                    param: bound.clone(),
                });
            }
        }

        let mut bindings = IndexMap::new();
        for param in callable.in_params().table.values() {
            let binding = match call.bindings.get(&param.id) {
                Some(exp) => self.build_binding(
                    &fqname,
                    &param.id,
                    Some(param.ty.clone()),
                    exp,
                    call,
                    siblings,
                    self_bindings,
                )?,
                None => Binding::null(&param.id),
            };
            bindings.insert(param.id.clone(), binding);
        }

        let mut disabled = inherited_disabled.to_vec();
        if let Some(exp) = &call.mods.disabled {
            disabled.push(self.build_binding(
                &fqname,
                "disabled",
                Some(MroType::Bool),
                exp,
                call,
                siblings,
                self_bindings,
            )?);
        }

        self.nodes[id.0].bindings = bindings.clone();
        self.nodes[id.0].disabled = disabled.clone();

        if let Callable::Pipeline(pipeline) = callable {
            let mut children: HashMap<String, NodeId> = HashMap::new();
            let mut ordered = Vec::with_capacity(pipeline.calls.len());
            for sub in &pipeline.calls {
                let child = self.alloc(
                    Some(id),
                    sub,
                    fqname.child(&sub.id),
                    node_path.join(&sub.id),
                )?;
                children.insert(sub.id.clone(), child);
                ordered.push(child);
            }
            self.nodes[id.0].subnodes = ordered;

            for sub in &pipeline.calls {
                self.fill(children[&sub.id], sub, &children, &bindings, &disabled)?;
            }

            let mut ret = IndexMap::new();
            for (out_name, exp) in &pipeline.ret {
                let ty = pipeline.out_params.get(out_name).map(|p| p.ty.clone());
                ret.insert(
                    out_name.clone(),
                    self.build_binding(&fqname, out_name, ty, exp, call, &children, &bindings)?,
                );
            }
            self.nodes[id.0].ret_bindings = ret;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_binding(
        &self,
        fqname: &Fqname,
        slot: &str,
        ty: Option<MroType>,
        exp: &Exp,
        call: &CallStm,
        siblings: &HashMap<String, NodeId>,
        self_bindings: &IndexMap<String, Binding>,
    ) -> Result<Binding, GraphError> {
        let mode = match exp {
            Exp::Null => BindingMode::Null,
            Exp::Literal(v) => BindingMode::Literal(v.clone()),
            Exp::Sweep(values) => BindingMode::Sweep {
                // The declaration site uniquely identifies the sweep; a
                // clone through self-references keeps the same root id so
                // forks align across nodes.
                root_id: format!("{}.{}", fqname, slot),
                values: values.clone(),
            },
            Exp::ArrayExp(items) => {
                let mut built = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    built.push(self.build_binding(
                        fqname,
                        &format!("{}.{}", slot, i),
                        ty.clone(),
                        item,
                        call,
                        siblings,
                        self_bindings,
                    )?);
                }
                BindingMode::Array(built)
            }
            Exp::MapExp(items) => {
                let mut built = IndexMap::new();
                for (key, item) in items {
                    built.insert(
                        key.clone(),
                        self.build_binding(
                            fqname,
                            &format!("{}.{}", slot, key),
                            ty.clone(),
                            item,
                            call,
                            siblings,
                            self_bindings,
                        )?,
                    );
                }
                BindingMode::Map(built)
            }
            Exp::SelfRef(param) => match self_bindings.get(param) {
                Some(outer) => {
                    let mut binding = outer.clone();
                    binding.param = slot.to_string();
                    if let Some(ty) = &ty {
                        binding.ty = Some(ty.clone());
                    }
                    return Ok(binding);
                }
                None => {
                    tracing::warn!(call = %call.id, param, "self reference has no outer binding");
                    BindingMode::Null
                }
            },
            Exp::CallRef { id: target, output } => match siblings.get(target) {
                Some(node) => BindingMode::Reference { node: *node, output: output.clone() },
                None => {
                    return Err(GraphError::UnknownReference {
                        call: call.id.clone(),
                        reference: target.clone(),
                    })
                }
            },
        };
        Ok(Binding { param: slot.to_string(), ty, mode })
    }

    /// Union each node's own sweeps with everything reachable upstream,
    /// memoized over the table.
    fn compute_sweep_roots(&mut self) {
        let mut memo: Vec<Option<BTreeMap<String, Vec<Value>>>> = vec![None; self.nodes.len()];
        for i in 0..self.nodes.len() {
            self.sweep_roots_for(NodeId(i), &mut memo);
        }
        for (i, entry) in memo.into_iter().enumerate() {
            let roots = entry.unwrap_or_default();
            self.nodes[i].sweep_roots = roots
                .into_iter()
                .map(|(id, values)| SweepRoot { id, values })
                .collect();
        }
    }

    fn sweep_roots_for(
        &self,
        id: NodeId,
        memo: &mut Vec<Option<BTreeMap<String, Vec<Value>>>>,
    ) -> BTreeMap<String, Vec<Value>> {
        if let Some(roots) = &memo[id.0] {
            return roots.clone();
        }
        let node = &self.nodes[id.0];
        let mut roots = BTreeMap::new();
        let mut refs = BTreeSet::new();
        let all_bindings = node
            .bindings
            .values()
            .chain(node.ret_bindings.values())
            .chain(node.disabled.iter());
        for binding in all_bindings {
            binding.sweep_roots(&mut roots);
            binding.referenced_nodes(&mut refs);
        }
        for reference in refs {
            for (root, values) in self.sweep_roots_for(reference, memo) {
                roots.entry(root).or_insert(values);
            }
        }
        memo[id.0] = Some(roots.clone());
        roots
    }

    /// Wire prenode/postnode edges and VDR file-consumer maps.
    fn wire_edges(&mut self) {
        let mut pre_edges: Vec<(NodeId, Vec<NodeId>, Vec<NodeId>)> = Vec::new();
        let mut file_edges: Vec<(NodeId, String, Option<NodeId>)> = Vec::new();

        for node in &self.nodes {
            let mut distinct = BTreeSet::new();
            let mut direct = Vec::new();
            for binding in node.bindings.values().chain(node.disabled.iter()) {
                let mut refs = BTreeSet::new();
                binding.referenced_nodes(&mut refs);
                for r in refs {
                    if distinct.insert(r) {
                        direct.push(r);
                    }
                }
            }
            pre_edges.push((node.id, distinct.into_iter().collect(), direct));

            // Arg references consume the upstream fork's files
            let mut refs = Vec::new();
            for binding in node.bindings.values() {
                binding.file_references(&mut refs);
            }
            for (target, output) in refs {
                file_edges.push((target, output, Some(node.id)));
            }

            // Pipeline returns pin the files they name: the consumer is
            // outside the graph, recorded as None and never satisfied
            let mut ret_refs = Vec::new();
            for binding in node.ret_bindings.values() {
                binding.file_references(&mut ret_refs);
            }
            for (target, output) in ret_refs {
                file_edges.push((target, output, None));
            }
        }

        for (id, prenodes, direct) in pre_edges {
            for pre in &prenodes {
                self.nodes[pre.0].postnodes.push(id);
            }
            self.nodes[id.0].prenodes = prenodes;
            self.nodes[id.0].direct_prenodes = direct;
        }
        for node in &mut self.nodes {
            node.postnodes.sort_unstable();
            node.postnodes.dedup();
        }
        for (target, output, consumer) in file_edges {
            self.nodes[target.0]
                .file_post_nodes
                .entry(output)
                .or_default()
                .insert(consumer);
        }
    }

    /// One fork per element of the sweep cartesian product, in sorted
    /// root-id odometer order so indices are stable across restarts.
    fn make_forks(&mut self) {
        for node in &mut self.nodes {
            let permutes = cartesian(&node.sweep_roots);
            let has_split = node.stage.as_ref().is_some_and(|s| s.split);
            node.forks = permutes
                .into_iter()
                .enumerate()
                .map(|(i, permute)| {
                    Fork::new(
                        node.fqname.clone(),
                        &node.path,
                        i,
                        permute,
                        has_split,
                        Arc::clone(&self.clock),
                    )
                })
                .collect();
        }
    }

    /// Link each fork to the parent-pipeline fork its permutation refines.
    fn link_parent_forks(&mut self) {
        let mut links: Vec<(usize, usize, Option<usize>)> = Vec::new();
        for node in &self.nodes {
            let Some(parent) = node.parent else {
                continue;
            };
            let parent_node = &self.nodes[parent.0];
            for fork in &node.forks {
                let mut candidates = parent_node.forks.iter().filter(|pf| {
                    crate::binding::permute_agrees(pf.arg_permute(), fork.arg_permute())
                });
                let first = candidates.next().map(|pf| pf.index());
                if first.is_some() && candidates.next().is_some() {
                    // Cannot occur under the sweep-root invariants
                    tracing::error!(fqname = %node.fqname, "ambiguous parent fork, taking lowest");
                }
                links.push((node.id.0, fork.index(), first));
            }
        }
        for (node_idx, fork_idx, parent_fork) in links {
            self.nodes[node_idx].forks[fork_idx].set_parent_fork(parent_fork);
        }
    }
}

/// Cartesian product over sorted sweep roots; the last root varies fastest.
fn cartesian(roots: &[SweepRoot]) -> Vec<IndexMap<String, Value>> {
    let mut permutes = vec![IndexMap::new()];
    for root in roots {
        let mut next = Vec::with_capacity(permutes.len() * root.values.len().max(1));
        for permute in &permutes {
            for value in &root.values {
                let mut extended = permute.clone();
                extended.insert(root.id.clone(), value.clone());
                next.push(extended);
            }
        }
        if !root.values.is_empty() {
            permutes = next;
        }
    }
    permutes
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
