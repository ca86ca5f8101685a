// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::graph::Graph;
use martian_core::{FakeClock, MetadataKind, MetadataState};
use martian_mro::test_support::{ast, call, pipeline, stage};
use martian_mro::{Callable, Exp, MroType, Param};
use serde_json::json;
use std::sync::Arc;

fn chained() -> (tempfile::TempDir, Graph) {
    let a = stage("A", vec![Param::new("x", MroType::Int)], vec![Param::new("y", MroType::Int)]);
    let b = stage("B", vec![Param::new("y_in", MroType::Int)], vec![Param::new("z", MroType::Int)]);
    let p = pipeline(
        "P",
        vec![Param::new("x", MroType::Int)],
        vec![Param::new("z", MroType::Int)],
        vec![
            call("A", vec![("x", Exp::SelfRef("x".into()))]),
            call("B", vec![("y_in", Exp::CallRef { id: "A".into(), output: "y".into() })]),
        ],
        vec![("z", Exp::CallRef { id: "B".into(), output: "z".into() })],
    );
    let ast_in = ast(
        vec![Callable::Stage(a), Callable::Stage(b), Callable::Pipeline(p)],
        call("P", vec![("x", Exp::int(1))]),
    );
    let dir = tempfile::tempdir().unwrap();
    let graph = Graph::build(&ast_in, "ps", dir.path(), Arc::new(FakeClock::new())).unwrap();
    graph.make_dirs().unwrap();
    (dir, graph)
}

fn complete_fork(graph: &Graph, fqname: &str, outs: serde_json::Value) {
    let node = graph.node(graph.node_by_fqname(fqname).unwrap());
    let md = node.forks()[0].metadata();
    md.write(MetadataKind::Outs, &outs).unwrap();
    md.write_raw(MetadataKind::Complete, "").unwrap();
}

#[test]
fn waiting_until_prenodes_complete() {
    let (_dir, graph) = chained();
    let a = graph.node(graph.node_by_fqname("ID.ps.P.A").unwrap());
    let b = graph.node(graph.node_by_fqname("ID.ps.P.B").unwrap());
    assert_eq!(a.state(&graph), MetadataState::Running);
    assert_eq!(b.state(&graph), MetadataState::Waiting);

    complete_fork(&graph, "ID.ps.P.A", json!({"y": 1}));
    assert_eq!(a.state(&graph), MetadataState::Complete);
    assert_eq!(b.state(&graph), MetadataState::Running);
}

#[test]
fn any_failed_fork_fails_the_node() {
    let (_dir, graph) = chained();
    let a = graph.node(graph.node_by_fqname("ID.ps.P.A").unwrap());
    a.forks()[0].metadata().write_raw(MetadataKind::Errors, "boom").unwrap();
    assert_eq!(a.state(&graph), MetadataState::Failed);
    // The pipeline rolls the failure up
    assert_eq!(graph.top().state(&graph), MetadataState::Failed);
}

#[test]
fn pipeline_completes_after_all_subnodes() {
    let (_dir, graph) = chained();
    complete_fork(&graph, "ID.ps.P.A", json!({"y": 1}));
    complete_fork(&graph, "ID.ps.P.B", json!({"z": 2}));
    // Subnodes done, pipeline fork not yet finalized
    assert_eq!(graph.top().state(&graph), MetadataState::Running);
    complete_fork(&graph, "ID.ps.P", json!({"z": 2}));
    assert_eq!(graph.top().state(&graph), MetadataState::Complete);
}

#[test]
fn disabled_call_rolls_up() {
    let s = stage("S", vec![Param::new("x", MroType::Int)], vec![]);
    let mut top = call("S", vec![("x", Exp::int(1))]);
    top.mods.disabled = Some(Exp::Literal(json!(true)));
    let ast_in = ast(vec![Callable::Stage(s)], top);
    let dir = tempfile::tempdir().unwrap();
    let graph = Graph::build(&ast_in, "ps", dir.path(), Arc::new(FakeClock::new())).unwrap();
    assert_eq!(graph.top().state(&graph), MetadataState::DisabledState);
}

#[test]
fn first_error_returns_first_fork_failure() {
    let (_dir, graph) = chained();
    let a = graph.node(graph.node_by_fqname("ID.ps.P.A").unwrap());
    a.forks()[0].metadata().write_raw(MetadataKind::Errors, "first failure").unwrap();
    let (fqname, text) = a.first_error().unwrap();
    assert_eq!(fqname.as_str(), "ID.ps.P.A.fork0");
    assert_eq!(text, "first failure");
}

#[test]
fn fork_matching_selects_by_permutation() {
    let s = stage("S", vec![Param::new("x", MroType::Int)], vec![]);
    let ast_in = ast(
        vec![Callable::Stage(s)],
        call("S", vec![("x", Exp::Sweep(vec![json!(1), json!(2)]))]),
    );
    let dir = tempfile::tempdir().unwrap();
    let graph = Graph::build(&ast_in, "ps", dir.path(), Arc::new(FakeClock::new())).unwrap();
    let node = graph.top();
    let mut want = indexmap::IndexMap::new();
    want.insert("ID.ps.S.x".to_string(), json!(2));
    let fork = node.fork_matching(&want).unwrap();
    assert_eq!(fork.index(), 1);
}
