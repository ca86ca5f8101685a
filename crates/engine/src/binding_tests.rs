// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::graph::Graph;
use martian_core::{FakeClock, MetadataKind};
use martian_mro::test_support::{ast, call, map_exp, pipeline, stage};
use martian_mro::{Callable, Exp, MroType, Param};
use serde_json::json;
use std::sync::Arc;

fn literal_binding(value: serde_json::Value) -> Binding {
    Binding { param: "x".into(), ty: Some(MroType::Int), mode: BindingMode::Literal(value) }
}

#[test]
fn literal_and_null_resolve_directly() {
    let dir = tempfile::tempdir().unwrap();
    let ast_in = ast(
        vec![Callable::Stage(stage("S", vec![Param::new("x", MroType::Int)], vec![]))],
        call("S", vec![("x", Exp::int(7))]),
    );
    let graph = Graph::build(&ast_in, "ps", dir.path(), Arc::new(FakeClock::new())).unwrap();
    let permute = IndexMap::new();
    assert_eq!(literal_binding(json!(7)).resolve(&graph, &permute).unwrap(), json!(7));
    assert_eq!(Binding::null("x").resolve(&graph, &permute).unwrap(), json!(null));
}

#[test]
fn sweep_resolves_from_permutation() {
    let dir = tempfile::tempdir().unwrap();
    let ast_in = ast(
        vec![Callable::Stage(stage("S", vec![Param::new("x", MroType::Int)], vec![]))],
        call("S", vec![("x", Exp::Sweep(vec![json!(1), json!(2)]))]),
    );
    let graph = Graph::build(&ast_in, "ps", dir.path(), Arc::new(FakeClock::new())).unwrap();
    let node = graph.top();
    assert_eq!(node.forks().len(), 2);
    let args = node.forks()[1].resolve_args(&graph, node).unwrap();
    assert_eq!(args["x"], json!(2));
}

#[test]
fn containers_recurse() {
    let dir = tempfile::tempdir().unwrap();
    let ast_in = ast(
        vec![Callable::Stage(stage("S", vec![Param::new("m", MroType::Map)], vec![]))],
        call(
            "S",
            vec![(
                "m",
                map_exp(vec![
                    ("a", Exp::int(1)),
                    ("b", Exp::ArrayExp(vec![Exp::str("q"), Exp::Null])),
                ]),
            )],
        ),
    );
    let graph = Graph::build(&ast_in, "ps", dir.path(), Arc::new(FakeClock::new())).unwrap();
    let node = graph.top();
    let args = node.forks()[0].resolve_args(&graph, node).unwrap();
    assert_eq!(args["m"], json!({"a": 1, "b": ["q", null]}));
}

fn chained_ast() -> martian_mro::Ast {
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
    ast(vec![Callable::Stage(a), Callable::Stage(b), Callable::Pipeline(p)], call("P", vec![("x", Exp::int(1))]))
}

#[test]
fn reference_reads_upstream_outs() {
    let dir = tempfile::tempdir().unwrap();
    let graph =
        Graph::build(&chained_ast(), "ps", dir.path(), Arc::new(FakeClock::new())).unwrap();
    graph.make_dirs().unwrap();
    let a = graph.node(graph.node_by_fqname("ID.ps.P.A").unwrap());
    let b = graph.node(graph.node_by_fqname("ID.ps.P.B").unwrap());

    // Before A completes, B's args are unresolvable
    let err = b.forks()[0].resolve_args(&graph, b);
    assert!(err.is_err());

    a.forks()[0].metadata().write(MetadataKind::Outs, &json!({"y": 42})).unwrap();
    let args = b.forks()[0].resolve_args(&graph, b).unwrap();
    assert_eq!(args["y_in"], json!(42));
}

#[test]
fn missing_output_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let graph =
        Graph::build(&chained_ast(), "ps", dir.path(), Arc::new(FakeClock::new())).unwrap();
    graph.make_dirs().unwrap();
    let a = graph.node(graph.node_by_fqname("ID.ps.P.A").unwrap());
    let b = graph.node(graph.node_by_fqname("ID.ps.P.B").unwrap());
    a.forks()[0].metadata().write(MetadataKind::Outs, &json!({"other": 1})).unwrap();
    let err = b.forks()[0].resolve_args(&graph, b);
    assert!(matches!(err, Err(ResolveError::MissingOutput { .. })));
}

#[test]
fn file_like_follows_declared_type() {
    let int_binding = literal_binding(json!(1));
    assert!(!int_binding.is_file_like());
    let untyped = Binding { param: "x".into(), ty: None, mode: BindingMode::Null };
    assert!(untyped.is_file_like());
    let file = Binding {
        param: "x".into(),
        ty: Some(MroType::UserFile("bam".into())),
        mode: BindingMode::Null,
    };
    assert!(file.is_file_like());
}

#[test]
fn permute_subset_and_agreement() {
    let mut small = IndexMap::new();
    small.insert("r1".to_string(), json!(1));
    let mut big = IndexMap::new();
    big.insert("r1".to_string(), json!(1.0));
    big.insert("r2".to_string(), json!("x"));

    // 1 and 1.0 decode to the same canonical value
    assert!(permute_subset(&small, &big));
    assert!(!permute_subset(&big, &small));
    assert!(permute_agrees(&big, &small));

    let mut conflicting = IndexMap::new();
    conflicting.insert("r1".to_string(), json!(2));
    assert!(!permute_agrees(&conflicting, &small));
}
