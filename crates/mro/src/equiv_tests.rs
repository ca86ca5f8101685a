// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::call;
use crate::Exp;
use serde_json::json;

#[test]
fn identical_calls_are_equivalent() {
    let a = call("P", vec![("x", Exp::int(1))]);
    let b = call("P", vec![("x", Exp::int(1))]);
    assert!(equivalent_call(&a, &b));
}

#[test]
fn binding_order_is_ignored() {
    let a = call("P", vec![("x", Exp::int(1)), ("y", Exp::str("s"))]);
    let b = call("P", vec![("y", Exp::str("s")), ("x", Exp::int(1))]);
    assert!(equivalent_call(&a, &b));
}

#[test]
fn number_encoding_is_normalized() {
    // 1 vs 1.0: same value through different serialized fragments
    let a = call("P", vec![("x", Exp::Literal(json!(1)))]);
    let b = call("P", vec![("x", Exp::Literal(json!(1.0)))]);
    assert!(equivalent_call(&a, &b));
}

#[test]
fn sweep_values_compare_canonically() {
    let a = call("P", vec![("x", Exp::Sweep(vec![json!(1), json!(2)]))]);
    let b = call("P", vec![("x", Exp::Sweep(vec![json!(1.0), json!(2.0)]))]);
    assert!(equivalent_call(&a, &b));
}

#[test]
fn sweep_order_matters() {
    let a = call("P", vec![("x", Exp::Sweep(vec![json!(1), json!(2)]))]);
    let b = call("P", vec![("x", Exp::Sweep(vec![json!(2), json!(1)]))]);
    assert!(!equivalent_call(&a, &b));
}

#[yare::parameterized(
    different_callable = { call("Q", vec![("x", Exp::int(1))]) },
    different_value = { call("P", vec![("x", Exp::int(2))]) },
    different_name = { call("P", vec![("y", Exp::int(1))]) },
    extra_binding = { call("P", vec![("x", Exp::int(1)), ("y", Exp::int(2))]) },
)]
fn drifted_calls_are_not_equivalent(b: crate::CallStm) {
    let a = call("P", vec![("x", Exp::int(1))]);
    assert!(!equivalent_call(&a, &b));
}

#[test]
fn null_literal_matches_null_exp() {
    let a = call("P", vec![("x", Exp::Null)]);
    let b = call("P", vec![("x", Exp::Literal(json!(null)))]);
    assert!(equivalent_call(&a, &b));
}
