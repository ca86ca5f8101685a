// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Call equivalence for reattachment.
//!
//! Two call statements are equivalent when they name the same callable and
//! bind the same values, comparing decoded canonical forms. Numbers are
//! normalized before comparison: `1` and `1.0` denote the same sweep value
//! even though their serialized fragments differ.

use crate::ast::{CallStm, Exp};
use serde_json::Value;

/// Whether two top-level call statements invoke the same work.
pub fn equivalent_call(a: &CallStm, b: &CallStm) -> bool {
    if a.callable != b.callable {
        return false;
    }
    if a.bindings.len() != b.bindings.len() {
        return false;
    }
    a.bindings.iter().all(|(name, exp)| match b.bindings.get(name) {
        Some(other) => exp_equivalent(exp, other),
        None => false,
    })
}

fn exp_equivalent(a: &Exp, b: &Exp) -> bool {
    match (a, b) {
        (Exp::Null, Exp::Null) => true,
        (Exp::Null, Exp::Literal(v)) | (Exp::Literal(v), Exp::Null) => v.is_null(),
        (Exp::Literal(x), Exp::Literal(y)) => value_equivalent(x, y),
        (Exp::Sweep(xs), Exp::Sweep(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| value_equivalent(x, y))
        }
        (Exp::ArrayExp(xs), Exp::ArrayExp(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| exp_equivalent(x, y))
        }
        (Exp::MapExp(xs), Exp::MapExp(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| exp_equivalent(x, y)))
        }
        (Exp::CallRef { id: ai, output: ao }, Exp::CallRef { id: bi, output: bo }) => {
            ai == bi && ao == bo
        }
        (Exp::SelfRef(x), Exp::SelfRef(y)) => x == y,
        _ => false,
    }
}

/// Structural equality after normalizing numbers to f64.
pub fn value_equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| value_equivalent(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| value_equivalent(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
#[path = "equiv_tests.rs"]
mod tests;
