// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invocation serialization: the `_invocation` round-trip.

use crate::ast::{CallStm, Exp};
use crate::parse::{parse_invocation, ParseError};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt::Write as _;

/// Data form of a pipestance invocation.
///
/// Swept arguments appear in `args` as the array of their values, with the
/// argument name listed in `sweepargs`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InvocationData {
    pub call: String,
    pub args: IndexMap<String, Value>,
    pub sweepargs: Vec<String>,
    pub include: Option<String>,
}

impl InvocationData {
    /// Parse an `_invocation` source back into data form.
    pub fn build_call_data(src: &str) -> Result<Self, ParseError> {
        parse_invocation(src)
    }

    /// Emit the canonical MRO call statement.
    ///
    /// `build_call_data(build_call_source(d)) == d` is the reattachment
    /// contract, so formatting changes here are wire-format changes.
    pub fn build_call_source(&self) -> String {
        let mut src = String::new();
        if let Some(include) = &self.include {
            let _ = writeln!(src, "@include \"{}\"", include);
            src.push('\n');
        }
        let _ = writeln!(src, "call {}(", self.call);
        for (name, value) in &self.args {
            if self.sweepargs.iter().any(|s| s == name) {
                let items: Vec<String> = value
                    .as_array()
                    .map(|vs| vs.iter().map(render_literal).collect())
                    .unwrap_or_default();
                let _ = writeln!(src, "    {} = sweep({}),", name, items.join(", "));
            } else {
                let _ = writeln!(src, "    {} = {},", name, render_literal(value));
            }
        }
        src.push_str(")\n");
        src
    }

    /// Extract the invocation data from a compiled top-level call.
    ///
    /// Non-literal bindings cannot appear in an invocation statement and
    /// resolve to `null` here; the compiler rejects them upstream.
    pub fn from_call(call: &CallStm, include: Option<String>) -> Self {
        let mut args = IndexMap::new();
        let mut sweepargs = Vec::new();
        for (name, exp) in &call.bindings {
            match exp {
                Exp::Null => {
                    args.insert(name.clone(), Value::Null);
                }
                Exp::Literal(v) => {
                    args.insert(name.clone(), v.clone());
                }
                Exp::Sweep(vs) => {
                    sweepargs.push(name.clone());
                    args.insert(name.clone(), Value::Array(vs.clone()));
                }
                Exp::ArrayExp(items) => {
                    let vs: Vec<Value> = items.iter().map(exp_literal).collect();
                    args.insert(name.clone(), Value::Array(vs));
                }
                Exp::MapExp(items) => {
                    let map: serde_json::Map<String, Value> =
                        items.iter().map(|(k, e)| (k.clone(), exp_literal(e))).collect();
                    args.insert(name.clone(), Value::Object(map));
                }
                Exp::CallRef { .. } | Exp::SelfRef(_) => {
                    tracing::warn!(arg = %name, "non-literal binding in invocation call");
                    args.insert(name.clone(), Value::Null);
                }
            }
        }
        Self { call: call.callable.clone(), args, sweepargs, include }
    }

    /// Rebuild the top-level call statement this invocation describes.
    pub fn to_call_stm(&self) -> CallStm {
        let mut call = CallStm::new(self.call.clone());
        for (name, value) in &self.args {
            let exp = if self.sweepargs.iter().any(|s| s == name) {
                Exp::Sweep(value.as_array().cloned().unwrap_or_default())
            } else if value.is_null() {
                Exp::Null
            } else {
                Exp::Literal(value.clone())
            };
            call.bindings.insert(name.clone(), exp);
        }
        call
    }
}

fn exp_literal(exp: &Exp) -> Value {
    match exp {
        Exp::Null => Value::Null,
        Exp::Literal(v) => v.clone(),
        Exp::ArrayExp(items) => Value::Array(items.iter().map(exp_literal).collect()),
        Exp::MapExp(items) => {
            Value::Object(items.iter().map(|(k, e)| (k.clone(), exp_literal(e))).collect())
        }
        Exp::Sweep(vs) => Value::Array(vs.clone()),
        Exp::CallRef { .. } | Exp::SelfRef(_) => Value::Null,
    }
}

fn render_literal(value: &Value) -> String {
    // serde_json's compact form is the canonical MRO literal syntax
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

#[cfg(test)]
#[path = "invocation_tests.rs"]
mod tests;
