// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The AST produced by the external MRO compiler.

use crate::types::Params;
use indexmap::IndexMap;
use martian_core::JobResources;
use serde_json::Value;

/// A compiled MRO program: callables plus an optional top-level call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ast {
    pub callables: IndexMap<String, Callable>,
    pub call: Option<CallStm>,
    /// Include path recorded from the invocation source, if any.
    pub include: Option<String>,
}

impl Ast {
    pub fn callable(&self, id: &str) -> Option<&Callable> {
        self.callables.get(id)
    }
}

/// Stage or pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
    Stage(Stage),
    Pipeline(Pipeline),
}

impl Callable {
    pub fn id(&self) -> &str {
        match self {
            Callable::Stage(s) => &s.id,
            Callable::Pipeline(p) => &p.id,
        }
    }

    pub fn in_params(&self) -> &Params {
        match self {
            Callable::Stage(s) => &s.in_params,
            Callable::Pipeline(p) => &p.in_params,
        }
    }

    pub fn out_params(&self) -> &Params {
        match self {
            Callable::Stage(s) => &s.out_params,
            Callable::Pipeline(p) => &p.out_params,
        }
    }
}

/// How a stage's code is invoked; only the argv layout differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageLang {
    Python,
    Compiled,
    Exec,
}

martian_core::simple_display! {
    StageLang {
        Python => "py",
        Compiled => "comp",
        Exec => "exec",
    }
}

/// Stage code location.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCode {
    pub lang: StageLang,
    pub cmd: String,
    pub args: Vec<String>,
}

/// A stage definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub id: String,
    pub in_params: Params,
    pub out_params: Params,
    pub src: StageCode,
    /// Present iff the stage declares `split using (...)`; the params are
    /// the chunk-local inputs and outputs.
    pub split: Option<SplitParams>,
    /// Declared `@using` resources.
    pub resources: JobResources,
}

impl Stage {
    pub fn has_split(&self) -> bool {
        self.split.is_some()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SplitParams {
    pub in_params: Params,
    pub out_params: Params,
}

/// A pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub id: String,
    pub in_params: Params,
    pub out_params: Params,
    pub calls: Vec<CallStm>,
    /// `return (...)` bindings: out param name → expression.
    pub ret: IndexMap<String, Exp>,
}

/// Call modifiers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CallMods {
    pub local: bool,
    pub preflight: bool,
    pub volatile: bool,
    /// `volatile = strict`: outputs may be reclaimed as soon as direct
    /// consumers finish, without waiting for the whole pipestance.
    pub strict_volatile: bool,
    /// `disabled = <exp>`; a truthy resolution disables the call's forks.
    pub disabled: Option<Exp>,
}

/// One `call NAME as ALIAS (bindings)` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStm {
    /// Node name (the alias, or the callable id when not aliased).
    pub id: String,
    pub callable: String,
    pub bindings: IndexMap<String, Exp>,
    pub mods: CallMods,
}

impl CallStm {
    pub fn new(callable: impl Into<String>) -> Self {
        let callable = callable.into();
        Self { id: callable.clone(), callable, bindings: IndexMap::new(), mods: CallMods::default() }
    }
}

/// A binding expression.
///
/// Literal payloads are canonical JSON values; sweep elements stay as the
/// serialized fragments they arrived as and are canonicalized only when
/// compared (fork matching decodes both sides first).
#[derive(Debug, Clone, PartialEq)]
pub enum Exp {
    Null,
    Literal(Value),
    Sweep(Vec<Value>),
    ArrayExp(Vec<Exp>),
    MapExp(IndexMap<String, Exp>),
    /// `STAGE.output` reference to an upstream call in the same pipeline.
    CallRef { id: String, output: String },
    /// `self.param` reference to the enclosing pipeline's input.
    SelfRef(String),
}

impl Exp {
    pub fn int(v: i64) -> Exp {
        Exp::Literal(Value::from(v))
    }

    pub fn str(v: &str) -> Exp {
        Exp::Literal(Value::from(v))
    }

    /// Whether any sweep occurs anywhere in this expression tree.
    pub fn has_sweep(&self) -> bool {
        match self {
            Exp::Sweep(_) => true,
            Exp::ArrayExp(items) => items.iter().any(Exp::has_sweep),
            Exp::MapExp(items) => items.values().any(Exp::has_sweep),
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "ast_tests.rs"]
mod tests;
