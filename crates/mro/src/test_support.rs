// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AST fixtures for engine and workspace tests.

use crate::ast::{
    Ast, CallStm, Callable, Exp, Pipeline, SplitParams, Stage, StageCode, StageLang,
};
use crate::cache::{CompileError, Compiler};
use crate::types::{MroType, Param, Params};
use indexmap::IndexMap;
use martian_core::JobResources;
use std::path::PathBuf;

/// Build a stage with the given in/out params and no split.
pub fn stage(id: &str, ins: Vec<Param>, outs: Vec<Param>) -> Stage {
    Stage {
        id: id.to_string(),
        in_params: Params::new(ins),
        out_params: Params::new(outs),
        src: StageCode { lang: StageLang::Exec, cmd: format!("bin/{}", id.to_lowercase()), args: vec![] },
        split: None,
        resources: JobResources::default(),
    }
}

/// Build a stage that declares `split using (...)`.
pub fn split_stage(id: &str, ins: Vec<Param>, outs: Vec<Param>, chunk_ins: Vec<Param>) -> Stage {
    let mut stage = stage(id, ins, outs);
    stage.split =
        Some(SplitParams { in_params: Params::new(chunk_ins), out_params: Params::default() });
    stage
}

/// Build a pipeline from calls and return bindings.
pub fn pipeline(
    id: &str,
    ins: Vec<Param>,
    outs: Vec<Param>,
    calls: Vec<CallStm>,
    ret: Vec<(&str, Exp)>,
) -> Pipeline {
    Pipeline {
        id: id.to_string(),
        in_params: Params::new(ins),
        out_params: Params::new(outs),
        calls,
        ret: ret.into_iter().map(|(k, e)| (k.to_string(), e)).collect(),
    }
}

/// Build a call statement with bindings.
pub fn call(callable: &str, bindings: Vec<(&str, Exp)>) -> CallStm {
    let mut stm = CallStm::new(callable);
    stm.bindings = bindings.into_iter().map(|(k, e)| (k.to_string(), e)).collect();
    stm
}

/// Assemble an AST from callables and a top-level call.
pub fn ast(callables: Vec<Callable>, top: CallStm) -> Ast {
    Ast {
        callables: callables.into_iter().map(|c| (c.id().to_string(), c)).collect(),
        call: Some(top),
        include: None,
    }
}

/// `P` calling stage `S(x: int) -> (y: int)`; the canonical one-stage fixture.
pub fn single_stage_ast(x: Exp) -> Ast {
    let s = stage("S", vec![Param::new("x", MroType::Int)], vec![Param::new("y", MroType::Int)]);
    let p = pipeline(
        "P",
        vec![Param::new("x", MroType::Int)],
        vec![Param::new("y", MroType::Int)],
        vec![call("S", vec![("x", Exp::SelfRef("x".to_string()))])],
        vec![("y", Exp::CallRef { id: "S".to_string(), output: "y".to_string() })],
    );
    let mut top = call("P", vec![("x", x)]);
    top.id = "P".to_string();
    ast(vec![Callable::Stage(s), Callable::Pipeline(p)], top)
}

/// A compiler that returns a fixed AST regardless of source.
///
/// Reattachment tests hand it the same AST the pipestance was built from;
/// the bindings of the top call are replaced by the parsed invocation when
/// the source carries one, mirroring how the external compiler folds the
/// invocation statement into the program.
pub struct FixtureCompiler {
    pub ast: Ast,
}

impl FixtureCompiler {
    pub fn new(ast: Ast) -> Self {
        Self { ast }
    }
}

impl Compiler for FixtureCompiler {
    fn compile(&self, source: &str, _mropaths: &[PathBuf]) -> Result<Ast, CompileError> {
        let mut ast = self.ast.clone();
        if let Ok(data) = crate::invocation::InvocationData::build_call_data(source) {
            ast.call = Some(data.to_call_stm());
            ast.include = data.include;
        }
        Ok(ast)
    }
}

/// Shorthand for a map expression.
pub fn map_exp(entries: Vec<(&str, Exp)>) -> Exp {
    let map: IndexMap<String, Exp> =
        entries.into_iter().map(|(k, e)| (k.to_string(), e)).collect();
    Exp::MapExp(map)
}
