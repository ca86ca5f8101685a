// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! martian-mro: the MRO language surface the engine consumes.
//!
//! The full MRO parser/compiler is an external collaborator; this crate
//! holds the AST it produces (callables, call statements, expressions),
//! the invocation-statement round-trip needed for reattachment, AST
//! equivalence checks, and the content-hashed source cache.

pub mod ast;
pub mod cache;
pub mod equiv;
pub mod invocation;
pub mod parse;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use ast::{Ast, CallMods, CallStm, Callable, Exp, Pipeline, Stage, StageCode, StageLang};
pub use cache::{split_mropath, CompileError, Compiler, MroCache};
pub use equiv::equivalent_call;
pub use invocation::InvocationData;
pub use parse::ParseError;
pub use types::{MroType, Param, Params};
