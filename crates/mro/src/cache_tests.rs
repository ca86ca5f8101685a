// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{single_stage_ast, FixtureCompiler};
use crate::Exp;
use std::sync::atomic::{AtomicUsize, Ordering};

struct CountingCompiler {
    inner: FixtureCompiler,
    calls: AtomicUsize,
}

impl Compiler for CountingCompiler {
    fn compile(&self, source: &str, mropaths: &[PathBuf]) -> Result<Ast, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(source, mropaths)
    }
}

#[test]
fn compile_hits_cache_on_same_source() {
    let cache = MroCache::new();
    let compiler = CountingCompiler {
        inner: FixtureCompiler::new(single_stage_ast(Exp::int(1))),
        calls: AtomicUsize::new(0),
    };
    let src = "call P(\n    x = 1,\n)\n";
    let a = cache.compile(&compiler, src, &[]).unwrap();
    let b = cache.compile(&compiler, src, &[]).unwrap();
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.call, b.call);
}

#[test]
fn compile_misses_on_different_source() {
    let cache = MroCache::new();
    let compiler = CountingCompiler {
        inner: FixtureCompiler::new(single_stage_ast(Exp::int(1))),
        calls: AtomicUsize::new(0),
    };
    cache.compile(&compiler, "call P(\n    x = 1,\n)\n", &[]).unwrap();
    cache.compile(&compiler, "call P(\n    x = 2,\n)\n", &[]).unwrap();
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn load_file_reads_through_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.mro");
    std::fs::write(&path, "call P()").unwrap();
    let cache = MroCache::new();
    assert_eq!(cache.load_file(&path).unwrap(), "call P()");
    // Cached copy survives deletion of the backing file
    std::fs::remove_file(&path).unwrap();
    assert_eq!(cache.load_file(&path).unwrap(), "call P()");
}

#[test]
fn load_file_missing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = MroCache::new().load_file(&dir.path().join("absent.mro"));
    assert!(matches!(err, Err(CompileError::Read(..))));
}

#[test]
fn mropath_splits_on_colons() {
    let paths = split_mropath("/a/mro:/b/mro::/c");
    assert_eq!(paths, vec![PathBuf::from("/a/mro"), PathBuf::from("/b/mro"), PathBuf::from("/c")]);
}
