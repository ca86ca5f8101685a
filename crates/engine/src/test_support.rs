// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use crate::overrides::Overrides;
use crate::pipestance::Pipestance;
use crate::runtime::{Runtime, RuntimeConfig};
use martian_adapters::test_support::{FakeJobManager, Submission};
use martian_adapters::{JobManager, RetryConfig};
use martian_core::{FakeClock, MetadataState};
use martian_mro::test_support::FixtureCompiler;
use martian_mro::{Ast, MroCache};
use std::sync::Arc;

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub runtime: Arc<Runtime>,
    pub jm: Arc<FakeJobManager>,
    pub clock: FakeClock,
}

impl Harness {
    /// Runtime wired to a fake job manager and a fixture compiler.
    pub fn new(ast: Ast) -> Self {
        Self::with_config(ast, RuntimeConfig::default(), RetryConfig::default())
    }

    pub fn with_config(ast: Ast, config: RuntimeConfig, retry: RetryConfig) -> Self {
        let clock = FakeClock::at_system_time();
        let jm = Arc::new(FakeJobManager::new());
        let runtime = Arc::new(Runtime {
            config,
            clock: Arc::new(clock.clone()),
            local_jm: Arc::clone(&jm) as Arc<dyn JobManager>,
            remote_jm: None,
            retry,
            overrides: Overrides::default(),
            cache: MroCache::new(),
            compiler: Arc::new(FixtureCompiler::new(ast)),
        });
        Self { dir: tempfile::tempdir().expect("tempdir"), runtime, jm, clock }
    }

    pub fn pipestance_path(&self) -> std::path::PathBuf {
        self.dir.path().join("ps")
    }

    pub fn invoke(&self, src: &str) -> Pipestance {
        Pipestance::invoke(Arc::clone(&self.runtime), "ps", &self.pipestance_path(), src, &[])
            .expect("invoke")
    }

    /// Tick the pipestance, answering each submission with `respond`,
    /// until it reaches a terminal state or the tick budget runs out.
    pub fn drive(
        &self,
        pipestance: &Pipestance,
        mut respond: impl FnMut(&Submission),
        max_ticks: usize,
    ) -> MetadataState {
        let mut state = pipestance.get_state();
        for _ in 0..max_ticks {
            state = pipestance.step();
            if state.is_done() || state == MetadataState::Failed {
                return state;
            }
            for submission in self.jm.take_submissions() {
                respond(&submission);
            }
        }
        state
    }
}

/// Respond to a submission like a trivially-succeeding identity stage.
pub fn identity_responder(submission: &Submission) {
    match submission.shell_name() {
        "split" => submission.complete_split(&serde_json::json!({"chunks": [{}]})),
        _ => {
            let args: serde_json::Value = submission
                .metadata
                .read(martian_core::MetadataKind::Args)
                .unwrap_or(serde_json::Value::Null);
            submission.complete(&serde_json::json!({"y": args.get("x").cloned()}));
        }
    }
}
