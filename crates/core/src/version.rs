// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime and pipeline version reporting for `_versions`.

use serde::{Deserialize, Serialize};

/// Payload of `_versions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    pub martian: String,
    pub pipelines: String,
}

impl Versions {
    pub fn current(pipelines: impl Into<String>) -> Self {
        Self { martian: runtime_version(), pipelines: pipelines.into() }
    }
}

/// Version of this runtime build.
pub fn runtime_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
