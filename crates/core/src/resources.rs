// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource requests for jobs.

use serde::{Deserialize, Serialize};

/// Resources a job asks for. Unset fields defer to the next layer in the
/// override chain (`@using` → stage_defs → overrides file → job manager
/// clamp).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_gb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmem_gb: Option<i64>,
    /// Special queue request, passed through to cluster job managers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
}

impl JobResources {
    pub fn new(threads: i64, mem_gb: i64) -> Self {
        Self { threads: Some(threads), mem_gb: Some(mem_gb), vmem_gb: None, special: None }
    }

    /// Layer `over` on top of `self`: set fields in `over` win.
    pub fn overridden_by(self, over: JobResources) -> JobResources {
        JobResources {
            threads: over.threads.or(self.threads),
            mem_gb: over.mem_gb.or(self.mem_gb),
            vmem_gb: over.vmem_gb.or(self.vmem_gb),
            special: over.special.or(self.special),
        }
    }

    /// Fill unset fields with defaults.
    pub fn with_defaults(self, threads: i64, mem_gb: i64) -> JobResources {
        JobResources {
            threads: Some(self.threads.unwrap_or(threads)),
            mem_gb: Some(self.mem_gb.unwrap_or(mem_gb)),
            vmem_gb: self.vmem_gb,
            special: self.special,
        }
    }

    pub fn threads_or(&self, default: i64) -> i64 {
        self.threads.unwrap_or(default)
    }

    pub fn mem_gb_or(&self, default: i64) -> i64 {
        self.mem_gb.unwrap_or(default)
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
