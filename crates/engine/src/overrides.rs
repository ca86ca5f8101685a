// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-stage resource overrides.
//!
//! The overrides file is JSON keyed by node fqname (without the
//! `ID.<psid>.` prefix, so one file serves every pipestance), mapping
//! `split|chunk|join.threads|mem_gb|vmem_gb|profile` to values. Invalid
//! values are logged and ignored; the chain continues to the next layer.

use martian_core::{Fqname, JobResources};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverridesError {
    #[error("failed to read overrides {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("overrides {path} is not a JSON object: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default)]
pub struct Overrides {
    table: HashMap<String, HashMap<String, Value>>,
}

impl Overrides {
    pub fn load(path: &Path) -> Result<Self, OverridesError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| OverridesError::Read { path: path.to_path_buf(), source: e })?;
        let table = serde_json::from_str(&text)
            .map_err(|e| OverridesError::Parse { path: path.to_path_buf(), source: e })?;
        Ok(Self { table })
    }

    pub fn from_table(table: HashMap<String, HashMap<String, Value>>) -> Self {
        Self { table }
    }

    /// Strip the pipestance-specific prefix so override keys are stable.
    fn override_key(fqname: &Fqname) -> &str {
        let s = fqname.as_str();
        let Some(rest) = s.strip_prefix("ID.") else {
            return s;
        };
        match rest.find('.') {
            Some(dot) => &rest[dot + 1..],
            None => s,
        }
    }

    fn lookup(&self, fqname: &Fqname, key: &str) -> Option<&Value> {
        self.table.get(Self::override_key(fqname))?.get(key)
    }

    fn int_override(&self, fqname: &Fqname, key: &str) -> Option<i64> {
        let value = self.lookup(fqname, key)?;
        match value.as_i64() {
            Some(n) => Some(n),
            None => {
                tracing::warn!(fqname = %fqname, key, %value, "ignoring non-integer override");
                None
            }
        }
    }

    fn str_override(&self, fqname: &Fqname, key: &str) -> Option<String> {
        let value = self.lookup(fqname, key)?;
        match value.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                tracing::warn!(fqname = %fqname, key, %value, "ignoring non-string override");
                None
            }
        }
    }

    /// Layer overrides for one phase (`split`, `chunk`, `join`) on top of
    /// the base request.
    pub fn resources_for(
        &self,
        fqname: &Fqname,
        phase: &str,
        base: JobResources,
    ) -> JobResources {
        let over = JobResources {
            threads: self.int_override(fqname, &format!("{}.threads", phase)),
            mem_gb: self.int_override(fqname, &format!("{}.mem_gb", phase)),
            vmem_gb: self.int_override(fqname, &format!("{}.vmem_gb", phase)),
            special: self.str_override(fqname, &format!("{}.profile", phase)),
        };
        base.overridden_by(over)
    }
}

#[cfg(test)]
#[path = "overrides_tests.rs"]
mod tests;
