// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fully-qualified node names.
//!
//! A node's fqname has the form `ID.<psid>.<pipeline>[.<name>...]` and
//! uniquely identifies it within a pipestance. Fork and chunk directory
//! names hang off the node directory, not the fqname.

use serde::{Deserialize, Serialize};

/// Fully-qualified node name within a pipestance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fqname(String);

impl Fqname {
    /// Root fqname for a pipestance's top-level call: `ID.<psid>.<callable>`.
    pub fn top(psid: &str, callable: &str) -> Self {
        Fqname(format!("ID.{}.{}", psid, callable))
    }

    /// Child fqname for a sub-call: `<parent>.<name>`.
    pub fn child(&self, name: &str) -> Self {
        Fqname(format!("{}.{}", self.0, name))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Fqname(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pipestance id component, if the name is well-formed.
    pub fn psid(&self) -> Option<&str> {
        let mut parts = self.0.split('.');
        match parts.next() {
            Some("ID") => parts.next(),
            _ => None,
        }
    }

    /// Last name component (the call alias for non-root nodes).
    pub fn base(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// Whether `self` names `other` or one of its ancestors.
    pub fn contains(&self, other: &Fqname) -> bool {
        other.0 == self.0 || other.0.starts_with(&format!("{}.", self.0))
    }
}

impl std::fmt::Display for Fqname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fqname {
    fn from(s: &str) -> Self {
        Fqname(s.to_string())
    }
}

impl From<String> for Fqname {
    fn from(s: String) -> Self {
        Fqname(s)
    }
}

impl AsRef<str> for Fqname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for Fqname {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// Directory name for a fork: `fork<N>`.
pub fn fork_dir_name(index: usize) -> String {
    format!("fork{}", index)
}

/// Directory name for a chunk: `chnk<M>[.u<uniq>]`.
pub fn chunk_dir_name(index: usize, uniquifier: Option<&str>) -> String {
    match uniquifier {
        Some(u) => format!("chnk{}.u{}", index, u),
        None => format!("chnk{}", index),
    }
}

#[cfg(test)]
#[path = "fqname_tests.rs"]
mod tests;
