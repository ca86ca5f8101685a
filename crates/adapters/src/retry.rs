// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry configuration (`jobmanagers/retry.json`).

use regex::Regex;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RetryJson {
    #[serde(default)]
    default_retries: u32,
    #[serde(default)]
    retry_on: Vec<String>,
}

/// Which errors are transient, and how many automatic restarts they earn.
#[derive(Debug)]
pub struct RetryConfig {
    pub default_retries: u32,
    patterns: Vec<Regex>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_parts(0, &["^signal: ".to_string()])
    }
}

impl RetryConfig {
    pub fn from_parts(default_retries: u32, retry_on: &[String]) -> Self {
        let patterns = retry_on
            .iter()
            .filter_map(|raw| match Regex::new(raw) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %raw, error = %e, "ignoring invalid retry pattern");
                    None
                }
            })
            .collect();
        Self { default_retries, patterns }
    }

    /// Load the config file; absent or unreadable files fall back to the
    /// built-in defaults.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<RetryJson>(&text) {
            Ok(json) => Self::from_parts(json.default_retries, &json.retry_on),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid retry config, using defaults");
                Self::default()
            }
        }
    }

    /// Whether any line of the error log matches a retry pattern.
    pub fn is_error_transient(&self, errors: &str) -> bool {
        errors.lines().any(|line| self.patterns.iter().any(|re| re.is_match(line)))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
