// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journal breadcrumb file names.
//!
//! Jobs drop `<fqname>.fork<N>[.chnk<M>][.u<uniq>].<state>` files into the
//! pipestance `journal/` directory when they transition. The trailing
//! state is a metadata kind, optionally prefixed with `split_` or `join_`
//! to route to the fork's split or join phase.

use martian_core::MetadataKind;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Which phase of a fork a breadcrumb addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalPhase {
    Main,
    Split,
    Join,
}

martian_core::simple_display! {
    JournalPhase {
        Main => "",
        Split => "split_",
        Join => "join_",
    }
}

/// A parsed journal breadcrumb name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalName {
    pub fqname: String,
    pub fork_index: usize,
    pub chunk_index: Option<usize>,
    pub uniquifier: Option<String>,
    /// Raw state component, e.g. `complete` or `split_complete`.
    pub state: String,
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // static pattern
        let re =
            Regex::new(r"(.*)\.fork(\d+)(?:\.chnk(\d+))?(?:\.u([a-f0-9]{10}))?\.(.*)$").unwrap();
        re
    })
}

impl JournalName {
    pub fn new(
        fqname: impl Into<String>,
        fork_index: usize,
        chunk_index: Option<usize>,
        uniquifier: Option<String>,
        phase: JournalPhase,
        kind: MetadataKind,
    ) -> Self {
        Self {
            fqname: fqname.into(),
            fork_index,
            chunk_index,
            uniquifier,
            state: format!("{}{}", phase, kind.name()),
        }
    }

    /// Parse a breadcrumb file name. Non-matching names yield `None` and
    /// are ignored by the watcher.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = name_regex().captures(name)?;
        Some(Self {
            fqname: caps.get(1)?.as_str().to_string(),
            fork_index: caps.get(2)?.as_str().parse().ok()?,
            chunk_index: match caps.get(3) {
                Some(m) => Some(m.as_str().parse().ok()?),
                None => None,
            },
            uniquifier: caps.get(4).map(|m| m.as_str().to_string()),
            state: caps.get(5)?.as_str().to_string(),
        })
    }

    pub fn to_file_name(&self) -> String {
        let mut name = format!("{}.fork{}", self.fqname, self.fork_index);
        if let Some(chunk) = self.chunk_index {
            name.push_str(&format!(".chnk{}", chunk));
        }
        if let Some(uniq) = &self.uniquifier {
            name.push_str(&format!(".u{}", uniq));
        }
        name.push('.');
        name.push_str(&self.state);
        name
    }

    /// Phase encoded in the state component.
    pub fn phase(&self) -> JournalPhase {
        if self.state.starts_with("split_") {
            JournalPhase::Split
        } else if self.state.starts_with("join_") {
            JournalPhase::Join
        } else {
            JournalPhase::Main
        }
    }

    /// Metadata kind with the phase prefix stripped. Unknown kinds are
    /// `None` and ignored at application time.
    pub fn kind(&self) -> Option<MetadataKind> {
        let bare = self
            .state
            .strip_prefix("split_")
            .or_else(|| self.state.strip_prefix("join_"))
            .unwrap_or(&self.state);
        MetadataKind::parse(bare)
    }
}

impl std::fmt::Display for JournalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_file_name())
    }
}

/// Drop a breadcrumb into the journal directory the way jobs do: write a
/// `.tmp` sibling, then rename, so the watcher never sees partial names.
pub fn write_breadcrumb(journal_dir: &Path, name: &JournalName) -> std::io::Result<()> {
    std::fs::create_dir_all(journal_dir)?;
    let dest = journal_dir.join(name.to_file_name());
    let tmp = journal_dir.join(format!("{}.tmp", name.to_file_name()));
    std::fs::write(&tmp, "")?;
    std::fs::rename(tmp, dest)
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
