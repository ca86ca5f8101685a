// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use martian_core::MetadataKind;
use proptest::prelude::*;

#[test]
fn parse_fork_breadcrumb() {
    let name = JournalName::parse("ID.ps.P.S.fork0.complete").unwrap();
    assert_eq!(name.fqname, "ID.ps.P.S");
    assert_eq!(name.fork_index, 0);
    assert_eq!(name.chunk_index, None);
    assert_eq!(name.uniquifier, None);
    assert_eq!(name.kind(), Some(MetadataKind::Complete));
    assert_eq!(name.phase(), JournalPhase::Main);
}

#[test]
fn parse_chunk_breadcrumb_with_uniquifier() {
    let name = JournalName::parse("ID.ps.P.S.fork2.chnk3.u0123456789.errors").unwrap();
    assert_eq!(name.fork_index, 2);
    assert_eq!(name.chunk_index, Some(3));
    assert_eq!(name.uniquifier.as_deref(), Some("0123456789"));
    assert_eq!(name.kind(), Some(MetadataKind::Errors));
}

#[yare::parameterized(
    split = { "ID.ps.P.S.fork0.split_complete", JournalPhase::Split, MetadataKind::Complete },
    join = { "ID.ps.P.S.fork0.join_log", JournalPhase::Join, MetadataKind::Log },
    split_defs = { "ID.ps.P.S.fork0.split_stage_defs", JournalPhase::Split, MetadataKind::StageDefs },
)]
fn phase_prefixes_route(name: &str, phase: JournalPhase, kind: MetadataKind) {
    let parsed = JournalName::parse(name).unwrap();
    assert_eq!(parsed.phase(), phase);
    assert_eq!(parsed.kind(), Some(kind));
}

#[test]
fn unknown_kind_is_none_but_parses() {
    let name = JournalName::parse("ID.ps.P.S.fork0.mystery").unwrap();
    assert_eq!(name.kind(), None);
}

#[yare::parameterized(
    no_fork = { "ID.ps.P.S.complete" },
    bad_fork = { "ID.ps.P.S.forkX.complete" },
    empty = { "" },
)]
fn malformed_names_do_not_parse(name: &str) {
    assert!(JournalName::parse(name).is_none(), "{:?} should not parse", name);
}

#[test]
fn short_uniq_folds_into_state() {
    // .uabc does not match the 10-hex uniquifier group; the trailing
    // capture swallows it and the unknown kind is ignored downstream.
    let parsed = JournalName::parse("ID.ps.P.S.fork0.uabc.complete").unwrap();
    assert_eq!(parsed.uniquifier, None);
    assert_eq!(parsed.state, "uabc.complete");
    assert_eq!(parsed.kind(), None);

    let full = JournalName::parse("ID.ps.S.fork0.u0123456789.complete").unwrap();
    assert_eq!(full.uniquifier.as_deref(), Some("0123456789"));
}

#[test]
fn round_trip_formats() {
    let name = JournalName::new(
        "ID.ps.P.S",
        1,
        Some(4),
        Some("abcdef0123".to_string()),
        JournalPhase::Main,
        MetadataKind::Complete,
    );
    assert_eq!(name.to_file_name(), "ID.ps.P.S.fork1.chnk4.uabcdef0123.complete");
    assert_eq!(JournalName::parse(&name.to_file_name()).unwrap(), name);
}

#[test]
fn write_breadcrumb_leaves_no_tmp() {
    let dir = tempfile::tempdir().unwrap();
    let name = JournalName::new("ID.ps.P.S", 0, None, None, JournalPhase::Main, MetadataKind::Complete);
    write_breadcrumb(dir.path(), &name).unwrap();
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["ID.ps.P.S.fork0.complete".to_string()]);
}

proptest! {
    // The parser recovers every field iff the name matches the grammar.
    #[test]
    fn parse_recovers_formatted_fields(
        fq in "[A-Za-z][A-Za-z0-9_.]{0,20}",
        fork in 0usize..100,
        chunk in prop::option::of(0usize..100),
        uniq in prop::option::of("[a-f0-9]{10}"),
        state in "[a-z_]{1,12}",
    ) {
        let name = JournalName {
            fqname: fq,
            fork_index: fork,
            chunk_index: chunk,
            uniquifier: uniq,
            state,
        };
        let parsed = JournalName::parse(&name.to_file_name());
        prop_assert_eq!(parsed, Some(name));
    }
}
