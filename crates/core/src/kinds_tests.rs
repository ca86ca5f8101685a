// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn file_names_carry_leading_underscore() {
    assert_eq!(MetadataKind::Complete.file_name(), "_complete");
    assert_eq!(MetadataKind::StageDefs.file_name(), "_stage_defs");
    assert_eq!(MetadataKind::MroSource.file_name(), "_mrosource");
}

#[test]
fn parse_round_trips_every_kind() {
    for kind in MetadataKind::ALL {
        assert_eq!(MetadataKind::parse(kind.name()), Some(*kind));
    }
}

#[test]
fn parse_rejects_unknown_names() {
    assert_eq!(MetadataKind::parse("bogus"), None);
    assert_eq!(MetadataKind::parse("_complete"), None);
}

#[yare::parameterized(
    errors = { MetadataKind::Errors, true },
    assert_kind = { MetadataKind::Assert, true },
    complete = { MetadataKind::Complete, false },
    log = { MetadataKind::Log, false },
)]
fn failure_kinds(kind: MetadataKind, expect: bool) {
    assert_eq!(kind.is_failure(), expect);
}

#[test]
fn immutable_kinds_cover_invocation_seed() {
    assert!(MetadataKind::Invocation.is_immutable());
    assert!(MetadataKind::Uuid.is_immutable());
    assert!(!MetadataKind::Outs.is_immutable());
}
