// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros for reducing boilerplate.
//!
//! - [`simple_display!`] — `Display` impl mapping enum variants to string literals
//! - [`metadata_kinds!`] — metadata-file vocabulary (enum + names + parse)

/// Generate a `Display` impl that maps enum variants to string literals.
///
/// Unit variants match directly; data-carrying variants use `(..)` to ignore fields.
///
/// ```ignore
/// crate::simple_display! {
///     MyEnum {
///         Foo => "foo",
///         Bar(..) => "bar",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    ($enum:ty { $( $variant:ident $(( $($ignore:tt)* ))? => $str:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant $(( $($ignore)* ))? => $str, )+
                })
            }
        }
    };
}

/// Generate the metadata-file vocabulary.
///
/// Each entry maps an enum variant to the bare kind name used in journal
/// breadcrumbs; the on-disk file name is the same with a leading underscore.
///
/// ```ignore
/// crate::metadata_kinds! {
///     Complete => "complete",
///     StageDefs => "stage_defs",
/// }
/// ```
#[macro_export]
macro_rules! metadata_kinds {
    ( $( $(#[$meta:meta])* $variant:ident => $name:literal ),+ $(,)? ) => {
        /// A typed metadata file under a node, fork, or chunk directory.
        ///
        /// Presence of the file is the primary completion signal; the bare
        /// name (no underscore) doubles as the journal breadcrumb suffix.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MetadataKind {
            $( $(#[$meta])* $variant, )+
        }

        impl MetadataKind {
            pub const ALL: &'static [MetadataKind] = &[ $( MetadataKind::$variant, )+ ];

            /// Bare kind name as it appears in journal breadcrumbs.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }

            /// On-disk file name (leading underscore).
            pub fn file_name(self) -> String {
                format!("_{}", self.name())
            }

            /// Parse a bare kind name (the journal breadcrumb suffix).
            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for MetadataKind {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}
