// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! martian-core: shared types for the Martian pipeline runtime.
//!
//! Everything here is consumed by the storage, adapter, and engine crates:
//! fully-qualified node names, the metadata-file vocabulary, the state
//! lattice, resource requests, and perf records.

pub mod macros;

pub mod clock;
pub mod fqname;
pub mod kinds;
pub mod perf;
pub mod resources;
pub mod state;
pub mod version;

pub use clock::{Clock, FakeClock, SystemClock};
pub use fqname::{chunk_dir_name, fork_dir_name, Fqname};
pub use kinds::MetadataKind;
pub use perf::{ChunkPerf, ForkPerf, JobInfo, NodePerf, PipestancePerf, VdrEvent, VdrRecord};
pub use resources::JobResources;
pub use state::MetadataState;
pub use version::{runtime_version, Versions};
