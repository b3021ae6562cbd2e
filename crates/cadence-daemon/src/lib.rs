//! Process plumbing around the scheduler core: CLI, health endpoint, store
//! bootstrap and identity standby. Shared by the `cadence` and
//! `cadence-test-task` binaries.

pub mod app;
pub mod cli;
pub mod diagnostic;
pub mod http;
pub mod standby;

/// Version string shown by `--version` and `/health`.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CADENCE_GIT_SHA"), ")");
