//! `cadence-scheduler`: the chain execution core.
//!
//! # Overview
//!
//! A scheduler process first claims its identity with
//! [`identity::try_acquire_identity`], repairs runs a crashed predecessor
//! left behind with [`recovery::repair_crashed_runs`], then hands control to
//! [`engine::SchedulerEngine`]. Each tick the engine asks
//! [`admission::can_proceed`] whether a due chain may start and passes
//! admitted chains to [`executor::ChainExecutor`], which walks the elements
//! through the [`tasks`] runners.
//!
//! # Task kinds
//!
//! | Kind      | Runner                                                  |
//! |-----------|---------------------------------------------------------|
//! | `SQL`     | body executed against the store, parameters bound       |
//! | `SHELL`   | program started directly with parameters as `argv`      |
//! | `BUILTIN` | `NoOp`, `Sleep` or `Log`                                |

pub mod admission;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod identity;
pub mod journal;
pub mod recovery;
pub mod schedule;
pub mod tasks;

#[cfg(test)]
mod test_support;

pub use context::SchedulerContext;
pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use executor::{ChainExecutor, RunOutcome};
pub use journal::Journal;
pub use schedule::Schedule;
