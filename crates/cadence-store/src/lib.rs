//! `cadence-store`: the store access layer.
//!
//! Every other component talks to persistence through the [`Store`] trait.
//! [`SqliteStore`] is the production implementation: one SQLite file holds
//! chain definitions, run state, the execution log and log events, while the
//! scheduler identity lock lives in a sidecar file (see [`lock`]).

pub mod db;
pub mod error;
pub mod lock;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::{NewChain, NewElement, SqliteStore};
pub use store::Store;
