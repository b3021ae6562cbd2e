//! `cadence-core`: domain types and configuration shared by every Cadence crate.

pub mod config;
pub mod error;
pub mod types;

pub use error::{CadenceError, Result};
