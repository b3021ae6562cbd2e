//! Error types for the cadence-shell crate.

use thiserror::Error;

use crate::runner::{CANCELLED_EXIT_CODE, LAUNCH_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};

/// Transport-level failures of a shell command.
///
/// A command that starts and exits with a non-zero code is *not* an error;
/// that code comes back in [`crate::ShellOutput::exit_code`].
#[derive(Debug, Error)]
pub enum ShellError {
    /// The program could not be started (not found, permission denied, …).
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The deadline passed; the process was killed and reaped.
    #[error("command timed out after {ms}ms")]
    Timeout { ms: u64, pid: Option<u32> },

    /// The surrounding run was cancelled; the process was killed and reaped.
    #[error("command cancelled")]
    Cancelled { pid: Option<u32> },

    /// Waiting on the child failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Sentinel exit code reported alongside this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShellError::Launch { .. } | ShellError::Io(_) => LAUNCH_FAILURE_EXIT_CODE,
            ShellError::Timeout { .. } => TIMEOUT_EXIT_CODE,
            ShellError::Cancelled { .. } => CANCELLED_EXIT_CODE,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ShellError>;
