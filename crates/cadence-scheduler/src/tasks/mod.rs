//! Task runners, one per [`TaskKind`].
//!
//! The set of kinds is closed, so dispatch is a `match` in
//! [`TaskRunners::for_kind`] rather than a registry. Each runner is still a
//! separate [`TaskRunner`] so it can be tested on its own.

mod builtin;
mod shell;
mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::types::{ChainElement, ChainElementExecution, TaskKind};
use cadence_shell::ShellError;
use cadence_store::{Store, StoreError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::journal::Journal;

pub use builtin::{Builtin, BuiltinRunner};
pub use shell::ShellRunner;
pub use sql::SqlRunner;

/// What a runner gets besides the element itself.
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn Store>,
    pub journal: Journal,
    /// Cancelled on shutdown; runners abandon their work when it fires.
    pub cancel: CancellationToken,
    pub max_output_bytes: usize,
}

/// Result of a successful attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    pub output: String,
    pub exit_code: i32,
}

impl TaskOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: 0,
        }
    }
}

/// Why one attempt failed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The program ran and exited non-zero. Not a transport error: the exit
    /// code and output are data for the retry policy.
    #[error("exited with code {code}")]
    NonZeroExit { code: i32, output: String },

    #[error("shell error: {0}")]
    Shell(ShellError),

    #[error("sql error: {0}")]
    Store(StoreError),

    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("unknown builtin task '{0}'")]
    UnknownBuiltin(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// The blocking worker running the task panicked or was aborted.
    #[error("task worker failed: {0}")]
    Worker(String),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// Exit code to record for this failure, if one exists.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TaskError::NonZeroExit { code, .. } => Some(*code),
            TaskError::Shell(e) => Some(e.exit_code()),
            TaskError::Timeout { .. } => Some(cadence_shell::TIMEOUT_EXIT_CODE),
            _ => None,
        }
    }

    /// Output captured before the failure.
    pub fn output(&self) -> &str {
        match self {
            TaskError::NonZeroExit { output, .. } => output,
            _ => "",
        }
    }
}

impl From<ShellError> for TaskError {
    fn from(e: ShellError) -> Self {
        match e {
            ShellError::Timeout { ms, .. } => TaskError::Timeout { ms },
            ShellError::Cancelled { .. } => TaskError::Cancelled,
            other => TaskError::Shell(other),
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Interrupted { ms } => TaskError::Timeout { ms },
            other => TaskError::Store(other),
        }
    }
}

/// One attempt of one chain element.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(
        &self,
        ctx: &TaskContext,
        element: &ChainElement,
        execution: &ChainElementExecution,
    ) -> Result<TaskOutput, TaskError>;
}

/// Dispatch table keyed on [`TaskKind`].
#[derive(Default)]
pub struct TaskRunners {
    sql: SqlRunner,
    shell: ShellRunner,
    builtin: BuiltinRunner,
}

impl TaskRunners {
    pub fn for_kind(&self, kind: TaskKind) -> &dyn TaskRunner {
        match kind {
            TaskKind::Sql => &self.sql,
            TaskKind::Shell => &self.shell,
            TaskKind::Builtin => &self.builtin,
        }
    }
}
