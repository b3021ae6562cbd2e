use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::types::{ChainElement, ChainElementExecution, LogLevel};

use super::{TaskContext, TaskError, TaskOutput, TaskRunner};

/// The in-process procedures a BUILTIN element may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Does nothing. Useful as a chain placeholder.
    NoOp,
    /// Waits for the number of seconds given as the first parameter.
    Sleep,
    /// Writes its parameters to the log as one INFO event.
    Log,
}

impl FromStr for Builtin {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(Builtin::NoOp),
            "sleep" => Ok(Builtin::Sleep),
            "log" => Ok(Builtin::Log),
            _ => Err(TaskError::UnknownBuiltin(s.to_string())),
        }
    }
}

impl Builtin {
    async fn call(
        self,
        ctx: &TaskContext,
        element: &ChainElement,
        execution: &ChainElementExecution,
    ) -> Result<TaskOutput, TaskError> {
        match self {
            Builtin::NoOp => Ok(TaskOutput::default()),
            Builtin::Sleep => {
                let secs = execution
                    .parameters
                    .first()
                    .ok_or_else(|| TaskError::InvalidParameters("Sleep needs a duration in seconds".into()))?;
                let secs: f64 = secs
                    .trim()
                    .parse()
                    .map_err(|_| TaskError::InvalidParameters(format!("not a number of seconds: {secs}")))?;
                let pause = Duration::try_from_secs_f64(secs)
                    .map_err(|e| TaskError::InvalidParameters(format!("invalid sleep duration {secs}: {e}")))?;
                tokio::select! {
                    _ = tokio::time::sleep(pause) => Ok(TaskOutput::default()),
                    _ = ctx.cancel.cancelled() => Err(TaskError::Cancelled),
                }
            }
            Builtin::Log => {
                if execution.parameters.is_empty() {
                    return Err(TaskError::InvalidParameters("Log needs a message".into()));
                }
                let message = execution.parameters.join(" ");
                ctx.journal.log(
                    LogLevel::Info,
                    Some(execution.chain_id),
                    Some(element.id),
                    message.clone(),
                );
                Ok(TaskOutput::new(message))
            }
        }
    }
}

/// Looks the element's command up among the [`Builtin`] procedures.
#[derive(Debug, Default)]
pub struct BuiltinRunner;

#[async_trait]
impl TaskRunner for BuiltinRunner {
    async fn run(
        &self,
        ctx: &TaskContext,
        element: &ChainElement,
        execution: &ChainElementExecution,
    ) -> Result<TaskOutput, TaskError> {
        let builtin: Builtin = execution.command.parse()?;
        match execution.timeout {
            Some(limit) => tokio::time::timeout(limit, builtin.call(ctx, element, execution))
                .await
                .map_err(|_| TaskError::Timeout {
                    ms: limit.as_millis() as u64,
                })?,
            None => builtin.call(ctx, element, execution).await,
        }
    }
}
