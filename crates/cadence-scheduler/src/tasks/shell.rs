use async_trait::async_trait;
use cadence_core::types::{ChainElement, ChainElementExecution};
use cadence_shell::{execute_shell_command, ShellOptions};
use tracing::debug;

use super::{TaskContext, TaskError, TaskOutput, TaskRunner};

/// Runs the element's command with its parameters as the argument vector.
#[derive(Debug, Default)]
pub struct ShellRunner;

#[async_trait]
impl TaskRunner for ShellRunner {
    async fn run(
        &self,
        ctx: &TaskContext,
        element: &ChainElement,
        execution: &ChainElementExecution,
    ) -> Result<TaskOutput, TaskError> {
        let options = ShellOptions {
            timeout: execution.timeout,
            max_output_bytes: ctx.max_output_bytes,
        };
        let out = execute_shell_command(
            &execution.command,
            &execution.parameters,
            &options,
            &ctx.cancel,
        )
        .await?;

        debug!(
            task_id = element.id,
            attempt = execution.attempt,
            exit_code = out.exit_code,
            truncated = out.truncated,
            "shell task finished"
        );
        if out.success() {
            Ok(TaskOutput::new(out.combined()))
        } else {
            Err(TaskError::NonZeroExit {
                code: out.exit_code,
                output: out.combined(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tasks::test_ctx::{element, task_ctx};
    use cadence_core::types::TaskKind;
    use std::time::Duration;

    #[tokio::test]
    async fn zero_exit_succeeds_with_output() {
        let (_store, ctx) = task_ctx();
        let el = element(TaskKind::Shell, "echo", &["hello", "world"]);
        let exec = ChainElementExecution::new(1, &el, None);

        let out = ShellRunner.run(&ctx, &el, &exec).await.unwrap();
        assert_eq!(out.output, "hello world");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure_with_its_code() {
        let (_store, ctx) = task_ctx();
        let el = element(TaskKind::Shell, "sh", &["-c", "echo nope; exit 1"]);
        let exec = ChainElementExecution::new(1, &el, None);

        let err = ShellRunner.run(&ctx, &el, &exec).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert_eq!(err.output(), "nope");
    }

    #[tokio::test]
    async fn execution_timeout_is_enforced() {
        let (_store, ctx) = task_ctx();
        let el = element(TaskKind::Shell, "sleep", &["5"]);
        let exec = ChainElementExecution::new(1, &el, Some(Duration::from_millis(100)));

        let err = ShellRunner.run(&ctx, &el, &exec).await.unwrap_err();
        assert!(matches!(err, TaskError::Timeout { ms: 100 }));
    }

    #[tokio::test]
    async fn launch_failure_is_a_failure() {
        let (_store, ctx) = task_ctx();
        let el = element(TaskKind::Shell, "/no/such/binary", &[]);
        let exec = ChainElementExecution::new(1, &el, None);

        let err = ShellRunner.run(&ctx, &el, &exec).await.unwrap_err();
        assert!(matches!(err, TaskError::Shell(_)));
        assert_eq!(err.exit_code(), Some(cadence_shell::LAUNCH_FAILURE_EXIT_CODE));
    }
}
