use async_trait::async_trait;
use cadence_core::types::{ChainElement, ChainElementExecution};
use tracing::debug;

use super::{TaskContext, TaskError, TaskOutput, TaskRunner};

/// Executes the element's body against the store in its own transaction.
///
/// Parameters are bound positionally (`?1`, `?2`, …). The statement runs on
/// the blocking pool; on cancellation the runner stops waiting and the
/// statement finishes or hits its own deadline in the background.
#[derive(Debug, Default)]
pub struct SqlRunner;

#[async_trait]
impl TaskRunner for SqlRunner {
    async fn run(
        &self,
        ctx: &TaskContext,
        element: &ChainElement,
        execution: &ChainElementExecution,
    ) -> Result<TaskOutput, TaskError> {
        let store = ctx.store.clone();
        let sql = execution.command.clone();
        let params = execution.parameters.clone();
        let timeout = execution.timeout;

        let work = tokio::task::spawn_blocking(move || store.execute_sql(&sql, &params, timeout));

        let changed = tokio::select! {
            joined = work => match joined {
                Ok(result) => result?,
                Err(e) => return Err(TaskError::Worker(e.to_string())),
            },
            _ = ctx.cancel.cancelled() => return Err(TaskError::Cancelled),
        };

        debug!(task_id = element.id, attempt = execution.attempt, changed, "sql task finished");
        Ok(TaskOutput::new(format!("{changed} row(s)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::test_ctx::{element, task_ctx};
    use crate::test_support::Op;
    use cadence_core::types::TaskKind;
    use cadence_store::Store;
    use std::time::Duration;

    #[tokio::test]
    async fn statement_runs_with_bound_parameters() {
        let (store, ctx) = task_ctx();
        store
            .inner()
            .execute_sql("CREATE TABLE t (v TEXT)", &[], None)
            .unwrap();

        let el = element(TaskKind::Sql, "INSERT INTO t (v) VALUES (?1)", &["it's"]);
        let exec = ChainElementExecution::new(1, &el, None);
        let out = SqlRunner.run(&ctx, &el, &exec).await.unwrap();
        assert_eq!(out.output, "1 row(s)");

        let n = store
            .inner()
            .execute_sql("DELETE FROM t WHERE v = ?1", &["it's".to_string()], None)
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn bound_function_call_succeeds() {
        let (_store, ctx) = task_ctx();
        let el = element(TaskKind::Sql, "SELECT upper(?1)", &["x"]);
        let exec = ChainElementExecution::new(1, &el, None);

        let out = SqlRunner.run(&ctx, &el, &exec).await.unwrap();
        assert_eq!(out.output, "1 row(s)");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn bad_statement_fails() {
        let (_store, ctx) = task_ctx();
        let el = element(TaskKind::Sql, "SELEC nonsense", &[]);
        let exec = ChainElementExecution::new(1, &el, None);

        let err = SqlRunner.run(&ctx, &el, &exec).await.unwrap_err();
        assert!(matches!(err, TaskError::Store(_)));
    }

    #[tokio::test]
    async fn store_error_fails() {
        let (store, ctx) = task_ctx();
        store.fail(Op::ExecuteSql);
        let el = element(TaskKind::Sql, "SELECT 1", &[]);
        let exec = ChainElementExecution::new(1, &el, None);

        assert!(SqlRunner.run(&ctx, &el, &exec).await.is_err());
    }

    #[tokio::test]
    async fn long_statement_times_out() {
        let (_store, ctx) = task_ctx();
        let el = element(
            TaskKind::Sql,
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n)
             SELECT count(*) FROM n",
            &[],
        );
        let exec = ChainElementExecution::new(1, &el, Some(Duration::from_millis(50)));

        let err = SqlRunner.run(&ctx, &el, &exec).await.unwrap_err();
        assert!(matches!(err, TaskError::Timeout { .. }));
    }
}
