//! Chain execution state machine.
//!
//! A run is `STARTED` in the store before the first element executes and is
//! moved to `CHAIN_DONE` or `CHAIN_FAILED` after the last one. Each element
//! that begins produces exactly one `execution_log` row. When the run is
//! cancelled the row stays `STARTED` and crash recovery fails it on the next
//! startup.

use std::time::Duration;

use cadence_core::types::{
    ChainConfig, ChainElement, ChainElementExecution, ChainId, LogLevel, RunId, RunStatus,
    StepOutcome, StepRecord,
};
use cadence_store::{Store, StoreError};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::context::SchedulerContext;
use crate::journal::Journal;
use crate::tasks::{TaskContext, TaskError, TaskOutput, TaskRunners};

/// How a call to [`ChainExecutor::execute_chain`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The `STARTED` row could not be written; no element ran.
    NotStarted,
    Done,
    Failed,
    /// Cancelled mid-run; the run is still `STARTED` in the store.
    Interrupted,
}

enum StepResult {
    Succeeded,
    Failed,
    Interrupted,
}

pub struct ChainExecutor {
    ctx: SchedulerContext,
    journal: Journal,
    runners: TaskRunners,
}

impl ChainExecutor {
    pub fn new(ctx: SchedulerContext) -> Self {
        Self::with_runners(ctx, TaskRunners::default())
    }

    pub fn with_runners(ctx: SchedulerContext, runners: TaskRunners) -> Self {
        let journal = ctx.journal();
        Self {
            ctx,
            journal,
            runners,
        }
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    /// Run `elements` of `chain` in position order and record the result.
    ///
    /// Never returns an error: every failure ends up in the log and in the
    /// run's terminal status.
    #[instrument(skip_all, fields(chain_id = chain.id, chain = %chain.name))]
    pub async fn execute_chain(
        &self,
        chain: &ChainConfig,
        elements: &[ChainElement],
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let (chain_id, client) = (chain.id, self.ctx.client_name.clone());
        let run_id = match self
            .with_store(move |store| store.insert_run_status(chain_id, &client, Utc::now()))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.journal.error(
                    Some(chain.id),
                    format!("cannot record start of chain '{}', run skipped: {e}", chain.name),
                );
                return RunOutcome::NotStarted;
            }
        };
        self.journal.debug(Some(chain.id), format!("run {run_id} of chain '{}' started", chain.name));

        let task_ctx = TaskContext {
            store: self.ctx.store.clone(),
            journal: self.journal.clone(),
            cancel: cancel.clone(),
            max_output_bytes: self.ctx.max_output_bytes,
        };

        let mut ordered: Vec<&ChainElement> = elements.iter().collect();
        ordered.sort_by_key(|e| e.position);

        let mut failed = false;
        for element in ordered {
            if cancel.is_cancelled() {
                info!(run_id, "run interrupted before task {}", element.id);
                return RunOutcome::Interrupted;
            }
            if failed && !element.autonomous {
                debug!(run_id, task_id = element.id, "skipping task after chain failure");
                continue;
            }

            match self.run_element(&task_ctx, run_id, element).await {
                StepResult::Succeeded => {}
                StepResult::Failed if element.ignore_error => {}
                StepResult::Failed => failed = true,
                StepResult::Interrupted => {
                    info!(run_id, task_id = element.id, "run interrupted");
                    return RunOutcome::Interrupted;
                }
            }
        }

        let status = if failed {
            RunStatus::ChainFailed
        } else {
            RunStatus::ChainDone
        };
        match self
            .with_store(move |store| store.update_run_status(run_id, status, Utc::now()))
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(run_id, %status, "run was already terminal"),
            Err(e) => {
                self.journal.error(
                    Some(chain.id),
                    format!("cannot record {status} for run {run_id}, left for crash recovery: {e}"),
                );
            }
        }
        self.journal.debug(Some(chain.id), format!("run {run_id} finished with {status}"));

        if failed {
            if chain.self_destruct {
                delete_chain_config(&self.ctx, chain.id);
            }
            RunOutcome::Failed
        } else {
            RunOutcome::Done
        }
    }

    /// Execute one element with its retry policy and write its step record.
    #[instrument(skip_all, fields(run_id = run_id, task_id = element.id))]
    async fn run_element(&self, ctx: &TaskContext, run_id: RunId, element: &ChainElement) -> StepResult {
        let mut execution = ChainElementExecution::new(run_id, element, self.ctx.default_task_timeout);
        let runner = self.runners.for_kind(element.kind);
        let max_attempts = element.max_attempts();

        for attempt in 1..=max_attempts {
            execution.attempt = attempt;
            let result = runner.run(ctx, element, &execution).await;

            let error = match result {
                Ok(output) => match self.write_step(&mut execution, StepOutcome::Succeeded, Ok(&output)).await {
                    Ok(()) => {
                        self.journal.log(
                            LogLevel::Debug,
                            Some(element.chain_id),
                            Some(element.id),
                            format!(
                                "run {run_id}: task '{}' succeeded in {}ms",
                                element.label(),
                                execution.elapsed().as_millis()
                            ),
                        );
                        return StepResult::Succeeded;
                    }
                    Err(e) => TaskError::Store(e),
                },
                Err(e) if e.is_cancelled() => {
                    let _ = self.write_step(&mut execution, StepOutcome::Failed, Err(&e)).await;
                    return StepResult::Interrupted;
                }
                Err(e) => e,
            };

            if attempt < max_attempts {
                self.journal.log(
                    LogLevel::Warn,
                    Some(element.chain_id),
                    Some(element.id),
                    format!(
                        "run {run_id}: task '{}' attempt {attempt}/{max_attempts} failed: {error}; retrying in {}ms",
                        element.label(),
                        element.retry_interval_ms
                    ),
                );
                if !pause(element.retry_interval(), &ctx.cancel).await {
                    let _ = self
                        .write_step(&mut execution, StepOutcome::Failed, Err(&TaskError::Cancelled))
                        .await;
                    return StepResult::Interrupted;
                }
                continue;
            }

            let outcome = if element.ignore_error {
                StepOutcome::IgnoredFailure
            } else {
                StepOutcome::Failed
            };
            let (level, verdict) = if element.ignore_error {
                (LogLevel::Warn, "failed, error ignored")
            } else {
                (LogLevel::Error, "failed")
            };
            self.journal.log(
                level,
                Some(element.chain_id),
                Some(element.id),
                format!(
                    "run {run_id}: task '{}' {verdict} after {attempt} attempt(s): {error}{}",
                    element.label(),
                    detail(error.output())
                ),
            );
            if let Err(e) = self.write_step(&mut execution, outcome, Err(&error)).await {
                error!(run_id, task_id = element.id, "failed to record step: {e}");
            }
            return StepResult::Failed;
        }

        // max_attempts is at least one, so the loop always returns.
        StepResult::Failed
    }

    async fn write_step(
        &self,
        execution: &mut ChainElementExecution,
        outcome: StepOutcome,
        result: Result<&TaskOutput, &TaskError>,
    ) -> cadence_store::Result<()> {
        execution.finish();
        let (exit_code, output) = match result {
            Ok(out) => (Some(out.exit_code), out.output.clone()),
            Err(e) => (e.exit_code(), e.output().to_string()),
        };
        let step = StepRecord {
            run_id: execution.run_id,
            chain_id: execution.chain_id,
            task_id: execution.task_id,
            kind: execution.kind,
            command: execution.command.clone(),
            parameters: execution.parameters.clone(),
            attempts: execution.attempt,
            outcome,
            exit_code,
            output,
            started_at: execution.started_at,
            finished_at: execution.finished_at.unwrap_or_else(Utc::now),
        };
        let (run_id, task_id, attempt) = (step.run_id, step.task_id, step.attempts);
        self.with_store(move |store| store.record_step(&step))
            .await
            .map_err(|e| {
                warn!(run_id, task_id, attempt, "step record write failed: {e}");
                e
            })
    }

    /// Run-state writes go through the blocking pool: the store may wait on
    /// a writer lock held by a long SQL task.
    async fn with_store<T, F>(&self, call: F) -> cadence_store::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Store) -> cadence_store::Result<T> + Send + 'static,
    {
        let store = self.ctx.store.clone();
        tokio::task::spawn_blocking(move || call(store.as_ref()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store worker failed: {e}")))?
    }
}

/// Delete a chain's configuration after a failed self-destructing run.
///
/// Returns `true` if the chain was removed.
pub fn delete_chain_config(ctx: &SchedulerContext, chain_id: ChainId) -> bool {
    let journal = ctx.journal();
    journal.log(
        LogLevel::Info,
        Some(chain_id),
        None,
        "deleting self-destructive chain configuration",
    );
    match ctx.store.delete_chain_config(chain_id) {
        Ok(true) => true,
        Ok(false) => {
            warn!(chain_id, "self-destructive chain was already gone");
            false
        }
        Err(e) => {
            journal.error(Some(chain_id), format!("failed to delete chain configuration: {e}"));
            false
        }
    }
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn pause(interval: Duration, cancel: &CancellationToken) -> bool {
    if interval.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = cancel.cancelled() => false,
    }
}

fn detail(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!("\n{output}")
    }
}
