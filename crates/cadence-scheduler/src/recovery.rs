use cadence_core::types::{LogLevel, RunStatus};
use chrono::Utc;
use tracing::{error, info};

use crate::context::SchedulerContext;

/// Fail every run this client left in `STARTED`.
///
/// Call once after the identity is acquired and before the tick loop starts:
/// holding the identity proves the previous owner of those runs is gone.
/// Store errors are logged and skipped. Returns the number of runs repaired;
/// a second call with no crash in between repairs nothing.
pub fn repair_crashed_runs(ctx: &SchedulerContext) -> usize {
    let journal = ctx.journal();
    let stale = match ctx.store.unterminated_runs(&ctx.client_name) {
        Ok(runs) => runs,
        Err(e) => {
            error!(client = %ctx.client_name, "crash recovery could not list runs: {e}");
            return 0;
        }
    };

    let mut repaired = 0;
    for run in stale {
        match ctx
            .store
            .update_run_status(run.run_id, RunStatus::ChainFailed, Utc::now())
        {
            Ok(true) => {
                repaired += 1;
                journal.log(
                    LogLevel::Warn,
                    Some(run.chain_id),
                    None,
                    format!(
                        "run {} started at {} was left unfinished by a previous scheduler; marked CHAIN_FAILED",
                        run.run_id,
                        run.started_at.to_rfc3339()
                    ),
                );
            }
            Ok(false) => {}
            Err(e) => {
                journal.error(
                    Some(run.chain_id),
                    format!(
                        "cannot mark run {} {}, still counted as running: {e}",
                        run.run_id,
                        RunStatus::ChainFailed
                    ),
                );
            }
        }
    }

    if repaired > 0 {
        info!(client = %ctx.client_name, repaired, "crash recovery finished");
    }
    repaired
}
