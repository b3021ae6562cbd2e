//! Per-chain concurrency admission.
//!
//! The check counts `STARTED` rows and compares against the chain's limit.
//! It is not atomic with the insert that follows it: two checks that race
//! for the same chain can both pass and briefly exceed the limit by the
//! number of racers. That overshoot is accepted; admission never takes a
//! lock.

use cadence_core::types::ChainId;
use cadence_store::StoreError;
use tracing::debug;

use crate::context::SchedulerContext;

/// Decide whether a new run of `chain_id` may start.
///
/// `None` means unlimited and skips the query. An empty result from the
/// store admits; any other store error rejects and is journaled.
pub fn can_proceed(ctx: &SchedulerContext, chain_id: ChainId, max_instances: Option<u32>) -> bool {
    let Some(max) = max_instances else {
        return true;
    };

    match ctx.store.count_running_instances(chain_id) {
        Ok(running) if running >= max => {
            debug!(chain_id, running, max, "chain at max instances, not admitted");
            false
        }
        Ok(_) => true,
        Err(StoreError::NoRows) => true,
        Err(e) => {
            ctx.journal().error(
                Some(chain_id),
                format!("cannot check running instances, chain not started: {e}"),
            );
            false
        }
    }
}
