use std::time::Duration;

use cadence_core::types::{
    ChainConfig, ChainElement, ChainId, LogEvent, RunId, RunRecord, RunStatus, StepRecord,
};
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Operations the scheduler needs from its backing store.
///
/// Implementations must be shareable across the tick loop and every chain run
/// in flight; `SqliteStore` serialises access through a connection mutex.
pub trait Store: Send + Sync {
    /// Non-blocking named lock. `Ok(false)` means another holder has it.
    /// Re-acquiring a lock this store already holds returns `Ok(true)`.
    fn try_acquire_named_lock(&self, name: &str) -> Result<bool>;

    /// Insert a `STARTED` row and return its id.
    fn insert_run_status(
        &self,
        chain_id: ChainId,
        client_name: &str,
        at: DateTime<Utc>,
    ) -> Result<RunId>;

    /// Move a `STARTED` run into `status`.
    ///
    /// Returns `Ok(false)` if the row is missing or already terminal, so a
    /// run is never transitioned twice.
    fn update_run_status(&self, run_id: RunId, status: RunStatus, at: DateTime<Utc>)
        -> Result<bool>;

    /// Number of `STARTED` runs of `chain_id`.
    ///
    /// May return [`crate::StoreError::NoRows`]; that is an empty result, not a failure.
    fn count_running_instances(&self, chain_id: ChainId) -> Result<u32>;

    /// Runs still `STARTED` that belong to `client_name`.
    fn unterminated_runs(&self, client_name: &str) -> Result<Vec<RunRecord>>;

    /// Remove a chain and its elements. `Ok(false)` when nothing was deleted.
    fn delete_chain_config(&self, chain_id: ChainId) -> Result<bool>;

    fn insert_log_event(&self, event: &LogEvent) -> Result<()>;

    /// Persist the outcome of one chain element execution.
    fn record_step(&self, step: &StepRecord) -> Result<()>;

    /// Live chains visible to `client_name` (unscoped chains included).
    fn live_chains(&self, client_name: &str) -> Result<Vec<ChainConfig>>;

    /// Elements of `chain_id` in ordinal order.
    fn chain_elements(&self, chain_id: ChainId) -> Result<Vec<ChainElement>>;

    /// Execute `sql` in its own transaction, binding `params` positionally.
    ///
    /// Returns the number of rows changed, or for a bound query such as
    /// `SELECT my_fn(?1)` the number of rows it returned. Interrupted with
    /// [`crate::StoreError::Interrupted`] once `timeout` elapses.
    fn execute_sql(&self, sql: &str, params: &[String], timeout: Option<Duration>) -> Result<u64>;

    /// Cheap connectivity probe.
    fn ping(&self) -> Result<()>;
}
