//! Failure injection for scheduler tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use cadence_core::types::{
    ChainConfig, ChainElement, ChainId, LogEvent, RunId, RunRecord, RunStatus, StepRecord,
};
use cadence_store::{Result, SqliteStore, Store, StoreError};
use chrono::{DateTime, Utc};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    TryAcquireNamedLock,
    InsertRunStatus,
    UpdateRunStatus,
    CountRunningInstances,
    UnterminatedRuns,
    DeleteChainConfig,
    InsertLogEvent,
    RecordStep,
    LiveChains,
    ChainElements,
    ExecuteSql,
    Ping,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Always,
    Times(u32),
    NoRows,
}

/// An in-memory [`SqliteStore`] whose operations can be made to fail.
pub struct FaultyStore {
    inner: SqliteStore,
    faults: Mutex<HashMap<Op, Fault>>,
    _lock_dir: TempDir,
}

impl FaultyStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let inner = SqliteStore::open_in_memory(dir.path()).unwrap();
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            _lock_dir: dir,
        }
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    /// Fail every call to `op` from now on.
    pub fn fail(&self, op: Op) {
        self.faults.lock().unwrap().insert(op, Fault::Always);
    }

    /// Fail the next `n` calls to `op`, then behave normally.
    pub fn fail_times(&self, op: Op, n: u32) {
        self.faults.lock().unwrap().insert(op, Fault::Times(n));
    }

    /// Answer `op` with [`StoreError::NoRows`].
    pub fn no_rows(&self, op: Op) {
        self.faults.lock().unwrap().insert(op, Fault::NoRows);
    }

    pub fn heal(&self, op: Op) {
        self.faults.lock().unwrap().remove(&op);
    }

    fn check(&self, op: Op) -> Result<()> {
        let mut faults = self.faults.lock().unwrap();
        match faults.get(&op).copied() {
            None => Ok(()),
            Some(Fault::Always) => Err(injected(op)),
            Some(Fault::NoRows) => Err(StoreError::NoRows),
            Some(Fault::Times(n)) => {
                if n <= 1 {
                    faults.remove(&op);
                } else {
                    faults.insert(op, Fault::Times(n - 1));
                }
                Err(injected(op))
            }
        }
    }
}

fn injected(op: Op) -> StoreError {
    StoreError::Unavailable(format!("injected fault in {op:?}"))
}

impl Store for FaultyStore {
    fn try_acquire_named_lock(&self, name: &str) -> Result<bool> {
        self.check(Op::TryAcquireNamedLock)?;
        self.inner.try_acquire_named_lock(name)
    }

    fn insert_run_status(
        &self,
        chain_id: ChainId,
        client_name: &str,
        at: DateTime<Utc>,
    ) -> Result<RunId> {
        self.check(Op::InsertRunStatus)?;
        self.inner.insert_run_status(chain_id, client_name, at)
    }

    fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.check(Op::UpdateRunStatus)?;
        self.inner.update_run_status(run_id, status, at)
    }

    fn count_running_instances(&self, chain_id: ChainId) -> Result<u32> {
        self.check(Op::CountRunningInstances)?;
        self.inner.count_running_instances(chain_id)
    }

    fn unterminated_runs(&self, client_name: &str) -> Result<Vec<RunRecord>> {
        self.check(Op::UnterminatedRuns)?;
        self.inner.unterminated_runs(client_name)
    }

    fn delete_chain_config(&self, chain_id: ChainId) -> Result<bool> {
        self.check(Op::DeleteChainConfig)?;
        self.inner.delete_chain_config(chain_id)
    }

    fn insert_log_event(&self, event: &LogEvent) -> Result<()> {
        self.check(Op::InsertLogEvent)?;
        self.inner.insert_log_event(event)
    }

    fn record_step(&self, step: &StepRecord) -> Result<()> {
        self.check(Op::RecordStep)?;
        self.inner.record_step(step)
    }

    fn live_chains(&self, client_name: &str) -> Result<Vec<ChainConfig>> {
        self.check(Op::LiveChains)?;
        self.inner.live_chains(client_name)
    }

    fn chain_elements(&self, chain_id: ChainId) -> Result<Vec<ChainElement>> {
        self.check(Op::ChainElements)?;
        self.inner.chain_elements(chain_id)
    }

    fn execute_sql(&self, sql: &str, params: &[String], timeout: Option<Duration>) -> Result<u64> {
        self.check(Op::ExecuteSql)?;
        self.inner.execute_sql(sql, params, timeout)
    }

    fn ping(&self) -> Result<()> {
        self.check(Op::Ping)?;
        self.inner.ping()
    }
}
