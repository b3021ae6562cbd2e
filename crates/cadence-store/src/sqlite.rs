use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cadence_core::types::{
    decode_arguments, ChainConfig, ChainElement, ChainId, LogEvent, RunId, RunRecord, RunStatus,
    StepRecord, TaskId, TaskKind,
};
use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info, instrument, warn};

use crate::db::{configure, init_db};
use crate::error::{Result, StoreError};
use crate::lock::NamedLock;
use crate::store::Store;

const CHAIN_COLUMNS: &str = "chain_id, chain_name, run_at, max_instances, live, self_destruct,
                             exclusive_execution, client_name";

const TASK_COLUMNS: &str = "task_id, chain_id, task_order, task_name, kind, command, parameters,
                            ignore_error, autonomous, timeout_ms, retries, retry_interval_ms";

const RUN_COLUMNS: &str = "run_id, chain_id, client_name, status, started_at, finished_at";

/// SQLite-backed [`Store`].
///
/// Bookkeeping (run status, logs, metadata) goes through `conn`. SQL tasks run
/// on a second connection when the database is a file, so a long statement
/// never blocks admission checks or log writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    work: Option<Mutex<Connection>>,
    lock_dir: PathBuf,
    held_locks: Mutex<HashMap<String, NamedLock>>,
}

impl SqliteStore {
    /// Open (and initialise) the database at `path`; advisory lock files go to `lock_dir`.
    pub fn open(path: impl AsRef<Path>, lock_dir: impl Into<PathBuf>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        configure(&conn)?;
        init_db(&conn)?;

        let work = Connection::open(path)?;
        configure(&work)?;

        info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            work: Some(Mutex::new(work)),
            lock_dir: lock_dir.into(),
            held_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Private in-memory database, mainly for tests and dry runs.
    pub fn open_in_memory(lock_dir: impl Into<PathBuf>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            work: None,
            lock_dir: lock_dir.into(),
            held_locks: Mutex::new(HashMap::new()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".into()))
    }

    fn work_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        match &self.work {
            Some(work) => work
                .lock()
                .map_err(|_| StoreError::Unavailable("task connection mutex poisoned".into())),
            None => self.conn(),
        }
    }

    /// Give up a lock taken through [`Store::try_acquire_named_lock`].
    pub fn release_named_lock(&self, name: &str) -> bool {
        match self.held_locks.lock() {
            Ok(mut held) => held.remove(name).is_some(),
            Err(_) => false,
        }
    }

    // -----------------------------------------------------------------------
    // Configuration helpers (chain definitions are owned by external tooling)
    // -----------------------------------------------------------------------

    pub fn add_chain(&self, chain: &NewChain) -> Result<ChainId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chains
             (chain_name, run_at, max_instances, live, self_destruct,
              exclusive_execution, client_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                chain.name,
                chain.run_at,
                chain.max_instances,
                chain.live,
                chain.self_destruct,
                chain.exclusive,
                chain.client_name,
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(chain_id = id, name = %chain.name, "chain added");
        Ok(id)
    }

    /// Append an element to `chain_id`; without an explicit position it goes last.
    pub fn add_element(&self, chain_id: ChainId, element: &NewElement) -> Result<TaskId> {
        let parameters = serde_json::to_string(&element.parameters)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.conn()?;
        let position: i32 = match element.position {
            Some(p) => p,
            None => conn.query_row(
                "SELECT COALESCE(MAX(task_order), 0) + 1 FROM tasks WHERE chain_id = ?1",
                [chain_id],
                |r| r.get(0),
            )?,
        };
        conn.execute(
            "INSERT INTO tasks
             (chain_id, task_order, task_name, kind, command, parameters, ignore_error,
              autonomous, timeout_ms, retries, retry_interval_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                chain_id,
                position,
                element.name,
                element.kind.to_string(),
                element.command,
                parameters,
                element.ignore_error,
                element.autonomous,
                element.timeout_ms,
                element.retries,
                element.retry_interval_ms,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_chain_live(&self, chain_id: ChainId, live: bool) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE chains SET live = ?1 WHERE chain_id = ?2",
            rusqlite::params![live, chain_id],
        )?;
        Ok(n > 0)
    }

    pub fn chain(&self, chain_id: ChainId) -> Result<Option<ChainConfig>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {CHAIN_COLUMNS} FROM chains WHERE chain_id = ?1");
        Ok(conn.query_row(&sql, [chain_id], row_to_chain).optional()?)
    }

    // -----------------------------------------------------------------------
    // Inspection helpers
    // -----------------------------------------------------------------------

    pub fn runs_for_chain(&self, chain_id: ChainId) -> Result<Vec<RunRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {RUN_COLUMNS} FROM run_status WHERE chain_id = ?1 ORDER BY run_id");
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map([chain_id], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    /// Log events, oldest first; `None` returns events of every chain.
    pub fn log_events(&self, chain_id: Option<ChainId>) -> Result<Vec<LogEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT logged_at, level, client_name, chain_id, task_id, message
             FROM log
             WHERE ?1 IS NULL OR chain_id = ?1
             ORDER BY id",
        )?;
        let events = stmt
            .query_map([chain_id], |row| {
                Ok(LogEvent {
                    logged_at: timestamp(row, 0)?,
                    level: parsed(row, 1)?,
                    client_name: row.get(2)?,
                    chain_id: row.get(3)?,
                    task_id: row.get(4)?,
                    message: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    pub fn step_records(&self, run_id: RunId) -> Result<Vec<StepRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, chain_id, task_id, kind, command, parameters, attempts, outcome,
                    exit_code, output, started_at, finished_at
             FROM execution_log WHERE run_id = ?1 ORDER BY id",
        )?;
        let steps = stmt
            .query_map([run_id], |row| {
                Ok(StepRecord {
                    run_id: row.get(0)?,
                    chain_id: row.get(1)?,
                    task_id: row.get(2)?,
                    kind: parsed(row, 3)?,
                    command: row.get(4)?,
                    parameters: arguments(row, 5)?,
                    attempts: row.get(6)?,
                    outcome: parsed(row, 7)?,
                    exit_code: row.get(8)?,
                    output: row.get(9)?,
                    started_at: timestamp(row, 10)?,
                    finished_at: timestamp(row, 11)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }
}

impl Store for SqliteStore {
    fn try_acquire_named_lock(&self, name: &str) -> Result<bool> {
        let mut held = self
            .held_locks
            .lock()
            .map_err(|_| StoreError::Unavailable("lock registry poisoned".into()))?;
        if held.contains_key(name) {
            return Ok(true);
        }
        match NamedLock::try_acquire(&self.lock_dir, name)? {
            Some(lock) => {
                debug!(lock = %name, path = %lock.path().display(), "named lock held");
                held.insert(name.to_string(), lock);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self))]
    fn insert_run_status(
        &self,
        chain_id: ChainId,
        client_name: &str,
        at: DateTime<Utc>,
    ) -> Result<RunId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO run_status (chain_id, client_name, status, started_at)
             VALUES (?1, ?2, 'STARTED', ?3)",
            rusqlite::params![chain_id, client_name, at.to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[instrument(skip(self))]
    fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidTransition(status.to_string()));
        }
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE run_status SET status = ?1, finished_at = ?2
             WHERE run_id = ?3 AND status = 'STARTED'",
            rusqlite::params![status.as_str(), at.to_rfc3339(), run_id],
        )?;
        Ok(n > 0)
    }

    fn count_running_instances(&self, chain_id: ChainId) -> Result<u32> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT count(*) FROM run_status WHERE chain_id = ?1 AND status = 'STARTED'",
            [chain_id],
            |r| r.get(0),
        )
        .map_err(StoreError::from_query)
    }

    fn unterminated_runs(&self, client_name: &str) -> Result<Vec<RunRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM run_status
             WHERE status = 'STARTED' AND client_name = ?1
             ORDER BY run_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map([client_name], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn delete_chain_config(&self, chain_id: ChainId) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM chains WHERE chain_id = ?1", [chain_id])?;
        if n > 0 {
            info!(chain_id, "chain deleted");
        }
        Ok(n > 0)
    }

    fn insert_log_event(&self, event: &LogEvent) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO log (logged_at, level, client_name, chain_id, task_id, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                event.logged_at.to_rfc3339(),
                event.level.as_str(),
                event.client_name,
                event.chain_id,
                event.task_id,
                event.message,
            ],
        )?;
        Ok(())
    }

    fn record_step(&self, step: &StepRecord) -> Result<()> {
        let parameters = serde_json::to_string(&step.parameters)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO execution_log
             (run_id, chain_id, task_id, kind, command, parameters, attempts, outcome,
              exit_code, output, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                step.run_id,
                step.chain_id,
                step.task_id,
                step.kind.to_string(),
                step.command,
                parameters,
                step.attempts,
                step.outcome.as_str(),
                step.exit_code,
                step.output,
                step.started_at.to_rfc3339(),
                step.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn live_chains(&self, client_name: &str) -> Result<Vec<ChainConfig>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CHAIN_COLUMNS} FROM chains
             WHERE live = 1 AND (client_name IS NULL OR client_name = ?1)
             ORDER BY chain_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        // A single malformed row must not stop every other chain from running.
        let chains = stmt
            .query_map([client_name], row_to_chain)?
            .filter_map(|r| match r {
                Ok(chain) => Some(chain),
                Err(e) => {
                    warn!("skipping unreadable chain row: {e}");
                    None
                }
            })
            .collect();
        Ok(chains)
    }

    fn chain_elements(&self, chain_id: ChainId) -> Result<Vec<ChainElement>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE chain_id = ?1 ORDER BY task_order");
        let mut stmt = conn.prepare(&sql)?;
        let elements = stmt
            .query_map([chain_id], row_to_element)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(elements)
    }

    fn execute_sql(&self, sql: &str, params: &[String], timeout: Option<Duration>) -> Result<u64> {
        let mut conn = self.work_conn()?;
        if let Some(limit) = timeout {
            let deadline = Instant::now() + limit;
            conn.progress_handler(1_000, Some(move || Instant::now() >= deadline));
        }

        let result = run_in_transaction(&mut conn, sql, params);

        if timeout.is_some() {
            conn.progress_handler(0, None::<fn() -> bool>);
        }

        result.map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::OperationInterrupted => {
                StoreError::Interrupted {
                    ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
                }
            }
            other => StoreError::Database(other),
        })
    }

    fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
        Ok(())
    }
}

fn run_in_transaction(conn: &mut Connection, sql: &str, params: &[String]) -> rusqlite::Result<u64> {
    let tx = conn.transaction()?;
    let count = if params.is_empty() {
        // Multi-statement scripts are allowed when nothing needs binding.
        tx.execute_batch(sql)?;
        tx.changes() as u64
    } else {
        let mut stmt = tx.prepare(sql)?;
        let returns_rows = stmt.column_count() > 0;
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut returned = 0u64;
        while rows.next()?.is_some() {
            returned += 1;
        }
        if returns_rows {
            returned
        } else {
            tx.changes() as u64
        }
    };
    tx.commit()?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => timestamp(row, idx).map(Some),
        None => Ok(None),
    }
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn arguments(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    decode_arguments(&raw).map_err(|e| conversion_error(idx, e.to_string()))
}

fn row_to_chain(row: &Row<'_>) -> rusqlite::Result<ChainConfig> {
    Ok(ChainConfig {
        id: row.get(0)?,
        name: row.get(1)?,
        run_at: row.get(2)?,
        max_instances: row.get(3)?,
        live: row.get(4)?,
        self_destruct: row.get(5)?,
        exclusive: row.get(6)?,
        client_name: row.get(7)?,
    })
}

fn row_to_element(row: &Row<'_>) -> rusqlite::Result<ChainElement> {
    Ok(ChainElement {
        id: row.get(0)?,
        chain_id: row.get(1)?,
        position: row.get(2)?,
        name: row.get(3)?,
        kind: parsed::<TaskKind>(row, 4)?,
        command: row.get(5)?,
        parameters: arguments(row, 6)?,
        ignore_error: row.get(7)?,
        autonomous: row.get(8)?,
        timeout_ms: row.get(9)?,
        retries: row.get(10)?,
        retry_interval_ms: row.get(11)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        run_id: row.get(0)?,
        chain_id: row.get(1)?,
        client_name: row.get(2)?,
        status: parsed(row, 3)?,
        started_at: timestamp(row, 4)?,
        finished_at: optional_timestamp(row, 5)?,
    })
}

// ---------------------------------------------------------------------------
// Insert payloads
// ---------------------------------------------------------------------------

/// Definition of a chain to insert.
#[derive(Debug, Clone)]
pub struct NewChain {
    pub name: String,
    pub run_at: String,
    pub max_instances: Option<u32>,
    pub live: bool,
    pub self_destruct: bool,
    pub exclusive: bool,
    pub client_name: Option<String>,
}

impl NewChain {
    pub fn new(name: impl Into<String>, run_at: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_at: run_at.into(),
            max_instances: None,
            live: true,
            self_destruct: false,
            exclusive: false,
            client_name: None,
        }
    }
}

/// Definition of a chain element to insert.
#[derive(Debug, Clone)]
pub struct NewElement {
    pub position: Option<i32>,
    pub name: Option<String>,
    pub kind: TaskKind,
    pub command: String,
    pub parameters: Vec<String>,
    pub ignore_error: bool,
    pub autonomous: bool,
    pub timeout_ms: Option<u64>,
    pub retries: u32,
    pub retry_interval_ms: u64,
}

impl NewElement {
    pub fn new(kind: TaskKind, command: impl Into<String>) -> Self {
        Self {
            position: None,
            name: None,
            kind,
            command: command.into(),
            parameters: Vec::new(),
            ignore_error: false,
            autonomous: false,
            timeout_ms: None,
            retries: 0,
            retry_interval_ms: 0,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = args.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::{LogLevel, StepOutcome};

    fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn run_status_transitions_once() {
        let (store, _dir) = store();
        let run = store.insert_run_status(1, "node-a", Utc::now()).unwrap();

        assert!(store.update_run_status(run, RunStatus::ChainDone, Utc::now()).unwrap());
        // Already terminal: no second transition.
        assert!(!store.update_run_status(run, RunStatus::ChainFailed, Utc::now()).unwrap());

        let runs = store.runs_for_chain(1).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::ChainDone);
        assert!(runs[0].finished_at.is_some());
    }

    #[test]
    fn started_is_not_a_valid_target() {
        let (store, _dir) = store();
        let run = store.insert_run_status(1, "node-a", Utc::now()).unwrap();
        let err = store.update_run_status(run, RunStatus::Started, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
    }

    #[test]
    fn running_count_only_sees_started_rows_of_the_chain() {
        let (store, _dir) = store();
        store.insert_run_status(1, "node-a", Utc::now()).unwrap();
        store.insert_run_status(1, "node-a", Utc::now()).unwrap();
        let done = store.insert_run_status(1, "node-a", Utc::now()).unwrap();
        store.update_run_status(done, RunStatus::ChainDone, Utc::now()).unwrap();
        store.insert_run_status(2, "node-a", Utc::now()).unwrap();

        assert_eq!(store.count_running_instances(1).unwrap(), 2);
        assert_eq!(store.count_running_instances(3).unwrap(), 0);
    }

    #[test]
    fn unterminated_runs_are_scoped_to_client() {
        let (store, _dir) = store();
        store.insert_run_status(1, "node-a", Utc::now()).unwrap();
        store.insert_run_status(1, "node-b", Utc::now()).unwrap();

        let mine = store.unterminated_runs("node-a").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].client_name, "node-a");
    }

    #[test]
    fn elements_come_back_in_order_with_arguments() {
        let (store, _dir) = store();
        let chain = store.add_chain(&NewChain::new("etl", "0 * * * *")).unwrap();

        let mut late = NewElement::new(TaskKind::Shell, "echo").args(["second"]);
        late.position = Some(20);
        store.add_element(chain, &late).unwrap();

        let mut early = NewElement::new(TaskKind::Shell, "printf").args(["%s\n", "a b; c"]);
        early.position = Some(10);
        early.retries = 2;
        store.add_element(chain, &early).unwrap();

        let elements = store.chain_elements(chain).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].command, "printf");
        assert_eq!(elements[0].parameters, vec!["%s\n", "a b; c"]);
        assert_eq!(elements[0].retries, 2);
        assert_eq!(elements[1].command, "echo");
    }

    #[test]
    fn positions_default_to_append() {
        let (store, _dir) = store();
        let chain = store.add_chain(&NewChain::new("etl", "@every 1 minute")).unwrap();
        store.add_element(chain, &NewElement::new(TaskKind::Builtin, "NoOp")).unwrap();
        store.add_element(chain, &NewElement::new(TaskKind::Builtin, "Log")).unwrap();

        let elements = store.chain_elements(chain).unwrap();
        assert_eq!(elements[0].position, 1);
        assert_eq!(elements[1].position, 2);
    }

    #[test]
    fn live_chains_respect_flag_and_client() {
        let (store, _dir) = store();
        let shared = store.add_chain(&NewChain::new("shared", "* * * * *")).unwrap();

        let mut mine = NewChain::new("mine", "* * * * *");
        mine.client_name = Some("node-a".into());
        let mine = store.add_chain(&mine).unwrap();

        let mut theirs = NewChain::new("theirs", "* * * * *");
        theirs.client_name = Some("node-b".into());
        store.add_chain(&theirs).unwrap();

        let paused = store.add_chain(&NewChain::new("paused", "* * * * *")).unwrap();
        store.set_chain_live(paused, false).unwrap();

        let ids: Vec<_> = store
            .live_chains("node-a")
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![shared, mine]);
    }

    #[test]
    fn delete_chain_removes_elements() {
        let (store, _dir) = store();
        let chain = store.add_chain(&NewChain::new("once", "@reboot")).unwrap();
        store.add_element(chain, &NewElement::new(TaskKind::Builtin, "NoOp")).unwrap();

        assert!(store.delete_chain_config(chain).unwrap());
        assert!(store.chain(chain).unwrap().is_none());
        assert!(store.chain_elements(chain).unwrap().is_empty());
        assert!(!store.delete_chain_config(chain).unwrap());
    }

    #[test]
    fn log_events_filter_by_chain() {
        let (store, _dir) = store();
        store
            .insert_log_event(&LogEvent::new(LogLevel::Warn, "node-a", "retrying").chain(4).task(9))
            .unwrap();
        store
            .insert_log_event(&LogEvent::new(LogLevel::Info, "node-a", "startup"))
            .unwrap();

        let chain_events = store.log_events(Some(4)).unwrap();
        assert_eq!(chain_events.len(), 1);
        assert_eq!(chain_events[0].level, LogLevel::Warn);
        assert_eq!(chain_events[0].task_id, Some(9));
        assert_eq!(store.log_events(None).unwrap().len(), 2);
    }

    #[test]
    fn step_records_round_trip() {
        let (store, _dir) = store();
        let now = Utc::now();
        store
            .record_step(&StepRecord {
                run_id: 5,
                chain_id: 1,
                task_id: 2,
                kind: TaskKind::Shell,
                command: "false".into(),
                parameters: vec![],
                attempts: 3,
                outcome: StepOutcome::Failed,
                exit_code: Some(1),
                output: String::new(),
                started_at: now,
                finished_at: now,
            })
            .unwrap();

        let steps = store.step_records(5).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].outcome, StepOutcome::Failed);
        assert_eq!(steps[0].attempts, 3);
        assert_eq!(steps[0].exit_code, Some(1));
    }

    #[test]
    fn execute_sql_binds_parameters() {
        let (store, _dir) = store();
        store
            .execute_sql("CREATE TABLE audit (note TEXT)", &[], None)
            .unwrap();
        let changed = store
            .execute_sql(
                "INSERT INTO audit (note) VALUES (?1)",
                &["'); DROP TABLE audit; --".to_string()],
                None,
            )
            .unwrap();
        assert_eq!(changed, 1);
        let count = store
            .execute_sql("DELETE FROM audit", &[], None)
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn bound_query_counts_returned_rows() {
        let (store, _dir) = store();
        assert_eq!(store.execute_sql("SELECT ?1", &["x".to_string()], None).unwrap(), 1);

        store
            .execute_sql("CREATE TABLE jobs (id INTEGER, owner TEXT)", &[], None)
            .unwrap();
        store
            .execute_sql("INSERT INTO jobs VALUES (1, 'a'), (2, 'a'), (3, 'b')", &[], None)
            .unwrap();
        let rows = store
            .execute_sql("SELECT id FROM jobs WHERE owner = ?1", &["a".to_string()], None)
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn failing_sql_rolls_back() {
        let (store, _dir) = store();
        store.execute_sql("CREATE TABLE t (x INTEGER)", &[], None).unwrap();
        let res = store.execute_sql("INSERT INTO t VALUES (1); SELECT * FROM missing;", &[], None);
        assert!(matches!(res, Err(StoreError::Database(_))));
        assert_eq!(store.execute_sql("DELETE FROM t", &[], None).unwrap(), 0);
    }

    #[test]
    fn long_statement_is_interrupted() {
        let (store, _dir) = store();
        let res = store.execute_sql(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 100000000000)
             SELECT count(*) FROM c;",
            &[],
            Some(Duration::from_millis(50)),
        );
        assert!(matches!(res, Err(StoreError::Interrupted { ms: 50 })));
        // Handler is cleared afterwards.
        store.execute_sql("CREATE TABLE after_timeout (x)", &[], None).unwrap();
    }

    #[test]
    fn named_lock_is_reentrant_but_exclusive_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let a = SqliteStore::open_in_memory(dir.path()).unwrap();
        let b = SqliteStore::open_in_memory(dir.path()).unwrap();

        assert!(a.try_acquire_named_lock("node-a").unwrap());
        assert!(a.try_acquire_named_lock("node-a").unwrap());
        assert!(!b.try_acquire_named_lock("node-a").unwrap());

        assert!(a.release_named_lock("node-a"));
        assert!(b.try_acquire_named_lock("node-a").unwrap());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cadence.db");
        {
            let store = SqliteStore::open(&path, dir.path()).unwrap();
            store.add_chain(&NewChain::new("nightly", "0 3 * * *")).unwrap();
            store.ping().unwrap();
        }
        let store = SqliteStore::open(&path, dir.path()).unwrap();
        assert_eq!(store.live_chains("anyone").unwrap().len(), 1);
    }
}
