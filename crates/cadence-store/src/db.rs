use rusqlite::Connection;

use crate::error::Result;

/// Initialise the Cadence schema in `conn`.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_chains_table(conn)?;
    create_tasks_table(conn)?;
    create_run_status_table(conn)?;
    create_execution_log_table(conn)?;
    create_log_table(conn)?;
    Ok(())
}

/// Connection-level pragmas. WAL lets the health probe and admission checks
/// read while a SQL task holds a write transaction.
pub(crate) fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

fn create_chains_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chains (
            chain_id            INTEGER PRIMARY KEY AUTOINCREMENT,
            chain_name          TEXT    NOT NULL UNIQUE,
            run_at              TEXT    NOT NULL,   -- cron, @every or @reboot
            max_instances       INTEGER,            -- NULL means unlimited
            live                INTEGER NOT NULL DEFAULT 1,
            self_destruct       INTEGER NOT NULL DEFAULT 0,
            exclusive_execution INTEGER NOT NULL DEFAULT 0,
            client_name         TEXT                -- NULL: any scheduler
        ) STRICT;",
    )?;
    Ok(())
}

fn create_tasks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            task_id           INTEGER PRIMARY KEY AUTOINCREMENT,
            chain_id          INTEGER NOT NULL
                              REFERENCES chains(chain_id) ON DELETE CASCADE,
            task_order        INTEGER NOT NULL,
            task_name         TEXT,
            kind              TEXT    NOT NULL
                              CHECK (kind IN ('SQL', 'SHELL', 'BUILTIN')),
            command           TEXT    NOT NULL,
            parameters        TEXT    NOT NULL DEFAULT '[]',  -- JSON array of strings
            ignore_error      INTEGER NOT NULL DEFAULT 0,
            autonomous        INTEGER NOT NULL DEFAULT 0,
            timeout_ms        INTEGER,
            retries           INTEGER NOT NULL DEFAULT 0,
            retry_interval_ms INTEGER NOT NULL DEFAULT 0,
            UNIQUE (chain_id, task_order)
        ) STRICT;",
    )?;
    Ok(())
}

/// No foreign key to `chains`: run history outlives self-destructed chains.
fn create_run_status_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS run_status (
            run_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            chain_id    INTEGER NOT NULL,
            client_name TEXT    NOT NULL,
            status      TEXT    NOT NULL
                        CHECK (status IN ('STARTED', 'CHAIN_DONE', 'CHAIN_FAILED')),
            started_at  TEXT    NOT NULL,
            finished_at TEXT
        ) STRICT;

        -- Admission: SELECT count(*) … WHERE chain_id = ? AND status = 'STARTED'
        CREATE INDEX IF NOT EXISTS idx_run_status_chain
            ON run_status (chain_id, status);",
    )?;
    Ok(())
}

fn create_execution_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS execution_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id      INTEGER NOT NULL,
            chain_id    INTEGER NOT NULL,
            task_id     INTEGER NOT NULL,
            kind        TEXT    NOT NULL,
            command     TEXT    NOT NULL,
            parameters  TEXT    NOT NULL,
            attempts    INTEGER NOT NULL,
            outcome     TEXT    NOT NULL,
            exit_code   INTEGER,
            output      TEXT    NOT NULL,
            started_at  TEXT    NOT NULL,
            finished_at TEXT    NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_execution_log_run
            ON execution_log (run_id);",
    )?;
    Ok(())
}

fn create_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            logged_at   TEXT    NOT NULL,
            level       TEXT    NOT NULL,
            client_name TEXT    NOT NULL,
            chain_id    INTEGER,
            task_id     INTEGER,
            message     TEXT    NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_log_chain
            ON log (chain_id, logged_at);",
    )?;
    Ok(())
}
