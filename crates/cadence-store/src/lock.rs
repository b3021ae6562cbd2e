//! Named, non-blocking advisory locks backed by SQLite sidecar files.
//!
//! Each lock name maps to `<dir>/<name>.lock`, a tiny SQLite database opened in
//! `EXCLUSIVE` locking mode. After the first write the connection keeps the
//! file lock until it is closed, so the lock lives exactly as long as the
//! [`NamedLock`] value, and the operating system drops it if the process dies.
//! A second opener (in this process or another) gets `SQLITE_BUSY` straight
//! away because the busy timeout is zero.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, ErrorCode};
use tracing::debug;

use crate::error::{Result, StoreError};

/// A held advisory lock. Dropping it releases the lock.
pub struct NamedLock {
    name: String,
    path: PathBuf,
    _conn: Connection,
}

impl NamedLock {
    /// Try to take the lock called `name` inside `dir`.
    ///
    /// Returns `Ok(None)` when somebody else holds it; errors only for
    /// problems unrelated to contention (unwritable directory, corrupt file).
    pub fn try_acquire(dir: &Path, name: &str) -> Result<Option<Self>> {
        let path = dir.join(format!("{}.lock", sanitize(name)));
        let lock_err = |e: rusqlite::Error| StoreError::Lock {
            name: name.to_string(),
            reason: e.to_string(),
        };

        let conn = Connection::open(&path).map_err(lock_err)?;
        conn.busy_timeout(Duration::ZERO).map_err(lock_err)?;

        let claimed = conn.execute_batch(
            "PRAGMA locking_mode=EXCLUSIVE;
             BEGIN EXCLUSIVE;
             CREATE TABLE IF NOT EXISTS holder (
                 id          INTEGER PRIMARY KEY CHECK (id = 1),
                 pid         INTEGER NOT NULL,
                 acquired_at TEXT    NOT NULL
             );",
        );
        match claimed {
            Ok(()) => {}
            Err(e) if is_contention(&e) => {
                debug!(lock = %name, path = %path.display(), "advisory lock is held elsewhere");
                return Ok(None);
            }
            Err(e) => return Err(lock_err(e)),
        }

        conn.execute(
            "INSERT OR REPLACE INTO holder (id, pid, acquired_at) VALUES (1, ?1, ?2)",
            rusqlite::params![std::process::id(), Utc::now().to_rfc3339()],
        )
        .map_err(lock_err)?;
        conn.execute_batch("COMMIT;").map_err(lock_err)?;

        debug!(lock = %name, path = %path.display(), "advisory lock acquired");
        Ok(Some(Self {
            name: name.to_string(),
            path,
            _conn: conn,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contention(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Map a client name onto a safe file stem.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = NamedLock::try_acquire(dir.path(), "worker-a").unwrap();
        assert!(first.is_some());

        let second = NamedLock::try_acquire(dir.path(), "worker-a").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn dropping_releases_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let first = NamedLock::try_acquire(dir.path(), "worker-a").unwrap();
        drop(first);

        let again = NamedLock::try_acquire(dir.path(), "worker-a").unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn names_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let a = NamedLock::try_acquire(dir.path(), "worker-a").unwrap();
        let b = NamedLock::try_acquire(dir.path(), "worker-b").unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }

    #[test]
    fn unusable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does/not/exist");
        assert!(NamedLock::try_acquire(&missing, "x").is_err());
    }

    #[test]
    fn sanitize_strips_path_separators() {
        assert_eq!(sanitize("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize("nightly etl"), "nightly_etl");
        assert_eq!(sanitize(""), "default");
        assert_eq!(sanitize(".."), "default");
    }
}
