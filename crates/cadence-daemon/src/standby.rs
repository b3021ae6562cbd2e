//! Store bootstrap and identity standby.
//!
//! Neither the store nor the identity lock is required to be available at
//! startup. The daemon keeps retrying both every `standby_retry_secs` until
//! shutdown, unless told to give up on contention.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::config::CadenceConfig;
use cadence_scheduler::identity::try_acquire_identity;
use cadence_scheduler::SchedulerContext;
use cadence_store::SqliteStore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standby {
    /// This process is now the active scheduler.
    Acquired,
    /// Another process holds the identity and waiting is disabled.
    Contended,
    /// Shutdown was requested while waiting.
    Shutdown,
}

/// Open the configured database, retrying until it works or shutdown.
pub async fn open_store(
    config: &CadenceConfig,
    retry: Duration,
    shutdown: &CancellationToken,
) -> Option<Arc<SqliteStore>> {
    let path = config.database.path.as_str();
    let lock_dir = config.database.effective_lock_dir();
    loop {
        ensure_parent_dir(path);
        if let Err(e) = std::fs::create_dir_all(&lock_dir) {
            warn!(dir = %lock_dir, "cannot create lock directory: {e}");
        }
        match SqliteStore::open(path, &lock_dir) {
            Ok(store) => return Some(Arc::new(store)),
            Err(e) => warn!(%path, "cannot open store, retrying in {}s: {e}", retry.as_secs()),
        }
        if !wait(retry, shutdown).await {
            return None;
        }
    }
}

/// Take the scheduler identity, standing by while another process holds it.
pub async fn acquire_identity(
    ctx: &SchedulerContext,
    retry: Duration,
    exit_on_contention: bool,
    shutdown: &CancellationToken,
) -> Standby {
    let mut announced = false;
    loop {
        if shutdown.is_cancelled() {
            return Standby::Shutdown;
        }
        if try_acquire_identity(ctx.store.as_ref(), &ctx.client_name) {
            return Standby::Acquired;
        }
        if exit_on_contention {
            return Standby::Contended;
        }
        if !announced {
            info!(client = %ctx.client_name, "another scheduler is active, standing by");
            announced = true;
        }
        if !wait(retry, shutdown).await {
            return Standby::Shutdown;
        }
    }
}

async fn wait(retry: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(retry) => true,
        _ = shutdown.cancelled() => false,
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
