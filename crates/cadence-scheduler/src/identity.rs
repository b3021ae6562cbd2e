//! Scheduler identity and liveness.
//!
//! Only the process holding the named lock for its client name may schedule
//! chains. The lock is owned by the store handle and released by the OS when
//! the process exits, so a crashed scheduler never blocks its successor.

use cadence_store::Store;
use tracing::{debug, info, warn};

/// Lock name used for the scheduler identity of `client_name`.
pub fn identity_lock_name(client_name: &str) -> String {
    format!("cadence-{client_name}")
}

/// Try once to become the active scheduler for `client_name`.
///
/// Never blocks and never retries. Contention and store errors both return
/// `false`; the caller decides whether to wait or give up.
pub fn try_acquire_identity(store: &dyn Store, client_name: &str) -> bool {
    match store.try_acquire_named_lock(&identity_lock_name(client_name)) {
        Ok(true) => {
            info!(client = %client_name, "scheduler identity acquired");
            true
        }
        Ok(false) => {
            debug!(client = %client_name, "scheduler identity is held by another process");
            false
        }
        Err(e) => {
            warn!(client = %client_name, "cannot acquire scheduler identity: {e}");
            false
        }
    }
}

/// Connectivity probe for health checks. `false` when no store is attached.
pub fn is_alive(store: Option<&dyn Store>) -> bool {
    match store {
        Some(store) => match store.ping() {
            Ok(()) => true,
            Err(e) => {
                debug!("store ping failed: {e}");
                false
            }
        },
        None => false,
    }
}
