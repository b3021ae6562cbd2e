//! Durable log events.
//!
//! Every event goes to `tracing` at the matching level and to the store's
//! `log` table. DEBUG events are only persisted in verbose mode. A failed
//! write is reported through `tracing` and otherwise swallowed.

use std::sync::Arc;

use cadence_core::types::{ChainId, LogEvent, LogLevel, TaskId};
use cadence_store::Store;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct Journal {
    store: Arc<dyn Store>,
    client_name: String,
    verbose: bool,
}

impl Journal {
    pub fn new(store: Arc<dyn Store>, client_name: impl Into<String>, verbose: bool) -> Self {
        Self {
            store,
            client_name: client_name.into(),
            verbose,
        }
    }

    /// Emit an event tagged with this scheduler's client name.
    ///
    /// Returns `true` if the event was persisted.
    pub fn log(
        &self,
        level: LogLevel,
        chain_id: Option<ChainId>,
        task_id: Option<TaskId>,
        message: impl Into<String>,
    ) -> bool {
        let mut event = LogEvent::new(level, self.client_name.as_str(), message);
        event.chain_id = chain_id;
        event.task_id = task_id;
        self.record(&event)
    }

    pub fn record(&self, event: &LogEvent) -> bool {
        mirror(event);
        if event.level == LogLevel::Debug && !self.verbose {
            return false;
        }
        match self.store.insert_log_event(event) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    chain_id = ?event.chain_id,
                    task_id = ?event.task_id,
                    "failed to persist log event ({}): {e}",
                    event.message
                );
                false
            }
        }
    }

    pub fn debug(&self, chain_id: Option<ChainId>, message: impl Into<String>) -> bool {
        self.log(LogLevel::Debug, chain_id, None, message)
    }

    pub fn info(&self, chain_id: Option<ChainId>, message: impl Into<String>) -> bool {
        self.log(LogLevel::Info, chain_id, None, message)
    }

    pub fn error(&self, chain_id: Option<ChainId>, message: impl Into<String>) -> bool {
        self.log(LogLevel::Error, chain_id, None, message)
    }
}

fn mirror(event: &LogEvent) {
    let chain_id = event.chain_id;
    let task_id = event.task_id;
    let msg = event.message.as_str();
    match event.level {
        LogLevel::Debug => debug!(?chain_id, ?task_id, "{msg}"),
        LogLevel::Info | LogLevel::Notice => info!(?chain_id, ?task_id, "{msg}"),
        LogLevel::Warn => warn!(?chain_id, ?task_id, "{msg}"),
        LogLevel::Error => error!(?chain_id, ?task_id, "{msg}"),
    }
}
