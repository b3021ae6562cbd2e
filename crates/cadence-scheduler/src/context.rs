use std::sync::Arc;
use std::time::Duration;

use cadence_core::config::{CadenceConfig, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_POLL_INTERVAL_SECS};
use cadence_store::Store;

use crate::journal::Journal;

/// Everything a scheduler component needs, built once at startup.
///
/// Cloning is cheap (the store is shared); nothing in here changes after
/// construction.
#[derive(Clone)]
pub struct SchedulerContext {
    pub store: Arc<dyn Store>,
    pub client_name: String,
    /// Persist DEBUG log events as well.
    pub verbose: bool,
    /// Timeout for elements that do not set their own.
    pub default_task_timeout: Option<Duration>,
    pub max_output_bytes: usize,
    /// How often the tick loop reloads chain definitions.
    pub poll_interval: Duration,
}

impl SchedulerContext {
    pub fn new(store: Arc<dyn Store>, client_name: impl Into<String>) -> Self {
        Self {
            store,
            client_name: client_name.into(),
            verbose: false,
            default_task_timeout: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    pub fn from_config(store: Arc<dyn Store>, config: &CadenceConfig) -> Self {
        Self {
            store,
            client_name: config.client_name.clone(),
            verbose: config.logging.verbose,
            default_task_timeout: config
                .scheduler
                .default_task_timeout_secs
                .map(Duration::from_secs),
            max_output_bytes: config.scheduler.max_output_bytes,
            poll_interval: Duration::from_secs(config.scheduler.poll_interval_secs.max(1)),
        }
    }

    pub fn journal(&self) -> Journal {
        Journal::new(self.store.clone(), self.client_name.clone(), self.verbose)
    }
}

impl std::fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("client_name", &self.client_name)
            .field("verbose", &self.verbose)
            .field("default_task_timeout", &self.default_task_timeout)
            .field("max_output_bytes", &self.max_output_bytes)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
