use cadence_store::StoreError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Chain execution itself never returns these: failures inside a run are
/// recorded as log events and folded into the run's terminal status.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The chain's `run_at` expression could not be parsed.
    #[error("invalid schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
