use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Primary key of a chain definition.
pub type ChainId = i64;

/// Primary key of a chain element (task).
pub type TaskId = i64;

/// Primary key of a `run_status` row.
pub type RunId = i64;

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// What kind of work a chain element performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    /// A statement or script executed against the store.
    Sql,
    /// An external program launched without an intermediate shell.
    Shell,
    /// One of the in-process procedures registered at startup.
    Builtin,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Sql => "SQL",
            TaskKind::Shell => "SHELL",
            TaskKind::Builtin => "BUILTIN",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SQL" => Ok(TaskKind::Sql),
            "SHELL" => Ok(TaskKind::Shell),
            "BUILTIN" => Ok(TaskKind::Builtin),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Persisted state of one chain run.
///
/// `Started` moves exactly once to either terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Started,
    ChainDone,
    ChainFailed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Started)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "STARTED",
            RunStatus::ChainDone => "CHAIN_DONE",
            RunStatus::ChainFailed => "CHAIN_FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(RunStatus::Started),
            "CHAIN_DONE" => Ok(RunStatus::ChainDone),
            "CHAIN_FAILED" => Ok(RunStatus::ChainFailed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// LogLevel
// ---------------------------------------------------------------------------

/// Severity of a persisted [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Notice => "NOTICE",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "NOTICE" => Ok(LogLevel::Notice),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Chain definitions
// ---------------------------------------------------------------------------

/// A schedulable chain. Read-only to the scheduler apart from self-destruct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub id: ChainId,
    pub name: String,
    /// Cron expression, `@every <n> <unit>` or `@reboot`.
    pub run_at: String,
    /// `None` means unlimited concurrent runs.
    pub max_instances: Option<u32>,
    /// Disabled chains are never scheduled.
    pub live: bool,
    /// Delete the chain after its first failed run.
    pub self_destruct: bool,
    /// Run only while no other chain is running in this process.
    pub exclusive: bool,
    /// When set, only the scheduler with this client name picks the chain up.
    pub client_name: Option<String>,
}

/// One ordered step of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainElement {
    pub id: TaskId,
    pub chain_id: ChainId,
    /// Ordinal position inside the chain; lower runs first.
    pub position: i32,
    pub name: Option<String>,
    pub kind: TaskKind,
    /// SQL body, program path or builtin name depending on `kind`.
    pub command: String,
    /// Argument vector (shell), bind values (SQL) or builtin arguments.
    pub parameters: Vec<String>,
    pub ignore_error: bool,
    pub autonomous: bool,
    pub timeout_ms: Option<u64>,
    pub retries: u32,
    pub retry_interval_ms: u64,
}

impl ChainElement {
    /// Label used in logs: the element name when present, otherwise the command.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Total attempts allowed: the first one plus every retry.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Runtime view of a [`ChainElement`] for a single attempt within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainElementExecution {
    pub run_id: RunId,
    pub chain_id: ChainId,
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub command: String,
    /// Parameters actually handed to the runner.
    pub parameters: Vec<String>,
    /// Effective timeout: the element's own or the scheduler default.
    pub timeout: Option<Duration>,
    /// 1-based attempt counter.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ChainElementExecution {
    pub fn new(run_id: RunId, element: &ChainElement, default_timeout: Option<Duration>) -> Self {
        Self {
            run_id,
            chain_id: element.chain_id,
            task_id: element.id,
            kind: element.kind,
            command: element.command.clone(),
            parameters: element.parameters.clone(),
            timeout: element
                .timeout_ms
                .map(Duration::from_millis)
                .or(default_timeout),
            attempt: 1,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Wall time of the step so far (or in total once finished).
    pub fn elapsed(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// A `run_status` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub chain_id: ChainId,
    pub client_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub logged_at: DateTime<Utc>,
    pub level: LogLevel,
    pub client_name: String,
    pub chain_id: Option<ChainId>,
    pub task_id: Option<TaskId>,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, client_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            logged_at: Utc::now(),
            level,
            client_name: client_name.into(),
            chain_id: None,
            task_id: None,
            message: message.into(),
        }
    }

    pub fn chain(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// How a chain element ended within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// Failed, but the element has `ignore_error` set.
    IgnoredFailure,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Succeeded => "succeeded",
            StepOutcome::Failed => "failed",
            StepOutcome::IgnoredFailure => "ignored_failure",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(StepOutcome::Succeeded),
            "failed" => Ok(StepOutcome::Failed),
            "ignored_failure" => Ok(StepOutcome::IgnoredFailure),
            other => Err(format!("unknown step outcome: {other}")),
        }
    }
}

/// The single terminal write produced by every chain element execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: RunId,
    pub chain_id: ChainId,
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub command: String,
    pub parameters: Vec<String>,
    pub attempts: u32,
    pub outcome: StepOutcome,
    /// `None` when the runner failed before producing an exit code.
    pub exit_code: Option<i32>,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Decode a JSON array of strings into an argument vector.
///
/// Used for the `parameters` column and for the diagnostic `--arg` flag.
/// Non-string scalars are accepted and rendered with their JSON text
/// (`3` becomes `"3"`), objects and nested arrays are rejected.
pub fn decode_arguments(json: &str) -> Result<Vec<String>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    values
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            other => Err(crate::error::CadenceError::Config(format!(
                "argument must be a string or scalar, got {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element() -> ChainElement {
        ChainElement {
            id: 7,
            chain_id: 3,
            position: 1,
            name: None,
            kind: TaskKind::Shell,
            command: "echo".into(),
            parameters: vec!["hi".into()],
            ignore_error: false,
            autonomous: false,
            timeout_ms: None,
            retries: 2,
            retry_interval_ms: 500,
        }
    }

    #[test]
    fn run_status_text_matches_store_values() {
        assert_eq!(RunStatus::ChainFailed.to_string(), "CHAIN_FAILED");
        assert_eq!("CHAIN_DONE".parse::<RunStatus>(), Ok(RunStatus::ChainDone));
        assert!("DEAD".parse::<RunStatus>().is_err());
        assert!(!RunStatus::Started.is_terminal());
        assert!(RunStatus::ChainDone.is_terminal());
    }

    #[test]
    fn task_kind_serializes_uppercase() {
        let json = serde_json::to_string(&TaskKind::Builtin).unwrap();
        assert_eq!(json, "\"BUILTIN\"");
        assert_eq!("SHELL".parse::<TaskKind>(), Ok(TaskKind::Shell));
    }

    #[test]
    fn attempts_include_first_try() {
        let el = element();
        assert_eq!(el.max_attempts(), 3);
        assert_eq!(el.retry_interval(), Duration::from_millis(500));
        assert_eq!(el.label(), "echo");
    }

    #[test]
    fn execution_prefers_element_timeout() {
        let mut el = element();
        let default = Some(Duration::from_secs(30));
        assert_eq!(ChainElementExecution::new(1, &el, default).timeout, default);

        el.timeout_ms = Some(250);
        let exec = ChainElementExecution::new(1, &el, default);
        assert_eq!(exec.timeout, Some(Duration::from_millis(250)));
        assert_eq!(exec.parameters, vec!["hi".to_string()]);
        assert_eq!(exec.attempt, 1);
    }

    #[test]
    fn decode_arguments_keeps_each_value_separate() {
        let args =
            decode_arguments(r#"["-x", "::Latin; ::Latin-ASCII;", "-o", "out.txt", 3]"#).unwrap();
        assert_eq!(args.len(), 5);
        assert_eq!(args[1], "::Latin; ::Latin-ASCII;");
        assert_eq!(args[4], "3");
    }

    #[test]
    fn decode_arguments_rejects_non_arrays() {
        assert!(decode_arguments(r#""-x""#).is_err());
        assert!(decode_arguments(r#"[{"a": 1}]"#).is_err());
    }
}
