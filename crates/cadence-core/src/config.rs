use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CLIENT_NAME: &str = "cadence";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_STANDBY_RETRY_SECS: u64 = 5;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024; // per stream, head + tail kept
pub const DEFAULT_HTTP_PORT: u16 = 8008;
pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1";

/// Top-level config (cadence.toml + CADENCE_* env overrides).
///
/// Built once at startup and never mutated afterwards; components receive the
/// pieces they need at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Names this scheduler instance. Only one live process may hold it.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Directory for advisory lock files. Defaults to the database directory.
    pub lock_dir: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            lock_dir: None,
        }
    }
}

impl DatabaseConfig {
    pub fn effective_lock_dir(&self) -> String {
        if let Some(dir) = &self.lock_dir {
            return dir.clone();
        }
        std::path::Path::new(&self.path)
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or(".")
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the tick loop looks for due chains.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wait between identity acquisition attempts while in standby.
    #[serde(default = "default_standby_retry_secs")]
    pub standby_retry_secs: u64,
    /// Exit instead of waiting when another process holds the identity.
    #[serde(default)]
    pub exit_on_contention: bool,
    /// Cap on captured bytes per output stream of a shell task.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Applied to elements that carry no timeout of their own.
    pub default_task_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            standby_retry_secs: DEFAULT_STANDBY_RETRY_SECS,
            exit_on_contention: false,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            default_task_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Raises the tracing filter to debug and persists DEBUG log events.
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_http_bind")]
    pub bind: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_http_bind(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_standby_retry_secs() -> u64 {
    DEFAULT_STANDBY_RETRY_SECS
}
fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}
fn default_http_bind() -> String {
    DEFAULT_HTTP_BIND.to_string()
}
fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.db", home)
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.cadence/cadence.toml
    ///
    /// A missing file is not an error; defaults fill every gap. Nested keys
    /// use a double underscore in the environment, e.g.
    /// `CADENCE_SCHEDULER__POLL_INTERVAL_SECS=10`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CadenceError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(CadenceConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CADENCE_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}
