use clap::Parser;

use cadence_core::config::CadenceConfig;

/// Command-line flags of the `cadence` scheduler. Anything given here wins
/// over the config file and `CADENCE_*` environment variables.
#[derive(Parser, Debug, Default)]
#[command(name = "cadence", version = crate::VERSION, about = "Database-resident job scheduler")]
pub struct Cli {
    /// Config file (defaults to $CADENCE_CONFIG, then ~/.cadence/cadence.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Scheduler identity; only one live process may hold it
    #[arg(long)]
    pub client_name: Option<String>,

    /// SQLite database file
    #[arg(long = "db")]
    pub database: Option<String>,

    /// Debug logging, and persist DEBUG log events
    #[arg(short, long)]
    pub verbose: bool,

    /// Seconds between chain definition reloads
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

impl Cli {
    /// Config path to load: `--config`, else `$CADENCE_CONFIG`.
    pub fn config_path(&self) -> Option<String> {
        self.config
            .clone()
            .or_else(|| std::env::var("CADENCE_CONFIG").ok())
    }

    pub fn apply(&self, config: &mut CadenceConfig) {
        if let Some(name) = &self.client_name {
            config.client_name = name.clone();
        }
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if self.verbose {
            config.logging.verbose = true;
        }
        if let Some(secs) = self.poll_interval {
            config.scheduler.poll_interval_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "cadence",
            "--client-name",
            "etl",
            "--db",
            "/var/lib/cadence/jobs.db",
            "-v",
            "--poll-interval",
            "15",
        ]);
        let mut config = CadenceConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.client_name, "etl");
        assert_eq!(config.database.path, "/var/lib/cadence/jobs.db");
        assert!(config.logging.verbose);
        assert_eq!(config.scheduler.poll_interval_secs, 15);
    }

    #[test]
    fn absent_flags_keep_config() {
        let cli = Cli::parse_from(["cadence"]);
        let mut config = CadenceConfig::default();
        config.client_name = "from-file".into();
        cli.apply(&mut config);
        assert_eq!(config.client_name, "from-file");
        assert!(!config.logging.verbose);
    }
}
