//! `cadence-test-task`: run a shell task definition once and print its exit code.
//!
//! ```text
//! cadence-test-task --cmd ls --arg '["-la", "/tmp"]'
//! cadence-test-task --cmd psql --arg "-c 'select 1'" --raw
//! ```

use std::time::Duration;

use cadence_daemon::diagnostic::{run, task_arguments};
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "cadence-test-task",
    version = cadence_daemon::VERSION,
    about = "Dry-run a shell task outside of a chain"
)]
struct Args {
    /// Program to execute
    #[arg(long)]
    cmd: String,

    /// Arguments as a JSON array of strings
    #[arg(long, allow_hyphen_values = true)]
    arg: Option<String>,

    /// Pass --arg through as one opaque argument instead of decoding it
    #[arg(long)]
    raw: bool,

    /// Kill the command after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let argv = task_arguments(args.arg.as_deref(), args.raw)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        }
    });

    let (code, err) = run(&args.cmd, &argv, args.timeout_secs.map(Duration::from_secs), &cancel).await;
    if let Some(e) = err {
        eprintln!("Error: {e}");
    }
    println!("Exit code: {code}");
    Ok(())
}
