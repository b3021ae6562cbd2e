//! Dry-run of a shell task definition outside any chain.

use std::time::Duration;

use cadence_core::types::decode_arguments;
use cadence_shell::{execute_shell_command, ShellError, ShellOptions};
use tokio_util::sync::CancellationToken;

/// Build the argument vector the way a SHELL element would receive it.
///
/// `arg` is a JSON array (`'["-la", "/tmp"]'`); with `raw` it is passed
/// through untouched as a single argument. No argument yields an empty
/// vector.
pub fn task_arguments(arg: Option<&str>, raw: bool) -> anyhow::Result<Vec<String>> {
    match arg {
        None => Ok(Vec::new()),
        Some(text) if raw => Ok(vec![text.to_string()]),
        Some(text) if text.trim().is_empty() => Ok(Vec::new()),
        Some(text) => decode_arguments(text)
            .map_err(|e| anyhow::anyhow!("--arg must be a JSON array of strings: {e}")),
    }
}

/// Run `command` and return the exit code to report, plus any transport error.
pub async fn run(
    command: &str,
    args: &[String],
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> (i32, Option<ShellError>) {
    let options = ShellOptions {
        timeout,
        ..ShellOptions::default()
    };
    match execute_shell_command(command, args, &options, cancel).await {
        Ok(out) => {
            if !out.stdout.is_empty() {
                print!("{}", out.stdout);
            }
            if !out.stderr.is_empty() {
                eprint!("{}", out.stderr);
            }
            (out.exit_code, None)
        }
        Err(e) => (e.exit_code(), Some(e)),
    }
}
