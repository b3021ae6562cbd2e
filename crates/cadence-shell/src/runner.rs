//! Subprocess execution with timeout, cancellation and bounded capture.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capture::{CapturedOutput, OutputCapture, DEFAULT_MAX_BYTES};
use crate::error::{Result, ShellError};

/// Exit code reported when the program could not be started.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;
/// Exit code reported when the program was killed at its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = -2;
/// Exit code reported when the program was killed by cancellation.
pub const CANCELLED_EXIT_CODE: i32 = -3;

/// How long to keep draining pipes after the child exited. A grandchild that
/// inherited stdout can otherwise keep the reader open forever.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Knobs for a single command execution.
#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// Kill the process once it has run this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Bytes kept per stream; see [`crate::capture`].
    pub max_output_bytes: usize,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_output_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// A process that started and terminated on its own.
#[derive(Debug, Clone, Serialize)]
pub struct ShellOutput {
    /// Real exit code; `128 + signal` when an external signal ended it.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Either stream lost bytes to the capture cap.
    pub truncated: bool,
    pub duration_ms: u64,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, for log messages.
    pub fn combined(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            ("", "") => String::new(),
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Run `command` with `args` as a literal argument vector.
///
/// No shell is involved: `args` reach the program byte for byte. A non-zero
/// exit is returned as `Ok` with that code; only launch failures, timeouts
/// and cancellation are errors, and in the last two cases the process has
/// been killed and reaped before this returns.
pub async fn execute_shell_command(
    command: &str,
    args: &[String],
    options: &ShellOptions,
    cancel: &CancellationToken,
) -> Result<ShellOutput> {
    debug!(%command, ?args, "exec");
    let started = Instant::now();

    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ShellError::Launch {
            command: command.to_string(),
            source,
        })?;

    let pid = child.id();
    let cap = options.max_output_bytes;
    let stdout_reader = tokio::spawn(drain(child.stdout.take(), cap));
    let stderr_reader = tokio::spawn(drain(child.stderr.take(), cap));

    let deadline = async {
        match options.timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let status = tokio::select! {
        status = child.wait() => status,
        _ = deadline => {
            terminate(&mut child, pid).await;
            stdout_reader.abort();
            stderr_reader.abort();
            let ms = options.timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
            warn!(%command, ?pid, ms, "command timed out and was killed");
            return Err(ShellError::Timeout { ms, pid });
        }
        _ = cancel.cancelled() => {
            terminate(&mut child, pid).await;
            stdout_reader.abort();
            stderr_reader.abort();
            debug!(%command, ?pid, "command cancelled");
            return Err(ShellError::Cancelled { pid });
        }
    };

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            stdout_reader.abort();
            stderr_reader.abort();
            return Err(ShellError::Io(e));
        }
    };

    let stdout = collect(stdout_reader).await;
    let stderr = collect(stderr_reader).await;
    let exit_code = exit_code_of(&status);
    debug!(%command, ?pid, exit_code, "command finished");

    Ok(ShellOutput {
        exit_code,
        truncated: stdout.truncated || stderr.truncated,
        stdout: stdout.text,
        stderr: stderr.text,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

/// SIGKILL the child and wait for it so no zombie is left behind.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Err(e) = child.kill().await {
        warn!(?pid, "failed to kill child process: {e}");
    }
}

async fn drain<R>(stream: Option<R>, cap: usize) -> CapturedOutput
where
    R: AsyncRead + Unpin,
{
    let mut capture = OutputCapture::new(cap);
    if let Some(mut stream) = stream {
        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => capture.push(&buf[..n]),
                Err(e) => {
                    debug!("output pipe read failed: {e}");
                    break;
                }
            }
        }
    }
    capture.finish()
}

async fn collect(reader: tokio::task::JoinHandle<CapturedOutput>) -> CapturedOutput {
    let abort = reader.abort_handle();
    match tokio::time::timeout(PIPE_GRACE, reader).await {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            debug!("output reader task failed: {e}");
            CapturedOutput::default()
        }
        Err(_elapsed) => {
            abort.abort();
            CapturedOutput {
                text: String::new(),
                truncated: true,
            }
        }
    }
}

fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    LAUNCH_FAILURE_EXIT_CODE
}
