//! cadence-shell: out-of-process command execution for shell tasks.
//!
//! Commands are started directly with an argument vector; no intermediate
//! shell ever sees the arguments, so metacharacters in parameters are inert.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use cadence_shell::{execute_shell_command, ShellOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cancel = CancellationToken::new();
//!     let args = vec!["-la".to_string(), "/tmp".to_string()];
//!     let out = execute_shell_command("ls", &args, &ShellOptions::default(), &cancel)
//!         .await
//!         .unwrap();
//!     println!("exit {}: {}", out.exit_code, out.stdout);
//! }
//! ```

pub mod capture;
pub mod error;
pub mod runner;

pub use error::{Result, ShellError};
pub use runner::{
    execute_shell_command, ShellOptions, ShellOutput, CANCELLED_EXIT_CODE,
    LAUNCH_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
