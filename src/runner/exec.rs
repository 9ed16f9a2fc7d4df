//! Single drop-in execution

use std::ffi::OsString;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

use super::discovery::ScriptEntry;
use crate::common::error::EXIT_FAILURE;

/// Exit code reported when a script exists but cannot be executed
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit code reported when a script disappeared before it could run
pub const EXIT_NOT_FOUND: i32 = 127;

/// Spawn attempts made while the kernel reports the file as busy
const TEXT_BUSY_ATTEMPTS: u32 = 5;

/// Run one script to completion and return its exit code
///
/// The child gets no arguments, a closed stdin, the inherited environment
/// plus `env`, and the inherited working directory.
pub async fn execute(entry: &ScriptEntry, env: &[(String, OsString)]) -> i32 {
    let mut attempt = 1;
    loop {
        let status = Command::new(&entry.path)
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => return exit_code(status),
            Err(e) if is_text_busy(&e) && attempt < TEXT_BUSY_ATTEMPTS => {
                tracing::debug!(script = %entry.name, attempt, "Executable busy, retrying spawn");
                tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
                attempt += 1;
            }
            Err(e) => {
                let code = spawn_error_code(&e);
                tracing::error!(script = %entry.name, error = %e, code, "Failed to start drop-in");
                return code;
            }
        }
    }
}

/// Map a finished process status to a shell-style exit code
pub fn exit_code(status: ExitStatus) -> i32 {
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

    EXIT_FAILURE
}

/// Map a spawn failure to the code a shell would report
pub fn spawn_error_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => EXIT_NOT_FOUND,
        _ => EXIT_NOT_EXECUTABLE,
    }
}

#[cfg(unix)]
fn is_text_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_err: &io::Error) -> bool {
    false
}
