//! Logging and tracing configuration
//!
//! Logs go to stderr so drop-in scripts keep stdout to themselves.
//! Bootstrap runs under cloud-init, so an optional log file can be
//! added to keep a record after the console scrolls away.

use std::fs::File;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a given `-v` count
///
/// `RUST_LOG` still wins when set.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "kick=info,warn",
        1 => "kick=debug,info",
        _ => "kick=trace,debug",
    }
}

/// Initialize tracing for the CLI
///
/// Returns the appender guard when a log file is in use; it must stay
/// alive until the process exits or buffered lines are lost.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let (file_layer, guard) = match log_file.and_then(open_log_file) {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();

    guard
}

/// Open `path` for appending, creating its directory first
///
/// Failures are reported on stderr and logging continues without the file.
fn open_log_file(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory {}: {}", dir.display(), e);
        }
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Could not open log file {}: {}", path.display(), e);
            None
        }
    }
}
