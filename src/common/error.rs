//! Error types for kick
//!
//! Every message names the step that failed so a node operator reading
//! cloud-init output knows where to look.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code used for failures that are not a drop-in script's own exit code
pub const EXIT_FAILURE: i32 = 1;

/// Main error type for kick
#[derive(Error, Debug)]
pub enum Error {
    // === Runner Errors ===
    #[error("Cannot read script directory '{path}': {source}")]
    FileSystem {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Drop-in script '{script}' failed with exit code {code}")]
    ScriptFailed { script: String, code: i32 },

    // === Environment Preparation Errors ===
    #[error("Failed to install package '{package}': {reason}")]
    PackageInstall { package: String, reason: String },

    #[error("Failed to mount tmpfs at '{path}': {reason}")]
    Mount { path: String, reason: String },

    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a filesystem error for a directory that could not be listed
    pub fn file_system(path: &Path, source: io::Error) -> Self {
        Self::FileSystem {
            path: path.display().to_string(),
            source,
        }
    }

    /// Create a package install error
    pub fn package_install(package: &str, reason: impl Into<String>) -> Self {
        Self::PackageInstall {
            package: package.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a mount error
    pub fn mount(path: &Path, reason: impl Into<String>) -> Self {
        Self::Mount {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: &str, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error
    ///
    /// A failed drop-in propagates its own code; everything else exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ScriptFailed { code, .. } if *code != 0 => *code,
            _ => EXIT_FAILURE,
        }
    }
}
