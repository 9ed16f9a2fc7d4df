//! Drop-in discovery
//!
//! Lists the script directory, keeps regular files that are not locked,
//! and orders them by file name.

use serde::Serialize;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// A drop-in script selected for execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptEntry {
    /// File name, used in logs and failure reports
    pub name: String,
    /// Full path passed to the process spawner
    pub path: PathBuf,
}

/// Why an entry of the script directory was not selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Directory, socket, fifo or dangling symlink
    NotRegularFile,
    /// Name ends with the lock suffix
    Locked,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotRegularFile => write!(f, "not a regular file"),
            SkipReason::Locked => write!(f, "locked"),
        }
    }
}

/// An entry left out of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: SkipReason,
}

/// Result of scanning a script directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    /// Scripts to run, in execution order
    pub scripts: Vec<ScriptEntry>,
    /// Entries that were filtered out, in name order
    pub skipped: Vec<SkippedEntry>,
}

/// Check whether a file name carries the lock suffix
///
/// An empty suffix disables locking rather than matching every name.
pub fn is_locked(name: &OsStr, lock_suffix: &str) -> bool {
    !lock_suffix.is_empty() && name.as_encoded_bytes().ends_with(lock_suffix.as_bytes())
}

/// Scan `dir` and classify every entry
///
/// Fails with [`Error::FileSystem`] if the directory cannot be listed.
/// Symlinks are followed, so a link to a regular file is a script.
pub fn scan(dir: &Path, lock_suffix: &str) -> Result<Discovery> {
    let read_dir = fs::read_dir(dir).map_err(|e| Error::file_system(dir, e))?;

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| Error::file_system(dir, e))?;
        names.push(entry.file_name());
    }
    names.sort();

    let mut discovery = Discovery::default();
    for file_name in names {
        let name = file_name.to_string_lossy().into_owned();
        let path = dir.join(&file_name);

        let is_file = match fs::metadata(&path) {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                tracing::debug!(entry = %name, error = %e, "Cannot stat entry");
                false
            }
        };

        let reason = if !is_file {
            Some(SkipReason::NotRegularFile)
        } else if is_locked(&file_name, lock_suffix) {
            Some(SkipReason::Locked)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                tracing::debug!(entry = %name, %reason, "Skipping entry");
                discovery.skipped.push(SkippedEntry { name, reason });
            }
            None => discovery.scripts.push(ScriptEntry { name, path }),
        }
    }

    Ok(discovery)
}

/// Scripts in `dir` that would run, in execution order
pub fn discover(dir: &Path, lock_suffix: &str) -> Result<Vec<ScriptEntry>> {
    scan(dir, lock_suffix).map(|d| d.scripts)
}
