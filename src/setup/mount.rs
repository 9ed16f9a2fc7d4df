//! tmpfs scratch directory

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::installer::run_command_args;
use super::Provisioner;
use crate::common::{Error, Result};

/// Kernel mount table
const MOUNTS_PATH: &str = "/proc/mounts";

/// Mounts a tmpfs on the temporary directory
pub struct TmpfsMount {
    path: PathBuf,
    size: String,
}

impl TmpfsMount {
    pub fn new(path: PathBuf, size: String) -> Self {
        Self { path, size }
    }
}

#[async_trait]
impl Provisioner for TmpfsMount {
    fn name(&self) -> String {
        format!("mount tmpfs on {}", self.path.display())
    }

    async fn is_satisfied(&self) -> Result<bool> {
        let table = match tokio::fs::read_to_string(MOUNTS_PATH).await {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read {}", MOUNTS_PATH);
                return Ok(false);
            }
        };
        Ok(is_tmpfs_mount(&table, &self.path))
    }

    async fn provision(&self) -> Result<()> {
        if !is_root() {
            return Err(Error::mount(&self.path, "mounting requires root privileges"));
        }

        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|e| Error::mount(&self.path, e.to_string()))?;

        let options = format!("size={},mode=0700", self.size);
        let args = [
            OsStr::new("-t"),
            OsStr::new("tmpfs"),
            OsStr::new("-o"),
            OsStr::new(&options),
            OsStr::new("tmpfs"),
            self.path.as_os_str(),
        ];
        run_command_args("mount", &args, &[])
            .await
            .map_err(|e| Error::mount(&self.path, e.to_string()))?;

        tracing::info!(path = %self.path.display(), size = %self.size, "Mounted tmpfs");
        Ok(())
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// Whether the topmost mount at `path` in a `/proc/mounts` table is a tmpfs
pub fn is_tmpfs_mount(table: &str, path: &Path) -> bool {
    let path = path.to_string_lossy();
    let wanted = normalize(&path);

    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _source = fields.next()?;
            let target = fields.next()?;
            let fstype = fields.next()?;
            Some((unescape_mount_field(target), fstype))
        })
        .filter(|(target, _)| normalize(target) == wanted)
        .last()
        .is_some_and(|(_, fstype)| fstype == "tmpfs")
}

fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Decode the `\ooo` octal escapes the kernel uses for whitespace and
/// backslashes in mount table fields
pub fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let escaped = bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b));
        if escaped {
            let digits = &field[i + 1..i + 4];
            if let Ok(value) = u8::from_str_radix(digits, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
