//! Conventional node paths and configuration file location
//!
//! The defaults mirror the layout baked into node images:
//! everything lives under `/var/lib/kubical`, scratch space under
//! `/tmp/kubical`.

use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "kubical-kick";

/// Default run directory
pub const DEFAULT_RUN_DIR: &str = "/var/lib/kubical";

/// Default temporary directory (mounted as tmpfs during bootstrap)
pub const DEFAULT_TMP_DIR: &str = "/tmp/kubical";

/// Drop-in directory name under the run directory
pub const SCRIPT_DIR_NAME: &str = "kick.d";

/// Static files directory name under the run directory
pub const FILES_DIR_NAME: &str = "files";

/// Virtual environment directory name under the run directory
pub const VENV_DIR_NAME: &str = "venv";

/// Python import path directory name under the run directory
pub const PYTHON_LIB_DIR_NAME: &str = "lib";

/// Path to the interpreter inside a virtual environment
pub fn venv_python(venv_dir: &Path) -> PathBuf {
    venv_dir.join("bin").join("python")
}

/// Path to pip inside a virtual environment
pub fn venv_pip(venv_dir: &Path) -> PathBuf {
    venv_dir.join("bin").join("pip")
}

/// Get the configuration directory path
///
/// Linux: `$XDG_CONFIG_HOME/kubical-kick/` (usually `~/.config/kubical-kick/`)
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venv_paths() {
        let venv = Path::new("/var/lib/kubical/venv");
        assert_eq!(
            venv_python(venv),
            PathBuf::from("/var/lib/kubical/venv/bin/python")
        );
        assert_eq!(venv_pip(venv), PathBuf::from("/var/lib/kubical/venv/bin/pip"));
    }

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
