//! Configuration handling
//!
//! Values are layered: built-in defaults, then the TOML config file, then
//! `KUBICAL_*` environment variables, then command-line flags.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::paths::{self, config_path};
use super::{Error, Result};

/// Environment variable overriding the temporary directory
pub const ENV_TMP_DIR: &str = "KUBICAL_TMP_DIR";
/// Environment variable overriding the virtual environment location
pub const ENV_VENV_DIR: &str = "KUBICAL_VENV_DIR";
/// Environment variable overriding the run directory
pub const ENV_RUN_DIR: &str = "KUBICAL_RUN_DIR";
/// Environment variable overriding the drop-in script directory
pub const ENV_SCRIPT_DIR: &str = "KUBICAL_SCRIPT_DIR";
/// Environment variable overriding the static files directory
pub const ENV_FILES_DIR: &str = "KUBICAL_FILES_DIR";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Node directory layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Drop-in runner settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Environment preparation settings
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Directory layout
///
/// Unset optional directories are derived from `run_dir`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Base directory for everything kick manages
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,

    /// Scratch space, mounted as tmpfs during bootstrap
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Python virtual environment (default: `<run_dir>/venv`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_dir: Option<PathBuf>,

    /// Drop-in scripts (default: `<run_dir>/kick.d`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_dir: Option<PathBuf>,

    /// Static files shipped with the image (default: `<run_dir>/files`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            run_dir: default_run_dir(),
            tmp_dir: default_tmp_dir(),
            venv_dir: None,
            script_dir: None,
            files_dir: None,
        }
    }
}

fn default_run_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_RUN_DIR)
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_TMP_DIR)
}

impl PathsConfig {
    pub fn venv_dir(&self) -> PathBuf {
        self.venv_dir
            .clone()
            .unwrap_or_else(|| self.run_dir.join(paths::VENV_DIR_NAME))
    }

    pub fn script_dir(&self) -> PathBuf {
        self.script_dir
            .clone()
            .unwrap_or_else(|| self.run_dir.join(paths::SCRIPT_DIR_NAME))
    }

    pub fn files_dir(&self) -> PathBuf {
        self.files_dir
            .clone()
            .unwrap_or_else(|| self.run_dir.join(paths::FILES_DIR_NAME))
    }

    /// Directory prepended to `PYTHONPATH` for child scripts
    pub fn python_lib_dir(&self) -> PathBuf {
        self.run_dir.join(paths::PYTHON_LIB_DIR_NAME)
    }
}

/// Drop-in runner settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// File name suffix marking a drop-in as disabled
    #[serde(default = "default_lock_suffix")]
    pub lock_suffix: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lock_suffix: default_lock_suffix(),
        }
    }
}

fn default_lock_suffix() -> String {
    ".lock~".to_string()
}

/// Environment preparation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BootstrapConfig {
    /// Mount a tmpfs on the temporary directory
    #[serde(default = "default_true")]
    pub mount_tmpfs: bool,

    /// tmpfs `size=` mount option
    #[serde(default = "default_tmpfs_size")]
    pub tmpfs_size: String,

    /// System package providing the `virtualenv` tool
    #[serde(default = "default_system_package")]
    pub system_package: String,

    /// pip package installed into the virtual environment
    #[serde(default = "default_python_package")]
    pub python_package: String,

    /// Module imported to check whether the pip package is present
    /// (default: package name with `-` replaced by `_`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_module: Option<String>,

    /// Give the venv access to system site packages (apk-installed modules)
    #[serde(default = "default_true")]
    pub system_site_packages: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            mount_tmpfs: true,
            tmpfs_size: default_tmpfs_size(),
            system_package: default_system_package(),
            python_package: default_python_package(),
            python_module: None,
            system_site_packages: true,
        }
    }
}

impl BootstrapConfig {
    pub fn python_module(&self) -> String {
        self.python_module
            .clone()
            .unwrap_or_else(|| self.python_package.replace('-', "_"))
    }
}

fn default_true() -> bool {
    true
}

fn default_tmpfs_size() -> String {
    "64m".to_string()
}

fn default_system_package() -> String {
    "py3-virtualenv".to_string()
}

fn default_python_package() -> String {
    "ec2-metadata".to_string()
}

/// Log output settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoggingConfig {
    /// Append logs to this file in addition to stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file
    ///
    /// An explicit path must exist. Without one, the default config file is
    /// used when present and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply `KUBICAL_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var_os(key));
    }

    /// Apply `KUBICAL_*` overrides using `lookup` to read variables
    ///
    /// Empty values are ignored, matching `${VAR:-default}`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        if let Some(dir) = get(ENV_RUN_DIR) {
            self.paths.run_dir = dir;
        }
        if let Some(dir) = get(ENV_TMP_DIR) {
            self.paths.tmp_dir = dir;
        }
        if let Some(dir) = get(ENV_VENV_DIR) {
            self.paths.venv_dir = Some(dir);
        }
        if let Some(dir) = get(ENV_SCRIPT_DIR) {
            self.paths.script_dir = Some(dir);
        }
        if let Some(dir) = get(ENV_FILES_DIR) {
            self.paths.files_dir = Some(dir);
        }
    }

    /// Copy of this configuration with every derived path filled in
    pub fn effective(&self) -> Self {
        let mut config = self.clone();
        config.paths.venv_dir = Some(self.paths.venv_dir());
        config.paths.script_dir = Some(self.paths.script_dir());
        config.paths.files_dir = Some(self.paths.files_dir());
        config.bootstrap.python_module = Some(self.bootstrap.python_module());
        config
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Variables exported to every child process
    pub fn child_env(&self) -> Vec<(String, OsString)> {
        self.child_env_with(std::env::var_os("PYTHONPATH"))
    }

    /// Variables exported to every child process, given the inherited
    /// `PYTHONPATH`
    pub fn child_env_with(&self, inherited_pythonpath: Option<OsString>) -> Vec<(String, OsString)> {
        let paths = &self.paths;
        let lib_dir = paths.python_lib_dir();

        let pythonpath = match inherited_pythonpath.filter(|p| !p.is_empty()) {
            Some(existing) => {
                let mut entries = vec![lib_dir.clone()];
                entries.extend(std::env::split_paths(&existing));
                std::env::join_paths(entries).unwrap_or_else(|_| lib_dir.clone().into_os_string())
            }
            None => lib_dir.into_os_string(),
        };

        vec![
            (ENV_RUN_DIR.to_string(), paths.run_dir.clone().into_os_string()),
            (ENV_TMP_DIR.to_string(), paths.tmp_dir.clone().into_os_string()),
            (ENV_VENV_DIR.to_string(), paths.venv_dir().into_os_string()),
            (ENV_SCRIPT_DIR.to_string(), paths.script_dir().into_os_string()),
            (ENV_FILES_DIR.to_string(), paths.files_dir().into_os_string()),
            ("TMPDIR".to_string(), paths.tmp_dir.clone().into_os_string()),
            ("PYTHONPATH".to_string(), pythonpath),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_value<'a>(env: &'a [(String, OsString)], key: &str) -> &'a OsString {
        &env.iter().find(|(k, _)| k == key).expect("missing variable").1
    }

    #[test]
    fn test_defaults_follow_run_dir() {
        let config = Config::default();
        assert_eq!(config.paths.run_dir, PathBuf::from("/var/lib/kubical"));
        assert_eq!(config.paths.script_dir(), PathBuf::from("/var/lib/kubical/kick.d"));
        assert_eq!(config.paths.venv_dir(), PathBuf::from("/var/lib/kubical/venv"));
        assert_eq!(config.paths.files_dir(), PathBuf::from("/var/lib/kubical/files"));
        assert_eq!(config.runner.lock_suffix, ".lock~");
        assert_eq!(config.bootstrap.python_module(), "ec2_metadata");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [paths]
            run_dir = "/opt/node"

            [bootstrap]
            python_package = "PyYAML"
            python_module = "yaml"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.script_dir(), PathBuf::from("/opt/node/kick.d"));
        assert_eq!(config.paths.tmp_dir, PathBuf::from("/tmp/kubical"));
        assert_eq!(config.bootstrap.python_module(), "yaml");
        assert_eq!(config.bootstrap.system_package, "py3-virtualenv");
        assert!(config.bootstrap.mount_tmpfs);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::from_toml("[paths\nrun_dir = 1").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_env_overrides_and_ignores_empty() {
        let vars: HashMap<&str, &str> = [
            (ENV_RUN_DIR, "/srv/kubical"),
            (ENV_SCRIPT_DIR, "/etc/kick.d"),
            (ENV_TMP_DIR, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|key| vars.get(key).map(OsString::from));

        assert_eq!(config.paths.run_dir, PathBuf::from("/srv/kubical"));
        assert_eq!(config.paths.script_dir(), PathBuf::from("/etc/kick.d"));
        assert_eq!(config.paths.venv_dir(), PathBuf::from("/srv/kubical/venv"));
        assert_eq!(config.paths.tmp_dir, PathBuf::from("/tmp/kubical"));
    }

    #[test]
    fn test_child_env_exports_paths() {
        let config = Config::default();
        let env = config.child_env_with(None);

        assert_eq!(env_value(&env, ENV_SCRIPT_DIR), "/var/lib/kubical/kick.d");
        assert_eq!(env_value(&env, "PYTHONPATH"), "/var/lib/kubical/lib");
        assert_eq!(env_value(&env, "TMPDIR"), "/tmp/kubical");
    }

    #[test]
    fn test_child_env_prepends_pythonpath() {
        let config = Config::default();
        let env = config.child_env_with(Some(OsString::from("/usr/lib/extra")));
        assert_eq!(
            env_value(&env, "PYTHONPATH"),
            "/var/lib/kubical/lib:/usr/lib/extra"
        );
    }

    #[test]
    fn test_effective_config_round_trips() {
        let effective = Config::default().effective();
        let rendered = effective.to_toml().unwrap();
        assert!(rendered.contains("kick.d"));

        let parsed = Config::from_toml(&rendered).unwrap();
        assert_eq!(parsed.paths.script_dir(), effective.paths.script_dir());
    }
}
