//! Sequential drop-in runner
//!
//! Runs every script in the kick.d directory one at a time, in file name
//! order, and stops at the first one that exits non-zero.

mod discovery;
mod exec;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::common::{Config, Error, Result};

pub use discovery::{discover, is_locked, scan, Discovery, ScriptEntry, SkipReason, SkippedEntry};
pub use exec::{exit_code, EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND};

/// One executed script
#[derive(Debug, Clone)]
pub struct ScriptRun {
    pub name: String,
    pub exit_code: i32,
    pub duration: Duration,
}

/// Overall result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every selected script exited 0
    Success,
    /// `script` exited with `exit_code` and nothing after it ran
    Failed { script: String, exit_code: i32 },
}

/// Scripts executed by a run, in order, ending at the first failure
#[derive(Debug, Clone)]
pub struct RunReport {
    pub runs: Vec<ScriptRun>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    /// Process exit code: 0, or the failing script's code
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            RunOutcome::Success => 0,
            RunOutcome::Failed { exit_code, .. } => *exit_code,
        }
    }

    /// Names of the scripts that ran
    pub fn names(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.name.as_str()).collect()
    }

    /// Turn a failed run into [`Error::ScriptFailed`]
    pub fn into_result(self) -> Result<Self> {
        match self.outcome {
            RunOutcome::Success => Ok(self),
            RunOutcome::Failed { script, exit_code } => Err(Error::ScriptFailed {
                script,
                code: exit_code,
            }),
        }
    }
}

/// Runs the drop-ins of one directory
#[derive(Debug, Clone)]
pub struct Runner {
    script_dir: PathBuf,
    lock_suffix: String,
    env: Vec<(String, OsString)>,
}

impl Runner {
    /// Runner over `script_dir` with the default lock suffix and no extra
    /// environment
    pub fn new(script_dir: impl Into<PathBuf>) -> Self {
        Self {
            script_dir: script_dir.into(),
            lock_suffix: crate::common::config::RunnerConfig::default().lock_suffix,
            env: Vec::new(),
        }
    }

    /// Runner configured from the effective node configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.paths.script_dir())
            .with_lock_suffix(config.runner.lock_suffix.clone())
            .with_env(config.child_env())
    }

    pub fn with_lock_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.lock_suffix = suffix.into();
        self
    }

    /// Variables set on every child in addition to the inherited environment
    pub fn with_env(mut self, env: Vec<(String, OsString)>) -> Self {
        self.env = env;
        self
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Scan the directory without running anything
    pub fn plan(&self) -> Result<Discovery> {
        scan(&self.script_dir, &self.lock_suffix)
    }

    /// Run every selected script, stopping at the first failure
    ///
    /// Only a missing or unreadable directory is an `Err`; a failing script
    /// is reported through [`RunOutcome::Failed`].
    pub async fn run(&self) -> Result<RunReport> {
        let scripts = discover(&self.script_dir, &self.lock_suffix)?;
        tracing::info!(
            dir = %self.script_dir.display(),
            count = scripts.len(),
            "Running drop-in scripts"
        );

        let mut runs = Vec::with_capacity(scripts.len());
        for entry in &scripts {
            tracing::info!(script = %entry.name, "Starting");
            let started = Instant::now();
            let code = exec::execute(entry, &self.env).await;
            let duration = started.elapsed();

            runs.push(ScriptRun {
                name: entry.name.clone(),
                exit_code: code,
                duration,
            });

            if code != 0 {
                tracing::error!(
                    script = %entry.name,
                    exit_code = code,
                    elapsed_ms = duration.as_millis() as u64,
                    "Drop-in failed, stopping"
                );
                return Ok(RunReport {
                    runs,
                    outcome: RunOutcome::Failed {
                        script: entry.name.clone(),
                        exit_code: code,
                    },
                });
            }

            tracing::info!(
                script = %entry.name,
                elapsed_ms = duration.as_millis() as u64,
                "Finished"
            );
        }

        Ok(RunReport {
            runs,
            outcome: RunOutcome::Success,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};

    /// Write an executable script that records its name and exits with `code`
    fn script(dir: &Path, name: &str, code: i32) {
        let path = dir.join(name);
        fs::write(
            &path,
            format!("#!/bin/sh\necho {name} >> \"$KICK_TEST_TRACE\"\nexit {code}\n"),
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn runner(dir: &TempDir) -> (Runner, PathBuf) {
        let kick = dir.path().join("kick.d");
        fs::create_dir_all(&kick).unwrap();
        let trace = dir.path().join("trace");
        let runner = Runner::new(&kick).with_env(vec![(
            "KICK_TEST_TRACE".to_string(),
            trace.clone().into_os_string(),
        )]);
        (runner, trace)
    }

    fn traced(trace: &Path) -> Vec<String> {
        fs::read_to_string(trace)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let dir = tempdir().unwrap();
        let (runner, trace) = runner(&dir);
        script(runner.script_dir(), "10-b", 0);
        script(runner.script_dir(), "00-a", 0);

        let report = runner.run().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.names(), ["00-a", "10-b"]);
        assert_eq!(traced(&trace), ["00-a", "10-b"]);
    }

    #[tokio::test]
    async fn test_skips_lock_artifacts() {
        let dir = tempdir().unwrap();
        let (runner, trace) = runner(&dir);
        script(runner.script_dir(), "a.sh", 0);
        script(runner.script_dir(), "b.sh.lock~", 0);
        script(runner.script_dir(), "c.sh", 0);

        let report = runner.run().await.unwrap();
        assert_eq!(report.exit_code(), 0);
        assert_eq!(traced(&trace), ["a.sh", "c.sh"]);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let dir = tempdir().unwrap();
        let (runner, trace) = runner(&dir);
        script(runner.script_dir(), "a.sh", 0);
        script(runner.script_dir(), "b.sh", 3);
        script(runner.script_dir(), "c.sh", 0);

        let report = runner.run().await.unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::Failed {
                script: "b.sh".to_string(),
                exit_code: 3
            }
        );
        assert_eq!(report.exit_code(), 3);
        assert_eq!(report.names(), ["a.sh", "b.sh"]);
        assert_eq!(traced(&trace), ["a.sh", "b.sh"]);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempdir().unwrap();
        let (runner, _) = runner(&dir);

        let report = runner.run().await.unwrap();
        assert!(report.is_success());
        assert!(report.runs.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let runner = Runner::new(dir.path().join("nope"));

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, Error::FileSystem { .. }));
    }

    #[tokio::test]
    async fn test_non_executable_file_fails_run() {
        let dir = tempdir().unwrap();
        let (runner, trace) = runner(&dir);
        fs::write(runner.script_dir().join("a.sh"), "#!/bin/sh\nexit 0\n").unwrap();
        script(runner.script_dir(), "b.sh", 0);

        let report = runner.run().await.unwrap();
        assert_eq!(report.exit_code(), EXIT_NOT_EXECUTABLE);
        assert_eq!(report.names(), ["a.sh"]);
        assert!(traced(&trace).is_empty());
    }

    #[tokio::test]
    async fn test_signal_maps_to_shell_code() {
        let dir = tempdir().unwrap();
        let (runner, _) = runner(&dir);
        let path = runner.script_dir().join("killed");
        fs::write(&path, "#!/bin/sh\nkill -TERM $$\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        let report = runner.run().await.unwrap();
        assert_eq!(report.exit_code(), 128 + libc::SIGTERM);
    }

    #[tokio::test]
    async fn test_children_see_exported_env() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.paths.run_dir = dir.path().to_path_buf();
        let kick = config.paths.script_dir();
        fs::create_dir_all(&kick).unwrap();

        let out = dir.path().join("env.out");
        let path = kick.join("dump");
        fs::write(
            &path,
            format!(
                "#!/bin/sh\necho \"$KUBICAL_FILES_DIR $PYTHONPATH $#\" > {}\n",
                out.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        let runner = Runner::from_config(&config).with_env(config.child_env_with(None));
        runner.run().await.unwrap().into_result().unwrap();

        let dumped = fs::read_to_string(out).unwrap();
        assert_eq!(
            dumped.trim(),
            format!(
                "{} {} 0",
                dir.path().join("files").display(),
                dir.path().join("lib").display()
            )
        );
    }
}
