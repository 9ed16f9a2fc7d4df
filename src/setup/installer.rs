//! Package and virtual environment installation
//!
//! Commands are always spawned with an argument vector, never through a
//! shell, so package names and paths from the config cannot inject
//! anything.

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use super::Provisioner;
use crate::common::paths::{venv_pip, venv_python};
use crate::common::{Error, Result};

/// Package managers kick knows how to drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
    /// Alpine system packages
    Apk,
    /// pip inside a virtual environment
    Pip { venv_dir: PathBuf },
}

impl PackageManager {
    /// Executable to run
    pub fn program(&self) -> Result<PathBuf> {
        match self {
            PackageManager::Apk => which::which("apk")
                .map_err(|_| Error::Internal("apk not found on PATH; is this an Alpine node?".to_string())),
            PackageManager::Pip { venv_dir } => {
                let pip = venv_pip(venv_dir);
                if pip.exists() {
                    Ok(pip)
                } else {
                    Err(Error::Internal(format!(
                        "pip not found in virtual environment {}",
                        venv_dir.display()
                    )))
                }
            }
        }
    }

    /// Arguments installing `package`
    pub fn install_args(&self, package: &str) -> Vec<String> {
        match self {
            PackageManager::Apk => vec!["add".into(), "--no-cache".into(), package.into()],
            PackageManager::Pip { .. } => vec![
                "install".into(),
                "--disable-pip-version-check".into(),
                "--no-input".into(),
                package.into(),
            ],
        }
    }

    /// Install `package`, mapping any failure to [`Error::PackageInstall`]
    pub async fn install(&self, package: &str, env: &[(String, OsString)]) -> Result<()> {
        let program = self
            .program()
            .map_err(|e| Error::package_install(package, e.to_string()))?;
        run_command_args(&program, &self.install_args(package), env)
            .await
            .map_err(|e| Error::package_install(package, e.to_string()))?;
        tracing::info!(package, "Installed package");
        Ok(())
    }
}

/// Run a program with separate arguments and return its stdout
///
/// A non-zero exit becomes [`Error::CommandFailed`] carrying stderr.
pub async fn run_command_args<P, S>(program: P, args: &[S], env: &[(String, OsString)]) -> Result<String>
where
    P: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let label = std::iter::once(program)
        .chain(args.iter().map(|a| a.as_ref()))
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    tracing::debug!(command = %label, "Running command");

    let output = tokio::process::Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::command_failed(&label, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match output.status.code() {
            Some(code) => format!("exit code {}: {}", code, stderr.trim()),
            None => format!("terminated by signal: {}", stderr.trim()),
        };
        return Err(Error::command_failed(&label, reason));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Installs the system package providing a tool unless the tool is on PATH
pub struct SystemPackage {
    manager: PackageManager,
    package: String,
    tool: String,
    env: Vec<(String, OsString)>,
}

impl SystemPackage {
    pub fn new(
        manager: PackageManager,
        package: String,
        tool: impl Into<String>,
        env: Vec<(String, OsString)>,
    ) -> Self {
        Self {
            manager,
            package,
            tool: tool.into(),
            env,
        }
    }
}

#[async_trait]
impl Provisioner for SystemPackage {
    fn name(&self) -> String {
        format!("install {} (provides {})", self.package, self.tool)
    }

    async fn is_satisfied(&self) -> Result<bool> {
        Ok(which::which(&self.tool).is_ok())
    }

    async fn provision(&self) -> Result<()> {
        self.manager.install(&self.package, &self.env).await
    }
}

/// Creates the Python virtual environment
pub struct VirtualEnv {
    venv_dir: PathBuf,
    system_site_packages: bool,
    env: Vec<(String, OsString)>,
}

impl VirtualEnv {
    pub fn new(venv_dir: PathBuf, system_site_packages: bool, env: Vec<(String, OsString)>) -> Self {
        Self {
            venv_dir,
            system_site_packages,
            env,
        }
    }

    /// Program and arguments creating the venv
    ///
    /// Prefers `virtualenv`; falls back to the stdlib `venv` module.
    fn create_command(&self) -> Result<(PathBuf, Vec<OsString>)> {
        let mut args: Vec<OsString> = Vec::new();

        let program = if let Ok(virtualenv) = which::which("virtualenv") {
            virtualenv
        } else if let Ok(python) = which::which("python3") {
            args.push("-m".into());
            args.push("venv".into());
            python
        } else {
            return Err(Error::package_install(
                "virtualenv",
                "neither virtualenv nor python3 found on PATH",
            ));
        };

        if self.system_site_packages {
            args.push("--system-site-packages".into());
        }
        args.push(self.venv_dir.clone().into_os_string());
        Ok((program, args))
    }
}

#[async_trait]
impl Provisioner for VirtualEnv {
    fn name(&self) -> String {
        format!("create virtual environment {}", self.venv_dir.display())
    }

    async fn is_satisfied(&self) -> Result<bool> {
        Ok(venv_python(&self.venv_dir).exists())
    }

    async fn provision(&self) -> Result<()> {
        if let Some(parent) = self.venv_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let (program, args) = self.create_command()?;
        run_command_args(&program, &args, &self.env).await?;
        tracing::info!(venv = %self.venv_dir.display(), "Created virtual environment");
        Ok(())
    }
}

/// Installs one pip package into the virtual environment
pub struct PipPackage {
    venv_dir: PathBuf,
    package: String,
    module: String,
    env: Vec<(String, OsString)>,
}

impl PipPackage {
    pub fn new(venv_dir: PathBuf, package: String, module: String, env: Vec<(String, OsString)>) -> Self {
        Self {
            venv_dir,
            package,
            module,
            env,
        }
    }
}

/// Whether `python` can import `module`
pub async fn can_import(python: &Path, module: &str) -> bool {
    let script = format!("import {}", module);
    run_command_args(python, &["-c", script.as_str()], &[])
        .await
        .is_ok()
}

#[async_trait]
impl Provisioner for PipPackage {
    fn name(&self) -> String {
        format!("pip install {}", self.package)
    }

    async fn is_satisfied(&self) -> Result<bool> {
        let python = venv_python(&self.venv_dir);
        if !python.exists() {
            return Ok(false);
        }
        Ok(can_import(&python, &self.module).await)
    }

    async fn provision(&self) -> Result<()> {
        let pip = PackageManager::Pip {
            venv_dir: self.venv_dir.clone(),
        };
        pip.install(&self.package, &self.env).await
    }
}
