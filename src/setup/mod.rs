//! Node environment preparation
//!
//! Before drop-ins run, the node gets a tmpfs scratch directory, the
//! `virtualenv` tool, a virtual environment and the one pip dependency the
//! Python drop-ins import. Each step is a [`Provisioner`] that is skipped
//! when already satisfied, so re-running bootstrap on a prepared node is
//! cheap.

pub mod installer;
pub mod mount;

use async_trait::async_trait;
use std::ffi::OsString;

use crate::common::{Config, Result};

pub use installer::{run_command_args, PackageManager, PipPackage, SystemPackage, VirtualEnv};
pub use mount::TmpfsMount;

/// One idempotent preparation step
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Human-readable step name used in logs and reports
    fn name(&self) -> String;

    /// Whether the step's effect is already in place
    async fn is_satisfied(&self) -> Result<bool>;

    /// Perform the step
    async fn provision(&self) -> Result<()>;
}

/// What happened to a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    AlreadySatisfied,
    Provisioned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
}

/// Environment passed to every setup command
fn command_env(config: &Config) -> Vec<(String, OsString)> {
    vec![(
        "TMPDIR".to_string(),
        config.paths.tmp_dir.clone().into_os_string(),
    )]
}

/// The preparation steps for `config`, in execution order
pub fn steps(config: &Config) -> Vec<Box<dyn Provisioner>> {
    let env = command_env(config);
    let bootstrap = &config.bootstrap;
    let venv_dir = config.paths.venv_dir();

    let mut steps: Vec<Box<dyn Provisioner>> = Vec::new();
    if bootstrap.mount_tmpfs {
        steps.push(Box::new(TmpfsMount::new(
            config.paths.tmp_dir.clone(),
            bootstrap.tmpfs_size.clone(),
        )));
    }
    steps.push(Box::new(SystemPackage::new(
        PackageManager::Apk,
        bootstrap.system_package.clone(),
        "virtualenv",
        env.clone(),
    )));
    steps.push(Box::new(VirtualEnv::new(
        venv_dir.clone(),
        bootstrap.system_site_packages,
        env.clone(),
    )));
    steps.push(Box::new(PipPackage::new(
        venv_dir,
        bootstrap.python_package.clone(),
        bootstrap.python_module(),
        env,
    )));
    steps
}

/// Run `steps` in order, stopping at the first failure
pub async fn run_steps(steps: &[Box<dyn Provisioner>]) -> Result<Vec<StepReport>> {
    let mut reports = Vec::with_capacity(steps.len());

    for step in steps {
        let name = step.name();
        let status = if step.is_satisfied().await? {
            tracing::debug!(step = %name, "Already satisfied");
            StepStatus::AlreadySatisfied
        } else {
            tracing::info!(step = %name, "Provisioning");
            step.provision().await.map_err(|e| {
                tracing::error!(step = %name, error = %e, "Provisioning failed");
                e
            })?;
            StepStatus::Provisioned
        };
        reports.push(StepReport { name, status });
    }

    Ok(reports)
}

/// Prepare the node environment described by `config`
pub async fn prepare(config: &Config) -> Result<Vec<StepReport>> {
    run_steps(&steps(config)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use std::sync::{Arc, Mutex};

    struct FakeStep {
        name: &'static str,
        satisfied: bool,
        fails: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Provisioner for FakeStep {
        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn is_satisfied(&self) -> Result<bool> {
            Ok(self.satisfied)
        }

        async fn provision(&self) -> Result<()> {
            self.log.lock().unwrap().push(self.name.to_string());
            if self.fails {
                return Err(Error::package_install(self.name, "boom"));
            }
            Ok(())
        }
    }

    fn step(
        name: &'static str,
        satisfied: bool,
        fails: bool,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Box<dyn Provisioner> {
        Box::new(FakeStep {
            name,
            satisfied,
            fails,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_satisfied_steps_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            step("mount", true, false, &log),
            step("venv", false, false, &log),
        ];

        let reports = run_steps(&steps).await.unwrap();
        assert_eq!(reports[0].status, StepStatus::AlreadySatisfied);
        assert_eq!(reports[1].status, StepStatus::Provisioned);
        assert_eq!(*log.lock().unwrap(), ["venv"]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_preparation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            step("apk", false, true, &log),
            step("venv", false, false, &log),
        ];

        let err = run_steps(&steps).await.unwrap_err();
        assert!(matches!(err, Error::PackageInstall { .. }));
        assert_eq!(*log.lock().unwrap(), ["apk"]);
    }

    #[test]
    fn test_step_order_follows_config() {
        let mut config = Config::default();
        let names: Vec<String> = steps(&config).iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), 4);
        assert!(names[0].starts_with("mount tmpfs"));
        assert!(names[3].contains("ec2-metadata"));

        config.bootstrap.mount_tmpfs = false;
        assert_eq!(steps(&config).len(), 3);
    }
}
