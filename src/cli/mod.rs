//! CLI command dispatch
//!
//! Builds the effective configuration and runs the chosen command,
//! returning the process exit code.

use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use crate::commands::{Commands, GlobalArgs};
use crate::common::{Config, Result};
use crate::runner::{Discovery, RunOutcome, RunReport, Runner};
use crate::setup::{self, StepReport, StepStatus};

/// Build the configuration from file, environment and flags, in that order
pub fn load_config(args: &GlobalArgs) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    config.apply_env();

    if let Some(dir) = &args.run_dir {
        config.paths.run_dir = dir.clone();
    }
    if let Some(dir) = &args.script_dir {
        config.paths.script_dir = Some(dir.clone());
    }
    if let Some(file) = &args.log_file {
        config.logging.file = Some(file.clone());
    }

    Ok(config)
}

/// Run a command and return the exit code for the process
pub async fn dispatch(command: Commands, config: &Config) -> Result<i32> {
    match command {
        Commands::Bootstrap => {
            let steps = setup::prepare(config).await?;
            print_steps(&steps);
            run(config).await
        }
        Commands::Run => run(config).await,
        Commands::Setup => {
            let steps = setup::prepare(config).await?;
            print_steps(&steps);
            Ok(0)
        }
        Commands::List { json } => {
            let runner = Runner::from_config(config);
            let discovery = runner.plan()?;
            if json {
                print_plan_json(runner.script_dir(), &discovery)?;
            } else {
                print_plan(runner.script_dir(), &discovery);
            }
            Ok(0)
        }
        Commands::Config => {
            print!("{}", config.effective().to_toml()?);
            Ok(0)
        }
    }
}

async fn run(config: &Config) -> Result<i32> {
    let report = Runner::from_config(config).run().await?;
    print_summary(&report);
    Ok(report.exit_code())
}

fn print_steps(steps: &[StepReport]) {
    for step in steps {
        match step.status {
            StepStatus::Provisioned => eprintln!("{} {}", "✓".green(), step.name),
            StepStatus::AlreadySatisfied => {
                eprintln!("{} {}", "•".dimmed(), format!("{} (already done)", step.name).dimmed())
            }
        }
    }
}

fn print_summary(report: &RunReport) {
    match &report.outcome {
        RunOutcome::Success => {
            eprintln!(
                "{} {} drop-in script(s) completed",
                "✓".green(),
                report.runs.len()
            );
        }
        RunOutcome::Failed { script, exit_code } => {
            eprintln!(
                "{} {} failed with exit code {} ({} script(s) run)",
                "✗".red(),
                script.bold(),
                exit_code,
                report.runs.len()
            );
        }
    }
}

fn print_plan(dir: &Path, discovery: &Discovery) {
    println!("{} {}", "Drop-ins in".blue().bold(), dir.display());
    if discovery.scripts.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (i, entry) in discovery.scripts.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, entry.name);
    }
    for skipped in &discovery.skipped {
        println!(
            "    {} {}",
            "-".dimmed(),
            format!("{} ({})", skipped.name, skipped.reason).dimmed()
        );
    }
}

#[derive(Serialize)]
struct PlanJson<'a> {
    script_dir: &'a Path,
    #[serde(flatten)]
    discovery: &'a Discovery,
}

fn print_plan_json(dir: &Path, discovery: &Discovery) -> Result<()> {
    let plan = PlanJson {
        script_dir: dir,
        discovery,
    };
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
