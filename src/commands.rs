//! CLI command definitions
//!
//! Defines the clap commands for the kick CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Flags accepted by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: ~/.config/kubical-kick/config.toml if present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base directory for venv, drop-ins and files
    #[arg(long, global = true, value_name = "DIR")]
    pub run_dir: Option<PathBuf>,

    /// Directory of drop-in scripts (default: <run-dir>/kick.d)
    #[arg(long, global = true, value_name = "DIR")]
    pub script_dir: Option<PathBuf>,

    /// Also append logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Prepare the environment, then run every drop-in script
    Bootstrap,

    /// Run the drop-in scripts without preparing the environment
    Run,

    /// Prepare the environment only (tmpfs, virtualenv, pip dependency)
    Setup,

    /// Show which drop-in scripts would run, in order
    #[command(alias = "ls")]
    List {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}
