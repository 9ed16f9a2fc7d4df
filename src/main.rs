//! kick - bootstrap runner for Alpine cluster nodes
//!
//! Runs the kick.d drop-in scripts in name order and exits with the code of
//! the first one that fails.

use clap::Parser;
use kick::commands::{Commands, GlobalArgs};
use kick::{cli, common::logging};

#[derive(Parser)]
#[command(name = "kick", about = "Bootstrap runner for kick.d drop-in scripts")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(&cli.global) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let guard = logging::init(cli.global.verbose, config.logging.file.as_deref());

    let code = match cli::dispatch(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            e.exit_code()
        }
    };

    // Flush the log file before exiting
    drop(guard);
    std::process::exit(code);
}
