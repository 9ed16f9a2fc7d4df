//! kick - bootstrap runner for Alpine cluster nodes
//!
//! Prepares a Python virtual environment on a tmpfs-backed scratch
//! directory, then runs the node's kick.d drop-in scripts one at a time,
//! stopping at the first failure.

pub mod cli;
pub mod commands;
pub mod common;
pub mod runner;
pub mod setup;

// Re-export commonly used types for tests
pub use common::{Config, Error, Result};
pub use runner::{RunOutcome, RunReport, Runner, ScriptEntry};
