//! CLI module for pitrestore
//!
//! Provides command-line interface for:
//! - restore: run the restore engine on a staged dbpath
//! - backup: stage a checkpoint of a live source
//! - configure: publish the restore channel of a staged backup
//! - verify: check a restored dbpath
//! - status: inspect a dbpath's restore state

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{BackupArgs, Cli, Command, ConfigureArgs, VerifyArgs};
pub use commands::{backup, configure, restore, run, run_command, status, verify};
pub use config::ToolConfig;
pub use errors::{CliError, CliErrorCode, CliResult, EXIT_CLEAN, EXIT_FATAL, EXIT_USAGE};
pub use io::{write_error, write_response};
