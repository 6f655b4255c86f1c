//! CLI argument definitions using clap
//!
//! Commands:
//! - pitrestore restore --dbpath <dir> --channel <file>
//! - pitrestore backup --source <dir> --dest <dir> [...]
//! - pitrestore configure --dbpath <dir> [--channel <file>] [...]
//! - pitrestore verify --dbpath <dir> [...]
//! - pitrestore status --dbpath <dir>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::timestamp::Timestamp;

/// pitrestore - point-in-time restore for a replicated document store
#[derive(Parser, Debug)]
#[command(name = "pitrestore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the tool configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the restore engine on a staged dbpath
    Restore {
        /// Staged dbpath to restore in place
        #[arg(long)]
        dbpath: PathBuf,

        /// Restore configuration channel
        #[arg(long)]
        channel: PathBuf,
    },

    /// Stage a checkpoint of a source dbpath
    Backup(BackupArgs),

    /// Publish the restore channel for a staged backup
    Configure(ConfigureArgs),

    /// Check a restored dbpath against expectations
    Verify(VerifyArgs),

    /// Report the restore state of a dbpath without opening it
    Status {
        /// dbpath to inspect
        #[arg(long)]
        dbpath: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    /// Source dbpath
    #[arg(long)]
    pub source: PathBuf,

    /// Staged dbpath to create
    #[arg(long)]
    pub dest: PathBuf,

    /// Stage only this namespace (repeatable)
    #[arg(long = "namespace", value_name = "DB.COLL")]
    pub namespaces: Vec<String>,

    /// Write a fingerprint of the source checkpoint to this file
    #[arg(long)]
    pub fingerprint: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigureArgs {
    /// Staged dbpath written by `backup`
    #[arg(long)]
    pub dbpath: PathBuf,

    /// Where to publish the channel; defaults to `<dbpath>.channel`
    #[arg(long)]
    pub channel: Option<PathBuf>,

    /// Replay the source log up to SECS,INC
    #[arg(long, value_name = "SECS,INC")]
    pub point_in_time: Option<Timestamp>,

    /// Force the restored term above this value
    #[arg(long)]
    pub higher_term_than: Option<i64>,

    /// Keep the channel after the engine reads it
    #[arg(long)]
    pub persist: bool,

    /// Run the engine as a subprocess once the channel is published
    #[arg(long)]
    pub run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Restored dbpath
    #[arg(long)]
    pub dbpath: PathBuf,

    /// Expected stable recovery timestamp
    #[arg(long, value_name = "SECS,INC")]
    pub expect_stable: Option<Timestamp>,

    /// Expected replica-set config term
    #[arg(long)]
    pub expect_term: Option<i64>,

    /// Expected namespace (repeatable); the restored set must match exactly
    #[arg(long = "namespace", value_name = "DB.COLL")]
    pub namespaces: Vec<String>,

    /// Fingerprint written by `backup --fingerprint`
    #[arg(long)]
    pub fingerprint: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
