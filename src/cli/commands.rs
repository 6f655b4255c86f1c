//! CLI command implementations
//!
//! `restore` is the engine entry point an orchestrator spawns: it exits 0
//! on a clean restore, 1 on any fatal restore error and 2 when the tool
//! itself is misconfigured. The other commands drive the rest of the
//! lifecycle from a shell: staging a backup, publishing its channel,
//! verifying a restored node and inspecting a dbpath.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::observability::Logger;
use crate::restore::{self, RestoreFailure, RestoreOutcome};
use crate::session::{EngineCommand, RestoreRequest, RestoreSession};
use crate::storage::{StorageEngine, LOCK_FILE};
use crate::verify::{DataFingerprint, Expectations, RestoreVerifier};

use super::args::{BackupArgs, Cli, Command, ConfigureArgs, VerifyArgs};
use super::config::ToolConfig;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli)
}

/// Load the tool configuration, then run the requested command
pub fn run_command(cli: Cli) -> CliResult<()> {
    let config = ToolConfig::load_or_default(cli.config.as_deref())?;
    Logger::init_min_severity(config.severity());

    match cli.command {
        Command::Restore { dbpath, channel } => restore(&config, &dbpath, &channel),
        Command::Backup(args) => backup(&args),
        Command::Configure(args) => configure(&config, cli.config.as_deref(), &args),
        Command::Verify(args) => verify(&args),
        Command::Status { dbpath } => status(&dbpath),
    }
}

/// Run the restore engine in this process
pub fn restore(config: &ToolConfig, dbpath: &Path, channel: &Path) -> CliResult<()> {
    let outcome = restore::restore(dbpath, channel, config.retry_policy())?;
    write_response(serde_json::to_value(&outcome)?)
}

/// Stage a checkpoint of `args.source` into `args.dest`.
///
/// Nothing is published: `configure` picks the staged backup up later, so
/// the source can keep taking writes a point-in-time restore will replay.
pub fn backup(args: &BackupArgs) -> CliResult<()> {
    let request = RestoreRequest::checkpoint().namespaces(args.namespaces.iter().cloned());

    let mut source = StorageEngine::open(&args.source)?;
    let staged =
        RestoreSession::new(&args.dest, default_channel(&args.dest)).stage(&mut source, request)?;
    let checkpoint_timestamp = staged.metadata().checkpoint_timestamp;

    if let Some(path) = &args.fingerprint {
        let written = DataFingerprint::capture(&source, checkpoint_timestamp).and_then(|fingerprint| {
            let fingerprint = if args.namespaces.is_empty() {
                fingerprint
            } else {
                fingerprint.restricted_to(args.namespaces.iter().map(String::as_str))
            };
            fingerprint.write_to_file(path)
        });
        if let Err(e) = written {
            staged.discard()?;
            return Err(e.into());
        }
    }
    source.close()?;

    write_response(json!({
        "dbpath": staged.dbpath().display().to_string(),
        "backup_id": staged.metadata().backup_id,
        "checkpoint_timestamp": checkpoint_timestamp,
        "configuration": staged.restore_configuration(),
    }))
}

/// Publish the restore channel of a staged backup.
///
/// With `--run` the engine is then launched as a subprocess of this
/// binary and its outcome reported.
pub fn configure(config: &ToolConfig, config_path: Option<&Path>, args: &ConfigureArgs) -> CliResult<()> {
    let channel = args
        .channel
        .clone()
        .unwrap_or_else(|| default_channel(&args.dbpath));

    let mut staged = RestoreSession::new(&args.dbpath, channel).reopen()?;
    if let Some(pit) = args.point_in_time {
        staged = staged.with_point_in_time(pit);
    }
    if let Some(term) = args.higher_term_than {
        staged = staged.with_higher_term_than(term);
    }
    let configured = staged.configure(args.persist)?;

    let mut data = json!({
        "dbpath": configured.dbpath().display().to_string(),
        "channel": configured.channel().path().display().to_string(),
        "configuration": configured.config(),
    });

    if args.run {
        let mut command = EngineCommand::current_exe()?;
        if let Some(path) = config_path {
            command = command.tool_config(path);
        }
        let outcome = configured.run_subprocess(
            &command,
            config.engine_exit_timeout(),
            config.poll_interval(),
        )?;
        data["outcome"] = serde_json::to_value(&outcome)?;
    }

    write_response(data)
}

/// `<dbpath>.channel`, next to the staged dbpath
fn default_channel(dbpath: &Path) -> PathBuf {
    let mut name = dbpath.as_os_str().to_os_string();
    name.push(".channel");
    PathBuf::from(name)
}

/// Verify a restored dbpath
pub fn verify(args: &VerifyArgs) -> CliResult<()> {
    let mut expectations = Expectations::default();
    if let Some(ts) = args.expect_stable {
        expectations = expectations.stable_at(ts);
    }
    if let Some(term) = args.expect_term {
        expectations = expectations.config_term(term);
    }
    if !args.namespaces.is_empty() {
        expectations = expectations.namespaces(args.namespaces.iter().cloned());
    }
    if let Some(path) = &args.fingerprint {
        expectations = expectations.fingerprint(DataFingerprint::read_from_file(path)?);
    }

    let node = StorageEngine::open(&args.dbpath)?;
    let report = RestoreVerifier::new(&node).verify(&expectations);
    node.close()?;

    let checks: Vec<Value> = report
        .checks
        .iter()
        .map(|check| match &check.error {
            None => json!({ "check": check.name, "passed": true }),
            Some(err) => json!({
                "check": check.name,
                "passed": false,
                "code": err.code().as_str(),
                "message": err.message(),
            }),
        })
        .collect();
    let stable_timestamp = report.stable_timestamp;

    report.into_result()?;
    write_response(json!({
        "stable_timestamp": stable_timestamp,
        "checks": checks,
    }))
}

/// Report what state a dbpath is in, without taking its lock
pub fn status(dbpath: &Path) -> CliResult<()> {
    if !dbpath.is_dir() {
        return Err(CliError::io_error(format!(
            "{} is not a directory",
            dbpath.display()
        )));
    }

    let failure = RestoreFailure::read_from(dbpath)?;
    let outcome = if RestoreOutcome::path_in(dbpath).exists() {
        Some(RestoreOutcome::read_from(dbpath)?)
    } else {
        None
    };
    let locked = dbpath.join(LOCK_FILE).exists();

    let state = match (&failure, &outcome, locked) {
        (Some(_), _, _) => "failed",
        (None, _, true) => "in_use",
        (None, Some(_), false) => "restored",
        (None, None, false) => "not_restored",
    };

    write_response(json!({
        "dbpath": dbpath.display().to_string(),
        "state": state,
        "locked": locked,
        "outcome": outcome,
        "failure": failure,
    }))
}
