//! Crash test harness for subprocess management
//!
//! Runs the compiled `pitrestore` binary, optionally with a crash point
//! armed, and captures what it printed.

use std::ffi::OsStr;
use std::process::{Command, ExitStatus, Stdio};

use pitrestore::crash_point::CRASH_POINT_ENV;
use serde_json::Value;

/// Result of one binary execution
#[derive(Debug)]
pub struct CliRun {
    /// Exit status
    pub status: ExitStatus,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
}

impl CliRun {
    /// True if the process exited non-zero or was killed by a signal
    pub fn crashed_or_failed(&self) -> bool {
        !self.status.success()
    }

    /// The `{"status": ...}` response line, skipping log lines
    pub fn response(&self) -> Option<Value> {
        self.stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .find(|v| v.get("status").is_some() && v.get("event").is_none())
    }
}

/// Path of the binary under test
pub fn pitrestore_bin() -> &'static str {
    env!("CARGO_BIN_EXE_pitrestore")
}

/// Run `pitrestore <args>`, with `crash_point` armed if given
pub fn run_cli<I, S>(args: I, crash_point: Option<&str>) -> CliRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(pitrestore_bin());
    command.args(args).stdin(Stdio::null());
    match crash_point {
        Some(point) => command.env(CRASH_POINT_ENV, point),
        None => command.env_remove(CRASH_POINT_ENV),
    };

    let output = command.output().expect("failed to run pitrestore");
    CliRun {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

/// Report crash test failure
pub fn report_failure(crash_point: &str, expected: &str, run: &CliRun) {
    eprintln!("=== CRASH TEST FAILURE ===");
    eprintln!("Crash point: {}", crash_point);
    eprintln!("Expected: {}", expected);
    eprintln!("Status: {:?}", run.status);
    eprintln!("stdout:\n{}", run.stdout);
    eprintln!("stderr:\n{}", run.stderr);
    eprintln!("==========================");
}
