//! Restore engine as a subprocess
//!
//! The `restore` command runs the engine in its own process, so a crash
//! or abort cannot take the orchestrator with it. The orchestrator polls
//! `try_wait` against a deadline and kills the child when it expires.
//! The child's stdout is discarded; its outcome is read back from the
//! dbpath.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::errors::{SessionError, SessionResult};
use crate::observability::{log_event_with_fields, Event};

/// How to launch the engine
#[derive(Debug, Clone)]
pub struct EngineCommand {
    program: PathBuf,
    tool_config: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl EngineCommand {
    /// Launch `program` (a `pitrestore` binary)
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            tool_config: None,
            env: Vec::new(),
        }
    }

    /// The running binary
    pub fn current_exe() -> SessionResult<Self> {
        let exe = std::env::current_exe().map_err(|e| SessionError::io("current_exe", e))?;
        Ok(Self::new(exe))
    }

    /// Pass `--config <path>`
    pub fn tool_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_config = Some(path.into());
        self
    }

    /// Set an environment variable on the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn build(&self, dbpath: &Path, channel: &Path) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(config) = &self.tool_config {
            command.arg("--config").arg(config);
        }
        command
            .arg("restore")
            .arg("--dbpath")
            .arg(dbpath)
            .arg("--channel")
            .arg(channel)
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

/// A running engine subprocess
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    dbpath: PathBuf,
    started: Instant,
}

impl EngineProcess {
    /// Start the engine on `dbpath`, reading `channel`
    pub fn spawn(command: &EngineCommand, dbpath: &Path, channel: &Path) -> SessionResult<Self> {
        let child = command
            .build(dbpath, channel)
            .spawn()
            .map_err(|e| SessionError::Spawn {
                program: command.program.clone(),
                source: e,
            })?;

        log_event_with_fields(
            Event::EngineSpawned,
            &[
                ("pid", &child.id().to_string()),
                ("dbpath", &dbpath.display().to_string()),
            ],
        );
        Ok(Self {
            child,
            dbpath: dbpath.to_path_buf(),
            started: Instant::now(),
        })
    }

    /// Child process id
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Poll until the child exits or `timeout` passes.
    ///
    /// # Errors
    ///
    /// `EngineTimedOut` after killing a child that outlived `timeout`.
    pub fn wait(mut self, timeout: Duration, interval: Duration) -> SessionResult<ExitStatus> {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    log_event_with_fields(
                        Event::EngineExited,
                        &[
                            ("dbpath", &self.dbpath.display().to_string()),
                            ("status", &describe(&status)),
                            ("elapsed_ms", &self.started.elapsed().as_millis().to_string()),
                        ],
                    );
                    return Ok(status);
                }
                Ok(None) => {}
                Err(e) => return Err(SessionError::io(&self.dbpath, e)),
            }

            let elapsed = self.started.elapsed();
            if elapsed >= timeout {
                let _ = self.child.kill();
                let _ = self.child.wait();
                return Err(SessionError::EngineTimedOut {
                    dbpath: self.dbpath,
                    waited_ms: elapsed.as_millis(),
                });
            }
            thread::sleep(interval.min(timeout - elapsed));
        }
    }

    /// Wait, treating any non-zero exit as failure
    pub fn wait_for_success(self, timeout: Duration, interval: Duration) -> SessionResult<()> {
        let dbpath = self.dbpath.clone();
        let status = self.wait(timeout, interval)?;
        if !status.success() {
            return Err(SessionError::EngineFailed {
                dbpath,
                status: describe(&status),
            });
        }
        Ok(())
    }
}

fn describe(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}
