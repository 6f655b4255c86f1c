//! Tool configuration file
//!
//! Optional JSON document passed with `--config`. Every field has a
//! default, so an absent file and `{}` behave the same. Unknown fields
//! are rejected.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::channel::RetryPolicy;
use crate::observability::Severity;

/// Configuration of the `pitrestore` binary itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// How long the engine waits for its channel to appear
    #[serde(default = "default_channel_timeout_ms")]
    pub channel_timeout_ms: u64,

    /// Sleep between readiness and exit polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long an orchestrator waits for an engine subprocess
    #[serde(default = "default_engine_exit_timeout_ms")]
    pub engine_exit_timeout_ms: u64,

    /// Minimum log severity; `PITR_LOG_LEVEL` overrides it
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_channel_timeout_ms() -> u64 {
    10_000
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_engine_exit_timeout_ms() -> u64 {
    60_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            channel_timeout_ms: default_channel_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            engine_exit_timeout_ms: default_engine_exit_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl ToolConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let config: ToolConfig = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> CliResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(CliError::config_error("poll_interval_ms must be > 0"));
        }

        if self.poll_interval_ms > self.channel_timeout_ms {
            return Err(CliError::config_error(format!(
                "poll_interval_ms ({}) exceeds channel_timeout_ms ({})",
                self.poll_interval_ms, self.channel_timeout_ms
            )));
        }

        if self.engine_exit_timeout_ms == 0 {
            return Err(CliError::config_error("engine_exit_timeout_ms must be > 0"));
        }

        if Severity::parse(&self.log_level).is_none() {
            return Err(CliError::config_error(format!(
                "Invalid log_level: '{}'. Expected trace, info, warn, error or fatal.",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Channel readiness policy for the engine
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.channel_timeout_ms),
            self.poll_interval(),
        )
    }

    /// Sleep between polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Deadline for an engine subprocess
    pub fn engine_exit_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_exit_timeout_ms)
    }

    /// Configured minimum severity
    pub fn severity(&self) -> Severity {
        Severity::parse(&self.log_level).unwrap_or(Severity::Info)
    }
}
