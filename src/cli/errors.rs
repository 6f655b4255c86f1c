//! CLI-specific error types
//!
//! Every CLI error ends the process. Errors in the tool's own
//! configuration exit with 2; anything raised by a restore, backup or
//! verification exits with 1 and carries the underlying subsystem code.

use std::fmt;
use std::io;

use crate::restore::{RestoreError, RestoreErrorCode};
use crate::session::SessionError;
use crate::storage::{StorageError, StorageErrorCode};
use crate::verify::{VerifyError, VerifyErrorCode};

/// Exit status of a clean run
pub const EXIT_CLEAN: i32 = 0;
/// Exit status of a fatal restore, backup or verification failure
pub const EXIT_FATAL: i32 = 1;
/// Exit status of a usage or tool-configuration error
pub const EXIT_USAGE: i32 = 2;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Tool configuration file error
    ConfigError,
    /// I/O error (stdout, fingerprint files)
    IoError,
    /// Backup staging or orchestration failed
    BackupFailed,
    /// Restore engine failure
    Restore(RestoreErrorCode),
    /// Verification failure
    Verify(VerifyErrorCode),
    /// dbpath could not be opened
    Storage(StorageErrorCode),
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "PITR_CLI_CONFIG_ERROR",
            Self::IoError => "PITR_CLI_IO_ERROR",
            Self::BackupFailed => "PITR_CLI_BACKUP_FAILED",
            Self::Restore(code) => code.as_str(),
            Self::Verify(code) => code.as_str(),
            Self::Storage(code) => code.code(),
        }
    }

    /// Process exit status for this code
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError => EXIT_USAGE,
            _ => EXIT_FATAL,
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Backup failed
    pub fn backup_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BackupFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Process exit status
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<RestoreError> for CliError {
    fn from(e: RestoreError) -> Self {
        Self::new(CliErrorCode::Restore(e.code()), e.message())
    }
}

impl From<VerifyError> for CliError {
    fn from(e: VerifyError) -> Self {
        Self::new(CliErrorCode::Verify(e.code()), e.message())
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        Self::new(CliErrorCode::Storage(e.code()), e.message())
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Restore(err) => err.into(),
            other => Self::backup_failed(other.to_string()),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_exit_with_usage_status() {
        assert_eq!(CliError::config_error("bad").exit_code(), EXIT_USAGE);
        assert_eq!(CliError::backup_failed("bad").exit_code(), EXIT_FATAL);
    }

    #[test]
    fn test_restore_error_keeps_its_code() {
        let err: CliError = RestoreError::config("no configuration").into();
        assert_eq!(err.code_str(), "PITR_RESTORE_CONFIG");
        assert_eq!(err.exit_code(), EXIT_FATAL);
        assert_eq!(err.message(), "no configuration");
    }

    #[test]
    fn test_session_restore_error_unwraps() {
        let err: CliError = SessionError::Restore(RestoreError::failed("boom")).into();
        assert_eq!(err.code_str(), "PITR_RESTORE_FAILED");

        let err: CliError = SessionError::NamespaceNotInBackup("db.x".into()).into();
        assert_eq!(err.code(), CliErrorCode::BackupFailed);
        assert!(err.message().contains("db.x"));
    }
}
