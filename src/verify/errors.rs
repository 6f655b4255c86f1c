//! Verification error types
//!
//! Error codes:
//! - PITR_VERIFY_MIN_VALID (ERROR): minValid is not the restore sentinel
//! - PITR_VERIFY_STABLE_TIMESTAMP (ERROR): stable checkpoint absent or wrong
//! - PITR_VERIFY_SNAPSHOT_BOUNDARY (ERROR): history survives below stable,
//!   or a read at stable fails
//! - PITR_VERIFY_CONFIG_TERM (ERROR): replica-set term not as expected
//! - PITR_VERIFY_DATA_MISMATCH (ERROR): namespaces or content differ
//! - PITR_VERIFY_STORAGE (FATAL): the restored node could not be read

use std::fmt;

use crate::observability::Severity;
use crate::storage::StorageError;

/// Verification error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyErrorCode {
    /// minValid mismatch
    PitrVerifyMinValid,
    /// Stable timestamp mismatch
    PitrVerifyStableTimestamp,
    /// Snapshot boundary violated
    PitrVerifySnapshotBoundary,
    /// Config term mismatch
    PitrVerifyConfigTerm,
    /// Restored data differs
    PitrVerifyDataMismatch,
    /// Restored node unreadable
    PitrVerifyStorage,
}

impl VerifyErrorCode {
    /// Returns the string code
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyErrorCode::PitrVerifyMinValid => "PITR_VERIFY_MIN_VALID",
            VerifyErrorCode::PitrVerifyStableTimestamp => "PITR_VERIFY_STABLE_TIMESTAMP",
            VerifyErrorCode::PitrVerifySnapshotBoundary => "PITR_VERIFY_SNAPSHOT_BOUNDARY",
            VerifyErrorCode::PitrVerifyConfigTerm => "PITR_VERIFY_CONFIG_TERM",
            VerifyErrorCode::PitrVerifyDataMismatch => "PITR_VERIFY_DATA_MISMATCH",
            VerifyErrorCode::PitrVerifyStorage => "PITR_VERIFY_STORAGE",
        }
    }

    /// Returns the severity level for this error code
    pub fn severity(&self) -> Severity {
        match self {
            VerifyErrorCode::PitrVerifyStorage => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for VerifyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verification failure
#[derive(Debug)]
pub struct VerifyError {
    code: VerifyErrorCode,
    message: String,
    source: Option<StorageError>,
}

impl VerifyError {
    fn new(code: VerifyErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// minValid mismatch
    pub fn min_valid(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorCode::PitrVerifyMinValid, message)
    }

    /// Stable timestamp mismatch
    pub fn stable_timestamp(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorCode::PitrVerifyStableTimestamp, message)
    }

    /// Snapshot boundary violated
    pub fn snapshot_boundary(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorCode::PitrVerifySnapshotBoundary, message)
    }

    /// Config term mismatch
    pub fn config_term(expected: i64, actual: i64) -> Self {
        Self::new(
            VerifyErrorCode::PitrVerifyConfigTerm,
            format!("Expected replica-set term {}, found {}", expected, actual),
        )
    }

    /// Restored data differs
    pub fn data_mismatch(message: impl Into<String>) -> Self {
        Self::new(VerifyErrorCode::PitrVerifyDataMismatch, message)
    }

    /// Restored node unreadable
    pub fn storage(message: impl Into<String>, source: StorageError) -> Self {
        Self {
            source: Some(source),
            ..Self::new(VerifyErrorCode::PitrVerifyStorage, message)
        }
    }

    /// Returns the error code
    pub fn code(&self) -> VerifyErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the node could not be read at all
    pub fn is_fatal(&self) -> bool {
        self.code.severity() == Severity::Fatal
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for verification
pub type VerifyResult<T> = Result<T, VerifyError>;
