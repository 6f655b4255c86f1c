//! Restore error types
//!
//! All restore errors are FATAL. The engine never retries: a failed
//! restore leaves its dbpath locked and marked, and the operator discards
//! it.
//!
//! Error codes:
//! - PITR_RESTORE_CONFIG: restore configuration absent, malformed or
//!   inconsistent with the staged data
//! - PITR_RESTORE_ORDERING: log entries out of order or out of range
//! - PITR_RESTORE_IO: filesystem failure
//! - PITR_RESTORE_CORRUPTION: staged checkpoint inconsistent
//! - PITR_RESTORE_CONTENTION: dbpath already owned
//! - PITR_RESTORE_FAILED: anything else

use std::fmt;

use crate::observability::Severity;
use crate::storage::{StorageError, StorageErrorCode};
use crate::timestamp::Timestamp;

/// Restore error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreErrorCode {
    /// Configuration error
    PitrRestoreConfig,
    /// Log ordering violation
    PitrRestoreOrdering,
    /// I/O failure
    PitrRestoreIo,
    /// Staged checkpoint inconsistent
    PitrRestoreCorruption,
    /// dbpath lock held by another owner
    PitrRestoreContention,
    /// General restore failure
    PitrRestoreFailed,
}

impl RestoreErrorCode {
    /// Returns the string code
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreErrorCode::PitrRestoreConfig => "PITR_RESTORE_CONFIG",
            RestoreErrorCode::PitrRestoreOrdering => "PITR_RESTORE_ORDERING",
            RestoreErrorCode::PitrRestoreIo => "PITR_RESTORE_IO",
            RestoreErrorCode::PitrRestoreCorruption => "PITR_RESTORE_CORRUPTION",
            RestoreErrorCode::PitrRestoreContention => "PITR_RESTORE_CONTENTION",
            RestoreErrorCode::PitrRestoreFailed => "PITR_RESTORE_FAILED",
        }
    }

    /// All restore errors are FATAL
    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

impl fmt::Display for RestoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Restore error with full context
#[derive(Debug)]
pub struct RestoreError {
    code: RestoreErrorCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl RestoreError {
    fn new(code: RestoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::PitrRestoreConfig, message)
    }

    /// Configuration error with a cause
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::config(message).with_source(source)
    }

    /// Entry not strictly after its predecessor
    pub fn out_of_order(previous: Timestamp, next: Timestamp) -> Self {
        Self::new(
            RestoreErrorCode::PitrRestoreOrdering,
            format!(
                "Log entry {} does not follow previous entry {}",
                next, previous
            ),
        )
    }

    /// Entry outside `(checkpoint, pit]`
    pub fn out_of_range(entry: Timestamp, checkpoint: Timestamp, pit: Timestamp) -> Self {
        Self::new(
            RestoreErrorCode::PitrRestoreOrdering,
            format!(
                "Log entry {} outside replay window ({}, {}]",
                entry, checkpoint, pit
            ),
        )
    }

    /// I/O failure
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::new(RestoreErrorCode::PitrRestoreIo, message).with_source(source)
    }

    /// Staged checkpoint inconsistency
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::PitrRestoreCorruption, message)
    }

    /// General failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(RestoreErrorCode::PitrRestoreFailed, message)
    }

    /// Returns the error code
    pub fn code(&self) -> RestoreErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the severity of this error
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Restore errors are always fatal
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl From<StorageError> for RestoreError {
    fn from(err: StorageError) -> Self {
        let code = match err.code() {
            StorageErrorCode::PitrStorageLocked => RestoreErrorCode::PitrRestoreContention,
            StorageErrorCode::PitrStorageIo => RestoreErrorCode::PitrRestoreIo,
            StorageErrorCode::PitrStorageCorruption
            | StorageErrorCode::PitrStorageOplog
            | StorageErrorCode::PitrStorageInvalidNamespace
            | StorageErrorCode::PitrStorageNamespaceNotFound
            | StorageErrorCode::PitrStorageNamespaceExists
            | StorageErrorCode::PitrStorageDuplicateKey
            | StorageErrorCode::PitrStorageDocumentNotFound => {
                RestoreErrorCode::PitrRestoreCorruption
            }
            StorageErrorCode::PitrStorageSnapshotTooOld
            | StorageErrorCode::PitrStorageCheckpointPinned
            | StorageErrorCode::PitrStorageRestoreFailed => RestoreErrorCode::PitrRestoreFailed,
        };
        Self::new(code, err.message().to_string()).with_source(err)
    }
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code,
            self.message
        )?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for RestoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type for restore operations
pub type RestoreResult<T> = Result<T, RestoreError>;
