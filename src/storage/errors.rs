//! Storage error types
//!
//! Error codes:
//! - PITR_STORAGE_IO (FATAL)
//! - PITR_STORAGE_CORRUPTION (FATAL)
//! - PITR_STORAGE_OPLOG (FATAL, wraps an oplog failure)
//! - PITR_STORAGE_SNAPSHOT_TOO_OLD (ERROR)
//! - PITR_STORAGE_INVALID_NAMESPACE (ERROR)
//! - PITR_STORAGE_NAMESPACE_NOT_FOUND (ERROR)
//! - PITR_STORAGE_NAMESPACE_EXISTS (ERROR)
//! - PITR_STORAGE_DUPLICATE_KEY (ERROR)
//! - PITR_STORAGE_DOCUMENT_NOT_FOUND (ERROR)
//! - PITR_STORAGE_CHECKPOINT_PINNED (ERROR)
//! - PITR_STORAGE_LOCKED (ERROR)
//! - PITR_STORAGE_RESTORE_FAILED (FATAL)

use std::fmt;
use std::io;
use std::path::Path;

use crate::observability::Severity;
use crate::oplog::OplogError;
use crate::timestamp::Timestamp;

/// Storage error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Filesystem failure
    PitrStorageIo,
    /// Checksum, structure or consistency failure
    PitrStorageCorruption,
    /// Oplog failure underneath a storage operation
    PitrStorageOplog,
    /// Snapshot read below the oldest retained timestamp
    PitrStorageSnapshotTooOld,
    /// Namespace not of the `db.coll` form
    PitrStorageInvalidNamespace,
    /// Namespace missing from the catalog
    PitrStorageNamespaceNotFound,
    /// Namespace already in the catalog
    PitrStorageNamespaceExists,
    /// Insert of an existing document id
    PitrStorageDuplicateKey,
    /// Update or delete of a missing document id
    PitrStorageDocumentNotFound,
    /// Checkpoint refused while a backup cursor pins the current one
    PitrStorageCheckpointPinned,
    /// dbpath owned by another process or engine
    PitrStorageLocked,
    /// dbpath left behind by a failed restore
    PitrStorageRestoreFailed,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::PitrStorageIo => "PITR_STORAGE_IO",
            StorageErrorCode::PitrStorageCorruption => "PITR_STORAGE_CORRUPTION",
            StorageErrorCode::PitrStorageOplog => "PITR_STORAGE_OPLOG",
            StorageErrorCode::PitrStorageSnapshotTooOld => "PITR_STORAGE_SNAPSHOT_TOO_OLD",
            StorageErrorCode::PitrStorageInvalidNamespace => "PITR_STORAGE_INVALID_NAMESPACE",
            StorageErrorCode::PitrStorageNamespaceNotFound => "PITR_STORAGE_NAMESPACE_NOT_FOUND",
            StorageErrorCode::PitrStorageNamespaceExists => "PITR_STORAGE_NAMESPACE_EXISTS",
            StorageErrorCode::PitrStorageDuplicateKey => "PITR_STORAGE_DUPLICATE_KEY",
            StorageErrorCode::PitrStorageDocumentNotFound => "PITR_STORAGE_DOCUMENT_NOT_FOUND",
            StorageErrorCode::PitrStorageCheckpointPinned => "PITR_STORAGE_CHECKPOINT_PINNED",
            StorageErrorCode::PitrStorageLocked => "PITR_STORAGE_LOCKED",
            StorageErrorCode::PitrStorageRestoreFailed => "PITR_STORAGE_RESTORE_FAILED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::PitrStorageIo
            | StorageErrorCode::PitrStorageCorruption
            | StorageErrorCode::PitrStorageOplog
            | StorageErrorCode::PitrStorageRestoreFailed => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with context
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StorageError {
    fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Filesystem failure
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(Box::new(source)),
            ..Self::new(StorageErrorCode::PitrStorageIo, message)
        }
    }

    /// Filesystem failure at a path
    pub fn io_at_path(path: &Path, source: io::Error) -> Self {
        Self::io(format!("I/O error at {}", path.display()), source)
    }

    /// Corruption or inconsistency
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(StorageErrorCode::PitrStorageCorruption, message)
    }

    /// Snapshot read below the oldest retained timestamp
    pub fn snapshot_too_old(requested: Timestamp, oldest: Timestamp) -> Self {
        Self::new(
            StorageErrorCode::PitrStorageSnapshotTooOld,
            format!(
                "SnapshotTooOld: read at {} is older than the oldest available timestamp {}",
                requested, oldest
            ),
        )
    }

    /// Namespace not of the `db.coll` form
    pub fn invalid_namespace(namespace: &str) -> Self {
        Self::new(
            StorageErrorCode::PitrStorageInvalidNamespace,
            format!("Invalid namespace '{}': expected db.collection", namespace),
        )
    }

    /// Namespace missing
    pub fn namespace_not_found(namespace: &str) -> Self {
        Self::new(
            StorageErrorCode::PitrStorageNamespaceNotFound,
            format!("Namespace not found: {}", namespace),
        )
    }

    /// Namespace already present
    pub fn namespace_exists(namespace: &str) -> Self {
        Self::new(
            StorageErrorCode::PitrStorageNamespaceExists,
            format!("Namespace already exists: {}", namespace),
        )
    }

    /// Duplicate document id
    pub fn duplicate_key(namespace: &str, document_id: &str) -> Self {
        Self::new(
            StorageErrorCode::PitrStorageDuplicateKey,
            format!("Duplicate key {} in {}", document_id, namespace),
        )
    }

    /// Missing document id
    pub fn document_not_found(namespace: &str, document_id: &str) -> Self {
        Self::new(
            StorageErrorCode::PitrStorageDocumentNotFound,
            format!("Document {} not found in {}", document_id, namespace),
        )
    }

    /// Checkpoint pinned by a backup cursor
    pub fn checkpoint_pinned() -> Self {
        Self::new(
            StorageErrorCode::PitrStorageCheckpointPinned,
            "A backup cursor is open; checkpoints are pinned until it closes",
        )
    }

    /// dbpath lock already held
    pub fn locked(dbpath: &Path) -> Self {
        Self::new(
            StorageErrorCode::PitrStorageLocked,
            format!("dbpath {} is in use (lock file present)", dbpath.display()),
        )
    }

    /// dbpath left behind by a failed restore
    pub fn restore_failed(dbpath: &Path) -> Self {
        Self::new(
            StorageErrorCode::PitrStorageRestoreFailed,
            format!(
                "dbpath {} was left by a failed restore and must be discarded",
                dbpath.display()
            ),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
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

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns true for a snapshot-too-old read failure
    pub fn is_snapshot_too_old(&self) -> bool {
        self.code == StorageErrorCode::PitrStorageSnapshotTooOld
    }
}

impl From<OplogError> for StorageError {
    fn from(e: OplogError) -> Self {
        Self {
            code: StorageErrorCode::PitrStorageOplog,
            message: e.message().to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_too_old_message() {
        let err = StorageError::snapshot_too_old(Timestamp::new(1, 1), Timestamp::new(2, 1));
        assert!(err.is_snapshot_too_old());
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("SnapshotTooOld"));
    }

    #[test]
    fn test_oplog_errors_wrap_as_fatal() {
        let err: StorageError = OplogError::corruption("bad record").into();
        assert_eq!(err.code(), StorageErrorCode::PitrStorageOplog);
        assert!(err.is_fatal());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_is_fatal() {
        let err = StorageError::io("copy", io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("disk"));
    }
}
