//! Backup error types
//!
//! Error codes:
//! - PITR_BACKUP_CHECKPOINT_FAILED (FATAL): the source could not checkpoint
//! - PITR_BACKUP_IO (FATAL): copy or fsync failure while staging
//! - PITR_BACKUP_CURSOR_BUSY (ERROR): another cursor is open on the source
//! - PITR_BACKUP_CURSOR_CLOSED (ERROR): operation on a closed cursor
//! - PITR_BACKUP_INVALID_EXTEND (ERROR): extend with a bad id or bound
//! - PITR_BACKUP_MANIFEST (ERROR): manifest read/write failure
//!
//! A failed backup never damages the source; fatal here means the staged
//! copy must be thrown away.

use std::fmt;
use std::io;

use crate::observability::Severity;
use crate::storage::StorageError;

/// Backup error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupErrorCode {
    /// Checkpoint precondition failed
    PitrBackupCheckpointFailed,
    /// I/O failure during staging
    PitrBackupIo,
    /// A cursor is already open on the source
    PitrBackupCursorBusy,
    /// Cursor already closed
    PitrBackupCursorClosed,
    /// Extend rejected
    PitrBackupInvalidExtend,
    /// Manifest read/write failure
    PitrBackupManifest,
}

impl BackupErrorCode {
    /// Returns the string code
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupErrorCode::PitrBackupCheckpointFailed => "PITR_BACKUP_CHECKPOINT_FAILED",
            BackupErrorCode::PitrBackupIo => "PITR_BACKUP_IO",
            BackupErrorCode::PitrBackupCursorBusy => "PITR_BACKUP_CURSOR_BUSY",
            BackupErrorCode::PitrBackupCursorClosed => "PITR_BACKUP_CURSOR_CLOSED",
            BackupErrorCode::PitrBackupInvalidExtend => "PITR_BACKUP_INVALID_EXTEND",
            BackupErrorCode::PitrBackupManifest => "PITR_BACKUP_MANIFEST",
        }
    }

    /// Returns the severity level for this error code
    pub fn severity(&self) -> Severity {
        match self {
            BackupErrorCode::PitrBackupCheckpointFailed | BackupErrorCode::PitrBackupIo => {
                Severity::Fatal
            }
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for BackupErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backup error with full context
#[derive(Debug)]
pub struct BackupError {
    code: BackupErrorCode,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BackupError {
    fn new(code: BackupErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// The source failed to take the checkpoint a cursor needs
    pub fn checkpoint_failed(source: StorageError) -> Self {
        Self {
            source: Some(Box::new(source)),
            ..Self::new(
                BackupErrorCode::PitrBackupCheckpointFailed,
                "Source checkpoint failed; no backup cursor opened",
            )
        }
    }

    /// Creates an I/O error during staging
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(Box::new(source)),
            ..Self::new(BackupErrorCode::PitrBackupIo, message)
        }
    }

    /// Creates an I/O error at a specific path
    pub fn io_error_at_path(path: &std::path::Path, source: io::Error) -> Self {
        Self::io_error(format!("I/O error at {}", path.display()), source)
    }

    /// Source storage failure while reading backup state
    pub fn storage(message: impl Into<String>, source: StorageError) -> Self {
        Self {
            source: Some(Box::new(source)),
            ..Self::new(BackupErrorCode::PitrBackupIo, message)
        }
    }

    /// A cursor is already open on the source
    pub fn cursor_busy() -> Self {
        Self::new(
            BackupErrorCode::PitrBackupCursorBusy,
            "A backup cursor is already open on this source",
        )
    }

    /// Operation on a closed cursor
    pub fn cursor_closed() -> Self {
        Self::new(
            BackupErrorCode::PitrBackupCursorClosed,
            "Backup cursor is already closed",
        )
    }

    /// Extend rejected
    pub fn invalid_extend(message: impl Into<String>) -> Self {
        Self::new(BackupErrorCode::PitrBackupInvalidExtend, message)
    }

    /// Creates a manifest error
    pub fn manifest_failed(message: impl Into<String>) -> Self {
        Self::new(BackupErrorCode::PitrBackupManifest, message)
    }

    /// Returns the error code
    pub fn code(&self) -> BackupErrorCode {
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

    /// Returns whether the staged copy is unusable
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for BackupError {
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

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
