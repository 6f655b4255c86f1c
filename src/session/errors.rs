//! Session errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::backup::BackupError;
use crate::channel::ChannelError;
use crate::oplog::OplogError;
use crate::restore::RestoreError;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum SessionError {
    // Staging
    #[error("Staging dbpath {} already exists", .0.display())]
    StagingExists(PathBuf),

    #[error("Namespace {0} was requested but is not in the backup")]
    NamespaceNotInBackup(String),

    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("Staged log tail unreadable: {0}")]
    Oplog(#[from] OplogError),

    // Configuration
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // Engine
    #[error("Restore failed: {0}")]
    Restore(#[from] RestoreError),

    #[error("Failed to spawn restore engine {}: {source}", .program.display())]
    Spawn { program: PathBuf, source: io::Error },

    #[error("Restore engine for {} did not exit within {waited_ms} ms", .dbpath.display())]
    EngineTimedOut { dbpath: PathBuf, waited_ms: u128 },

    #[error("Restore engine for {} exited with {status}", .dbpath.display())]
    EngineFailed { dbpath: PathBuf, status: String },

    #[error("Restore thread for {} panicked", .0.display())]
    EnginePanicked(PathBuf),

    #[error("I/O error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SessionError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures of the engine subprocess itself
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            SessionError::EngineTimedOut { .. }
                | SessionError::EngineFailed { .. }
                | SessionError::EnginePanicked(_)
        )
    }
}
