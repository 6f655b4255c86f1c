//! Observable events
//!
//! Every log line emitted by the restore pipeline names one of these
//! events. Events are explicit and typed.

use std::fmt;

/// Observable events in the backup / restore pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Tool lifecycle
    /// Tool configuration loaded
    ConfigLoaded,

    // Source storage
    /// Source checkpoint taken
    CheckpointTaken,
    /// Oplog fsynced
    OplogFsync,
    /// Oplog truncated after a timestamp
    OplogTruncated,

    // Backup cursor / copier
    /// Backup cursor opened
    BackupCursorOpened,
    /// Backup cursor extended
    BackupCursorExtended,
    /// Backup cursor closed
    BackupCursorClosed,
    /// One manifest file copied
    FileCopied,
    /// Manifest file skipped by selective restore
    FileSkipped,

    // Configuration channel
    /// Channel published by the writer
    ChannelPublished,
    /// Channel opened by the reader
    ChannelOpened,
    /// Channel consumed and removed
    ChannelConsumed,

    // Restore engine
    /// Restore started
    RestoreStart,
    /// State machine transition
    RestoreTransition,
    /// Collection dropped by selective restore
    CollectionDropped,
    /// Oplog entry replayed
    ReplayEntry,
    /// Oplog entry skipped (excluded namespace)
    ReplaySkipped,
    /// Higher-term no-op applied
    HigherTermNoop,
    /// Restore complete
    RestoreComplete,
    /// Restore failed (FATAL)
    RestoreFailed,

    // Orchestration
    /// Engine subprocess spawned
    EngineSpawned,
    /// Engine subprocess exited
    EngineExited,
    /// Staged dbpath discarded
    StagingDiscarded,

    // Verification
    /// Verification passed
    VerifyPassed,
    /// Verification failed
    VerifyFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::CheckpointTaken => "CHECKPOINT_TAKEN",
            Event::OplogFsync => "OPLOG_FSYNC",
            Event::OplogTruncated => "OPLOG_TRUNCATED",

            Event::BackupCursorOpened => "BACKUP_CURSOR_OPENED",
            Event::BackupCursorExtended => "BACKUP_CURSOR_EXTENDED",
            Event::BackupCursorClosed => "BACKUP_CURSOR_CLOSED",
            Event::FileCopied => "BACKUP_FILE_COPIED",
            Event::FileSkipped => "BACKUP_FILE_SKIPPED",

            Event::ChannelPublished => "CHANNEL_PUBLISHED",
            Event::ChannelOpened => "CHANNEL_OPENED",
            Event::ChannelConsumed => "CHANNEL_CONSUMED",

            Event::RestoreStart => "RESTORE_BEGIN",
            Event::RestoreTransition => "RESTORE_TRANSITION",
            Event::CollectionDropped => "RESTORE_COLLECTION_DROPPED",
            Event::ReplayEntry => "REPLAY_ENTRY",
            Event::ReplaySkipped => "REPLAY_SKIPPED",
            Event::HigherTermNoop => "RESTORE_HIGHER_TERM_NOOP",
            Event::RestoreComplete => "RESTORE_COMPLETE",
            Event::RestoreFailed => "RESTORE_FAILED",

            Event::EngineSpawned => "ENGINE_SPAWNED",
            Event::EngineExited => "ENGINE_EXITED",
            Event::StagingDiscarded => "STAGING_DISCARDED",

            Event::VerifyPassed => "VERIFY_PASSED",
            Event::VerifyFailed => "VERIFY_FAILED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::RestoreFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake() {
        let events = [
            Event::ConfigLoaded,
            Event::CheckpointTaken,
            Event::OplogTruncated,
            Event::BackupCursorOpened,
            Event::BackupCursorExtended,
            Event::FileCopied,
            Event::ChannelPublished,
            Event::RestoreStart,
            Event::RestoreTransition,
            Event::HigherTermNoop,
            Event::RestoreFailed,
            Event::EngineExited,
            Event::VerifyFailed,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_only_restore_failure_is_fatal() {
        assert!(Event::RestoreFailed.is_fatal());
        assert!(!Event::RestoreComplete.is_fatal());
        assert!(!Event::VerifyFailed.is_fatal());
    }
}
