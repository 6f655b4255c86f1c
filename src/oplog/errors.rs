//! Oplog error types
//!
//! Error codes:
//! - PITR_OPLOG_APPEND_FAILED (ERROR)
//! - PITR_OPLOG_FSYNC_FAILED (FATAL)
//! - PITR_OPLOG_CORRUPTION (FATAL)
//! - PITR_OPLOG_ORDERING (FATAL)
//! - PITR_OPLOG_EMPTY_TAIL (ERROR)

use std::fmt;
use std::io;

use crate::observability::Severity;
use crate::timestamp::Timestamp;

/// Oplog error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OplogErrorCode {
    /// Oplog write failed
    PitrOplogAppendFailed,
    /// Oplog fsync failed
    PitrOplogFsyncFailed,
    /// Checksum or structural failure while reading
    PitrOplogCorruption,
    /// Timestamps not strictly increasing
    PitrOplogOrdering,
    /// A point-in-time tail was requested but no entries exist
    PitrOplogEmptyTail,
}

impl OplogErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            OplogErrorCode::PitrOplogAppendFailed => "PITR_OPLOG_APPEND_FAILED",
            OplogErrorCode::PitrOplogFsyncFailed => "PITR_OPLOG_FSYNC_FAILED",
            OplogErrorCode::PitrOplogCorruption => "PITR_OPLOG_CORRUPTION",
            OplogErrorCode::PitrOplogOrdering => "PITR_OPLOG_ORDERING",
            OplogErrorCode::PitrOplogEmptyTail => "PITR_OPLOG_EMPTY_TAIL",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            OplogErrorCode::PitrOplogAppendFailed => Severity::Error,
            OplogErrorCode::PitrOplogFsyncFailed => Severity::Fatal,
            OplogErrorCode::PitrOplogCorruption => Severity::Fatal,
            OplogErrorCode::PitrOplogOrdering => Severity::Fatal,
            OplogErrorCode::PitrOplogEmptyTail => Severity::Error,
        }
    }
}

impl fmt::Display for OplogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Oplog error with context
#[derive(Debug)]
pub struct OplogError {
    code: OplogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl OplogError {
    fn new(
        code: OplogErrorCode,
        message: impl Into<String>,
        details: Option<String>,
        source: Option<io::Error>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            source,
        }
    }

    /// Write to the oplog failed
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(OplogErrorCode::PitrOplogAppendFailed, message, None, Some(source))
    }

    /// fsync of the oplog failed
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(OplogErrorCode::PitrOplogFsyncFailed, message, None, Some(source))
    }

    /// Corruption detected
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(OplogErrorCode::PitrOplogCorruption, message, None, None)
    }

    /// Corruption detected at a byte offset
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self::new(
            OplogErrorCode::PitrOplogCorruption,
            reason,
            Some(format!("byte_offset: {}", offset)),
            None,
        )
    }

    /// Entry timestamp does not advance past its predecessor
    pub fn out_of_order(previous: Timestamp, next: Timestamp) -> Self {
        Self::new(
            OplogErrorCode::PitrOplogOrdering,
            format!("Oplog timestamps must strictly increase: {} followed by {}", previous, next),
            Some(format!("timestamp: {}", next)),
            None,
        )
    }

    /// No entries found after the checkpoint for a point-in-time tail
    pub fn empty_tail(after: Timestamp) -> Self {
        Self::new(
            OplogErrorCode::PitrOplogEmptyTail,
            format!("No oplog entries after {} for point-in-time restore", after),
            None,
            None,
        )
    }

    /// Returns the error code
    pub fn code(&self) -> OplogErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for OplogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for OplogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for oplog operations
pub type OplogResult<T> = Result<T, OplogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(OplogErrorCode::PitrOplogCorruption.code(), "PITR_OPLOG_CORRUPTION");
        assert_eq!(OplogErrorCode::PitrOplogOrdering.code(), "PITR_OPLOG_ORDERING");
        assert_eq!(OplogErrorCode::PitrOplogEmptyTail.code(), "PITR_OPLOG_EMPTY_TAIL");
    }

    #[test]
    fn test_ordering_violation_is_fatal() {
        let err = OplogError::out_of_order(Timestamp::new(5, 2), Timestamp::new(5, 1));
        assert!(err.is_fatal());
        let display = err.to_string();
        assert!(display.contains("PITR_OPLOG_ORDERING"));
        assert!(display.contains("Timestamp(5, 1)"));
    }

    #[test]
    fn test_append_failure_is_not_fatal() {
        let err = OplogError::append_failed("write failed", io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_empty_tail_is_error_severity() {
        let err = OplogError::empty_tail(Timestamp::new(1, 1));
        assert_eq!(err.severity(), Severity::Error);
    }
}
