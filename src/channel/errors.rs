//! Channel errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::timestamp::Timestamp;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Restore channel errors
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {} not ready after {waited_ms} ms", .path.display())]
    NotReady { path: PathBuf, waited_ms: u128 },

    #[error("channel {} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("channel I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("channel header invalid: {0}")]
    BadHeader(String),

    #[error("channel frame truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("channel frame checksum mismatch at offset {offset}")]
    ChecksumMismatch { offset: usize },

    #[error("channel frame at offset {offset} is not valid JSON: {source}")]
    Malformed {
        offset: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("channel has no restore configuration frame")]
    MissingConfig,

    #[error("channel ended without an end-of-stream marker")]
    MissingEndMarker,

    #[error("channel has {0} bytes after the end-of-stream marker")]
    TrailingData(usize),

    #[error("channel entries out of order: {next} after {previous}")]
    OutOfOrder { previous: Timestamp, next: Timestamp },
}

impl ChannelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ChannelError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether waiting longer could help
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ChannelError::NotReady { .. })
    }
}
