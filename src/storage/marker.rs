//! Checkpoint marker (`checkpoint.json`)
//!
//! Records the timestamp the on-disk data files are consistent at, and the
//! oldest timestamp snapshot reads may use. Written atomically after the
//! data files and oplog are fsynced.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{StorageError, StorageResult};
use super::fsutil;
use crate::timestamp::Timestamp;

/// Checkpoint marker data structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMarker {
    /// Timestamp the data files are consistent at
    pub checkpoint_timestamp: Timestamp,

    /// Oldest timestamp with retained history
    pub oldest_timestamp: Timestamp,

    /// Whether this checkpoint was taken at a stable recovery timestamp
    pub stable: bool,

    /// Wall-clock creation time (RFC3339)
    pub created_at: String,

    /// Format version (always 1)
    pub format_version: u8,
}

impl CheckpointMarker {
    /// Marker for a routine checkpoint
    pub fn new(checkpoint_timestamp: Timestamp, oldest_timestamp: Timestamp) -> Self {
        Self {
            checkpoint_timestamp,
            oldest_timestamp,
            stable: false,
            created_at: chrono::Utc::now().to_rfc3339(),
            format_version: 1,
        }
    }

    /// Marker for a stable checkpoint; history below `stable_timestamp` is gone
    pub fn stable(stable_timestamp: Timestamp) -> Self {
        Self {
            checkpoint_timestamp: stable_timestamp,
            oldest_timestamp: stable_timestamp,
            stable: true,
            created_at: chrono::Utc::now().to_rfc3339(),
            format_version: 1,
        }
    }

    /// Writes the marker atomically with fsync
    pub fn write_to_file(&self, path: &Path) -> StorageResult<()> {
        fsutil::write_json(path, self).map_err(|e| StorageError::io_at_path(path, e))
    }

    /// Reads a marker, rejecting unknown format versions
    pub fn read_from_file(path: &Path) -> StorageResult<Self> {
        let marker: Self =
            fsutil::read_json(path).map_err(|e| StorageError::io_at_path(path, e))?;
        if marker.format_version != 1 {
            return Err(StorageError::corruption(format!(
                "Unsupported checkpoint marker format version {}",
                marker.format_version
            )));
        }
        if marker.oldest_timestamp > marker.checkpoint_timestamp {
            return Err(StorageError::corruption(format!(
                "Checkpoint marker oldest timestamp {} is after checkpoint timestamp {}",
                marker.oldest_timestamp, marker.checkpoint_timestamp
            )));
        }
        Ok(marker)
    }
}

/// Returns the marker path for a dbpath
pub fn marker_path(dbpath: &Path) -> PathBuf {
    dbpath.join(super::CHECKPOINT_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marker_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = marker_path(temp.path());
        let marker = CheckpointMarker::new(Timestamp::new(10, 4), Timestamp::NULL);
        marker.write_to_file(&path).unwrap();
        assert_eq!(CheckpointMarker::read_from_file(&path).unwrap(), marker);
    }

    #[test]
    fn test_stable_marker_pins_oldest() {
        let marker = CheckpointMarker::stable(Timestamp::new(10, 4));
        assert!(marker.stable);
        assert_eq!(marker.oldest_timestamp, marker.checkpoint_timestamp);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let temp = TempDir::new().unwrap();
        let path = marker_path(temp.path());
        let mut marker = CheckpointMarker::new(Timestamp::new(1, 1), Timestamp::NULL);
        marker.format_version = 2;
        marker.write_to_file(&path).unwrap();
        assert!(CheckpointMarker::read_from_file(&path).is_err());
    }
}
