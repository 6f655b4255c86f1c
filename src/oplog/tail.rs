//! Log tail reader
//!
//! Reads the oplog entries written after a checkpoint, for point-in-time
//! extension of a restore. The reader does not wait for durability: the
//! caller must already know the entries it asks for are durable on the
//! source (for example because it waited for them to replicate).

use std::path::Path;

use super::errors::{OplogError, OplogResult};
use super::reader::OplogReader;
use super::record::OplogEntry;
use crate::timestamp::Timestamp;

/// Reads oplog tails relative to a checkpoint timestamp.
pub struct LogTail;

impl LogTail {
    /// Entries with timestamp strictly greater than `checkpoint_ts`, ascending.
    pub fn entries_after(oplog_path: &Path, checkpoint_ts: Timestamp) -> OplogResult<Vec<OplogEntry>> {
        let mut reader = OplogReader::open(oplog_path)?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.read_next()? {
            if entry.timestamp > checkpoint_ts {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Entries in `(checkpoint_ts, pit_ts]` for a point-in-time restore.
    ///
    /// # Errors
    ///
    /// `PITR_OPLOG_EMPTY_TAIL` when no entry falls in the range: a
    /// point-in-time restore with nothing to replay is a caller error.
    pub fn entries_for_pit(
        oplog_path: &Path,
        checkpoint_ts: Timestamp,
        pit_ts: Timestamp,
    ) -> OplogResult<Vec<OplogEntry>> {
        let entries: Vec<OplogEntry> = Self::entries_after(oplog_path, checkpoint_ts)?
            .into_iter()
            .take_while(|e| e.timestamp <= pit_ts)
            .collect();

        if entries.is_empty() {
            return Err(OplogError::empty_tail(checkpoint_ts));
        }
        Ok(entries)
    }
}
