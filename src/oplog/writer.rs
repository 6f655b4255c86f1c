//! Oplog writer with fsync enforcement
//!
//! - Every append is followed by fsync
//! - Timestamps must strictly increase; the writer refuses anything else
//! - Truncation rewrites the file atomically (temp file + rename + dir fsync)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{OplogError, OplogResult};
use super::reader::OplogReader;
use super::record::OplogEntry;
use crate::observability::{log_event_with_fields, Event};
use crate::timestamp::Timestamp;

/// Append-only oplog writer.
#[derive(Debug)]
pub struct OplogWriter {
    path: PathBuf,
    file: File,
    last_timestamp: Option<Timestamp>,
    last_term: Option<i64>,
}

impl OplogWriter {
    /// Opens or creates `<dbpath>/oplog/oplog.log`.
    ///
    /// Scans the existing file to recover the top of the log; a corrupt
    /// oplog fails the open.
    pub fn open(dbpath: &Path) -> OplogResult<Self> {
        let path = super::oplog_path(dbpath);

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                OplogError::append_failed(
                    format!("Failed to create oplog directory: {}", dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                OplogError::append_failed(format!("Failed to open oplog: {}", path.display()), e)
            })?;

        let (last_timestamp, last_term) = Self::scan_top(&path)?;

        Ok(Self {
            path,
            file,
            last_timestamp,
            last_term,
        })
    }

    fn scan_top(path: &Path) -> OplogResult<(Option<Timestamp>, Option<i64>)> {
        let mut reader = OplogReader::open(path)?;
        let mut top = None;
        let mut term = None;
        while let Some(entry) = reader.read_next()? {
            top = Some(entry.timestamp);
            term = Some(entry.term);
        }
        Ok((top, term))
    }

    /// Returns the oplog file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Timestamp of the newest entry, if any.
    pub fn top(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    /// Term of the newest entry, if any.
    pub fn last_term(&self) -> Option<i64> {
        self.last_term
    }

    /// Appends one entry and fsyncs.
    ///
    /// # Errors
    ///
    /// - `PITR_OPLOG_ORDERING` if the timestamp does not advance the log
    /// - `PITR_OPLOG_APPEND_FAILED` if the write fails
    /// - `PITR_OPLOG_FSYNC_FAILED` if the fsync fails
    pub fn append(&mut self, entry: &OplogEntry) -> OplogResult<()> {
        if let Some(top) = self.last_timestamp {
            if entry.timestamp <= top {
                return Err(OplogError::out_of_order(top, entry.timestamp));
            }
        }

        self.file.write_all(&entry.serialize()).map_err(|e| {
            OplogError::append_failed(
                format!("Failed to write oplog entry at {}", entry.timestamp),
                e,
            )
        })?;

        self.file.sync_all().map_err(|e| {
            OplogError::fsync_failed(
                format!("fsync failed after oplog append at {}", entry.timestamp),
                e,
            )
        })?;

        self.last_timestamp = Some(entry.timestamp);
        self.last_term = Some(entry.term);
        Ok(())
    }

    /// Explicitly fsync the oplog.
    pub fn fsync(&self) -> OplogResult<()> {
        self.file
            .sync_all()
            .map_err(|e| OplogError::fsync_failed("Explicit oplog fsync failed", e))
    }

    /// Removes every entry newer than `ts`.
    ///
    /// Returns the number of entries removed. A no-op when the top of the
    /// log is already `<= ts`.
    pub fn truncate_after(&mut self, ts: Timestamp) -> OplogResult<usize> {
        match self.last_timestamp {
            Some(top) if top > ts => {}
            _ => return Ok(0),
        }

        let mut kept = Vec::new();
        let mut removed = 0usize;
        let mut reader = OplogReader::open(&self.path)?;
        while let Some(entry) = reader.read_next()? {
            if entry.timestamp <= ts {
                kept.push(entry);
            } else {
                removed += 1;
            }
        }

        let tmp_path = self.path.with_extension("log.tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(|e| {
                OplogError::append_failed(
                    format!("Failed to create {}", tmp_path.display()),
                    e,
                )
            })?;
            for entry in &kept {
                tmp.write_all(&entry.serialize()).map_err(|e| {
                    OplogError::append_failed("Failed to write truncated oplog", e)
                })?;
            }
            tmp.sync_all()
                .map_err(|e| OplogError::fsync_failed("Failed to fsync truncated oplog", e))?;
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            OplogError::append_failed(
                format!("Failed to replace oplog {}", self.path.display()),
                e,
            )
        })?;

        if let Some(dir) = self.path.parent() {
            let handle = File::open(dir).map_err(|e| {
                OplogError::fsync_failed(format!("Failed to open {}", dir.display()), e)
            })?;
            handle
                .sync_all()
                .map_err(|e| OplogError::fsync_failed("Failed to fsync oplog directory", e))?;
        }

        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| OplogError::append_failed("Failed to reopen oplog after truncation", e))?;
        self.last_timestamp = kept.last().map(|e| e.timestamp);
        self.last_term = kept.last().map(|e| e.term);

        log_event_with_fields(
            Event::OplogTruncated,
            &[
                ("after", &ts.to_string()),
                ("removed", &removed.to_string()),
            ],
        );

        Ok(removed)
    }
}
