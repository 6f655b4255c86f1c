//! Oplog reader with strict corruption detection
//!
//! - Any checksum or structural failure halts reading
//! - No skipping records, no repair attempts
//! - Timestamps must strictly increase from record to record

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::errors::{OplogError, OplogResult};
use super::record::OplogEntry;
use crate::timestamp::Timestamp;

/// Sequential oplog reader.
pub struct OplogReader {
    path: PathBuf,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    last_timestamp: Option<Timestamp>,
}

impl OplogReader {
    /// Opens an oplog file for reading.
    pub fn open(path: &Path) -> OplogResult<Self> {
        let file = File::open(path).map_err(|e| {
            OplogError::corruption(format!("Failed to open oplog {}: {}", path.display(), e))
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| OplogError::corruption(format!("Failed to read oplog metadata: {}", e)))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            last_timestamp: None,
        })
    }

    /// Opens the oplog of a dbpath (`<dbpath>/oplog/oplog.log`).
    pub fn open_in(dbpath: &Path) -> OplogResult<Self> {
        Self::open(&super::oplog_path(dbpath))
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset just past the last record read.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Timestamp of the last record read.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    /// Reads the next entry.
    ///
    /// - `Ok(Some(entry))` when a record was read
    /// - `Ok(None)` at a clean end of file
    /// - `Err` on corruption, truncation, or non-increasing timestamps
    pub fn read_next(&mut self) -> OplogResult<Option<OplogEntry>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.current_offset;
        if remaining < 4 {
            return Err(OplogError::corruption_at_offset(
                self.current_offset,
                format!("Truncated oplog: {} trailing bytes", remaining),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            OplogError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record length: {}", e),
            )
        })?;
        let record_length = u32::from_le_bytes(len_buf) as u64;

        if record_length < 4 || record_length > remaining {
            return Err(OplogError::corruption_at_offset(
                self.current_offset,
                format!(
                    "Record length {} invalid with {} bytes remaining",
                    record_length, remaining
                ),
            ));
        }

        let mut record_buf = vec![0u8; record_length as usize];
        record_buf[0..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut record_buf[4..]).map_err(|e| {
            OplogError::corruption_at_offset(
                self.current_offset,
                format!("Failed to read record body: {}", e),
            )
        })?;

        let (entry, consumed) = OplogEntry::deserialize(&record_buf)
            .map_err(|e| OplogError::corruption_at_offset(self.current_offset, e.to_string()))?;

        if let Some(previous) = self.last_timestamp {
            if entry.timestamp <= previous {
                return Err(OplogError::out_of_order(previous, entry.timestamp));
            }
        }

        self.current_offset += consumed as u64;
        self.last_timestamp = Some(entry.timestamp);

        Ok(Some(entry))
    }

    /// Reads every remaining entry.
    pub fn read_all(&mut self) -> OplogResult<Vec<OplogEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_next()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Byte offset just past the last entry whose timestamp is `<= bound`.
    ///
    /// Reads from the current position to the end of the file.
    pub fn offset_through(&mut self, bound: Timestamp) -> OplogResult<u64> {
        let mut end = self.current_offset;
        while let Some(entry) = self.read_next()? {
            if entry.timestamp > bound {
                break;
            }
            end = self.current_offset;
        }
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oplog::OplogWriter;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn write_entries(dbpath: &Path, count: u32) -> Vec<OplogEntry> {
        let mut writer = OplogWriter::open(dbpath).unwrap();
        let uuid = Uuid::new_v4();
        let mut written = Vec::new();
        for i in 1..=count {
            let entry = OplogEntry::insert(
                Timestamp::new(10, i),
                1,
                "db.coll",
                uuid,
                format!("doc{}", i),
                serde_json::json!({ "_id": i }),
            );
            writer.append(&entry).unwrap();
            written.push(entry);
        }
        written
    }

    #[test]
    fn test_reads_back_in_order() {
        let temp = TempDir::new().unwrap();
        let written = write_entries(temp.path(), 5);

        let mut reader = OplogReader::open_in(temp.path()).unwrap();
        let read = reader.read_all().unwrap();
        assert_eq!(read, written);
        assert_eq!(reader.last_timestamp(), Some(Timestamp::new(10, 5)));
    }

    #[test]
    fn test_trailing_garbage_is_corruption() {
        let temp = TempDir::new().unwrap();
        write_entries(temp.path(), 2);

        let mut file = OpenOptions::new()
            .append(true)
            .open(crate::oplog::oplog_path(temp.path()))
            .unwrap();
        file.write_all(&[1, 2, 3]).unwrap();

        let mut reader = OplogReader::open_in(temp.path()).unwrap();
        assert!(reader.read_next().unwrap().is_some());
        assert!(reader.read_next().unwrap().is_some());
        let err = reader.read_next().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_offset_through_bound() {
        let temp = TempDir::new().unwrap();
        let written = write_entries(temp.path(), 4);
        let first_two: usize = written[..2].iter().map(|e| e.serialize().len()).sum();

        let mut reader = OplogReader::open_in(temp.path()).unwrap();
        let offset = reader.offset_through(Timestamp::new(10, 2)).unwrap();
        assert_eq!(offset, first_two as u64);
    }
}
