//! Per-collection data files
//!
//! A collection file is an append-only sequence of `DocumentRecord`s.
//! Appends are fsynced. Because the file only grows, any prefix that ends
//! on a record boundary is a consistent image of the collection as of the
//! last record in that prefix.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use uuid::Uuid;

use super::errors::{StorageError, StorageResult};
use super::fsutil;
use super::record::DocumentRecord;
use crate::timestamp::Timestamp;

/// Documents visible at one timestamp, keyed by document id.
pub type DocumentSet = BTreeMap<String, Value>;

/// Relative path of a collection's data file
pub fn collection_ident(uuid: Uuid) -> String {
    format!("{}/{}.dat", super::COLLECTIONS_DIR, uuid)
}

/// Handle to one collection data file.
#[derive(Debug, Clone)]
pub struct CollectionFile {
    path: PathBuf,
}

impl CollectionFile {
    /// Handle for the file at `<dbpath>/<ident>`
    pub fn at(dbpath: &Path, ident: &str) -> Self {
        Self {
            path: dbpath.join(ident),
        }
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create an empty file (and its directory)
    pub fn create(&self) -> StorageResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| StorageError::io_at_path(dir, e))?;
        }
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| StorageError::io_at_path(&self.path, e))?;
        file.sync_all()
            .map_err(|e| StorageError::io_at_path(&self.path, e))?;
        if let Some(dir) = self.path.parent() {
            fsutil::fsync_dir(dir).map_err(|e| StorageError::io_at_path(dir, e))?;
        }
        Ok(())
    }

    /// Append one record and fsync
    pub fn append(&self, record: &DocumentRecord) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io_at_path(&self.path, e))?;
        file.write_all(&record.serialize())
            .map_err(|e| StorageError::io_at_path(&self.path, e))?;
        file.sync_all()
            .map_err(|e| StorageError::io_at_path(&self.path, e))
    }

    /// Read and verify every record
    pub fn read_all(&self) -> StorageResult<Vec<DocumentRecord>> {
        let data = fs::read(&self.path).map_err(|e| StorageError::io_at_path(&self.path, e))?;
        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < data.len() {
            let (record, consumed) = DocumentRecord::deserialize(&data[offset..]).map_err(|e| {
                StorageError::corruption(format!(
                    "Corrupt record in {} at offset {}: {}",
                    self.path.display(),
                    offset,
                    e
                ))
            })?;
            records.push(record);
            offset += consumed;
        }
        Ok(records)
    }

    /// Documents visible at `ts`
    pub fn visible_at(&self, ts: Timestamp) -> StorageResult<DocumentSet> {
        Ok(visible_at(&self.read_all()?, ts))
    }

    /// Atomically replace the file contents with `records`
    pub fn rewrite(&self, records: &[DocumentRecord]) -> StorageResult<()> {
        let bytes: Vec<u8> = records.iter().flat_map(|r| r.serialize()).collect();
        fsutil::atomic_write(&self.path, &bytes).map_err(|e| StorageError::io_at_path(&self.path, e))
    }

    /// Remove the file
    pub fn remove(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io_at_path(&self.path, e)),
        }
    }
}

/// Resolve the newest version of each document at or below `ts`
pub fn visible_at(records: &[DocumentRecord], ts: Timestamp) -> DocumentSet {
    let mut latest: BTreeMap<&str, &DocumentRecord> = BTreeMap::new();
    for record in records.iter().filter(|r| r.timestamp <= ts) {
        match latest.get(record.document_id.as_str()) {
            Some(existing) if existing.timestamp > record.timestamp => {}
            _ => {
                latest.insert(&record.document_id, record);
            }
        }
    }
    latest
        .into_iter()
        .filter(|(_, r)| !r.is_tombstone)
        .map(|(id, r)| (id.to_string(), r.body.clone()))
        .collect()
}

/// Keep only the version of each document visible at `ts`, dropping
/// tombstones. Records newer than `ts` are returned as an error.
pub fn compact_at(
    records: &[DocumentRecord],
    ts: Timestamp,
) -> Result<Vec<DocumentRecord>, Timestamp> {
    if let Some(newer) = records.iter().find(|r| r.timestamp > ts) {
        return Err(newer.timestamp);
    }
    let mut latest: BTreeMap<&str, &DocumentRecord> = BTreeMap::new();
    for record in records {
        match latest.get(record.document_id.as_str()) {
            Some(existing) if existing.timestamp > record.timestamp => {}
            _ => {
                latest.insert(&record.document_id, record);
            }
        }
    }
    let mut kept: Vec<DocumentRecord> = latest
        .into_values()
        .filter(|r| !r.is_tombstone)
        .cloned()
        .collect();
    kept.sort_by_key(|r| r.timestamp);
    Ok(kept)
}
