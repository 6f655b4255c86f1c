//! Backup cursor over a live source
//!
//! Opening a cursor fsyncs the source and takes a checkpoint, then pins
//! it: the source refuses further checkpoints (and catalog changes) until
//! the cursor closes. The cursor lists the checkpoint's files with their
//! sizes at checkpoint time. Writes keep flowing to the source through
//! `source()`, and `extend` hands out the oplog bytes they appended.
//!
//! Lifecycle: `Open -> Iterating -> (Extended)* -> Closed`.

use std::fs;

use uuid::Uuid;

use super::errors::{BackupError, BackupResult};
use super::manifest::{BackupMetadata, ExtensionEntry, ManifestEntry};
use crate::observability::{log_event_with_fields, Event};
use crate::oplog::{OplogReader, OPLOG_RELATIVE_PATH};
use crate::storage::{StorageEngine, REQUIRED_FILES};
use crate::timestamp::Timestamp;

/// Options for opening a cursor
#[derive(Debug, Clone, Default)]
pub struct BackupCursorOptions {
    /// Session id; a random one is generated when absent
    pub backup_id: Option<Uuid>,
}

/// Cursor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Opened, nothing read yet
    Open,
    /// At least one item read
    Iterating,
    /// `extend` called at least once
    Extended,
    /// Closed; the checkpoint is no longer pinned
    Closed,
}

/// One item yielded by a cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorItem {
    /// Always first
    Metadata(BackupMetadata),
    /// One per checkpoint file
    File(ManifestEntry),
}

/// Backup cursor session borrowing its source.
pub struct BackupCursor<'a> {
    source: &'a mut StorageEngine,
    metadata: BackupMetadata,
    files: Vec<ManifestEntry>,
    position: usize,
    state: CursorState,
    oplog_bytes_handed_out: u64,
}

impl<'a> BackupCursor<'a> {
    /// Open a cursor on `source`.
    ///
    /// # Errors
    ///
    /// - `PITR_BACKUP_CURSOR_BUSY` if a cursor is already open
    /// - `PITR_BACKUP_CHECKPOINT_FAILED` if the checkpoint fails; no cursor
    ///   is returned and nothing is pinned
    pub fn open(source: &'a mut StorageEngine, options: BackupCursorOptions) -> BackupResult<Self> {
        if source.is_checkpoint_pinned() {
            return Err(BackupError::cursor_busy());
        }

        source.fsync().map_err(BackupError::checkpoint_failed)?;
        let checkpoint_timestamp = source.checkpoint().map_err(BackupError::checkpoint_failed)?;

        let files = Self::list_files(source)?;
        let oplog_bytes_handed_out = files
            .iter()
            .find(|f| f.filename == OPLOG_RELATIVE_PATH)
            .map_or(0, |f| f.file_size);

        let metadata = BackupMetadata {
            backup_id: options.backup_id.unwrap_or_else(Uuid::new_v4),
            checkpoint_timestamp,
            dbpath: source.dbpath().to_path_buf(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        source.set_checkpoint_pinned(true);

        log_event_with_fields(
            Event::BackupCursorOpened,
            &[
                ("backup_id", &metadata.backup_id.to_string()),
                ("checkpoint_ts", &checkpoint_timestamp.to_string()),
                ("files", &files.len().to_string()),
            ],
        );

        Ok(Self {
            source,
            metadata,
            files,
            position: 0,
            state: CursorState::Open,
            oplog_bytes_handed_out,
        })
    }

    fn list_files(source: &StorageEngine) -> BackupResult<Vec<ManifestEntry>> {
        let dbpath = source.dbpath();
        let size_of = |relative: &str| -> BackupResult<u64> {
            let path = dbpath.join(relative);
            fs::metadata(&path)
                .map(|m| m.len())
                .map_err(|e| BackupError::io_error_at_path(&path, e))
        };

        let mut files = Vec::new();
        for required in REQUIRED_FILES {
            files.push(ManifestEntry {
                filename: required.to_string(),
                file_size: size_of(required)?,
                namespace: None,
                uuid: None,
                required: true,
            });
        }
        for collection in source.catalog().entries() {
            files.push(ManifestEntry {
                filename: collection.ident.clone(),
                file_size: size_of(&collection.ident)?,
                namespace: Some(collection.namespace.clone()),
                uuid: Some(collection.uuid),
                required: false,
            });
        }
        Ok(files)
    }

    /// Cursor metadata
    pub fn metadata(&self) -> &BackupMetadata {
        &self.metadata
    }

    /// Current state
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// The source, for writes while the cursor is open
    pub fn source(&mut self) -> &mut StorageEngine {
        self.source
    }

    /// Next item: metadata first, then each file, then `None`.
    pub fn next_item(&mut self) -> BackupResult<Option<CursorItem>> {
        if self.state == CursorState::Closed {
            return Err(BackupError::cursor_closed());
        }
        if self.state == CursorState::Open {
            self.state = CursorState::Iterating;
        }

        let item = if self.position == 0 {
            Some(CursorItem::Metadata(self.metadata.clone()))
        } else {
            self.files
                .get(self.position - 1)
                .cloned()
                .map(CursorItem::File)
        };
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    /// Drain the cursor: metadata and every file entry
    pub fn read_all(&mut self) -> BackupResult<(BackupMetadata, Vec<ManifestEntry>)> {
        let mut files = Vec::new();
        let mut metadata = self.metadata.clone();
        while let Some(item) = self.next_item()? {
            match item {
                CursorItem::Metadata(m) => metadata = m,
                CursorItem::File(f) => files.push(f),
            }
        }
        Ok((metadata, files))
    }

    /// Oplog bytes appended since the last hand-out, through the last entry
    /// at or below `max_checkpoint_timestamp`.
    ///
    /// Returns an empty list when nothing new falls under the bound.
    ///
    /// # Errors
    ///
    /// - `PITR_BACKUP_CURSOR_CLOSED` after `close`
    /// - `PITR_BACKUP_INVALID_EXTEND` for a foreign `backup_id`, a bound
    ///   below the checkpoint, or a bound the source oplog has not reached
    pub fn extend(
        &mut self,
        backup_id: Uuid,
        max_checkpoint_timestamp: Timestamp,
    ) -> BackupResult<Vec<ExtensionEntry>> {
        if self.state == CursorState::Closed {
            return Err(BackupError::cursor_closed());
        }
        if backup_id != self.metadata.backup_id {
            return Err(BackupError::invalid_extend(format!(
                "backup_id {} does not match cursor {}",
                backup_id, self.metadata.backup_id
            )));
        }
        if max_checkpoint_timestamp < self.metadata.checkpoint_timestamp {
            return Err(BackupError::invalid_extend(format!(
                "Extend bound {} is below the cursor checkpoint {}",
                max_checkpoint_timestamp, self.metadata.checkpoint_timestamp
            )));
        }
        let top = self.source.top_of_oplog().unwrap_or(Timestamp::NULL);
        if top < max_checkpoint_timestamp {
            return Err(BackupError::invalid_extend(format!(
                "Source oplog top {} has not reached {}",
                top, max_checkpoint_timestamp
            )));
        }

        let end = OplogReader::open(&self.source.oplog_path())
            .and_then(|mut reader| reader.offset_through(max_checkpoint_timestamp))
            .map_err(|e| BackupError::storage("Failed to scan source oplog", e.into()))?;

        let mut extensions = Vec::new();
        if end > self.oplog_bytes_handed_out {
            extensions.push(ExtensionEntry {
                filename: OPLOG_RELATIVE_PATH.to_string(),
                offset: self.oplog_bytes_handed_out,
                length: end - self.oplog_bytes_handed_out,
            });
            self.oplog_bytes_handed_out = end;
        }
        self.state = CursorState::Extended;

        log_event_with_fields(
            Event::BackupCursorExtended,
            &[
                ("backup_id", &backup_id.to_string()),
                ("max_ts", &max_checkpoint_timestamp.to_string()),
                ("ranges", &extensions.len().to_string()),
            ],
        );
        Ok(extensions)
    }

    /// Close the cursor, releasing the checkpoint pin.
    ///
    /// Closing before iteration finishes is legal and abandons the backup.
    /// A second close is an error.
    pub fn close(&mut self) -> BackupResult<()> {
        if self.state == CursorState::Closed {
            return Err(BackupError::cursor_closed());
        }
        self.state = CursorState::Closed;
        self.source.set_checkpoint_pinned(false);

        log_event_with_fields(
            Event::BackupCursorClosed,
            &[
                ("backup_id", &self.metadata.backup_id.to_string()),
                ("files_listed", &self.position.saturating_sub(1).to_string()),
            ],
        );
        Ok(())
    }
}

impl Drop for BackupCursor<'_> {
    fn drop(&mut self) {
        if self.state != CursorState::Closed {
            self.source.set_checkpoint_pinned(false);
        }
    }
}
