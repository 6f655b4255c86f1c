//! Backup side of point-in-time restore
//!
//! - `BackupCursor`: checkpoint-pinned file listing over a live source,
//!   with `extend` for oplog written after the checkpoint
//! - `FileCopier`: copies listed files into a staged dbpath, honoring
//!   selective restore
//!
//! # Algorithm
//!
//! 1. fsync the source and take a checkpoint (cursor open)
//! 2. Read the metadata document, then every file entry
//! 3. Copy each entry's checkpoint-time prefix into staging
//! 4. Optionally `extend` and copy the oplog ranges appended since
//! 5. Close the cursor
//!
//! Backup never modifies source data; the only side effect on the source
//! is the checkpoint taken at open.

mod copier;
mod cursor;
mod errors;
mod manifest;

pub use copier::{CopyOutcome, FileCopier};
pub use cursor::{BackupCursor, BackupCursorOptions, CursorItem, CursorState};
pub use errors::{BackupError, BackupErrorCode, BackupResult};
pub use manifest::{
    BackupManifest, BackupMetadata, ExtensionEntry, ManifestEntry, BACKUP_MANIFEST_FILE,
};
