//! Exclusive dbpath ownership
//!
//! `<dbpath>/.lock` is created with `create_new`; its existence means some
//! process owns the dbpath. Dropping the lock removes the file. A lock can
//! instead be abandoned, leaving the file in place so the dbpath stays
//! unusable (used after a fatal restore).

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};

/// Held dbpath lock
#[derive(Debug)]
pub struct DbPathLock {
    path: PathBuf,
    held: bool,
}

impl DbPathLock {
    /// Acquire `<dbpath>/.lock`
    ///
    /// # Errors
    ///
    /// `PITR_STORAGE_LOCKED` if the lock file already exists.
    pub fn acquire(dbpath: &Path) -> StorageResult<Self> {
        let path = dbpath.join(super::LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::locked(dbpath))
            }
            Err(e) => return Err(StorageError::io_at_path(&path, e)),
        };
        writeln!(file, "{}", std::process::id())
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::io_at_path(&path, e))?;
        Ok(Self { path, held: true })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, removing the file
    pub fn release(mut self) -> StorageResult<()> {
        self.held = false;
        fs::remove_file(&self.path).map_err(|e| StorageError::io_at_path(&self.path, e))
    }

    /// Give up ownership but leave the lock file behind
    pub fn abandon(mut self) {
        self.held = false;
    }
}

impl Drop for DbPathLock {
    fn drop(&mut self) {
        if self.held {
            let _ = fs::remove_file(&self.path);
        }
    }
}
