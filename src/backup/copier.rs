//! Staging copier
//!
//! Copies checkpoint files listed by a backup cursor into a staged dbpath.
//! Only the first `file_size` bytes of each file are copied: the source
//! files are append-only between checkpoints, so that prefix is the
//! checkpoint image even while writes continue.
//!
//! Selective restore: a non-required collection file is copied only when
//! its namespace was requested. The `(namespace, uuid)` pairs actually
//! copied feed the restore configuration.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::errors::{BackupError, BackupResult};
use super::manifest::{ExtensionEntry, ManifestEntry};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::restore::CollectionToRestore;

/// Result of offering one manifest entry to the copier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// File copied; bytes written
    Copied(u64),
    /// File excluded by selective restore
    Skipped,
}

/// Copies manifest files into a staging directory.
#[derive(Debug, Clone, Default)]
pub struct FileCopier {
    requested: Option<Vec<String>>,
    collections: Vec<CollectionToRestore>,
    bytes_copied: u64,
}

impl FileCopier {
    /// Copier that copies every file
    pub fn new() -> Self {
        Self::default()
    }

    /// Copier restricted to `namespaces` (plus required files)
    pub fn selective<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requested: Some(namespaces.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Whether selective restore is on
    pub fn is_selective(&self) -> bool {
        self.requested.is_some()
    }

    /// Whether `entry` passes the selective policy
    pub fn should_copy(&self, entry: &ManifestEntry) -> bool {
        match (&self.requested, &entry.namespace) {
            (None, _) => true,
            _ if entry.required => true,
            (Some(requested), Some(ns)) => requested.iter().any(|r| r == ns),
            (Some(_), None) => false,
        }
    }

    /// Copied requested collections, deduplicated, in copy order
    pub fn collections_to_restore(&self) -> &[CollectionToRestore] {
        &self.collections
    }

    /// Total bytes copied so far
    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied
    }

    /// Copy one manifest entry from `source_root` into `dest_root`.
    ///
    /// # Errors
    ///
    /// `PITR_BACKUP_IO` if the source is shorter than `file_size` or any
    /// read, write or fsync fails.
    pub fn copy(
        &mut self,
        entry: &ManifestEntry,
        source_root: &Path,
        dest_root: &Path,
    ) -> BackupResult<CopyOutcome> {
        if !self.should_copy(entry) {
            log_event_with_fields(Event::FileSkipped, &[("file", &entry.filename)]);
            return Ok(CopyOutcome::Skipped);
        }

        let source_path = source_root.join(&entry.filename);
        let dest_path = dest_root.join(&entry.filename);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| BackupError::io_error_at_path(parent, e))?;
        }

        let source =
            File::open(&source_path).map_err(|e| BackupError::io_error_at_path(&source_path, e))?;
        let mut dest =
            File::create(&dest_path).map_err(|e| BackupError::io_error_at_path(&dest_path, e))?;

        let copied = io::copy(&mut source.take(entry.file_size), &mut dest)
            .map_err(|e| BackupError::io_error_at_path(&dest_path, e))?;
        if copied != entry.file_size {
            return Err(BackupError::io_error(
                format!(
                    "Source {} ended after {} of {} bytes",
                    source_path.display(),
                    copied,
                    entry.file_size
                ),
                io::Error::from(io::ErrorKind::UnexpectedEof),
            ));
        }
        dest.sync_all()
            .map_err(|e| BackupError::io_error_at_path(&dest_path, e))?;

        if self.is_selective() {
            if let (Some(namespace), Some(uuid)) = (&entry.namespace, entry.uuid) {
                let candidate = CollectionToRestore {
                    namespace: namespace.clone(),
                    uuid,
                };
                if !self.collections.contains(&candidate) {
                    self.collections.push(candidate);
                }
            }
        }
        self.bytes_copied += copied;

        log_event_with_fields(
            Event::FileCopied,
            &[("bytes", &copied.to_string()), ("file", &entry.filename)],
        );
        Ok(CopyOutcome::Copied(copied))
    }

    /// Append an extension range to a staged file.
    ///
    /// The staged file must be exactly `entry.offset` bytes long, so an
    /// interrupted extension is detected rather than duplicated.
    pub fn copy_extension(
        &mut self,
        entry: &ExtensionEntry,
        source_root: &Path,
        dest_root: &Path,
    ) -> BackupResult<u64> {
        let source_path = source_root.join(&entry.filename);
        let dest_path = dest_root.join(&entry.filename);

        let current = fs::metadata(&dest_path)
            .map_err(|e| BackupError::io_error_at_path(&dest_path, e))?
            .len();
        if current != entry.offset {
            return Err(BackupError::io_error(
                format!(
                    "Staged {} is {} bytes; extension starts at {}",
                    dest_path.display(),
                    current,
                    entry.offset
                ),
                io::Error::from(io::ErrorKind::InvalidInput),
            ));
        }

        let mut source =
            File::open(&source_path).map_err(|e| BackupError::io_error_at_path(&source_path, e))?;
        source
            .seek(SeekFrom::Start(entry.offset))
            .map_err(|e| BackupError::io_error_at_path(&source_path, e))?;
        let mut dest = OpenOptions::new()
            .append(true)
            .open(&dest_path)
            .map_err(|e| BackupError::io_error_at_path(&dest_path, e))?;

        let copied = io::copy(&mut source.take(entry.length), &mut dest)
            .map_err(|e| BackupError::io_error_at_path(&dest_path, e))?;
        if copied != entry.length {
            return Err(BackupError::io_error(
                format!(
                    "Source {} ended after {} of {} extension bytes",
                    source_path.display(),
                    copied,
                    entry.length
                ),
                io::Error::from(io::ErrorKind::UnexpectedEof),
            ));
        }
        dest.sync_all()
            .map_err(|e| BackupError::io_error_at_path(&dest_path, e))?;
        self.bytes_copied += copied;

        log_event_with_fields(
            Event::FileCopied,
            &[
                ("bytes", &copied.to_string()),
                ("file", &entry.filename),
                ("offset", &entry.offset.to_string()),
            ],
        );
        Ok(copied)
    }

    /// Remove a partially staged destination.
    ///
    /// Returns false, after logging the error, if it is still there; a
    /// later stage into the same dbpath then fails with `StagingExists`.
    pub fn abort(dest_root: &Path) -> bool {
        let dbpath = dest_root.display().to_string();
        if dest_root.exists() {
            if let Err(e) = fs::remove_dir_all(dest_root) {
                Logger::error(
                    "STAGING_DISCARD_FAILED",
                    &[("dbpath", &dbpath), ("error", &e.to_string())],
                );
                return false;
            }
        }
        log_event_with_fields(Event::StagingDiscarded, &[("dbpath", &dbpath)]);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn entry(name: &str, size: u64, ns: Option<&str>, required: bool) -> ManifestEntry {
        ManifestEntry {
            filename: name.to_string(),
            file_size: size,
            namespace: ns.map(str::to_string),
            uuid: ns.map(|_| Uuid::new_v4()),
            required,
        }
    }

    #[test]
    fn test_copies_exactly_file_size_bytes() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("collections")).unwrap();
        fs::write(source.path().join("collections/x.dat"), b"0123456789").unwrap();

        let mut copier = FileCopier::new();
        let staged = dest.path().join("staged");
        let outcome = copier
            .copy(
                &entry("collections/x.dat", 4, Some("db.x"), false),
                source.path(),
                &staged,
            )
            .unwrap();
        assert_eq!(outcome, CopyOutcome::Copied(4));
        assert_eq!(fs::read(staged.join("collections/x.dat")).unwrap(), b"0123");
        assert!(copier.collections_to_restore().is_empty());
    }

    #[test]
    fn test_short_source_is_fatal() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(source.path().join("catalog.json"), b"{}").unwrap();

        let mut copier = FileCopier::new();
        let err = copier
            .copy(&entry("catalog.json", 10, None, true), source.path(), dest.path())
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_selective_policy() {
        let copier = FileCopier::selective(["db.keep"]);
        assert!(copier.should_copy(&entry("a", 0, Some("db.keep"), false)));
        assert!(!copier.should_copy(&entry("b", 0, Some("db.drop"), false)));
        assert!(copier.should_copy(&entry("catalog.json", 0, None, true)));

        let all = FileCopier::new();
        assert!(all.should_copy(&entry("b", 0, Some("db.drop"), false)));
    }

    #[test]
    fn test_selective_collects_unique_pairs_in_order() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(source.path().join("b.dat"), b"").unwrap();
        fs::write(source.path().join("a.dat"), b"").unwrap();
        fs::write(source.path().join("c.dat"), b"").unwrap();

        let mut copier = FileCopier::selective(["db.a", "db.b"]);
        let b = entry("b.dat", 0, Some("db.b"), false);
        let a = entry("a.dat", 0, Some("db.a"), false);
        let c = entry("c.dat", 0, Some("db.c"), false);
        copier.copy(&b, source.path(), dest.path()).unwrap();
        copier.copy(&a, source.path(), dest.path()).unwrap();
        copier.copy(&b, source.path(), dest.path()).unwrap();
        assert_eq!(
            copier.copy(&c, source.path(), dest.path()).unwrap(),
            CopyOutcome::Skipped
        );

        let names: Vec<&str> = copier
            .collections_to_restore()
            .iter()
            .map(|c| c.namespace.as_str())
            .collect();
        assert_eq!(names, vec!["db.b", "db.a"]);
        assert!(!dest.path().join("c.dat").exists());
    }

    #[test]
    fn test_extension_requires_matching_offset() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(source.path().join("log"), b"aaaabbbb").unwrap();
        fs::write(dest.path().join("log"), b"aaaa").unwrap();

        let mut copier = FileCopier::new();
        let ext = ExtensionEntry {
            filename: "log".to_string(),
            offset: 4,
            length: 4,
        };
        assert_eq!(copier.copy_extension(&ext, source.path(), dest.path()).unwrap(), 4);
        assert_eq!(fs::read(dest.path().join("log")).unwrap(), b"aaaabbbb");

        // Replaying the same range is refused
        assert!(copier.copy_extension(&ext, source.path(), dest.path()).is_err());

        let mut f = OpenOptions::new().append(true).open(source.path().join("log")).unwrap();
        f.write_all(b"cc").unwrap();
        let short = ExtensionEntry {
            filename: "log".to_string(),
            offset: 8,
            length: 5,
        };
        assert!(copier.copy_extension(&short, source.path(), dest.path()).is_err());
    }

    #[test]
    fn test_abort_removes_staging() {
        let dest = TempDir::new().unwrap();
        let staged = dest.path().join("staged");
        fs::create_dir_all(staged.join("collections")).unwrap();
        assert!(FileCopier::abort(&staged));
        assert!(!staged.exists());
        // Nothing left to remove
        assert!(FileCopier::abort(&staged));
    }

    #[test]
    fn test_abort_reports_what_it_could_not_remove() {
        let dest = TempDir::new().unwrap();
        // A plain file where the staged directory should be
        let staged = dest.path().join("staged");
        fs::write(&staged, b"not a dbpath").unwrap();

        assert!(!FileCopier::abort(&staged));
        assert!(staged.exists());
    }
}
