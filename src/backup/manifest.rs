//! Backup cursor documents
//!
//! A cursor yields one `BackupMetadata` document followed by one
//! `ManifestEntry` per file in the checkpoint. `extend` yields
//! `ExtensionEntry` byte ranges. The staged copy records everything it
//! was built from in `backup_manifest.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{BackupError, BackupResult};
use crate::storage::fsutil;
use crate::timestamp::Timestamp;

/// Name of the manifest written beside a staged dbpath
pub const BACKUP_MANIFEST_FILE: &str = "backup_manifest.json";

/// First document of every cursor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupMetadata {
    /// Identifies the cursor session
    pub backup_id: Uuid,

    /// Timestamp the checkpoint files are consistent at
    pub checkpoint_timestamp: Timestamp,

    /// Source dbpath
    pub dbpath: PathBuf,

    /// Cursor open time (RFC3339)
    pub created_at: String,
}

/// One file in a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the dbpath
    pub filename: String,

    /// Bytes belonging to the checkpoint
    pub file_size: u64,

    /// Namespace of a collection data file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Uuid of a collection data file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    /// Copied regardless of selective restore
    pub required: bool,
}

/// Byte range appended to a file after the cursor opened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionEntry {
    /// Path relative to the dbpath
    pub filename: String,

    /// First byte of the range
    pub offset: u64,

    /// Length of the range
    pub length: u64,
}

/// Record of a staged backup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupManifest {
    /// Cursor metadata
    pub metadata: BackupMetadata,

    /// Files copied
    pub files: Vec<ManifestEntry>,

    /// Files skipped by selective restore
    #[serde(default)]
    pub skipped: Vec<String>,

    /// Extension ranges copied
    #[serde(default)]
    pub extensions: Vec<ExtensionEntry>,

    /// Highest bound the staged oplog was extended to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_through: Option<Timestamp>,

    /// Format version (always 1)
    pub format_version: u8,
}

impl BackupManifest {
    /// Creates a manifest for a cursor session
    pub fn new(metadata: BackupMetadata) -> Self {
        Self {
            metadata,
            files: Vec::new(),
            skipped: Vec::new(),
            extensions: Vec::new(),
            extended_through: None,
            format_version: 1,
        }
    }

    /// Writes the manifest atomically with fsync
    pub fn write_to_file(&self, path: &Path) -> BackupResult<()> {
        fsutil::write_json(path, self).map_err(|e| {
            BackupError::manifest_failed(format!(
                "Failed to write backup manifest {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Reads a manifest
    pub fn read_from_file(path: &Path) -> BackupResult<Self> {
        let manifest: Self = fsutil::read_json(path).map_err(|e| {
            BackupError::manifest_failed(format!(
                "Failed to read backup manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        if manifest.format_version != 1 {
            return Err(BackupError::manifest_failed(format!(
                "Unsupported backup manifest format version {}",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata() -> BackupMetadata {
        BackupMetadata {
            backup_id: Uuid::new_v4(),
            checkpoint_timestamp: Timestamp::new(100, 3),
            dbpath: PathBuf::from("/data/db"),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_manifest_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(BACKUP_MANIFEST_FILE);

        let mut manifest = BackupManifest::new(metadata());
        manifest.files.push(ManifestEntry {
            filename: "catalog.json".to_string(),
            file_size: 12,
            namespace: None,
            uuid: None,
            required: true,
        });
        manifest.extensions.push(ExtensionEntry {
            filename: "oplog/oplog.log".to_string(),
            offset: 100,
            length: 40,
        });
        manifest.extended_through = Some(Timestamp::new(105, 0));
        manifest.write_to_file(&path).unwrap();

        assert_eq!(BackupManifest::read_from_file(&path).unwrap(), manifest);
    }

    #[test]
    fn test_required_file_entry_omits_namespace() {
        let entry = ManifestEntry {
            filename: "checkpoint.json".to_string(),
            file_size: 1,
            namespace: None,
            uuid: None,
            required: true,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("namespace"));
    }
}
