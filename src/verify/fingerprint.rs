//! Per-namespace content fingerprints
//!
//! Captured on the source at the backup checkpoint (or point in time) and
//! compared against the restored node at its stable timestamp. Only the
//! digests take part in comparison; the capture timestamps differ by
//! construction for a point-in-time restore.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{VerifyError, VerifyResult};
use super::node::RestoredNode;
use crate::storage::fsutil::{read_json, write_json};
use crate::storage::{hash_documents, StorageError};
use crate::timestamp::Timestamp;

/// Digest of one namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDigest {
    /// Live documents
    pub documents: usize,
    /// Hex SHA-256 over the documents sorted by id
    pub sha256: String,
}

/// Digests of every namespace at one timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFingerprint {
    /// Read timestamp
    pub timestamp: Timestamp,
    /// Digest per namespace
    pub namespaces: BTreeMap<String, NamespaceDigest>,
}

impl DataFingerprint {
    /// Fingerprint every namespace of `node` as of `ts`
    pub fn capture<N: RestoredNode + ?Sized>(node: &N, ts: Timestamp) -> VerifyResult<Self> {
        let mut namespaces = BTreeMap::new();
        for namespace in node.namespaces() {
            let documents = node.read_at(&namespace, ts).map_err(|e| {
                VerifyError::storage(format!("Failed to read {} at {}", namespace, ts), e)
            })?;
            namespaces.insert(
                namespace,
                NamespaceDigest {
                    documents: documents.len(),
                    sha256: hash_documents(&documents),
                },
            );
        }
        Ok(Self {
            timestamp: ts,
            namespaces,
        })
    }

    /// Keep only `namespaces`
    pub fn restricted_to<'a, I>(&self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: Vec<&str> = namespaces.into_iter().collect();
        Self {
            timestamp: self.timestamp,
            namespaces: self
                .namespaces
                .iter()
                .filter(|(ns, _)| wanted.contains(&ns.as_str()))
                .map(|(ns, d)| (ns.clone(), d.clone()))
                .collect(),
        }
    }

    /// Namespaces whose digests differ, or that only one side has
    pub fn differences(&self, other: &DataFingerprint) -> Vec<String> {
        let mut differing: Vec<String> = self
            .namespaces
            .iter()
            .filter(|(ns, digest)| other.namespaces.get(*ns) != Some(*digest))
            .map(|(ns, _)| ns.clone())
            .collect();
        differing.extend(
            other
                .namespaces
                .keys()
                .filter(|ns| !self.namespaces.contains_key(*ns))
                .cloned(),
        );
        differing.sort();
        differing
    }

    /// Write as JSON, atomically
    pub fn write_to_file(&self, path: &Path) -> VerifyResult<()> {
        write_json(path, self).map_err(|e| {
            VerifyError::storage(
                format!("Failed to write fingerprint {}", path.display()),
                StorageError::io_at_path(path, e),
            )
        })
    }

    /// Read a fingerprint written by `write_to_file`
    pub fn read_from_file(path: &Path) -> VerifyResult<Self> {
        read_json(path).map_err(|e| {
            VerifyError::storage(
                format!("Failed to read fingerprint {}", path.display()),
                StorageError::io_at_path(path, e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_capture_and_compare() {
        let temp = TempDir::new().unwrap();
        let mut engine = StorageEngine::initialize(temp.path(), "rs0").unwrap();
        engine.create_collection("db.a").unwrap();
        engine.create_collection("db.b").unwrap();
        let t1 = engine.insert("db.a", "1", json!({ "v": 1 })).unwrap();
        let t2 = engine.insert("db.a", "2", json!({ "v": 2 })).unwrap();

        let before = DataFingerprint::capture(&engine, t1).unwrap();
        let after = DataFingerprint::capture(&engine, t2).unwrap();
        assert_eq!(before.namespaces["db.a"].documents, 1);
        assert_eq!(after.namespaces["db.a"].documents, 2);
        assert_eq!(before.differences(&after), vec!["db.a".to_string()]);
        assert!(before.differences(&before).is_empty());

        let only_b = after.restricted_to(["db.b"]);
        assert_eq!(only_b.namespaces.len(), 1);
        assert_eq!(only_b.differences(&before.restricted_to(["db.b"])), Vec::<String>::new());
    }

    #[test]
    fn test_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut engine = StorageEngine::initialize(&temp.path().join("db"), "rs0").unwrap();
        engine.create_collection("db.a").unwrap();
        let ts = engine.insert("db.a", "1", json!({})).unwrap();

        let fingerprint = DataFingerprint::capture(&engine, ts).unwrap();
        let path = temp.path().join("fingerprint.json");
        fingerprint.write_to_file(&path).unwrap();
        assert_eq!(DataFingerprint::read_from_file(&path).unwrap(), fingerprint);
    }
}
