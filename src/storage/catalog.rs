//! Collection catalog (`catalog.json`)
//!
//! Maps namespaces to collection uuids and data file idents. The catalog
//! is rewritten atomically on every change.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{StorageError, StorageResult};
use super::fsutil;

/// One catalogued collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// `db.coll` namespace
    pub namespace: String,
    /// Collection uuid
    pub uuid: Uuid,
    /// Data file path relative to the dbpath
    pub ident: String,
}

/// The set of collections in a dbpath
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    collections: Vec<CatalogEntry>,
}

impl Catalog {
    /// Load `<dbpath>/catalog.json`
    pub fn load(dbpath: &Path) -> StorageResult<Self> {
        let path = dbpath.join(super::CATALOG_FILE);
        fsutil::read_json(&path).map_err(|e| StorageError::io_at_path(&path, e))
    }

    /// Atomically persist to `<dbpath>/catalog.json`
    pub fn save(&self, dbpath: &Path) -> StorageResult<()> {
        let path = dbpath.join(super::CATALOG_FILE);
        fsutil::write_json(&path, self).map_err(|e| StorageError::io_at_path(&path, e))
    }

    /// All entries in creation order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.collections
    }

    /// Look up by namespace
    pub fn find(&self, namespace: &str) -> Option<&CatalogEntry> {
        self.collections.iter().find(|c| c.namespace == namespace)
    }

    /// Look up by uuid
    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<&CatalogEntry> {
        self.collections.iter().find(|c| c.uuid == uuid)
    }

    /// Add a collection
    pub fn add(&mut self, entry: CatalogEntry) -> StorageResult<()> {
        if self.find(&entry.namespace).is_some() {
            return Err(StorageError::namespace_exists(&entry.namespace));
        }
        self.collections.push(entry);
        Ok(())
    }

    /// Remove a collection, returning its entry
    pub fn remove(&mut self, namespace: &str) -> StorageResult<CatalogEntry> {
        let index = self
            .collections
            .iter()
            .position(|c| c.namespace == namespace)
            .ok_or_else(|| StorageError::namespace_not_found(namespace))?;
        Ok(self.collections.remove(index))
    }
}

/// Whether `namespace` has the `db.coll` shape
pub fn is_valid_namespace(namespace: &str) -> bool {
    match namespace.split_once('.') {
        Some((db, coll)) => {
            !db.is_empty()
                && !coll.is_empty()
                && !namespace.contains(|c: char| matches!(c, '/' | '\\' | '\0' | ' ' | '$'))
        }
        None => false,
    }
}
