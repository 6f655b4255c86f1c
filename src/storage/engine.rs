//! Storage engine over one dbpath
//!
//! Every write is stamped with the next timestamp, appended (and fsynced)
//! to the oplog, then appended to the collection's data file. A checkpoint
//! fsyncs everything and records the top of the oplog in the checkpoint
//! marker. Snapshot reads resolve the newest version of each document at
//! or below the read timestamp, and fail below the oldest timestamp.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::catalog::{is_valid_namespace, Catalog, CatalogEntry};
use super::collection::{collection_ident, compact_at, CollectionFile, DocumentSet};
use super::errors::{StorageError, StorageResult};
use super::fsutil;
use super::lock::DbPathLock;
use super::marker::{marker_path, CheckpointMarker};
use super::record::DocumentRecord;
use super::replication::{MinValid, ReplSetConfig};
use crate::observability::{log_event_with_fields, trace_event, Event};
use crate::oplog::{oplog_path, OpType, OplogEntry, OplogWriter};
use crate::timestamp::{LogicalClock, Timestamp};

/// Host recorded for the single member of a freshly initialized set
pub const DEFAULT_MEMBER_HOST: &str = "localhost:27017";

/// Storage instance owning one dbpath.
#[derive(Debug)]
pub struct StorageEngine {
    dbpath: PathBuf,
    catalog: Catalog,
    marker: CheckpointMarker,
    min_valid: MinValid,
    replset: ReplSetConfig,
    oplog: OplogWriter,
    clock: LogicalClock,
    checkpoint_pinned: bool,
    lock: Option<DbPathLock>,
}

impl StorageEngine {
    /// Create a new, empty dbpath and open it.
    ///
    /// The new node is a single-member replica set named `set_name` at
    /// term 1, with an initial checkpoint at the null timestamp.
    pub fn initialize(dbpath: &Path, set_name: &str) -> StorageResult<Self> {
        if dbpath.join(super::CATALOG_FILE).exists() {
            return Err(StorageError::corruption(format!(
                "dbpath {} is already initialized",
                dbpath.display()
            )));
        }

        let collections = dbpath.join(super::COLLECTIONS_DIR);
        fs::create_dir_all(&collections).map_err(|e| StorageError::io_at_path(&collections, e))?;

        Catalog::default().save(dbpath)?;
        let config = ReplSetConfig::initial(set_name, DEFAULT_MEMBER_HOST);
        config.save(dbpath)?;
        MinValid {
            term: config.term,
            timestamp: Timestamp::NULL,
        }
        .save(dbpath)?;
        OplogWriter::open(dbpath)?;
        CheckpointMarker::new(Timestamp::NULL, Timestamp::NULL)
            .write_to_file(&marker_path(dbpath))?;
        fsutil::fsync_dir(dbpath).map_err(|e| StorageError::io_at_path(dbpath, e))?;

        Self::open(dbpath)
    }

    /// Open an existing dbpath, taking its lock.
    ///
    /// # Errors
    ///
    /// - `PITR_STORAGE_RESTORE_FAILED` if a failed restore left the dbpath
    /// - `PITR_STORAGE_LOCKED` if another owner holds the dbpath
    /// - `PITR_STORAGE_CORRUPTION` if a required file is missing or damaged
    pub fn open(dbpath: &Path) -> StorageResult<Self> {
        if dbpath.join(super::RESTORE_FAILED_FILE).exists() {
            return Err(StorageError::restore_failed(dbpath));
        }
        let lock = DbPathLock::acquire(dbpath)?;
        let mut engine = Self::open_unlocked(dbpath)?;
        engine.lock = Some(lock);
        Ok(engine)
    }

    /// Open a dbpath whose lock the caller already holds.
    pub(crate) fn open_unlocked(dbpath: &Path) -> StorageResult<Self> {
        for required in super::REQUIRED_FILES {
            if !dbpath.join(required).exists() {
                return Err(StorageError::corruption(format!(
                    "Required file {} missing from {}",
                    required,
                    dbpath.display()
                )));
            }
        }

        let catalog = Catalog::load(dbpath)?;
        let marker = CheckpointMarker::read_from_file(&marker_path(dbpath))?;
        let min_valid = MinValid::load(dbpath)?;
        let replset = ReplSetConfig::load(dbpath)?;
        let oplog = OplogWriter::open(dbpath)?;

        let last_issued = oplog
            .top()
            .map_or(marker.checkpoint_timestamp, |top| {
                top.max(marker.checkpoint_timestamp)
            });

        Ok(Self {
            dbpath: dbpath.to_path_buf(),
            catalog,
            marker,
            min_valid,
            replset,
            oplog,
            clock: LogicalClock::starting_after(last_issued),
            checkpoint_pinned: false,
            lock: None,
        })
    }

    /// fsync and release the dbpath lock
    pub fn close(mut self) -> StorageResult<()> {
        self.fsync()?;
        match self.lock.take() {
            Some(lock) => lock.release(),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The dbpath
    pub fn dbpath(&self) -> &Path {
        &self.dbpath
    }

    /// Current catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Current checkpoint marker
    pub fn checkpoint_marker(&self) -> &CheckpointMarker {
        &self.marker
    }

    /// Replica-set configuration
    pub fn replset_config(&self) -> &ReplSetConfig {
        &self.replset
    }

    /// Replication minValid document
    pub fn min_valid(&self) -> MinValid {
        self.min_valid
    }

    /// Timestamp of the last stable checkpoint, if the current one is stable
    pub fn last_stable_recovery_timestamp(&self) -> Option<Timestamp> {
        self.marker.stable.then_some(self.marker.checkpoint_timestamp)
    }

    /// Oldest timestamp snapshot reads may use
    pub fn oldest_timestamp(&self) -> Timestamp {
        self.marker.oldest_timestamp
    }

    /// Timestamp of the newest oplog entry
    pub fn top_of_oplog(&self) -> Option<Timestamp> {
        self.oplog.top()
    }

    /// Term of the newest oplog entry
    pub fn last_applied_term(&self) -> Option<i64> {
        self.oplog.last_term()
    }

    /// Path of the oplog file
    pub fn oplog_path(&self) -> PathBuf {
        oplog_path(&self.dbpath)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create a collection, returning its uuid
    pub fn create_collection(&mut self, namespace: &str) -> StorageResult<Uuid> {
        let uuid = Uuid::new_v4();
        let ts = self.clock.tick();
        let entry = OplogEntry::create_collection(ts, self.replset.term, namespace, uuid);
        self.commit(&entry)?;
        Ok(uuid)
    }

    /// Drop a collection
    pub fn drop_collection(&mut self, namespace: &str) -> StorageResult<Timestamp> {
        let uuid = self.collection(namespace)?.uuid;
        let ts = self.clock.tick();
        let entry = OplogEntry::drop_collection(ts, self.replset.term, namespace, uuid);
        self.commit(&entry)?;
        Ok(ts)
    }

    /// Insert a new document
    pub fn insert(
        &mut self,
        namespace: &str,
        document_id: &str,
        body: Value,
    ) -> StorageResult<Timestamp> {
        let uuid = self.collection(namespace)?.uuid;
        let ts = self.clock.tick();
        let entry = OplogEntry::insert(ts, self.replset.term, namespace, uuid, document_id, body);
        self.commit(&entry)?;
        Ok(ts)
    }

    /// Replace an existing document
    pub fn update(
        &mut self,
        namespace: &str,
        document_id: &str,
        body: Value,
    ) -> StorageResult<Timestamp> {
        let uuid = self.collection(namespace)?.uuid;
        let ts = self.clock.tick();
        let entry = OplogEntry::update(ts, self.replset.term, namespace, uuid, document_id, body);
        self.commit(&entry)?;
        Ok(ts)
    }

    /// Delete an existing document
    pub fn delete(&mut self, namespace: &str, document_id: &str) -> StorageResult<Timestamp> {
        let uuid = self.collection(namespace)?.uuid;
        let ts = self.clock.tick();
        let entry = OplogEntry::delete(ts, self.replset.term, namespace, uuid, document_id);
        self.commit(&entry)?;
        Ok(ts)
    }

    /// Apply an entry produced elsewhere (oplog replay), keeping its
    /// timestamp and term.
    pub(crate) fn apply_entry(&mut self, entry: &OplogEntry) -> StorageResult<()> {
        self.commit(entry)?;
        if entry.timestamp > self.clock.last() {
            self.clock = LogicalClock::starting_after(entry.timestamp);
        }
        Ok(())
    }

    fn commit(&mut self, entry: &OplogEntry) -> StorageResult<()> {
        self.check_applicable(entry)?;
        self.oplog.append(entry)?;
        self.apply_to_data(entry)
    }

    fn check_applicable(&self, entry: &OplogEntry) -> StorageResult<()> {
        match entry.op {
            OpType::Noop => Ok(()),
            OpType::CreateCollection => {
                if self.checkpoint_pinned {
                    return Err(StorageError::checkpoint_pinned());
                }
                if !is_valid_namespace(&entry.namespace) {
                    return Err(StorageError::invalid_namespace(&entry.namespace));
                }
                if self.catalog.find(&entry.namespace).is_some() {
                    return Err(StorageError::namespace_exists(&entry.namespace));
                }
                let uuid = entry.uuid.ok_or_else(|| {
                    StorageError::corruption(format!(
                        "Create of {} at {} carries no uuid",
                        entry.namespace, entry.timestamp
                    ))
                })?;
                if self.catalog.find_by_uuid(uuid).is_some() {
                    return Err(StorageError::corruption(format!(
                        "Collection uuid {} already in use",
                        uuid
                    )));
                }
                Ok(())
            }
            OpType::DropCollection => {
                if self.checkpoint_pinned {
                    return Err(StorageError::checkpoint_pinned());
                }
                self.target(entry).map(|_| ())
            }
            OpType::Insert => {
                let target = self.target(entry)?;
                if self.is_live(target, &entry.document_id)? {
                    return Err(StorageError::duplicate_key(
                        &entry.namespace,
                        &entry.document_id,
                    ));
                }
                Ok(())
            }
            OpType::Update | OpType::Delete => {
                let target = self.target(entry)?;
                if !self.is_live(target, &entry.document_id)? {
                    return Err(StorageError::document_not_found(
                        &entry.namespace,
                        &entry.document_id,
                    ));
                }
                Ok(())
            }
        }
    }

    fn apply_to_data(&mut self, entry: &OplogEntry) -> StorageResult<()> {
        match entry.op {
            OpType::Noop => Ok(()),
            OpType::CreateCollection => {
                let uuid = entry
                    .uuid
                    .ok_or_else(|| StorageError::corruption("Create without uuid"))?;
                let ident = collection_ident(uuid);
                CollectionFile::at(&self.dbpath, &ident).create()?;
                self.catalog.add(CatalogEntry {
                    namespace: entry.namespace.clone(),
                    uuid,
                    ident,
                })?;
                self.catalog.save(&self.dbpath)
            }
            OpType::DropCollection => {
                let removed = self.catalog.remove(&entry.namespace)?;
                self.catalog.save(&self.dbpath)?;
                CollectionFile::at(&self.dbpath, &removed.ident).remove()
            }
            OpType::Insert | OpType::Update => {
                let file = self.file_for(&entry.namespace)?;
                file.append(&DocumentRecord::live(
                    entry.timestamp,
                    entry.document_id.clone(),
                    entry.body.clone(),
                ))
            }
            OpType::Delete => {
                let file = self.file_for(&entry.namespace)?;
                file.append(&DocumentRecord::tombstone(
                    entry.timestamp,
                    entry.document_id.clone(),
                ))
            }
        }
    }

    fn collection(&self, namespace: &str) -> StorageResult<&CatalogEntry> {
        self.catalog
            .find(namespace)
            .ok_or_else(|| StorageError::namespace_not_found(namespace))
    }

    fn file_for(&self, namespace: &str) -> StorageResult<CollectionFile> {
        let entry = self.collection(namespace)?;
        Ok(CollectionFile::at(&self.dbpath, &entry.ident))
    }

    /// Catalog entry an operation targets; the uuid must match when given
    fn target(&self, entry: &OplogEntry) -> StorageResult<&CatalogEntry> {
        let target = self.collection(&entry.namespace)?;
        match entry.uuid {
            Some(uuid) if uuid != target.uuid => Err(StorageError::corruption(format!(
                "Entry at {} targets {} with uuid {} but the catalog has {}",
                entry.timestamp, entry.namespace, uuid, target.uuid
            ))),
            _ => Ok(target),
        }
    }

    fn is_live(&self, target: &CatalogEntry, document_id: &str) -> StorageResult<bool> {
        let docs = CollectionFile::at(&self.dbpath, &target.ident).visible_at(Timestamp::new(
            u32::MAX,
            u32::MAX,
        ))?;
        Ok(docs.contains_key(document_id))
    }

    // ------------------------------------------------------------------
    // Durability
    // ------------------------------------------------------------------

    /// fsync the oplog, every data file and the dbpath directory
    pub fn fsync(&self) -> StorageResult<()> {
        self.oplog.fsync()?;
        let collections = self.dbpath.join(super::COLLECTIONS_DIR);
        fsutil::fsync_recursive(&collections)
            .map_err(|e| StorageError::io_at_path(&collections, e))?;
        fsutil::fsync_dir(&self.dbpath).map_err(|e| StorageError::io_at_path(&self.dbpath, e))?;
        trace_event(Event::OplogFsync, &[("dbpath", &self.dbpath.display().to_string())]);
        Ok(())
    }

    /// Take a checkpoint at the top of the oplog.
    ///
    /// # Errors
    ///
    /// `PITR_STORAGE_CHECKPOINT_PINNED` while a backup cursor is open.
    pub fn checkpoint(&mut self) -> StorageResult<Timestamp> {
        if self.checkpoint_pinned {
            return Err(StorageError::checkpoint_pinned());
        }
        self.fsync()?;

        let ts = self
            .oplog
            .top()
            .map_or(self.marker.checkpoint_timestamp, |top| {
                top.max(self.marker.checkpoint_timestamp)
            });
        let marker = CheckpointMarker::new(ts, self.marker.oldest_timestamp);
        marker.write_to_file(&marker_path(&self.dbpath))?;
        self.marker = marker;

        log_event_with_fields(
            Event::CheckpointTaken,
            &[
                ("checkpoint_ts", &ts.to_string()),
                ("dbpath", &self.dbpath.display().to_string()),
            ],
        );
        Ok(ts)
    }

    /// Whether a backup cursor pins the current checkpoint
    pub fn is_checkpoint_pinned(&self) -> bool {
        self.checkpoint_pinned
    }

    pub(crate) fn set_checkpoint_pinned(&mut self, pinned: bool) {
        self.checkpoint_pinned = pinned;
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Documents of `namespace` visible at `ts`.
    ///
    /// # Errors
    ///
    /// - `PITR_STORAGE_SNAPSHOT_TOO_OLD` if `ts` is below the oldest timestamp
    /// - `PITR_STORAGE_NAMESPACE_NOT_FOUND` if the namespace is not catalogued
    pub fn read_at(&self, namespace: &str, ts: Timestamp) -> StorageResult<DocumentSet> {
        if ts < self.marker.oldest_timestamp {
            return Err(StorageError::snapshot_too_old(
                ts,
                self.marker.oldest_timestamp,
            ));
        }
        self.file_for(namespace)?.visible_at(ts)
    }

    /// Hex SHA-256 of the documents of `namespace` visible at `ts`.
    ///
    /// Documents are hashed in id order as `id \0 json \n`, with object keys
    /// in sorted order, so equal contents hash equally across dbpaths.
    pub fn namespace_hash(&self, namespace: &str, ts: Timestamp) -> StorageResult<String> {
        Ok(hash_documents(&self.read_at(namespace, ts)?))
    }

    // ------------------------------------------------------------------
    // Restore hooks
    // ------------------------------------------------------------------

    /// Check the data files are a consistent image of the checkpoint:
    /// every catalogued file exists, every record verifies, and no record
    /// is newer than the checkpoint timestamp.
    pub(crate) fn validate_checkpoint(&self) -> StorageResult<usize> {
        let checkpoint_ts = self.marker.checkpoint_timestamp;
        let mut records = 0usize;
        for entry in self.catalog.entries() {
            let file = CollectionFile::at(&self.dbpath, &entry.ident);
            if !file.exists() {
                return Err(StorageError::corruption(format!(
                    "Data file {} for {} is missing",
                    entry.ident, entry.namespace
                )));
            }
            for record in file.read_all()? {
                if record.timestamp > checkpoint_ts {
                    return Err(StorageError::corruption(format!(
                        "Record {} in {} at {} is newer than checkpoint {}",
                        record.document_id, entry.namespace, record.timestamp, checkpoint_ts
                    )));
                }
                records += 1;
            }
        }
        Ok(records)
    }

    /// Remove oplog entries newer than `ts`
    pub(crate) fn truncate_oplog_after(&mut self, ts: Timestamp) -> StorageResult<usize> {
        Ok(self.oplog.truncate_after(ts)?)
    }

    /// Remove a collection from the catalog and delete its data file,
    /// without logging an oplog entry.
    pub(crate) fn discard_collection(&mut self, namespace: &str) -> StorageResult<CatalogEntry> {
        let removed = self.catalog.remove(namespace)?;
        self.catalog.save(&self.dbpath)?;
        CollectionFile::at(&self.dbpath, &removed.ident).remove()?;
        Ok(removed)
    }

    /// Replace the minValid document
    pub(crate) fn rewrite_min_valid(&mut self, min_valid: MinValid) -> StorageResult<()> {
        min_valid.save(&self.dbpath)?;
        self.min_valid = min_valid;
        Ok(())
    }

    /// Replace the replica-set configuration
    pub(crate) fn rewrite_replset_config(&mut self, config: ReplSetConfig) -> StorageResult<()> {
        config.save(&self.dbpath)?;
        self.replset = config;
        Ok(())
    }

    /// Compact history to what is visible at `stable` and take a stable
    /// checkpoint there. Afterwards reads below `stable` fail.
    pub(crate) fn take_stable_checkpoint(&mut self, stable: Timestamp) -> StorageResult<()> {
        if let Some(top) = self.oplog.top() {
            if top > stable {
                return Err(StorageError::corruption(format!(
                    "Oplog top {} is newer than stable timestamp {}",
                    top, stable
                )));
            }
        }

        for entry in self.catalog.entries() {
            let file = CollectionFile::at(&self.dbpath, &entry.ident);
            let records = file.read_all()?;
            let compacted = compact_at(&records, stable).map_err(|newer| {
                StorageError::corruption(format!(
                    "Record at {} in {} is newer than stable timestamp {}",
                    newer, entry.namespace, stable
                ))
            })?;
            if compacted.len() != records.len() {
                file.rewrite(&compacted)?;
            }
        }

        self.fsync()?;
        let marker = CheckpointMarker::stable(stable);
        marker.write_to_file(&marker_path(&self.dbpath))?;
        self.marker = marker;
        if stable > self.clock.last() {
            self.clock = LogicalClock::starting_after(stable);
        }

        log_event_with_fields(
            Event::CheckpointTaken,
            &[
                ("checkpoint_ts", &stable.to_string()),
                ("stable", "true"),
                ("dbpath", &self.dbpath.display().to_string()),
            ],
        );
        Ok(())
    }
}

/// Hex SHA-256 over a document set
pub fn hash_documents(documents: &DocumentSet) -> String {
    let mut hasher = Sha256::new();
    for (id, body) in documents {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
        hasher.update(body.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
