//! Storage model of one dbpath
//!
//! # Layout
//!
//! ```text
//! <dbpath>/
//! ├── catalog.json
//! ├── checkpoint.json
//! ├── metadata/min_valid.json
//! ├── metadata/replset_config.json
//! ├── oplog/oplog.log
//! ├── collections/<uuid>.dat
//! ├── .lock             (present while an owner holds the dbpath)
//! └── restore.failed    (present after a fatal restore)
//! ```
//!
//! Collection files and the oplog only grow between checkpoints, so a
//! prefix of each taken at checkpoint time is a consistent backup image.
//! The JSON metadata documents are replaced atomically.

mod catalog;
mod collection;
mod engine;
mod errors;
pub(crate) mod fsutil;
mod lock;
mod marker;
mod record;
mod replication;

pub use catalog::{is_valid_namespace, Catalog, CatalogEntry};
pub use collection::{collection_ident, CollectionFile, DocumentSet};
pub use engine::{hash_documents, StorageEngine, DEFAULT_MEMBER_HOST};
pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use lock::DbPathLock;
pub use marker::{marker_path, CheckpointMarker};
pub use record::DocumentRecord;
pub use replication::{MinValid, ReplSetConfig, ReplSetMember};

/// Collection catalog
pub const CATALOG_FILE: &str = "catalog.json";
/// Checkpoint marker
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
/// minValid document
pub const MIN_VALID_FILE: &str = "metadata/min_valid.json";
/// Replica-set configuration
pub const REPLSET_CONFIG_FILE: &str = "metadata/replset_config.json";
/// Collection data directory
pub const COLLECTIONS_DIR: &str = "collections";
/// Exclusive ownership lock
pub const LOCK_FILE: &str = ".lock";
/// Left behind by a fatal restore
pub const RESTORE_FAILED_FILE: &str = "restore.failed";

/// Files every openable dbpath carries
pub const REQUIRED_FILES: [&str; 5] = [
    CATALOG_FILE,
    CHECKPOINT_FILE,
    MIN_VALID_FILE,
    REPLSET_CONFIG_FILE,
    crate::oplog::OPLOG_RELATIVE_PATH,
];
