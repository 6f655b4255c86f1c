//! Replication metadata documents
//!
//! `metadata/min_valid.json` and `metadata/replset_config.json`. A restored
//! node carries the minValid sentinel, which tells startup there is no
//! partially applied batch to recover.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{StorageError, StorageResult};
use super::fsutil;
use crate::timestamp::Timestamp;

/// Replication consistency marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinValid {
    /// Term of the minValid optime
    pub term: i64,
    /// Timestamp of the minValid optime
    pub timestamp: Timestamp,
}

impl MinValid {
    /// The value every restored node carries: `{term: -1, timestamp: (0, 1)}`
    pub const SENTINEL: MinValid = MinValid {
        term: -1,
        timestamp: Timestamp::MIN_VALID,
    };

    /// Whether this is the restored-node sentinel
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    /// Load from a dbpath
    pub fn load(dbpath: &Path) -> StorageResult<Self> {
        let path = dbpath.join(super::MIN_VALID_FILE);
        fsutil::read_json(&path).map_err(|e| StorageError::io_at_path(&path, e))
    }

    /// Persist atomically into a dbpath
    pub fn save(&self, dbpath: &Path) -> StorageResult<()> {
        let path = dbpath.join(super::MIN_VALID_FILE);
        fsutil::write_json(&path, self).map_err(|e| StorageError::io_at_path(&path, e))
    }
}

/// One replica-set member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplSetMember {
    /// Member id
    pub id: u32,
    /// `host:port`
    pub host: String,
}

/// Replica-set configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplSetConfig {
    /// Replica-set name
    pub set_name: String,
    /// Config version, bumped on every rewrite
    pub version: u64,
    /// Election term the config was written in
    pub term: i64,
    /// Members
    pub members: Vec<ReplSetMember>,
}

impl ReplSetConfig {
    /// Single-member config at term 1
    pub fn initial(set_name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            set_name: set_name.into(),
            version: 1,
            term: 1,
            members: vec![ReplSetMember {
                id: 0,
                host: host.into(),
            }],
        }
    }

    /// Load from a dbpath
    pub fn load(dbpath: &Path) -> StorageResult<Self> {
        let path = dbpath.join(super::REPLSET_CONFIG_FILE);
        fsutil::read_json(&path).map_err(|e| StorageError::io_at_path(&path, e))
    }

    /// Persist atomically into a dbpath
    pub fn save(&self, dbpath: &Path) -> StorageResult<()> {
        let path = dbpath.join(super::REPLSET_CONFIG_FILE);
        fsutil::write_json(&path, self).map_err(|e| StorageError::io_at_path(&path, e))
    }
}
