//! Restore configuration
//!
//! The first frame of the restore channel. Validated while it is
//! deserialized: unknown fields, negative terms, malformed or duplicate
//! namespaces and a null point-in-time timestamp are all rejected, so a
//! `RestoreConfiguration` value is always well formed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{RestoreError, RestoreResult};
use crate::storage::is_valid_namespace;
use crate::timestamp::Timestamp;

/// Kind of node being restored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    /// Replica-set member
    ReplicaSet,
}

/// A collection kept by selective restore
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionToRestore {
    /// `db.coll` namespace
    pub namespace: String,
    /// Collection uuid in the source catalog
    pub uuid: Uuid,
}

/// Validated restore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRestoreConfiguration")]
pub struct RestoreConfiguration {
    /// Node type
    pub node_type: NodeType,

    /// Replay log entries up to and including this timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_in_time_timestamp: Option<Timestamp>,

    /// Force the restored node's term above this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_to_higher_term_than: Option<i64>,

    /// Selective restore set; empty restores everything
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections_to_restore: Vec<CollectionToRestore>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRestoreConfiguration {
    node_type: NodeType,
    #[serde(default)]
    point_in_time_timestamp: Option<Timestamp>,
    #[serde(default)]
    restore_to_higher_term_than: Option<i64>,
    #[serde(default)]
    collections_to_restore: Vec<CollectionToRestore>,
}

impl TryFrom<RawRestoreConfiguration> for RestoreConfiguration {
    type Error = String;

    fn try_from(raw: RawRestoreConfiguration) -> Result<Self, Self::Error> {
        let config = Self {
            node_type: raw.node_type,
            point_in_time_timestamp: raw.point_in_time_timestamp,
            restore_to_higher_term_than: raw.restore_to_higher_term_than,
            collections_to_restore: raw.collections_to_restore,
        };
        config.check()?;
        Ok(config)
    }
}

impl RestoreConfiguration {
    /// Plain replica-set restore to the checkpoint
    pub fn replica_set() -> Self {
        Self {
            node_type: NodeType::ReplicaSet,
            point_in_time_timestamp: None,
            restore_to_higher_term_than: None,
            collections_to_restore: Vec::new(),
        }
    }

    /// Replay up to `ts`
    pub fn with_point_in_time(mut self, ts: Timestamp) -> Self {
        self.point_in_time_timestamp = Some(ts);
        self
    }

    /// Force the term above `term`
    pub fn with_higher_term_than(mut self, term: i64) -> Self {
        self.restore_to_higher_term_than = Some(term);
        self
    }

    /// Restrict to `collections`
    pub fn with_collections(mut self, collections: Vec<CollectionToRestore>) -> Self {
        self.collections_to_restore = collections;
        self
    }

    /// Whether log replay is requested
    pub fn is_point_in_time(&self) -> bool {
        self.point_in_time_timestamp.is_some()
    }

    /// Whether selective restore is requested
    pub fn is_selective(&self) -> bool {
        !self.collections_to_restore.is_empty()
    }

    /// Whether `namespace` survives selective restore
    pub fn keeps_namespace(&self, namespace: &str) -> bool {
        !self.is_selective()
            || self
                .collections_to_restore
                .iter()
                .any(|c| c.namespace == namespace)
    }

    /// Validate a configuration built in code
    pub fn validate(&self) -> RestoreResult<()> {
        self.check().map_err(RestoreError::config)
    }

    fn check(&self) -> Result<(), String> {
        if let Some(term) = self.restore_to_higher_term_than {
            if term < 0 {
                return Err(format!(
                    "restore_to_higher_term_than must be >= 0, got {}",
                    term
                ));
            }
            // The no-op takes term + increment and the config one more
            if term.checked_add(super::HIGHER_TERM_INCREMENT + 1).is_none() {
                return Err(format!("restore_to_higher_term_than {} overflows", term));
            }
        }
        if let Some(ts) = self.point_in_time_timestamp {
            if ts.is_null() {
                return Err("point_in_time_timestamp must not be null".to_string());
            }
        }

        let mut seen_namespaces = std::collections::HashSet::new();
        let mut seen_uuids = std::collections::HashSet::new();
        for collection in &self.collections_to_restore {
            if !is_valid_namespace(&collection.namespace) {
                return Err(format!(
                    "Invalid namespace '{}' in collections_to_restore",
                    collection.namespace
                ));
            }
            if !seen_namespaces.insert(collection.namespace.as_str()) {
                return Err(format!(
                    "Duplicate namespace '{}' in collections_to_restore",
                    collection.namespace
                ));
            }
            if !seen_uuids.insert(collection.uuid) {
                return Err(format!(
                    "Duplicate uuid {} in collections_to_restore",
                    collection.uuid
                ));
            }
        }
        Ok(())
    }

    /// Parse and validate JSON
    pub fn from_json(bytes: &[u8]) -> RestoreResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| RestoreError::config_with_source("Invalid restore configuration", e))
    }

    /// Render as JSON
    pub fn to_json(&self) -> RestoreResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| RestoreError::config_with_source("Unserializable restore configuration", e))
    }
}
