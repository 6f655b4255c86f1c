//! What the verifier can observe of a restored node

use crate::storage::{DocumentSet, MinValid, ReplSetConfig, StorageEngine, StorageResult};
use crate::timestamp::Timestamp;

/// Read-only view of a restored node
pub trait RestoredNode {
    /// Replica-set configuration
    fn replset_config(&self) -> &ReplSetConfig;

    /// minValid document
    fn min_valid(&self) -> MinValid;

    /// Timestamp of the stable checkpoint, if there is one
    fn last_stable_recovery_timestamp(&self) -> Option<Timestamp>;

    /// Namespaces in the catalog
    fn namespaces(&self) -> Vec<String>;

    /// Snapshot read of one namespace
    fn read_at(&self, namespace: &str, ts: Timestamp) -> StorageResult<DocumentSet>;
}

impl RestoredNode for StorageEngine {
    fn replset_config(&self) -> &ReplSetConfig {
        StorageEngine::replset_config(self)
    }

    fn min_valid(&self) -> MinValid {
        StorageEngine::min_valid(self)
    }

    fn last_stable_recovery_timestamp(&self) -> Option<Timestamp> {
        StorageEngine::last_stable_recovery_timestamp(self)
    }

    fn namespaces(&self) -> Vec<String> {
        self.catalog()
            .entries()
            .iter()
            .map(|c| c.namespace.clone())
            .collect()
    }

    fn read_at(&self, namespace: &str, ts: Timestamp) -> StorageResult<DocumentSet> {
        StorageEngine::read_at(self, namespace, ts)
    }
}
