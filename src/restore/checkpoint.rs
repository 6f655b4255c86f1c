//! ApplyingCheckpoint stage
//!
//! Applies selective restore to the catalog, validates the staged
//! checkpoint, then trims oplog entries the backup copied past it.
//! Excluded collections go first: their data files were never staged.
//! Trimmed entries come from a backup cursor extension; a point-in-time
//! restore replays them ahead of the channel tail.

use super::config::RestoreConfiguration;
use super::errors::{RestoreError, RestoreResult};
use crate::observability::{log_event_with_fields, Event};
use crate::oplog::{LogTail, OplogEntry};
use crate::storage::{StorageEngine, StorageError};
use crate::timestamp::Timestamp;

/// What the stage did
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSummary {
    /// Timestamp of the staged checkpoint
    pub checkpoint_timestamp: Timestamp,
    /// Data records verified
    pub records_verified: usize,
    /// Oplog entries removed past the checkpoint
    pub oplog_entries_truncated: usize,
    /// Namespaces removed by selective restore
    pub dropped_namespaces: Vec<String>,
    /// The removed entries, ascending
    pub staged_tail: Vec<OplogEntry>,
}

/// Validate and prepare the staged checkpoint
pub fn apply_checkpoint(
    storage: &mut StorageEngine,
    config: &RestoreConfiguration,
) -> RestoreResult<CheckpointSummary> {
    let checkpoint_timestamp = storage.checkpoint_marker().checkpoint_timestamp;
    if let Some(term) = config.restore_to_higher_term_than {
        let noop_term = term + super::HIGHER_TERM_INCREMENT;
        let source_term = storage.replset_config().term;
        if noop_term <= source_term {
            return Err(RestoreError::config(format!(
                "restore_to_higher_term_than {} yields term {}, not above source term {}",
                term, noop_term, source_term
            )));
        }
    }

    for requested in &config.collections_to_restore {
        match storage.catalog().find(&requested.namespace) {
            None => {
                return Err(RestoreError::config(format!(
                    "Requested namespace {} is not in the staged checkpoint",
                    requested.namespace
                )))
            }
            Some(found) if found.uuid != requested.uuid => {
                return Err(RestoreError::config(format!(
                    "Requested namespace {} has uuid {} but the staged catalog has {}",
                    requested.namespace, requested.uuid, found.uuid
                )))
            }
            Some(_) => {}
        }
    }

    let mut dropped_namespaces = Vec::new();
    if config.is_selective() {
        let excluded: Vec<String> = storage
            .catalog()
            .entries()
            .iter()
            .filter(|c| !config.keeps_namespace(&c.namespace))
            .map(|c| c.namespace.clone())
            .collect();
        for namespace in excluded {
            let removed = storage.discard_collection(&namespace)?;
            log_event_with_fields(
                Event::CollectionDropped,
                &[("ns", &namespace), ("uuid", &removed.uuid.to_string())],
            );
            dropped_namespaces.push(namespace);
        }
    }

    let records_verified = storage.validate_checkpoint()?;
    let staged_tail = LogTail::entries_after(&storage.oplog_path(), checkpoint_timestamp)
        .map_err(StorageError::from)?;
    let oplog_entries_truncated = storage.truncate_oplog_after(checkpoint_timestamp)?;

    Ok(CheckpointSummary {
        checkpoint_timestamp,
        records_verified,
        oplog_entries_truncated,
        dropped_namespaces,
        staged_tail,
    })
}
