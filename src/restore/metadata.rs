//! RewritingMetadata stage

use super::errors::{RestoreError, RestoreResult};
use crate::storage::{MinValid, StorageEngine};

/// Install the minValid sentinel and move the replica-set config into a
/// new term: `max(source term, last applied term) + 1`. Returns the term.
pub fn rewrite_metadata(storage: &mut StorageEngine) -> RestoreResult<i64> {
    let mut config = storage.replset_config().clone();
    let last_applied = storage.last_applied_term().unwrap_or(config.term);
    let newest = config.term.max(last_applied);
    let term = newest.checked_add(1).ok_or_else(|| {
        RestoreError::config(format!("No term above {} to move the config into", newest))
    })?;

    config.term = term;
    config.version += 1;
    storage.rewrite_replset_config(config)?;
    storage.rewrite_min_valid(MinValid::SENTINEL)?;
    Ok(term)
}
