//! Persisted restore results
//!
//! A clean exit leaves `metadata/restore_outcome.json`; a fatal one leaves
//! `restore.failed`, which also keeps the dbpath from being opened.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{RestoreError, RestoreResult};
use super::state::RestoreState;
use crate::storage::fsutil::{read_json, write_json};
use crate::storage::{MinValid, RESTORE_FAILED_FILE};
use crate::timestamp::Timestamp;

/// Relative path of the outcome document
pub const RESTORE_OUTCOME_FILE: &str = "metadata/restore_outcome.json";

/// What a clean restore produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// Stable checkpoint taken at the end of the restore
    pub stable_recovery_timestamp: Timestamp,
    /// minValid after the restore (always the sentinel)
    pub min_valid: MinValid,
    /// Term written into the replica-set config
    pub replication_config_term: i64,
    /// Log entries applied during replay
    pub entries_applied: u64,
    /// Log entries on excluded namespaces, recorded as no-ops
    pub entries_skipped: u64,
    /// Timestamp of the higher-term no-op, if one was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub higher_term_noop: Option<Timestamp>,
    /// Terminal engine state
    pub final_state: RestoreState,
}

impl RestoreOutcome {
    /// Outcome path inside `dbpath`
    pub fn path_in(dbpath: &Path) -> PathBuf {
        dbpath.join(RESTORE_OUTCOME_FILE)
    }

    /// Persist atomically into `dbpath`
    pub fn write_to(&self, dbpath: &Path) -> RestoreResult<()> {
        let path = Self::path_in(dbpath);
        write_json(&path, self)
            .map_err(|e| RestoreError::io(format!("Failed to write {}", path.display()), e))
    }

    /// Load the outcome of an earlier restore
    pub fn read_from(dbpath: &Path) -> RestoreResult<Self> {
        let path = Self::path_in(dbpath);
        read_json(&path)
            .map_err(|e| RestoreError::io(format!("Failed to read {}", path.display()), e))
    }
}

/// Contents of the `restore.failed` marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreFailure {
    /// `PITR_RESTORE_*` code
    pub code: String,
    /// Error message
    pub message: String,
    /// State the engine was in when it failed
    pub state: RestoreState,
    /// RFC3339 failure time
    pub failed_at: String,
}

impl RestoreFailure {
    /// Describe `err` raised in `state`
    pub fn new(err: &RestoreError, state: RestoreState) -> Self {
        Self {
            code: err.code().as_str().to_string(),
            message: err.to_string(),
            state,
            failed_at: Utc::now().to_rfc3339(),
        }
    }

    /// Marker path inside `dbpath`
    pub fn path_in(dbpath: &Path) -> PathBuf {
        dbpath.join(RESTORE_FAILED_FILE)
    }

    /// Persist atomically into `dbpath`
    pub fn write_to(&self, dbpath: &Path) -> std::io::Result<()> {
        write_json(&Self::path_in(dbpath), self)
    }

    /// Load the marker, if the dbpath has one
    pub fn read_from(dbpath: &Path) -> RestoreResult<Option<Self>> {
        let path = Self::path_in(dbpath);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path)
            .map(Some)
            .map_err(|e| RestoreError::io(format!("Failed to read {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::ExitStatus;
    use tempfile::TempDir;

    #[test]
    fn test_outcome_persists() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("metadata")).unwrap();
        let outcome = RestoreOutcome {
            stable_recovery_timestamp: Timestamp::new(10, 3),
            min_valid: MinValid::SENTINEL,
            replication_config_term: 2,
            entries_applied: 4,
            entries_skipped: 1,
            higher_term_noop: None,
            final_state: RestoreState::Exited(ExitStatus::Clean),
        };
        outcome.write_to(temp.path()).unwrap();
        assert_eq!(RestoreOutcome::read_from(temp.path()).unwrap(), outcome);
    }

    #[test]
    fn test_failure_marker() {
        let temp = TempDir::new().unwrap();
        assert_eq!(RestoreFailure::read_from(temp.path()).unwrap(), None);

        let err = RestoreError::config("no entries");
        RestoreFailure::new(&err, RestoreState::ReplayingLog)
            .write_to(temp.path())
            .unwrap();
        let marker = RestoreFailure::read_from(temp.path()).unwrap().unwrap();
        assert_eq!(marker.code, "PITR_RESTORE_CONFIG");
        assert_eq!(marker.state, RestoreState::ReplayingLog);
    }
}
