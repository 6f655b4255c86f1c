//! Restore engine
//!
//! Drives one staged dbpath through the restore state machine. The engine
//! owns the dbpath for its whole run through the `.lock` file; on any
//! error it exits FATAL, leaves the lock behind and writes
//! `restore.failed`, so a half-restored dbpath can never be opened as a
//! node. Nothing is retried.

use std::path::{Path, PathBuf};

use super::checkpoint::apply_checkpoint;
use super::config::RestoreConfiguration;
use super::errors::{RestoreError, RestoreErrorCode, RestoreResult};
use super::metadata::rewrite_metadata;
use super::outcome::{RestoreFailure, RestoreOutcome};
use super::replay::{apply_higher_term_noop, replay_entries, ReplayStats};
use super::state::{ExitStatus, RestoreState};
use crate::channel::{ChannelReader, RetryPolicy};
use crate::crash_point::{maybe_crash, points};
use crate::observability::{log_event_with_fields, Event, Logger, ObservationScope};
use crate::oplog::OplogEntry;
use crate::storage::{DbPathLock, StorageEngine, StorageError};

/// Restore engine for one staged dbpath
#[derive(Debug)]
pub struct RestoreEngine {
    dbpath: PathBuf,
    state: RestoreState,
}

impl RestoreEngine {
    /// Engine for the staged dbpath at `dbpath`
    pub fn new(dbpath: impl Into<PathBuf>) -> Self {
        Self {
            dbpath: dbpath.into(),
            state: RestoreState::Uninitialized,
        }
    }

    /// Staged dbpath
    pub fn dbpath(&self) -> &Path {
        &self.dbpath
    }

    /// Current state
    pub fn state(&self) -> RestoreState {
        self.state
    }

    fn transition(&mut self, next: RestoreState) -> RestoreResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RestoreError::failed(format!(
                "Illegal restore transition {} -> {}",
                self.state, next
            )));
        }
        log_event_with_fields(
            Event::RestoreTransition,
            &[("from", self.state.as_str()), ("to", next.as_str())],
        );
        self.state = next;
        Ok(())
    }

    /// Run the restore, reading its configuration from the channel at
    /// `channel_path`.
    ///
    /// # Errors
    ///
    /// Every error is FATAL:
    /// - `PITR_RESTORE_CONTENTION` if another owner holds the dbpath
    /// - `PITR_RESTORE_CONFIG` for an absent, malformed or inapplicable
    ///   configuration
    /// - `PITR_RESTORE_ORDERING` for log entries out of order or range
    /// - `PITR_RESTORE_CORRUPTION` / `PITR_RESTORE_IO` for a bad staged
    ///   checkpoint or filesystem failure
    pub fn run(mut self, channel_path: &Path, policy: RetryPolicy) -> RestoreResult<RestoreOutcome> {
        let dbpath = self.dbpath.display().to_string();
        log_event_with_fields(
            Event::RestoreStart,
            &[("dbpath", &dbpath), ("channel", &channel_path.display().to_string())],
        );

        self.transition(RestoreState::LoadingConfig)?;
        let lock = match self.acquire() {
            Ok(lock) => lock,
            Err(err) => {
                self.fail(None, &err);
                return Err(err);
            }
        };

        match self.execute(channel_path, policy) {
            Ok(outcome) => {
                self.transition(RestoreState::Exited(ExitStatus::Clean))?;
                lock.release()?;
                log_event_with_fields(
                    Event::RestoreComplete,
                    &[
                        ("dbpath", &dbpath),
                        ("stable_ts", &outcome.stable_recovery_timestamp.to_string()),
                        ("term", &outcome.replication_config_term.to_string()),
                        ("applied", &outcome.entries_applied.to_string()),
                    ],
                );
                Ok(outcome)
            }
            Err(err) => {
                self.fail(Some(lock), &err);
                Err(err)
            }
        }
    }

    fn acquire(&self) -> RestoreResult<DbPathLock> {
        let lock = DbPathLock::acquire(&self.dbpath)?;
        if RestoreFailure::path_in(&self.dbpath).exists() {
            return Err(StorageError::restore_failed(&self.dbpath).into());
        }
        Ok(lock)
    }

    fn execute(&mut self, channel_path: &Path, policy: RetryPolicy) -> RestoreResult<RestoreOutcome> {
        maybe_crash(points::RESTORE_AFTER_LOCK);

        let mut channel = ChannelReader::open(channel_path, policy).map_err(|e| {
            RestoreError::config_with_source(
                format!("Failed to read restore channel {}", channel_path.display()),
                e,
            )
        })?;
        let config = channel.config().clone();
        config.validate()?;
        if !config.is_point_in_time() && channel.remaining() > 0 {
            return Err(RestoreError::config(format!(
                "Channel carries {} log entries but no point_in_time_timestamp",
                channel.remaining()
            )));
        }
        maybe_crash(points::RESTORE_AFTER_CONFIG);

        self.transition(RestoreState::ApplyingCheckpoint)?;
        let dbpath = self.dbpath.display().to_string();
        let scope = ObservationScope::with_fields("RESTORE_APPLY_CHECKPOINT", &[("dbpath", &dbpath)]);
        let mut storage = StorageEngine::open_unlocked(&self.dbpath)?;
        let summary = apply_checkpoint(&mut storage, &config)?;
        let checkpoint_ts = summary.checkpoint_timestamp;
        scope.complete_with_fields(&[
            ("checkpoint_ts", &checkpoint_ts.to_string()),
            ("records", &summary.records_verified.to_string()),
            ("truncated", &summary.oplog_entries_truncated.to_string()),
            ("dropped", &summary.dropped_namespaces.len().to_string()),
        ]);
        maybe_crash(points::RESTORE_AFTER_CHECKPOINT_APPLIED);

        let mut stats = ReplayStats::default();
        if let Some(pit) = config.point_in_time_timestamp {
            self.transition(RestoreState::ReplayingLog)?;
            stats = self.replay(&mut storage, summary.staged_tail, &mut channel, &config, pit)?;
            maybe_crash(points::RESTORE_AFTER_REPLAY);
        }

        let higher_term_noop = match config.restore_to_higher_term_than {
            Some(term) => Some(apply_higher_term_noop(&mut storage, term, checkpoint_ts)?),
            None => None,
        };

        self.transition(RestoreState::RewritingMetadata)?;
        let replication_config_term = rewrite_metadata(&mut storage)?;
        maybe_crash(points::RESTORE_AFTER_METADATA);

        self.transition(RestoreState::FinalizingCheckpoint)?;
        let stable = storage
            .top_of_oplog()
            .map_or(checkpoint_ts, |top| top.max(checkpoint_ts));
        maybe_crash(points::RESTORE_BEFORE_STABLE_CHECKPOINT);
        storage.take_stable_checkpoint(stable)?;

        let outcome = RestoreOutcome {
            stable_recovery_timestamp: stable,
            min_valid: storage.min_valid(),
            replication_config_term,
            entries_applied: stats.applied,
            entries_skipped: stats.skipped,
            higher_term_noop,
            final_state: RestoreState::Exited(ExitStatus::Clean),
        };
        outcome.write_to(&self.dbpath)?;
        storage.close()?;
        Ok(outcome)
    }

    fn replay(
        &self,
        storage: &mut StorageEngine,
        staged_tail: Vec<OplogEntry>,
        channel: &mut ChannelReader,
        config: &RestoreConfiguration,
        pit: crate::timestamp::Timestamp,
    ) -> RestoreResult<ReplayStats> {
        let checkpoint_ts = storage.checkpoint_marker().checkpoint_timestamp;
        if pit <= checkpoint_ts {
            return Err(RestoreError::config(format!(
                "point_in_time_timestamp {} is not after checkpoint {}",
                pit, checkpoint_ts
            )));
        }

        let scope = ObservationScope::with_fields(
            "RESTORE_REPLAY",
            &[("from", &checkpoint_ts.to_string()), ("to", &pit.to_string())],
        );
        // Entries staged by a cursor extension come first; past the
        // point in time they are dropped
        let staged: Vec<OplogEntry> = staged_tail
            .into_iter()
            .take_while(|e| e.timestamp <= pit)
            .collect();
        let staged_count = staged.len();
        let stats = replay_entries(
            storage,
            staged
                .into_iter()
                .chain(std::iter::from_fn(|| channel.next_entry())),
            config,
            checkpoint_ts,
            pit,
        )?;
        if stats.consumed() == 0 {
            return Err(RestoreError::config(format!(
                "No log entries to replay between {} and {}",
                checkpoint_ts, pit
            )));
        }
        scope.complete_with_fields(&[
            ("applied", &stats.applied.to_string()),
            ("skipped", &stats.skipped.to_string()),
            ("staged", &staged_count.to_string()),
        ]);
        Ok(stats)
    }

    fn fail(&mut self, lock: Option<DbPathLock>, err: &RestoreError) {
        let failed_in = self.state;
        if !self.state.is_terminal() {
            log_event_with_fields(
                Event::RestoreTransition,
                &[("from", failed_in.as_str()), ("to", "EXITED_FATAL")],
            );
            self.state = RestoreState::Exited(ExitStatus::Fatal);
        }

        if let Some(lock) = lock {
            if err.code() != RestoreErrorCode::PitrRestoreContention {
                if let Err(e) = RestoreFailure::new(err, failed_in).write_to(&self.dbpath) {
                    Logger::error(
                        "RESTORE_FAILED_MARKER_WRITE",
                        &[("dbpath", &self.dbpath.display().to_string()), ("error", &e.to_string())],
                    );
                }
            }
            lock.abandon();
        }

        log_event_with_fields(
            Event::RestoreFailed,
            &[
                ("code", err.code().as_str()),
                ("state", failed_in.as_str()),
                ("dbpath", &self.dbpath.display().to_string()),
                ("error", &err.to_string()),
            ],
        );
    }
}

/// Restore the staged dbpath at `dbpath` from the channel at `channel_path`
pub fn restore(dbpath: &Path, channel_path: &Path, policy: RetryPolicy) -> RestoreResult<RestoreOutcome> {
    RestoreEngine::new(dbpath).run(channel_path, policy)
}
