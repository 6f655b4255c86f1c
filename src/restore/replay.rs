//! ReplayingLog stage and the higher-term no-op
//!
//! Entries must arrive strictly ascending and inside
//! `(checkpoint, point_in_time]`; anything else is fatal. Entries on
//! namespaces dropped by selective restore are recorded as no-ops so the
//! local oplog still ends at the last replayed timestamp.

use super::config::RestoreConfiguration;
use super::errors::{RestoreError, RestoreResult};
use crate::crash_point::{maybe_crash, points};
use crate::observability::{log_event_with_fields, trace_event, Event};
use crate::oplog::{OpType, OplogEntry};
use crate::storage::StorageEngine;
use crate::timestamp::Timestamp;

/// Replay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Entries applied to data
    pub applied: u64,
    /// Entries on excluded namespaces, logged as no-ops
    pub skipped: u64,
    /// Timestamp of the last entry consumed
    pub last_timestamp: Option<Timestamp>,
}

impl ReplayStats {
    /// Entries consumed in total
    pub fn consumed(&self) -> u64 {
        self.applied + self.skipped
    }
}

/// Replay `entries` onto `storage`
pub fn replay_entries<I>(
    storage: &mut StorageEngine,
    entries: I,
    config: &RestoreConfiguration,
    checkpoint: Timestamp,
    point_in_time: Timestamp,
) -> RestoreResult<ReplayStats>
where
    I: IntoIterator<Item = OplogEntry>,
{
    let mut stats = ReplayStats::default();

    for entry in entries {
        if let Some(previous) = stats.last_timestamp {
            if entry.timestamp <= previous {
                return Err(RestoreError::out_of_order(previous, entry.timestamp));
            }
        }
        if entry.timestamp <= checkpoint || entry.timestamp > point_in_time {
            return Err(RestoreError::out_of_range(
                entry.timestamp,
                checkpoint,
                point_in_time,
            ));
        }

        if entry.op != OpType::Noop && !config.keeps_namespace(&entry.namespace) {
            let placeholder = OplogEntry::noop(
                entry.timestamp,
                entry.term,
                format!(
                    "selective restore skipped {} on {}",
                    entry.op.as_str(),
                    entry.namespace
                ),
            );
            storage.apply_entry(&placeholder)?;
            stats.skipped += 1;
            trace_event(
                Event::ReplaySkipped,
                &[("ns", &entry.namespace), ("ts", &entry.timestamp.to_string())],
            );
        } else {
            storage.apply_entry(&entry)?;
            stats.applied += 1;
            trace_event(
                Event::ReplayEntry,
                &[
                    ("ns", &entry.namespace),
                    ("op", entry.op.as_str()),
                    ("ts", &entry.timestamp.to_string()),
                ],
            );
        }
        stats.last_timestamp = Some(entry.timestamp);
        maybe_crash(points::RESTORE_DURING_REPLAY);
    }

    Ok(stats)
}

/// Append the no-op that lifts the node into term `higher_than + 100`,
/// one tick after the newest entry. Returns its timestamp.
///
/// The term must be above every term already in the log, replayed
/// entries included.
pub fn apply_higher_term_noop(
    storage: &mut StorageEngine,
    higher_than: i64,
    after: Timestamp,
) -> RestoreResult<Timestamp> {
    let term = higher_than
        .checked_add(super::HIGHER_TERM_INCREMENT)
        .ok_or_else(|| {
            RestoreError::config(format!("restore_to_higher_term_than {} overflows", higher_than))
        })?;
    let config_term = storage.replset_config().term;
    let newest_term = storage
        .last_applied_term()
        .map_or(config_term, |t| t.max(config_term));
    if term <= newest_term {
        return Err(RestoreError::config(format!(
            "restore_to_higher_term_than {} gives term {}, not above replayed term {}",
            higher_than, term, newest_term
        )));
    }

    let top = storage.top_of_oplog().map_or(after, |top| top.max(after));
    let ts = top.next_tick();

    storage.apply_entry(&OplogEntry::noop(
        ts,
        term,
        format!("restore to higher term than {}", higher_than),
    ))?;

    log_event_with_fields(
        Event::HigherTermNoop,
        &[("term", &term.to_string()), ("ts", &ts.to_string())],
    );
    Ok(ts)
}
