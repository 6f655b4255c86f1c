//! Restore property tests
//!
//! End-to-end through the public API: a live source is staged with a
//! `RestoreSession`, its channel published, and the engine run in process.
//! Covers:
//! - checkpoint fidelity (content digests match the source)
//! - point-in-time replay stops at the requested timestamp
//! - a plain restore stabilizes at the checkpoint timestamp
//! - the higher-term override
//! - the snapshot boundary at the stable timestamp
//! - selective restore
//! - every fatal path: ordering, range, malformed configuration,
//!   contention, channel readiness

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pitrestore::channel::{ChannelHandle, ChannelWriter, RetryPolicy};
use pitrestore::oplog::{
    compute_checksum_parts, oplog_path, LogTail, OpType, OplogEntry, OplogReader,
};
use pitrestore::restore::{self, RestoreErrorCode, RestoreFailure, RestoreOutcome};
use pitrestore::session::{RestoreRequest, RestoreSession, StagedBackup};
use pitrestore::storage::{
    DbPathLock, MinValid, StorageEngine, StorageErrorCode, LOCK_FILE, RESTORE_FAILED_FILE,
};
use pitrestore::timestamp::Timestamp;
use pitrestore::verify::{DataFingerprint, Expectations, RestoreVerifier};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

struct Source {
    temp: TempDir,
    engine: StorageEngine,
    /// Timestamp of the last write before staging
    ts0: Timestamp,
}

impl Source {
    fn staged_path(&self) -> PathBuf {
        self.temp.path().join("staged")
    }

    fn channel_path(&self) -> PathBuf {
        self.temp.path().join("restore.channel")
    }

    fn stage(&mut self, request: RestoreRequest) -> StagedBackup {
        RestoreSession::new(self.staged_path(), self.channel_path())
            .stage(&mut self.engine, request)
            .unwrap()
    }

    fn insert(&mut self, namespace: &str, id: &str) -> Timestamp {
        self.engine
            .insert(namespace, id, json!({ "id": id }))
            .unwrap()
    }
}

/// Three documents in `db.a` and one in `db.b`; the last write is `ts0`.
fn seeded_source() -> Source {
    let temp = TempDir::new().unwrap();
    let mut engine = StorageEngine::initialize(&temp.path().join("source"), "rs0").unwrap();
    engine.create_collection("db.a").unwrap();
    engine.create_collection("db.b").unwrap();
    engine.insert("db.b", "b0", json!({ "id": "b0" })).unwrap();
    let mut ts0 = Timestamp::NULL;
    for i in 0..3 {
        ts0 = engine
            .insert("db.a", &format!("a{}", i), json!({ "id": i }))
            .unwrap();
    }
    Source { temp, engine, ts0 }
}

fn quick() -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(100), Duration::from_millis(10))
}

fn restore_staged(dbpath: &Path, channel: &Path) -> restore::RestoreResult<RestoreOutcome> {
    restore::restore(dbpath, channel, quick())
}

/// Hand-built channel, bypassing the writer's ordering check
fn write_raw_channel(path: &Path, config_json: &[u8], entries: &[OplogEntry]) {
    fn frame(payload: &[u8]) -> Vec<u8> {
        let len = (payload.len() as u32).to_le_bytes();
        let crc = compute_checksum_parts(&[&len[..], payload]);
        let mut out = len.to_vec();
        out.extend_from_slice(payload);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    let mut bytes = b"PITRCH".to_vec();
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&frame(config_json));
    for entry in entries {
        bytes.extend_from_slice(&frame(&serde_json::to_vec(entry).unwrap()));
    }
    bytes.extend_from_slice(&frame(&[]));
    fs::write(path, bytes).unwrap();
}

fn assert_left_unusable(dbpath: &Path, code: RestoreErrorCode) {
    assert!(dbpath.join(LOCK_FILE).exists(), "lock must be left behind");
    let failure = RestoreFailure::read_from(dbpath).unwrap().unwrap();
    assert_eq!(failure.code, code.as_str());
    assert!(!RestoreOutcome::path_in(dbpath).exists());

    fs::remove_file(dbpath.join(LOCK_FILE)).unwrap();
    let err = StorageEngine::open(dbpath).unwrap_err();
    assert_eq!(err.code(), StorageErrorCode::PitrStorageRestoreFailed);
}

// =============================================================================
// Checkpoint fidelity
// =============================================================================

#[test]
fn test_restored_content_matches_source_checkpoint() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    let checkpoint = staged.metadata().checkpoint_timestamp;
    let expected = DataFingerprint::capture(&source.engine, checkpoint).unwrap();

    // Writes after staging must not leak into a checkpoint restore
    source.insert("db.a", "late");

    let outcome = staged
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();

    let restored = StorageEngine::open(&source.staged_path()).unwrap();
    let actual =
        DataFingerprint::capture(&restored, outcome.stable_recovery_timestamp).unwrap();
    assert!(
        expected.differences(&actual).is_empty(),
        "digests differ: {:?}",
        expected.differences(&actual)
    );

    let report = RestoreVerifier::new(&restored).verify(
        &Expectations::default()
            .stable_at(checkpoint)
            .fingerprint(expected),
    );
    assert!(report.is_success(), "{:?}", report);
}

// =============================================================================
// Non-PIT identity
// =============================================================================

#[test]
fn test_plain_restore_stable_at_checkpoint() {
    let mut source = seeded_source();
    let outcome = source
        .stage(RestoreRequest::checkpoint())
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();

    assert_eq!(outcome.stable_recovery_timestamp, source.ts0);
    assert_eq!(outcome.entries_applied, 0);
    assert!(outcome.higher_term_noop.is_none());

    let restored = StorageEngine::open(&source.staged_path()).unwrap();
    assert_eq!(restored.read_at("db.a", source.ts0).unwrap().len(), 3);
    assert_eq!(restored.min_valid(), MinValid::SENTINEL);
    assert_eq!(restored.last_stable_recovery_timestamp(), Some(source.ts0));
}

// =============================================================================
// PIT monotonicity
// =============================================================================

#[test]
fn test_point_in_time_stops_at_requested_timestamp() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    let ts1 = source.insert("db.a", "a3");
    let ts2 = source.insert("db.a", "a4");
    let ts3 = source.insert("db.a", "a5");
    assert!(source.ts0 < ts1 && ts1 < ts2 && ts2 < ts3);

    let expected = DataFingerprint::capture(&source.engine, ts2).unwrap();
    let outcome = staged
        .with_point_in_time(ts2)
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();

    assert_eq!(outcome.stable_recovery_timestamp, ts2);
    assert_eq!(outcome.entries_applied, 2);

    let restored = StorageEngine::open(&source.staged_path()).unwrap();
    let docs = restored.read_at("db.a", ts2).unwrap();
    assert_eq!(docs.len(), 5);
    assert!(!docs.contains_key("a5"));
    assert_eq!(restored.top_of_oplog(), Some(ts2));

    let actual = DataFingerprint::capture(&restored, ts2).unwrap();
    assert!(expected.differences(&actual).is_empty());
}

#[test]
fn test_scenario_three_docs_plus_two_to_ts2() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    source.insert("db.a", "a3");
    let ts2 = source.insert("db.a", "a4");

    staged
        .with_point_in_time(ts2)
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();

    let restored = StorageEngine::open(&source.staged_path()).unwrap();
    assert_eq!(restored.read_at("db.a", ts2).unwrap().len(), 5);
    assert_eq!(restored.last_stable_recovery_timestamp(), Some(ts2));
    assert!(restored.min_valid().is_sentinel());

    let err = restored.read_at("db.a", source.ts0).unwrap_err();
    assert_eq!(err.code(), StorageErrorCode::PitrStorageSnapshotTooOld);
}

// =============================================================================
// Higher-term override
// =============================================================================

#[test]
fn test_higher_term_override() {
    let mut source = seeded_source();
    let outcome = source
        .stage(RestoreRequest::checkpoint().higher_term_than(20))
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();

    let noop_ts = outcome.higher_term_noop.unwrap();
    assert_eq!(noop_ts, source.ts0.next_tick());
    assert_eq!(outcome.stable_recovery_timestamp, noop_ts);
    assert_eq!(outcome.replication_config_term, 121);

    let restored = StorageEngine::open(&source.staged_path()).unwrap();
    assert_eq!(restored.replset_config().term, 121);
    let entries = OplogReader::open(&restored.oplog_path())
        .unwrap()
        .read_all()
        .unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.op, OpType::Noop);
    assert_eq!(last.term, 120);
    assert_eq!(last.timestamp, noop_ts);
}

#[test]
fn test_higher_term_with_point_in_time() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint().higher_term_than(3));
    let ts1 = source.insert("db.a", "a3");

    let outcome = staged
        .with_point_in_time(ts1)
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();

    assert_eq!(outcome.entries_applied, 1);
    assert_eq!(outcome.higher_term_noop, Some(ts1.next_tick()));
    assert_eq!(outcome.stable_recovery_timestamp, ts1.next_tick());
    assert_eq!(outcome.replication_config_term, 104);
}

/// Stage with a higher-term override and publish a tail holding one no-op
/// written by a primary in `replayed_term`.
fn publish_high_term_tail(source: &mut Source, higher_than: i64, replayed_term: i64) -> StagedBackup {
    let staged = source.stage(RestoreRequest::checkpoint().higher_term_than(higher_than));
    let ts1 = staged.metadata().checkpoint_timestamp.next_tick();
    let staged = staged.with_point_in_time(ts1);
    ChannelWriter::write_config(
        &source.channel_path(),
        &staged.restore_configuration(),
        &[OplogEntry::noop(ts1, replayed_term, "new primary")],
        false,
    )
    .unwrap();
    staged
}

#[test]
fn test_higher_term_below_replayed_term_is_fatal() {
    let mut source = seeded_source();
    let staged = publish_high_term_tail(&mut source, 7, 500);

    let err = restore_staged(staged.dbpath(), &source.channel_path()).unwrap_err();
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreConfig);
    assert_left_unusable(staged.dbpath(), RestoreErrorCode::PitrRestoreConfig);
}

#[test]
fn test_higher_term_above_replayed_term_keeps_terms_ascending() {
    let mut source = seeded_source();
    let staged = publish_high_term_tail(&mut source, 450, 500);

    let outcome = restore_staged(staged.dbpath(), &source.channel_path()).unwrap();
    assert_eq!(outcome.replication_config_term, 551);

    let restored = StorageEngine::open(staged.dbpath()).unwrap();
    let terms: Vec<i64> = OplogReader::open(&restored.oplog_path())
        .unwrap()
        .read_all()
        .unwrap()
        .iter()
        .map(|e| e.term)
        .collect();
    assert!(terms.windows(2).all(|w| w[0] <= w[1]), "{:?}", terms);
    assert_eq!(&terms[terms.len() - 2..], &[500, 550]);
}

#[test]
fn test_higher_term_upper_bound() {
    let increment = restore::HIGHER_TERM_INCREMENT;

    // One past the largest accepted value: refused on read, no panic
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    let config = format!(
        r#"{{"node_type":"replicaSet","restore_to_higher_term_than":{}}}"#,
        i64::MAX - increment
    );
    write_raw_channel(&source.channel_path(), config.as_bytes(), &[]);
    let err = restore_staged(staged.dbpath(), &source.channel_path()).unwrap_err();
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreConfig);

    // The largest accepted value lands the config exactly on i64::MAX
    let mut source = seeded_source();
    let outcome = source
        .stage(RestoreRequest::checkpoint().higher_term_than(i64::MAX - increment - 1))
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();
    assert_eq!(outcome.replication_config_term, i64::MAX);
}

// =============================================================================
// Snapshot boundary
// =============================================================================

#[test]
fn test_snapshot_boundary_at_stable() {
    let mut source = seeded_source();
    let outcome = source
        .stage(RestoreRequest::checkpoint())
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();
    let stable = outcome.stable_recovery_timestamp;

    let restored = StorageEngine::open(&source.staged_path()).unwrap();
    let below = stable.prev_tick().unwrap();
    assert_eq!(
        restored.read_at("db.a", below).unwrap_err().code(),
        StorageErrorCode::PitrStorageSnapshotTooOld
    );
    assert_eq!(restored.read_at("db.a", stable).unwrap().len(), 3);
    assert!(RestoreVerifier::new(&restored)
        .check_snapshot_boundary(stable)
        .is_ok());
}

// =============================================================================
// Selective restore
// =============================================================================

#[test]
fn test_selective_restore_keeps_only_requested() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint().namespaces(["db.a"]));
    let ts1 = source.insert("db.a", "a3");
    let ts2 = source.insert("db.b", "b1");

    let outcome = staged
        .with_point_in_time(ts2)
        .configure(false)
        .unwrap()
        .run(quick())
        .unwrap();

    assert_eq!(outcome.entries_applied, 1);
    assert_eq!(outcome.entries_skipped, 1);
    assert_eq!(outcome.stable_recovery_timestamp, ts2);

    let restored = StorageEngine::open(&source.staged_path()).unwrap();
    let namespaces: Vec<String> = restored
        .catalog()
        .entries()
        .iter()
        .map(|c| c.namespace.clone())
        .collect();
    assert_eq!(namespaces, vec!["db.a".to_string()]);
    assert_eq!(restored.read_at("db.a", ts2).unwrap().len(), 4);
    assert!(restored.read_at("db.b", ts2).is_err());
    assert!(ts1 < ts2);

    let report = RestoreVerifier::new(&restored)
        .verify(&Expectations::default().stable_at(ts2).namespaces(["db.a"]));
    assert!(report.is_success(), "{:?}", report);
}

// =============================================================================
// Fatal paths
// =============================================================================

#[test]
fn test_out_of_order_entries_are_fatal() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    source.insert("db.a", "a3");
    let ts2 = source.insert("db.a", "a4");

    let staged = staged.with_point_in_time(ts2);
    let mut entries = staged.log_tail().unwrap();
    entries.reverse();
    let config = serde_json::to_vec(&staged.restore_configuration()).unwrap();
    write_raw_channel(&source.channel_path(), &config, &entries);

    let err = restore_staged(staged.dbpath(), &source.channel_path()).unwrap_err();
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreOrdering);
    assert_left_unusable(staged.dbpath(), RestoreErrorCode::PitrRestoreOrdering);
}

#[test]
fn test_entries_beyond_point_in_time_are_fatal() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    let ts1 = source.insert("db.a", "a3");
    let ts2 = source.insert("db.a", "a4");

    // Tail through ts2 under a configuration that stops at ts1
    let entries = LogTail::entries_for_pit(
        &oplog_path(&staged.metadata().dbpath),
        staged.metadata().checkpoint_timestamp,
        ts2,
    )
    .unwrap();
    assert_eq!(entries.len(), 2);
    let staged = staged.with_point_in_time(ts1);
    ChannelWriter::write_config(
        &source.channel_path(),
        &staged.restore_configuration(),
        &entries,
        false,
    )
    .unwrap();

    let err = restore_staged(staged.dbpath(), &source.channel_path()).unwrap_err();
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreOrdering);
    assert_left_unusable(staged.dbpath(), RestoreErrorCode::PitrRestoreOrdering);
}

#[test]
fn test_malformed_configuration_is_fatal() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    write_raw_channel(
        &source.channel_path(),
        br#"{"node_type":"replicaSet","restore_everything":true}"#,
        &[],
    );

    let err = restore_staged(staged.dbpath(), &source.channel_path()).unwrap_err();
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreConfig);
    assert_left_unusable(staged.dbpath(), RestoreErrorCode::PitrRestoreConfig);
}

#[test]
fn test_garbage_channel_is_fatal() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    fs::write(source.channel_path(), b"not a channel").unwrap();

    let err = restore_staged(staged.dbpath(), &source.channel_path()).unwrap_err();
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreConfig);
}

#[test]
fn test_lock_contention_is_fatal_and_leaves_no_marker() {
    let mut source = seeded_source();
    let configured = source
        .stage(RestoreRequest::checkpoint())
        .configure(true)
        .unwrap();

    let held = DbPathLock::acquire(configured.dbpath()).unwrap();
    let err = restore_staged(configured.dbpath(), configured.channel().path()).unwrap_err();
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreContention);
    assert!(!configured.dbpath().join(RESTORE_FAILED_FILE).exists());

    // Once the other owner lets go, the same persistent channel restores
    held.release().unwrap();
    let outcome = configured.run(quick()).unwrap();
    assert_eq!(outcome.stable_recovery_timestamp, source.ts0);
}

#[test]
fn test_channel_readiness_times_out() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());

    let never = source.temp.path().join("never.channel");
    let handle = ChannelHandle::at(&never, false);
    assert!(handle.wait_ready(quick()).unwrap_err().is_not_ready());

    let started = Instant::now();
    let err = restore_staged(staged.dbpath(), &never).unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreConfig);
}

#[test]
fn test_failed_dbpath_refuses_second_restore() {
    let mut source = seeded_source();
    let staged = source.stage(RestoreRequest::checkpoint());
    fs::write(source.channel_path(), b"junk").unwrap();
    restore_staged(staged.dbpath(), &source.channel_path()).unwrap_err();

    fs::remove_file(source.channel_path()).unwrap();
    fs::remove_file(staged.dbpath().join(LOCK_FILE)).unwrap();
    ChannelWriter::write_config(
        &source.channel_path(),
        &staged.restore_configuration(),
        &[],
        false,
    )
    .unwrap();

    let err = restore_staged(staged.dbpath(), &source.channel_path()).unwrap_err();
    assert_eq!(err.code(), RestoreErrorCode::PitrRestoreFailed);
}
