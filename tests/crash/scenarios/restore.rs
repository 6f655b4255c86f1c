//! Restore crash scenarios
//!
//! A restore killed at any stage leaves a dbpath that cannot be opened
//! and carries no outcome; the orchestrator sees a non-zero exit.

use std::time::Duration;

use pitrestore::crash_point::{points, CRASH_POINT_ENV};
use pitrestore::session::{EngineCommand, SessionError};
use pitrestore::storage::StorageEngine;

use crate::crash::harness::{pitrestore_bin, report_failure, run_cli};
use crate::crash::utils::{staged_pit_restore, validate_not_restored};

fn restore_points() -> Vec<&'static str> {
    points::all()
        .iter()
        .copied()
        .filter(|p| p.starts_with("restore_"))
        .collect()
}

#[test]
fn test_crash_at_every_restore_stage_leaves_dbpath_unusable() {
    let stages = restore_points();
    assert_eq!(stages.len(), 7);

    for point in stages {
        let staged = staged_pit_restore();
        let run = run_cli(staged.restore_args(), Some(point));

        if !run.crashed_or_failed() {
            report_failure(point, "non-zero exit", &run);
            panic!("restore survived crash point {}", point);
        }
        if let Err(reason) = validate_not_restored(staged.dbpath()) {
            report_failure(point, "unusable dbpath", &run);
            panic!("after crash at {}: {}", point, reason);
        }
    }
}

#[test]
fn test_rerun_after_crash_reports_contention() {
    let staged = staged_pit_restore();
    let crashed = run_cli(staged.restore_args(), Some(points::RESTORE_DURING_REPLAY));
    assert!(crashed.crashed_or_failed());

    let rerun = run_cli(staged.restore_args(), None);
    assert_eq!(rerun.status.code(), Some(1), "{:?}", rerun);
    let response = rerun.response().expect("error response");
    assert_eq!(response["status"], "error");
    assert_eq!(response["code"], "PITR_RESTORE_CONTENTION");
}

#[test]
fn test_clean_subprocess_restore() {
    let staged = staged_pit_restore();
    let run = run_cli(staged.restore_args(), None);
    assert_eq!(run.status.code(), Some(0), "{:?}", run);

    let response = run.response().expect("response");
    assert_eq!(response["status"], "ok");
    let stable: pitrestore::timestamp::Timestamp =
        serde_json::from_value(response["data"]["stable_recovery_timestamp"].clone()).unwrap();
    assert_eq!(stable, staged.point_in_time);
    assert_eq!(response["data"]["entries_applied"], 2);

    let restored = StorageEngine::open(staged.dbpath()).unwrap();
    assert_eq!(
        restored.read_at("db.a", staged.point_in_time).unwrap().len(),
        5
    );
    assert!(staged.checkpoint < staged.point_in_time);
}

#[test]
fn test_orchestrator_observes_engine_crash() {
    let staged = staged_pit_restore();
    let dbpath = staged.dbpath().to_path_buf();
    let command = EngineCommand::new(pitrestore_bin())
        .env(CRASH_POINT_ENV, points::RESTORE_AFTER_METADATA);

    let err = staged
        .configured
        .clone()
        .run_subprocess(&command, Duration::from_secs(30), Duration::from_millis(20))
        .unwrap_err();
    assert!(err.is_engine_failure(), "{}", err);
    assert!(matches!(err, SessionError::EngineFailed { .. }));
    validate_not_restored(&dbpath).unwrap();
}

#[test]
fn test_orchestrator_reads_back_outcome() {
    let staged = staged_pit_restore();
    let command = EngineCommand::new(pitrestore_bin());

    let outcome = staged
        .configured
        .clone()
        .run_subprocess(&command, Duration::from_secs(30), Duration::from_millis(20))
        .unwrap();
    assert_eq!(outcome.stable_recovery_timestamp, staged.point_in_time);
    assert!(outcome.min_valid.is_sentinel());
}
