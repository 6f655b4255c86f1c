//! End-to-end command scenarios
//!
//! Drives the binary the way an operator would: `backup`, `configure`,
//! `restore` or `configure --run`, `verify` and `status`.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;

use pitrestore::storage::StorageEngine;
use pitrestore::timestamp::Timestamp;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::crash::harness::run_cli;
use crate::crash::utils::{args, closed_source};

fn cli_ts(ts: Timestamp) -> OsString {
    format!("{},{}", ts.secs, ts.inc).into()
}

/// Run a command that must succeed and return its `data`
fn ok(parts: Vec<OsString>) -> Value {
    let run = run_cli(&parts, None);
    assert_eq!(run.status.code(), Some(0), "{:?}", run);
    let response = run.response().expect("response");
    assert_eq!(response["status"], "ok", "{}", response);
    response["data"].clone()
}

/// Run a command that must fail with `exit` and return its response
fn failed(parts: Vec<OsString>, exit: i32) -> Value {
    let run = run_cli(&parts, None);
    assert_eq!(run.status.code(), Some(exit), "{:?}", run);
    let response = run.response().expect("error response");
    assert_eq!(response["status"], "error", "{}", response);
    response
}

fn backup(source: &Path, dest: &Path, fingerprint: &Path) -> Value {
    ok(args(&[
        OsStr::new("backup"),
        OsStr::new("--source"),
        source.as_os_str(),
        OsStr::new("--dest"),
        dest.as_os_str(),
        OsStr::new("--fingerprint"),
        fingerprint.as_os_str(),
    ]))
}

fn status(dbpath: &Path) -> Value {
    ok(args(&[OsStr::new("status"), OsStr::new("--dbpath"), dbpath.as_os_str()]))
}

#[test]
fn test_checkpoint_restore_matches_fingerprint() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let checkpoint = closed_source(&source);
    let dest = temp.path().join("staged");
    let fingerprint = temp.path().join("fingerprint.json");

    backup(&source, &dest, &fingerprint);
    assert_eq!(status(&dest)["state"], "not_restored");

    let data = ok(args(&[
        OsStr::new("configure"),
        OsStr::new("--dbpath"),
        dest.as_os_str(),
        OsStr::new("--run"),
    ]));
    let stable: Timestamp =
        serde_json::from_value(data["outcome"]["stable_recovery_timestamp"].clone()).unwrap();
    assert_eq!(stable, checkpoint);

    let data = ok(args(&[
        OsStr::new("verify"),
        OsStr::new("--dbpath"),
        dest.as_os_str(),
        OsStr::new("--expect-stable"),
        cli_ts(checkpoint).as_os_str(),
        OsStr::new("--fingerprint"),
        fingerprint.as_os_str(),
    ]));
    let checks = data["checks"].as_array().unwrap();
    assert!(checks.iter().all(|c| c["passed"] == true), "{:?}", checks);
    assert!(checks.iter().any(|c| c["check"] == "fingerprint"));

    let data = status(&dest);
    assert_eq!(data["state"], "restored");
    assert_eq!(data["locked"], false);
}

#[test]
fn test_point_in_time_restore_with_higher_term() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let checkpoint = closed_source(&source);
    let dest = temp.path().join("staged");
    let fingerprint = temp.path().join("fingerprint.json");

    backup(&source, &dest, &fingerprint);

    // The source keeps taking writes after the backup
    let mut engine = StorageEngine::open(&source).unwrap();
    engine.insert("db.a", "late1", json!({})).unwrap();
    let pit = engine.insert("db.a", "late2", json!({})).unwrap();
    engine.close().unwrap();
    assert!(checkpoint < pit);

    let data = ok(args(&[
        OsStr::new("configure"),
        OsStr::new("--dbpath"),
        dest.as_os_str(),
        OsStr::new("--point-in-time"),
        cli_ts(pit).as_os_str(),
        OsStr::new("--higher-term-than"),
        OsStr::new("20"),
        OsStr::new("--run"),
    ]));
    assert_eq!(data["outcome"]["entries_applied"], 2);
    assert_eq!(data["outcome"]["replication_config_term"], 121);

    let data = ok(args(&[
        OsStr::new("verify"),
        OsStr::new("--dbpath"),
        dest.as_os_str(),
        OsStr::new("--expect-stable"),
        cli_ts(pit).as_os_str(),
        OsStr::new("--expect-term"),
        OsStr::new("121"),
        OsStr::new("--namespace"),
        OsStr::new("db.a"),
    ]));
    let stable: Timestamp = serde_json::from_value(data["stable_timestamp"].clone()).unwrap();
    assert!(stable >= pit);

    // The checkpoint fingerprint no longer matches the replayed data
    let response = failed(
        args(&[
            OsStr::new("verify"),
            OsStr::new("--dbpath"),
            dest.as_os_str(),
            OsStr::new("--fingerprint"),
            fingerprint.as_os_str(),
        ]),
        1,
    );
    assert_eq!(response["code"], "PITR_VERIFY_DATA_MISMATCH");
}

#[test]
fn test_junk_channel_fails_restore() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    closed_source(&source);
    let dest = temp.path().join("staged");
    backup(&source, &dest, &temp.path().join("fingerprint.json"));

    let channel = temp.path().join("junk.channel");
    fs::write(&channel, b"definitely not a channel").unwrap();

    let response = failed(
        args(&[
            OsStr::new("restore"),
            OsStr::new("--dbpath"),
            dest.as_os_str(),
            OsStr::new("--channel"),
            channel.as_os_str(),
        ]),
        1,
    );
    assert_eq!(response["code"], "PITR_RESTORE_CONFIG");

    let data = status(&dest);
    assert_eq!(data["state"], "failed");
    assert!(data["outcome"].is_null());

    // A failed dbpath is not restored twice, even with a good channel
    let response = failed(
        args(&[
            OsStr::new("configure"),
            OsStr::new("--dbpath"),
            dest.as_os_str(),
            OsStr::new("--run"),
        ]),
        1,
    );
    assert_eq!(response["status"], "error");
}

#[test]
fn test_bad_tool_config_is_usage_error() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("tool.json");
    fs::write(&config, r#"{"poll_interval_ms": 0}"#).unwrap();

    let response = failed(
        args(&[
            OsStr::new("status"),
            OsStr::new("--dbpath"),
            temp.path().as_os_str(),
            OsStr::new("--config"),
            config.as_os_str(),
        ]),
        2,
    );
    assert_eq!(response["code"], "PITR_CLI_CONFIG_ERROR");

    fs::write(&config, r#"{"set_name": "rs0"}"#).unwrap();
    let response = failed(
        args(&[
            OsStr::new("status"),
            OsStr::new("--dbpath"),
            temp.path().as_os_str(),
            OsStr::new("--config"),
            config.as_os_str(),
        ]),
        2,
    );
    assert_eq!(response["code"], "PITR_CLI_CONFIG_ERROR");
}

#[test]
fn test_clap_usage_error_exits_two() {
    let run = run_cli(["configure"], None);
    assert_eq!(run.status.code(), Some(2), "{:?}", run);
}
