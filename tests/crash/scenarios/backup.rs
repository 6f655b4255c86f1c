//! Backup crash scenarios
//!
//! Staging killed part way leaves a destination without a backup
//! manifest, which `configure` refuses to publish.

use std::ffi::OsStr;

use pitrestore::backup::BACKUP_MANIFEST_FILE;
use pitrestore::crash_point::points;
use tempfile::TempDir;

use crate::crash::harness::{report_failure, run_cli};
use crate::crash::utils::{args, closed_source};

#[test]
fn test_crash_during_backup_leaves_no_manifest() {
    for point in [points::BACKUP_AFTER_CURSOR_OPEN, points::BACKUP_AFTER_FILE_COPY] {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        closed_source(&source);
        let dest = temp.path().join("staged");

        let run = run_cli(
            args(&[
                OsStr::new("backup"),
                OsStr::new("--source"),
                source.as_os_str(),
                OsStr::new("--dest"),
                dest.as_os_str(),
            ]),
            Some(point),
        );
        if !run.crashed_or_failed() {
            report_failure(point, "non-zero exit", &run);
            panic!("backup survived crash point {}", point);
        }
        assert!(run.response().is_none(), "crashed backup printed a response");
        assert!(!dest.join(BACKUP_MANIFEST_FILE).exists());

        let configure = run_cli(
            args(&[OsStr::new("configure"), OsStr::new("--dbpath"), dest.as_os_str()]),
            None,
        );
        assert_eq!(configure.status.code(), Some(1), "{:?}", configure);
        let response = configure.response().expect("error response");
        assert_eq!(response["status"], "error");

        let mut channel = dest.as_os_str().to_os_string();
        channel.push(".channel");
        assert!(!std::path::Path::new(&channel).exists());
    }
}

#[test]
fn test_clean_backup_writes_manifest() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source");
    let checkpoint = closed_source(&source);
    let dest = temp.path().join("staged");

    let run = run_cli(
        args(&[
            OsStr::new("backup"),
            OsStr::new("--source"),
            source.as_os_str(),
            OsStr::new("--dest"),
            dest.as_os_str(),
        ]),
        None,
    );
    assert_eq!(run.status.code(), Some(0), "{:?}", run);
    assert!(dest.join(BACKUP_MANIFEST_FILE).exists());

    let response = run.response().expect("response");
    assert_eq!(response["status"], "ok");
    let staged_at: pitrestore::timestamp::Timestamp =
        serde_json::from_value(response["data"]["checkpoint_timestamp"].clone()).unwrap();
    assert_eq!(staged_at, checkpoint);
}
