//! Crash testing utilities
//!
//! These utilities support:
//! - Building a source and a staged, configured restore
//! - Validating post-crash state

use std::ffi::{OsStr, OsString};
use std::path::Path;

use pitrestore::restore::RestoreOutcome;
use pitrestore::session::{ConfiguredRestore, RestoreRequest, RestoreSession};
use pitrestore::storage::{StorageEngine, LOCK_FILE};
use pitrestore::timestamp::Timestamp;
use serde_json::json;
use tempfile::TempDir;

/// A staged point-in-time restore of a closed source dbpath
pub struct StagedRestore {
    pub _temp: TempDir,
    pub checkpoint: Timestamp,
    pub point_in_time: Timestamp,
    pub configured: ConfiguredRestore,
}

impl StagedRestore {
    pub fn dbpath(&self) -> &Path {
        self.configured.dbpath()
    }

    pub fn channel(&self) -> &Path {
        self.configured.channel().path()
    }

    /// Arguments of `pitrestore restore` for this dbpath
    pub fn restore_args(&self) -> Vec<OsString> {
        args(&[
            OsStr::new("restore"),
            OsStr::new("--dbpath"),
            self.dbpath().as_os_str(),
            OsStr::new("--channel"),
            self.channel().as_os_str(),
        ])
    }
}

/// Owned argument list
pub fn args(parts: &[&OsStr]) -> Vec<OsString> {
    parts.iter().map(|p| p.to_os_string()).collect()
}

/// Create a source with three documents in `db.a`, closed so another
/// process can open it.
pub fn closed_source(dir: &Path) -> Timestamp {
    let mut engine = StorageEngine::initialize(dir, "rs0").expect("initialize source");
    engine.create_collection("db.a").expect("create db.a");
    let mut last = Timestamp::NULL;
    for i in 0..3 {
        last = engine
            .insert("db.a", &format!("a{}", i), json!({ "i": i }))
            .expect("insert");
    }
    engine.close().expect("close source");
    last
}

/// Stage a checkpoint, write two more documents, and publish a
/// persistent channel replaying through the second one.
pub fn staged_pit_restore() -> StagedRestore {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let source = temp.path().join("source");
    let checkpoint = closed_source(&source);

    let mut engine = StorageEngine::open(&source).expect("open source");
    let staged = RestoreSession::new(temp.path().join("staged"), temp.path().join("restore.channel"))
        .stage(&mut engine, RestoreRequest::checkpoint())
        .expect("stage");
    engine.insert("db.a", "late1", json!({})).expect("insert");
    let point_in_time = engine.insert("db.a", "late2", json!({})).expect("insert");
    engine.close().expect("close source");

    let configured = staged
        .with_point_in_time(point_in_time)
        .configure(true)
        .expect("configure");

    StagedRestore {
        _temp: temp,
        checkpoint,
        point_in_time,
        configured,
    }
}

/// A dbpath a crashed or failed restore left behind must not pass for a
/// restored one: no outcome document, and it cannot be opened.
pub fn validate_not_restored(dbpath: &Path) -> Result<(), String> {
    if RestoreOutcome::path_in(dbpath).exists() {
        return Err("restore outcome written".to_string());
    }
    if !dbpath.join(LOCK_FILE).exists() {
        return Err("lock file released".to_string());
    }
    match StorageEngine::open(dbpath) {
        Ok(_) => Err("dbpath opened normally".to_string()),
        Err(_) => Ok(()),
    }
}
