//! Restore orchestration
//!
//! - `RestoreSession`: stage a backup, publish its channel, run the engine
//! - `EngineProcess`: the engine as a subprocess with a bounded wait
//! - `restore_nodes`: restore several staged dbpaths in parallel, one
//!   engine per dbpath

mod errors;
mod process;
mod stages;

use std::thread;

pub use errors::{SessionError, SessionResult};
pub use process::{EngineCommand, EngineProcess};
pub use stages::{ConfiguredRestore, OpenBackup, RestoreRequest, RestoreSession, StagedBackup};

use crate::channel::RetryPolicy;
use crate::restore::RestoreOutcome;

/// Run every restore on its own thread and wait for all of them.
///
/// Results come back in input order. Each engine only touches its own
/// dbpath, so one failure does not affect the others.
pub fn restore_nodes(
    nodes: Vec<ConfiguredRestore>,
    policy: RetryPolicy,
) -> Vec<SessionResult<RestoreOutcome>> {
    thread::scope(|scope| {
        let handles: Vec<_> = nodes
            .into_iter()
            .map(|node| {
                let dbpath = node.dbpath().to_path_buf();
                (dbpath, scope.spawn(move || node.run(policy)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(dbpath, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(SessionError::EnginePanicked(dbpath)))
            })
            .collect()
    })
}
