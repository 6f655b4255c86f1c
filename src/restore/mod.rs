//! Point-in-time restore engine
//!
//! Turns a staged dbpath (a checkpoint copied by a backup cursor) into a
//! node that opens cleanly at a chosen moment:
//!
//! 1. Lock the dbpath and read the restore configuration from the channel
//! 2. Apply selective restore and validate the checkpoint
//! 3. Replay log entries up to the point in time, if one was requested
//! 4. Optionally append a no-op in a forced higher term
//! 5. Install the minValid sentinel and bump the replica-set term
//! 6. Take a stable checkpoint at the last applied timestamp
//!
//! All failures are FATAL and leave the dbpath marked `restore.failed`.

mod checkpoint;
mod config;
mod engine;
mod errors;
mod metadata;
mod outcome;
mod replay;
mod state;

pub use checkpoint::{apply_checkpoint, CheckpointSummary};
pub use config::{CollectionToRestore, NodeType, RestoreConfiguration};
pub use engine::{restore, RestoreEngine};
pub use errors::{RestoreError, RestoreErrorCode, RestoreResult};
pub use metadata::rewrite_metadata;
pub use outcome::{RestoreFailure, RestoreOutcome, RESTORE_OUTCOME_FILE};
pub use replay::{apply_higher_term_noop, replay_entries, ReplayStats};
pub use state::{ExitStatus, RestoreState};

/// Term added to `restore_to_higher_term_than` for the forced no-op
pub const HIGHER_TERM_INCREMENT: i64 = 100;
