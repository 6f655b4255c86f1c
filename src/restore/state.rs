//! Restore engine state machine
//!
//! ```text
//! Uninitialized -> LoadingConfig -> ApplyingCheckpoint
//!     -> [ReplayingLog] -> RewritingMetadata -> FinalizingCheckpoint
//!     -> Exited(Clean)
//! any non-exited state -> Exited(Fatal)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the engine exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Restore finished; the dbpath opens as a normal node
    Clean,
    /// Restore failed; the dbpath must be discarded
    Fatal,
}

/// Restore engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreState {
    /// Not started
    Uninitialized,
    /// Reading the restore configuration
    LoadingConfig,
    /// Validating and trimming the staged checkpoint
    ApplyingCheckpoint,
    /// Replaying log entries up to the point in time
    ReplayingLog,
    /// Rewriting minValid and the replica-set config
    RewritingMetadata,
    /// Taking the stable checkpoint
    FinalizingCheckpoint,
    /// Terminal
    Exited(ExitStatus),
}

impl RestoreState {
    /// Whether `next` is a legal successor
    pub fn can_transition_to(&self, next: RestoreState) -> bool {
        use RestoreState::*;
        match (self, next) {
            (Exited(_), _) => false,
            (_, Exited(ExitStatus::Fatal)) => true,
            (Uninitialized, LoadingConfig) => true,
            (LoadingConfig, ApplyingCheckpoint) => true,
            (ApplyingCheckpoint, ReplayingLog) => true,
            (ApplyingCheckpoint, RewritingMetadata) => true,
            (ReplayingLog, RewritingMetadata) => true,
            (RewritingMetadata, FinalizingCheckpoint) => true,
            (FinalizingCheckpoint, Exited(ExitStatus::Clean)) => true,
            _ => false,
        }
    }

    /// Whether the engine has exited
    pub fn is_terminal(&self) -> bool {
        matches!(self, RestoreState::Exited(_))
    }

    /// Log name
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreState::Uninitialized => "UNINITIALIZED",
            RestoreState::LoadingConfig => "LOADING_CONFIG",
            RestoreState::ApplyingCheckpoint => "APPLYING_CHECKPOINT",
            RestoreState::ReplayingLog => "REPLAYING_LOG",
            RestoreState::RewritingMetadata => "REWRITING_METADATA",
            RestoreState::FinalizingCheckpoint => "FINALIZING_CHECKPOINT",
            RestoreState::Exited(ExitStatus::Clean) => "EXITED_CLEAN",
            RestoreState::Exited(ExitStatus::Fatal) => "EXITED_FATAL",
        }
    }
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
