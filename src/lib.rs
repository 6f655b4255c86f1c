//! pitrestore - point-in-time restore for a replicated, log-structured store
//!
//! A restore runs in three stages. A backup cursor pins a checkpoint of a
//! live source and its files are copied into a staged dbpath. A restore
//! configuration, plus the log tail for a point-in-time restore, is
//! published on a channel. The restore engine then applies the
//! checkpoint, replays the tail, rewrites replication metadata and takes
//! a stable checkpoint, leaving a node that can join a fresh replica set.

pub mod backup;
pub mod channel;
pub mod cli;
pub mod crash_point;
pub mod observability;
pub mod oplog;
pub mod restore;
pub mod session;
pub mod storage;
pub mod timestamp;
pub mod verify;
