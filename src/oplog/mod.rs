//! Oplog: the replication write-ahead log
//!
//! Every write on a storage instance is first appended (and fsynced) to the
//! oplog, stamped with a strictly increasing `Timestamp` and the election
//! term it was written in. The restore engine replays oplog entries to move
//! a restored checkpoint forward to a point in time.
//!
//! # Invariants
//!
//! - fsync before an append is acknowledged
//! - timestamps strictly increase through the file
//! - checksum on every record; halt on corruption

mod checksum;
mod errors;
mod reader;
mod record;
mod tail;
mod writer;

pub use checksum::{compute_checksum, compute_checksum_parts, verify_checksum};
pub use errors::{OplogError, OplogErrorCode, OplogResult};
pub use reader::OplogReader;
pub use record::{OpType, OplogEntry};
pub use tail::LogTail;
pub use writer::OplogWriter;

pub(crate) use record::{read_bytes, read_string};

use std::path::{Path, PathBuf};

/// Oplog location relative to a dbpath
pub const OPLOG_RELATIVE_PATH: &str = "oplog/oplog.log";

/// Returns `<dbpath>/oplog/oplog.log`
pub fn oplog_path(dbpath: &Path) -> PathBuf {
    dbpath.join(OPLOG_RELATIVE_PATH)
}
