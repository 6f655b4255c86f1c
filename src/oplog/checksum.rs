//! CRC32 checksums for on-disk records and channel frames
//!
//! Every oplog record, collection record and channel frame carries a CRC32
//! (IEEE) over all of its bytes except the checksum itself. Any mismatch is
//! corruption.

use crc32fast::Hasher;

/// Computes a CRC32 checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes a CRC32 checksum over several slices as if concatenated.
pub fn compute_checksum_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Returns true if `expected` matches the checksum of `data`.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}
