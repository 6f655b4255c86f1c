//! Channel wire format
//!
//! ```text
//! +----------------------+
//! | Magic "PITRCH"       | (6 bytes)
//! | Version              | (u8, 1)
//! | Flags                | (u8, bit 0 = persistent)
//! +----------------------+
//! | Frame 0: config      |
//! | Frame 1..N: entries  |
//! | End marker           | (frame of length 0)
//! +----------------------+
//!
//! Frame: [u32 LE length][JSON bytes][u32 LE crc32(length || bytes)]
//! ```

use super::errors::{ChannelError, ChannelResult};
use crate::oplog::compute_checksum_parts;

/// File magic
pub const MAGIC: &[u8; 6] = b"PITRCH";
/// Format version
pub const VERSION: u8 = 1;
/// Header length
pub const HEADER_LEN: usize = MAGIC.len() + 2;

const FLAG_PERSISTENT: u8 = 0x01;

/// Encode the file header
pub fn encode_header(persistent: bool) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..MAGIC.len()].copy_from_slice(MAGIC);
    header[MAGIC.len()] = VERSION;
    header[MAGIC.len() + 1] = if persistent { FLAG_PERSISTENT } else { 0 };
    header
}

/// Decode the file header, returning the persistent flag
pub fn decode_header(data: &[u8]) -> ChannelResult<bool> {
    if data.len() < HEADER_LEN {
        return Err(ChannelError::BadHeader(format!(
            "{} bytes is shorter than the header",
            data.len()
        )));
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(ChannelError::BadHeader("bad magic".to_string()));
    }
    let version = data[MAGIC.len()];
    if version != VERSION {
        return Err(ChannelError::BadHeader(format!(
            "unsupported version {}",
            version
        )));
    }
    let flags = data[MAGIC.len() + 1];
    if flags & !FLAG_PERSISTENT != 0 {
        return Err(ChannelError::BadHeader(format!("unknown flags {:#x}", flags)));
    }
    Ok(flags & FLAG_PERSISTENT != 0)
}

/// Encode one frame; an empty payload is the end marker
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() as u32).to_le_bytes();
    let crc = compute_checksum_parts(&[&len[..], payload]);

    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(&len);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// The end-of-stream frame
pub fn end_marker() -> Vec<u8> {
    encode_frame(&[])
}

/// Decoded frame
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// JSON payload
    Payload(&'a [u8]),
    /// End of stream
    End,
}

/// Decode the frame starting at `offset`, returning it and its length
pub fn decode_frame(data: &[u8], offset: usize) -> ChannelResult<(Frame<'_>, usize)> {
    let rest = &data[offset..];
    if rest.len() < 8 {
        return Err(ChannelError::Truncated { offset });
    }
    let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    let total = len
        .checked_add(8)
        .ok_or(ChannelError::Truncated { offset })?;
    if rest.len() < total {
        return Err(ChannelError::Truncated { offset });
    }

    let payload = &rest[4..4 + len];
    let stored = u32::from_le_bytes([
        rest[4 + len],
        rest[5 + len],
        rest[6 + len],
        rest[7 + len],
    ]);
    if stored != compute_checksum_parts(&[&rest[..4], payload]) {
        return Err(ChannelError::ChecksumMismatch { offset });
    }

    let frame = if len == 0 {
        Frame::End
    } else {
        Frame::Payload(payload)
    };
    Ok((frame, total))
}
