//! Document record format
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, whole record)
//! +------------------+
//! | Timestamp        | (u32 LE secs, u32 LE inc)
//! +------------------+
//! | Document ID      | (length-prefixed string)
//! +------------------+
//! | Tombstone Flag   | (u8: 0 = live, 1 = deleted)
//! +------------------+
//! | Document Body    | (length-prefixed JSON bytes)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Checksum covers all bytes except the checksum itself. Each record is
//! one version of a document; the newest version at or below a read
//! timestamp wins.

use std::io::{self, Cursor, Read};

use serde_json::Value;

use crate::oplog::{compute_checksum, read_bytes, read_string};
use crate::timestamp::Timestamp;

/// Length, timestamp, empty id, flag, empty body, checksum
const MIN_RECORD_LENGTH: usize = 4 + 8 + 4 + 1 + 4 + 4;

/// One version of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    /// Commit timestamp of this version
    pub timestamp: Timestamp,
    /// Document primary key
    pub document_id: String,
    /// Whether this version deletes the document
    pub is_tombstone: bool,
    /// Document body (`Null` for tombstones)
    pub body: Value,
}

impl DocumentRecord {
    /// A live document version
    pub fn live(timestamp: Timestamp, document_id: impl Into<String>, body: Value) -> Self {
        Self {
            timestamp,
            document_id: document_id.into(),
            is_tombstone: false,
            body,
        }
    }

    /// A deletion marker
    pub fn tombstone(timestamp: Timestamp, document_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            document_id: document_id.into(),
            is_tombstone: true,
            body: Value::Null,
        }
    }

    fn serialize_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.timestamp.to_le_bytes());

        buf.extend_from_slice(&(self.document_id.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.document_id.as_bytes());

        buf.push(if self.is_tombstone { 1 } else { 0 });

        // Value serialization cannot fail: keys are always strings.
        let json = serde_json::to_vec(&self.body).unwrap_or_default();
        buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
        buf.extend_from_slice(&json);
        buf
    }

    /// Serialize the complete record
    pub fn serialize(&self) -> Vec<u8> {
        let body = self.serialize_body();
        let record_length = (4 + body.len() + 4) as u32;

        let mut record = Vec::with_capacity(record_length as usize);
        record.extend_from_slice(&record_length.to_le_bytes());
        record.extend_from_slice(&body);

        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Deserialize one record from the front of `data`.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough data for record length",
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < MIN_RECORD_LENGTH || data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Invalid record length {} with {} bytes available",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&data[..checksum_offset]);
        if stored != computed {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: stored={:#x}, computed={:#x}",
                    stored, computed
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[4..checksum_offset]);

        let mut ts_buf = [0u8; 8];
        cursor.read_exact(&mut ts_buf)?;
        let timestamp = Timestamp::from_le_bytes(ts_buf);

        let document_id = read_string(&mut cursor)?;

        let mut flag = [0u8; 1];
        cursor.read_exact(&mut flag)?;
        let is_tombstone = match flag[0] {
            0 => false,
            1 => true,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid tombstone flag {}", other),
                ))
            }
        };

        let json = read_bytes(&mut cursor)?;
        let body = serde_json::from_slice(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok((
            Self {
                timestamp,
                document_id,
                is_tombstone,
                body,
            },
            record_length,
        ))
    }
}
