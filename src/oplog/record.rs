//! Oplog entry types and on-disk encoding
//!
//! Each oplog record on disk:
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, includes this field and the checksum)
//! +------------------+
//! | Op Type          | (u8)
//! +------------------+
//! | Timestamp        | (secs u32 LE, inc u32 LE)
//! +------------------+
//! | Term             | (i64 LE)
//! +------------------+
//! | Namespace        | (length-prefixed string)
//! +------------------+
//! | UUID flag + UUID | (u8, then 16 bytes when flag = 1)
//! +------------------+
//! | Document ID      | (length-prefixed string)
//! +------------------+
//! | Body             | (length-prefixed JSON bytes)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! The same entry crosses the configuration channel as JSON via serde.

use std::io::{self, Cursor, Read};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::checksum::compute_checksum;
use crate::timestamp::Timestamp;

/// Operation recorded by an oplog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum OpType {
    /// Insert a new document
    Insert = 0,
    /// Replace a document (full post-image)
    Update = 1,
    /// Delete a document
    Delete = 2,
    /// Create a collection
    CreateCollection = 3,
    /// Drop a collection
    DropCollection = 4,
    /// No-op marker (term bumps, heartbeats)
    Noop = 5,
}

impl OpType {
    /// Convert from u8, returns None for invalid values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OpType::Insert),
            1 => Some(OpType::Update),
            2 => Some(OpType::Delete),
            3 => Some(OpType::CreateCollection),
            4 => Some(OpType::DropCollection),
            5 => Some(OpType::Noop),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true for operations that touch a single document
    pub fn is_document_op(self) -> bool {
        matches!(self, OpType::Insert | OpType::Update | OpType::Delete)
    }

    /// Short name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            OpType::Insert => "i",
            OpType::Update => "u",
            OpType::Delete => "d",
            OpType::CreateCollection => "create",
            OpType::DropCollection => "drop",
            OpType::Noop => "n",
        }
    }
}

/// One oplog record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OplogEntry {
    /// Log-sequence timestamp
    #[serde(rename = "ts")]
    pub timestamp: Timestamp,
    /// Election term the entry was written in
    #[serde(rename = "t")]
    pub term: i64,
    /// Operation type
    pub op: OpType,
    /// Target namespace (`db.collection`), empty for no-ops
    #[serde(rename = "ns")]
    pub namespace: String,
    /// Collection UUID, when the operation targets a collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    /// Document primary key, empty for collection-level operations
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub document_id: String,
    /// Document post-image (insert / update) or no-op message
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl OplogEntry {
    /// Insert entry
    pub fn insert(
        timestamp: Timestamp,
        term: i64,
        namespace: impl Into<String>,
        uuid: Uuid,
        document_id: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            timestamp,
            term,
            op: OpType::Insert,
            namespace: namespace.into(),
            uuid: Some(uuid),
            document_id: document_id.into(),
            body,
        }
    }

    /// Update entry carrying the full post-image
    pub fn update(
        timestamp: Timestamp,
        term: i64,
        namespace: impl Into<String>,
        uuid: Uuid,
        document_id: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            op: OpType::Update,
            ..Self::insert(timestamp, term, namespace, uuid, document_id, body)
        }
    }

    /// Delete entry
    pub fn delete(
        timestamp: Timestamp,
        term: i64,
        namespace: impl Into<String>,
        uuid: Uuid,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            op: OpType::Delete,
            ..Self::insert(timestamp, term, namespace, uuid, document_id, Value::Null)
        }
    }

    /// Collection creation entry
    pub fn create_collection(
        timestamp: Timestamp,
        term: i64,
        namespace: impl Into<String>,
        uuid: Uuid,
    ) -> Self {
        Self {
            timestamp,
            term,
            op: OpType::CreateCollection,
            namespace: namespace.into(),
            uuid: Some(uuid),
            document_id: String::new(),
            body: Value::Null,
        }
    }

    /// Collection drop entry
    pub fn drop_collection(
        timestamp: Timestamp,
        term: i64,
        namespace: impl Into<String>,
        uuid: Uuid,
    ) -> Self {
        Self {
            op: OpType::DropCollection,
            ..Self::create_collection(timestamp, term, namespace, uuid)
        }
    }

    /// No-op entry with a message
    pub fn noop(timestamp: Timestamp, term: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            term,
            op: OpType::Noop,
            namespace: String::new(),
            uuid: None,
            document_id: String::new(),
            body: serde_json::json!({ "msg": message.into() }),
        }
    }

    fn serialize_body(&self) -> Vec<u8> {
        let body_bytes = if self.body.is_null() {
            Vec::new()
        } else {
            // Serializing a Value cannot fail
            serde_json::to_vec(&self.body).unwrap_or_default()
        };

        let mut buf = Vec::with_capacity(
            1 + 8 + 8 + 4 + self.namespace.len() + 17 + 4 + self.document_id.len() + 4 + body_bytes.len(),
        );

        buf.push(self.op.as_u8());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.term.to_le_bytes());

        buf.extend_from_slice(&(self.namespace.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.namespace.as_bytes());

        match self.uuid {
            Some(uuid) => {
                buf.push(1);
                buf.extend_from_slice(uuid.as_bytes());
            }
            None => buf.push(0),
        }

        buf.extend_from_slice(&(self.document_id.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.document_id.as_bytes());

        buf.extend_from_slice(&(body_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body_bytes);

        buf
    }

    /// Serialize the complete record to bytes (length, body, checksum)
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

    /// Deserialize a record from bytes, verifying checksum.
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        // len + op + ts + term + ns len + uuid flag + doc id len + body len + checksum
        const MIN_RECORD_SIZE: usize = 4 + 1 + 8 + 8 + 4 + 1 + 4 + 4 + 4;

        if data.len() < MIN_RECORD_SIZE {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Record too short"));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }

        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
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
        let computed = compute_checksum(&data[0..checksum_offset]);
        if computed != stored {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Checksum mismatch: computed {:08x}, stored {:08x}", computed, stored),
            ));
        }

        let mut cursor = Cursor::new(&data[4..checksum_offset]);

        let op_byte = read_u8(&mut cursor)?;
        let op = OpType::from_u8(op_byte).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Invalid op type: {}", op_byte))
        })?;

        let mut ts_buf = [0u8; 8];
        cursor.read_exact(&mut ts_buf)?;
        let timestamp = Timestamp::from_le_bytes(ts_buf);

        let mut term_buf = [0u8; 8];
        cursor.read_exact(&mut term_buf)?;
        let term = i64::from_le_bytes(term_buf);

        let namespace = read_string(&mut cursor)?;

        let uuid = match read_u8(&mut cursor)? {
            0 => None,
            1 => {
                let mut uuid_buf = [0u8; 16];
                cursor.read_exact(&mut uuid_buf)?;
                Some(Uuid::from_bytes(uuid_buf))
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid uuid flag: {}", other),
                ))
            }
        };

        let document_id = read_string(&mut cursor)?;

        let body_bytes = read_bytes(&mut cursor)?;
        let body = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid body JSON: {}", e))
            })?
        };

        if cursor.position() as usize != checksum_offset - 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes in oplog record body",
            ));
        }

        Ok((
            Self {
                timestamp,
                term,
                op,
                namespace,
                uuid,
                document_id,
                body,
            },
            record_length,
        ))
    }
}

fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let bytes = read_bytes(reader)?;
    String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e)))
}
