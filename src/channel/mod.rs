//! Restore configuration channel
//!
//! Carries a `RestoreConfiguration` and the log entries to replay from
//! the orchestrator to the restore engine, across threads or processes,
//! through one file on disk. Publication is atomic: if the file exists it
//! is complete. See `frame` for the wire format.

mod errors;
mod frame;
mod readiness;
mod reader;
mod writer;

pub use errors::{ChannelError, ChannelResult};
pub use readiness::RetryPolicy;
pub use reader::ChannelReader;
pub use writer::{ChannelHandle, ChannelWriter};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oplog::OplogEntry;
    use crate::restore::RestoreConfiguration;
    use crate::timestamp::Timestamp;
    use serde_json::json;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn entries(count: u32) -> Vec<OplogEntry> {
        let uuid = Uuid::new_v4();
        (1..=count)
            .map(|i| {
                OplogEntry::insert(
                    Timestamp::new(50, i),
                    1,
                    "db.a",
                    uuid,
                    format!("d{}", i),
                    json!({ "i": i }),
                )
            })
            .collect()
    }

    fn quick() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(50), Duration::from_millis(5))
    }

    #[test]
    fn test_one_shot_channel_delivers_then_disappears() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restore.chan");
        let config = RestoreConfiguration::replica_set().with_point_in_time(Timestamp::new(50, 3));
        let written = entries(3);

        let handle = ChannelWriter::write_config(&path, &config, &written, false).unwrap();
        handle.wait_ready(quick()).unwrap();

        let mut reader = ChannelReader::open(&path, quick()).unwrap();
        assert_eq!(reader.config(), &config);
        assert_eq!(reader.remaining(), 3);
        let mut read = Vec::new();
        while let Some(entry) = reader.next_entry() {
            read.push(entry);
        }
        assert_eq!(read, written);
        assert!(!path.exists());
        assert!(ChannelReader::open(&path, RetryPolicy::immediate())
            .unwrap_err()
            .is_not_ready());
    }

    #[test]
    fn test_persistent_channel_is_reusable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restore.chan");
        ChannelWriter::write_config(&path, &RestoreConfiguration::replica_set(), &[], true)
            .unwrap();
        for _ in 0..2 {
            let reader = ChannelReader::open(&path, quick()).unwrap();
            assert!(reader.is_persistent());
            assert_eq!(reader.remaining(), 0);
        }
        assert!(path.exists());
    }

    #[test]
    fn test_wait_ready_times_out() {
        let temp = TempDir::new().unwrap();
        let handle = ChannelHandle::at(temp.path().join("never.chan"), false);
        let err = handle.wait_ready(quick()).unwrap_err();
        assert!(matches!(err, ChannelError::NotReady { .. }));
    }

    #[test]
    fn test_writer_rejects_unordered_entries_and_republish() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restore.chan");
        let mut unordered = entries(2);
        unordered.reverse();
        let err = ChannelWriter::write_config(
            &path,
            &RestoreConfiguration::replica_set(),
            &unordered,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ChannelError::OutOfOrder { .. }));
        assert!(!path.exists());

        ChannelWriter::write_config(&path, &RestoreConfiguration::replica_set(), &[], false)
            .unwrap();
        assert!(matches!(
            ChannelWriter::write_config(&path, &RestoreConfiguration::replica_set(), &[], false),
            Err(ChannelError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_missing_end_marker_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restore.chan");
        ChannelWriter::write_config(&path, &RestoreConfiguration::replica_set(), &entries(1), true)
            .unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();
        assert!(matches!(
            ChannelReader::open(&path, quick()),
            Err(ChannelError::MissingEndMarker)
        ));
    }

    #[test]
    fn test_malformed_config_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restore.chan");
        let mut bytes = frame::encode_header(true).to_vec();
        bytes.extend_from_slice(&frame::encode_frame(br#"{"node_type":"replicaSet","bogus":true}"#));
        bytes.extend_from_slice(&frame::end_marker());
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            ChannelReader::open(&path, quick()),
            Err(ChannelError::Malformed { .. })
        ));
    }

    #[test]
    fn test_empty_channel_has_no_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("restore.chan");
        let mut bytes = frame::encode_header(true).to_vec();
        bytes.extend_from_slice(&frame::end_marker());
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            ChannelReader::open(&path, quick()),
            Err(ChannelError::MissingConfig)
        ));
    }

    #[test]
    fn test_reader_waits_for_late_publication() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("late.chan");
        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            ChannelWriter::write_config(
                &writer_path,
                &RestoreConfiguration::replica_set(),
                &[],
                false,
            )
            .unwrap();
        });
        let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_millis(5));
        let reader = ChannelReader::open(&path, policy).unwrap();
        assert_eq!(reader.config(), &RestoreConfiguration::replica_set());
        writer.join().unwrap();
    }
}
