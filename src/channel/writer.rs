//! Channel writer
//!
//! Builds the whole channel in `<path>.tmp`, fsyncs it and renames it into
//! place, so a reader that sees the file sees all of it.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{ChannelError, ChannelResult};
use super::frame::{encode_frame, encode_header, end_marker};
use super::readiness::RetryPolicy;
use crate::observability::{log_event_with_fields, Event};
use crate::oplog::OplogEntry;
use crate::restore::RestoreConfiguration;
use crate::storage::fsutil;

/// Publishes restore channels
pub struct ChannelWriter;

impl ChannelWriter {
    /// Publish `config` followed by `entries` at `path`.
    ///
    /// A non-persistent channel is removed by the first reader that
    /// consumes it; a persistent one stays for repeated reads.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if a channel is already published at `path`
    /// - `OutOfOrder` if `entries` are not strictly ascending
    pub fn write_config(
        path: &Path,
        config: &RestoreConfiguration,
        entries: &[OplogEntry],
        persist: bool,
    ) -> ChannelResult<ChannelHandle> {
        if path.exists() {
            return Err(ChannelError::AlreadyExists(path.to_path_buf()));
        }
        for pair in entries.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(ChannelError::OutOfOrder {
                    previous: pair[0].timestamp,
                    next: pair[1].timestamp,
                });
            }
        }

        let mut bytes = encode_header(persist).to_vec();
        let config_json = serde_json::to_vec(config)
            .map_err(|e| ChannelError::Malformed { offset: 0, source: e })?;
        bytes.extend_from_slice(&encode_frame(&config_json));
        for entry in entries {
            let json = serde_json::to_vec(entry).map_err(|e| ChannelError::Malformed {
                offset: bytes.len(),
                source: e,
            })?;
            bytes.extend_from_slice(&encode_frame(&json));
        }
        bytes.extend_from_slice(&end_marker());

        Self::publish(path, &bytes)?;

        log_event_with_fields(
            Event::ChannelPublished,
            &[
                ("entries", &entries.len().to_string()),
                ("path", &path.display().to_string()),
                ("persist", if persist { "true" } else { "false" }),
            ],
        );

        Ok(ChannelHandle {
            path: path.to_path_buf(),
            persistent: persist,
        })
    }

    fn publish(path: &Path, bytes: &[u8]) -> ChannelResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| ChannelError::io(parent, e))?;

        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp_path).map_err(|e| ChannelError::io(&tmp_path, e))?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| ChannelError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| ChannelError::io(path, e))?;
        fsutil::fsync_dir(parent).map_err(|e| ChannelError::io(parent, e))
    }
}

/// Writer-side handle to a published channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    path: PathBuf,
    persistent: bool,
}

impl ChannelHandle {
    /// Handle for a channel published elsewhere
    pub fn at(path: impl Into<PathBuf>, persistent: bool) -> Self {
        Self {
            path: path.into(),
            persistent,
        }
    }

    /// Channel path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether readers leave the channel in place
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Wait until the channel is visible to readers.
    ///
    /// # Errors
    ///
    /// `NotReady` when the policy's timeout passes first.
    pub fn wait_ready(&self, policy: RetryPolicy) -> ChannelResult<()> {
        policy
            .poll(|| self.path.exists().then_some(()))
            .map_err(|waited| ChannelError::NotReady {
                path: self.path.clone(),
                waited_ms: waited.as_millis(),
            })
    }
}
