//! Channel reader
//!
//! Waits (bounded) for a channel to appear, then decodes it completely
//! before handing anything out: a channel without its end marker, with a
//! bad checksum or with malformed JSON is rejected as a whole.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{ChannelError, ChannelResult};
use super::frame::{decode_frame, decode_header, Frame, HEADER_LEN};
use super::readiness::RetryPolicy;
use crate::observability::{log_event_with_fields, Event};
use crate::oplog::OplogEntry;
use crate::restore::RestoreConfiguration;

/// Decoded restore channel
#[derive(Debug)]
pub struct ChannelReader {
    path: PathBuf,
    config: RestoreConfiguration,
    entries: VecDeque<OplogEntry>,
    persistent: bool,
}

impl ChannelReader {
    /// Wait for and decode the channel at `path`.
    ///
    /// A non-persistent channel is removed once decoded.
    pub fn open(path: &Path, policy: RetryPolicy) -> ChannelResult<Self> {
        let data = policy
            .poll(|| fs::read(path).ok())
            .map_err(|waited| ChannelError::NotReady {
                path: path.to_path_buf(),
                waited_ms: waited.as_millis(),
            })?;

        let persistent = decode_header(&data)?;
        let mut offset = HEADER_LEN;
        let mut config = None;
        let mut entries = VecDeque::new();

        loop {
            if offset >= data.len() {
                return Err(ChannelError::MissingEndMarker);
            }
            let (frame, used) = decode_frame(&data, offset)?;
            match frame {
                Frame::End => {
                    offset += used;
                    break;
                }
                Frame::Payload(json) if config.is_none() => {
                    let parsed: RestoreConfiguration = serde_json::from_slice(json)
                        .map_err(|e| ChannelError::Malformed { offset, source: e })?;
                    config = Some(parsed);
                }
                Frame::Payload(json) => {
                    let entry: OplogEntry = serde_json::from_slice(json)
                        .map_err(|e| ChannelError::Malformed { offset, source: e })?;
                    entries.push_back(entry);
                }
            }
            offset += used;
        }

        if offset != data.len() {
            return Err(ChannelError::TrailingData(data.len() - offset));
        }
        let config = config.ok_or(ChannelError::MissingConfig)?;

        log_event_with_fields(
            Event::ChannelOpened,
            &[
                ("entries", &entries.len().to_string()),
                ("path", &path.display().to_string()),
            ],
        );

        if !persistent {
            fs::remove_file(path).map_err(|e| ChannelError::io(path, e))?;
            log_event_with_fields(
                Event::ChannelConsumed,
                &[("path", &path.display().to_string())],
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            config,
            entries,
            persistent,
        })
    }

    /// Channel path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the channel was left in place
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Frame 0
    pub fn config(&self) -> &RestoreConfiguration {
        &self.config
    }

    /// Entries not yet taken
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    /// Take the next entry in channel order
    pub fn next_entry(&mut self) -> Option<OplogEntry> {
        self.entries.pop_front()
    }
}
