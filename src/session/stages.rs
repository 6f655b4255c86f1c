//! Restore session stages
//!
//! ```text
//! RestoreSession --stage--> StagedBackup --configure--> ConfiguredRestore
//!     --run / run_subprocess--> RestoreOutcome
//!
//! RestoreSession --open_backup--> OpenBackup --extend_to..., finish--> StagedBackup
//! ```
//!
//! Each stage consumes the previous one, so a session cannot be configured
//! twice or restored before its files are staged. The backup cursor lives
//! only inside `stage`, or inside an `OpenBackup` between `open_backup`
//! and `finish`: copying is complete and the cursor closed before any
//! engine can start. `OpenBackup::extend_to` copies oplog written after
//! the checkpoint into the staged oplog, and the engine replays those
//! entries ahead of the channel. The rest of a point-in-time tail is read
//! from the source oplog when the channel is published, so the source may
//! keep taking writes between staging and configuration. `RestoreSession::reopen`
//! picks a staged backup back up from its manifest, so staging and
//! configuration may run in different processes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{SessionError, SessionResult};
use super::process::{EngineCommand, EngineProcess};
use crate::backup::{
    BackupCursor, BackupCursorOptions, BackupManifest, BackupMetadata, CopyOutcome, FileCopier,
    BACKUP_MANIFEST_FILE,
};
use crate::channel::{ChannelHandle, ChannelWriter, RetryPolicy};
use crate::crash_point::{maybe_crash, points};
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::oplog::{oplog_path, LogTail, OplogEntry};
use crate::restore::{self, CollectionToRestore, RestoreConfiguration, RestoreOutcome};
use crate::storage::StorageEngine;
use crate::timestamp::Timestamp;

/// What to restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreRequest {
    /// Replay up to this timestamp
    pub point_in_time: Option<Timestamp>,
    /// Force the restored term above this value
    pub higher_term_than: Option<i64>,
    /// Restore only these namespaces
    pub namespaces: Vec<String>,
}

impl RestoreRequest {
    /// Restore the whole checkpoint
    pub fn checkpoint() -> Self {
        Self::default()
    }

    /// Replay up to `ts`
    pub fn point_in_time(mut self, ts: Timestamp) -> Self {
        self.point_in_time = Some(ts);
        self
    }

    /// Force the term above `term`
    pub fn higher_term_than(mut self, term: i64) -> Self {
        self.higher_term_than = Some(term);
        self
    }

    /// Restore only `namespaces`
    pub fn namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }
}

/// A restore that has not started yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSession {
    dbpath: PathBuf,
    channel_path: PathBuf,
}

impl RestoreSession {
    /// Session staging into `dbpath`, publishing its channel at
    /// `channel_path`
    pub fn new(dbpath: impl Into<PathBuf>, channel_path: impl Into<PathBuf>) -> Self {
        Self {
            dbpath: dbpath.into(),
            channel_path: channel_path.into(),
        }
    }

    /// Staged dbpath
    pub fn dbpath(&self) -> &Path {
        &self.dbpath
    }

    /// Copy a checkpoint of `source` into the staged dbpath.
    ///
    /// # Errors
    ///
    /// - `StagingExists` if the staged dbpath already exists
    /// - `Backup` if the cursor or a copy fails; the staged dbpath is removed
    /// - `NamespaceNotInBackup` for a requested namespace the source lacks
    pub fn stage(self, source: &mut StorageEngine, request: RestoreRequest) -> SessionResult<StagedBackup> {
        self.open_backup(source, request)?.finish()
    }

    /// Copy a checkpoint of `source` and keep its backup cursor open, so
    /// oplog written after the checkpoint can be extended into the staged
    /// dbpath before `OpenBackup::finish`.
    ///
    /// # Errors
    ///
    /// As `stage`, except that namespaces are checked by `finish`.
    pub fn open_backup(
        self,
        source: &mut StorageEngine,
        request: RestoreRequest,
    ) -> SessionResult<OpenBackup<'_>> {
        if self.dbpath.exists() {
            return Err(SessionError::StagingExists(self.dbpath));
        }

        let dbpath = self.dbpath.display().to_string();
        let scope = ObservationScope::with_fields("BACKUP_STAGE", &[("dbpath", &dbpath)]);
        let (cursor, manifest, copier) = match self.copy_checkpoint(source, &request) {
            Ok(staged) => staged,
            Err(e) => {
                FileCopier::abort(&self.dbpath);
                scope.fail(&e.to_string());
                return Err(e);
            }
        };
        scope.complete_with_fields(&[
            ("checkpoint_ts", &manifest.metadata.checkpoint_timestamp.to_string()),
            ("files", &manifest.files.len().to_string()),
            ("skipped", &manifest.skipped.len().to_string()),
        ]);

        Ok(OpenBackup {
            session: self,
            cursor,
            manifest,
            copier,
            request,
        })
    }

    /// Reopen a backup an earlier `stage` left in this session's dbpath,
    /// possibly from another process. The selective namespace set is
    /// recovered from the backup manifest.
    ///
    /// # Errors
    ///
    /// `Backup` if the dbpath holds no readable backup manifest.
    pub fn reopen(self) -> SessionResult<StagedBackup> {
        let manifest = BackupManifest::read_from_file(&self.dbpath.join(BACKUP_MANIFEST_FILE))?;
        let collections_to_restore: Vec<CollectionToRestore> = if manifest.skipped.is_empty() {
            Vec::new()
        } else {
            manifest
                .files
                .iter()
                .filter_map(|file| match (&file.namespace, file.uuid) {
                    (Some(namespace), Some(uuid)) => Some(CollectionToRestore {
                        namespace: namespace.clone(),
                        uuid,
                    }),
                    _ => None,
                })
                .collect()
        };
        let request = RestoreRequest::checkpoint()
            .namespaces(collections_to_restore.iter().map(|c| c.namespace.clone()));

        Ok(StagedBackup {
            session: self,
            extended_through: manifest.extended_through,
            metadata: manifest.metadata,
            request,
            collections_to_restore,
        })
    }

    fn copy_checkpoint<'a>(
        &self,
        source: &'a mut StorageEngine,
        request: &RestoreRequest,
    ) -> SessionResult<(BackupCursor<'a>, BackupManifest, FileCopier)> {
        let mut cursor = BackupCursor::open(source, BackupCursorOptions::default())?;
        maybe_crash(points::BACKUP_AFTER_CURSOR_OPEN);
        let (metadata, files) = cursor.read_all()?;
        let source_root = metadata.dbpath.clone();

        let mut copier = if request.namespaces.is_empty() {
            FileCopier::new()
        } else {
            FileCopier::selective(request.namespaces.iter().map(String::as_str))
        };
        let mut manifest = BackupManifest::new(metadata);
        for file in files {
            match copier.copy(&file, &source_root, &self.dbpath)? {
                CopyOutcome::Copied(_) => manifest.files.push(file),
                CopyOutcome::Skipped => manifest.skipped.push(file.filename),
            }
            maybe_crash(points::BACKUP_AFTER_FILE_COPY);
        }
        Ok((cursor, manifest, copier))
    }

    /// Remove everything a session may have left behind
    pub fn discard(&self) -> SessionResult<()> {
        discard_paths(&self.dbpath, &self.channel_path)
    }
}

/// Checkpoint copied, cursor still open and pinning the source checkpoint
pub struct OpenBackup<'a> {
    session: RestoreSession,
    cursor: BackupCursor<'a>,
    manifest: BackupManifest,
    copier: FileCopier,
    request: RestoreRequest,
}

impl fmt::Debug for OpenBackup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenBackup")
            .field("dbpath", &self.session.dbpath)
            .field("backup_id", &self.manifest.metadata.backup_id)
            .field("extended_through", &self.manifest.extended_through)
            .finish_non_exhaustive()
    }
}

impl OpenBackup<'_> {
    /// Staged dbpath
    pub fn dbpath(&self) -> &Path {
        self.session.dbpath()
    }

    /// Cursor metadata of the backup
    pub fn metadata(&self) -> &BackupMetadata {
        &self.manifest.metadata
    }

    /// The source, which keeps taking writes while the cursor is open
    pub fn source(&mut self) -> &mut StorageEngine {
        self.cursor.source()
    }

    /// Copy source oplog entries up to `bound` into the staged oplog.
    /// Returns the bytes copied.
    ///
    /// # Errors
    ///
    /// `Backup` if the source oplog has not reached `bound` yet (nothing is
    /// copied and the backup stays open) or if the copy fails.
    pub fn extend_to(&mut self, bound: Timestamp) -> SessionResult<u64> {
        let backup_id = self.manifest.metadata.backup_id;
        let source_root = self.manifest.metadata.dbpath.clone();
        let ranges = self.cursor.extend(backup_id, bound)?;

        let mut copied = 0;
        for range in ranges {
            copied += self
                .copier
                .copy_extension(&range, &source_root, self.session.dbpath())?;
            self.manifest.extensions.push(range);
        }
        self.manifest.extended_through = Some(
            self.manifest
                .extended_through
                .map_or(bound, |through| through.max(bound)),
        );
        Ok(copied)
    }

    /// Close the cursor and record the backup manifest.
    ///
    /// # Errors
    ///
    /// `NamespaceNotInBackup` for a requested namespace the source lacks,
    /// `Backup` if the cursor or manifest fails. The staged dbpath is
    /// removed either way.
    pub fn finish(self) -> SessionResult<StagedBackup> {
        let OpenBackup {
            session,
            mut cursor,
            manifest,
            copier,
            request,
        } = self;

        let sealed = cursor
            .close()
            .map_err(SessionError::from)
            .and_then(|()| resolve_collections(&copier, &request.namespaces))
            .and_then(|collections| {
                manifest.write_to_file(&session.dbpath.join(BACKUP_MANIFEST_FILE))?;
                Ok(collections)
            });
        let collections_to_restore = match sealed {
            Ok(collections) => collections,
            Err(e) => {
                FileCopier::abort(&session.dbpath);
                return Err(e);
            }
        };

        Ok(StagedBackup {
            session,
            extended_through: manifest.extended_through,
            metadata: manifest.metadata,
            request,
            collections_to_restore,
        })
    }

    /// Abandon the backup: close the cursor and remove the staged files
    pub fn discard(self) -> SessionResult<()> {
        let OpenBackup {
            session,
            mut cursor,
            ..
        } = self;
        cursor.close()?;
        session.discard()
    }
}

/// The `(namespace, uuid)` pairs a selective copy staged, in request order
fn resolve_collections(
    copier: &FileCopier,
    namespaces: &[String],
) -> SessionResult<Vec<CollectionToRestore>> {
    if !copier.is_selective() {
        return Ok(Vec::new());
    }
    namespaces
        .iter()
        .map(|namespace| {
            copier
                .collections_to_restore()
                .iter()
                .find(|c| &c.namespace == namespace)
                .cloned()
                .ok_or_else(|| SessionError::NamespaceNotInBackup(namespace.clone()))
        })
        .collect()
}

/// Checkpoint staged, cursor closed
#[derive(Debug)]
pub struct StagedBackup {
    session: RestoreSession,
    metadata: BackupMetadata,
    extended_through: Option<Timestamp>,
    request: RestoreRequest,
    collections_to_restore: Vec<CollectionToRestore>,
}

impl StagedBackup {
    /// Staged dbpath
    pub fn dbpath(&self) -> &Path {
        self.session.dbpath()
    }

    /// Cursor metadata of the backup
    pub fn metadata(&self) -> &BackupMetadata {
        &self.metadata
    }

    /// Entries a point-in-time restore will replay from the channel, read
    /// from the source oplog recorded in the backup metadata. Entries an
    /// extension already copied into the staged oplog are left out. Empty
    /// for a checkpoint restore.
    ///
    /// # Errors
    ///
    /// `Oplog` when the source log is unreadable, or when the backup was
    /// not extended and the source holds nothing in
    /// `(checkpoint, point_in_time]`.
    pub fn log_tail(&self) -> SessionResult<Vec<OplogEntry>> {
        let Some(pit) = self.request.point_in_time else {
            return Ok(Vec::new());
        };
        let source_oplog = oplog_path(&self.metadata.dbpath);
        match self.extended_through {
            Some(through) if through >= pit => Ok(Vec::new()),
            Some(through) => {
                let after = through.max(self.metadata.checkpoint_timestamp);
                let mut entries = LogTail::entries_after(&source_oplog, after)?;
                entries.retain(|entry| entry.timestamp <= pit);
                Ok(entries)
            }
            None => Ok(LogTail::entries_for_pit(
                &source_oplog,
                self.metadata.checkpoint_timestamp,
                pit,
            )?),
        }
    }

    /// Highest bound the staged oplog was extended to, if any
    pub fn extended_through(&self) -> Option<Timestamp> {
        self.extended_through
    }

    /// Replay up to `ts` instead of what the request said
    pub fn with_point_in_time(mut self, ts: Timestamp) -> Self {
        self.request.point_in_time = Some(ts);
        self
    }

    /// Force the restored term above `term`
    pub fn with_higher_term_than(mut self, term: i64) -> Self {
        self.request.higher_term_than = Some(term);
        self
    }

    /// The configuration this backup will be restored with
    pub fn restore_configuration(&self) -> RestoreConfiguration {
        let mut config = RestoreConfiguration::replica_set()
            .with_collections(self.collections_to_restore.clone());
        if let Some(pit) = self.request.point_in_time {
            config = config.with_point_in_time(pit);
        }
        if let Some(term) = self.request.higher_term_than {
            config = config.with_higher_term_than(term);
        }
        config
    }

    /// Collect the log tail and publish the restore channel
    pub fn configure(self, persist: bool) -> SessionResult<ConfiguredRestore> {
        let config = self.restore_configuration();
        config.validate()?;
        let log_tail = self.log_tail()?;
        let channel = ChannelWriter::write_config(
            &self.session.channel_path,
            &config,
            &log_tail,
            persist,
        )?;
        Ok(ConfiguredRestore {
            session: self.session,
            channel,
            config,
        })
    }

    /// Abandon the staged backup
    pub fn discard(self) -> SessionResult<()> {
        self.session.discard()
    }
}

/// Channel published, engine not yet run
#[derive(Debug, Clone)]
pub struct ConfiguredRestore {
    session: RestoreSession,
    channel: ChannelHandle,
    config: RestoreConfiguration,
}

impl ConfiguredRestore {
    /// Wrap a staged dbpath whose channel is already published
    pub fn existing(
        dbpath: impl Into<PathBuf>,
        channel: ChannelHandle,
        config: RestoreConfiguration,
    ) -> Self {
        Self {
            session: RestoreSession::new(dbpath, channel.path().to_path_buf()),
            channel,
            config,
        }
    }

    /// Staged dbpath
    pub fn dbpath(&self) -> &Path {
        self.session.dbpath()
    }

    /// Published channel
    pub fn channel(&self) -> &ChannelHandle {
        &self.channel
    }

    /// Published configuration
    pub fn config(&self) -> &RestoreConfiguration {
        &self.config
    }

    /// Run the engine in this process
    pub fn run(self, policy: RetryPolicy) -> SessionResult<RestoreOutcome> {
        Ok(restore::restore(self.dbpath(), self.channel.path(), policy)?)
    }

    /// Run the engine as a subprocess and read back its outcome
    pub fn run_subprocess(
        self,
        command: &EngineCommand,
        timeout: Duration,
        interval: Duration,
    ) -> SessionResult<RestoreOutcome> {
        self.channel.wait_ready(RetryPolicy::new(timeout, interval))?;
        EngineProcess::spawn(command, self.dbpath(), self.channel.path())?
            .wait_for_success(timeout, interval)?;
        Ok(RestoreOutcome::read_from(self.dbpath())?)
    }

    /// Abandon the restore
    pub fn discard(self) -> SessionResult<()> {
        self.session.discard()
    }
}

fn discard_paths(dbpath: &Path, channel: &Path) -> SessionResult<()> {
    if dbpath.exists() {
        fs::remove_dir_all(dbpath).map_err(|e| SessionError::io(dbpath, e))?;
    }
    if channel.exists() {
        fs::remove_file(channel).map_err(|e| SessionError::io(channel, e))?;
    }
    log_event_with_fields(
        Event::StagingDiscarded,
        &[("dbpath", &dbpath.display().to_string())],
    );
    Ok(())
}
