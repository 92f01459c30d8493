//! The backup provider: rolling backups and the restore point.
//!
//! Layout under the data root:
//!
//! ```text
//! <data_root>/
//!   backups/<utc ticks>/<QualifiedName>.json
//!   restorepoints/<QualifiedName>.json
//! ```
//!
//! Backup folders are named by UTC ticks (100 ns intervals since
//! 0001-01-01). Every backup prunes all but the newest `retention`
//! folders. All file I/O of one provider runs under one mutex.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ravenvault_core::EntityStore;
use ravenvault_core::config::BackupConfig;
use ravenvault_types::EntityKind;

use crate::error::BackupError;
use crate::snapshot::Snapshot;

/// Folder holding the rolling backups.
pub const BACKUPS_DIR: &str = "backups";

/// Folder holding the restore point.
pub const RESTORE_POINT_DIR: &str = "restorepoints";

/// Default number of backups kept.
pub const DEFAULT_RETENTION: usize = 10;

/// Ticks at 1970-01-01T00:00:00Z.
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// UTC ticks of an instant: 100 ns intervals since 0001-01-01.
pub fn utc_ticks(at: DateTime<Utc>) -> i64 {
    let since_epoch = at
        .timestamp_nanos_opt()
        .and_then(|nanos| nanos.checked_div(100))
        .unwrap_or_else(|| at.timestamp_micros().saturating_mul(10));
    since_epoch.saturating_add(TICKS_AT_UNIX_EPOCH)
}

/// The instant a tick count names.
pub fn ticks_to_datetime(ticks: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(ticks.saturating_sub(TICKS_AT_UNIX_EPOCH).saturating_mul(100))
}

/// One backup folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    /// Folder path.
    pub path: PathBuf,
    /// Tick count the folder is named by.
    pub ticks: i64,
    /// Folder creation time.
    pub created: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct IoState {
    /// Ticks of the last backup written by this provider.
    last_ticks: i64,
}

/// Writes and reads snapshots under one data root.
#[derive(Debug)]
pub struct BackupProvider {
    data_root: PathBuf,
    retention: usize,
    clear_restore_point_on_read: bool,
    io: Mutex<IoState>,
}

impl BackupProvider {
    /// A provider rooted at `data_root` with default retention that keeps
    /// the restore point after reading it.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            retention: DEFAULT_RETENTION,
            clear_restore_point_on_read: false,
            io: Mutex::new(IoState::default()),
        }
    }

    /// A provider following the `backup` config section.
    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(&config.data_root)
            .with_retention(config.retention)
            .with_clear_restore_point_on_read(config.clear_restore_point_on_read)
    }

    /// Number of newest backups kept. At least one is always kept.
    #[must_use]
    pub const fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Delete the restore-point files once they have been read and archived.
    #[must_use]
    pub const fn with_clear_restore_point_on_read(mut self, clear: bool) -> Self {
        self.clear_restore_point_on_read = clear;
        self
    }

    /// Root folder.
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Folder holding the backup folders.
    pub fn backups_dir(&self) -> PathBuf {
        self.data_root.join(BACKUPS_DIR)
    }

    /// Folder holding the restore point.
    pub fn restore_point_dir(&self) -> PathBuf {
        self.data_root.join(RESTORE_POINT_DIR)
    }

    /// Back up every registered set of `store`, then prune.
    pub fn backup_store(&self, store: &EntityStore) -> Result<BackupInfo, BackupError> {
        let snapshot = Snapshot::capture(store)?;
        self.create_backup(&snapshot)
    }

    /// Write `snapshot` as a new backup folder, then prune.
    pub fn create_backup(&self, snapshot: &Snapshot) -> Result<BackupInfo, BackupError> {
        let mut io = self.io.lock();
        self.create_backup_locked(&mut io, snapshot)
    }

    /// Backup folders, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let _io = self.io.lock();
        self.list_locked()
    }

    /// The newest backup holding at least one of `kinds`.
    pub fn latest_backup(&self, kinds: &[EntityKind]) -> Result<Option<Snapshot>, BackupError> {
        let _io = self.io.lock();
        for info in self.list_locked()? {
            let (snapshot, files) = Snapshot::read_from(&info.path, kinds)?;
            if !files.is_empty() {
                tracing::info!(
                    path = %info.path.display(),
                    kinds = snapshot.len(),
                    records = snapshot.record_count(),
                    "latest backup loaded"
                );
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    /// Read `kinds` from one backup folder.
    pub fn load_backup(
        &self,
        info: &BackupInfo,
        kinds: &[EntityKind],
    ) -> Result<Snapshot, BackupError> {
        let _io = self.io.lock();
        let (snapshot, _) = Snapshot::read_from(&info.path, kinds)?;
        Ok(snapshot)
    }

    /// Store the current state of `store` as the restore point, together
    /// with any change not yet written to the database.
    pub fn write_restore_point(&self, store: &EntityStore) -> Result<PathBuf, BackupError> {
        let snapshot = Snapshot::capture_with_unsaved(store)?;
        self.write_restore_point_snapshot(&snapshot)
    }

    /// Store `snapshot` as the restore point, replacing the files of the
    /// kinds it holds.
    pub fn write_restore_point_snapshot(&self, snapshot: &Snapshot) -> Result<PathBuf, BackupError> {
        let _io = self.io.lock();
        let dir = self.restore_point_dir();
        snapshot.write_to(&dir)?;
        snapshot.write_unsaved_to(&dir)?;
        tracing::info!(
            path = %dir.display(),
            kinds = snapshot.len(),
            records = snapshot.record_count(),
            unsaved = snapshot.has_unsaved(),
            "restore point written"
        );
        Ok(dir)
    }

    /// Load the restore point.
    ///
    /// Each requested kind is read if its file exists and is non-empty.
    /// What was read is archived as a new backup straight away. When the
    /// provider clears on read, the files read are then deleted; they are
    /// kept if archiving failed.
    ///
    /// Unflushed changes saved with the restore point are handed out once:
    /// their file is deleted after reading so a later boot from the same
    /// restore point does not write them twice.
    ///
    /// Returns `None` when no file was read.
    pub fn get_restore_point(&self, kinds: &[EntityKind]) -> Result<Option<Snapshot>, BackupError> {
        let mut io = self.io.lock();
        let dir = self.restore_point_dir();
        let (mut snapshot, files) = Snapshot::read_from(&dir, kinds)?;
        if files.is_empty() {
            tracing::debug!(path = %dir.display(), "no restore point found");
            return Ok(None);
        }
        if let Some(unsaved) = snapshot.read_unsaved_from(&dir)? {
            fs::remove_file(&unsaved).map_err(BackupError::io(&unsaved))?;
            tracing::warn!(path = %dir.display(), "restore point carries changes missing from the database");
        }
        tracing::info!(
            path = %dir.display(),
            kinds = snapshot.len(),
            records = snapshot.record_count(),
            "restore point loaded"
        );

        let archived = match self.create_backup_locked(&mut io, &snapshot) {
            Ok(info) => {
                tracing::info!(path = %info.path.display(), "restore point archived");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to archive restore point; files kept");
                false
            }
        };

        if self.clear_restore_point_on_read && archived {
            for file in &files {
                if let Err(e) = fs::remove_file(file) {
                    tracing::warn!(path = %file.display(), error = %e, "failed to clear restore point file");
                }
            }
        }
        Ok(Some(snapshot))
    }

    /// Compressed export of every registered set of `store`.
    pub fn export_zip(&self, store: &EntityStore) -> Result<Vec<u8>, BackupError> {
        Snapshot::capture(store)?.to_zip()
    }

    fn create_backup_locked(
        &self,
        io: &mut IoState,
        snapshot: &Snapshot,
    ) -> Result<BackupInfo, BackupError> {
        let backups = self.backups_dir();
        fs::create_dir_all(&backups).map_err(BackupError::io(&backups))?;

        // Two backups on the same tick get consecutive names.
        let mut ticks = utc_ticks(Utc::now()).max(io.last_ticks.saturating_add(1));
        let mut path = backups.join(ticks.to_string());
        while path.exists() {
            ticks = ticks.saturating_add(1);
            path = backups.join(ticks.to_string());
        }
        io.last_ticks = ticks;

        snapshot.write_to(&path)?;
        tracing::info!(
            path = %path.display(),
            kinds = snapshot.len(),
            records = snapshot.record_count(),
            "backup written"
        );

        self.prune_locked();
        let created = folder_created(&path, ticks);
        Ok(BackupInfo {
            path,
            ticks,
            created,
        })
    }

    /// Delete all but the newest `retention` backups. Failures are logged
    /// and otherwise ignored.
    fn prune_locked(&self) {
        let backups = match self.list_locked() {
            Ok(backups) => backups,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list backups for pruning");
                return;
            }
        };
        for stale in backups.iter().skip(self.retention.max(1)) {
            match fs::remove_dir_all(&stale.path) {
                Ok(()) => tracing::debug!(path = %stale.path.display(), "old backup pruned"),
                Err(e) => {
                    tracing::warn!(path = %stale.path.display(), error = %e, "failed to prune backup");
                }
            }
        }
    }

    fn list_locked(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let dir = self.backups_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(&dir)(e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(BackupError::io(&dir))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(ticks) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i64>().ok())
            else {
                continue;
            };
            let created = folder_created(&path, ticks);
            backups.push(BackupInfo {
                path,
                ticks,
                created,
            });
        }
        backups.sort_by(|a, b| b.created.cmp(&a.created).then(b.ticks.cmp(&a.ticks)));
        Ok(backups)
    }
}

/// Creation time of a folder, falling back to its modification time and
/// then to the time its tick name encodes.
fn folder_created(path: &Path, ticks: i64) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .map_or_else(|_| ticks_to_datetime(ticks), DateTime::<Utc>::from)
}
