//! Boot-time recovery and the shutdown restore point.
//!
//! On boot the store is filled from the restore point if one exists, else
//! from the newest backup. Reading the restore point archives it as a
//! backup. On graceful shutdown the flushed store is written back as the
//! restore point for the next boot. Changes the final flush could not write
//! go with it and are owed to the database again after the restore.

use ravenvault_backup::{BackupError, BackupProvider};
use ravenvault_core::EntityStore;
use ravenvault_types::game_kinds;

/// Where the boot state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootSource {
    /// The restore point.
    RestorePoint,
    /// The newest backup.
    Backup,
    /// Nothing was found; the store starts empty.
    Empty,
}

/// Fill `store` from the restore point or the newest backup.
///
/// Returns the source and the number of records loaded.
pub fn restore(
    store: &EntityStore,
    provider: &BackupProvider,
) -> Result<(BootSource, usize), BackupError> {
    let kinds = game_kinds();
    let (source, snapshot) = match provider.get_restore_point(&kinds)? {
        Some(snapshot) => (BootSource::RestorePoint, Some(snapshot)),
        None => match provider.latest_backup(&kinds)? {
            Some(snapshot) => (BootSource::Backup, Some(snapshot)),
            None => (BootSource::Empty, None),
        },
    };
    let loaded = match snapshot {
        Some(snapshot) => snapshot.load_into(store)?,
        None => 0,
    };
    tracing::info!(source = ?source, records = loaded, "store restored");
    Ok((source, loaded))
}

/// Write the store as the restore point.
pub fn save_restore_point(
    store: &EntityStore,
    provider: &BackupProvider,
) -> Result<(), BackupError> {
    let path = provider.write_restore_point(store)?;
    tracing::info!(path = %path.display(), "restore point saved for next boot");
    Ok(())
}
