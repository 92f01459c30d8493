//! Error types for the migration tool.

use std::path::PathBuf;

use ravenvault_backup::BackupError;
use ravenvault_db::DbError;

/// Errors raised while migrating a restore point.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A statement or the connection failed.
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// The restore point could not be read or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] BackupError),

    /// There is nothing to migrate.
    #[error("no restore point found under {}", path.display())]
    NoRestorePoint {
        /// Folder that was searched.
        path: PathBuf,
    },
}
