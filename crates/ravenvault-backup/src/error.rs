//! Error types for backups and restore points.

use std::path::PathBuf;

/// Errors raised while reading or writing snapshots.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// A file-system operation failed.
    #[error("backup I/O error at {path}: {source}")]
    Io {
        /// File or folder the operation targeted.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A snapshot file or store set could not be (de)serialized.
    #[error("snapshot JSON error for {kind}: {source}")]
    Json {
        /// Qualified kind name.
        kind: String,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A snapshot file held something other than a JSON array.
    #[error("snapshot file for {kind} is not a JSON array")]
    NotAnArray {
        /// Qualified kind name.
        kind: String,
    },

    /// Building or reading a zip archive failed.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn json(kind: &str) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| Self::Json {
            kind: kind.to_owned(),
            source,
        }
    }
}
