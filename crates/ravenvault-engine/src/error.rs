//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup, serving, and shutdown.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ravenvault_core::config::ConfigError,
    },

    /// Database access failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying data-layer error.
        #[from]
        source: ravenvault_db::DbError,
    },

    /// Reading or writing snapshots failed.
    #[error("backup error: {source}")]
    Backup {
        /// The underlying backup error.
        #[from]
        source: ravenvault_backup::BackupError,
    },

    /// A blocking task panicked or was cancelled.
    #[error("task error: {source}")]
    Task {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },

    /// No Tokio runtime was available for the flush scheduler.
    #[error("scheduler error: {message}")]
    Scheduler {
        /// Description of the failure.
        message: String,
    },
}
