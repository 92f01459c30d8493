//! Error types for the data layer.
//!
//! A [`DbError`] never reaches gameplay code: the write-behind loop logs it
//! and leaves the affected changes dirty for the next run.

/// Failures while talking to the database or preparing statements.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The connection, or a statement on it, failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A schema migration script failed.
    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A multi-row statement was asked to span several tables.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Connection settings were unusable.
    #[error("configuration error: {0}")]
    Config(String),
}
