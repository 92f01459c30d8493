//! Rolling backups, restore points, and compressed export for `RavenVault`.
//!
//! The store is periodically written out as a [`Snapshot`]: one JSON array
//! per entity kind. [`BackupProvider`] keeps a rolling window of such
//! snapshots under `<data_root>/backups/`, and reads and writes the single
//! restore point under `<data_root>/restorepoints/` that the service boots
//! from and the migration tool consumes.
//!
//! # Modules
//!
//! - [`provider`] -- [`BackupProvider`], tick-named backup folders,
//!   retention pruning, and the restore point.
//! - [`snapshot`] -- [`Snapshot`] and its zip form.
//! - [`error`] -- [`BackupError`].
//!
//! [`BackupProvider`]: provider::BackupProvider
//! [`Snapshot`]: snapshot::Snapshot
//! [`BackupError`]: error::BackupError

pub mod error;
pub mod provider;
pub mod snapshot;

pub use error::BackupError;
pub use provider::{BackupInfo, BackupProvider, ticks_to_datetime, utc_ticks};
pub use snapshot::Snapshot;
