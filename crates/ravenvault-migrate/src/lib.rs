//! Restore-point migration for `RavenVault`.
//!
//! Moves a restore point into a (possibly different) database one table at
//! a time. A failing table never blocks the others: it is left empty and
//! reported. The character mode first cleans the data with the rules in
//! [`cleaning`].
//!
//! # Modules
//!
//! - [`migrator`] -- [`Migrator`] and [`MigrationReport`].
//! - [`cleaning`] -- Inventory merging, market caps, and ghost filtering.
//! - [`error`] -- [`MigrationError`].
//!
//! [`Migrator`]: migrator::Migrator
//! [`MigrationReport`]: migrator::MigrationReport
//! [`MigrationError`]: error::MigrationError

pub mod cleaning;
pub mod error;
pub mod migrator;

pub use cleaning::CleaningReport;
pub use error::MigrationError;
pub use migrator::{MigrationReport, Migrator};
