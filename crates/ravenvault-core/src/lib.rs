//! Configuration, indexed entity store, and dirty tracking for `RavenVault`.
//!
//! This crate owns the in-memory side of the persistence core: the entity
//! sets the game service reads and mutates, the change sets the write-behind
//! flush drains, and the scheduler abstraction that paces those flushes.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `ravenvault-config.yaml` into
//!   strongly-typed structs.
//! - [`changes`] -- Change stamps, change sets, and the [`ChangeListener`]
//!   hook.
//! - [`entity_set`] -- [`EntitySet`] with primary and lookup-group indices,
//!   and its type-erased [`TrackedSet`] view.
//! - [`store`] -- [`EntityStore`], one set per kind.
//! - [`scheduler`] -- [`Scheduler`] trait and [`TokioScheduler`].
//! - [`session_state`] -- Ephemeral per-character session state.
//! - [`logging`] -- `tracing` subscriber setup for the binaries.
//!
//! [`ChangeListener`]: changes::ChangeListener
//! [`EntitySet`]: entity_set::EntitySet
//! [`TrackedSet`]: entity_set::TrackedSet
//! [`EntityStore`]: store::EntityStore
//! [`Scheduler`]: scheduler::Scheduler
//! [`TokioScheduler`]: scheduler::TokioScheduler

pub mod changes;
pub mod config;
pub mod entity_set;
pub mod logging;
pub mod scheduler;
pub mod session_state;
pub mod store;

use std::sync::Arc;

/// Shared, lockable handle to a live entity.
pub type Shared<E> = Arc<parking_lot::RwLock<E>>;

pub use changes::{ChangeCounts, ChangeHub, ChangeListener, Stamp};
pub use config::VaultConfig;
pub use entity_set::{EntitySet, PendingRow, TrackedSet};
pub use scheduler::{ScheduleHandle, ScheduledTask, Scheduler, TokioScheduler};
pub use session_state::{CharacterSessionState, SessionStates};
pub use store::EntityStore;
