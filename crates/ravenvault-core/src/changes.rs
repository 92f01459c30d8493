//! Dirty tracking: change stamps, per-set change sets, and the change hub
//! that wakes the flush loop.
//!
//! A change set keeps three disjoint maps keyed by primary key: Added,
//! Touched and Removed. Each entry holds the entity handle, the stamp used
//! for flush ordering, and a revision. The flush loop reads the entries,
//! writes them, and then acknowledges each row with the revision it read;
//! an entry whose revision moved on in the meantime stays dirty.

use std::collections::HashMap;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use ravenvault_types::Operation;
use serde::Serialize;
use uuid::Uuid;

use crate::Shared;

/// Ordering key of a change entry: wall-clock time plus a process-wide
/// sequence number, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Stamp {
    /// When the change was recorded.
    pub at: DateTime<Utc>,
    /// Process-wide sequence number, unique per stamp.
    pub seq: u64,
}

/// Receives a call whenever any tracked set records a change.
///
/// Implementations must be cheap and must not call back into the store.
pub trait ChangeListener: Send + Sync {
    /// A change was recorded.
    fn on_change(&self);
}

/// Shared stamp source and listener slot for every set of one store.
#[derive(Default)]
pub struct ChangeHub {
    seq: AtomicU64,
    listener: RwLock<Option<Weak<dyn ChangeListener>>>,
}

impl ChangeHub {
    /// Create a hub with no listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh stamp.
    pub fn stamp(&self) -> Stamp {
        Stamp {
            at: Utc::now(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Register the listener notified on every change. The hub holds it
    /// weakly; a dropped listener is simply no longer called.
    pub fn set_listener(&self, listener: Weak<dyn ChangeListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Remove the registered listener.
    pub fn clear_listener(&self) {
        *self.listener.write() = None;
    }

    /// Notify the listener, if one is registered and still alive.
    pub fn notify(&self) {
        let listener = self.listener.read().as_ref().and_then(Weak::upgrade);
        if let Some(listener) = listener {
            listener.on_change();
        }
    }
}

impl core::fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeHub")
            .field("seq", &self.seq.load(Ordering::Relaxed))
            .field("has_listener", &self.listener.read().is_some())
            .finish()
    }
}

/// Number of entries in each change map of one set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    /// Entities awaiting an insert.
    pub added: usize,
    /// Entities awaiting an update.
    pub touched: usize,
    /// Entities awaiting a delete.
    pub removed: usize,
}

impl ChangeCounts {
    /// Total pending entries.
    pub const fn total(&self) -> usize {
        self.added.saturating_add(self.touched).saturating_add(self.removed)
    }

    /// Add another set's counts to this one.
    pub const fn merge(self, other: Self) -> Self {
        Self {
            added: self.added.saturating_add(other.added),
            touched: self.touched.saturating_add(other.touched),
            removed: self.removed.saturating_add(other.removed),
        }
    }
}

/// One change entry.
#[derive(Debug)]
pub(crate) struct Change<E> {
    pub(crate) entity: Shared<E>,
    pub(crate) stamp: Stamp,
    pub(crate) revision: u64,
}

impl<E> Clone for Change<E> {
    fn clone(&self) -> Self {
        Self {
            entity: std::sync::Arc::clone(&self.entity),
            stamp: self.stamp,
            revision: self.revision,
        }
    }
}

impl<E> Change<E> {
    const fn new(entity: Shared<E>, stamp: Stamp) -> Self {
        Self {
            entity,
            stamp,
            revision: stamp.seq,
        }
    }
}

/// The three disjoint change maps of one entity set.
#[derive(Debug)]
pub(crate) struct ChangeSets<E> {
    added: HashMap<Uuid, Change<E>>,
    touched: HashMap<Uuid, Change<E>>,
    removed: HashMap<Uuid, Change<E>>,
    /// Added entries removed again before they were acknowledged. Their
    /// insert may already be in flight, so an insert acknowledgement for
    /// one of these keys turns into a pending delete.
    dropped: HashMap<Uuid, Change<E>>,
}

impl<E> Default for ChangeSets<E> {
    fn default() -> Self {
        Self {
            added: HashMap::new(),
            touched: HashMap::new(),
            removed: HashMap::new(),
            dropped: HashMap::new(),
        }
    }
}

impl<E> ChangeSets<E> {
    /// Record an add. `replaced` is true when the key was already live.
    pub(crate) fn record_added(&mut self, key: Uuid, entity: Shared<E>, stamp: Stamp, replaced: bool) {
        self.dropped.remove(&key);
        if let Some(change) = self.added.get_mut(&key) {
            change.entity = entity;
            change.revision = stamp.seq;
            return;
        }
        if self.removed.remove(&key).is_some() || replaced {
            // The row still exists in the database.
            self.touched.insert(key, Change::new(entity, stamp));
            return;
        }
        self.touched.remove(&key);
        self.added.insert(key, Change::new(entity, stamp));
    }

    /// Record a touch of a live entity.
    pub(crate) fn record_touched(&mut self, key: Uuid, entity: Shared<E>, stamp: Stamp) {
        if let Some(change) = self.added.get_mut(&key) {
            // Inserts stay in creation order.
            change.revision = stamp.seq;
            return;
        }
        if self.removed.contains_key(&key) {
            return;
        }
        self.touched.insert(key, Change::new(entity, stamp));
    }

    /// Record a removal.
    pub(crate) fn record_removed(&mut self, key: Uuid, entity: Shared<E>, stamp: Stamp) {
        if let Some(change) = self.added.remove(&key) {
            self.dropped.insert(key, change);
            return;
        }
        self.touched.remove(&key);
        self.removed.insert(key, Change::new(entity, stamp));
    }

    /// Clone every pending entry, tagged with its operation.
    ///
    /// Called at the start of a flush run: no insert is in flight at that
    /// point, so dropped entries can be forgotten.
    pub(crate) fn drain_view(&mut self) -> Vec<(Operation, Change<E>)> {
        self.dropped.clear();
        let mut out = Vec::with_capacity(
            self.added
                .len()
                .saturating_add(self.touched.len())
                .saturating_add(self.removed.len()),
        );
        out.extend(self.added.values().map(|c| (Operation::Insert, c.clone())));
        out.extend(self.touched.values().map(|c| (Operation::Update, c.clone())));
        out.extend(self.removed.values().map(|c| (Operation::Delete, c.clone())));
        out
    }

    /// Clear the entry for `key` if it still carries `revision`.
    pub(crate) fn acknowledge(&mut self, operation: Operation, key: Uuid, revision: u64) {
        match operation {
            Operation::Insert => {
                if let Some(change) = self.dropped.remove(&key) {
                    // Removed while its insert was in flight: the row now
                    // exists and must be deleted.
                    self.removed.insert(key, change);
                    return;
                }
                let Some(change) = self.added.remove(&key) else {
                    return;
                };
                if change.revision != revision {
                    self.touched.insert(key, change);
                }
            }
            Operation::Update => {
                if self.touched.get(&key).is_some_and(|c| c.revision == revision) {
                    self.touched.remove(&key);
                }
            }
            Operation::Delete => {
                if self.removed.get(&key).is_some_and(|c| c.revision == revision) {
                    self.removed.remove(&key);
                    return;
                }
                // Re-added while its delete was in flight: the row is gone,
                // so the next write has to be an insert.
                if let Some(change) = self.touched.remove(&key) {
                    self.added.insert(key, change);
                }
            }
        }
    }

    /// Entries of one map, oldest stamp first.
    pub(crate) fn outstanding(&self, operation: Operation) -> Vec<(Uuid, Shared<E>)> {
        let map = match operation {
            Operation::Insert => &self.added,
            Operation::Update => &self.touched,
            Operation::Delete => &self.removed,
        };
        let mut entries: Vec<(Stamp, Uuid, Shared<E>)> = map
            .iter()
            .map(|(key, change)| (change.stamp, *key, std::sync::Arc::clone(&change.entity)))
            .collect();
        entries.sort_by_key(|(stamp, _, _)| *stamp);
        entries.into_iter().map(|(_, key, entity)| (key, entity)).collect()
    }

    pub(crate) fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            added: self.added.len(),
            touched: self.touched.len(),
            removed: self.removed.len(),
        }
    }

    pub(crate) fn contains(&self, key: &Uuid) -> Option<Operation> {
        if self.added.contains_key(key) {
            Some(Operation::Insert)
        } else if self.touched.contains_key(key) {
            Some(Operation::Update)
        } else if self.removed.contains_key(key) {
            Some(Operation::Delete)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn handle() -> Shared<u32> {
        Arc::new(parking_lot::RwLock::new(0))
    }

    #[test]
    fn stamps_are_strictly_increasing() {
        let hub = ChangeHub::new();
        let a = hub.stamp();
        let b = hub.stamp();
        assert!(a < b);
    }

    #[test]
    fn readding_pending_removal_becomes_touched() {
        let hub = ChangeHub::new();
        let mut sets = ChangeSets::default();
        let key = Uuid::now_v7();
        sets.record_removed(key, handle(), hub.stamp());
        sets.record_added(key, handle(), hub.stamp(), false);
        assert_eq!(sets.contains(&key), Some(Operation::Update));
        assert_eq!(sets.counts().total(), 1);
    }

    #[test]
    fn removing_added_entity_drops_it() {
        let hub = ChangeHub::new();
        let mut sets = ChangeSets::default();
        let key = Uuid::now_v7();
        sets.record_added(key, handle(), hub.stamp(), false);
        sets.record_removed(key, handle(), hub.stamp());
        assert_eq!(sets.contains(&key), None);
        assert_eq!(sets.counts().total(), 0);
    }

    #[test]
    fn insert_in_flight_then_removed_becomes_delete() {
        let hub = ChangeHub::new();
        let mut sets = ChangeSets::default();
        let key = Uuid::now_v7();
        sets.record_added(key, handle(), hub.stamp(), false);
        let view = sets.drain_view();
        let revision = view.first().unwrap().1.revision;
        sets.record_removed(key, handle(), hub.stamp());
        sets.acknowledge(Operation::Insert, key, revision);
        assert_eq!(sets.contains(&key), Some(Operation::Delete));
    }

    #[test]
    fn touch_keeps_added_stamp_and_bumps_revision() {
        let hub = ChangeHub::new();
        let mut sets = ChangeSets::default();
        let key = Uuid::now_v7();
        let created = hub.stamp();
        sets.record_added(key, handle(), created, false);
        let read = sets.drain_view().first().unwrap().1.revision;
        sets.record_touched(key, handle(), hub.stamp());

        let view = sets.drain_view();
        let (operation, change) = view.first().unwrap();
        assert_eq!(*operation, Operation::Insert);
        assert_eq!(change.stamp, created);
        assert_ne!(change.revision, read);

        // The insert that read the old revision lands: the entity needs an
        // update to carry the newer values.
        sets.acknowledge(Operation::Insert, key, read);
        assert_eq!(sets.contains(&key), Some(Operation::Update));
    }

    #[test]
    fn stale_update_acknowledgement_keeps_entry() {
        let hub = ChangeHub::new();
        let mut sets = ChangeSets::default();
        let key = Uuid::now_v7();
        sets.record_touched(key, handle(), hub.stamp());
        let read = sets.drain_view().first().unwrap().1.revision;
        sets.record_touched(key, handle(), hub.stamp());
        sets.acknowledge(Operation::Update, key, read);
        assert_eq!(sets.contains(&key), Some(Operation::Update));
    }

    #[test]
    fn readded_during_delete_becomes_insert() {
        let hub = ChangeHub::new();
        let mut sets = ChangeSets::default();
        let key = Uuid::now_v7();
        sets.record_removed(key, handle(), hub.stamp());
        let read = sets.drain_view().first().unwrap().1.revision;
        sets.record_added(key, handle(), hub.stamp(), false);
        sets.acknowledge(Operation::Delete, key, read);
        assert_eq!(sets.contains(&key), Some(Operation::Insert));
    }
}
