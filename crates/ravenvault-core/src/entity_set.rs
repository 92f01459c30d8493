//! The entity set: every live instance of one kind, its primary and
//! lookup-group indices, and its change sets.
//!
//! Index mutations happen under one exclusive lock per set; reads share it.
//! The change sets sit behind their own mutex which is always taken after
//! the index lock, never before. No entity lock is ever waited on while the
//! index lock is held: handles are cloned out first and locked afterwards.
//!
//! Callers mutate entities through the handles they get back, foreign keys
//! included. A lookup-group query first re-links every handed-out entity
//! whose group keys no longer match its recorded memberships.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use ravenvault_types::{Entity, EntityKind, Operation, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Shared;
use crate::changes::{ChangeCounts, ChangeHub, ChangeSets, Stamp};

/// A dirty row read from a set at the start of a flush.
#[derive(Debug, Clone)]
pub struct PendingRow {
    /// Which write the row needs.
    pub operation: Operation,
    /// The row values as of the read.
    pub row: Row,
    /// Ordering stamp.
    pub stamp: Stamp,
    /// Revision to acknowledge once the row is written.
    pub revision: u64,
}

/// Type-erased view of an entity set used by the flush pipeline and the
/// backup subsystem.
pub trait TrackedSet: Send + Sync {
    /// Descriptor of the kind this set holds.
    fn kind(&self) -> EntityKind;

    /// Read every pending change as a row. Marks the start of a flush run.
    fn pending(&self) -> Vec<PendingRow>;

    /// Clear the given rows' dirty marks, if their revision is unchanged.
    fn acknowledge(&self, operation: Operation, rows: &[(Uuid, u64)]);

    /// Serialize every live entity as a JSON array, without touching them.
    fn snapshot_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Replace nothing, track nothing: index every record of a JSON array.
    /// Returns the number of records loaded.
    fn load_json(&self, value: &serde_json::Value) -> Result<usize, serde_json::Error>;

    /// Changes not yet written, as a JSON object: keys awaiting an insert,
    /// keys awaiting an update, and the full records awaiting a delete.
    fn unsaved_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Re-record changes described by [`unsaved_json`](Self::unsaved_json)
    /// against entities loaded from the same snapshot. Keys no longer live
    /// are ignored. Returns the number of changes recorded.
    fn mark_unsaved_json(&self, value: &serde_json::Value) -> Result<usize, serde_json::Error>;

    /// Size of each change map.
    fn counts(&self) -> ChangeCounts;

    /// Number of live entities.
    fn len(&self) -> usize;

    /// Whether the set holds no live entity.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unwritten changes of one set, kept beside a restore point.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: Deserialize<'de>"))]
struct Unsaved<E> {
    #[serde(default)]
    added: Vec<Uuid>,
    #[serde(default)]
    touched: Vec<Uuid>,
    #[serde(default)]
    removed: Vec<E>,
}

/// Primary map, lookup-group multi-maps, and recorded group memberships.
struct Indices<E> {
    primary: HashMap<Uuid, Shared<E>>,
    /// One multi-map per entry of `E::LOOKUP_GROUPS`, same order.
    groups: Vec<HashMap<Uuid, Vec<Uuid>>>,
    /// Group keys each entity was indexed under.
    memberships: HashMap<Uuid, Vec<Option<Uuid>>>,
}

impl<E: Entity> Indices<E> {
    fn new() -> Self {
        Self {
            primary: HashMap::new(),
            groups: E::LOOKUP_GROUPS.iter().map(|_| HashMap::new()).collect(),
            memberships: HashMap::new(),
        }
    }

    /// Insert or replace. Returns true when the key was already present.
    fn insert(&mut self, key: Uuid, entity: Shared<E>, fks: Vec<Option<Uuid>>) -> bool {
        let replaced = self.unlink(key).is_some();
        for (group, fk) in self.groups.iter_mut().zip(&fks) {
            if let Some(fk) = fk {
                group.entry(*fk).or_default().push(key);
            }
        }
        self.memberships.insert(key, fks);
        self.primary.insert(key, entity);
        replaced
    }

    /// Remove from every index.
    fn unlink(&mut self, key: Uuid) -> Option<Shared<E>> {
        let entity = self.primary.remove(&key)?;
        let fks = self.memberships.remove(&key).unwrap_or_default();
        for (group, fk) in self.groups.iter_mut().zip(&fks) {
            let Some(fk) = fk else { continue };
            if let Some(keys) = group.get_mut(fk) {
                keys.retain(|k| *k != key);
                if keys.is_empty() {
                    group.remove(fk);
                }
            }
        }
        Some(entity)
    }

    /// Move `key` to the groups named by `fks`. No-op when unchanged.
    fn relink(&mut self, key: Uuid, fks: Vec<Option<Uuid>>) {
        if self.memberships.get(&key).is_some_and(|old| *old == fks) {
            return;
        }
        if let Some(entity) = self.primary.get(&key).cloned() {
            self.insert(key, entity, fks);
        }
    }

    /// Whether `key` still maps to this very handle.
    fn is_current(&self, key: Uuid, entity: &Shared<E>) -> bool {
        self.primary.get(&key).is_some_and(|e| Arc::ptr_eq(e, entity))
    }

    fn handles(&self) -> Vec<(Uuid, Shared<E>)> {
        self.primary.iter().map(|(k, e)| (*k, Arc::clone(e))).collect()
    }

    fn group_keys(&self, group: usize, fk: Uuid) -> Vec<Uuid> {
        self.groups
            .get(group)
            .and_then(|g| g.get(&fk))
            .cloned()
            .unwrap_or_default()
    }
}

fn group_keys_of<E: Entity>(entity: &E) -> Vec<Option<Uuid>> {
    E::LOOKUP_GROUPS.iter().map(|g| g.key_of(entity)).collect()
}

fn group_position<E: Entity>(group: &str) -> Option<usize> {
    E::LOOKUP_GROUPS.iter().position(|g| g.name == group)
}

/// All live instances of one entity kind.
pub struct EntitySet<E: Entity> {
    indices: RwLock<Indices<E>>,
    changes: Mutex<ChangeSets<E>>,
    hub: Arc<ChangeHub>,
}

impl<E: Entity> EntitySet<E> {
    /// Create an empty set that stamps changes through `hub`.
    pub fn new(hub: Arc<ChangeHub>) -> Self {
        Self {
            indices: RwLock::new(Indices::new()),
            changes: Mutex::new(ChangeSets::default()),
            hub,
        }
    }

    /// Look up by primary key. Touches the entity.
    pub fn get(&self, key: Uuid) -> Option<Shared<E>> {
        let entity = {
            let indices = self.indices.read();
            let entity = indices.primary.get(&key).cloned()?;
            self.changes
                .lock()
                .record_touched(key, Arc::clone(&entity), self.hub.stamp());
            entity
        };
        self.hub.notify();
        Some(entity)
    }

    /// Every entity indexed under `fk` in `group`. Returns an empty list for
    /// an unknown group or key. Touches every returned entity.
    pub fn get_group(&self, group: &str, fk: Uuid) -> Vec<Shared<E>> {
        let Some(position) = group_position::<E>(group) else {
            tracing::debug!(kind = E::KIND, group, "unknown lookup group");
            return Vec::new();
        };
        self.resync_groups();
        let found = {
            let indices = self.indices.read();
            let found: Vec<(Uuid, Shared<E>)> = indices
                .group_keys(position, fk)
                .into_iter()
                .filter_map(|key| indices.primary.get(&key).map(|e| (key, Arc::clone(e))))
                .collect();
            self.touch_all(&found);
            found
        };
        self.notify_if(!found.is_empty());
        found.into_iter().map(|(_, e)| e).collect()
    }

    /// Every entity matching `predicate`. Touches every returned entity.
    ///
    /// Reads each entity under its lock; do not call while holding a write
    /// guard on an entity of this set.
    pub fn find(&self, predicate: impl Fn(&E) -> bool) -> Vec<Shared<E>> {
        let handles = self.indices.read().handles();
        let matched: Vec<(Uuid, Shared<E>)> = handles
            .into_iter()
            .filter(|(_, e)| predicate(&e.read()))
            .collect();
        let live = {
            let indices = self.indices.read();
            // Skip anything removed while the predicate ran.
            let live: Vec<(Uuid, Shared<E>)> = matched
                .into_iter()
                .filter(|(k, e)| indices.is_current(*k, e))
                .collect();
            self.touch_all(&live);
            live
        };
        self.notify_if(!live.is_empty());
        live.into_iter().map(|(_, e)| e).collect()
    }

    /// Every live entity. Touches all of them.
    pub fn all(&self) -> Vec<Shared<E>> {
        let found = {
            let indices = self.indices.read();
            let found = indices.handles();
            self.touch_all(&found);
            found
        };
        self.notify_if(!found.is_empty());
        found.into_iter().map(|(_, e)| e).collect()
    }

    /// Add an entity, replacing any live entity with the same key.
    pub fn add(&self, entity: E) -> Shared<E> {
        let key = entity.key();
        let fks = group_keys_of(&entity);
        let shared = Arc::new(RwLock::new(entity));
        {
            let mut indices = self.indices.write();
            let replaced = indices.insert(key, Arc::clone(&shared), fks);
            self.changes
                .lock()
                .record_added(key, Arc::clone(&shared), self.hub.stamp(), replaced);
        }
        tracing::trace!(kind = E::KIND, %key, "entity added");
        self.hub.notify();
        shared
    }

    /// Remove by primary key. Returns the removed handle.
    pub fn remove(&self, key: Uuid) -> Option<Shared<E>> {
        let removed = {
            let mut indices = self.indices.write();
            let removed = indices.unlink(key)?;
            self.changes
                .lock()
                .record_removed(key, Arc::clone(&removed), self.hub.stamp());
            removed
        };
        tracing::trace!(kind = E::KIND, %key, "entity removed");
        self.hub.notify();
        Some(removed)
    }

    /// Mutate an entity in place, re-index it at once if a lookup-group key
    /// changed, and touch it. Returns `f`'s result, or `None` if absent.
    ///
    /// Do not call it while holding a guard on the same entity.
    pub fn update<R>(&self, key: Uuid, f: impl FnOnce(&mut E) -> R) -> Option<R> {
        let entity = self.indices.read().primary.get(&key).cloned()?;
        let (result, fks) = {
            let mut guard = entity.write();
            let result = f(&mut guard);
            (result, group_keys_of(&*guard))
        };
        let live = {
            let mut indices = self.indices.write();
            let live = indices.is_current(key, &entity);
            if live {
                indices.relink(key, fks);
                self.changes
                    .lock()
                    .record_touched(key, Arc::clone(&entity), self.hub.stamp());
            }
            live
        };
        self.notify_if(live);
        Some(result)
    }

    /// Clone an entity without touching it.
    pub fn view(&self, key: Uuid) -> Option<E> {
        let entity = self.indices.read().primary.get(&key).cloned()?;
        let cloned = entity.read().clone();
        Some(cloned)
    }

    /// Clone every live entity, ordered by key, without touching any.
    pub fn snapshot(&self) -> Vec<E> {
        let handles = self.indices.read().handles();
        let mut entities: Vec<E> = handles.iter().map(|(_, e)| e.read().clone()).collect();
        entities.sort_by_key(Entity::key);
        entities
    }

    /// Index entities without change tracking. Used when booting from a
    /// snapshot whose rows already exist in the database.
    pub fn load(&self, entities: impl IntoIterator<Item = E>) -> usize {
        let mut indices = self.indices.write();
        let mut loaded = 0_usize;
        for entity in entities {
            let key = entity.key();
            let fks = group_keys_of(&entity);
            indices.insert(key, Arc::new(RwLock::new(entity)), fks);
            loaded = loaded.saturating_add(1);
        }
        loaded
    }

    /// Whether a live entity has this key. Does not touch.
    pub fn contains(&self, key: Uuid) -> bool {
        self.indices.read().primary.contains_key(&key)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.indices.read().primary.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending operation for a key, if any.
    pub fn pending_operation(&self, key: Uuid) -> Option<Operation> {
        self.changes.lock().contains(&key)
    }

    /// Size of each change map.
    pub fn change_counts(&self) -> ChangeCounts {
        self.changes.lock().counts()
    }

    /// Re-link entities whose group keys were changed through a handle.
    ///
    /// Only entities referenced outside the primary map can have changed.
    /// One that is write-locked right now is left for a later pass.
    fn resync_groups(&self) {
        if E::LOOKUP_GROUPS.is_empty() {
            return;
        }
        let moved: Vec<(Uuid, Shared<E>, Vec<Option<Uuid>>)> = {
            let indices = self.indices.read();
            indices
                .primary
                .iter()
                .filter(|&(_, e)| Arc::strong_count(e) > 1)
                .filter_map(|(key, e)| {
                    let fks = group_keys_of(&*e.try_read()?);
                    let stale = indices.memberships.get(key).is_none_or(|old| *old != fks);
                    stale.then(|| (*key, Arc::clone(e), fks))
                })
                .collect()
        };
        if moved.is_empty() {
            return;
        }
        let mut indices = self.indices.write();
        for (key, entity, fks) in moved {
            if indices.is_current(key, &entity) {
                tracing::trace!(kind = E::KIND, %key, "lookup groups re-linked");
                indices.relink(key, fks);
            }
        }
    }

    /// Must be called with the index lock held.
    fn touch_all(&self, found: &[(Uuid, Shared<E>)]) {
        if found.is_empty() {
            return;
        }
        let mut changes = self.changes.lock();
        for (key, entity) in found {
            changes.record_touched(*key, Arc::clone(entity), self.hub.stamp());
        }
    }

    fn notify_if(&self, changed: bool) {
        if changed {
            self.hub.notify();
        }
    }
}

impl<E: Entity> TrackedSet for EntitySet<E> {
    fn kind(&self) -> EntityKind {
        EntityKind::of::<E>()
    }

    fn pending(&self) -> Vec<PendingRow> {
        let entries = self.changes.lock().drain_view();
        entries
            .into_iter()
            .map(|(operation, change)| PendingRow {
                operation,
                row: change.entity.read().to_row(),
                stamp: change.stamp,
                revision: change.revision,
            })
            .collect()
    }

    fn acknowledge(&self, operation: Operation, rows: &[(Uuid, u64)]) {
        let mut changes = self.changes.lock();
        for (key, revision) in rows {
            changes.acknowledge(operation, *key, *revision);
        }
    }

    fn snapshot_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self.snapshot())
    }

    fn load_json(&self, value: &serde_json::Value) -> Result<usize, serde_json::Error> {
        let entities: Vec<E> = serde::Deserialize::deserialize(value)?;
        Ok(self.load(entities))
    }

    fn unsaved_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let (added, touched, removed) = {
            let changes = self.changes.lock();
            (
                changes.outstanding(Operation::Insert),
                changes.outstanding(Operation::Update),
                changes.outstanding(Operation::Delete),
            )
        };
        serde_json::to_value(Unsaved {
            added: added.into_iter().map(|(key, _)| key).collect(),
            touched: touched.into_iter().map(|(key, _)| key).collect(),
            removed: removed.iter().map(|(_, e)| e.read().clone()).collect::<Vec<E>>(),
        })
    }

    fn mark_unsaved_json(&self, value: &serde_json::Value) -> Result<usize, serde_json::Error> {
        let unsaved: Unsaved<E> = Deserialize::deserialize(value)?;
        let mut marked = 0_usize;
        {
            let indices = self.indices.read();
            let mut changes = self.changes.lock();
            for key in unsaved.added {
                if let Some(entity) = indices.primary.get(&key) {
                    changes.record_added(key, Arc::clone(entity), self.hub.stamp(), false);
                    marked = marked.saturating_add(1);
                }
            }
            for key in unsaved.touched {
                if let Some(entity) = indices.primary.get(&key) {
                    changes.record_touched(key, Arc::clone(entity), self.hub.stamp());
                    marked = marked.saturating_add(1);
                }
            }
            for entity in unsaved.removed {
                let key = entity.key();
                // Re-added before the snapshot was taken: the row stays.
                if indices.primary.contains_key(&key) {
                    continue;
                }
                changes.record_removed(key, Arc::new(RwLock::new(entity)), self.hub.stamp());
                marked = marked.saturating_add(1);
            }
        }
        self.notify_if(marked > 0);
        Ok(marked)
    }

    fn counts(&self) -> ChangeCounts {
        self.change_counts()
    }

    fn len(&self) -> usize {
        Self::len(self)
    }
}

impl<E: Entity> core::fmt::Debug for EntitySet<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntitySet")
            .field("kind", &E::KIND)
            .field("len", &self.len())
            .field("changes", &self.change_counts())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use ravenvault_types::{CharacterId, InventoryItem, InventoryItemId, ItemId};

    use super::*;

    fn set() -> EntitySet<InventoryItem> {
        EntitySet::new(Arc::new(ChangeHub::new()))
    }

    fn stack(character: CharacterId, item: ItemId, amount: i64) -> InventoryItem {
        InventoryItem {
            id: InventoryItemId::new(),
            character_id: character,
            item_id: item,
            amount,
            equipped: false,
            tag: None,
            soulbound: None,
        }
    }

    #[test]
    fn add_indexes_every_group() {
        let set = set();
        let owner = CharacterId::new();
        let item = ItemId::new();
        let s = stack(owner, item, 3);
        set.add(s.clone());

        assert_eq!(set.get_group("Character", owner.into_inner()).len(), 1);
        assert_eq!(set.get_group("Item", item.into_inner()).len(), 1);
        assert!(set.get(s.id.into_inner()).is_some());
    }

    #[test]
    fn unknown_group_or_key_yields_empty_list() {
        let set = set();
        set.add(stack(CharacterId::new(), ItemId::new(), 1));
        assert!(set.get_group("Clan", Uuid::now_v7()).is_empty());
        assert!(set.get_group("Character", Uuid::now_v7()).is_empty());
    }

    #[test]
    fn remove_unlinks_every_group() {
        let set = set();
        let owner = CharacterId::new();
        let s = stack(owner, ItemId::new(), 3);
        set.add(s.clone());
        set.remove(s.id.into_inner());

        assert!(set.get(s.id.into_inner()).is_none());
        assert!(set.get_group("Character", owner.into_inner()).is_empty());
        // Added then removed before a flush: nothing to write.
        assert_eq!(set.change_counts().total(), 0);
    }

    #[test]
    fn update_reindexes_changed_foreign_key() {
        let set = set();
        let (from, to) = (CharacterId::new(), CharacterId::new());
        let s = stack(from, ItemId::new(), 3);
        set.add(s.clone());

        set.update(s.id.into_inner(), |e| e.character_id = to);
        assert!(set.get_group("Character", from.into_inner()).is_empty());
        assert_eq!(set.get_group("Character", to.into_inner()).len(), 1);
    }

    #[test]
    fn foreign_key_changed_through_handle_is_relinked() {
        let set = set();
        let (from, to) = (CharacterId::new(), CharacterId::new());
        let s = stack(from, ItemId::new(), 3);
        set.load(vec![s.clone()]);

        set.get(s.id.into_inner()).unwrap().write().character_id = to;
        assert!(set.get_group("Character", from.into_inner()).is_empty());
        assert_eq!(set.get_group("Character", to.into_inner()).len(), 1);

        // A handle kept past a flush can still move the entity.
        let handle = set.get(s.id.into_inner()).unwrap();
        let acks: Vec<(Uuid, u64)> = set.pending().iter().map(|p| (p.row.key, p.revision)).collect();
        set.acknowledge(Operation::Update, &acks);
        assert_eq!(set.change_counts().total(), 0);
        handle.write().character_id = from;
        assert!(set.get_group("Character", to.into_inner()).is_empty());
        assert_eq!(set.get_group("Character", from.into_inner()).len(), 1);

        // Removal unlinks the current group, not a stale one.
        drop(handle);
        set.remove(s.id.into_inner());
        assert!(set.get_group("Character", from.into_inner()).is_empty());
    }

    #[test]
    fn reads_proceed_while_an_update_waits_on_a_held_entity() {
        let set = Arc::new(set());
        let owner = CharacterId::new();
        let a = stack(owner, ItemId::new(), 1);
        let b = stack(owner, ItemId::new(), 2);
        let (a_key, b_key) = (a.id.into_inner(), b.id.into_inner());
        set.add(a);
        set.add(b);

        let handle = set.get(a_key).unwrap();
        let mut guard = handle.write();
        let updater = {
            let set = Arc::clone(&set);
            std::thread::spawn(move || set.update(a_key, |e| e.amount = 7))
        };
        std::thread::sleep(Duration::from_millis(50));

        let (tx, rx) = mpsc::channel();
        let reader = {
            let set = Arc::clone(&set);
            std::thread::spawn(move || {
                let found = set.get(b_key).is_some();
                let group = set.get_group("Character", owner.into_inner()).len();
                let all = set.all().len();
                let viewed = set.view(b_key).map(|e| e.amount);
                tx.send((found, group, all, viewed)).unwrap();
            })
        };
        let reads = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("reads blocked behind a pending update");
        assert_eq!(reads, (true, 2, 2, Some(2)));

        guard.amount = 3;
        drop(guard);
        reader.join().unwrap();
        assert_eq!(updater.join().unwrap(), Some(()));
        assert_eq!(set.view(a_key).unwrap().amount, 7);
    }

    #[test]
    fn loaded_entities_are_clean_until_accessed() {
        let set = set();
        let s = stack(CharacterId::new(), ItemId::new(), 3);
        assert_eq!(set.load(vec![s.clone()]), 1);
        assert_eq!(set.change_counts().total(), 0);

        // Non-touching reads stay clean.
        assert!(set.view(s.id.into_inner()).is_some());
        assert_eq!(set.snapshot().len(), 1);
        assert_eq!(set.change_counts().total(), 0);

        let handle = set.get(s.id.into_inner()).unwrap();
        handle.write().amount = 9;
        assert_eq!(set.pending_operation(s.id.into_inner()), Some(Operation::Update));

        let pending = set.pending();
        assert_eq!(pending.len(), 1);
        let row = &pending.first().unwrap().row;
        assert!(row.values.contains(&ravenvault_types::SqlValue::Integer(9)));
    }

    #[test]
    fn change_sets_stay_disjoint() {
        let set = set();
        let loaded = stack(CharacterId::new(), ItemId::new(), 1);
        set.load(vec![loaded.clone()]);
        let added = stack(CharacterId::new(), ItemId::new(), 1);
        set.add(added.clone());

        set.get(loaded.id.into_inner());
        set.get(added.id.into_inner());
        set.remove(loaded.id.into_inner());

        let counts = set.change_counts();
        assert_eq!(counts, ChangeCounts { added: 1, touched: 0, removed: 1 });
        let pending = set.pending();
        let mut keys: Vec<Uuid> = pending.iter().map(|p| p.row.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), pending.len());
    }

    #[test]
    fn acknowledged_rows_are_clean() {
        let set = set();
        let s = stack(CharacterId::new(), ItemId::new(), 1);
        set.add(s.clone());
        let pending = set.pending();
        let acks: Vec<(Uuid, u64)> = pending.iter().map(|p| (p.row.key, p.revision)).collect();
        set.acknowledge(Operation::Insert, &acks);
        assert_eq!(set.change_counts().total(), 0);
        assert!(set.contains(s.id.into_inner()));
    }

    #[test]
    fn unsaved_changes_are_re_marked_after_reload() {
        let source = set();
        let clean = stack(CharacterId::new(), ItemId::new(), 1);
        let edited = stack(CharacterId::new(), ItemId::new(), 2);
        let deleted = stack(CharacterId::new(), ItemId::new(), 3);
        source.load(vec![clean.clone(), edited.clone(), deleted.clone()]);
        let added = stack(CharacterId::new(), ItemId::new(), 4);
        source.add(added.clone());
        source.get(edited.id.into_inner()).unwrap().write().amount = 20;
        source.remove(deleted.id.into_inner());

        let json = source.snapshot_json().unwrap();
        let unsaved = source.unsaved_json().unwrap();

        let target = set();
        assert_eq!(target.load_json(&json).unwrap(), 3);
        assert_eq!(target.change_counts().total(), 0);
        assert_eq!(target.mark_unsaved_json(&unsaved).unwrap(), 3);

        assert_eq!(target.change_counts(), ChangeCounts { added: 1, touched: 1, removed: 1 });
        assert_eq!(target.pending_operation(added.id.into_inner()), Some(Operation::Insert));
        assert_eq!(target.pending_operation(edited.id.into_inner()), Some(Operation::Update));
        assert_eq!(target.pending_operation(deleted.id.into_inner()), Some(Operation::Delete));
        assert_eq!(target.pending_operation(clean.id.into_inner()), None);
        assert!(!target.contains(deleted.id.into_inner()));
    }

    #[test]
    fn snapshot_json_round_trips_through_load() {
        let source = set();
        source.add(stack(CharacterId::new(), ItemId::new(), 2));
        source.add(stack(CharacterId::new(), ItemId::new(), 5));
        let json = source.snapshot_json().unwrap();

        let target = set();
        assert_eq!(target.load_json(&json).unwrap(), 2);
        assert_eq!(target.snapshot(), source.snapshot());
    }
}
