//! The entity store: one [`EntitySet`] per kind, created on first use.
//!
//! The store is the contract the rest of the service talks to. Reads that
//! hand back a [`Shared`] handle mark the entity touched so any mutation made
//! through the handle is picked up by the next flush.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use ravenvault_types::{
    Appearance, Character, Entity, GameClient, GameEvent, GameSession, InventoryItem, Item,
    MarketItem, Operation, Resources, Skills, Statistics, User,
};
use uuid::Uuid;

use crate::Shared;
use crate::changes::{ChangeCounts, ChangeHub, ChangeListener};
use crate::entity_set::{EntitySet, TrackedSet};

/// Registered sets, keyed by entity type and kept in registration order.
#[derive(Default)]
struct Registry {
    by_type: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    by_table: HashMap<&'static str, Arc<dyn TrackedSet>>,
    ordered: Vec<Arc<dyn TrackedSet>>,
}

impl Registry {
    fn typed<E: Entity>(&self) -> Option<Arc<EntitySet<E>>> {
        self.by_type
            .get(&TypeId::of::<E>())
            .cloned()
            .and_then(|set| set.downcast::<EntitySet<E>>().ok())
    }

    fn insert<E: Entity>(&mut self, set: &Arc<EntitySet<E>>) {
        let any: Arc<dyn Any + Send + Sync> = Arc::clone(set) as Arc<dyn Any + Send + Sync>;
        let tracked: Arc<dyn TrackedSet> = Arc::clone(set) as Arc<dyn TrackedSet>;
        self.by_type.insert(TypeId::of::<E>(), any);
        self.by_table.insert(E::KIND, Arc::clone(&tracked));
        self.ordered.push(tracked);
    }
}

/// In-memory store of every entity kind.
pub struct EntityStore {
    registry: RwLock<Registry>,
    hub: Arc<ChangeHub>,
}

impl EntityStore {
    /// Create an empty store. Sets are created lazily on first access.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            hub: Arc::new(ChangeHub::new()),
        }
    }

    /// Create a store with every game kind registered in dependency order,
    /// so flushes and snapshots visit referenced kinds first.
    pub fn with_game_kinds() -> Self {
        let store = Self::new();
        store.set::<User>();
        store.set::<Item>();
        store.set::<GameClient>();
        store.set::<Skills>();
        store.set::<Resources>();
        store.set::<Statistics>();
        store.set::<Appearance>();
        store.set::<Character>();
        store.set::<InventoryItem>();
        store.set::<MarketItem>();
        store.set::<GameSession>();
        store.set::<GameEvent>();
        store
    }

    /// The set holding kind `E`, created on first use.
    pub fn set<E: Entity>(&self) -> Arc<EntitySet<E>> {
        if let Some(set) = self.registry.read().typed::<E>() {
            return set;
        }
        let mut registry = self.registry.write();
        if let Some(set) = registry.typed::<E>() {
            return set;
        }
        let set = Arc::new(EntitySet::<E>::new(Arc::clone(&self.hub)));
        registry.insert(&set);
        tracing::debug!(kind = E::KIND, "entity set registered");
        set
    }

    /// Look up by primary key. Touches the entity.
    pub fn get<E: Entity>(&self, key: impl Into<Uuid>) -> Option<Shared<E>> {
        self.set::<E>().get(key.into())
    }

    /// Every entity of kind `E` indexed under `fk` in `group`.
    pub fn get_group<E: Entity>(&self, group: &str, fk: impl Into<Uuid>) -> Vec<Shared<E>> {
        self.set::<E>().get_group(group, fk.into())
    }

    /// Every entity of kind `E` matching `predicate`.
    pub fn find<E: Entity>(&self, predicate: impl Fn(&E) -> bool) -> Vec<Shared<E>> {
        self.set::<E>().find(predicate)
    }

    /// Every live entity of kind `E`.
    pub fn all<E: Entity>(&self) -> Vec<Shared<E>> {
        self.set::<E>().all()
    }

    /// Add an entity.
    pub fn add<E: Entity>(&self, entity: E) -> Shared<E> {
        self.set::<E>().add(entity)
    }

    /// Remove an entity by primary key.
    pub fn remove<E: Entity>(&self, key: impl Into<Uuid>) -> Option<Shared<E>> {
        self.set::<E>().remove(key.into())
    }

    /// Mutate an entity in place and re-index it. See [`EntitySet::update`].
    pub fn update<E: Entity, R>(&self, key: impl Into<Uuid>, f: impl FnOnce(&mut E) -> R) -> Option<R> {
        self.set::<E>().update(key.into(), f)
    }

    /// Clone an entity without touching it.
    pub fn view<E: Entity>(&self, key: impl Into<Uuid>) -> Option<E> {
        self.set::<E>().view(key.into())
    }

    /// Every registered set, in registration order.
    pub fn tracked_sets(&self) -> Vec<Arc<dyn TrackedSet>> {
        self.registry.read().ordered.clone()
    }

    /// The set for a table name, if registered.
    pub fn tracked(&self, table: &str) -> Option<Arc<dyn TrackedSet>> {
        self.registry.read().by_table.get(table).cloned()
    }

    /// Clear persisted rows' dirty marks on the set owning `table`.
    pub fn acknowledge(&self, table: &str, operation: Operation, rows: &[(Uuid, u64)]) {
        match self.tracked(table) {
            Some(set) => set.acknowledge(operation, rows),
            None => tracing::warn!(table, %operation, "acknowledgement for unknown table"),
        }
    }

    /// Pending change counts summed over every set.
    pub fn change_counts(&self) -> ChangeCounts {
        self.tracked_sets()
            .iter()
            .fold(ChangeCounts::default(), |acc, set| acc.merge(set.counts()))
    }

    /// Register the listener notified whenever any set records a change.
    pub fn set_change_listener(&self, listener: Weak<dyn ChangeListener>) {
        self.hub.set_listener(listener);
    }

    /// Remove the change listener.
    pub fn clear_change_listener(&self) {
        self.hub.clear_listener();
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let kinds: Vec<&'static str> = self
            .tracked_sets()
            .iter()
            .map(|set| set.kind().name())
            .collect();
        f.debug_struct("EntityStore")
            .field("kinds", &kinds)
            .field("changes", &self.change_counts())
            .finish()
    }
}
