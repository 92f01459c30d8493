//! Flush pipeline and write-behind loop tests against a recording connector.
//!
//! No database is needed: the connector records every statement and can be
//! told to report zero affected rows or to refuse connections.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::missing_panics_doc,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ravenvault_core::config::PersistenceConfig;
use ravenvault_core::{EntityStore, TokioScheduler};
use ravenvault_db::{DbError, SavePipeline, SqlConnection, SqlConnector, Statement, WriteBehind};
use ravenvault_types::{
    CharacterId, InventoryItem, InventoryItemId, Item, ItemCategory, ItemId, ItemType, Operation,
};

// =============================================================================
// Recording connector
// =============================================================================

#[derive(Default)]
struct RecorderState {
    statements: Vec<Statement>,
    /// Index (in `statements`) of the statement to report as affecting zero rows.
    stall_at: Option<usize>,
    refuse_connections: bool,
}

#[derive(Clone, Default)]
struct Recorder {
    state: Arc<Mutex<RecorderState>>,
}

impl Recorder {
    fn statements(&self) -> Vec<Statement> {
        self.state.lock().statements.clone()
    }

    fn stall_at(&self, index: Option<usize>) {
        self.state.lock().stall_at = index;
    }

    fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    fn clear(&self) {
        self.state.lock().statements.clear();
    }
}

struct RecorderConnection {
    state: Arc<Mutex<RecorderState>>,
}

impl SqlConnector for Recorder {
    type Connection = RecorderConnection;

    async fn connect(&self) -> Result<Self::Connection, DbError> {
        if self.state.lock().refuse_connections {
            return Err(DbError::Config("connection refused".to_owned()));
        }
        Ok(RecorderConnection {
            state: Arc::clone(&self.state),
        })
    }
}

impl SqlConnection for RecorderConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, DbError> {
        let mut state = self.state.lock();
        let index = state.statements.len();
        state.statements.push(statement.clone());
        if state.stall_at == Some(index) {
            return Ok(0);
        }
        Ok(u64::try_from(statement.row_count()).unwrap())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn item(name: &str) -> Item {
    Item {
        id: ItemId::new(),
        name: name.to_owned(),
        category: ItemCategory::Resource,
        item_type: ItemType::None,
        level: 1,
        weapon_aim: 0,
        weapon_power: 0,
        armor_power: 0,
        shop_buy_price: 10,
        shop_sell_price: 5,
        craftable: Some(false),
        generic_prefab: None,
    }
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

fn config(max_batch_size: usize) -> PersistenceConfig {
    PersistenceConfig {
        flush_interval_ms: 10_000,
        max_batch_size,
        dry_run: false,
    }
}

// =============================================================================
// Save pipeline
// =============================================================================

#[tokio::test]
async fn touched_entity_flushes_one_update_with_latest_values() {
    let store = EntityStore::new();
    let owner = CharacterId::new();
    let s = stack(owner, ItemId::new(), 1);
    store.set::<InventoryItem>().load(vec![s.clone()]);

    let handle = store.get::<InventoryItem>(s.id).unwrap();
    handle.write().amount = 5;
    let again = store.get_group::<InventoryItem>("Character", owner);
    again[0].write().amount = 12;

    let recorder = Recorder::default();
    let report = SavePipeline::default().run(&store, &recorder).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.rows_persisted, 1);

    let statements = recorder.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].operation, Operation::Update);
    assert!(statements[0].sql.contains("\"Amount\" = 12"));
    assert_eq!(store.change_counts().total(), 0);
}

#[tokio::test]
async fn flush_orders_inserts_then_updates_then_deletes() {
    let store = EntityStore::new();
    let (kept, dropped) = (item("Ore"), item("Logs"));
    store.set::<Item>().load(vec![kept.clone(), dropped.clone()]);

    // Mutations arrive in the opposite order of the flush order.
    store.remove::<Item>(dropped.id);
    store.get::<Item>(kept.id).unwrap().write().level = 5;
    store.add(item("Ingot"));

    let recorder = Recorder::default();
    SavePipeline::default().run(&store, &recorder).await.unwrap();

    let operations: Vec<Operation> = recorder.statements().iter().map(|s| s.operation).collect();
    assert_eq!(
        operations,
        vec![Operation::Insert, Operation::Update, Operation::Delete]
    );
}

#[tokio::test]
async fn zero_rows_stops_run_and_keeps_rest_dirty() {
    let store = EntityStore::new();
    for i in 0..5 {
        store.add(item(&format!("Item {i}")));
    }

    let recorder = Recorder::default();
    recorder.stall_at(Some(1));
    let pipeline = SavePipeline::new(2);
    let report = pipeline.run(&store, &recorder).await.unwrap();

    assert_eq!(report.batches_planned, 3);
    assert_eq!(report.batches_executed, 1);
    assert_eq!(report.rows_persisted, 2);
    let stalled = report.stalled.unwrap();
    assert_eq!(stalled.index, 1);
    assert_eq!(stalled.operation, Operation::Insert);
    // The first batch stays written; the stalled batch and the one after it
    // are retried.
    assert_eq!(store.change_counts().added, 3);

    recorder.stall_at(None);
    recorder.clear();
    let retry = pipeline.run(&store, &recorder).await.unwrap();
    assert!(retry.is_complete());
    assert_eq!(retry.rows_persisted, 3);
    assert_eq!(store.change_counts().total(), 0);
}

#[tokio::test]
async fn connection_failure_keeps_everything_dirty() {
    let store = EntityStore::new();
    store.add(item("Ore"));

    let recorder = Recorder::default();
    recorder.refuse_connections(true);
    let result = SavePipeline::default().run(&store, &recorder).await;
    assert!(result.is_err());
    assert_eq!(store.change_counts().added, 1);
}

#[tokio::test]
async fn change_during_flush_survives_acknowledgement() {
    let store = EntityStore::new();
    let ore = store.add(item("Ore"));
    let id = ore.read().id;

    // Read the batch, then mutate before the acknowledgement lands.
    let pipeline = SavePipeline::default();
    let plan = pipeline.plan(&store);
    store.get::<Item>(id).unwrap().write().level = 9;
    for batch in &plan {
        let acks: Vec<_> = batch.entries.iter().map(|e| (e.row.key, e.revision)).collect();
        store.acknowledge("Item", batch.operation, &acks);
    }

    // The insert landed with stale values: an update is still owed.
    assert_eq!(store.change_counts().touched, 1);
    let recorder = Recorder::default();
    pipeline.run(&store, &recorder).await.unwrap();
    let statements = recorder.statements();
    assert_eq!(statements[0].operation, Operation::Update);
    assert!(statements[0].sql.contains("\"Level\" = 9"));
}

// =============================================================================
// Write-behind loop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn mutation_arms_a_flush_after_the_interval() {
    let store = Arc::new(EntityStore::new());
    let recorder = Recorder::default();
    let scheduler = Arc::new(TokioScheduler::try_current().unwrap());
    let write_behind = WriteBehind::start(Arc::clone(&store), recorder.clone(), scheduler, &config(100));
    assert!(!write_behind.is_armed());

    store.add(item("Ore"));
    assert!(write_behind.is_armed());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(recorder.statements().is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(recorder.statements().len(), 1);
    assert_eq!(store.change_counts().total(), 0);
    // Re-armed whatever the outcome.
    assert!(write_behind.is_armed());
}

#[tokio::test(start_paused = true)]
async fn every_touched_entity_is_eventually_flushed() {
    let store = Arc::new(EntityStore::new());
    let owner = CharacterId::new();
    let stacks: Vec<InventoryItem> = (0..4).map(|i| stack(owner, ItemId::new(), i)).collect();
    store.set::<InventoryItem>().load(stacks);

    let recorder = Recorder::default();
    let scheduler = Arc::new(TokioScheduler::try_current().unwrap());
    let _write_behind = WriteBehind::start(Arc::clone(&store), recorder.clone(), scheduler, &config(3));

    for handle in store.get_group::<InventoryItem>("Character", owner) {
        handle.write().amount += 100;
    }
    tokio::time::sleep(Duration::from_secs(11)).await;

    let updated: usize = recorder
        .statements()
        .iter()
        .filter(|s| s.operation == Operation::Update)
        .map(Statement::row_count)
        .sum();
    assert_eq!(updated, 4);
    assert_eq!(store.change_counts().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_scheduled_runs_are_counted_and_retried() {
    let store = Arc::new(EntityStore::new());
    let recorder = Recorder::default();
    recorder.refuse_connections(true);
    let scheduler = Arc::new(TokioScheduler::try_current().unwrap());
    let write_behind = WriteBehind::start(Arc::clone(&store), recorder.clone(), scheduler, &config(100));

    store.add(item("Ore"));
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(write_behind.failed_scheduled_runs(), 1);
    assert!(write_behind.is_armed());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(write_behind.failed_scheduled_runs(), 2);
    assert_eq!(store.change_counts().added, 1);

    // A stalled run counts as a failure too.
    recorder.refuse_connections(false);
    recorder.stall_at(Some(0));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(write_behind.failed_scheduled_runs(), 3);

    recorder.stall_at(None);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(write_behind.failed_scheduled_runs(), 0);
    assert_eq!(store.change_counts().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn forced_flush_cancels_pending_run() {
    let store = Arc::new(EntityStore::new());
    let recorder = Recorder::default();
    let scheduler = Arc::new(TokioScheduler::try_current().unwrap());
    let write_behind = WriteBehind::start(Arc::clone(&store), recorder.clone(), scheduler, &config(100));

    store.add(item("Ore"));
    let report = write_behind.flush().await.unwrap();
    assert_eq!(report.rows_persisted, 1);
    assert_eq!(recorder.statements().len(), 1);

    // The originally scheduled run finds nothing to write.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(recorder.statements().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_and_stops_arming() {
    let store = Arc::new(EntityStore::new());
    let recorder = Recorder::default();
    let scheduler = Arc::new(TokioScheduler::try_current().unwrap());
    let write_behind = WriteBehind::start(Arc::clone(&store), recorder.clone(), scheduler, &config(100));

    store.add(item("Ore"));
    let report = write_behind.shutdown().await.unwrap();
    assert_eq!(report.rows_persisted, 1);

    store.add(item("Logs"));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(recorder.statements().len(), 1);
    assert_eq!(store.change_counts().added, 1);
}

#[tokio::test(start_paused = true)]
async fn plan_does_not_write() {
    let store = Arc::new(EntityStore::new());
    let recorder = Recorder::default();
    let scheduler = Arc::new(TokioScheduler::try_current().unwrap());
    let write_behind = WriteBehind::start(Arc::clone(&store), recorder.clone(), scheduler, &config(100));

    store.add(item("Ore"));
    let plan = write_behind.plan().await;
    assert_eq!(plan.len(), 1);
    assert!(recorder.statements().is_empty());
    assert_eq!(store.change_counts().added, 1);
}
