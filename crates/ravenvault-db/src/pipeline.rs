//! The save pipeline: turns the store's pending changes into ordered SQL
//! batches and writes them.
//!
//! A run pools every set's Added, Touched and Removed entries, sorts each
//! pool by stamp, and cuts it into batches of at most `max_batch_size`
//! rows. All insert batches run first, then updates, then deletes. Each
//! batch is one statement. A batch that affects zero rows stops the run;
//! batches already written stay acknowledged and the rest stay dirty for
//! the next run.

use std::collections::HashMap;

use ravenvault_core::{EntityStore, PendingRow};
use ravenvault_types::{Operation, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DbError;
use crate::executor::{SqlConnection, SqlConnector};
use crate::query::{self, Statement};

/// Default maximum rows per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// One row of a batch and the revision to acknowledge.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Row values as read.
    pub row: Row,
    /// Revision read with the row.
    pub revision: u64,
}

/// Rows written by one statement.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position in the run's queue.
    pub index: usize,
    /// Operation shared by every row.
    pub operation: Operation,
    /// Rows in stamp order.
    pub entries: Vec<BatchEntry>,
}

impl Batch {
    /// The statement writing this batch.
    pub fn statement(&self) -> Statement {
        query::build(self.operation, self.entries.iter().map(|e| &e.row))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Acknowledgements grouped by table.
    fn acknowledgements(&self) -> HashMap<&'static str, Vec<(Uuid, u64)>> {
        let mut acks: HashMap<&'static str, Vec<(Uuid, u64)>> = HashMap::new();
        for entry in &self.entries {
            acks.entry(entry.row.table)
                .or_default()
                .push((entry.row.key, entry.revision));
        }
        acks
    }
}

/// A batch that affected zero rows and stopped the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StalledBatch {
    /// Position in the run's queue.
    pub index: usize,
    /// Operation of the batch.
    pub operation: Operation,
    /// Rows in the batch.
    pub rows: usize,
    /// Tables the batch touched.
    pub tables: Vec<&'static str>,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Batches queued.
    pub batches_planned: usize,
    /// Batches written and acknowledged.
    pub batches_executed: usize,
    /// Rows written and acknowledged.
    pub rows_persisted: usize,
    /// The batch that stopped the run, if any.
    pub stalled: Option<StalledBatch>,
}

impl FlushReport {
    /// Whether every planned batch was written.
    pub const fn is_complete(&self) -> bool {
        self.stalled.is_none() && self.batches_executed == self.batches_planned
    }
}

/// Plans and executes flush runs.
#[derive(Debug, Clone, Copy)]
pub struct SavePipeline {
    max_batch_size: usize,
}

impl Default for SavePipeline {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_SIZE)
    }
}

impl SavePipeline {
    /// Create a pipeline. A zero batch size is treated as one.
    pub const fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: if max_batch_size == 0 { 1 } else { max_batch_size },
        }
    }

    /// Maximum rows per batch.
    pub const fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Read every pending change and order it into batches: all inserts,
    /// then all updates, then all deletes, each in stamp order.
    pub fn plan(&self, store: &EntityStore) -> Vec<Batch> {
        let mut inserts: Vec<PendingRow> = Vec::new();
        let mut updates: Vec<PendingRow> = Vec::new();
        let mut deletes: Vec<PendingRow> = Vec::new();
        for set in store.tracked_sets() {
            for pending in set.pending() {
                match pending.operation {
                    Operation::Insert => inserts.push(pending),
                    Operation::Update => updates.push(pending),
                    Operation::Delete => deletes.push(pending),
                }
            }
        }

        let mut batches = Vec::new();
        for (operation, mut pool) in [
            (Operation::Insert, inserts),
            (Operation::Update, updates),
            (Operation::Delete, deletes),
        ] {
            pool.sort_by_key(|p| p.stamp);
            let mut entries = pool.into_iter().map(|p| BatchEntry {
                row: p.row,
                revision: p.revision,
            });
            loop {
                let chunk: Vec<BatchEntry> = entries.by_ref().take(self.max_batch_size).collect();
                if chunk.is_empty() {
                    break;
                }
                batches.push(Batch {
                    index: batches.len(),
                    operation,
                    entries: chunk,
                });
            }
        }
        batches
    }

    /// Plan and write one run through `connector`.
    ///
    /// Each batch is acknowledged as soon as it is written, so a later
    /// failure never un-persists earlier batches.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection cannot be opened or a
    /// statement fails. Unwritten batches stay dirty.
    pub async fn run<C: SqlConnector>(
        &self,
        store: &EntityStore,
        connector: &C,
    ) -> Result<FlushReport, DbError> {
        let batches = self.plan(store);
        let mut report = FlushReport {
            batches_planned: batches.len(),
            ..FlushReport::default()
        };
        if batches.is_empty() {
            return Ok(report);
        }

        let mut conn = connector.connect().await?;
        for batch in &batches {
            let statement = batch.statement();
            let affected = conn.execute(&statement).await?;
            if affected == 0 {
                let stalled = StalledBatch {
                    index: batch.index,
                    operation: batch.operation,
                    rows: batch.len(),
                    tables: statement.targets.iter().map(|t| t.table).collect(),
                };
                tracing::warn!(
                    batch = stalled.index,
                    operation = %stalled.operation,
                    rows = stalled.rows,
                    tables = ?stalled.tables,
                    "batch affected zero rows; remaining batches deferred"
                );
                report.stalled = Some(stalled);
                break;
            }

            for (table, acks) in batch.acknowledgements() {
                store.acknowledge(table, batch.operation, &acks);
            }
            report.batches_executed = report.batches_executed.saturating_add(1);
            report.rows_persisted = report.rows_persisted.saturating_add(batch.len());
            tracing::debug!(
                batch = batch.index,
                operation = %batch.operation,
                rows = batch.len(),
                affected,
                "batch written"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ravenvault_types::{Item, ItemCategory, ItemId, ItemType};

    use super::*;

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
            craftable: None,
            generic_prefab: None,
        }
    }

    #[test]
    fn plan_orders_insert_update_delete() {
        let store = EntityStore::new();
        let loaded = item("Ore");
        let gone = item("Logs");
        store.set::<Item>().load(vec![loaded.clone(), gone.clone()]);

        store.remove::<Item>(gone.id);
        store.get::<Item>(loaded.id);
        store.add(item("Ingot"));

        let plan = SavePipeline::default().plan(&store);
        let operations: Vec<Operation> = plan.iter().map(|b| b.operation).collect();
        assert_eq!(
            operations,
            vec![Operation::Insert, Operation::Update, Operation::Delete]
        );
    }

    #[test]
    fn plan_splits_pools_into_batches() {
        let store = EntityStore::new();
        for i in 0..7 {
            store.add(item(&format!("Item {i}")));
        }
        let plan = SavePipeline::new(3).plan(&store);
        let sizes: Vec<usize> = plan.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert!(plan.iter().enumerate().all(|(i, b)| b.index == i));
    }

    #[test]
    fn plan_keeps_stamp_order_within_batch() {
        let store = EntityStore::new();
        let names = ["First", "Second", "Third"];
        for name in names {
            store.add(item(name));
        }
        let plan = SavePipeline::default().plan(&store);
        let batch = plan.first().unwrap();
        let planned: Vec<String> = batch
            .entries
            .iter()
            .map(|e| match e.row.values.get(1) {
                Some(ravenvault_types::SqlValue::Text(t)) => t.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(planned, names);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        assert_eq!(SavePipeline::new(0).max_batch_size(), 1);
    }
}
