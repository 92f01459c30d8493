//! Table-by-table migration of a restore point into a database.
//!
//! Each kind is copied in isolation: truncate the destination, then insert
//! in multi-row batches. When any statement for a kind fails, the table is
//! truncated again so it is left empty rather than half-populated, and the
//! migration moves on to the next kind.

use ravenvault_backup::Snapshot;
use ravenvault_core::config::{MigrationConfig, MigrationMode};
use ravenvault_db::{SqlConnection, SqlConnector, query};
use ravenvault_types::{Appearance, Entity, InventoryItem, Operation, Resources, Row, Skills, Statistics};

use crate::cleaning::{self, CleaningReport};
use crate::error::MigrationError;

/// Kinds inserted with the child batch size by the character migration.
pub const CHILD_KINDS: &[&str] = &[
    Skills::KIND,
    Resources::KIND,
    Statistics::KIND,
    Appearance::KIND,
    InventoryItem::KIND,
];

/// Outcome of a migration.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Kinds copied completely.
    pub migrated: Vec<&'static str>,
    /// Kinds whose copy failed; their tables are left empty.
    pub failed: Vec<&'static str>,
    /// Kinds skipped by configuration.
    pub skipped: Vec<&'static str>,
    /// Rows inserted across migrated kinds.
    pub rows: usize,
    /// The first error that failed a kind.
    pub error: Option<MigrationError>,
    /// What the cleaning rules changed, for the character migration.
    pub cleaning: Option<CleaningReport>,
}

impl MigrationReport {
    /// Whether no kind failed.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Copies snapshots into the database behind one connector.
#[derive(Debug)]
pub struct Migrator<C: SqlConnector> {
    connector: C,
    config: MigrationConfig,
}

impl<C: SqlConnector> Migrator<C> {
    /// Create a migrator.
    pub const fn new(connector: C, config: MigrationConfig) -> Self {
        Self { connector, config }
    }

    /// The migration settings.
    pub const fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Run the migration the configured mode names.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] only when nothing could be attempted: the
    /// connection failed to open or the snapshot could not be cleaned.
    /// Per-kind failures are reported in the [`MigrationReport`].
    pub async fn run(&self, snapshot: &Snapshot) -> Result<MigrationReport, MigrationError> {
        match self.config.mode {
            MigrationMode::Full => self.migrate(snapshot).await,
            MigrationMode::Characters => self.migrate_characters(snapshot).await,
        }
    }

    /// Copy every kind of `snapshot` except the skipped ones, in batches of
    /// `batch_size` rows.
    pub async fn migrate(&self, snapshot: &Snapshot) -> Result<MigrationReport, MigrationError> {
        let batch_size = self.config.batch_size;
        self.copy_tables(snapshot, |_| batch_size).await
    }

    /// Clean `snapshot`, then copy it. Character child kinds are inserted
    /// in batches of `child_batch_size` rows.
    pub async fn migrate_characters(
        &self,
        snapshot: &Snapshot,
    ) -> Result<MigrationReport, MigrationError> {
        let (cleaned, cleaning) = cleaning::clean_snapshot(snapshot)?;
        tracing::info!(
            duplicates_dropped = cleaning.duplicates_dropped,
            stacks_merged = cleaning.stacks_merged,
            equipped_split = cleaning.equipped_split,
            stacks_clamped = cleaning.stacks_clamped,
            listings_capped = cleaning.listings_capped,
            ghosts_skipped = cleaning.ghosts_skipped,
            children_dropped = cleaning.children_dropped,
            "snapshot cleaned"
        );

        let (batch_size, child_batch_size) = (self.config.batch_size, self.config.child_batch_size);
        let mut report = self
            .copy_tables(&cleaned, |table| {
                if CHILD_KINDS.contains(&table) {
                    child_batch_size
                } else {
                    batch_size
                }
            })
            .await?;
        report.cleaning = Some(cleaning);
        Ok(report)
    }

    async fn copy_tables(
        &self,
        snapshot: &Snapshot,
        batch_size: impl Fn(&str) -> usize + Send + Sync,
    ) -> Result<MigrationReport, MigrationError> {
        let mut conn = self.connector.connect().await?;
        let mut report = MigrationReport::default();

        for kind in snapshot.kinds() {
            let table = kind.name();
            if self
                .config
                .skip_kinds
                .iter()
                .any(|skip| skip == table || skip == kind.qualified_name())
            {
                tracing::info!(kind = table, "kind skipped");
                report.skipped.push(table);
                continue;
            }

            let result = match snapshot.rows(&kind) {
                Ok(rows) => copy_table(&mut conn, table, &rows, batch_size(table).max(1)).await,
                Err(e) => Err(MigrationError::from(e)),
            };
            match result {
                Ok(rows) => {
                    tracing::info!(kind = table, rows, "kind migrated");
                    report.migrated.push(table);
                    report.rows = report.rows.saturating_add(rows);
                }
                Err(e) => {
                    tracing::error!(kind = table, error = %e, "kind failed; table left empty");
                    if let Err(truncate_error) = conn.execute(&query::truncate_statement(table)).await
                    {
                        tracing::error!(kind = table, error = %truncate_error, "re-truncate failed");
                    }
                    report.failed.push(table);
                    if report.error.is_none() {
                        report.error = Some(e);
                    }
                }
            }
        }

        tracing::info!(
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            rows = report.rows,
            "migration finished"
        );
        Ok(report)
    }
}

/// Truncate `table`, then insert `rows` in batches.
async fn copy_table<T: SqlConnection>(
    conn: &mut T,
    table: &str,
    rows: &[Row],
    batch_size: usize,
) -> Result<usize, MigrationError> {
    conn.execute(&query::truncate_statement(table)).await?;
    let mut copied = 0_usize;
    for (index, chunk) in rows.chunks(batch_size).enumerate() {
        let statement = query::build(Operation::Insert, chunk);
        conn.execute(&statement).await?;
        copied = copied.saturating_add(chunk.len());
        tracing::debug!(kind = table, batch = index, rows = chunk.len(), "batch inserted");
    }
    Ok(copied)
}
