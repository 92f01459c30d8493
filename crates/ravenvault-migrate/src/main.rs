//! `ravenvault-migrate`: copy the restore point into the configured database.
//!
//! Usage: `ravenvault-migrate [config path]` (default
//! `ravenvault-config.yaml`). The restore point is read from
//! `<backup.data_root>/restorepoints/`, archived as a backup, and migrated
//! in the mode `migration.mode` names. With `persistence.dry_run` set the
//! statements are logged instead of executed. Exits non-zero if any kind
//! failed.

use std::path::PathBuf;

use anyhow::{Context, bail};
use ravenvault_backup::BackupProvider;
use ravenvault_core::config::{CONFIG_FILE_NAME, VaultConfig};
use ravenvault_core::logging;
use ravenvault_db::{DryRunConnector, PostgresConfig, PostgresPool};
use ravenvault_migrate::{MigrationError, MigrationReport, Migrator};
use ravenvault_types::game_kinds;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), PathBuf::from);
    let config = VaultConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    logging::init_tracing(&config.logging);
    info!(
        config = %config_path.display(),
        mode = ?config.migration.mode,
        dry_run = config.persistence.dry_run,
        "ravenvault-migrate starting"
    );

    let provider = BackupProvider::from_config(&config.backup);
    let snapshot = provider
        .get_restore_point(&game_kinds())
        .context("failed to read the restore point")?
        .ok_or_else(|| MigrationError::NoRestorePoint {
            path: provider.restore_point_dir(),
        })?;

    let report = if config.persistence.dry_run {
        Migrator::new(DryRunConnector, config.migration.clone())
            .run(&snapshot)
            .await?
    } else {
        let pool = PostgresPool::connect(&PostgresConfig::from_infrastructure(&config.infrastructure))
            .await
            .context("failed to connect to PostgreSQL")?;
        pool.run_migrations().await?;
        let result = Migrator::new(pool.connector(), config.migration.clone())
            .run(&snapshot)
            .await;
        pool.close().await;
        result?
    };

    summarize(&report)
}

fn summarize(report: &MigrationReport) -> anyhow::Result<()> {
    info!(
        migrated = ?report.migrated,
        skipped = ?report.skipped,
        rows = report.rows,
        "migrated kinds"
    );
    if report.success() {
        return Ok(());
    }
    let cause = report
        .error
        .as_ref()
        .map_or_else(String::new, ToString::to_string);
    bail!("{} kind(s) failed: {:?}; first error: {cause}", report.failed.len(), report.failed)
}
