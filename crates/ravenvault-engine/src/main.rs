//! `RavenVault` engine binary.
//!
//! Hosts the persistence core of the game service: the in-memory entity
//! store, the write-behind flush into `PostgreSQL`, and the backup history.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `ravenvault-config.yaml` (or the path given
//!    as the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Register every entity kind in a fresh store
//! 4. Restore the store from the restore point, else the newest backup
//! 5. Connect to `PostgreSQL` and run schema migrations (skipped in dry-run
//!    mode, which logs statements instead)
//! 6. Start the write-behind flush loop and the periodic backups
//! 7. On Ctrl-C: stop backups, flush, and save a restore point

mod backups;
mod error;
mod recovery;

use std::path::PathBuf;
use std::sync::Arc;

use ravenvault_backup::BackupProvider;
use ravenvault_core::config::{CONFIG_FILE_NAME, VaultConfig};
use ravenvault_core::{EntityStore, TokioScheduler, logging};
use ravenvault_db::{DryRunConnector, PostgresConfig, PostgresPool, SqlConnector, WriteBehind};
use tracing::info;

use crate::error::EngineError;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration, recovery, the database connection,
/// or the shutdown sequence fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE_NAME), PathBuf::from);
    let config_found = config_path.exists();
    let config = VaultConfig::load_or_default(&config_path).map_err(EngineError::from)?;

    // 2. Initialize structured logging.
    logging::init_tracing(&config.logging);
    info!("ravenvault-engine starting");
    if !config_found {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        flush_interval_ms = config.persistence.flush_interval_ms,
        max_batch_size = config.persistence.max_batch_size,
        dry_run = config.persistence.dry_run,
        data_root = %config.backup.data_root.display(),
        retention = config.backup.retention,
        backup_interval_seconds = config.backup.interval_seconds,
        "Configuration loaded"
    );

    // 3. Create the store.
    let store = Arc::new(EntityStore::with_game_kinds());
    let provider = Arc::new(BackupProvider::from_config(&config.backup));

    // 4. Restore.
    let (source, records) = {
        let (store, provider) = (Arc::clone(&store), Arc::clone(&provider));
        tokio::task::spawn_blocking(move || recovery::restore(&store, &provider))
            .await
            .map_err(EngineError::from)?
            .map_err(EngineError::from)?
    };
    info!(source = ?source, records, "Store ready");

    // 5-7. Serve until Ctrl-C.
    if config.persistence.dry_run {
        info!("Dry-run mode: statements are logged, not executed");
        serve(store, provider, DryRunConnector, &config).await?;
    } else {
        let pool = PostgresPool::connect(&PostgresConfig::from_infrastructure(
            &config.infrastructure,
        ))
        .await
        .map_err(EngineError::from)?;
        pool.run_migrations().await.map_err(EngineError::from)?;
        let result = serve(store, provider, pool.connector(), &config).await;
        pool.close().await;
        result?;
    }

    info!("ravenvault-engine shutdown complete");
    Ok(())
}

/// Run the flush loop and periodic backups until Ctrl-C, then shut down.
async fn serve<C: SqlConnector + 'static>(
    store: Arc<EntityStore>,
    provider: Arc<BackupProvider>,
    connector: C,
    config: &VaultConfig,
) -> Result<(), EngineError> {
    let scheduler = TokioScheduler::try_current().map_err(|e| EngineError::Scheduler {
        message: e.to_string(),
    })?;
    let write_behind = WriteBehind::start(
        Arc::clone(&store),
        connector,
        Arc::new(scheduler),
        &config.persistence,
    );

    let backups = config.backup.interval().map(|period| {
        backups::spawn_periodic_backups(Arc::clone(&store), Arc::clone(&provider), period)
    });
    info!(periodic_backups = backups.is_some(), "Serving; press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
    }
    info!("Shutdown requested");

    if let Some(task) = backups {
        task.abort();
    }
    let flushed = write_behind.shutdown().await;
    match &flushed {
        Ok(report) if report.is_complete() => {
            info!(rows = report.rows_persisted, "Final flush finished");
        }
        Ok(report) => tracing::error!(
            rows = report.rows_persisted,
            stalled = ?report.stalled,
            "Final flush stalled; the restore point carries the unwritten changes to the next boot"
        ),
        Err(e) => tracing::error!(
            error = %e,
            "Final flush failed; the restore point carries the unwritten changes to the next boot"
        ),
    }

    tokio::task::spawn_blocking(move || recovery::save_restore_point(&store, &provider)).await??;
    flushed?;
    Ok(())
}
