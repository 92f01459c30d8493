//! Periodic backups of the live store.

use std::sync::Arc;
use std::time::Duration;

use ravenvault_backup::BackupProvider;
use ravenvault_core::EntityStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Back up `store` every `period` until the task is aborted. The file I/O
/// runs on the blocking pool; failures are logged and the next period
/// tries again.
pub fn spawn_periodic_backups(
    store: Arc<EntityStore>,
    provider: Arc<BackupProvider>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; boot already archived state.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (store, provider) = (Arc::clone(&store), Arc::clone(&provider));
            match tokio::task::spawn_blocking(move || provider.backup_store(&store)).await {
                Ok(Ok(info)) => tracing::debug!(path = %info.path.display(), "periodic backup written"),
                Ok(Err(e)) => tracing::warn!(error = %e, "periodic backup failed"),
                Err(e) => tracing::warn!(error = %e, "periodic backup task failed"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn backups_are_written_each_period() {
        let root = tempfile::tempdir().unwrap();
        let provider = Arc::new(BackupProvider::new(root.path()));
        let store = Arc::new(EntityStore::with_game_kinds());
        let task = spawn_periodic_backups(
            Arc::clone(&store),
            Arc::clone(&provider),
            Duration::from_secs(300),
        );

        // Nothing before the first period elapses.
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(provider.list_backups().unwrap().is_empty());

        let mut written = false;
        for _ in 0..10_000 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if !provider.list_backups().unwrap().is_empty() {
                written = true;
                break;
            }
        }
        task.abort();
        assert!(written);
    }
}
