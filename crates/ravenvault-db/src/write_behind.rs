//! The write-behind flush loop.
//!
//! [`WriteBehind`] listens to the store. The first change after a quiet
//! period arms one flush `flush_interval` later. When the flush fires it
//! runs the save pipeline and re-arms, whatever the outcome. Runs are
//! serialized: a forced [`flush`](WriteBehind::flush) waits for a scheduled
//! run in progress and vice versa. Failures are logged and retried by the
//! next run; they never reach gameplay callers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use ravenvault_core::config::PersistenceConfig;
use ravenvault_core::{ChangeListener, EntityStore, ScheduleHandle, Scheduler};

use crate::error::DbError;
use crate::executor::SqlConnector;
use crate::pipeline::{Batch, FlushReport, SavePipeline};

/// Scheduled, serialized flushing of one store through one connector.
pub struct WriteBehind<C: SqlConnector + 'static> {
    store: Arc<EntityStore>,
    connector: C,
    pipeline: SavePipeline,
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    /// True while a run is scheduled or executing.
    armed: AtomicBool,
    /// Set by [`shutdown`](WriteBehind::shutdown); no further arming.
    stopped: AtomicBool,
    /// Scheduled runs in a row that failed or stalled.
    failed_runs: AtomicUsize,
    pending: Mutex<Option<ScheduleHandle>>,
    run_lock: tokio::sync::Mutex<()>,
    this: Weak<Self>,
}

impl<C: SqlConnector + 'static> WriteBehind<C> {
    /// Create the loop, register it as the store's change listener, and arm
    /// a first flush if the store already holds pending changes.
    pub fn start(
        store: Arc<EntityStore>,
        connector: C,
        scheduler: Arc<dyn Scheduler>,
        config: &PersistenceConfig,
    ) -> Arc<Self> {
        let write_behind = Arc::new_cyclic(|this| Self {
            store,
            connector,
            pipeline: SavePipeline::new(config.max_batch_size),
            scheduler,
            interval: config.flush_interval(),
            armed: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            failed_runs: AtomicUsize::new(0),
            pending: Mutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
            this: Weak::clone(this),
        });

        let listener: Weak<dyn ChangeListener> =
            Arc::downgrade(&write_behind) as Weak<dyn ChangeListener>;
        write_behind.store.set_change_listener(listener);

        tracing::info!(
            interval_ms = u64::try_from(write_behind.interval.as_millis()).unwrap_or(u64::MAX),
            max_batch_size = write_behind.pipeline.max_batch_size(),
            "write-behind flush loop started"
        );

        if write_behind.store.change_counts().total() > 0 {
            write_behind.arm();
        }
        write_behind
    }

    /// The store being flushed.
    pub const fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Whether a run is currently scheduled or executing.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Scheduled runs in a row that failed or stalled. Reset by the next
    /// complete scheduled run.
    pub fn failed_scheduled_runs(&self) -> usize {
        self.failed_runs.load(Ordering::Acquire)
    }

    /// The batch queue the next run would execute, without executing it.
    pub async fn plan(&self) -> Vec<Batch> {
        let _guard = self.run_lock.lock().await;
        self.pipeline.plan(&self.store)
    }

    /// Cancel any scheduled run and flush now.
    ///
    /// # Errors
    ///
    /// Returns the error of the run; unwritten changes stay dirty.
    pub async fn flush(&self) -> Result<FlushReport, DbError> {
        self.cancel_pending();
        let result = self.run().await;
        self.armed.store(false, Ordering::Release);
        self.arm();
        result
    }

    /// Stop scheduling, detach from the store, and run a final flush.
    ///
    /// # Errors
    ///
    /// Returns the error of the final run.
    pub async fn shutdown(&self) -> Result<FlushReport, DbError> {
        self.stopped.store(true, Ordering::Release);
        self.cancel_pending();
        self.store.clear_change_listener();
        let result = self.run().await;
        tracing::info!("write-behind flush loop stopped");
        result
    }

    /// Arm a run if none is armed.
    fn arm(&self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if self.armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(this) = self.this.upgrade() else {
            self.armed.store(false, Ordering::Release);
            return;
        };
        let handle = self
            .scheduler
            .schedule(self.interval, Box::pin(async move { this.scheduled_run().await }));
        let replaced = self.pending.lock().replace(handle);
        if let Some(replaced) = replaced {
            self.scheduler.cancel(&replaced);
        }
    }

    fn cancel_pending(&self) {
        let handle = self.pending.lock().take();
        if let Some(handle) = handle {
            self.scheduler.cancel(&handle);
        }
    }

    async fn scheduled_run(self: Arc<Self>) {
        // The handle that fired is spent.
        let spent = self.pending.lock().take();
        if let Some(handle) = spent {
            self.scheduler.cancel(&handle);
        }
        match self.run().await {
            Ok(report) if report.is_complete() => {
                self.failed_runs.store(0, Ordering::Release);
            }
            Ok(report) => {
                let failures = self.failed_runs.fetch_add(1, Ordering::AcqRel).saturating_add(1);
                tracing::warn!(
                    failures,
                    stalled_batch = report.stalled.as_ref().map(|s| s.index),
                    executed = report.batches_executed,
                    planned = report.batches_planned,
                    "scheduled flush stalled; retrying after the interval"
                );
            }
            Err(e) => {
                let failures = self.failed_runs.fetch_add(1, Ordering::AcqRel).saturating_add(1);
                tracing::warn!(
                    failures,
                    error = %e,
                    "scheduled flush failed; retrying after the interval"
                );
            }
        }
        self.armed.store(false, Ordering::Release);
        self.arm();
    }

    /// One serialized pipeline run, logged.
    async fn run(&self) -> Result<FlushReport, DbError> {
        let _guard = self.run_lock.lock().await;
        match self.pipeline.run(&self.store, &self.connector).await {
            Ok(report) => {
                if report.batches_planned > 0 {
                    tracing::info!(
                        planned = report.batches_planned,
                        executed = report.batches_executed,
                        rows = report.rows_persisted,
                        complete = report.is_complete(),
                        "flush finished"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "flush failed; changes stay dirty until the next run");
                Err(e)
            }
        }
    }
}

impl<C: SqlConnector + 'static> ChangeListener for WriteBehind<C> {
    fn on_change(&self) {
        self.arm();
    }
}

impl<C: SqlConnector + 'static> core::fmt::Debug for WriteBehind<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WriteBehind")
            .field("interval", &self.interval)
            .field("pipeline", &self.pipeline)
            .field("armed", &self.is_armed())
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .field("failed_runs", &self.failed_scheduled_runs())
            .finish_non_exhaustive()
    }
}
