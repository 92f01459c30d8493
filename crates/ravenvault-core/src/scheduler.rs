//! Delayed task scheduling for the write-behind flush loop.
//!
//! [`Scheduler::schedule`] arms a task to run once after a delay and returns
//! a handle; [`Scheduler::cancel`] prevents a task that has not started yet
//! from running. A task that already started always runs to completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;

/// A boxed task run by a scheduler.
pub type ScheduledTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Cancellation signal shared between a handle and its pending task.
#[derive(Debug, Default)]
struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Handle to one scheduled task.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    id: u64,
    signal: Arc<CancelSignal>,
}

impl ScheduleHandle {
    /// Identifier unique within the issuing scheduler.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Prevent the task from starting. No effect once it has started.
    pub fn cancel(&self) {
        self.signal.cancelled.store(true, Ordering::Release);
        // Stores a permit if the task is not waiting yet.
        self.signal.notify.notify_one();
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.signal.cancelled.load(Ordering::Acquire)
    }
}

/// Runs tasks after a delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> ScheduleHandle;

    /// Prevent a scheduled task from starting.
    fn cancel(&self, handle: &ScheduleHandle) {
        handle.cancel();
    }
}

/// [`Scheduler`] backed by a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    runtime: Handle,
    next_id: AtomicU64,
}

impl TokioScheduler {
    /// Schedule on the given runtime.
    pub const fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(0),
        }
    }

    /// Schedule on the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn try_current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> ScheduleHandle {
        let handle = ScheduleHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            signal: Arc::new(CancelSignal::default()),
        };
        let signal = Arc::clone(&handle.signal);
        self.runtime.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    if !signal.cancelled.load(Ordering::Acquire) {
                        task.await;
                    }
                }
                () = signal.notify.notified() => {}
            }
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_task(counter: &Arc<AtomicUsize>) -> ScheduledTask {
        let counter = Arc::clone(counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn task_runs_after_delay() {
        let scheduler = TokioScheduler::try_current();
        assert!(scheduler.is_ok());
        let Ok(scheduler) = scheduler else { return };
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::from_secs(10), counting_task(&counter));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_runs() {
        let Ok(scheduler) = TokioScheduler::try_current() else { return };
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.schedule(Duration::from_secs(10), counting_task(&counter));
        scheduler.cancel(&handle);
        assert!(handle.is_cancelled());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_does_not_interrupt_running_task() {
        let Ok(scheduler) = TokioScheduler::try_current() else { return };
        let counter = Arc::new(AtomicUsize::new(0));
        let task_counter = Arc::clone(&counter);

        let handle = scheduler.schedule(
            Duration::from_secs(1),
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                task_counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handles_have_distinct_ids() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build();
        assert!(runtime.is_ok());
        let Ok(runtime) = runtime else { return };
        let scheduler = TokioScheduler::new(runtime.handle().clone());
        let a = scheduler.schedule(Duration::from_secs(60), Box::pin(async {}));
        let b = scheduler.schedule(Duration::from_secs(60), Box::pin(async {}));
        assert_ne!(a.id(), b.id());
    }
}
