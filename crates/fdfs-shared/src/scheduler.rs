//! Scheduler backed by a tokio runtime

use std::time::Duration;

use fdfs_core::{PoolError, Result, ScheduleHandle, ScheduledTask, Scheduler};
use tokio::runtime::Handle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, trace};

/// Runs each registered task on its own tokio interval
///
/// The first run happens one interval after registration. Slow runs delay
/// the following ticks instead of bursting to catch up.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| PoolError::Scheduler(e.to_string()))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(
        &self,
        name: &'static str,
        interval: Duration,
        task: ScheduledTask,
    ) -> Result<ScheduleHandle> {
        if interval.is_zero() {
            return Err(PoolError::Scheduler(format!(
                "task {} registered with zero interval",
                name
            )));
        }

        let join = self.handle.spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                trace!(target: "fdfs", task = name, "scheduled task tick");
                task();
            }
        });

        debug!(
            target: "fdfs",
            task = name,
            interval_ms = interval.as_millis() as u64,
            "scheduled task registered"
        );

        let abort = join.abort_handle();
        Ok(ScheduleHandle::new(name, move || {
            abort.abort();
            debug!(target: "fdfs", task = name, "scheduled task cancelled");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_until_cancelled() {
        let scheduler = TokioScheduler::current().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let handle = scheduler
            .schedule(
                "count",
                Duration::from_millis(20),
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(hits.load(Ordering::SeqCst) >= 2);

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let after_cancel = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_first_run_waits_one_interval() {
        let scheduler = TokioScheduler::current().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let _handle = scheduler
            .schedule(
                "slow",
                Duration::from_secs(60),
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let scheduler = TokioScheduler::current().unwrap();
        let err = scheduler
            .schedule("bad", Duration::ZERO, Arc::new(|| {}))
            .unwrap_err();
        assert!(matches!(err, PoolError::Scheduler(_)));
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(matches!(
            TokioScheduler::current(),
            Err(PoolError::Scheduler(_))
        ));
    }
}
