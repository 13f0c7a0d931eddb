//! Periodic task scheduling seam
//!
//! The primitives never own a timer thread. Whoever runs the daemon supplies
//! a [`Scheduler`] that invokes registered tasks at their interval and stops
//! invoking them once the returned [`ScheduleHandle`] is cancelled or dropped.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::{PoolError, Result};

/// Callback invoked by a scheduler on every tick
pub type ScheduledTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// External collaborator that runs tasks periodically
pub trait Scheduler: Send + Sync {
    /// Register `task` to run every `interval`
    fn schedule(
        &self,
        name: &'static str,
        interval: Duration,
        task: ScheduledTask,
    ) -> Result<ScheduleHandle>;
}

/// Registration returned by [`Scheduler::schedule`]
///
/// Cancels the registration when cancelled explicitly or dropped.
pub struct ScheduleHandle {
    name: &'static str,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduleHandle {
    /// Create a handle that runs `cancel` once
    pub fn new(name: &'static str, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Name the task was registered under
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("name", &self.name)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct Registration {
    id: u64,
    name: &'static str,
    interval: Duration,
    task: ScheduledTask,
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    entries: Vec<Registration>,
}

/// Scheduler driven by hand, for tests and single-threaded tools
///
/// Tasks run only when [`ManualScheduler::run_all`] is called.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every registered task once, returning how many ran
    pub fn run_all(&self) -> usize {
        // Tasks run outside the lock so they may (de)register freely
        let tasks: Vec<ScheduledTask> = self
            .state
            .lock()
            .entries
            .iter()
            .map(|entry| entry.task.clone())
            .collect();

        for task in &tasks {
            task();
        }
        tasks.len()
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Interval of the registration named `name`
    pub fn interval_of(&self, name: &str) -> Option<Duration> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.interval)
    }
}

impl Scheduler for ManualScheduler {
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

        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(Registration {
                id,
                name,
                interval,
                task,
            });
            id
        };

        let state: Weak<Mutex<ManualState>> = Arc::downgrade(&self.state);
        Ok(ScheduleHandle::new(name, move || {
            if let Some(state) = state.upgrade() {
                state.lock().entries.retain(|entry| entry.id != id);
            }
        }))
    }
}
