//! Per-destination connection bookkeeping

use std::net::TcpStream;
use std::time::{Duration, Instant};

use fdfs_core::{Destination, DestinationStats};
use parking_lot::Mutex;

/// A connection waiting on a free list
#[derive(Debug)]
pub(crate) struct IdleConnection {
    pub(crate) stream: TcpStream,
    pub(crate) id: u64,
    pub(crate) released_at: Instant,
}

impl IdleConnection {
    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.released_at)
    }
}

#[derive(Debug)]
struct ManagerState {
    /// LIFO stack; the most recently released connection is on top
    free: Vec<IdleConnection>,
    /// Connections issued plus idle
    total_count: usize,
}

/// Outcome of taking a connection from a manager
pub(crate) enum Checkout {
    /// An idle connection young enough to reuse
    Reused(IdleConnection),
    /// A slot was reserved; the caller must connect or roll back
    Reserved,
    /// Limit reached with nothing idle
    Full { total_count: usize },
}

/// Connections of one destination
///
/// Invariant: `free_count <= total_count <= limit` whenever a limit is set.
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    destination: Destination,
    state: Mutex<ManagerState>,
}

impl ConnectionManager {
    pub(crate) fn new(destination: Destination) -> Self {
        Self {
            destination,
            state: Mutex::new(ManagerState {
                free: Vec::new(),
                total_count: 0,
            }),
        }
    }

    pub(crate) fn destination(&self) -> &Destination {
        &self.destination
    }

    pub(crate) fn total_count(&self) -> usize {
        self.state.lock().total_count
    }

    pub(crate) fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    pub(crate) fn stats(&self) -> DestinationStats {
        let state = self.state.lock();
        DestinationStats {
            destination: self.destination.to_string(),
            total_count: state.total_count,
            free_count: state.free.len(),
        }
    }

    /// Pop the freshest usable connection or reserve a slot for a new one.
    ///
    /// Connections idle longer than `max_idle_time` are dropped from the
    /// count and pushed onto `stale`; the caller closes them after the lock
    /// is released.
    pub(crate) fn checkout(
        &self,
        max_idle_time: Duration,
        max_count: usize,
        stale: &mut Vec<IdleConnection>,
    ) -> Checkout {
        let now = Instant::now();
        let mut state = self.state.lock();

        while let Some(idle) = state.free.pop() {
            if idle.idle_for(now) > max_idle_time {
                state.total_count -= 1;
                stale.push(idle);
                continue;
            }
            return Checkout::Reused(idle);
        }

        if max_count > 0 && state.total_count >= max_count {
            return Checkout::Full {
                total_count: state.total_count,
            };
        }

        state.total_count += 1;
        Checkout::Reserved
    }

    /// Give back a slot reserved by a failed connect
    pub(crate) fn rollback(&self) {
        let mut state = self.state.lock();
        state.total_count = state.total_count.saturating_sub(1);
    }

    /// Push a released connection on top of the free list
    pub(crate) fn give_back(&self, idle: IdleConnection) -> (usize, usize) {
        let mut state = self.state.lock();
        state.free.push(idle);
        (state.total_count, state.free.len())
    }

    /// Forget a connection that is being closed
    pub(crate) fn forget(&self) -> (usize, usize) {
        let mut state = self.state.lock();
        state.total_count = state.total_count.saturating_sub(1);
        (state.total_count, state.free.len())
    }

    /// Remove every idle connection, for shutdown
    pub(crate) fn drain_idle(&self) -> Vec<IdleConnection> {
        let mut state = self.state.lock();
        let drained = std::mem::take(&mut state.free);
        state.total_count -= drained.len();
        drained
    }
}
