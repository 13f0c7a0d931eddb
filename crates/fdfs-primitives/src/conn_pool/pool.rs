//! Connection pool keyed by destination

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use fdfs_core::{
    ConnectionPoolStats, Destination, EvictionReason, NoopMetrics, PoolError, PoolMetrics,
    PoolOperation, RejectReason, Result,
};
use parking_lot::RwLock;
use tracing::{debug, error, warn};

use super::config::ConnectionPoolConfig;
use super::connect::{connect_server, disconnect_server};
use super::key::DestinationKey;
use super::manager::{Checkout, ConnectionManager, IdleConnection};

/// Claim on one slot of a manager's `total_count`.
///
/// An armed lease gives its slot back when dropped, so a connection that is
/// never released cannot leak capacity.
#[derive(Debug)]
struct Lease {
    manager: Arc<ConnectionManager>,
    armed: bool,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.armed {
            let (total_count, free_count) = self.manager.forget();
            debug!(
                target: "fdfs",
                destination = %self.manager.destination(),
                total_count,
                free_count,
                "connection dropped without release, closed"
            );
        }
    }
}

/// A connection checked out of a [`ConnectionPool`]
///
/// Hand it back with [`ConnectionPool::release`]. Dropping it instead closes
/// the socket and frees its slot, like a forced release.
#[derive(Debug)]
pub struct PooledConnection {
    stream: TcpStream,
    id: u64,
    key: DestinationKey,
    lease: Lease,
}

impl PooledConnection {
    fn new(stream: TcpStream, id: u64, key: DestinationKey, manager: Arc<ConnectionManager>) -> Self {
        Self {
            stream,
            id,
            key,
            lease: Lease {
                manager,
                armed: true,
            },
        }
    }

    /// Pool-wide unique connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn destination(&self) -> &Destination {
        self.lease.manager.destination()
    }

    pub fn key(&self) -> &DestinationKey {
        &self.key
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

impl Read for PooledConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for PooledConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Pool of TCP connections to peer servers
///
/// One manager per destination holds that destination's idle
/// connections. The map lock only guards inserting new managers; each
/// manager has its own lock for its free list and counters.
pub struct ConnectionPool<M: PoolMetrics = NoopMetrics> {
    managers: RwLock<HashMap<DestinationKey, Arc<ConnectionManager>>>,
    config: ConnectionPoolConfig,
    metrics: Arc<M>,
    next_id: AtomicU64,
}

impl ConnectionPool<NoopMetrics> {
    /// Create a pool without metrics
    pub fn new(config: ConnectionPoolConfig) -> Result<Self> {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }
}

impl<M: PoolMetrics> ConnectionPool<M> {
    /// Create a pool reporting to `metrics`
    pub fn with_metrics(config: ConnectionPoolConfig, metrics: Arc<M>) -> Result<Self> {
        config.validate()?;

        let mut managers = HashMap::new();
        if let Err(e) = managers.try_reserve(config.initial_capacity) {
            error!(
                target: "fdfs",
                capacity = config.initial_capacity,
                error = %e,
                "connection pool map allocation failed"
            );
            return Err(PoolError::OutOfMemory(format!(
                "connection pool map of {} entries: {}",
                config.initial_capacity, e
            )));
        }

        Ok(Self {
            managers: RwLock::new(managers),
            config,
            metrics,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ConnectionPoolConfig {
        &self.config
    }

    /// Find or create the manager of `key`
    fn manager_for(&self, key: &DestinationKey, destination: &Destination) -> Arc<ConnectionManager> {
        if let Some(manager) = self.managers.read().get(key) {
            return manager.clone();
        }

        self.managers
            .write()
            .entry(*key)
            .or_insert_with(|| Arc::new(ConnectionManager::new(destination.clone())))
            .clone()
    }

    /// Get a connection to `destination`
    ///
    /// Reuses the most recently released idle connection when one is young
    /// enough, otherwise connects. Never waits for a slot: at the limit this
    /// fails with [`PoolError::CapacityExceeded`].
    pub fn acquire(&self, destination: &Destination) -> Result<PooledConnection> {
        let started = Instant::now();
        let key = DestinationKey::new(destination)?;
        let manager = self.manager_for(&key, destination);

        let mut stale = Vec::new();
        let checkout = manager.checkout(
            self.config.max_idle_time,
            self.config.max_count_per_entry,
            &mut stale,
        );
        if !stale.is_empty() {
            self.close_stale(destination, stale);
        }

        let conn = match checkout {
            Checkout::Reused(idle) => {
                debug!(
                    target: "fdfs",
                    destination = %destination,
                    connection = idle.id,
                    "reuse connection"
                );
                self.metrics.record_reuse(&key.to_string());
                PooledConnection::new(idle.stream, idle.id, key, manager)
            }
            Checkout::Full { total_count } => {
                warn!(
                    target: "fdfs",
                    destination = %destination,
                    total_count,
                    limit = self.config.max_count_per_entry,
                    "connections exceed limit"
                );
                self.metrics.record_rejection(RejectReason::CapacityExceeded);
                return Err(PoolError::CapacityExceeded {
                    destination: destination.to_string(),
                    limit: self.config.max_count_per_entry,
                });
            }
            Checkout::Reserved => match connect_server(destination, self.config.connect_timeout) {
                Ok(stream) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        target: "fdfs",
                        destination = %destination,
                        connection = id,
                        total_count = manager.total_count(),
                        "new connection"
                    );
                    self.metrics.record_connect(&key.to_string());
                    PooledConnection::new(stream, id, key, manager)
                }
                Err(e) => {
                    manager.rollback();
                    self.metrics.record_rejection(RejectReason::ConnectFailed);
                    return Err(e);
                }
            },
        };

        self.metrics
            .record_latency(PoolOperation::Acquire, started.elapsed());
        Ok(conn)
    }

    fn close_stale(&self, destination: &Destination, stale: Vec<IdleConnection>) {
        let count = stale.len();
        for idle in stale {
            debug!(
                target: "fdfs",
                destination = %destination,
                connection = idle.id,
                idle_ms = idle.released_at.elapsed().as_millis() as u64,
                max_idle_ms = self.config.max_idle_time.as_millis() as u64,
                "connection idle time exceeds max idle time"
            );
            disconnect_server(idle.stream).log_failure(destination);
        }
        self.metrics.record_eviction(EvictionReason::IdleTimeout, count);
    }

    /// Return a connection to the pool
    ///
    /// With `force` the socket is closed and its slot freed; use it when the
    /// connection is known to be broken. Otherwise the connection goes on top
    /// of its destination's free list.
    ///
    /// Fails with [`PoolError::NotFound`] if this pool has no entry for the
    /// connection's destination and [`PoolError::InvalidHandle`] if the entry
    /// is not the one the connection came from. In both cases the connection
    /// is closed and its slot is returned to its own pool.
    pub fn release(&self, conn: PooledConnection, force: bool) -> Result<()> {
        let started = Instant::now();

        let manager = self.managers.read().get(&conn.key).cloned();
        let Some(manager) = manager else {
            error!(
                target: "fdfs",
                destination = %conn.key,
                "pool entry of server does not exist"
            );
            return Err(PoolError::NotFound(format!(
                "pool entry of server {}",
                conn.key
            )));
        };

        if !Arc::ptr_eq(&manager, &conn.lease.manager) {
            error!(
                target: "fdfs",
                destination = %conn.key,
                connection = conn.id,
                "manager of server entry is invalid"
            );
            return Err(PoolError::InvalidHandle(format!(
                "connection {} does not belong to this pool's entry of {}",
                conn.id, conn.key
            )));
        }

        let PooledConnection {
            stream,
            id,
            key,
            mut lease,
        } = conn;
        lease.armed = false;

        if force {
            let (total_count, free_count) = manager.forget();
            debug!(
                target: "fdfs",
                destination = %key,
                connection = id,
                total_count,
                free_count,
                "release connection"
            );
            disconnect_server(stream).log_failure(&key);
            self.metrics.record_eviction(EvictionReason::Forced, 1);
        } else {
            let (total_count, free_count) = manager.give_back(IdleConnection {
                stream,
                id,
                released_at: Instant::now(),
            });
            debug!(
                target: "fdfs",
                destination = %key,
                connection = id,
                total_count,
                free_count,
                "free connection"
            );
        }

        self.metrics
            .record_latency(PoolOperation::Release, started.elapsed());
        Ok(())
    }

    fn snapshot(&self) -> Vec<Arc<ConnectionManager>> {
        self.managers.read().values().cloned().collect()
    }

    /// Idle connections across all destinations
    ///
    /// Walks the managers one at a time without holding the map lock, so the
    /// result may be stale under concurrent use.
    pub fn connection_count(&self) -> usize {
        self.snapshot().iter().map(|m| m.free_count()).sum()
    }

    /// Number of destinations seen so far
    pub fn destination_count(&self) -> usize {
        self.managers.read().len()
    }

    /// Per-destination counts, sorted by destination
    pub fn stats(&self) -> ConnectionPoolStats {
        let mut destinations: Vec<_> = self.snapshot().iter().map(|m| m.stats()).collect();
        destinations.sort_by(|a, b| a.destination.cmp(&b.destination));
        ConnectionPoolStats { destinations }
    }
}

impl<M: PoolMetrics> Drop for ConnectionPool<M> {
    fn drop(&mut self) {
        let mut closed = 0;
        for manager in self.managers.get_mut().values() {
            for idle in manager.drain_idle() {
                disconnect_server(idle.stream).log_failure(manager.destination());
                closed += 1;
            }
        }
        if closed > 0 {
            debug!(target: "fdfs", closed, "connection pool destroyed");
        }
    }
}
