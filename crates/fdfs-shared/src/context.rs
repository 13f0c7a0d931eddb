//! Shared state of one daemon

use std::sync::Arc;

use fdfs_core::{
    ConnectionPoolStats, Destination, KeyIndexStats, NoopMetrics, PoolError, PoolMetrics, Result,
    Scheduler,
};
use fdfs_primitives::{
    ConnectionPool, ConnectionPoolConfig, ExpiringKeyIndex, KeyIndexConfig, PooledConnection,
};
use serde::Serialize;
use tracing::info;

/// Configuration for a [`ServiceContext`]
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub pool: ConnectionPoolConfig,
    pub index: KeyIndexConfig,
}

impl ServiceConfig {
    /// Set pool config
    pub fn pool(mut self, pool: ConnectionPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set index config
    pub fn index(mut self, index: KeyIndexConfig) -> Self {
        self.index = index;
        self
    }
}

/// Combined snapshot of a [`ServiceContext`]
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub pool: ConnectionPoolStats,
    pub index: KeyIndexStats,
}

/// Connection pool and file id index owned by one daemon
///
/// Cheap to clone; clones share the same pool and index. The index sweep
/// runs on the scheduler given at construction until [`shutdown`] is called
/// or the last clone is dropped.
///
/// [`shutdown`]: ServiceContext::shutdown
pub struct ServiceContext<M: PoolMetrics = NoopMetrics> {
    pool: Arc<ConnectionPool<M>>,
    index: Arc<ExpiringKeyIndex<M>>,
}

impl<M: PoolMetrics> Clone for ServiceContext<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            index: self.index.clone(),
        }
    }
}

impl ServiceContext<NoopMetrics> {
    pub fn new(config: ServiceConfig, scheduler: &dyn Scheduler) -> Result<Self> {
        Self::with_metrics(config, scheduler, Arc::new(NoopMetrics))
    }
}

impl<M: PoolMetrics> ServiceContext<M> {
    /// Create a context whose pool and index both report to `metrics`
    pub fn with_metrics(
        config: ServiceConfig,
        scheduler: &dyn Scheduler,
        metrics: Arc<M>,
    ) -> Result<Self> {
        let pool = Arc::new(ConnectionPool::with_metrics(config.pool, metrics.clone())?);
        let index = Arc::new(ExpiringKeyIndex::with_metrics(config.index, metrics)?);
        index.start_sweeper(scheduler)?;

        info!(
            target: "fdfs",
            max_count_per_entry = pool.config().max_count_per_entry,
            entry_ttl_ms = index.config().entry_ttl.as_millis() as u64,
            "service context ready"
        );

        Ok(Self { pool, index })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<M>> {
        &self.pool
    }

    pub fn index(&self) -> &Arc<ExpiringKeyIndex<M>> {
        &self.index
    }

    /// Borrow a connection to a peer
    pub fn connect(&self, destination: &Destination) -> Result<PooledConnection> {
        self.pool.acquire(destination)
    }

    /// Give a connection back; `broken` closes it instead of pooling it
    pub fn disconnect(&self, conn: PooledConnection, broken: bool) -> Result<()> {
        self.pool.release(conn, broken)
    }

    /// Record `file_id` as seen
    ///
    /// Returns `false` if it was already seen within the entry TTL.
    pub fn claim_file_id(&self, file_id: &str) -> Result<bool> {
        match self.index.try_insert(file_id) {
            Ok(()) => Ok(true),
            Err(PoolError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            pool: self.pool.stats(),
            index: self.index.stats(),
        }
    }

    /// Stop the periodic sweep
    pub fn shutdown(&self) {
        if self.index.stop_sweeper() {
            info!(target: "fdfs", "service context shut down");
        }
    }
}
