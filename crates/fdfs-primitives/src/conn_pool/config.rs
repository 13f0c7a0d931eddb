//! Configuration for the connection pool

use std::time::Duration;

use fdfs_core::{PoolError, Result};

/// Configuration for connection pooling
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    /// Timeout of a connect on cache miss
    pub connect_timeout: Duration,
    /// Maximum connections per destination (0 = unlimited)
    pub max_count_per_entry: usize,
    /// Idle connections older than this are closed instead of reused
    pub max_idle_time: Duration,
    /// Destination slots reserved up front
    pub initial_capacity: usize,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            max_count_per_entry: 0,
            max_idle_time: Duration::from_secs(3600),
            initial_capacity: 1024,
        }
    }
}

impl ConnectionPoolConfig {
    /// Create config with a per-destination limit
    pub fn with_max_per_entry(max_count_per_entry: usize) -> Self {
        Self {
            max_count_per_entry,
            ..Default::default()
        }
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set idle limit
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.max_idle_time = idle;
        self
    }

    /// Set per-destination limit
    pub fn max_count_per_entry(mut self, max: usize) -> Self {
        self.max_count_per_entry = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "connect_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
