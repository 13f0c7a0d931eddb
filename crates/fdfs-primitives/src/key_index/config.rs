//! Configuration for the expiring key index

use std::time::Duration;

use fdfs_core::{PoolError, Result};

/// Configuration for an [`ExpiringKeyIndex`](super::ExpiringKeyIndex)
#[derive(Debug, Clone)]
pub struct KeyIndexConfig {
    /// Number of hash chains
    pub bucket_count: usize,
    /// Number of locks guarding the chains
    pub lock_stripe_count: usize,
    /// Lifetime of an entry
    pub entry_ttl: Duration,
    /// How often the sweep runs when driven by a scheduler
    pub sweep_interval: Duration,
    /// Entries created per slab growth step
    pub entries_per_chunk: usize,
    /// Maximum entries ever allocated (0 = unlimited)
    pub max_entries: usize,
}

impl Default for KeyIndexConfig {
    fn default() -> Self {
        Self {
            bucket_count: 1_403_641,
            lock_stripe_count: 163,
            entry_ttl: Duration::from_secs(3),
            sweep_interval: Duration::from_secs(1),
            entries_per_chunk: 16 * 1024,
            max_entries: 0,
        }
    }
}

impl KeyIndexConfig {
    /// Create config with a small table, for tests and tools
    pub fn with_buckets(bucket_count: usize, lock_stripe_count: usize) -> Self {
        Self {
            bucket_count,
            lock_stripe_count,
            entries_per_chunk: 64,
            ..Default::default()
        }
    }

    /// Set entry lifetime
    pub fn entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set slab chunk size
    pub fn entries_per_chunk(mut self, entries: usize) -> Self {
        self.entries_per_chunk = entries;
        self
    }

    /// Set the entry limit
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket_count == 0 {
            return Err(PoolError::InvalidConfig(
                "bucket_count must be positive".to_string(),
            ));
        }
        if self.lock_stripe_count == 0 {
            return Err(PoolError::InvalidConfig(
                "lock_stripe_count must be positive".to_string(),
            ));
        }
        if self.entry_ttl.is_zero() {
            return Err(PoolError::InvalidConfig(
                "entry_ttl must be positive".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "sweep_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
