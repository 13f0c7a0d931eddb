//! Pool and index statistics

use serde::Serialize;

/// Connection counts of one destination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DestinationStats {
    /// `ip:port` of the peer
    pub destination: String,
    /// Connections issued plus idle
    pub total_count: usize,
    /// Idle connections on the free list
    pub free_count: usize,
}

impl DestinationStats {
    /// Connections currently checked out
    pub fn in_use(&self) -> usize {
        self.total_count.saturating_sub(self.free_count)
    }
}

/// Snapshot of a connection pool
///
/// Taken without a global lock, so counts may be slightly stale under
/// concurrent acquire/release.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionPoolStats {
    pub destinations: Vec<DestinationStats>,
}

impl ConnectionPoolStats {
    /// Connections across all destinations
    pub fn total_count(&self) -> usize {
        self.destinations.iter().map(|d| d.total_count).sum()
    }

    /// Idle connections across all destinations
    pub fn free_count(&self) -> usize {
        self.destinations.iter().map(|d| d.free_count).sum()
    }

    /// Checked-out connections across all destinations
    pub fn in_use(&self) -> usize {
        self.destinations.iter().map(DestinationStats::in_use).sum()
    }

    /// Stats of one destination
    pub fn find(&self, destination: &str) -> Option<&DestinationStats> {
        self.destinations.iter().find(|d| d.destination == destination)
    }
}

/// Statistics of an expiring key index
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyIndexStats {
    /// Entries currently linked
    pub live: usize,
    /// Tickets waiting in the expiry list (includes stale ones)
    pub pending_tickets: usize,
    /// Successful inserts
    pub inserts: u64,
    /// Inserts rejected as duplicates
    pub duplicates: u64,
    /// Entries purged by the sweep
    pub expired: u64,
    /// Entries deleted explicitly
    pub removed: u64,
}

impl KeyIndexStats {
    /// Fraction of insert attempts that hit an existing key (0.0 to 1.0)
    pub fn duplicate_ratio(&self) -> f64 {
        let total = self.inserts + self.duplicates;
        if total == 0 {
            0.0
        } else {
            self.duplicates as f64 / total as f64
        }
    }

    /// Merge stats from another index
    pub fn merge(&mut self, other: &KeyIndexStats) {
        self.live += other.live;
        self.pending_tickets += other.pending_tickets;
        self.inserts += other.inserts;
        self.duplicates += other.duplicates;
        self.expired += other.expired;
        self.removed += other.removed;
    }
}
