//! Error types for pool and index operations

use std::io;

use thiserror::Error;

/// Main error type for connection pool and key index operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// Per-destination connection limit reached
    #[error("connections of server {destination} exceed limit: {limit}")]
    CapacityExceeded { destination: String, limit: usize },

    /// Network-level connect failure
    #[error("connect to {destination} failed: {source}")]
    ConnectFailed {
        destination: String,
        #[source]
        source: io::Error,
    },

    /// Handle released to (or removed from) an owner it does not belong to
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Allocator exhausted
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Key already present within its TTL window
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// Entry or destination not present
    #[error("not found: {0}")]
    NotFound(String),

    /// Destination address cannot be used as a pool key
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// Configuration rejected
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Scheduler refused or lost a registration
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl PoolError {
    /// Outcomes that are part of normal control flow rather than faults.
    ///
    /// `AlreadyExists` is the dedup signal and `NotFound` is the expected
    /// result of a sweep racing an explicit delete.
    pub fn is_expected(&self) -> bool {
        matches!(self, PoolError::AlreadyExists(_) | PoolError::NotFound(_))
    }

    /// Errors a caller may reasonably retry later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoolError::CapacityExceeded { .. }
                | PoolError::ConnectFailed { .. }
                | PoolError::OutOfMemory(_)
        )
    }

    /// OS error kind for connect failures
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            PoolError::ConnectFailed { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// Result type alias for pool and index operations
pub type Result<T> = std::result::Result<T, PoolError>;
