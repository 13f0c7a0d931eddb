//! fdfs-shared: Shared pooling primitives for FastDFS tracker and storage daemons
//!
//! # Features
//!
//! - **Keyed connection pool** with LIFO reuse, idle eviction and per-peer limits
//! - **Expiring key index** for dropping repeated file ids
//! - **Pluggable scheduling** (tokio or manual) for the index sweep
//! - **Metrics integration**
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fdfs_shared::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let scheduler = TokioScheduler::current()?;
//!     let ctx = ServiceContext::new(ServiceConfig::default(), &scheduler)?;
//!
//!     let conn = ctx.connect(&"192.168.0.10:23000".parse()?)?;
//!     ctx.disconnect(conn, false)?;
//!
//!     if ctx.claim_file_id("group1/M00/00/00/abc.jpg")? {
//!         println!("first sighting");
//!     }
//!
//!     Ok(())
//! }
//! ```

mod context;
mod scheduler;

// Re-export core
pub use fdfs_core::*;

// Re-export primitives
pub use fdfs_primitives::{
    CloseOutcome, ConnectionPool, ConnectionPoolConfig, DestinationKey, ExpiringKeyIndex,
    KeyIndexConfig, PooledConnection, connect_server, disconnect_server,
};

pub use context::{ServiceConfig, ServiceContext, ServiceStats};
pub use scheduler::TokioScheduler;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ConnectionPool, ConnectionPoolConfig, Destination, ExpiringKeyIndex, KeyIndexConfig,
        ManualScheduler, PoolError, PooledConnection, Result, Scheduler, ServiceConfig,
        ServiceContext, TokioScheduler,
    };
}

#[cfg(test)]
mod tests;
