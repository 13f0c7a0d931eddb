//! Keyed TCP connection pool

mod config;
mod connect;
mod key;
mod manager;
mod pool;

pub use config::ConnectionPoolConfig;
pub use connect::{CloseOutcome, connect_server, disconnect_server};
pub use key::DestinationKey;
pub use pool::{ConnectionPool, PooledConnection};
