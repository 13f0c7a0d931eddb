//! fdfs-primitives: Concurrent pooling primitives for tracker and storage daemons

#[cfg(feature = "conn-pool")]
pub mod conn_pool;

#[cfg(feature = "key-index")]
pub mod key_index;

#[cfg(feature = "conn-pool")]
pub use conn_pool::{
    CloseOutcome, ConnectionPool, ConnectionPoolConfig, DestinationKey, PooledConnection,
    connect_server, disconnect_server,
};

#[cfg(feature = "key-index")]
pub use key_index::{ExpiringKeyIndex, KeyIndexConfig};
