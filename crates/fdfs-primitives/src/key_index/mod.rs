//! Expiring key index
//!
//! A hash table of short-lived keys used by daemons to drop requests they
//! have already seen, such as repeated file ids during sync.

mod chain;
mod config;
mod index;

pub use config::KeyIndexConfig;
pub use index::ExpiringKeyIndex;
