//! Core types

mod destination;
mod stats;

pub use destination::Destination;
pub use stats::{ConnectionPoolStats, DestinationStats, KeyIndexStats};
