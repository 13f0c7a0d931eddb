//! fdfs-core: Core traits and types shared by the fdfs-shared primitives
//!
//! This crate provides the error taxonomy, the scheduler and metrics seams,
//! the typed object pool and string allocator, and the hash function used
//! for bucket selection.

pub mod alloc;
mod error;
mod hash;
mod traits;
mod types;

pub use alloc::{ArenaString, DEFAULT_STRING_REGIONS, ObjectPool, StringAllocator, StringRegion};
pub use error::{PoolError, Result};
pub use hash::simple_hash;
pub use traits::*;
pub use types::*;
