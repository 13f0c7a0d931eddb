//! Allocators backing the key index
//!
//! - [`ObjectPool`]: typed pool of boxed objects, grown in chunks, with an
//!   optional hard limit and a batch-free path for sweeps
//! - [`StringAllocator`]: size-class regions recycling key string buffers

mod object_pool;
mod string_alloc;

pub use object_pool::ObjectPool;
pub use string_alloc::{ArenaString, StringAllocator, StringRegion, DEFAULT_STRING_REGIONS};
