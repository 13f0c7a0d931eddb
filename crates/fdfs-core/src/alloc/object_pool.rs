//! Typed object pool with chunked growth and batch free

use std::fmt;

use parking_lot::Mutex;
use tracing::error;

use crate::{PoolError, Result};

struct PoolState<T> {
    /// Recycled objects, most recently freed last
    free: Vec<Box<T>>,
    /// Objects ever created by this pool (in use + free)
    total: usize,
}

/// A pool of boxed objects that are recycled instead of returned to the heap.
///
/// When the free list runs dry the pool creates a whole chunk of objects at
/// once. A non-zero `limit` caps the number of objects the pool will ever
/// create; allocation beyond it fails with [`PoolError::OutOfMemory`].
///
/// Freed objects keep their old contents until they are handed out again, so
/// callers should move out anything expensive before freeing.
pub struct ObjectPool<T> {
    name: &'static str,
    chunk_size: usize,
    limit: usize,
    state: Mutex<PoolState<T>>,
}

impl<T: Default> ObjectPool<T> {
    /// Create a pool
    ///
    /// # Arguments
    /// * `name` - Label used in logs and errors
    /// * `chunk_size` - Objects created per growth step
    /// * `limit` - Maximum objects ever created (0 = unlimited)
    pub fn new(name: &'static str, chunk_size: usize, limit: usize) -> Self {
        Self {
            name,
            chunk_size: chunk_size.max(1),
            limit,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                total: 0,
            }),
        }
    }

    /// Take an object from the pool and initialise it with `value`
    pub fn alloc(&self, value: T) -> Result<Box<T>> {
        let mut state = self.state.lock();
        if state.free.is_empty() {
            self.grow(&mut state)?;
        }

        match state.free.pop() {
            Some(mut obj) => {
                *obj = value;
                Ok(obj)
            }
            None => Err(PoolError::OutOfMemory(format!("{} pool is empty", self.name))),
        }
    }

    fn grow(&self, state: &mut PoolState<T>) -> Result<()> {
        let room = if self.limit == 0 {
            self.chunk_size
        } else {
            self.limit.saturating_sub(state.total).min(self.chunk_size)
        };

        if room == 0 {
            error!(
                target: "fdfs",
                pool = self.name,
                limit = self.limit,
                "object pool exhausted"
            );
            return Err(PoolError::OutOfMemory(format!(
                "{} pool exhausted, limit: {}",
                self.name, self.limit
            )));
        }

        if let Err(e) = state.free.try_reserve(room) {
            error!(
                target: "fdfs",
                pool = self.name,
                objects = room,
                error = %e,
                "object pool chunk allocation failed"
            );
            return Err(PoolError::OutOfMemory(format!(
                "{} pool chunk of {} objects: {}",
                self.name, room, e
            )));
        }

        state.free.extend((0..room).map(|_| Box::<T>::default()));
        state.total += room;
        Ok(())
    }
}

impl<T> ObjectPool<T> {
    /// Return one object to the pool
    pub fn free(&self, obj: Box<T>) {
        self.state.lock().free.push(obj);
    }

    /// Return many objects under a single lock acquisition
    ///
    /// Returns the number of objects freed.
    pub fn batch_free<I>(&self, objs: I) -> usize
    where
        I: IntoIterator<Item = Box<T>>,
    {
        let mut state = self.state.lock();
        let before = state.free.len();
        state.free.extend(objs);
        state.free.len() - before
    }

    /// Objects created so far
    pub fn total_count(&self) -> usize {
        self.state.lock().total
    }

    /// Objects waiting on the free list
    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Objects currently handed out
    pub fn in_use(&self) -> usize {
        let state = self.state.lock();
        state.total - state.free.len()
    }

    /// Label of this pool
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObjectPool")
            .field("name", &self.name)
            .field("chunk_size", &self.chunk_size)
            .field("limit", &self.limit)
            .field("total", &state.total)
            .field("free", &state.free.len())
            .finish()
    }
}
