//! Size-class string allocator
//!
//! Key strings are short and numerous. Buffers are grouped into size classes
//! taken from a small list of regions; a freed buffer goes back to its class
//! and is reused by the next string that fits. Strings longer than the last
//! region are plain heap strings.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::error;

use crate::{PoolError, Result};

/// A contiguous range of string sizes split into classes of `step` bytes.
///
/// Covers lengths in `start + 1 ..= end`; the first region starts at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringRegion {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl StringRegion {
    pub const fn new(start: usize, end: usize, step: usize) -> Self {
        Self { start, end, step }
    }
}

/// Small keys share one 48-byte class, up to 128 bytes in 8-byte steps.
pub const DEFAULT_STRING_REGIONS: [StringRegion; 2] = [
    StringRegion::new(0, 48, 48),
    StringRegion::new(48, 128, 8),
];

struct SizeClass {
    size: usize,
    free: Mutex<Vec<String>>,
}

/// A string whose buffer belongs to a [`StringAllocator`] size class.
///
/// Hand it back with [`StringAllocator::free`] to recycle the buffer;
/// dropping it just releases the memory to the heap.
#[derive(Default)]
pub struct ArenaString {
    buf: String,
    class: Option<usize>,
}

impl ArenaString {
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Bytes reserved for this string
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

impl Deref for ArenaString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.buf
    }
}

impl PartialEq<str> for ArenaString {
    fn eq(&self, other: &str) -> bool {
        self.buf == other
    }
}

impl fmt::Debug for ArenaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.buf, f)
    }
}

impl fmt::Display for ArenaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

/// Allocator for variable-length key strings
pub struct StringAllocator {
    name: &'static str,
    classes: Vec<SizeClass>,
    in_use: AtomicUsize,
}

impl StringAllocator {
    /// Build an allocator from ascending, contiguous regions
    pub fn new(name: &'static str, regions: &[StringRegion]) -> Result<Self> {
        let mut classes = Vec::new();
        let mut expected_start = 0;

        for region in regions {
            if region.step == 0 || region.end <= region.start {
                return Err(PoolError::InvalidConfig(format!(
                    "{} region {}..{} with step {} is empty",
                    name, region.start, region.end, region.step
                )));
            }
            if region.start != expected_start {
                return Err(PoolError::InvalidConfig(format!(
                    "{} region starts at {}, expected {}",
                    name, region.start, expected_start
                )));
            }
            if (region.end - region.start) % region.step != 0 {
                return Err(PoolError::InvalidConfig(format!(
                    "{} region {}..{} is not a multiple of step {}",
                    name, region.start, region.end, region.step
                )));
            }

            let mut size = region.start + region.step;
            while size <= region.end {
                classes.push(SizeClass {
                    size,
                    free: Mutex::new(Vec::new()),
                });
                size += region.step;
            }
            expected_start = region.end;
        }

        Ok(Self {
            name,
            classes,
            in_use: AtomicUsize::new(0),
        })
    }

    /// Index of the smallest class that fits `len` bytes
    fn class_for(&self, len: usize) -> Option<usize> {
        match self.classes.binary_search_by(|class| class.size.cmp(&len)) {
            Ok(idx) => Some(idx),
            Err(idx) if idx < self.classes.len() => Some(idx),
            Err(_) => None,
        }
    }

    /// Copy `s` into a pooled buffer
    pub fn alloc(&self, s: &str) -> Result<ArenaString> {
        let class = self.class_for(s.len());
        let reused = class.and_then(|idx| self.classes[idx].free.lock().pop());

        let mut buf = match reused {
            Some(buf) => buf,
            None => {
                let size = class.map_or(s.len(), |idx| self.classes[idx].size);
                let mut buf = String::new();
                if let Err(e) = buf.try_reserve_exact(size) {
                    error!(
                        target: "fdfs",
                        allocator = self.name,
                        bytes = size,
                        error = %e,
                        "string allocation failed"
                    );
                    return Err(PoolError::OutOfMemory(format!(
                        "{} string of {} bytes: {}",
                        self.name, size, e
                    )));
                }
                buf
            }
        };

        buf.push_str(s);
        self.in_use.fetch_add(1, Ordering::Relaxed);
        Ok(ArenaString { buf, class })
    }

    /// Give a string's buffer back to its size class
    pub fn free(&self, s: ArenaString) {
        let ArenaString { mut buf, class } = s;
        if buf.capacity() == 0 && class.is_none() {
            // Never allocated here (default value)
            return;
        }
        self.in_use.fetch_sub(1, Ordering::Relaxed);

        if let Some(class) = class.and_then(|idx| self.classes.get(idx)) {
            if buf.capacity() >= class.size {
                buf.clear();
                class.free.lock().push(buf);
            }
        }
    }

    /// Strings handed out and not yet freed
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Buffers cached across all classes
    pub fn cached(&self) -> usize {
        self.classes.iter().map(|class| class.free.lock().len()).sum()
    }

    /// Class sizes in ascending order
    pub fn class_sizes(&self) -> Vec<usize> {
        self.classes.iter().map(|class| class.size).collect()
    }
}

impl fmt::Debug for StringAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringAllocator")
            .field("name", &self.name)
            .field("classes", &self.classes.len())
            .field("in_use", &self.in_use())
            .finish()
    }
}
