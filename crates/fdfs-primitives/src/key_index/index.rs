//! Sharded expiring key index

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use fdfs_core::{
    DEFAULT_STRING_REGIONS, EvictionReason, KeyIndexStats, NoopMetrics, ObjectPool, PoolError,
    PoolMetrics, PoolOperation, RejectReason, Result, ScheduleHandle, Scheduler, StringAllocator,
    simple_hash,
};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use super::chain::{self, EntryNode, Link};
use super::config::KeyIndexConfig;

const SWEEP_TASK: &str = "key-index-sweep";

/// Chains of the buckets owned by one lock
struct Stripe {
    chains: Vec<Link>,
}

impl Drop for Stripe {
    fn drop(&mut self) {
        for chain in &mut self.chains {
            chain::clear(chain);
        }
    }
}

/// Position of an entry in the expiry list
struct ExpiryTicket {
    id: u64,
    hash: u32,
    expires: Duration,
}

#[derive(Default)]
struct Counters {
    inserts: AtomicU64,
    duplicates: AtomicU64,
    expired: AtomicU64,
    removed: AtomicU64,
}

/// A concurrent set of keys that forget themselves after `entry_ttl`.
///
/// Bucket `b` lives in stripe `b % lock_stripe_count`, so many buckets share
/// one lock. Expiry tickets sit in a single FIFO behind their own lock.
/// The list lock is only taken after the stripe lock is released, and a
/// stripe lock is never taken while the list lock is held.
///
/// Entries are only removed by [`sweep`](Self::sweep) or
/// [`remove`](Self::remove); an expired entry that has not been swept yet
/// still counts as present.
pub struct ExpiringKeyIndex<M: PoolMetrics = NoopMetrics> {
    config: KeyIndexConfig,
    stripes: Vec<Mutex<Stripe>>,
    expiry: Mutex<VecDeque<ExpiryTicket>>,
    entries: ObjectPool<EntryNode>,
    strings: StringAllocator,
    epoch: Instant,
    next_id: AtomicU64,
    live: AtomicUsize,
    counters: Counters,
    metrics: Arc<M>,
    sweeper: Mutex<Option<ScheduleHandle>>,
}

fn reserve_failed(what: &str, count: usize, e: impl std::fmt::Display) -> PoolError {
    error!(
        target: "fdfs",
        table = what,
        count,
        error = %e,
        "key index allocation failed"
    );
    PoolError::OutOfMemory(format!("{} of {}: {}", what, count, e))
}

impl ExpiringKeyIndex<NoopMetrics> {
    /// Create an index without metrics
    pub fn new(config: KeyIndexConfig) -> Result<Self> {
        Self::with_metrics(config, Arc::new(NoopMetrics))
    }

    /// Create an index whose sweep is driven by `scheduler`
    pub fn with_scheduler(config: KeyIndexConfig, scheduler: &dyn Scheduler) -> Result<Arc<Self>> {
        let index = Arc::new(Self::new(config)?);
        index.start_sweeper(scheduler)?;
        Ok(index)
    }
}

impl<M: PoolMetrics> ExpiringKeyIndex<M> {
    /// Create an index reporting to `metrics`
    pub fn with_metrics(config: KeyIndexConfig, metrics: Arc<M>) -> Result<Self> {
        config.validate()?;

        let stripe_count = config.lock_stripe_count;
        let bucket_count = config.bucket_count;

        let mut stripes = Vec::new();
        stripes
            .try_reserve_exact(stripe_count)
            .map_err(|e| reserve_failed("lock stripes", stripe_count, e))?;

        for i in 0..stripe_count {
            let len = (bucket_count + stripe_count - 1 - i) / stripe_count;
            let mut chains = Vec::new();
            chains
                .try_reserve_exact(len)
                .map_err(|e| reserve_failed("bucket chains", len, e))?;
            chains.resize_with(len, || None);
            stripes.push(Mutex::new(Stripe { chains }));
        }

        let strings = StringAllocator::new("key index", &DEFAULT_STRING_REGIONS)?;
        let entries = ObjectPool::new("key index entry", config.entries_per_chunk, config.max_entries);

        debug!(
            target: "fdfs",
            bucket_count,
            lock_stripe_count = stripe_count,
            entry_ttl_ms = config.entry_ttl.as_millis() as u64,
            "key index created"
        );

        Ok(Self {
            config,
            stripes,
            expiry: Mutex::new(VecDeque::new()),
            entries,
            strings,
            epoch: Instant::now(),
            next_id: AtomicU64::new(1),
            live: AtomicUsize::new(0),
            counters: Counters::default(),
            metrics,
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &KeyIndexConfig {
        &self.config
    }

    /// Stripe and chain position of `hash`
    fn locate(&self, hash: u32) -> (usize, usize) {
        let bucket = hash as usize % self.config.bucket_count;
        let stripes = self.stripes.len();
        (bucket % stripes, bucket / stripes)
    }

    /// Insert `key`, expiring `entry_ttl` from now.
    ///
    /// Returns [`PoolError::AlreadyExists`] if the key is present, including
    /// when it has expired but has not been swept yet.
    pub fn try_insert(&self, key: &str) -> Result<()> {
        let started = Instant::now();
        let hash = simple_hash(key.as_bytes());
        let (stripe, pos) = self.locate(hash);

        let (id, expires, live) = {
            let mut stripe = self.stripes[stripe].lock();
            let Some(slot) = chain::vacant_slot(&mut stripe.chains[pos], hash, key) else {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_rejection(RejectReason::Duplicate);
                trace!(target: "fdfs", key, "key already exists");
                return Err(PoolError::AlreadyExists(key.to_string()));
            };

            let mut node = match self.entries.alloc(EntryNode::default()) {
                Ok(node) => node,
                Err(e) => {
                    self.metrics.record_rejection(RejectReason::OutOfMemory);
                    return Err(e);
                }
            };
            node.key = match self.strings.alloc(key) {
                Ok(copy) => copy,
                Err(e) => {
                    self.entries.free(node);
                    self.metrics.record_rejection(RejectReason::OutOfMemory);
                    return Err(e);
                }
            };

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let expires = self.epoch.elapsed() + self.config.entry_ttl;
            node.hash = hash;
            node.id = id;
            node.expires = expires;
            node.next = slot.take();
            *slot = Some(node);
            // Counted before the stripe unlocks so a sweep never sees it first
            let live = self.live.fetch_add(1, Ordering::Relaxed) + 1;
            (id, expires, live)
        };

        self.expiry
            .lock()
            .push_back(ExpiryTicket { id, hash, expires });

        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_insert();
        self.metrics.record_size(live);
        self.metrics
            .record_latency(PoolOperation::Insert, started.elapsed());
        Ok(())
    }

    /// Check whether `key` is linked
    pub fn contains(&self, key: &str) -> bool {
        let hash = simple_hash(key.as_bytes());
        let (stripe, pos) = self.locate(hash);
        let stripe = self.stripes[stripe].lock();
        chain::find(&stripe.chains[pos], hash, key).is_some()
    }

    /// Delete `key` before it expires
    ///
    /// Its ticket stays in the expiry list and is skipped by the sweep.
    pub fn remove(&self, key: &str) -> Result<()> {
        let started = Instant::now();
        let hash = simple_hash(key.as_bytes());
        let (stripe, pos) = self.locate(hash);

        let node = {
            let mut stripe = self.stripes[stripe].lock();
            chain::unlink(&mut stripe.chains[pos], hash, |node| node.key.as_str() == key)
        };
        let Some(node) = node else {
            return Err(PoolError::NotFound(key.to_string()));
        };

        self.recycle(node);
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.counters.removed.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_eviction(EvictionReason::Removed, 1);
        self.metrics
            .record_latency(PoolOperation::Remove, started.elapsed());
        Ok(())
    }

    /// Unlink the entry a ticket points at
    fn remove_ticket(&self, ticket: &ExpiryTicket) -> Result<Box<EntryNode>> {
        let (stripe, pos) = self.locate(ticket.hash);
        let mut stripe = self.stripes[stripe].lock();
        chain::unlink(&mut stripe.chains[pos], ticket.hash, |node| node.id == ticket.id)
            .ok_or_else(|| PoolError::NotFound(format!("entry {}", ticket.id)))
    }

    fn recycle(&self, mut node: Box<EntryNode>) {
        self.strings.free(mem::take(&mut node.key));
        self.entries.free(node);
    }

    /// Purge every entry whose expiry has passed, returning how many were
    /// removed
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Sweep as if the clock read `now`
    pub fn sweep_at(&self, now: Instant) -> usize {
        let started = Instant::now();
        let now = now.saturating_duration_since(self.epoch);

        let due: Vec<ExpiryTicket> = {
            let mut list = self.expiry.lock();
            match list.front() {
                Some(ticket) if ticket.expires <= now => {}
                _ => return 0,
            }
            let count = list.iter().take_while(|t| t.expires <= now).count();
            list.drain(..count).collect()
        };

        let mut batch = Vec::with_capacity(due.len());
        let mut stale = 0;
        for ticket in &due {
            match self.remove_ticket(ticket) {
                Ok(mut node) => {
                    self.strings.free(mem::take(&mut node.key));
                    batch.push(node);
                }
                Err(_) => stale += 1,
            }
        }

        let expired = self.entries.batch_free(batch);
        let live = self.live.fetch_sub(expired, Ordering::Relaxed) - expired;
        self.counters
            .expired
            .fetch_add(expired as u64, Ordering::Relaxed);

        debug!(
            target: "fdfs",
            expired,
            stale,
            live,
            "swept expired keys"
        );
        self.metrics.record_eviction(EvictionReason::Expired, expired);
        self.metrics.record_size(live);
        self.metrics
            .record_latency(PoolOperation::Sweep, started.elapsed());
        expired
    }

    /// Register the periodic sweep with `scheduler`
    ///
    /// The task holds only a weak reference, so it stops doing work once the
    /// index is dropped. Starting again replaces the previous registration.
    pub fn start_sweeper(self: &Arc<Self>, scheduler: &dyn Scheduler) -> Result<()> {
        let index = Arc::downgrade(self);
        let handle = scheduler.schedule(
            SWEEP_TASK,
            self.config.sweep_interval,
            Arc::new(move || {
                if let Some(index) = index.upgrade() {
                    index.sweep();
                }
            }),
        )?;

        let previous = self.sweeper.lock().replace(handle);
        if let Some(previous) = previous {
            previous.cancel();
        }
        Ok(())
    }

    /// Cancel the periodic sweep, returning whether one was running
    pub fn stop_sweeper(&self) -> bool {
        let handle = self.sweeper.lock().take();
        match handle {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of linked entries
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> KeyIndexStats {
        KeyIndexStats {
            live: self.len(),
            pending_tickets: self.expiry.lock().len(),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            removed: self.counters.removed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdfs_core::ManualScheduler;
    use std::collections::HashSet;
    use std::thread;

    const TTL: Duration = Duration::from_secs(3);

    fn small_index() -> ExpiringKeyIndex {
        ExpiringKeyIndex::new(KeyIndexConfig::with_buckets(97, 7).entry_ttl(TTL)).unwrap()
    }

    #[test]
    fn test_insert_twice() {
        let index = small_index();
        assert!(index.try_insert("file/123").is_ok());
        let err = index.try_insert("file/123").unwrap_err();
        assert!(matches!(err, PoolError::AlreadyExists(ref key) if key == "file/123"));
        assert!(err.is_expected());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_reinsert_after_sweep() {
        let index = small_index();
        index.try_insert("file/123").unwrap();

        // Not yet due
        assert_eq!(index.sweep_at(Instant::now() + Duration::from_secs(1)), 0);
        assert!(index.try_insert("file/123").is_err());

        // Due but unswept still counts as present
        assert!(index.contains("file/123"));

        assert_eq!(index.sweep_at(Instant::now() + TTL + Duration::from_secs(1)), 1);
        assert!(!index.contains("file/123"));
        assert!(index.try_insert("file/123").is_ok());
    }

    #[test]
    fn test_empty_sweep_is_noop() {
        let index = small_index();
        assert_eq!(index.sweep(), 0);

        index.try_insert("a").unwrap();
        assert_eq!(index.sweep(), 0);
        assert_eq!(index.len(), 1);
        assert_eq!(index.stats().pending_tickets, 1);
    }

    #[test]
    fn test_sweep_in_expiry_order() {
        let index = small_index();
        index.try_insert("first").unwrap();
        thread::sleep(Duration::from_millis(20));
        let cutoff = Instant::now() + TTL;
        thread::sleep(Duration::from_millis(20));
        index.try_insert("second").unwrap();

        assert_eq!(index.sweep_at(cutoff), 1);
        assert!(!index.contains("first"));
        assert!(index.contains("second"));
    }

    #[test]
    fn test_remove() {
        let index = small_index();
        index.try_insert("k").unwrap();

        index.remove("k").unwrap();
        assert!(matches!(index.remove("k"), Err(PoolError::NotFound(_))));
        assert!(index.is_empty());

        // The stale ticket is skipped
        assert_eq!(index.stats().pending_tickets, 1);
        assert_eq!(index.sweep_at(Instant::now() + TTL * 2), 0);
        assert_eq!(index.stats().pending_tickets, 0);
        assert_eq!(index.stats().removed, 1);
    }

    #[test]
    fn test_reinsert_after_remove_keeps_new_entry() {
        let index = small_index();
        index.try_insert("k").unwrap();
        index.remove("k").unwrap();
        index.try_insert("k").unwrap();

        // Only the live ticket resolves to an entry
        assert_eq!(index.sweep_at(Instant::now() + TTL * 2), 1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_chains_stay_sorted() {
        let index = ExpiringKeyIndex::new(KeyIndexConfig::with_buckets(3, 2)).unwrap();
        for i in 0..200 {
            index.try_insert(&format!("group1/M00/{i:04}")).unwrap();
        }

        let mut total = 0;
        for stripe in &index.stripes {
            let stripe = stripe.lock();
            for head in &stripe.chains {
                let hashes: Vec<u32> = chain::iter(head).map(|n| n.hash).collect();
                assert!(hashes.windows(2).all(|w| w[0] <= w[1]));
                total += hashes.len();
            }
        }
        assert_eq!(total, 200);
    }

    #[test]
    fn test_stripe_layout_covers_every_bucket() {
        let index = ExpiringKeyIndex::new(KeyIndexConfig::with_buckets(10, 4)).unwrap();
        let lens: Vec<usize> = index.stripes.iter().map(|s| s.lock().chains.len()).collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);

        for bucket in 0..10u32 {
            let (stripe, pos) = index.locate(bucket);
            assert_eq!(stripe, bucket as usize % 4);
            assert!(pos < lens[stripe]);
        }
    }

    #[test]
    fn test_out_of_memory_rolls_back() {
        let index = ExpiringKeyIndex::new(
            KeyIndexConfig::with_buckets(31, 3)
                .entries_per_chunk(2)
                .max_entries(2),
        )
        .unwrap();

        index.try_insert("a").unwrap();
        index.try_insert("b").unwrap();
        assert!(matches!(index.try_insert("c"), Err(PoolError::OutOfMemory(_))));
        assert!(!index.contains("c"));
        assert_eq!(index.len(), 2);
        assert_eq!(index.stats().pending_tickets, 2);

        // Expired entries return to the pool and can be reused
        assert_eq!(index.sweep_at(Instant::now() + Duration::from_secs(10)), 2);
        assert!(index.try_insert("c").is_ok());
    }

    #[test]
    fn test_long_keys() {
        let index = small_index();
        let long = "x".repeat(300);
        index.try_insert(&long).unwrap();
        assert!(index.contains(&long));
        assert!(index.try_insert(&long).is_err());
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        let index = Arc::new(small_index());
        let workers: Vec<_> = (0..8)
            .map(|t| {
                let index = index.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        index.try_insert(&format!("t{t}/k{i}")).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(index.len(), 2000);
        assert_eq!(index.stats().pending_tickets, 2000);
    }

    #[test]
    fn test_concurrent_same_key_single_winner() {
        let index = Arc::new(small_index());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let index = index.clone();
                thread::spawn(move || index.try_insert("contended").is_ok())
            })
            .collect();
        let winners = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(index.stats().duplicates, 7);
    }

    #[test]
    fn test_insert_releases_stripe_before_list_lock() {
        let index = Arc::new(small_index());
        let list = index.expiry.lock();

        let inserter = {
            let index = index.clone();
            thread::spawn(move || index.try_insert("k").is_ok())
        };

        // The entry becomes visible through its stripe while the insert
        // waits on the list lock
        let deadline = Instant::now() + Duration::from_secs(5);
        while !index.contains("k") {
            assert!(Instant::now() < deadline, "stripe still locked");
            thread::yield_now();
        }
        assert!(list.is_empty());
        drop(list);

        assert!(inserter.join().unwrap());
        assert_eq!(index.stats().pending_tickets, 1);
    }

    #[test]
    fn test_concurrent_insert_and_sweep() {
        let index = Arc::new(small_index());
        let sweeper = {
            let index = index.clone();
            thread::spawn(move || {
                let far = Instant::now() + Duration::from_secs(3600);
                let mut swept = 0;
                for _ in 0..50 {
                    swept += index.sweep_at(far);
                    thread::yield_now();
                }
                swept
            })
        };

        let mut keys = HashSet::new();
        for i in 0..500 {
            let key = format!("k{i}");
            index.try_insert(&key).unwrap();
            keys.insert(key);
        }
        let swept = sweeper.join().unwrap();

        assert_eq!(index.len() + swept, keys.len());
        let far = Instant::now() + Duration::from_secs(3600);
        index.sweep_at(far);
        assert!(index.is_empty());
    }

    #[test]
    fn test_scheduler_drives_sweep() {
        let scheduler = ManualScheduler::new();
        let config = KeyIndexConfig::with_buckets(97, 7)
            .entry_ttl(Duration::from_millis(30))
            .sweep_interval(Duration::from_millis(10));
        let index = ExpiringKeyIndex::with_scheduler(config, &scheduler).unwrap();
        assert_eq!(scheduler.interval_of(SWEEP_TASK), Some(Duration::from_millis(10)));

        index.try_insert("k").unwrap();
        scheduler.run_all();
        assert!(index.contains("k"));

        thread::sleep(Duration::from_millis(60));
        scheduler.run_all();
        assert!(!index.contains("k"));

        assert!(index.stop_sweeper());
        assert!(scheduler.is_empty());
        assert!(!index.stop_sweeper());
    }

    #[test]
    fn test_dropping_index_cancels_sweep() {
        let scheduler = ManualScheduler::new();
        let index = ExpiringKeyIndex::with_scheduler(KeyIndexConfig::with_buckets(7, 1), &scheduler)
            .unwrap();
        assert_eq!(scheduler.len(), 1);
        drop(index);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_stats() {
        let index = small_index();
        index.try_insert("a").unwrap();
        index.try_insert("b").unwrap();
        let _ = index.try_insert("a");
        index.sweep_at(Instant::now() + TTL * 2);

        let stats = index.stats();
        assert_eq!(stats.inserts, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.expired, 2);
        assert_eq!(stats.live, 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["expired"], 2);
    }
}
