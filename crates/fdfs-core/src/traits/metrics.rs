//! Metrics trait for pool and index observability

use std::time::Duration;

/// Operation for latency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolOperation {
    Acquire,
    Release,
    Insert,
    Remove,
    Sweep,
}

impl PoolOperation {
    /// Get operation as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolOperation::Acquire => "acquire",
            PoolOperation::Release => "release",
            PoolOperation::Insert => "insert",
            PoolOperation::Remove => "remove",
            PoolOperation::Sweep => "sweep",
        }
    }
}

/// Why a connection or entry went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Connection sat on the free list longer than the idle limit
    IdleTimeout,
    /// Connection released with `force`
    Forced,
    /// Entry purged by the sweep
    Expired,
    /// Entry deleted explicitly
    Removed,
}

impl EvictionReason {
    /// Get reason as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::IdleTimeout => "idle_timeout",
            EvictionReason::Forced => "forced",
            EvictionReason::Expired => "expired",
            EvictionReason::Removed => "removed",
        }
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Per-destination connection limit reached
    CapacityExceeded,
    /// Connect attempt failed
    ConnectFailed,
    /// Key already in the index
    Duplicate,
    /// Allocator exhausted
    OutOfMemory,
}

impl RejectReason {
    /// Get reason as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::CapacityExceeded => "capacity_exceeded",
            RejectReason::ConnectFailed => "connect_failed",
            RejectReason::Duplicate => "duplicate",
            RejectReason::OutOfMemory => "out_of_memory",
        }
    }
}

/// Trait for pool and index metrics
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait PoolMetrics: Send + Sync + 'static {
    /// A new connection was established
    fn record_connect(&self, destination: &str);

    /// An idle connection was handed out again
    fn record_reuse(&self, destination: &str);

    /// A request was rejected
    fn record_rejection(&self, reason: RejectReason);

    /// A connection or entry was destroyed
    fn record_eviction(&self, reason: EvictionReason, count: usize);

    /// A key was inserted into the index
    fn record_insert(&self);

    /// Record operation latency
    fn record_latency(&self, operation: PoolOperation, duration: Duration);

    /// Record live entry count
    fn record_size(&self, live: usize);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl PoolMetrics for NoopMetrics {
    #[inline]
    fn record_connect(&self, _destination: &str) {}

    #[inline]
    fn record_reuse(&self, _destination: &str) {}

    #[inline]
    fn record_rejection(&self, _reason: RejectReason) {}

    #[inline]
    fn record_eviction(&self, _reason: EvictionReason, _count: usize) {}

    #[inline]
    fn record_insert(&self) {}

    #[inline]
    fn record_latency(&self, _operation: PoolOperation, _duration: Duration) {}

    #[inline]
    fn record_size(&self, _live: usize) {}
}

/// Metrics adapter using the `metrics` crate
///
/// # Example
/// ```ignore
/// use fdfs_core::MetricsCrateAdapter;
///
/// let metrics = MetricsCrateAdapter::new("fdfs_storage");
/// // Emits: fdfs_storage_connections_total, fdfs_storage_evictions_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl PoolMetrics for MetricsCrateAdapter {
    fn record_connect(&self, _destination: &str) {
        metrics::counter!(self.metric_name("connections_total")).increment(1);
    }

    fn record_reuse(&self, _destination: &str) {
        metrics::counter!(self.metric_name("connection_reuses_total")).increment(1);
    }

    fn record_rejection(&self, reason: RejectReason) {
        metrics::counter!(
            self.metric_name("rejections_total"),
            "reason" => reason.as_str()
        )
        .increment(1);
    }

    fn record_eviction(&self, reason: EvictionReason, count: usize) {
        metrics::counter!(
            self.metric_name("evictions_total"),
            "reason" => reason.as_str()
        )
        .increment(count as u64);
    }

    fn record_insert(&self) {
        metrics::counter!(self.metric_name("inserts_total")).increment(1);
    }

    fn record_latency(&self, operation: PoolOperation, duration: Duration) {
        metrics::histogram!(
            self.metric_name("operation_duration_seconds"),
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    fn record_size(&self, live: usize) {
        metrics::gauge!(self.metric_name("entries")).set(live as f64);
    }
}
