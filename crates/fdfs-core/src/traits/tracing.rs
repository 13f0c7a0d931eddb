use crate::{EvictionReason, PoolMetrics, PoolOperation, RejectReason};
use std::time::Duration;
use tracing::{debug, trace};

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl PoolMetrics for TracingMetrics {
    fn record_connect(&self, destination: &str) {
        debug!(
            target: "fdfs",
            event = "connect",
            destination = %destination,
            service = ?self.service_name,
            "New Connection"
        );
    }

    fn record_reuse(&self, destination: &str) {
        trace!(
            target: "fdfs",
            event = "reuse",
            destination = %destination,
            service = ?self.service_name,
            "Connection Reused"
        );
    }

    fn record_rejection(&self, reason: RejectReason) {
        debug!(
            target: "fdfs",
            event = "rejection",
            reason = reason.as_str(),
            service = ?self.service_name,
            "Request Rejected"
        );
    }

    fn record_eviction(&self, reason: EvictionReason, count: usize) {
        debug!(
            target: "fdfs",
            event = "eviction",
            reason = reason.as_str(),
            count = count,
            service = ?self.service_name,
            "Eviction"
        );
    }

    fn record_insert(&self) {
        trace!(
            target: "fdfs",
            event = "insert",
            service = ?self.service_name,
            "Key Inserted"
        );
    }

    fn record_latency(&self, operation: PoolOperation, duration: Duration) {
        trace!(
            target: "fdfs",
            event = "latency",
            operation = operation.as_str(),
            duration_us = duration.as_micros() as u64,
            service = ?self.service_name,
            "Operation Latency"
        );
    }

    fn record_size(&self, live: usize) {
        trace!(
            target: "fdfs",
            event = "size",
            live = live,
            service = ?self.service_name,
            "Index Size Update"
        );
    }
}
