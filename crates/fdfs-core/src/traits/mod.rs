//! Seams between the primitives and their collaborators

mod metrics;
mod scheduler;
mod tracing;

pub use self::metrics::{EvictionReason, NoopMetrics, PoolMetrics, PoolOperation, RejectReason};
pub use scheduler::{ManualScheduler, ScheduleHandle, ScheduledTask, Scheduler};
pub use self::tracing::TracingMetrics;

#[cfg(feature = "metrics")]
pub use self::metrics::MetricsCrateAdapter;
