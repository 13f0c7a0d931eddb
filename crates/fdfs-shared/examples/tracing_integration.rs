use fdfs_shared::prelude::*;
use fdfs_shared::TracingMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // 1. Initialize tracing subscriber
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    println!("Initialized tracing...");

    // 2. Index reporting through TracingMetrics
    let metrics = Arc::new(TracingMetrics::new().with_service_name("storage-sync"));
    let index = ExpiringKeyIndex::with_metrics(
        KeyIndexConfig::with_buckets(1021, 17).entry_ttl(Duration::from_secs(1)),
        metrics.clone(),
    )?;

    println!("\nInserting file ids...");
    index.try_insert("group1/M00/00/00/a.jpg")?;
    let _ = index.try_insert("group1/M00/00/00/a.jpg");

    println!("\nSweeping...");
    index.sweep_at(Instant::now() + Duration::from_secs(2));

    // 3. Pool reporting through the same sink
    println!("\nConnecting to a closed port...");
    let pool = ConnectionPool::with_metrics(
        ConnectionPoolConfig::default().connect_timeout(Duration::from_millis(200)),
        metrics,
    )?;
    let _ = pool.acquire(&Destination::new("127.0.0.1", 1));

    println!("\nCheck your console output for structured logs!");
    Ok(())
}
