//! Integration tests for ServiceContext

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::{EvictionReason, PoolMetrics, PoolOperation, RejectReason};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Accepts connections and echoes every byte back
    fn echo_server() -> Destination {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let dst = Destination::from(listener.local_addr().unwrap());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                thread::spawn(move || {
                    let mut buf = [0u8; 256];
                    loop {
                        match stream.read(&mut buf) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        dst
    }

    fn round_trip(conn: &mut PooledConnection, msg: &[u8]) -> Vec<u8> {
        conn.write_all(msg).unwrap();
        let mut buf = vec![0u8; msg.len()];
        conn.read_exact(&mut buf).unwrap();
        buf
    }

    fn manual_context(config: ServiceConfig) -> (ServiceContext, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let ctx = ServiceContext::new(config, &scheduler).unwrap();
        (ctx, scheduler)
    }

    fn small_index(ttl: Duration) -> KeyIndexConfig {
        KeyIndexConfig::with_buckets(1021, 17).entry_ttl(ttl)
    }

    #[test]
    fn test_second_acquire_over_limit() {
        let dst = echo_server();
        let (ctx, _scheduler) = manual_context(
            ServiceConfig::default().pool(ConnectionPoolConfig::with_max_per_entry(1)),
        );

        let conn = ctx.connect(&dst).unwrap();
        match ctx.connect(&dst) {
            Err(PoolError::CapacityExceeded { limit, .. }) => assert_eq!(limit, 1),
            Err(e) => panic!("Expected capacity error, got {e}"),
            Ok(_) => panic!("Expected capacity error"),
        }
        ctx.disconnect(conn, false).unwrap();
    }

    #[test]
    fn test_reused_connection_keeps_its_socket() {
        let dst = echo_server();
        let (ctx, _scheduler) = manual_context(ServiceConfig::default());

        let mut conn = ctx.connect(&dst).unwrap();
        assert_eq!(round_trip(&mut conn, b"ping"), b"ping");
        let local = conn.stream().local_addr().unwrap();
        ctx.disconnect(conn, false).unwrap();

        let mut again = ctx.connect(&dst).unwrap();
        assert_eq!(again.stream().local_addr().unwrap(), local);
        assert_eq!(round_trip(&mut again, b"pong"), b"pong");
        ctx.disconnect(again, false).unwrap();

        assert_eq!(ctx.pool().connection_count(), 1);
    }

    #[test]
    fn test_file_id_seen_within_ttl() {
        let (ctx, _scheduler) =
            manual_context(ServiceConfig::default().index(small_index(Duration::from_secs(3))));
        let t0 = Instant::now();

        assert!(ctx.claim_file_id("file/123").unwrap());

        // One second later the id is still known
        ctx.index().sweep_at(t0 + Duration::from_secs(1));
        assert!(!ctx.claim_file_id("file/123").unwrap());

        // Four seconds later the sweep has purged it
        ctx.index().sweep_at(t0 + Duration::from_secs(4));
        assert!(ctx.claim_file_id("file/123").unwrap());
    }

    #[test]
    fn test_manual_scheduler_sweeps() {
        let (ctx, scheduler) = manual_context(
            ServiceConfig::default().index(
                small_index(Duration::from_millis(20)).sweep_interval(Duration::from_millis(10)),
            ),
        );

        assert!(ctx.claim_file_id("a").unwrap());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(scheduler.run_all(), 1);
        assert!(ctx.index().is_empty());

        ctx.shutdown();
        assert!(scheduler.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_scheduler_sweeps() {
        let scheduler = TokioScheduler::current().unwrap();
        let config = ServiceConfig::default().index(
            small_index(Duration::from_millis(50)).sweep_interval(Duration::from_millis(20)),
        );
        let ctx = ServiceContext::new(config, &scheduler).unwrap();

        assert!(ctx.claim_file_id("group1/M00/00/00/a.jpg").unwrap());
        assert!(!ctx.claim_file_id("group1/M00/00/00/a.jpg").unwrap());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(ctx.index().is_empty());
        assert!(ctx.claim_file_id("group1/M00/00/00/a.jpg").unwrap());

        ctx.shutdown();
    }

    #[test]
    fn test_clones_share_state() {
        let (ctx, _scheduler) =
            manual_context(ServiceConfig::default().index(small_index(Duration::from_secs(3))));
        let other = ctx.clone();

        assert!(ctx.claim_file_id("shared").unwrap());
        assert!(!other.claim_file_id("shared").unwrap());
    }

    #[test]
    fn test_concurrent_claims() {
        let (ctx, _scheduler) =
            manual_context(ServiceConfig::default().index(small_index(Duration::from_secs(3))));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let ctx = ctx.clone();
                thread::spawn(move || {
                    (0..500)
                        .filter(|i| ctx.claim_file_id(&format!("file/{i}")).unwrap())
                        .count()
                })
            })
            .collect();
        let claimed: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

        // Every id is claimed exactly once across all threads
        assert_eq!(claimed, 500);
        assert_eq!(ctx.stats().index.duplicates, 1500);
    }

    #[test]
    fn test_stats_json() {
        let dst = echo_server();
        let (ctx, _scheduler) =
            manual_context(ServiceConfig::default().index(small_index(Duration::from_secs(3))));

        let conn = ctx.connect(&dst).unwrap();
        ctx.claim_file_id("x").unwrap();

        let json = serde_json::to_value(ctx.stats()).unwrap();
        assert_eq!(json["pool"]["destinations"][0]["total_count"], 1);
        assert_eq!(json["index"]["live"], 1);
        ctx.disconnect(conn, false).unwrap();
    }

    #[derive(Default)]
    struct CountingMetrics {
        connects: AtomicUsize,
        reuses: AtomicUsize,
        inserts: AtomicUsize,
        duplicates: AtomicUsize,
        expired: AtomicUsize,
    }

    impl PoolMetrics for CountingMetrics {
        fn record_connect(&self, _destination: &str) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }

        fn record_reuse(&self, _destination: &str) {
            self.reuses.fetch_add(1, Ordering::SeqCst);
        }

        fn record_rejection(&self, reason: RejectReason) {
            if reason == RejectReason::Duplicate {
                self.duplicates.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn record_eviction(&self, reason: EvictionReason, count: usize) {
            if reason == EvictionReason::Expired {
                self.expired.fetch_add(count, Ordering::SeqCst);
            }
        }

        fn record_insert(&self) {
            self.inserts.fetch_add(1, Ordering::SeqCst);
        }

        fn record_latency(&self, _operation: PoolOperation, _duration: Duration) {}

        fn record_size(&self, _live: usize) {}
    }

    #[test]
    fn test_metrics_reported() {
        let dst = echo_server();
        let metrics = Arc::new(CountingMetrics::default());
        let scheduler = ManualScheduler::new();
        let ctx = ServiceContext::with_metrics(
            ServiceConfig::default().index(small_index(Duration::from_secs(3))),
            &scheduler,
            metrics.clone(),
        )
        .unwrap();

        let conn = ctx.connect(&dst).unwrap();
        ctx.disconnect(conn, false).unwrap();
        let conn = ctx.connect(&dst).unwrap();
        ctx.disconnect(conn, false).unwrap();

        ctx.claim_file_id("a").unwrap();
        ctx.claim_file_id("a").unwrap();
        ctx.index().sweep_at(Instant::now() + Duration::from_secs(10));

        assert_eq!(metrics.connects.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.reuses.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.duplicates.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.expired.load(Ordering::SeqCst), 1);
    }
}
