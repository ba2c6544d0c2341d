//! Background sweeper behavior against the durable request log queue.

use chrono::{Duration as ChronoDuration, Utc};
use regionwall::geo::{GeoLocator, LocationDescriptor, StaticLocator};
use regionwall::store::{FileStore, MemoryStore, StoreSnapshot};
use regionwall::telemetry::{sweep_once, QueueLogger, RequestLogDetail, RequestLogger};
use regionwall::RetentionSweeper;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn locator() -> Arc<dyn GeoLocator> {
    let table = StaticLocator::new();
    table
        .add(
            "8.8.0.0/16",
            LocationDescriptor {
                country: "United States".into(),
                country_code: "US".into(),
                network: "Google".into(),
                address: "United States|US".into(),
                ..Default::default()
            },
        )
        .unwrap();
    Arc::new(table)
}

fn aged(ip: &str, days: i64) -> RequestLogDetail {
    let mut detail = RequestLogDetail::new(ip, "//blog.example.com/1", "curl/8.0", "old");
    detail.time = Utc::now() - ChronoDuration::days(days);
    detail
}

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    done()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweeper_drains_queue() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(QueueLogger::new(locator(), store.clone()));
    for i in 0..10 {
        queue.log("8.8.8.8", &format!("//blog.example.com/{}", i), "curl/8.0", "t");
    }
    assert_eq!(queue.pending(), 10);

    let logger: Arc<dyn RequestLogger> = queue.clone();
    let sweeper = RetentionSweeper::spawn(logger, Duration::from_millis(50));

    assert!(wait_until(|| queue.pending() == 0 && store.details().len() == 10).await);
    let details = store.details();
    assert!(details.iter().all(|d| d.country == "United States"));
    assert!(details.iter().all(|d| d.network == "Google"));

    sweeper.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweeper_prunes_expired_rows() {
    let store = Arc::new(MemoryStore::from_snapshot(StoreSnapshot {
        request_logs: vec![aged("1.1.1.1", 7 * 31), aged("2.2.2.2", 5 * 30)],
        ..Default::default()
    }));
    let queue = Arc::new(QueueLogger::new(locator(), store.clone()));
    let logger: Arc<dyn RequestLogger> = queue;
    let sweeper = RetentionSweeper::spawn(logger, Duration::from_millis(50));

    assert!(wait_until(|| store.details().len() == 1).await);
    assert_eq!(store.details()[0].ip, "2.2.2.2");

    sweeper.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trace_mode_leaves_queue_alone() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(QueueLogger::new(locator(), store.clone()).with_trace_mode(true));
    queue.log("8.8.8.8", "//blog.example.com/1", "curl/8.0", "t");

    let logger: Arc<dyn RequestLogger> = queue.clone();
    let report = sweep_once(&logger).await.unwrap();
    assert!(report.skipped);
    assert_eq!(report.drained, 0);
    assert_eq!(queue.pending(), 1);
    assert!(store.details().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_before_first_tick_keeps_queue() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(QueueLogger::new(locator(), store.clone()));
    queue.log("8.8.8.8", "//blog.example.com/1", "curl/8.0", "t");
    queue.log("8.8.4.4", "//blog.example.com/2", "curl/8.0", "t");

    let logger: Arc<dyn RequestLogger> = queue.clone();
    let sweeper = RetentionSweeper::spawn(logger, Duration::from_secs(3600));
    sweeper.cancel();

    assert!(wait_until(|| sweeper.is_finished()).await);
    assert_eq!(queue.pending(), 2);
    assert!(store.details().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_runs_final_drain() {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(QueueLogger::new(locator(), store.clone()));
    let logger: Arc<dyn RequestLogger> = queue.clone();
    let sweeper = RetentionSweeper::spawn(logger, Duration::from_secs(3600));

    queue.log("8.8.8.8", "//blog.example.com/1", "curl/8.0", "t");
    queue.log("8.8.8.8", "//blog.example.com/2", "curl/8.0", "t");
    queue.log("8.8.8.8", "//blog.example.com/3", "curl/8.0", "t");

    let report = sweeper.shutdown().await.unwrap();
    assert_eq!(report.drained, 3);
    assert_eq!(report.inserted, 3);
    assert_eq!(queue.pending(), 0);
    assert_eq!(store.details().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweep_persists_to_file_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("regionwall.json");

    {
        let store = Arc::new(FileStore::open(&path).unwrap());
        let queue = Arc::new(QueueLogger::new(locator(), store));
        queue.log("8.8.8.8", "//blog.example.com/7", "curl/8.0", "trace-7");
        let logger: Arc<dyn RequestLogger> = queue;
        let report = sweep_once(&logger).await.unwrap();
        assert_eq!(report.inserted, 1);
    }

    let reopened = FileStore::open(&path).unwrap();
    let rows = reopened.snapshot().request_logs;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].trace_id, "trace-7");
    assert_eq!(rows[0].country, "United States");
}
