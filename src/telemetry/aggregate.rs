//! In-memory per-IP request aggregates.

use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{RequestLogger, SweepReport, TelemetryMode};

/// Default cap on distinct IPs.
pub const DEFAULT_MAX_CLIENTS: usize = 100_000;

#[derive(Debug, Default)]
struct SeenValues {
    request_urls: AHashSet<String>,
    user_agents: AHashSet<String>,
}

/// One client. Known clients update under the map's read lock.
#[derive(Debug, Default)]
struct ClientAggregate {
    count: AtomicU64,
    seen: Mutex<SeenValues>,
}

impl ClientAggregate {
    fn touch(&self, url: &str, user_agent: &str) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let mut seen = self.seen.lock();
        if !seen.request_urls.contains(url) {
            seen.request_urls.insert(url.to_string());
        }
        if !seen.user_agents.contains(user_agent) {
            seen.user_agents.insert(user_agent.to_string());
        }
    }
}

/// Exported view of one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSummary {
    /// Client IP
    pub ip: String,
    /// Number of requests
    pub count: u64,
    /// Distinct URLs, sorted
    pub request_urls: Vec<String>,
    /// Distinct user agents, sorted
    pub user_agents: Vec<String>,
}

impl ClientSummary {
    fn from_aggregate(ip: &str, agg: &ClientAggregate) -> Self {
        let seen = agg.seen.lock();
        let mut request_urls: Vec<String> = seen.request_urls.iter().cloned().collect();
        request_urls.sort();
        let mut user_agents: Vec<String> = seen.user_agents.iter().cloned().collect();
        user_agents.sort();
        Self {
            ip: ip.to_string(),
            count: agg.count.load(Ordering::Relaxed),
            request_urls,
            user_agents,
        }
    }
}

/// RequestAggregates is the per-IP request map of the memory strategy.
///
/// Owned by whoever builds it (normally at service start) and shared with the
/// logger and any exporter through an `Arc`. Once `max_clients` distinct IPs
/// are held, requests from new IPs are dropped and counted in
/// [`overflowed`](Self::overflowed); known IPs keep updating.
pub struct RequestAggregates {
    clients: RwLock<AHashMap<String, ClientAggregate>>,
    max_clients: usize,
    overflowed: AtomicU64,
}

impl Default for RequestAggregates {
    fn default() -> Self {
        Self::with_max_clients(DEFAULT_MAX_CLIENTS)
    }
}

impl RequestAggregates {
    /// Create an empty map with the default cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map holding at most `max_clients` IPs.
    pub fn with_max_clients(max_clients: usize) -> Self {
        Self {
            clients: RwLock::new(AHashMap::new()),
            max_clients,
            overflowed: AtomicU64::new(0),
        }
    }

    /// Upsert one request.
    ///
    /// Known clients are updated under the shared read lock; only the first
    /// request of a new client takes the write lock.
    pub fn record(&self, ip: &str, url: &str, user_agent: &str) {
        if let Some(agg) = self.clients.read().get(ip) {
            agg.touch(url, user_agent);
            return;
        }

        let mut clients = self.clients.write();
        if !clients.contains_key(ip) && clients.len() >= self.max_clients {
            drop(clients);
            if self.overflowed.fetch_add(1, Ordering::Relaxed) == 0 {
                log::warn!(
                    "Request aggregate is full ({} clients); dropping new clients",
                    self.max_clients
                );
            }
            return;
        }
        clients
            .entry(ip.to_string())
            .or_default()
            .touch(url, user_agent);
    }

    /// Summary of one IP.
    pub fn get(&self, ip: &str) -> Option<ClientSummary> {
        self.clients
            .read()
            .get(ip)
            .map(|agg| ClientSummary::from_aggregate(ip, agg))
    }

    /// All clients, busiest first.
    pub fn snapshot(&self) -> Vec<ClientSummary> {
        let mut all: Vec<ClientSummary> = self
            .clients
            .read()
            .iter()
            .map(|(ip, agg)| ClientSummary::from_aggregate(ip, agg))
            .collect();
        all.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.ip.cmp(&b.ip)));
        all
    }

    /// Number of distinct IPs.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Check if no request was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests dropped because the map was full.
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Configured cap.
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Forget every client.
    pub fn clear(&self) {
        self.clients.write().clear();
        self.overflowed.store(0, Ordering::Relaxed);
    }
}

/// Logger for the memory strategy.
pub struct AggregateLogger {
    aggregates: Arc<RequestAggregates>,
}

impl AggregateLogger {
    /// Create a logger writing into `aggregates`.
    pub fn new(aggregates: Arc<RequestAggregates>) -> Self {
        Self { aggregates }
    }
}

impl RequestLogger for AggregateLogger {
    fn log(&self, ip: &str, url: &str, user_agent: &str, _trace_id: &str) {
        self.aggregates.record(ip, url, user_agent);
    }

    fn process(&self) -> SweepReport {
        SweepReport::default()
    }

    fn mode(&self) -> TelemetryMode {
        TelemetryMode::Memory
    }

    fn aggregates(&self) -> Option<Arc<RequestAggregates>> {
        Some(self.aggregates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_upsert() {
        let aggregates = RequestAggregates::new();
        aggregates.record("1.1.1.1", "/a", "UA1");
        aggregates.record("1.1.1.1", "/b", "UA1");
        aggregates.record("1.1.1.1", "/a", "UA2");
        aggregates.record("2.2.2.2", "/a", "UA1");

        let one = aggregates.get("1.1.1.1").unwrap();
        assert_eq!(one.count, 3);
        assert_eq!(one.request_urls, vec!["/a", "/b"]);
        assert_eq!(one.user_agents, vec!["UA1", "UA2"]);
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates.snapshot()[0].ip, "1.1.1.1");
        assert!(aggregates.get("3.3.3.3").is_none());
    }

    #[test]
    fn test_cap_drops_new_clients() {
        let aggregates = RequestAggregates::with_max_clients(2);
        aggregates.record("1.1.1.1", "/", "UA");
        aggregates.record("2.2.2.2", "/", "UA");
        aggregates.record("3.3.3.3", "/", "UA");
        aggregates.record("1.1.1.1", "/", "UA");

        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates.overflowed(), 1);
        assert_eq!(aggregates.get("1.1.1.1").unwrap().count, 2);

        aggregates.clear();
        assert!(aggregates.is_empty());
        assert_eq!(aggregates.overflowed(), 0);
    }

    #[test]
    fn test_concurrent_logging() {
        let aggregates = Arc::new(RequestAggregates::new());
        let logger = Arc::new(AggregateLogger::new(aggregates.clone()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let logger = logger.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        logger.log("9.9.9.9", &format!("/{}", i % 10), &format!("UA{}", t), "");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let summary = aggregates.get("9.9.9.9").unwrap();
        assert_eq!(summary.count, 4000);
        assert_eq!(summary.request_urls.len(), 10);
        assert_eq!(summary.user_agents.len(), 8);
        assert_eq!(logger.process(), SweepReport::default());
        assert!(Arc::ptr_eq(&logger.aggregates().unwrap(), &aggregates));
    }

    #[test]
    fn test_concurrent_new_and_known_clients() {
        let aggregates = Arc::new(RequestAggregates::with_max_clients(5));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let aggregates = aggregates.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        aggregates.record("9.9.9.9", "/", "UA");
                        aggregates.record(&format!("10.0.0.{}", t), "/", "UA");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(aggregates.len(), 5);
        assert_eq!(aggregates.get("9.9.9.9").unwrap().count, 1600);
        let per_client: u64 = aggregates
            .snapshot()
            .iter()
            .filter(|c| c.ip != "9.9.9.9")
            .map(|c| c.count)
            .sum();
        assert_eq!(per_client + aggregates.overflowed(), 1600);
    }
}
