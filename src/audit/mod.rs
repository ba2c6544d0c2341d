//! Interception auditing.
//!
//! Denials are persisted as [`InterceptLog`] rows for operator review. Storage
//! failures never reach the visitor: they are logged and the gate still answers
//! `NotFound`.

use chrono::{DateTime, Utc};
use quick_cache::sync::Cache;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::geo::LocationDescriptor;
use crate::request::Visitor;

/// Base remark of a region denial.
pub const REMARK_NO_PERMISSION: &str = "no permission to view this content";
/// Base remark of a hidden-category denial.
pub const REMARK_HIDDEN_CATEGORY: &str = "content hidden by category filter";
/// Base remark of a safe-mode denial.
pub const REMARK_SAFE_MODE: &str = "sensitive content hidden in safe mode";

const DEDUP_CACHE_CAPACITY: usize = 4_096;

/// One recorded denial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptLog {
    /// Network-layer IP
    pub ip: String,
    /// Requested URL, `//host/id`
    pub request_url: String,
    /// Referer header
    pub referer: String,
    /// User-Agent header
    pub user_agent: String,
    /// Time of the denial
    pub time: DateTime<Utc>,
    /// Why the request was denied
    pub remark: String,
    /// Resolved location of `ip`
    pub address: LocationDescriptor,
    /// HTTP protocol version
    pub http_version: String,
    /// Request headers as JSON
    pub headers: String,
}

/// Marker that an IP has been reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpReportLog {
    /// Reported IP
    pub ip: String,
    /// Time of the first report
    pub time: DateTime<Utc>,
}

/// AuditStore persists intercept and IP report rows.
pub trait AuditStore: Send + Sync {
    /// Append an intercept row.
    fn insert_intercept(&self, log: InterceptLog) -> Result<()>;

    /// Whether an IP report row exists for `ip`.
    fn ip_reported(&self, ip: &str) -> Result<bool>;

    /// Append an IP report row.
    fn insert_ip_report(&self, report: IpReportLog) -> Result<()>;
}

impl<S: AuditStore + ?Sized> AuditStore for Arc<S> {
    fn insert_intercept(&self, log: InterceptLog) -> Result<()> {
        (**self).insert_intercept(log)
    }

    fn ip_reported(&self, ip: &str) -> Result<bool> {
        (**self).ip_reported(ip)
    }

    fn insert_ip_report(&self, report: IpReportLog) -> Result<()> {
        (**self).insert_ip_report(report)
    }
}

/// Why access was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// Region policy denied the visitor
    Region,
    /// Item category is hidden by the visitor
    HiddenCategory,
    /// Sensitive item while safe mode is on
    SafeMode,
}

impl DenyReason {
    /// Base remark for this reason.
    pub fn remark(&self) -> &'static str {
        match self {
            DenyReason::Region => REMARK_NO_PERMISSION,
            DenyReason::HiddenCategory => REMARK_HIDDEN_CATEGORY,
            DenyReason::SafeMode => REMARK_SAFE_MODE,
        }
    }
}

/// Build the remark stored with an intercept.
pub fn build_remark(reason: DenyReason, switched_from: Option<IpAddr>) -> String {
    match switched_from {
        Some(original) => format!(
            "{}, IP switch detected, original IP: {}",
            reason.remark(),
            original
        ),
        None => reason.remark().to_string(),
    }
}

/// A denial about to be reported.
#[derive(Debug, Clone)]
pub struct InterceptEvent {
    /// Network-layer IP
    pub ip: String,
    /// Requested URL
    pub request_url: String,
    /// Referer header
    pub referer: String,
    /// User-Agent header
    pub user_agent: String,
    /// Resolved location of `ip`
    pub address: LocationDescriptor,
    /// HTTP protocol version
    pub http_version: String,
    /// Request headers as JSON
    pub headers: String,
    /// Declared original IP when an IP switch was detected
    pub switched_from: Option<IpAddr>,
    /// Why access was denied
    pub reason: DenyReason,
}

impl InterceptEvent {
    /// Capture a denial of `request_url` for `visitor`.
    pub fn from_visitor(
        visitor: &Visitor,
        request_url: impl Into<String>,
        address: LocationDescriptor,
        switched_from: Option<IpAddr>,
        reason: DenyReason,
    ) -> Self {
        Self {
            ip: visitor.ip_string(),
            request_url: request_url.into(),
            referer: visitor.referer().to_string(),
            user_agent: visitor.user_agent().to_string(),
            address,
            http_version: visitor.protocol.clone(),
            headers: visitor.headers_json(),
            switched_from,
            reason,
        }
    }

    /// Remark for this event.
    pub fn remark(&self) -> String {
        build_remark(self.reason, self.switched_from)
    }

    fn into_log(self, time: DateTime<Utc>) -> InterceptLog {
        let remark = self.remark();
        InterceptLog {
            ip: self.ip,
            request_url: self.request_url,
            referer: self.referer,
            user_agent: self.user_agent,
            time,
            remark,
            address: self.address,
            http_version: self.http_version,
            headers: self.headers,
        }
    }
}

/// InterceptReporter records denials and once-per-IP reports.
pub struct InterceptReporter {
    store: Arc<dyn AuditStore>,
    recent: Option<Cache<String, Instant>>,
    dedup_window: Duration,
}

impl InterceptReporter {
    /// Create a reporter without deduplication.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self::with_dedup_window(store, Duration::ZERO)
    }

    /// Create a reporter that coalesces identical intercepts within `window`.
    ///
    /// A zero window disables deduplication.
    pub fn with_dedup_window(store: Arc<dyn AuditStore>, window: Duration) -> Self {
        let recent = if window.is_zero() {
            None
        } else {
            Some(Cache::new(DEDUP_CACHE_CAPACITY))
        };
        Self {
            store,
            recent,
            dedup_window: window,
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    fn dedup_key(event: &InterceptEvent, remark: &str) -> String {
        format!("{}\u{1f}{}\u{1f}{}", event.ip, event.request_url, remark)
    }

    fn is_repeat(&self, key: &str) -> bool {
        let Some(recent) = &self.recent else {
            return false;
        };
        match recent.get(key) {
            Some(seen) => seen.elapsed() < self.dedup_window,
            None => false,
        }
    }

    /// Persist a denial. Failures are logged, never returned.
    ///
    /// A denial counts toward deduplication only once its row is stored.
    pub fn report(&self, event: InterceptEvent) {
        let remark = event.remark();
        let key = Self::dedup_key(&event, &remark);
        if self.is_repeat(&key) {
            log::debug!("Coalesced repeated intercept for {} {}", event.ip, event.request_url);
            return;
        }

        let ip = event.ip.clone();
        let url = event.request_url.clone();
        match self.store.insert_intercept(event.into_log(Utc::now())) {
            Ok(()) => {
                if let Some(recent) = &self.recent {
                    recent.insert(key, Instant::now());
                }
                log::info!("Intercepted {} requesting {}: {}", ip, url, remark);
            }
            Err(e) => log::error!("Failed to record intercept for {}: {}", ip, e),
        }
    }

    /// Record `ip` once. Returns whether a row was written.
    ///
    /// The existence check and the insert are not atomic; concurrent calls for
    /// the same IP may both write.
    pub fn report_ip_once(&self, ip: &str) -> bool {
        report_once(&*self.store, ip)
    }

    /// Async form of [`report_ip_once`](Self::report_ip_once), run on the blocking pool.
    pub async fn report_ip_once_async(&self, ip: &str) -> bool {
        let store = self.store.clone();
        let ip = ip.to_string();
        match tokio::task::spawn_blocking(move || report_once(&*store, &ip)).await {
            Ok(written) => written,
            Err(e) => {
                log::error!("IP report task failed: {}", e);
                false
            }
        }
    }
}

fn report_once(store: &dyn AuditStore, ip: &str) -> bool {
    let ip = ip.trim();
    if ip.is_empty() {
        return false;
    }
    match store.ip_reported(ip) {
        Ok(true) => false,
        Ok(false) => match store.insert_ip_report(IpReportLog {
            ip: ip.to_string(),
            time: Utc::now(),
        }) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to record IP report for {}: {}", ip, e);
                false
            }
        },
        Err(e) => {
            log::error!("Failed to look up IP report for {}: {}", ip, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::MemoryStore;

    struct BrokenStore;

    impl AuditStore for BrokenStore {
        fn insert_intercept(&self, _log: InterceptLog) -> Result<()> {
            Err(Error::Storage("disk full".into()))
        }

        fn ip_reported(&self, _ip: &str) -> Result<bool> {
            Err(Error::Storage("disk full".into()))
        }

        fn insert_ip_report(&self, _report: IpReportLog) -> Result<()> {
            Err(Error::Storage("disk full".into()))
        }
    }

    /// Fails the first intercept write, then stores normally.
    struct FailsOnceStore {
        failed: std::sync::atomic::AtomicBool,
        inner: MemoryStore,
    }

    impl AuditStore for FailsOnceStore {
        fn insert_intercept(&self, log: InterceptLog) -> Result<()> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Storage("connection reset".into()));
            }
            self.inner.insert_intercept(log)
        }

        fn ip_reported(&self, ip: &str) -> Result<bool> {
            self.inner.ip_reported(ip)
        }

        fn insert_ip_report(&self, report: IpReportLog) -> Result<()> {
            self.inner.insert_ip_report(report)
        }
    }

    fn event(reason: DenyReason, switched_from: Option<IpAddr>) -> InterceptEvent {
        let visitor = Visitor::new("203.0.113.7".parse().unwrap())
            .with_url("blog.example.com", "/42")
            .with_header("User-Agent", "UA/1.0");
        InterceptEvent::from_visitor(
            &visitor,
            "//blog.example.com/42",
            LocationDescriptor::default(),
            switched_from,
            reason,
        )
    }

    #[test]
    fn test_remarks() {
        assert_eq!(build_remark(DenyReason::Region, None), REMARK_NO_PERMISSION);
        assert_eq!(
            build_remark(DenyReason::Region, Some("1.2.3.4".parse().unwrap())),
            "no permission to view this content, IP switch detected, original IP: 1.2.3.4"
        );
        assert_ne!(
            build_remark(DenyReason::SafeMode, None),
            build_remark(DenyReason::HiddenCategory, None)
        );
    }

    #[test]
    fn test_report_persists() {
        let store = Arc::new(MemoryStore::new());
        let reporter = InterceptReporter::new(store.clone());
        reporter.report(event(DenyReason::Region, None));

        let logs = store.intercepts();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].ip, "203.0.113.7");
        assert_eq!(logs[0].request_url, "//blog.example.com/42");
        assert_eq!(logs[0].user_agent, "UA/1.0");
        assert_eq!(logs[0].remark, REMARK_NO_PERMISSION);
    }

    #[test]
    fn test_dedup_window() {
        let store = Arc::new(MemoryStore::new());
        let reporter = InterceptReporter::with_dedup_window(store.clone(), Duration::from_secs(60));
        for _ in 0..5 {
            reporter.report(event(DenyReason::Region, None));
        }
        reporter.report(event(DenyReason::SafeMode, None));
        assert_eq!(store.intercepts().len(), 2);
    }

    #[test]
    fn test_failed_write_is_not_coalesced() {
        let store = Arc::new(FailsOnceStore {
            failed: Default::default(),
            inner: MemoryStore::new(),
        });
        let reporter = InterceptReporter::with_dedup_window(store.clone(), Duration::from_secs(10));

        reporter.report(event(DenyReason::Region, None));
        assert!(store.inner.intercepts().is_empty());

        reporter.report(event(DenyReason::Region, None));
        reporter.report(event(DenyReason::Region, None));
        assert_eq!(store.inner.intercepts().len(), 1);
    }

    #[test]
    fn test_report_failure_is_swallowed() {
        let reporter = InterceptReporter::new(Arc::new(BrokenStore));
        reporter.report(event(DenyReason::Region, None));
        assert!(!reporter.report_ip_once("203.0.113.7"));
    }

    #[test]
    fn test_report_ip_once_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let reporter = InterceptReporter::new(store.clone());
        assert!(reporter.report_ip_once("203.0.113.7"));
        assert!(!reporter.report_ip_once("203.0.113.7"));
        assert!(!reporter.report_ip_once(" 203.0.113.7 "));
        assert!(reporter.report_ip_once("203.0.113.8"));
        assert!(!reporter.report_ip_once(""));
        assert_eq!(store.ip_reports().len(), 2);
    }

    #[tokio::test]
    async fn test_report_ip_once_async() {
        let store = Arc::new(MemoryStore::new());
        let reporter = InterceptReporter::new(store.clone());
        assert!(reporter.report_ip_once_async("198.51.100.1").await);
        assert!(!reporter.report_ip_once_async("198.51.100.1").await);
        assert!(!reporter.report_ip_once("198.51.100.1"));
        assert_eq!(store.ip_reports().len(), 1);
    }
}
