//! In-memory store.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::StoreSnapshot;
use crate::audit::{AuditStore, InterceptLog, IpReportLog};
use crate::error::Result;
use crate::telemetry::{RequestLogDetail, RequestLogStore};

/// MemoryStore keeps every row in process memory.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `snapshot`.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            rows: RwLock::new(snapshot),
        }
    }

    /// Copy of every row.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.rows.read().clone()
    }

    /// Intercept rows, oldest first.
    pub fn intercepts(&self) -> Vec<InterceptLog> {
        self.rows.read().intercepts.clone()
    }

    /// IP report rows.
    pub fn ip_reports(&self) -> Vec<IpReportLog> {
        self.rows.read().ip_reports.clone()
    }

    /// Persisted request log rows.
    pub fn details(&self) -> Vec<RequestLogDetail> {
        self.rows.read().request_logs.clone()
    }
}

impl AuditStore for MemoryStore {
    fn insert_intercept(&self, log: InterceptLog) -> Result<()> {
        self.rows.write().intercepts.push(log);
        Ok(())
    }

    fn ip_reported(&self, ip: &str) -> Result<bool> {
        Ok(self.rows.read().ip_reports.iter().any(|r| r.ip == ip))
    }

    fn insert_ip_report(&self, report: IpReportLog) -> Result<()> {
        self.rows.write().ip_reports.push(report);
        Ok(())
    }
}

impl RequestLogStore for MemoryStore {
    fn insert_detail(&self, detail: RequestLogDetail) -> Result<()> {
        self.rows.write().request_logs.push(detail);
        Ok(())
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut rows = self.rows.write();
        let before = rows.request_logs.len();
        rows.request_logs.retain(|d| d.time >= cutoff);
        Ok(before - rows.request_logs.len())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ip_reports() {
        let store = MemoryStore::new();
        assert!(!store.ip_reported("1.1.1.1").unwrap());
        store
            .insert_ip_report(IpReportLog {
                ip: "1.1.1.1".into(),
                time: Utc::now(),
            })
            .unwrap();
        assert!(store.ip_reported("1.1.1.1").unwrap());
        assert!(!store.ip_reported("1.1.1.2").unwrap());
    }

    #[test]
    fn test_delete_older_than() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for days in [1, 100, 400] {
            let mut d = RequestLogDetail::new("1.1.1.1", "/", "UA", "");
            d.time = now - Duration::days(days);
            store.insert_detail(d).unwrap();
        }
        assert_eq!(store.delete_older_than(now - Duration::days(200)).unwrap(), 1);
        assert_eq!(store.details().len(), 2);
        assert_eq!(store.delete_older_than(now - Duration::days(200)).unwrap(), 0);
    }
}
