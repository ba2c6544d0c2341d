//! Storage backends for audit rows and request logs.
//!
//! Both backends implement [`AuditStore`](crate::audit::AuditStore) and
//! [`RequestLogStore`](crate::telemetry::RequestLogStore).

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};

use crate::audit::{InterceptLog, IpReportLog};
use crate::telemetry::RequestLogDetail;

/// All stored rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    /// Intercept rows, oldest first
    pub intercepts: Vec<InterceptLog>,
    /// IP report rows
    pub ip_reports: Vec<IpReportLog>,
    /// Persisted request log rows
    pub request_logs: Vec<RequestLogDetail>,
}
