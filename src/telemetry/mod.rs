//! Request telemetry.
//!
//! Every request is handed to a [`RequestLogger`] selected once at startup from
//! [`TelemetryMode`]:
//!
//! - `None`: nothing is recorded.
//! - `Memory`: per-IP counters in an owned [`RequestAggregates`] map.
//! - `Durable`: records are queued and persisted by the [`RetentionSweeper`].

mod aggregate;
mod queue;
mod sweeper;

pub use aggregate::{AggregateLogger, ClientSummary, RequestAggregates, DEFAULT_MAX_CLIENTS};
pub use queue::{QueueLogger, DEFAULT_RETENTION_MONTHS};
pub use sweeper::{sweep_once, RetentionSweeper, DEFAULT_SWEEP_INTERVAL};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::TelemetryConfig;
use crate::error::{Error, Result};
use crate::geo::GeoLocator;

/// Request logging strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMode {
    /// Do not record requests
    #[default]
    None,
    /// Aggregate per IP in memory
    #[serde(alias = "in_memory", alias = "file")]
    Memory,
    /// Queue and persist to the request log store
    #[serde(alias = "database", alias = "queue")]
    Durable,
}

impl TelemetryMode {
    /// Name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryMode::None => "none",
            TelemetryMode::Memory => "memory",
            TelemetryMode::Durable => "durable",
        }
    }
}

impl fmt::Display for TelemetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TelemetryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(TelemetryMode::None),
            "memory" | "in_memory" | "file" => Ok(TelemetryMode::Memory),
            "durable" | "database" | "queue" => Ok(TelemetryMode::Durable),
            other => Err(Error::Config(format!("unknown telemetry mode: {}", other))),
        }
    }
}

/// One request as stored by the durable strategy.
///
/// Location fields are empty when queued and filled in during the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogDetail {
    /// Client IP
    pub ip: String,
    /// Requested URL
    pub request_url: String,
    /// User-Agent header
    pub user_agent: String,
    /// Correlation id of the request
    pub trace_id: String,
    /// Time of the request
    pub time: DateTime<Utc>,
    /// Resolved location text
    #[serde(default)]
    pub location: String,
    /// Resolved country
    #[serde(default)]
    pub country: String,
    /// Resolved city
    #[serde(default)]
    pub city: String,
    /// Resolved network operator
    #[serde(default)]
    pub network: String,
}

impl RequestLogDetail {
    /// A fresh, unenriched record timestamped now.
    pub fn new(ip: &str, request_url: &str, user_agent: &str, trace_id: &str) -> Self {
        Self {
            ip: ip.to_string(),
            request_url: request_url.to_string(),
            user_agent: user_agent.to_string(),
            trace_id: trace_id.to_string(),
            time: Utc::now(),
            location: String::new(),
            country: String::new(),
            city: String::new(),
            network: String::new(),
        }
    }
}

/// RequestLogStore persists request log records.
pub trait RequestLogStore: Send + Sync {
    /// Stage one record.
    fn insert_detail(&self, detail: RequestLogDetail) -> Result<()>;

    /// Delete records older than `cutoff`; returns the number removed.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Make staged changes durable.
    fn commit(&self) -> Result<()>;
}

impl<S: RequestLogStore + ?Sized> RequestLogStore for Arc<S> {
    fn insert_detail(&self, detail: RequestLogDetail) -> Result<()> {
        (**self).insert_detail(detail)
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        (**self).delete_older_than(cutoff)
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }
}

/// Outcome of one `process` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records taken off the queue
    pub drained: usize,
    /// Records written
    pub inserted: usize,
    /// Records that failed to write and were dropped
    pub failed: usize,
    /// Expired records deleted
    pub pruned: usize,
    /// Sweep skipped (trace mode)
    pub skipped: bool,
}

/// RequestLogger records requests and periodically processes them.
pub trait RequestLogger: Send + Sync {
    /// Record one request. Never blocks on storage.
    fn log(&self, ip: &str, url: &str, user_agent: &str, trace_id: &str);

    /// Flush and retire buffered records.
    fn process(&self) -> SweepReport;

    /// Strategy of this logger.
    fn mode(&self) -> TelemetryMode;

    /// In-memory aggregates, for the memory strategy.
    fn aggregates(&self) -> Option<Arc<RequestAggregates>> {
        None
    }
}

/// Logger that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl RequestLogger for NoopLogger {
    fn log(&self, _ip: &str, _url: &str, _user_agent: &str, _trace_id: &str) {}

    fn process(&self) -> SweepReport {
        SweepReport::default()
    }

    fn mode(&self) -> TelemetryMode {
        TelemetryMode::None
    }
}

/// Build the logger selected by `config`.
///
/// `store` is only used by the durable strategy.
pub fn build_logger(
    config: &TelemetryConfig,
    locator: Arc<dyn GeoLocator>,
    store: Arc<dyn RequestLogStore>,
) -> Arc<dyn RequestLogger> {
    log::info!("Request telemetry mode: {}", config.mode);
    match config.mode {
        TelemetryMode::None => Arc::new(NoopLogger),
        TelemetryMode::Memory => Arc::new(AggregateLogger::new(Arc::new(
            RequestAggregates::with_max_clients(config.max_clients),
        ))),
        TelemetryMode::Durable => Arc::new(
            QueueLogger::new(locator, store)
                .with_retention_months(config.retention_months)
                .with_trace_mode(config.trace_mode),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::NullLocator;
    use crate::store::MemoryStore;

    #[test]
    fn test_mode_parse() {
        assert_eq!("durable".parse::<TelemetryMode>().unwrap(), TelemetryMode::Durable);
        assert_eq!("Database".parse::<TelemetryMode>().unwrap(), TelemetryMode::Durable);
        assert_eq!("memory".parse::<TelemetryMode>().unwrap(), TelemetryMode::Memory);
        assert_eq!("none".parse::<TelemetryMode>().unwrap(), TelemetryMode::None);
        assert!("sometimes".parse::<TelemetryMode>().is_err());
    }

    #[test]
    fn test_mode_serde_aliases() {
        let mode: TelemetryMode = serde_yaml::from_str("database").unwrap();
        assert_eq!(mode, TelemetryMode::Durable);
        let mode: TelemetryMode = serde_yaml::from_str("in_memory").unwrap();
        assert_eq!(mode, TelemetryMode::Memory);
    }

    #[test]
    fn test_noop_logger() {
        let logger = NoopLogger;
        logger.log("1.1.1.1", "/", "UA", "t1");
        assert_eq!(logger.process(), SweepReport::default());
        assert!(logger.aggregates().is_none());
    }

    #[test]
    fn test_build_logger_selects_strategy() {
        let store = Arc::new(MemoryStore::new());
        for mode in [TelemetryMode::None, TelemetryMode::Memory, TelemetryMode::Durable] {
            let config = TelemetryConfig {
                mode,
                ..Default::default()
            };
            let logger = build_logger(&config, Arc::new(NullLocator), store.clone());
            assert_eq!(logger.mode(), mode);
            assert_eq!(logger.aggregates().is_some(), mode == TelemetryMode::Memory);
        }
    }
}
