//! Durable request logging through an in-process queue.

use chrono::{Months, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use super::{RequestLogDetail, RequestLogStore, RequestLogger, SweepReport, TelemetryMode};
use crate::geo::GeoLocator;

/// Default retention of persisted request logs.
pub const DEFAULT_RETENTION_MONTHS: u32 = 6;

/// QueueLogger buffers requests on an unbounded queue and persists them on `process`.
pub struct QueueLogger {
    tx: UnboundedSender<RequestLogDetail>,
    rx: Mutex<UnboundedReceiver<RequestLogDetail>>,
    locator: Arc<dyn GeoLocator>,
    store: Arc<dyn RequestLogStore>,
    retention_months: u32,
    trace_mode: bool,
}

impl QueueLogger {
    /// Create a logger enriching with `locator` and writing to `store`.
    pub fn new(locator: Arc<dyn GeoLocator>, store: Arc<dyn RequestLogStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            locator,
            store,
            retention_months: DEFAULT_RETENTION_MONTHS,
            trace_mode: false,
        }
    }

    /// Set how many months of records to keep.
    pub fn with_retention_months(mut self, months: u32) -> Self {
        self.retention_months = months;
        self
    }

    /// In trace mode `process` leaves the queue untouched.
    pub fn with_trace_mode(mut self, trace_mode: bool) -> Self {
        self.trace_mode = trace_mode;
        self
    }

    /// Records waiting for the next sweep.
    pub fn pending(&self) -> usize {
        self.rx.lock().len()
    }

    fn enrich(&self, detail: &mut RequestLogDetail) {
        let location = self.locator.resolve(&detail.ip);
        detail.location = location.to_string();
        detail.country = location.country;
        detail.city = location.city;
        detail.network = location.network;
    }
}

impl RequestLogger for QueueLogger {
    fn log(&self, ip: &str, url: &str, user_agent: &str, trace_id: &str) {
        if self
            .tx
            .send(RequestLogDetail::new(ip, url, user_agent, trace_id))
            .is_err()
        {
            log::warn!("Request log queue closed; dropping record for {}", ip);
        }
    }

    fn process(&self) -> SweepReport {
        if self.trace_mode {
            log::debug!("Trace mode: request log sweep skipped");
            return SweepReport {
                skipped: true,
                ..Default::default()
            };
        }

        let mut report = SweepReport::default();
        let mut rx = self.rx.lock();
        loop {
            let mut detail = match rx.try_recv() {
                Ok(detail) => detail,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            report.drained += 1;
            self.enrich(&mut detail);
            let ip = detail.ip.clone();
            match self.store.insert_detail(detail) {
                Ok(()) => report.inserted += 1,
                Err(e) => {
                    report.failed += 1;
                    log::error!("Failed to persist request log for {}: {}", ip, e);
                }
            }
        }
        drop(rx);

        match Utc::now().checked_sub_months(Months::new(self.retention_months)) {
            Some(cutoff) => match self.store.delete_older_than(cutoff) {
                Ok(n) => report.pruned = n,
                Err(e) => log::error!("Failed to prune request logs: {}", e),
            },
            None => log::warn!("Retention cutoff out of range: {} months", self.retention_months),
        }

        if let Err(e) = self.store.commit() {
            log::error!("Failed to commit request logs: {}", e);
        }

        log::debug!(
            "Request log sweep: drained={} inserted={} failed={} pruned={}",
            report.drained,
            report.inserted,
            report.failed,
            report.pruned
        );
        report
    }

    fn mode(&self) -> TelemetryMode {
        TelemetryMode::Durable
    }
}
