//! JSON snapshot store.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::StoreSnapshot;
use crate::audit::{AuditStore, InterceptLog, IpReportLog};
use crate::error::{Error, Result};
use crate::telemetry::{RequestLogDetail, RequestLogStore};

/// FileStore keeps rows in memory and persists them as one JSON document.
///
/// Audit rows are written through immediately. Request log inserts and
/// deletions are staged and only reach the file on
/// [`commit`](RequestLogStore::commit); audit writes persist the request logs
/// of the last commit. Every write replaces the file atomically.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Default)]
struct FileState {
    /// Rows as last persisted, plus audit rows
    rows: StoreSnapshot,
    staged: Vec<RequestLogDetail>,
    cutoff: Option<DateTime<Utc>>,
}

impl FileStore {
    /// Open `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rows = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                StoreSnapshot::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            StoreSnapshot::default()
        };
        log::debug!(
            "Opened store {}: {} intercepts, {} request logs",
            path.display(),
            rows.intercepts.len(),
            rows.request_logs.len()
        );
        Ok(Self {
            path,
            state: Mutex::new(FileState {
                rows,
                ..Default::default()
            }),
        })
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the persisted rows. Staged request logs are not included.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().rows.clone()
    }

    /// Request log rows waiting for the next commit.
    pub fn staged(&self) -> usize {
        self.state.lock().staged.len()
    }

    fn save(&self, rows: &StoreSnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(&serde_json::to_vec_pretty(rows)?)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl AuditStore for FileStore {
    fn insert_intercept(&self, log: InterceptLog) -> Result<()> {
        let mut state = self.state.lock();
        state.rows.intercepts.push(log);
        if let Err(e) = self.save(&state.rows) {
            state.rows.intercepts.pop();
            return Err(e);
        }
        Ok(())
    }

    fn ip_reported(&self, ip: &str) -> Result<bool> {
        Ok(self.state.lock().rows.ip_reports.iter().any(|r| r.ip == ip))
    }

    fn insert_ip_report(&self, report: IpReportLog) -> Result<()> {
        let mut state = self.state.lock();
        state.rows.ip_reports.push(report);
        if let Err(e) = self.save(&state.rows) {
            state.rows.ip_reports.pop();
            return Err(e);
        }
        Ok(())
    }
}

impl RequestLogStore for FileStore {
    fn insert_detail(&self, detail: RequestLogDetail) -> Result<()> {
        self.state.lock().staged.push(detail);
        Ok(())
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.lock();
        let previous = state.cutoff;
        let expired_persisted = state
            .rows
            .request_logs
            .iter()
            .filter(|d| d.time < cutoff && previous.map_or(true, |p| d.time >= p))
            .count();
        let before = state.staged.len();
        state.staged.retain(|d| d.time >= cutoff);
        let expired_staged = before - state.staged.len();
        state.cutoff = Some(previous.map_or(cutoff, |p| p.max(cutoff)));
        Ok(expired_persisted + expired_staged)
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.lock();
        let mut next = state.rows.clone();
        if let Some(cutoff) = state.cutoff {
            next.request_logs.retain(|d| d.time >= cutoff);
        }
        next.request_logs.extend(state.staged.iter().cloned());
        self.save(&next)?;

        state.rows = next;
        state.staged.clear();
        state.cutoff = None;
        Ok(())
    }
}
