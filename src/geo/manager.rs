//! GeoIP City database lifecycle: download, install, refresh.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::MaxMindLocator;
use crate::error::{Error, Result};

/// Default CDN URL for the GeoLite2-City database.
pub const DEFAULT_GEOIP_URL: &str =
    "https://cdn.jsdelivr.net/npm/geolite2-city/GeoLite2-City.mmdb.gz";

/// Default refresh interval (7 days).
pub const DEFAULT_GEOIP_UPDATE_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const DB_FILE: &str = "GeoLite2-City.mmdb";
const STAMP_FILE: &str = "GeoLite2-City.mmdb.meta";
const TEMP_FILE: &str = "GeoLite2-City.mmdb.tmp";

/// Record of the last successful install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStamp {
    /// Install time, seconds since the Unix epoch
    pub installed_at: Option<u64>,
    /// Source URL of the installed file
    pub source: Option<String>,
    /// Size of the installed (decompressed) file
    pub bytes: u64,
}

impl DatabaseStamp {
    fn now(source: &str, bytes: u64) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            installed_at: Some(secs),
            source: Some(source.to_string()),
            bytes,
        }
    }

    /// Load a stamp; a missing file yields the default (never installed).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the stamp as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Install time as a `SystemTime`.
    pub fn installed_at(&self) -> Option<SystemTime> {
        self.installed_at
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Whether `interval` has elapsed since install (or nothing was installed).
    pub fn is_stale(&self, interval: Duration) -> bool {
        match self.installed_at() {
            None => true,
            Some(at) => {
                let elapsed = SystemTime::now().duration_since(at).unwrap_or(Duration::MAX);
                elapsed >= interval
            }
        }
    }
}

/// Manager for the GeoIP City database file.
pub struct GeoDatabaseManager {
    cache_dir: PathBuf,
    db_url: String,
    update_interval: Duration,
}

impl GeoDatabaseManager {
    /// Create a manager with the default URL.
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self::with_url(cache_dir, DEFAULT_GEOIP_URL)
    }

    /// Create a manager with a custom URL.
    pub fn with_url(cache_dir: impl AsRef<Path>, url: &str) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            db_url: url.to_string(),
            update_interval: DEFAULT_GEOIP_UPDATE_INTERVAL,
        }
    }

    /// Set a custom refresh interval.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Path of the installed database.
    pub fn db_path(&self) -> PathBuf {
        self.cache_dir.join(DB_FILE)
    }

    fn stamp_path(&self) -> PathBuf {
        self.cache_dir.join(STAMP_FILE)
    }

    /// Last install stamp.
    pub fn stamp(&self) -> DatabaseStamp {
        DatabaseStamp::load(self.stamp_path()).unwrap_or_default()
    }

    /// Whether the installed database is older than the refresh interval.
    pub fn needs_update(&self) -> bool {
        !self.db_path().exists() || self.stamp().is_stale(self.update_interval)
    }

    /// Make sure a database file exists, downloading it if needed, and load it into `locator`.
    pub fn ensure_installed(&self, locator: &MaxMindLocator) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        if !self.db_path().exists() {
            self.download()?;
        }
        locator.reload_city(&self.db_path())?;
        Ok(self.db_path())
    }

    /// Refresh and hot-reload `locator` if the refresh interval has elapsed.
    ///
    /// Returns `true` when a new database was installed.
    pub fn refresh_if_stale(&self, locator: &MaxMindLocator) -> Result<bool> {
        if !self.needs_update() {
            return Ok(false);
        }
        fs::create_dir_all(&self.cache_dir)?;
        self.download()?;
        locator.reload_city(&self.db_path())?;
        Ok(true)
    }

    /// Download and atomically install the database.
    pub fn download(&self) -> Result<u64> {
        let response = ureq::get(&self.db_url)
            .call()
            .map_err(|e| Error::Download(format!("GeoIP database: {}", e)))?;

        if response.status() != 200 {
            return Err(Error::Download(format!(
                "GeoIP database: HTTP {}",
                response.status()
            )));
        }

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::Download(format!("failed to read response: {}", e)))?;

        let installed = self.install_bytes(&bytes)?;
        log::info!("Installed GeoIP database from {}: {} bytes", self.db_url, installed);
        Ok(installed)
    }

    /// Install raw (optionally gzipped) database bytes; returns the installed size.
    pub fn install_bytes(&self, bytes: &[u8]) -> Result<u64> {
        fs::create_dir_all(&self.cache_dir)?;

        let data = if bytes.starts_with(&[0x1f, 0x8b]) {
            let mut decoder = GzDecoder::new(bytes);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            decompressed
        } else {
            bytes.to_vec()
        };

        let temp_path = self.cache_dir.join(TEMP_FILE);
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.db_path())?;
        DatabaseStamp::now(&self.db_url, data.len() as u64).save(self.stamp_path())?;
        Ok(data.len() as u64)
    }
}
