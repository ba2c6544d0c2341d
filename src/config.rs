//! Gate configuration.
//!
//! Loaded from YAML; every field has a default so an empty document is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::gate::IpAllowlist;
use crate::geo::{DEFAULT_GEOIP_URL, DEFAULT_LOCATION_CACHE_CAPACITY};
use crate::identity::{default_proxy_prefixes, DEFAULT_RAW_IP_COOKIE};
use crate::policy::{PatternCache, DEFAULT_PATTERN_CACHE_CAPACITY};
use crate::telemetry::{
    TelemetryMode, DEFAULT_MAX_CLIENTS, DEFAULT_RETENTION_MONTHS, DEFAULT_SWEEP_INTERVAL,
};

/// Environment variable overriding [`GateConfig::secret`].
pub const ENV_SECRET: &str = "REGIONWALL_SECRET";
/// Environment variable forcing trace mode when set to `1`.
pub const ENV_TRACE: &str = "REGIONWALL_TRACE";

/// Cookie names the gate reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieNames {
    /// Visitor identity (e.g. e-mail)
    pub identity: String,
    /// Trusted-visitor token
    pub token: String,
    /// Declared original IP
    pub raw_ip: String,
    /// Comma-separated hidden category ids
    pub hidden_categories: String,
    /// Safe-mode switch
    pub safe_mode: String,
}

impl Default for CookieNames {
    fn default() -> Self {
        Self {
            identity: "Email".to_string(),
            token: "FullAccessToken".to_string(),
            raw_ip: DEFAULT_RAW_IP_COOKIE.to_string(),
            hidden_categories: "HideCategories".to_string(),
            safe_mode: "Nsfw".to_string(),
        }
    }
}

/// Request telemetry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Logging strategy
    pub mode: TelemetryMode,
    /// Seconds between sweeps
    pub sweep_interval_secs: u64,
    /// Months of request logs to keep
    pub retention_months: u32,
    /// Maximum distinct IPs held by the in-memory aggregate
    pub max_clients: usize,
    /// Skip sweeps (development/debug mode)
    pub trace_mode: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mode: TelemetryMode::None,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            retention_months: DEFAULT_RETENTION_MONTHS,
            max_clients: DEFAULT_MAX_CLIENTS,
            trace_mode: false,
        }
    }
}

impl TelemetryConfig {
    /// Sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// GeoIP settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoIpConfig {
    /// City database path; absent means install into `cache_dir`
    pub database: Option<PathBuf>,
    /// Optional ASN database path
    pub asn_database: Option<PathBuf>,
    /// Download URL
    pub url: String,
    /// Directory for downloaded databases
    pub cache_dir: Option<PathBuf>,
    /// Lookup cache capacity; 0 disables caching
    pub cache_capacity: usize,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            database: None,
            asn_database: None,
            url: DEFAULT_GEOIP_URL.to_string(),
            cache_dir: None,
            cache_capacity: DEFAULT_LOCATION_CACHE_CAPACITY,
        }
    }
}

/// Process-wide gate configuration.
///
/// # Examples
/// ```
/// use regionwall::config::GateConfig;
///
/// let config = GateConfig::from_yaml_str("secret: s3cret\nip_allowlist: [10.0.0.0/8]\n").unwrap();
/// assert_eq!(config.secret, "s3cret");
/// assert_eq!(config.telemetry.sweep_interval_secs, 300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Key for signed cookies
    pub secret: String,
    /// IPs and CIDR ranges that bypass region rules
    pub ip_allowlist: Vec<String>,
    /// Header name prefixes included in fingerprints
    pub proxy_header_prefixes: Vec<String>,
    /// Additional crawler user-agent tokens
    pub extra_crawler_agents: Vec<String>,
    /// Cookie names
    pub cookies: CookieNames,
    /// Request telemetry
    pub telemetry: TelemetryConfig,
    /// GeoIP databases
    pub geoip: GeoIpConfig,
    /// Compiled region pattern cache capacity
    pub pattern_cache_capacity: usize,
    /// Window for coalescing identical intercept reports; 0 disables
    pub report_dedup_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ip_allowlist: Vec::new(),
            proxy_header_prefixes: default_proxy_prefixes(),
            extra_crawler_agents: Vec::new(),
            cookies: CookieNames::default(),
            telemetry: TelemetryConfig::default(),
            geoip: GeoIpConfig::default(),
            pattern_cache_capacity: DEFAULT_PATTERN_CACHE_CAPACITY,
            report_dedup_secs: 10,
        }
    }
}

impl GateConfig {
    /// Parse YAML and apply environment overrides.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config: GateConfig = if yaml.trim().is_empty() {
            GateConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.apply_env();
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(ENV_SECRET) {
            if !secret.trim().is_empty() {
                self.secret = secret;
            }
        }
        if std::env::var(ENV_TRACE).map(|v| v.trim() == "1").unwrap_or(false) {
            self.telemetry.trace_mode = true;
        }
    }

    /// Check values that would fail at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.secret.trim().is_empty() {
            return Err(Error::Config(format!(
                "secret is empty (set it in the config or {})",
                ENV_SECRET
            )));
        }
        IpAllowlist::from_entries(&self.ip_allowlist)?;
        if self.telemetry.sweep_interval_secs == 0 {
            return Err(Error::Config("telemetry.sweep_interval_secs must be > 0".into()));
        }
        if self.telemetry.retention_months == 0 {
            return Err(Error::Config("telemetry.retention_months must be > 0".into()));
        }
        if self.telemetry.mode == TelemetryMode::Memory && self.telemetry.max_clients == 0 {
            return Err(Error::Config("telemetry.max_clients must be > 0".into()));
        }
        for name in &self.extra_crawler_agents {
            if name.trim().is_empty() {
                return Err(Error::Config("extra_crawler_agents contains a blank entry".into()));
            }
        }
        for (field, name) in [
            ("identity", &self.cookies.identity),
            ("token", &self.cookies.token),
            ("raw_ip", &self.cookies.raw_ip),
            ("hidden_categories", &self.cookies.hidden_categories),
            ("safe_mode", &self.cookies.safe_mode),
        ] {
            if name.trim().is_empty() {
                return Err(Error::Config(format!("cookies.{} is empty", field)));
            }
        }
        Ok(())
    }

    /// Report region patterns that would never match because they fail to compile.
    pub fn invalid_patterns<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        patterns
            .into_iter()
            .filter(|p| !p.trim().is_empty() && PatternCache::validate(p).is_err())
            .map(|p| p.to_string())
            .collect()
    }
}
