//! Fixed address-table locator.

use ahash::AHashMap;
use ipnet::IpNet;
use parking_lot::RwLock;
use std::net::IpAddr;

use super::{GeoLocator, LocationDescriptor};
use crate::error::{Error, Result};

/// StaticLocator resolves addresses from an in-memory table of exact IPs and CIDR ranges.
///
/// Exact entries win over ranges; among ranges the longest prefix wins.
///
/// # Examples
/// ```
/// use regionwall::geo::{GeoLocator, LocationDescriptor, StaticLocator};
///
/// let locator = StaticLocator::new();
/// locator
///     .add("1.2.0.0/16", LocationDescriptor { country_code: "CN".into(), ..Default::default() })
///     .unwrap();
/// assert_eq!(locator.resolve("1.2.3.4").country_code, "CN");
/// assert!(locator.resolve("9.9.9.9").is_empty());
/// ```
#[derive(Default)]
pub struct StaticLocator {
    exact: RwLock<AHashMap<IpAddr, LocationDescriptor>>,
    ranges: RwLock<Vec<(IpNet, LocationDescriptor)>>,
}

impl StaticLocator {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table pre-populated with loopback, private and link-local ranges.
    pub fn with_private_networks() -> Self {
        let locator = Self::new();
        let lan = LocationDescriptor {
            address: "LAN".to_string(),
            network: "private".to_string(),
            ..Default::default()
        };
        for cidr in [
            "127.0.0.0/8",
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "169.254.0.0/16",
            "::1/128",
            "fc00::/7",
            "fe80::/10",
        ] {
            // Static literals, always valid
            let _ = locator.add(cidr, lan.clone());
        }
        locator
    }

    /// Add an exact IP (`1.2.3.4`) or CIDR range (`1.2.0.0/16`).
    pub fn add(&self, pattern: &str, location: LocationDescriptor) -> Result<()> {
        let pattern = pattern.trim();

        if let Ok(ip) = pattern.parse::<IpAddr>() {
            self.exact.write().insert(ip, location);
            return Ok(());
        }

        let net = pattern
            .parse::<IpNet>()
            .map_err(|_| Error::InvalidCidrPattern(pattern.to_string()))?;
        let mut ranges = self.ranges.write();
        // Keep longest prefix first so the first hit is the most specific
        let pos = ranges
            .iter()
            .position(|(n, _)| n.prefix_len() < net.prefix_len())
            .unwrap_or(ranges.len());
        ranges.insert(pos, (net.trunc(), location));
        Ok(())
    }

    /// Number of exact and range entries.
    pub fn len(&self) -> usize {
        self.exact.read().len() + self.ranges.read().len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GeoLocator for StaticLocator {
    fn resolve(&self, ip: &str) -> LocationDescriptor {
        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            return LocationDescriptor::default();
        };

        if let Some(loc) = self.exact.read().get(&addr) {
            return loc.clone();
        }

        self.ranges
            .read()
            .iter()
            .find(|(net, _)| net.contains(&addr))
            .map(|(_, loc)| loc.clone())
            .unwrap_or_default()
    }
}
