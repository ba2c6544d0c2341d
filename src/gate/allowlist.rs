//! Trusted IP allowlist.

use ahash::AHashSet;
use ipnet::{Ipv4Net, Ipv6Net};
use parking_lot::RwLock;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::AllowlistError;

/// IpAllowlist holds exact addresses and CIDR ranges that bypass region rules.
///
/// # Examples
/// ```
/// use regionwall::gate::IpAllowlist;
///
/// let list = IpAllowlist::new();
/// list.add("203.0.113.9").unwrap();
/// list.add("10.0.0.0/8").unwrap();
/// assert!(list.contains(&"10.20.30.40".parse().unwrap()));
/// assert!(!list.contains(&"8.8.8.8".parse().unwrap()));
/// ```
#[derive(Default)]
pub struct IpAllowlist {
    exact: RwLock<AHashSet<IpAddr>>,
    /// IPv4 ranges, sorted by network address
    v4_cidrs: RwLock<Vec<Ipv4Net>>,
    /// IPv6 ranges, sorted by network address
    v6_cidrs: RwLock<Vec<Ipv6Net>>,
}

impl IpAllowlist {
    /// Create an empty allowlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an allowlist from entries; the first invalid entry is an error.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, AllowlistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = Self::new();
        for entry in entries {
            list.add(entry.as_ref())?;
        }
        Ok(list)
    }

    /// Add an exact IP or a CIDR range. Blank entries are ignored.
    pub fn add(&self, pattern: &str) -> Result<(), AllowlistError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(());
        }

        if let Ok(ip) = pattern.parse::<IpAddr>() {
            self.exact.write().insert(ip);
            return Ok(());
        }

        if let Ok(v4net) = pattern.parse::<Ipv4Net>() {
            let v4net = v4net.trunc();
            let mut cidrs = self.v4_cidrs.write();
            let pos = cidrs
                .binary_search_by_key(&v4net.network(), |n| n.network())
                .unwrap_or_else(|e| e);
            cidrs.insert(pos, v4net);
            return Ok(());
        }

        if let Ok(v6net) = pattern.parse::<Ipv6Net>() {
            let v6net = v6net.trunc();
            let mut cidrs = self.v6_cidrs.write();
            let pos = cidrs
                .binary_search_by_key(&v6net.network(), |n| n.network())
                .unwrap_or_else(|e| e);
            cidrs.insert(pos, v6net);
            return Ok(());
        }

        Err(AllowlistError::InvalidEntry(pattern.to_string()))
    }

    fn contains_v4(&self, ip: Ipv4Addr) -> bool {
        self.v4_cidrs.read().iter().any(|cidr| cidr.contains(&ip))
    }

    fn contains_v6(&self, ip: Ipv6Addr) -> bool {
        self.v6_cidrs.read().iter().any(|cidr| cidr.contains(&ip))
    }

    /// Check whether `ip` is allowlisted.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        if self.exact.read().contains(ip) {
            return true;
        }
        match ip {
            IpAddr::V4(v4) => self.contains_v4(*v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.exact.read().contains(&IpAddr::V4(v4)) || self.contains_v4(v4),
                None => self.contains_v6(*v6),
            },
        }
    }

    /// Number of exact entries plus ranges.
    pub fn len(&self) -> usize {
        self.exact.read().len() + self.v4_cidrs.read().len() + self.v6_cidrs.read().len()
    }

    /// Check if the allowlist is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.exact.write().clear();
        self.v4_cidrs.write().clear();
        self.v6_cidrs.write().clear();
    }
}
