//! IP geolocation.
//!
//! Every locator follows the same fallback-on-miss contract: unknown, private
//! or malformed addresses resolve to an empty [`LocationDescriptor`] and a
//! lookup never fails the caller.

mod cache;
mod manager;
mod maxmind;
mod table;

pub use cache::{CachedLocator, DEFAULT_LOCATION_CACHE_CAPACITY};
pub use manager::{DatabaseStamp, GeoDatabaseManager, DEFAULT_GEOIP_UPDATE_INTERVAL, DEFAULT_GEOIP_URL};
pub use maxmind::MaxMindLocator;
pub use table::StaticLocator;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved location of an IP address.
///
/// Treated as immutable value data; cheap to clone and safe to share.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationDescriptor {
    /// Country name (localized)
    #[serde(default)]
    pub country: String,
    /// ISO 3166-1 alpha-2 country code
    #[serde(default)]
    pub country_code: String,
    /// City name
    #[serde(default)]
    pub city: String,
    /// Network operator / ASN organisation
    #[serde(default)]
    pub network: String,
    /// `latitude,longitude`, empty when unknown
    #[serde(default)]
    pub coordinate: String,
    /// Human-readable address, `|`-separated from broad to narrow
    #[serde(default)]
    pub address: String,
}

impl LocationDescriptor {
    /// Check whether nothing is known about this location.
    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
            && self.country.is_empty()
            && self.city.is_empty()
            && self.network.is_empty()
            && self.coordinate.is_empty()
    }

    /// Build the address from its parts, skipping empty ones.
    pub fn compose_address(parts: &[&str]) -> String {
        parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Format a coordinate pair.
    pub fn format_coordinate(latitude: Option<f64>, longitude: Option<f64>) -> String {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => format!("{:.4},{:.4}", lat, lon),
            _ => String::new(),
        }
    }
}

impl fmt::Display for LocationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = if self.address.is_empty() {
            Self::compose_address(&[&self.country, &self.country_code, &self.city])
        } else {
            self.address.clone()
        };
        match (address.is_empty(), self.network.is_empty()) {
            (false, false) => write!(f, "{} {}", address, self.network),
            (false, true) => write!(f, "{}", address),
            (true, false) => write!(f, "{}", self.network),
            (true, true) => Ok(()),
        }
    }
}

/// GeoLocator resolves a raw IP string to a location.
pub trait GeoLocator: Send + Sync {
    /// Resolve `ip`; returns an empty descriptor when the address is unknown.
    fn resolve(&self, ip: &str) -> LocationDescriptor;
}

/// Locator that knows nothing; every lookup is a miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLocator;

impl GeoLocator for NullLocator {
    fn resolve(&self, _ip: &str) -> LocationDescriptor {
        LocationDescriptor::default()
    }
}

impl<L: GeoLocator + ?Sized> GeoLocator for std::sync::Arc<L> {
    fn resolve(&self, ip: &str) -> LocationDescriptor {
        (**self).resolve(ip)
    }
}
