//! MaxMind `.mmdb` backed locator.

use arc_swap::ArcSwapOption;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use super::{GeoLocator, LocationDescriptor};
use crate::error::{Error, Result};

type Reader = maxminddb::Reader<Vec<u8>>;

#[derive(Deserialize)]
struct NamedRecord {
    iso_code: Option<String>,
    names: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
struct LocationRecord {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Deserialize)]
struct CityResponse {
    country: Option<NamedRecord>,
    subdivisions: Option<Vec<NamedRecord>>,
    city: Option<NamedRecord>,
    location: Option<LocationRecord>,
}

#[derive(Deserialize)]
struct AsnResponse {
    autonomous_system_number: Option<u32>,
    autonomous_system_organization: Option<String>,
}

/// MaxMindLocator resolves addresses with GeoLite2-City (and optionally ASN) databases.
///
/// Both readers can be hot-reloaded; in-flight lookups finish on the old reader.
///
/// # Examples
/// ```ignore
/// use regionwall::geo::{GeoLocator, MaxMindLocator};
/// use std::path::Path;
///
/// let locator = MaxMindLocator::open(Path::new("GeoLite2-City.mmdb"))?;
/// let location = locator.resolve("8.8.8.8");
/// println!("{}", location);
/// ```
pub struct MaxMindLocator {
    city: ArcSwapOption<Reader>,
    asn: ArcSwapOption<Reader>,
    language: String,
}

impl Default for MaxMindLocator {
    fn default() -> Self {
        Self::empty()
    }
}

impl MaxMindLocator {
    /// Create a locator with no database loaded; every lookup misses.
    pub fn empty() -> Self {
        Self {
            city: ArcSwapOption::empty(),
            asn: ArcSwapOption::empty(),
            language: "en".to_string(),
        }
    }

    /// Open a City database from a file path.
    pub fn open(path: &Path) -> Result<Self> {
        let locator = Self::empty();
        locator.reload_city(path)?;
        Ok(locator)
    }

    /// Create from City database bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let reader = Reader::from_source(data).map_err(|e| Error::GeoIp(e.to_string()))?;
        let locator = Self::empty();
        locator.city.store(Some(Arc::new(reader)));
        Ok(locator)
    }

    /// Set the preferred name language (e.g. `"zh-CN"`); English is the fallback.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Attach an ASN database used to fill in the network operator.
    pub fn with_asn_database(self, path: &Path) -> Result<Self> {
        self.reload_asn(path)?;
        Ok(self)
    }

    /// Atomically replace the City database.
    pub fn reload_city(&self, path: &Path) -> Result<()> {
        let reader = Reader::open_readfile(path).map_err(|e| Error::GeoIp(e.to_string()))?;
        self.city.store(Some(Arc::new(reader)));
        log::info!("Loaded GeoIP city database from {:?}", path);
        Ok(())
    }

    /// Atomically replace the ASN database.
    pub fn reload_asn(&self, path: &Path) -> Result<()> {
        let reader = Reader::open_readfile(path).map_err(|e| Error::GeoIp(e.to_string()))?;
        self.asn.store(Some(Arc::new(reader)));
        log::info!("Loaded GeoIP ASN database from {:?}", path);
        Ok(())
    }

    /// Whether a City database is loaded.
    pub fn is_loaded(&self) -> bool {
        self.city.load().is_some()
    }

    fn localized(&self, names: &Option<BTreeMap<String, String>>) -> String {
        names
            .as_ref()
            .and_then(|n| n.get(&self.language).or_else(|| n.get("en")))
            .cloned()
            .unwrap_or_default()
    }

    fn lookup_network(&self, ip: IpAddr) -> String {
        let guard = self.asn.load();
        let Some(reader) = &*guard else {
            return String::new();
        };
        match reader.lookup::<AsnResponse>(ip) {
            Ok(asn) => match (asn.autonomous_system_number, asn.autonomous_system_organization) {
                (Some(number), Some(org)) => format!("AS{} {}", number, org),
                (None, Some(org)) => org,
                (Some(number), None) => format!("AS{}", number),
                (None, None) => String::new(),
            },
            Err(_) => String::new(),
        }
    }
}

impl GeoLocator for MaxMindLocator {
    fn resolve(&self, ip: &str) -> LocationDescriptor {
        let Ok(addr) = ip.trim().parse::<IpAddr>() else {
            return LocationDescriptor::default();
        };

        let guard = self.city.load();
        let Some(reader) = &*guard else {
            return LocationDescriptor::default();
        };

        let response: CityResponse = match reader.lookup(addr) {
            Ok(r) => r,
            Err(e) => {
                log::debug!("GeoIP miss for {}: {}", addr, e);
                return LocationDescriptor {
                    network: self.lookup_network(addr),
                    ..Default::default()
                };
            }
        };

        let (country, country_code) = match &response.country {
            Some(c) => (self.localized(&c.names), c.iso_code.clone().unwrap_or_default()),
            None => (String::new(), String::new()),
        };
        let region = response
            .subdivisions
            .as_ref()
            .and_then(|s| s.first())
            .map(|s| self.localized(&s.names))
            .unwrap_or_default();
        let city = response
            .city
            .as_ref()
            .map(|c| self.localized(&c.names))
            .unwrap_or_default();
        let coordinate = response
            .location
            .as_ref()
            .map(|l| LocationDescriptor::format_coordinate(l.latitude, l.longitude))
            .unwrap_or_default();

        LocationDescriptor {
            address: LocationDescriptor::compose_address(&[&country, &country_code, &region, &city]),
            country,
            country_code,
            city,
            network: self.lookup_network(addr),
            coordinate,
        }
    }
}
