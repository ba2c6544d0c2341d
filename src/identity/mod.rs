//! Visitor identity signals.
//!
//! The fingerprint combines the resolved location with request headers. When a
//! visitor carries an authentic raw-IP cookie naming a different address than
//! the network layer reports, the fingerprint is widened with that address's
//! location and the switch is flagged for auditing.

mod codec;
mod fingerprint;

pub use codec::CookieCodec;
pub use fingerprint::{Fingerprint, FIELD_SEPARATOR};

use std::net::IpAddr;
use std::sync::Arc;

use crate::geo::{GeoLocator, LocationDescriptor};
use crate::request::Visitor;

/// Default cookie carrying the client-declared original IP.
pub const DEFAULT_RAW_IP_COOKIE: &str = "rawip";

/// Default header prefixes treated as proxy/CDN annotations.
pub fn default_proxy_prefixes() -> Vec<String> {
    vec!["cf-".to_string()]
}

/// SpoofDetector reconciles the raw-IP cookie with the network-layer IP.
#[derive(Debug, Clone)]
pub struct SpoofDetector {
    codec: Arc<CookieCodec>,
    cookie_name: String,
}

impl SpoofDetector {
    /// Create a detector reading `cookie_name`.
    pub fn new(codec: Arc<CookieCodec>, cookie_name: impl Into<String>) -> Self {
        Self {
            codec,
            cookie_name: cookie_name.into(),
        }
    }

    /// Authentic declared IP from the raw-IP cookie, if any.
    pub fn declared_ip(&self, visitor: &Visitor) -> Option<IpAddr> {
        visitor
            .cookie(&self.cookie_name)
            .and_then(|value| self.codec.decode_ip(value))
    }

    /// The declared IP when it differs from the network IP.
    pub fn switched_from(&self, visitor: &Visitor) -> Option<IpAddr> {
        self.declared_ip(visitor).filter(|declared| *declared != visitor.ip)
    }
}

/// IdentitySignal builds request fingerprints.
pub struct IdentitySignal {
    locator: Arc<dyn GeoLocator>,
    detector: SpoofDetector,
    proxy_prefixes: Vec<String>,
}

impl IdentitySignal {
    /// Create a fingerprint builder.
    ///
    /// Prefixes are matched against lowercased header names.
    pub fn new(
        locator: Arc<dyn GeoLocator>,
        detector: SpoofDetector,
        proxy_prefixes: Vec<String>,
    ) -> Self {
        let proxy_prefixes = proxy_prefixes
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            locator,
            detector,
            proxy_prefixes,
        }
    }

    /// The locator used for fingerprints.
    pub fn locator(&self) -> &Arc<dyn GeoLocator> {
        &self.locator
    }

    /// The spoof detector.
    pub fn detector(&self) -> &SpoofDetector {
        &self.detector
    }

    /// Build the (possibly widened) fingerprint for `visitor`.
    pub fn build_fingerprint(&self, visitor: &Visitor) -> Fingerprint {
        let location = self.locator.resolve(&visitor.ip_string());
        self.fingerprint_at(visitor, &location)
    }

    /// Build the fingerprint from an already resolved network-IP location.
    pub fn fingerprint_at(&self, visitor: &Visitor, location: &LocationDescriptor) -> Fingerprint {
        let fingerprint = Fingerprint::build(location, visitor, &self.proxy_prefixes);

        match self.detector.switched_from(visitor) {
            Some(declared) => {
                let declared_location = self.locator.resolve(&declared.to_string());
                log::debug!("IP switch detected: {} declared {}", visitor.ip, declared);
                fingerprint.widen(declared, &declared_location)
            }
            None => fingerprint,
        }
    }
}
