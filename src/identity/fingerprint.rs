//! Request fingerprint construction.

use std::fmt;
use std::net::IpAddr;

use crate::geo::LocationDescriptor;
use crate::request::Visitor;

/// Separator between fingerprint fields.
pub const FIELD_SEPARATOR: &str = "|";

/// Composite text region patterns are matched against.
///
/// Built once per request and never persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fingerprint {
    text: String,
    switched_from: Option<IpAddr>,
}

impl Fingerprint {
    /// Build the base fingerprint: location + coordinate, referer, user-agent and
    /// every header whose name starts with one of `proxy_prefixes`.
    pub fn build(location: &LocationDescriptor, visitor: &Visitor, proxy_prefixes: &[String]) -> Self {
        let mut fields: Vec<String> = Vec::with_capacity(4);
        fields.push(format!("{}{}", location, location.coordinate));
        fields.push(visitor.referer().to_string());
        fields.push(visitor.user_agent().to_string());

        let proxied: Vec<&str> = visitor
            .headers()
            .iter()
            .filter(|(name, _)| {
                proxy_prefixes
                    .iter()
                    .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
            })
            .map(|(_, value)| value.as_str())
            .collect();
        fields.push(proxied.join(FIELD_SEPARATOR));

        Self {
            text: fields.join(FIELD_SEPARATOR),
            switched_from: None,
        }
    }

    /// Widen with the location of a declared IP that differs from the network IP.
    pub fn widen(mut self, declared: IpAddr, declared_location: &LocationDescriptor) -> Self {
        self.text.push_str(FIELD_SEPARATOR);
        self.text.push_str(&declared_location.to_string());
        self.switched_from = Some(declared);
        self
    }

    /// Fingerprint text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Declared original IP when an IP switch was detected.
    pub fn switched_from(&self) -> Option<IpAddr> {
        self.switched_from
    }

    /// Whether an IP switch was detected.
    pub fn is_switched(&self) -> bool {
        self.switched_from.is_some()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.text
    }
}
