//! Error types for regionwall.

use thiserror::Error;

/// Error type for regionwall operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid CIDR pattern
    #[error("invalid CIDR pattern: {0}")]
    InvalidCidrPattern(String),

    /// Invalid IP address
    #[error("invalid IP address: {0}")]
    InvalidIpAddress(String),

    /// Invalid region mode
    #[error("invalid region mode: {0}")]
    InvalidRegionMode(String),

    /// GeoIP database error
    #[error("GeoIP error: {0}")]
    GeoIp(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend error
    #[error("storage error: {0}")]
    Storage(String),

    /// Download error
    #[error("download error: {0}")]
    Download(String),
}

/// Result type alias for regionwall operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The only failure surfaced across the content-access boundary.
///
/// Denied access and missing content are deliberately the same variant so a
/// caller cannot probe which items exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Content not found (or not visible to this visitor)
    #[error("content not found")]
    NotFound,
}

/// Error type for cookie codec operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Cookie value is not `payload.tag`
    #[error("malformed cookie value")]
    Malformed,

    /// Base64 decoding failed
    #[error("invalid base64 in cookie value")]
    InvalidEncoding,

    /// HMAC tag did not verify
    #[error("cookie signature mismatch")]
    SignatureMismatch,

    /// Decoded payload is not an IP address
    #[error("invalid IP address in cookie: {0}")]
    InvalidIp(String),
}

/// Error type for allowlist operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllowlistError {
    /// Neither an IP address nor CIDR notation
    #[error("invalid allowlist entry (expected IP or CIDR): {0}")]
    InvalidEntry(String),
}

impl From<AllowlistError> for Error {
    fn from(e: AllowlistError) -> Self {
        Error::Config(e.to_string())
    }
}
