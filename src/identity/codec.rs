//! Signed cookie values.
//!
//! Values are `base64url(payload) "." base64url(HMAC-SHA256(payload))`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;

use crate::error::{CodecError, Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// CookieCodec signs and verifies the cookies the gate trusts.
#[derive(Clone)]
pub struct CookieCodec {
    mac: HmacSha256,
}

impl std::fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCodec").finish_non_exhaustive()
    }
}

impl CookieCodec {
    /// Create a codec keyed with `secret`.
    pub fn new(secret: &str) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| Error::Config(format!("invalid cookie secret: {}", e)))?;
        Ok(Self { mac })
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    fn verify(&self, payload: &[u8], tag: &[u8]) -> bool {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(tag).is_ok()
    }

    /// Encode a declared client IP for the raw-IP cookie.
    pub fn encode_ip(&self, ip: &IpAddr) -> String {
        let payload = ip.to_string();
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()))
        )
    }

    /// Decode and authenticate a raw-IP cookie value.
    pub fn try_decode_ip(&self, value: &str) -> std::result::Result<IpAddr, CodecError> {
        let (payload_b64, tag_b64) = value.trim().split_once('.').ok_or(CodecError::Malformed)?;
        if payload_b64.is_empty() || tag_b64.is_empty() {
            return Err(CodecError::Malformed);
        }
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64.as_bytes())
            .map_err(|_| CodecError::InvalidEncoding)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64.as_bytes())
            .map_err(|_| CodecError::InvalidEncoding)?;
        if !self.verify(&payload, &tag) {
            return Err(CodecError::SignatureMismatch);
        }
        let text = String::from_utf8_lossy(&payload);
        text.parse::<IpAddr>()
            .map_err(|_| CodecError::InvalidIp(text.into_owned()))
    }

    /// Decode a raw-IP cookie value; anything malformed or forged is `None`.
    pub fn decode_ip(&self, value: &str) -> Option<IpAddr> {
        match self.try_decode_ip(value) {
            Ok(ip) => Some(ip),
            Err(e) => {
                log::debug!("Ignoring raw-IP cookie: {}", e);
                None
            }
        }
    }

    /// Trusted-visitor token for an identity cookie value.
    pub fn visitor_token(&self, identity: &str) -> String {
        URL_SAFE_NO_PAD.encode(self.sign(identity.as_bytes()))
    }

    /// Check a token cookie against the identity cookie. Missing either side is invalid.
    pub fn verify_visitor_token(&self, identity: Option<&str>, token: Option<&str>) -> bool {
        let (Some(identity), Some(token)) = (identity, token) else {
            return false;
        };
        if identity.is_empty() {
            return false;
        }
        match URL_SAFE_NO_PAD.decode(token.trim().as_bytes()) {
            Ok(tag) => self.verify(identity.as_bytes(), &tag),
            Err(_) => false,
        }
    }
}
