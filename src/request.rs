//! Framework-neutral view of an incoming request.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Identity/session information for the current caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Whether the caller is a site administrator
    pub is_admin: bool,
}

/// SessionStore supplies the session of the current caller.
///
/// An absent session means an anonymous, non-admin caller.
pub trait SessionStore: Send + Sync {
    /// Look up a session by id.
    fn current(&self, session_id: &str) -> Option<Session>;
}

impl<F> SessionStore for F
where
    F: Fn(&str) -> Option<Session> + Send + Sync,
{
    fn current(&self, session_id: &str) -> Option<Session> {
        self(session_id)
    }
}

/// Visitor carries everything the gate needs to know about one request.
#[derive(Debug, Clone)]
pub struct Visitor {
    /// Network-layer client address
    pub ip: IpAddr,
    /// Host header value
    pub host: String,
    /// Request path (with query)
    pub path: String,
    /// HTTP protocol version string, e.g. `HTTP/1.1`
    pub protocol: String,
    /// Request headers in arrival order, names lowercased
    headers: Vec<(String, String)>,
    cookies: AHashMap<String, String>,
    session: Option<Session>,
}

impl Visitor {
    /// Create a visitor for a network-layer address.
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            host: String::new(),
            path: "/".to_string(),
            protocol: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            cookies: AHashMap::new(),
            session: None,
        }
    }

    /// Set host and path.
    pub fn with_url(mut self, host: impl Into<String>, path: impl Into<String>) -> Self {
        self.host = host.into();
        self.path = path.into();
        self
    }

    /// Set the protocol string.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Add a header. A `cookie` header is also parsed into the cookie jar.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_lowercase();
        let value = value.into();
        if name == "cookie" {
            self.cookies.extend(parse_cookie_header(&value));
        }
        self.headers.push((name, value));
        self
    }

    /// Add a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Attach the caller's session.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// First header value with `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All headers, names lowercased.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Cookie value by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|v| v.as_str())
    }

    /// `referer` header, empty when absent.
    pub fn referer(&self) -> &str {
        self.header("referer").unwrap_or_default()
    }

    /// `user-agent` header, empty when absent.
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or_default()
    }

    /// Caller session; anonymous callers get the non-admin default.
    pub fn session(&self) -> Session {
        self.session.unwrap_or_default()
    }

    /// Network-layer IP as a string.
    pub fn ip_string(&self) -> String {
        self.ip.to_string()
    }

    /// Scheme-less URL of the request, `//host/path`.
    pub fn url(&self) -> String {
        let path = self.path.trim_start_matches('/');
        format!("//{}/{}", self.host, path)
    }

    /// Headers as a JSON object (repeated names joined with `, `).
    pub fn headers_json(&self) -> String {
        let mut map: serde_json::Map<String, serde_json::Value> = serde_json::Map::new();
        for (name, value) in &self.headers {
            match map.get_mut(name) {
                Some(serde_json::Value::String(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                _ => {
                    map.insert(name.clone(), serde_json::Value::String(value.clone()));
                }
            }
        }
        serde_json::json!({
            "protocol": self.protocol,
            "headers": map,
        })
        .to_string()
    }
}

/// Parse a `Cookie:` header value into name/value pairs.
pub fn parse_cookie_header(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor() -> Visitor {
        Visitor::new("203.0.113.7".parse().unwrap())
    }

    #[test]
    fn test_headers_case_insensitive() {
        let v = visitor()
            .with_header("User-Agent", "Mozilla/5.0")
            .with_header("Referer", "https://example.com/");
        assert_eq!(v.user_agent(), "Mozilla/5.0");
        assert_eq!(v.header("USER-AGENT"), Some("Mozilla/5.0"));
        assert_eq!(v.referer(), "https://example.com/");
        assert_eq!(v.header("x-missing"), None);
    }

    #[test]
    fn test_cookie_header_parsed() {
        let v = visitor().with_header("Cookie", "Email=a@b.c; Nsfw=0;broken; =x");
        assert_eq!(v.cookie("Email"), Some("a@b.c"));
        assert_eq!(v.cookie("Nsfw"), Some("0"));
        assert_eq!(v.cookie("broken"), None);
    }

    #[test]
    fn test_closure_session_store() {
        let mut sessions: AHashMap<String, Session> = AHashMap::new();
        sessions.insert("sid-1".into(), Session { is_admin: true });
        let lookup = move |id: &str| sessions.get(id).copied();
        let store: &dyn SessionStore = &lookup;
        assert_eq!(store.current("sid-1"), Some(Session { is_admin: true }));
        assert_eq!(store.current("sid-2"), None);
    }

    #[test]
    fn test_default_session_is_anonymous() {
        assert!(!visitor().session().is_admin);
        assert!(visitor().with_session(Session { is_admin: true }).session().is_admin);
    }

    #[test]
    fn test_url() {
        let v = visitor().with_url("blog.example.com", "/42");
        assert_eq!(v.url(), "//blog.example.com/42");
    }

    #[test]
    fn test_headers_json() {
        let v = visitor()
            .with_header("Accept", "text/html")
            .with_header("accept", "application/json");
        let json: serde_json::Value = serde_json::from_str(&v.headers_json()).unwrap();
        assert_eq!(json["protocol"], "HTTP/1.1");
        assert_eq!(json["headers"]["accept"], "text/html, application/json");
    }
}
