//! Regionwall - region-aware content gating for web applications.
//!
//! This crate decides, per request, whether a visitor may view a piece of
//! content, and records suspicious or excessive access for later review.
//!
//! # Features
//!
//! - **Region policies**: Per-item allow/forbid regex patterns evaluated against a
//!   request fingerprint (location, referer, user agent, proxy headers)
//! - **IP switch detection**: A signed cookie carrying the visitor's original IP
//!   widens the fingerprint and is flagged in audit rows
//! - **Bypass rules**: Administrators, trusted-visitor tokens, search-engine
//!   crawlers and allowlisted IPs/CIDRs
//! - **Intercept auditing**: Denials are persisted for operator review
//! - **Request telemetry**: No-op, in-memory per-IP aggregates, or a durable queue
//!   flushed by a background sweeper with 6-month retention
//! - **GeoIP**: MaxMind City/ASN lookups with hot reload and an LRU cache
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use regionwall::config::GateConfig;
//! use regionwall::geo::{LocationDescriptor, StaticLocator};
//! use regionwall::store::MemoryStore;
//! use regionwall::{AccessError, AccessGate, ContentItem, ContentVisibility, Visitor};
//!
//! let locator = StaticLocator::new();
//! locator
//!     .add("1.2.0.0/16", LocationDescriptor { address: "China|CN".into(), ..Default::default() })
//!     .unwrap();
//!
//! let config = GateConfig { secret: "s3cret".into(), ..Default::default() };
//! let gate = AccessGate::new(&config, Arc::new(locator), Arc::new(MemoryStore::new())).unwrap();
//!
//! let visitor = Visitor::new("1.2.3.4".parse().unwrap()).with_url("blog.example.com", "/42");
//! let ctx = gate.context(&visitor);
//! let item = ContentItem::new(42, 1).with_visibility(ContentVisibility::forbid("CN"));
//! assert_eq!(gate.check_single(&ctx, &item), Err(AccessError::NotFound));
//! ```
//!
//! # Region Modes
//!
//! - **Unrestricted**: Everyone may view
//! - **SearchEngineOnly**: Only crawlers (and bypassing visitors) may view
//! - **AllowRegion**: Allowed iff the fingerprint matches the allow pattern
//! - **ForbidRegion**: Denied iff the fingerprint matches the forbid pattern
//! - **AllowRegionExceptForbidRegion**: Allow pattern matches and forbid pattern does not
//! - **ForbidRegionExceptAllowRegion**: Allow pattern match wins; otherwise forbid rule
//!
//! An empty or invalid pattern never matches.

mod decision;
mod error;
mod visibility;

pub mod audit;
pub mod config;
pub mod content;
pub mod gate;
pub mod geo;
pub mod identity;
pub mod policy;
pub mod request;
pub mod store;
pub mod telemetry;

// Re-export core types
pub use decision::Decision;
pub use error::{AccessError, AllowlistError, CodecError, Error, Result};
pub use visibility::{ContentVisibility, RegionMode};

// Re-export the main entry points
pub use audit::{InterceptLog, InterceptReporter, IpReportLog};
pub use config::GateConfig;
pub use content::{ContentItem, ContentStatus, ContentStore, MemoryContentStore};
pub use gate::{AccessGate, ContentFilter, VisitorContext};
pub use geo::{GeoLocator, LocationDescriptor};
pub use identity::{CookieCodec, Fingerprint};
pub use policy::RegionPolicy;
pub use request::{Session, SessionStore, Visitor};
pub use telemetry::{RequestLogger, RetentionSweeper, TelemetryMode};
