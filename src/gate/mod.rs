//! Content access gate.
//!
//! Two entry points share one [`VisitorContext`] per request:
//!
//! - [`AccessGate::filter_predicate`] narrows listings to what the visitor may see.
//! - [`AccessGate::check_single`] guards one item and audits denials.
//!
//! Bypass order for a single item: admin, trusted-visitor token, crawler,
//! allowlisted IP. Denials always surface as [`AccessError::NotFound`].

mod allowlist;
mod crawler;

pub use allowlist::IpAllowlist;
pub use crawler::{is_known_crawler, CrawlerDetector, KNOWN_CRAWLERS};

use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditStore, DenyReason, InterceptEvent, InterceptReporter};
use crate::config::{CookieNames, GateConfig};
use crate::content::{ContentItem, ContentPredicate, ContentStatus, ContentStore};
use crate::error::{AccessError, Result};
use crate::geo::{GeoLocator, LocationDescriptor};
use crate::identity::{CookieCodec, Fingerprint, IdentitySignal, SpoofDetector};
use crate::policy::RegionPolicy;
use crate::request::{Session, SessionStore, Visitor};
use crate::visibility::RegionMode;

/// Parse the hidden-categories cookie (`"3,7,12"`); malformed entries are ignored.
pub fn parse_hidden_categories(value: Option<&str>) -> Vec<u32> {
    let Some(value) = value else {
        return Vec::new();
    };
    let mut ids: Vec<u32> = value
        .split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Safe mode is on unless the cookie is present with a value other than `"1"`.
pub fn safe_mode_enabled(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => v.trim() == "1",
    }
}

/// Per-request facts shared by both gate entry points.
#[derive(Debug, Clone)]
pub struct VisitorContext<'v> {
    visitor: &'v Visitor,
    /// Caller is an administrator
    pub is_admin: bool,
    /// User agent is a known search-engine crawler
    pub is_crawler: bool,
    /// Caller presented a valid trusted-visitor token
    pub trusted_token: bool,
    /// Network IP is allowlisted
    pub allowlisted: bool,
    /// Safe mode is on
    pub safe_mode: bool,
    /// Category ids the visitor chose to hide
    pub hidden_categories: Vec<u32>,
    location: LocationDescriptor,
    fingerprint: Option<Fingerprint>,
}

impl<'v> VisitorContext<'v> {
    /// The visitor this context describes.
    pub fn visitor(&self) -> &'v Visitor {
        self.visitor
    }

    /// Resolved location of the network IP (empty when region rules are bypassed).
    pub fn location(&self) -> &LocationDescriptor {
        &self.location
    }

    /// Fingerprint, computed only when region rules apply.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Whether region rules are bypassed.
    ///
    /// Single-item checks skip every rule; listings still apply category and
    /// safe-mode filters unless [`sees_everything`](Self::sees_everything).
    pub fn bypasses_all(&self) -> bool {
        self.is_admin || self.trusted_token || self.is_crawler || self.allowlisted
    }

    /// Whether listings skip filtering entirely.
    pub fn sees_everything(&self) -> bool {
        self.is_admin || self.is_crawler
    }

    fn is_hidden(&self, item: &ContentItem) -> bool {
        self.hidden_categories.binary_search(&item.category_id).is_ok()
    }

    fn is_suppressed(&self, item: &ContentItem) -> bool {
        self.safe_mode && item.is_sensitive
    }
}

/// Listing predicate produced by [`AccessGate::filter_predicate`].
pub struct ContentFilter<'a> {
    match_all: bool,
    ctx: Option<&'a VisitorContext<'a>>,
    policy: Option<&'a RegionPolicy>,
}

impl<'a> ContentFilter<'a> {
    /// Predicate that accepts every item.
    pub fn match_all() -> Self {
        Self {
            match_all: true,
            ctx: None,
            policy: None,
        }
    }

    /// Whether this predicate accepts everything.
    pub fn is_match_all(&self) -> bool {
        self.match_all
    }

    /// Whether `item` is listed for this visitor.
    pub fn matches(&self, item: &ContentItem) -> bool {
        if self.match_all {
            return true;
        }
        let Some(ctx) = self.ctx else {
            return true;
        };

        if item.status != ContentStatus::Published || item.mode() == RegionMode::SearchEngineOnly {
            return false;
        }
        if ctx.is_hidden(item) || ctx.is_suppressed(item) {
            return false;
        }
        match (self.policy, ctx.fingerprint()) {
            (Some(policy), Some(fp)) => policy
                .evaluate_optional(fp.text(), item.visibility.as_ref())
                .is_allow(),
            _ => true,
        }
    }

    /// Keep the accepted items, preserving order.
    pub fn apply<I>(&self, items: I) -> Vec<ContentItem>
    where
        I: IntoIterator<Item = ContentItem>,
    {
        items.into_iter().filter(|item| self.matches(item)).collect()
    }
}

impl ContentPredicate for ContentFilter<'_> {
    fn matches(&self, item: &ContentItem) -> bool {
        ContentFilter::matches(self, item)
    }
}

/// AccessGate decides what a visitor may see.
pub struct AccessGate {
    policy: RegionPolicy,
    identity: IdentitySignal,
    codec: Arc<CookieCodec>,
    crawlers: CrawlerDetector,
    allowlist: IpAllowlist,
    reporter: InterceptReporter,
    cookies: CookieNames,
}

impl AccessGate {
    /// Build a gate from configuration and collaborators.
    pub fn new(
        config: &GateConfig,
        locator: Arc<dyn GeoLocator>,
        audit: Arc<dyn AuditStore>,
    ) -> Result<Self> {
        if config.secret.trim().is_empty() {
            log::warn!("Gate secret is empty; signed cookies are trivially forgeable");
        }
        let codec = Arc::new(CookieCodec::new(&config.secret)?);
        let detector = SpoofDetector::new(codec.clone(), config.cookies.raw_ip.clone());
        let identity = IdentitySignal::new(locator, detector, config.proxy_header_prefixes.clone());
        let allowlist = IpAllowlist::from_entries(&config.ip_allowlist)?;
        let crawlers = CrawlerDetector::with_extra(&config.extra_crawler_agents)?;
        let reporter = InterceptReporter::with_dedup_window(
            audit,
            Duration::from_secs(config.report_dedup_secs),
        );

        log::info!(
            "Access gate ready: {} allowlist entries, {} extra crawlers",
            allowlist.len(),
            config.extra_crawler_agents.len()
        );

        Ok(Self {
            policy: RegionPolicy::with_cache_capacity(config.pattern_cache_capacity),
            identity,
            codec,
            crawlers,
            allowlist,
            reporter,
            cookies: config.cookies.clone(),
        })
    }

    /// Region policy evaluator.
    pub fn policy(&self) -> &RegionPolicy {
        &self.policy
    }

    /// Cookie codec keyed with the gate secret.
    pub fn codec(&self) -> &Arc<CookieCodec> {
        &self.codec
    }

    /// Intercept reporter.
    pub fn reporter(&self) -> &InterceptReporter {
        &self.reporter
    }

    /// IP allowlist.
    pub fn allowlist(&self) -> &IpAllowlist {
        &self.allowlist
    }

    /// Compute the per-request context from the session attached to `visitor`.
    pub fn context<'v>(&self, visitor: &'v Visitor) -> VisitorContext<'v> {
        self.context_with_session(visitor, visitor.session())
    }

    /// Compute the per-request context, looking the caller up in `sessions`.
    ///
    /// An unknown or missing session id falls back to the session attached to
    /// `visitor`.
    pub fn context_from_store<'v>(
        &self,
        visitor: &'v Visitor,
        sessions: &dyn SessionStore,
        session_id: Option<&str>,
    ) -> VisitorContext<'v> {
        let session = session_id
            .and_then(|id| sessions.current(id))
            .unwrap_or_else(|| visitor.session());
        self.context_with_session(visitor, session)
    }

    fn context_with_session<'v>(&self, visitor: &'v Visitor, session: Session) -> VisitorContext<'v> {
        let is_admin = session.is_admin;
        let is_crawler = self.crawlers.is_crawler(visitor.user_agent());
        let trusted_token = self.codec.verify_visitor_token(
            visitor.cookie(&self.cookies.identity),
            visitor.cookie(&self.cookies.token),
        );
        let allowlisted = self.allowlist.contains(&visitor.ip);

        let mut ctx = VisitorContext {
            visitor,
            is_admin,
            is_crawler,
            trusted_token,
            allowlisted,
            safe_mode: safe_mode_enabled(visitor.cookie(&self.cookies.safe_mode)),
            hidden_categories: parse_hidden_categories(
                visitor.cookie(&self.cookies.hidden_categories),
            ),
            location: LocationDescriptor::default(),
            fingerprint: None,
        };

        if !ctx.bypasses_all() {
            ctx.location = self.identity.locator().resolve(&visitor.ip_string());
            ctx.fingerprint = Some(self.identity.fingerprint_at(visitor, &ctx.location));
        }
        ctx
    }

    /// Listing predicate for this visitor.
    pub fn filter_predicate<'a>(&'a self, ctx: &'a VisitorContext<'a>) -> ContentFilter<'a> {
        if ctx.sees_everything() {
            return ContentFilter::match_all();
        }
        ContentFilter {
            match_all: false,
            ctx: Some(ctx),
            policy: if ctx.bypasses_all() {
                None
            } else {
                Some(&self.policy)
            },
        }
    }

    /// Guard one item. Denials are audited and returned as `NotFound`.
    pub fn check_single(
        &self,
        ctx: &VisitorContext<'_>,
        item: &ContentItem,
    ) -> std::result::Result<(), AccessError> {
        if ctx.bypasses_all() {
            return Ok(());
        }

        let fingerprint = ctx.fingerprint();
        let decision = match fingerprint {
            Some(fp) => self
                .policy
                .evaluate_optional(fp.text(), item.visibility.as_ref()),
            None => self.policy.evaluate_optional("", item.visibility.as_ref()),
        };
        if decision.is_deny() {
            return Err(self.deny(ctx, item, DenyReason::Region));
        }

        if ctx.is_hidden(item) {
            return Err(self.deny(ctx, item, DenyReason::HiddenCategory));
        }
        if ctx.is_suppressed(item) {
            return Err(self.deny(ctx, item, DenyReason::SafeMode));
        }
        Ok(())
    }

    /// Fetch one item through the gate; missing and denied look the same.
    pub fn fetch(
        &self,
        ctx: &VisitorContext<'_>,
        store: &dyn ContentStore,
        id: u64,
    ) -> std::result::Result<ContentItem, AccessError> {
        let item = store.get(id).ok_or(AccessError::NotFound)?;
        if item.status != ContentStatus::Published && !ctx.is_admin {
            return Err(AccessError::NotFound);
        }
        self.check_single(ctx, &item)?;
        Ok(item)
    }

    /// List the items this visitor may see.
    pub fn list(&self, ctx: &VisitorContext<'_>, store: &dyn ContentStore) -> Vec<ContentItem> {
        let filter = self.filter_predicate(ctx);
        store.list(&filter)
    }

    fn deny(&self, ctx: &VisitorContext<'_>, item: &ContentItem, reason: DenyReason) -> AccessError {
        let visitor = ctx.visitor();
        let url = format!("//{}/{}", visitor.host, item.id);
        let switched_from = ctx.fingerprint().and_then(|fp| fp.switched_from());
        self.reporter.report(InterceptEvent::from_visitor(
            visitor,
            url,
            ctx.location().clone(),
            switched_from,
            reason,
        ));
        AccessError::NotFound
    }
}
