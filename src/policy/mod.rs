//! Region policy evaluation.
//!
//! A content item's [`ContentVisibility`] is evaluated against the visitor's
//! fingerprint text. Matching is a case-insensitive regex search over the whole
//! fingerprint, not per field.

mod pattern;

pub use pattern::{PatternCache, DEFAULT_PATTERN_CACHE_CAPACITY};

use crate::visibility::{ContentVisibility, RegionMode};
use crate::Decision;

/// RegionPolicy decides ALLOW/DENY for a fingerprint and a visibility policy.
///
/// # Examples
/// ```
/// use regionwall::{ContentVisibility, Decision, RegionPolicy};
///
/// let policy = RegionPolicy::new();
/// let vis = ContentVisibility::forbid("CN");
/// assert_eq!(policy.evaluate("中国|CN|Beijing", &vis), Decision::Deny);
/// assert_eq!(policy.evaluate("United States|US", &vis), Decision::Allow);
/// ```
#[derive(Default)]
pub struct RegionPolicy {
    patterns: PatternCache,
}

impl RegionPolicy {
    /// Create a policy evaluator with the default pattern cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy evaluator with a custom pattern cache capacity.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            patterns: PatternCache::with_capacity(capacity),
        }
    }

    /// Access the underlying pattern cache.
    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    /// Evaluate `visibility` for the visitor described by `fingerprint`.
    pub fn evaluate(&self, fingerprint: &str, visibility: &ContentVisibility) -> Decision {
        let allow_match = || self.patterns.is_match(&visibility.allow_pattern, fingerprint);
        let forbid_match = || self.patterns.is_match(&visibility.forbid_pattern, fingerprint);

        match visibility.mode {
            RegionMode::Unrestricted => Decision::Allow,
            RegionMode::SearchEngineOnly => Decision::Deny,
            RegionMode::AllowRegion => allow_region(allow_match()),
            RegionMode::ForbidRegion => forbid_region(forbid_match()),
            RegionMode::AllowRegionExceptForbidRegion => {
                if forbid_match() {
                    return Decision::Deny;
                }
                allow_region(allow_match())
            }
            RegionMode::ForbidRegionExceptAllowRegion => {
                forbid_except_allow(allow_match, forbid_match)
            }
        }
    }

    /// Evaluate an optional visibility; items without one are unrestricted.
    pub fn evaluate_optional(
        &self,
        fingerprint: &str,
        visibility: Option<&ContentVisibility>,
    ) -> Decision {
        match visibility {
            Some(vis) => self.evaluate(fingerprint, vis),
            None => Decision::Allow,
        }
    }
}

fn allow_region(allow_matched: bool) -> Decision {
    Decision::from_allowed(allow_matched)
}

fn forbid_region(forbid_matched: bool) -> Decision {
    Decision::from_allowed(!forbid_matched)
}

/// Two-stage rule for [`RegionMode::ForbidRegionExceptAllowRegion`].
///
/// Stage one: an allow-pattern match suppresses the denial outright.
/// Stage two: otherwise the item falls through to the plain forbid-region rule.
/// The forbid pattern is only evaluated when stage one did not allow.
pub fn forbid_except_allow(
    allow_match: impl FnOnce() -> bool,
    forbid_match: impl FnOnce() -> bool,
) -> Decision {
    if allow_match() {
        return Decision::Allow;
    }
    forbid_region(forbid_match())
}
