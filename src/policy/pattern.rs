//! Compiled region pattern cache.
//!
//! Region patterns live on content items and are evaluated on every request,
//! so compiled regexes are kept in a bounded concurrent LRU keyed by the
//! pattern text. Invalid patterns are cached too, as "never matches".

use quick_cache::sync::Cache;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

/// Default cache capacity (number of distinct patterns).
pub const DEFAULT_PATTERN_CACHE_CAPACITY: usize = 1_024;

/// Upper bound on compiled program size for a single pattern.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Compiled pattern, `None` when the source was empty or failed to compile.
type Compiled = Option<Arc<Regex>>;

/// Concurrent cache of case-insensitive region regexes.
pub struct PatternCache {
    cache: Option<Cache<String, Compiled>>,
    capacity: usize,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PATTERN_CACHE_CAPACITY)
    }
}

impl PatternCache {
    /// Create a cache holding up to `capacity` compiled patterns.
    ///
    /// A capacity of zero disables caching; every lookup recompiles.
    pub fn with_capacity(capacity: usize) -> Self {
        let cache = if capacity > 0 {
            Some(Cache::new(capacity))
        } else {
            None
        };
        Self { cache, capacity }
    }

    /// Check whether `text` matches `pattern`, case-insensitively.
    ///
    /// Empty and invalid patterns never match.
    pub fn is_match(&self, pattern: &str, text: &str) -> bool {
        match self.get(pattern) {
            Some(regex) => regex.is_match(text),
            None => false,
        }
    }

    /// Fetch (compiling on miss) the regex for `pattern`.
    pub fn get(&self, pattern: &str) -> Compiled {
        if pattern.trim().is_empty() {
            return None;
        }

        if let Some(ref cache) = self.cache {
            if let Some(compiled) = cache.get(pattern) {
                return compiled;
            }
        }

        let compiled = compile(pattern);

        if let Some(ref cache) = self.cache {
            cache.insert(pattern.to_string(), compiled.clone());
        }

        compiled
    }

    /// Check that `pattern` is empty or a valid regex.
    pub fn validate(pattern: &str) -> Result<(), regex::Error> {
        if pattern.trim().is_empty() {
            return Ok(());
        }
        build(pattern).map(|_| ())
    }

    /// Number of cached patterns.
    pub fn len(&self) -> usize {
        self.cache.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every cached pattern.
    pub fn clear(&self) {
        if let Some(ref cache) = self.cache {
            cache.clear();
        }
    }
}

fn build(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
}

fn compile(pattern: &str) -> Compiled {
    match build(pattern) {
        Ok(regex) => Some(Arc::new(regex)),
        Err(e) => {
            log::warn!("Invalid region pattern {:?}, treating as never-match: {}", pattern, e);
            None
        }
    }
}
