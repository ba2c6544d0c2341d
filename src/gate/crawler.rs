//! Search-engine crawler recognition by user-agent.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// User-agent tokens of well-known search-engine crawlers.
pub const KNOWN_CRAWLERS: &[&str] = &[
    "googlebot",
    "google-inspectiontool",
    "bingbot",
    "msnbot",
    "baiduspider",
    "yandexbot",
    "duckduckbot",
    "sogou",
    "360spider",
    "bytespider",
    "applebot",
    "yisouspider",
    "slurp",
];

/// User agents that mention a crawler token without being one.
static FALSE_POSITIVE_PATTERNS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        # Sogou browser and input method
        sogou(mobile)?browser
        |
        metasr
        |
        sogoumse
    ",
    )
    .unwrap()
});

static CRAWLER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let tokens: Vec<String> = KNOWN_CRAWLERS.iter().map(|t| regex::escape(t)).collect();
    RegexBuilder::new(&format!("({})", tokens.join("|")))
        .case_insensitive(true)
        .build()
        .unwrap()
});

/// Check a user agent against the built-in crawler list.
///
/// # Example
/// ```
/// use regionwall::gate::is_known_crawler;
///
/// assert!(is_known_crawler("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"));
/// assert!(!is_known_crawler("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Firefox/128.0"));
/// ```
pub fn is_known_crawler(user_agent: &str) -> bool {
    if user_agent.is_empty() {
        return false;
    }
    if FALSE_POSITIVE_PATTERNS.is_match(user_agent) {
        return false;
    }
    CRAWLER_PATTERN.is_match(user_agent)
}

/// CrawlerDetector combines the built-in list with configured extra names.
#[derive(Debug, Clone, Default)]
pub struct CrawlerDetector {
    extra: Option<Regex>,
}

impl CrawlerDetector {
    /// Detector using only the built-in list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector with extra user-agent tokens (matched literally, case-insensitive).
    pub fn with_extra<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .map(|n| regex::escape(&n))
            .collect();
        if tokens.is_empty() {
            return Ok(Self::default());
        }
        let extra = RegexBuilder::new(&format!("({})", tokens.join("|")))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("invalid crawler name: {}", e)))?;
        Ok(Self { extra: Some(extra) })
    }

    /// Whether `user_agent` belongs to a search-engine crawler.
    pub fn is_crawler(&self, user_agent: &str) -> bool {
        if is_known_crawler(user_agent) {
            return true;
        }
        match &self.extra {
            Some(extra) => !user_agent.is_empty() && extra.is_match(user_agent),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_major_crawlers() {
        for ua in [
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
            "Mozilla/5.0 (compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm)",
            "Mozilla/5.0 (compatible; Baiduspider/2.0; +http://www.baidu.com/search/spider.html)",
            "Mozilla/5.0 (compatible; YandexBot/3.0; +http://yandex.com/bots)",
            "DuckDuckBot/1.1; (+http://duckduckgo.com/duckduckbot.html)",
            "Sogou web spider/4.0(+http://www.sogou.com/docs/help/webmasters.htm#07)",
            "Mozilla/5.0 (compatible; Bytespider; spider-feedback@bytedance.com)",
            "Mozilla/5.0 (Macintosh) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.1.1 Safari/605.1.15 (Applebot/0.1)",
            "Mozilla/5.0 (compatible; 360Spider)",
        ] {
            assert!(is_known_crawler(ua), "{}", ua);
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert!(is_known_crawler("GOOGLEBOT"));
        assert!(is_known_crawler("baiduSpider"));
    }

    #[test]
    fn test_browsers_are_not_crawlers() {
        assert!(!is_known_crawler(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36"
        ));
        assert!(!is_known_crawler(
            "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/535.11 (KHTML, like Gecko) Chrome/17.0 Safari/535.11 SE 2.X MetaSr 1.0"
        ));
        assert!(!is_known_crawler("Mozilla/5.0 SogouMobileBrowser/5.0"));
        assert!(!is_known_crawler(""));
    }

    #[test]
    fn test_extra_names() {
        let detector = CrawlerDetector::with_extra(["PetalBot", " ", "a.b"]).unwrap();
        assert!(detector.is_crawler("Mozilla/5.0 (compatible; PetalBot;+https://webmaster.petalsearch.com)"));
        assert!(detector.is_crawler("Googlebot"));
        assert!(detector.is_crawler("A.B crawler"));
        assert!(!detector.is_crawler("axb crawler"));
        assert!(!detector.is_crawler("Firefox"));
        assert!(!CrawlerDetector::new().is_crawler("PetalBot"));
    }
}
