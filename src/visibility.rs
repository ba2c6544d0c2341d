//! Region mode and content visibility definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// RegionMode controls who may see a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    /// Visible to everyone
    #[default]
    #[serde(alias = "Unrestricted", alias = "all")]
    Unrestricted,
    /// Visible to search-engine crawlers only
    #[serde(alias = "SearchEngineOnly")]
    SearchEngineOnly,
    /// Visible only when the fingerprint matches the allow pattern
    #[serde(alias = "AllowRegion")]
    AllowRegion,
    /// Hidden when the fingerprint matches the forbid pattern
    #[serde(alias = "ForbidRegion")]
    ForbidRegion,
    /// Allow pattern must match and forbid pattern must not
    #[serde(alias = "AllowRegionExceptForbidRegion")]
    AllowRegionExceptForbidRegion,
    /// Forbid pattern hides the item unless the allow pattern matches
    #[serde(alias = "ForbidRegionExceptAllowRegion")]
    ForbidRegionExceptAllowRegion,
}

impl RegionMode {
    /// All modes in code order.
    pub const ALL: [RegionMode; 6] = [
        RegionMode::Unrestricted,
        RegionMode::SearchEngineOnly,
        RegionMode::AllowRegion,
        RegionMode::ForbidRegion,
        RegionMode::AllowRegionExceptForbidRegion,
        RegionMode::ForbidRegionExceptAllowRegion,
    ];

    /// Parse a region mode from a string (case-insensitive).
    ///
    /// Accepts snake_case, kebab-case, CamelCase and the numeric code.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        if let Ok(code) = normalized.parse::<u8>() {
            return Self::from_u8(code);
        }

        match normalized.as_str() {
            "unrestricted" | "all" => Some(RegionMode::Unrestricted),
            "searchengineonly" | "onlyforsearchengine" => Some(RegionMode::SearchEngineOnly),
            "allowregion" => Some(RegionMode::AllowRegion),
            "forbidregion" => Some(RegionMode::ForbidRegion),
            "allowregionexceptforbidregion" => Some(RegionMode::AllowRegionExceptForbidRegion),
            "forbidregionexceptallowregion" => Some(RegionMode::ForbidRegionExceptAllowRegion),
            _ => None,
        }
    }

    /// Get the canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionMode::Unrestricted => "unrestricted",
            RegionMode::SearchEngineOnly => "search_engine_only",
            RegionMode::AllowRegion => "allow_region",
            RegionMode::ForbidRegion => "forbid_region",
            RegionMode::AllowRegionExceptForbidRegion => "allow_region_except_forbid_region",
            RegionMode::ForbidRegionExceptAllowRegion => "forbid_region_except_allow_region",
        }
    }

    /// Convert to the numeric code used by content storage.
    pub fn as_u8(&self) -> u8 {
        match self {
            RegionMode::Unrestricted => 0,
            RegionMode::SearchEngineOnly => 1,
            RegionMode::AllowRegion => 2,
            RegionMode::ForbidRegion => 3,
            RegionMode::AllowRegionExceptForbidRegion => 4,
            RegionMode::ForbidRegionExceptAllowRegion => 5,
        }
    }

    /// Convert from the numeric code.
    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }

    /// Whether this mode consults the allow pattern.
    pub fn uses_allow_pattern(&self) -> bool {
        matches!(
            self,
            RegionMode::AllowRegion
                | RegionMode::AllowRegionExceptForbidRegion
                | RegionMode::ForbidRegionExceptAllowRegion
        )
    }

    /// Whether this mode consults the forbid pattern.
    pub fn uses_forbid_pattern(&self) -> bool {
        matches!(
            self,
            RegionMode::ForbidRegion
                | RegionMode::AllowRegionExceptForbidRegion
                | RegionMode::ForbidRegionExceptAllowRegion
        )
    }
}

impl fmt::Display for RegionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RegionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::InvalidRegionMode(s.to_string()))
    }
}

/// Per-item visibility policy.
///
/// Empty patterns never match: an `AllowRegion` item with no allow pattern is
/// hidden from everyone, a `ForbidRegion` item with no forbid pattern is
/// visible to everyone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentVisibility {
    /// Region mode
    #[serde(default)]
    pub mode: RegionMode,
    /// Regex the fingerprint must match for allow-style modes
    #[serde(default)]
    pub allow_pattern: String,
    /// Regex the fingerprint must not match for forbid-style modes
    #[serde(default)]
    pub forbid_pattern: String,
}

impl ContentVisibility {
    /// Create a visibility policy.
    pub fn new(
        mode: RegionMode,
        allow_pattern: impl Into<String>,
        forbid_pattern: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            allow_pattern: allow_pattern.into(),
            forbid_pattern: forbid_pattern.into(),
        }
    }

    /// Visible to everyone.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Visible to crawlers only.
    pub fn search_engine_only() -> Self {
        Self::new(RegionMode::SearchEngineOnly, "", "")
    }

    /// Visible only where `pattern` matches.
    pub fn allow(pattern: impl Into<String>) -> Self {
        Self::new(RegionMode::AllowRegion, pattern, "")
    }

    /// Hidden where `pattern` matches.
    pub fn forbid(pattern: impl Into<String>) -> Self {
        Self::new(RegionMode::ForbidRegion, "", pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_mode_parse() {
        assert_eq!(RegionMode::parse("allow_region"), Some(RegionMode::AllowRegion));
        assert_eq!(RegionMode::parse("AllowRegion"), Some(RegionMode::AllowRegion));
        assert_eq!(RegionMode::parse("forbid-region"), Some(RegionMode::ForbidRegion));
        assert_eq!(RegionMode::parse("ALL"), Some(RegionMode::Unrestricted));
        assert_eq!(
            RegionMode::parse("OnlyForSearchEngine"),
            Some(RegionMode::SearchEngineOnly)
        );
        assert_eq!(
            RegionMode::parse("5"),
            Some(RegionMode::ForbidRegionExceptAllowRegion)
        );
        assert_eq!(RegionMode::parse("6"), None);
        assert_eq!(RegionMode::parse("sometimes"), None);
    }

    #[test]
    fn test_region_mode_roundtrip() {
        for mode in RegionMode::ALL {
            assert_eq!(RegionMode::from_u8(mode.as_u8()), Some(mode));
            assert_eq!(RegionMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn test_pattern_usage() {
        assert!(!RegionMode::Unrestricted.uses_allow_pattern());
        assert!(RegionMode::AllowRegion.uses_allow_pattern());
        assert!(!RegionMode::AllowRegion.uses_forbid_pattern());
        assert!(RegionMode::ForbidRegionExceptAllowRegion.uses_allow_pattern());
        assert!(RegionMode::ForbidRegionExceptAllowRegion.uses_forbid_pattern());
    }

    #[test]
    fn test_visibility_from_yaml() {
        let yaml = "mode: ForbidRegion\nforbid_pattern: \"CN|RU\"\n";
        let vis: ContentVisibility = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(vis.mode, RegionMode::ForbidRegion);
        assert_eq!(vis.forbid_pattern, "CN|RU");
        assert!(vis.allow_pattern.is_empty());
    }
}
