//! Gate decision types.

use std::fmt;

/// Decision is the outcome of evaluating a visitor against a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Decision {
    /// Visitor may view the content
    Allow = 0,
    /// Visitor may not view the content
    #[default]
    Deny = 1,
}

impl Decision {
    /// Build a decision from a boolean "is allowed" result.
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    /// Returns `true` for [`Decision::Allow`].
    pub fn is_allow(self) -> bool {
        self == Decision::Allow
    }

    /// Returns `true` for [`Decision::Deny`].
    pub fn is_deny(self) -> bool {
        self == Decision::Deny
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Deny => "DENY",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ALLOW" => Ok(Decision::Allow),
            "DENY" => Ok(Decision::Deny),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_from_allowed() {
        assert_eq!(Decision::from_allowed(true), Decision::Allow);
        assert_eq!(Decision::from_allowed(false), Decision::Deny);
    }

    #[test]
    fn test_decision_default_is_deny() {
        assert_eq!(Decision::default(), Decision::Deny);
    }

    #[test]
    fn test_decision_parse_and_display() {
        assert_eq!("allow".parse::<Decision>(), Ok(Decision::Allow));
        assert_eq!("DENY".parse::<Decision>(), Ok(Decision::Deny));
        assert!("maybe".parse::<Decision>().is_err());
        assert_eq!(Decision::Allow.to_string(), "ALLOW");
        assert_eq!(Decision::Deny.to_string(), "DENY");
    }
}
