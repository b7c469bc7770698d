//! Rule policies: which rules are active for a target.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{DetectError, Result};
use crate::rules::RuleId;

/// An explicit set of active rules.
///
/// Policies travel as short strings over the rule alphabet (`"ABC"`).
/// [`RulePolicy::parse`] (and `FromStr`) is strict and backs user input.
/// Deserialization reads stored strings with [`RulePolicy::from_legacy`], so
/// a target written by older tooling still loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct RulePolicy {
    rules: BTreeSet<RuleId>,
}

impl RulePolicy {
    /// Policy with every rule active.
    #[must_use]
    pub fn all() -> Self {
        RuleId::ALL.into_iter().collect()
    }

    /// Strictly parses a policy string.
    ///
    /// Every character must be a known rule name; duplicates collapse.
    ///
    /// # Errors
    ///
    /// Returns `DetectError::InvalidPolicy` for an empty string or an unknown
    /// rule name.
    pub fn parse(policy: &str) -> Result<Self> {
        let trimmed = policy.trim();
        if trimmed.is_empty() {
            return Err(DetectError::InvalidPolicy {
                policy: policy.to_string(),
                reason: "policy must name at least one rule".to_string(),
            });
        }

        trimmed
            .chars()
            .map(|c| {
                RuleId::from_char(c).map_err(|_| DetectError::InvalidPolicy {
                    policy: policy.to_string(),
                    reason: format!("unknown rule '{c}'"),
                })
            })
            .collect()
    }

    /// Compatibility reading of a policy string.
    ///
    /// Exactly `"C"` activates only rule C. Any other string activates every
    /// rule whose name occurs in it; unknown characters are ignored (with a
    /// warning) and an unrecognised string yields an empty policy.
    #[must_use]
    pub fn from_legacy(policy: &str) -> Self {
        let parsed: Self = if policy == "C" {
            std::iter::once(RuleId::C).collect()
        } else {
            RuleId::ALL
                .into_iter()
                .filter(|id| policy.contains(id.as_str()))
                .collect()
        };

        if policy.chars().any(|c| RuleId::from_char(c).is_err()) {
            warn!(policy, active = %parsed, "ignored unknown characters in rule policy");
        }
        if parsed.is_empty() {
            warn!(policy, "rule policy activates no rules");
        }
        parsed
    }

    /// Active rules in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.rules.iter().copied()
    }

    /// Whether no rule is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<RuleId> for RulePolicy {
    fn from_iter<I: IntoIterator<Item = RuleId>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for RulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            write!(f, "{rule}")?;
        }
        Ok(())
    }
}

impl FromStr for RulePolicy {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for RulePolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_legacy(&raw))
    }
}

impl From<RulePolicy> for String {
    fn from(policy: RulePolicy) -> Self {
        policy.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("A", "A" ; "single")]
    #[test_case("AB", "AB" ; "two")]
    #[test_case("CBA", "ABC" ; "canonical order")]
    #[test_case("AAB", "AB" ; "duplicates collapse")]
    #[test_case(" BC ", "BC" ; "surrounding whitespace")]
    fn parse_valid(input: &str, canonical: &str) {
        let policy = RulePolicy::parse(input).unwrap();
        assert_eq!(policy.to_string(), canonical);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("AZ" ; "unknown letter")]
    #[test_case("ab" ; "lowercase")]
    #[test_case("A,B" ; "separator")]
    fn parse_invalid(input: &str) {
        assert!(matches!(
            RulePolicy::parse(input),
            Err(DetectError::InvalidPolicy { .. })
        ));
    }

    #[test_case("C", &[RuleId::C] ; "exact c")]
    #[test_case("AB", &[RuleId::A, RuleId::B] ; "substring ab")]
    #[test_case("ABC", &[RuleId::A, RuleId::B, RuleId::C] ; "all")]
    #[test_case("xAx", &[RuleId::A] ; "junk ignored")]
    #[test_case("", &[] ; "empty")]
    #[test_case("none", &[] ; "nothing recognised")]
    fn legacy_reading(input: &str, expected: &[RuleId]) {
        let policy = RulePolicy::from_legacy(input);
        assert_eq!(policy.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn default_is_all_rules() {
        assert_eq!(RulePolicy::default().to_string(), "ABC");
        assert_eq!(RulePolicy::default(), RulePolicy::all());
    }

    #[test]
    fn serde_uses_policy_string() {
        let policy = RulePolicy::parse("BA").unwrap();
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, "\"AB\"");

        let back: RulePolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn stored_policy_with_unknown_letters_keeps_known_rules() {
        assert!(RulePolicy::parse("ABX").is_err());

        let stored: RulePolicy = serde_json::from_str("\"ABX\"").unwrap();
        assert_eq!(stored.to_string(), "AB");

        let nothing: RulePolicy = serde_json::from_str("\"Q\"").unwrap();
        assert!(nothing.is_empty());
    }

    proptest! {
        #[test]
        fn prop_strict_parse_agrees_with_legacy_on_valid_strings(s in "[ABC]{1,6}") {
            let strict = RulePolicy::parse(&s).unwrap();
            prop_assert_eq!(strict, RulePolicy::from_legacy(&s));
        }
    }
}
