//! Error types for the slotwatch-detect crate.

use thiserror::Error;

/// Errors raised at the configuration boundary of the classifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectError {
    /// The rule policy string is empty or names an unknown rule.
    #[error("invalid rule policy '{policy}': {reason}")]
    InvalidPolicy {
        /// The offending policy string.
        policy: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A rule name outside the fixed vocabulary.
    #[error("unknown rule: {0}")]
    UnknownRule(char),
}

/// A page query failed while a rule was being evaluated.
///
/// The classifier treats this as "no evidence from this rule".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("page query failed: {reason}")]
pub struct QueryError {
    /// What went wrong.
    pub reason: String,
}

impl QueryError {
    /// Creates a query error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result type for classifier configuration.
pub type Result<T> = std::result::Result<T, DetectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_policy() {
        let err = DetectError::InvalidPolicy {
            policy: "AZ".to_string(),
            reason: "unknown rule 'Z'".to_string(),
        };
        assert_eq!(err.to_string(), "invalid rule policy 'AZ': unknown rule 'Z'");
    }

    #[test]
    fn error_display_unknown_rule() {
        assert_eq!(DetectError::UnknownRule('x').to_string(), "unknown rule: x");
    }

    #[test]
    fn error_display_query() {
        let err = QueryError::new("detached node");
        assert_eq!(err.to_string(), "page query failed: detached node");
    }
}
