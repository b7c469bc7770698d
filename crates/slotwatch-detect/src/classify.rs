//! Status classification.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::page::PageQuery;
use crate::policy::RulePolicy;
use crate::rules::RuleId;

/// Observed status of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// The actionable state was detected.
    Open,
    /// The page was inspected and nothing was detected.
    Closed,
    /// No conclusion could be drawn (render failure, not yet observed).
    #[default]
    Unknown,
}

impl Status {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns true for [`Status::Open`].
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Resulting status.
    pub status: Status,
    /// Rules that matched, in evaluation order.
    pub evidence: Vec<RuleId>,
}

impl Classification {
    /// Classification of a page that could not be observed.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            status: Status::Unknown,
            evidence: Vec::new(),
        }
    }

    /// Evidence as rule names.
    #[must_use]
    pub fn evidence_names(&self) -> Vec<&'static str> {
        self.evidence.iter().map(|r| r.as_str()).collect()
    }
}

/// Classifies a page under `policy`.
///
/// Every active rule is evaluated; a rule whose page query fails contributes
/// no evidence. The status is OPEN when any rule matched and CLOSED
/// otherwise. Rule priority does not influence the result.
pub fn classify<P: PageQuery + ?Sized>(page: &P, policy: &RulePolicy) -> Classification {
    let mut evidence = Vec::new();

    for id in policy.iter() {
        match id.rule().evaluate(page) {
            Ok(true) => evidence.push(id),
            Ok(false) => {}
            Err(e) => {
                debug!(rule = %id, error = %e, "rule evaluation failed, treating as no match");
            }
        }
    }

    let status = if evidence.is_empty() {
        Status::Closed
    } else {
        Status::Open
    };

    Classification { status, evidence }
}
