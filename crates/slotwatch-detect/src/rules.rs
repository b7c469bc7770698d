//! The fixed rule vocabulary.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DetectError, QueryError};
use crate::page::{ElementQuery, PageQuery};

/// Words that mark a reservation entry point.
const RESERVATION_KEYWORDS: &[&str] = &["예약", "reserve", "reservation", "book"];

/// Clock-like time tokens such as `9:00` or `14:30`.
///
/// Digits and word boundaries are ASCII so that a time written flush against
/// Hangul (`10:30부터`, `오전10:30`) still matches.
static TIME_SLOT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u:\b)[0-9]{1,2}:[0-9]{2}(?-u:\b)").unwrap_or_else(|_| unreachable!())
});

/// Identifier of a rule in the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleId {
    /// Reservation link exists.
    A,
    /// Reservation button exists.
    B,
    /// Enabled element shows a time slot.
    C,
}

impl RuleId {
    /// All rule identifiers in evaluation order.
    pub const ALL: [Self; 3] = [Self::A, Self::B, Self::C];

    /// Single-letter name used in policy strings and evidence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    /// Looks up a rule by its letter.
    ///
    /// # Errors
    ///
    /// Returns `DetectError::UnknownRule` for letters outside the vocabulary.
    pub fn from_char(c: char) -> Result<Self, DetectError> {
        match c {
            'A' => Ok(Self::A),
            'B' => Ok(Self::B),
            'C' => Ok(Self::C),
            other => Err(DetectError::UnknownRule(other)),
        }
    }

    /// The rule definition for this identifier.
    #[must_use]
    pub fn rule(self) -> &'static Rule {
        match self {
            Self::A => &RULES[0],
            Self::B => &RULES[1],
            Self::C => &RULES[2],
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule inspects the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCheck {
    /// At least one element matches the query.
    Exists(ElementQuery),
    /// At least one matching element carries a clock-time token.
    TimeSlot(ElementQuery),
}

/// A detection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Rule identifier.
    pub id: RuleId,
    /// Human-readable description.
    pub description: &'static str,
    /// Page check.
    pub check: RuleCheck,
    /// Informational priority. Not used by the status decision.
    pub priority: u8,
}

impl Rule {
    /// Evaluates this rule against a page.
    ///
    /// # Errors
    ///
    /// Propagates the page's [`QueryError`].
    pub fn evaluate<P: PageQuery + ?Sized>(&self, page: &P) -> Result<bool, QueryError> {
        match &self.check {
            RuleCheck::Exists(query) => Ok(page.count(query)? > 0),
            RuleCheck::TimeSlot(query) => Ok(page
                .texts(query)?
                .iter()
                .any(|text| TIME_SLOT_REGEX.is_match(text))),
        }
    }
}

/// The rule vocabulary, indexed in [`RuleId::ALL`] order.
pub static RULES: [Rule; 3] = [
    Rule {
        id: RuleId::A,
        description: "reservation link present",
        check: RuleCheck::Exists(ElementQuery {
            tags: &["a"],
            keywords: RESERVATION_KEYWORDS,
            match_href: true,
            enabled_only: false,
        }),
        priority: 2,
    },
    Rule {
        id: RuleId::B,
        description: "reservation button present",
        check: RuleCheck::Exists(ElementQuery {
            tags: &["button", "input"],
            keywords: RESERVATION_KEYWORDS,
            match_href: false,
            enabled_only: false,
        }),
        priority: 2,
    },
    Rule {
        id: RuleId::C,
        description: "enabled element shows a time slot",
        check: RuleCheck::TimeSlot(ElementQuery {
            tags: &["a", "button", "input", "li", "td", "span"],
            keywords: &[],
            match_href: false,
            enabled_only: true,
        }),
        priority: 1,
    },
];
