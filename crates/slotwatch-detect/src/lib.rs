//! Rule-based page status classifier for slotwatch.
//!
//! `slotwatch-detect` turns a rendered page snapshot into one of three
//! statuses plus the list of rules that matched:
//!
//! - **[`Status`]**: `OPEN`, `CLOSED` or `UNKNOWN`
//! - **[`RulePolicy`]**: the set of rules active for a target, parsed from a
//!   short string such as `"AB"`
//! - **[`PageQuery`]**: the narrow query surface the classifier needs from a
//!   renderer (element counts and element texts)
//! - **[`classify`]**: the pure classification function
//!
//! # Example
//!
//! ```rust
//! use slotwatch_detect::{classify, Element, RulePolicy, Snapshot, Status};
//!
//! let page = Snapshot::new(
//!     "https://example.com/booking",
//!     vec![Element::new("a", "예약하기").with_href("/reserve")],
//! );
//! let policy = RulePolicy::parse("AB").unwrap();
//!
//! let result = classify(&page, &policy);
//! assert_eq!(result.status, Status::Open);
//! assert_eq!(result.evidence_names(), vec!["A"]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod error;
pub mod page;
pub mod policy;
pub mod rules;

pub use classify::{classify, Classification, Status};
pub use error::{DetectError, QueryError, Result};
pub use page::{Element, ElementQuery, PageQuery, Snapshot};
pub use policy::RulePolicy;
pub use rules::{Rule, RuleCheck, RuleId, RULES};
