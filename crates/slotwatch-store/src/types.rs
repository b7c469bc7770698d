//! Stored records: targets, transition states and log entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotwatch_detect::{RuleId, RulePolicy, Status};
use uuid::Uuid;

use crate::error::StoreError;

/// Opaque unique identifier of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(Uuid);

impl TargetId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TargetId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| StoreError::InvalidId(s.to_string()))
    }
}

/// A monitored page and its detection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Identifier.
    pub id: TargetId,
    /// Display name.
    pub name: String,
    /// Input URL. Notifications always link here.
    pub url: String,
    /// URL the last successful render ended on.
    pub final_url: Option<String>,
    /// Whether scheduled checks include this target.
    pub enabled: bool,
    /// Active rules.
    pub policy: RulePolicy,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Fields of a target about to be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTarget {
    /// Display name.
    pub name: String,
    /// Input URL.
    pub url: String,
    /// Whether scheduled checks include this target.
    pub enabled: bool,
    /// Active rules.
    pub policy: RulePolicy,
}

impl NewTarget {
    /// An enabled target with every rule active.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            policy: RulePolicy::all(),
        }
    }

    /// Sets the rule policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RulePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A partial update of a target. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New input URL.
    pub url: Option<String>,
    /// New final URL (`Some(None)` clears it).
    pub final_url: Option<Option<String>>,
    /// New enabled flag.
    pub enabled: Option<bool>,
    /// New rule policy.
    pub policy: Option<RulePolicy>,
}

impl TargetUpdate {
    /// Update that only records a resolved final URL.
    #[must_use]
    pub fn final_url(url: impl Into<String>) -> Self {
        Self {
            final_url: Some(Some(url.into())),
            ..Self::default()
        }
    }

    /// Update that only flips the enabled flag.
    #[must_use]
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// Update that only replaces the policy.
    #[must_use]
    pub fn policy(policy: RulePolicy) -> Self {
        Self {
            policy: Some(policy),
            ..Self::default()
        }
    }

    pub(crate) fn apply(self, target: &mut Target) {
        if let Some(name) = self.name {
            target.name = name;
        }
        if let Some(url) = self.url {
            target.url = url;
        }
        if let Some(final_url) = self.final_url {
            target.final_url = final_url;
        }
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(policy) = self.policy {
            target.policy = policy;
        }
    }
}

/// Persisted transition state of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionState {
    /// Last recorded status.
    pub status: Status,
    /// When the status last differed from its predecessor.
    pub last_changed_at: DateTime<Utc>,
    /// When the status last became OPEN.
    pub last_open_at: Option<DateTime<Utc>>,
    /// Kept for compatibility with stored data; reset on every status change
    /// and not otherwise maintained.
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Last write, changed or not.
    pub updated_at: DateTime<Utc>,
}

impl TransitionState {
    /// Initial state of a freshly added target.
    #[must_use]
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            status: Status::Unknown,
            last_changed_at: now,
            last_open_at: None,
            consecutive_failures: 0,
            updated_at: now,
        }
    }

    /// Records an observed status. Returns true if the status changed.
    pub fn record(&mut self, status: Status, now: DateTime<Utc>) -> bool {
        self.updated_at = now;
        if self.status == status {
            return false;
        }

        self.status = status;
        self.last_changed_at = now;
        if status.is_open() {
            self.last_open_at = Some(now);
        }
        self.consecutive_failures = 0;
        true
    }
}

/// One recorded observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Identifier.
    pub id: Uuid,
    /// Observed target.
    pub target_id: TargetId,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
    /// Resulting status.
    pub status: Status,
    /// Rules that matched.
    pub evidence: Vec<RuleId>,
    /// Error that made the check inconclusive.
    pub error: Option<String>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}
