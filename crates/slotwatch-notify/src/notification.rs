//! Notification payload and the send decision.

use serde::{Deserialize, Serialize};
use slotwatch_detect::Status;
use slotwatch_store::Target;

/// Returns true when a transition from `old` to `new` must notify.
///
/// Only entering OPEN notifies. A missing previous status counts as not OPEN.
#[must_use]
pub fn should_notify(old: Option<Status>, new: Status) -> bool {
    new.is_open() && !old.is_some_and(|s| s.is_open())
}

/// A push notification about a target that just opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Headline.
    pub title: String,
    /// Message body.
    pub body: String,
    /// Link opened when the notification is clicked.
    pub click_url: String,
}

impl Notification {
    /// Builds the notification for `target`.
    ///
    /// The click URL is the target's input URL, never the resolved final URL.
    #[must_use]
    pub fn for_target(target: &Target, body: impl Into<String>) -> Self {
        Self {
            title: format!("{} is open", target.name),
            body: body.into(),
            click_url: target.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use slotwatch_detect::RulePolicy;
    use slotwatch_store::TargetId;

    fn target() -> Target {
        Target {
            id: TargetId::new(),
            name: "Dental clinic".to_string(),
            url: "https://clinic.test/reserve?from=bookmark".to_string(),
            final_url: Some("https://clinic.test/login".to_string()),
            enabled: true,
            policy: RulePolicy::all(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn decision_table() {
        use Status::{Closed, Open, Unknown};

        assert!(should_notify(None, Open));
        assert!(should_notify(Some(Closed), Open));
        assert!(should_notify(Some(Unknown), Open));
        assert!(!should_notify(Some(Open), Open));
        assert!(!should_notify(Some(Open), Closed));
        assert!(!should_notify(Some(Closed), Unknown));
        assert!(!should_notify(None, Closed));
    }

    #[test]
    fn notification_links_input_url() {
        let n = Notification::for_target(&target(), "A slot opened.");
        assert_eq!(n.title, "Dental clinic is open");
        assert_eq!(n.body, "A slot opened.");
        assert_eq!(n.click_url, "https://clinic.test/reserve?from=bookmark");
    }

    fn status() -> impl Strategy<Value = Status> {
        prop_oneof![Just(Status::Open), Just(Status::Closed), Just(Status::Unknown)]
    }

    proptest! {
        #[test]
        fn prop_notifies_exactly_on_entering_open(history in prop::collection::vec(status(), 1..40)) {
            let mut previous: Option<Status> = None;
            let mut sent = 0usize;
            let mut entered_open = 0usize;

            for &status in &history {
                if should_notify(previous, status) {
                    sent += 1;
                }
                if status.is_open() && previous != Some(Status::Open) {
                    entered_open += 1;
                }
                previous = Some(status);
            }

            prop_assert_eq!(sent, entered_open);
        }

        #[test]
        fn prop_never_notifies_twice_in_a_row(history in prop::collection::vec(status(), 2..40)) {
            let mut previous: Option<Status> = None;
            let mut last_sent = false;

            for &status in &history {
                let sent = should_notify(previous, status);
                prop_assert!(!(sent && last_sent));
                last_sent = sent;
                previous = Some(status);
            }
        }
    }
}
