//! Decides on and sends open-transition notifications.

use slotwatch_detect::Status;
use slotwatch_store::Target;
use tracing::{debug, info, warn};

use crate::gateway::PushGateway;
use crate::notification::{should_notify, Notification};

/// Default notification body.
pub const DEFAULT_BODY: &str = "A reservation slot just opened.";

/// What happened to a possible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The transition does not notify.
    Skipped,
    /// The gateway accepted the notification.
    Delivered,
    /// Sending was attempted and failed.
    Failed(String),
}

impl DispatchOutcome {
    /// Whether a send was attempted.
    #[must_use]
    pub const fn attempted(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Sends a notification when a target enters OPEN.
#[derive(Debug, Clone)]
pub struct Dispatcher<G> {
    gateway: G,
    body: String,
}

impl<G: PushGateway> Dispatcher<G> {
    /// Creates a dispatcher with the default body.
    pub fn new(gateway: G) -> Self {
        Self::with_body(gateway, DEFAULT_BODY)
    }

    /// Creates a dispatcher with a custom body.
    pub fn with_body(gateway: G, body: impl Into<String>) -> Self {
        Self {
            gateway,
            body: body.into(),
        }
    }

    /// The underlying gateway.
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Notifies if `old → new` enters OPEN.
    ///
    /// Delivery failures are logged and reported in the outcome; they never
    /// propagate.
    pub async fn dispatch(&self, target: &Target, old: Option<Status>, new: Status) -> DispatchOutcome {
        if !should_notify(old, new) {
            debug!(target_id = %target.id, ?old, new = %new, "no notification for transition");
            return DispatchOutcome::Skipped;
        }

        let notification = Notification::for_target(target, self.body.as_str());
        match self.gateway.deliver(&notification).await {
            Ok(()) => {
                info!(
                    target_id = %target.id,
                    gateway = self.gateway.name(),
                    click_url = %notification.click_url,
                    "sent open notification"
                );
                DispatchOutcome::Delivered
            }
            Err(e) => {
                warn!(
                    target_id = %target.id,
                    gateway = self.gateway.name(),
                    error = %e,
                    "failed to send open notification"
                );
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }
}
