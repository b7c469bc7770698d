//! Open-transition notifications for slotwatch.
//!
//! A notification is sent exactly when a target's status enters OPEN. The
//! [`Dispatcher`] makes that decision and hands the [`Notification`] to a
//! [`PushGateway`]; delivery failures are reported, never raised, so the
//! caller's state update goes ahead regardless.

#![forbid(unsafe_code)]

pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod notification;

pub use dispatcher::{DispatchOutcome, Dispatcher, DEFAULT_BODY};
pub use error::{NotifyError, Result};
pub use gateway::{Gateway, LogGateway, PushGateway, WebhookConfig, WebhookGateway};
pub use notification::{should_notify, Notification};
