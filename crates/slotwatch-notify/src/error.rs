//! Error types for the slotwatch-notify crate.

use thiserror::Error;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The gateway did not answer in time.
    #[error("gateway timed out")]
    Timeout,

    /// The request could not be sent or the connection failed.
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// The gateway answered with a non-success status.
    #[error("gateway rejected notification with status {status}")]
    Rejected {
        /// HTTP status code.
        status: u16,
    },

    /// The gateway is misconfigured.
    #[error("invalid gateway config: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Rejected {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
