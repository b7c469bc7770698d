//! Error types for the slotwatch-scheduler crate.

use thiserror::Error;

use crate::scheduler::Phase;

/// Errors that can occur when driving the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The requested action is not allowed in the current phase.
    #[error("cannot {action} a scheduler that is {from}")]
    InvalidTransition {
        /// Phase the scheduler was in.
        from: Phase,
        /// Action that was attempted.
        action: &'static str,
    },

    /// Configuration values are out of range.
    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    /// `start` was called outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
