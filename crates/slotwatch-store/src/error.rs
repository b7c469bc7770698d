//! Error types for the slotwatch-store crate.

use slotwatch_persist::PersistError;
use thiserror::Error;

/// Errors that can occur in the stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing files failed.
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    /// A string could not be parsed as a target id.
    #[error("invalid target id: {0}")]
    InvalidId(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
