//! Error types for the slotwatch crate.

use std::path::PathBuf;

use slotwatch_store::StoreError;
use thiserror::Error;

/// Why a page could not be rendered.
///
/// The display text is what gets recorded in the observation log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The page did not finish loading in time.
    #[error("navigation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The renderer reached the page but navigation failed.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The render service could not be reached.
    #[error("render service unreachable: {0}")]
    Transport(String),

    /// The render service answered with something unreadable.
    #[error("invalid render response: {0}")]
    Decode(String),
}

/// Errors raised while processing a target.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A store write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors in the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("config file {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the config schema.
    #[error("invalid TOML: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
