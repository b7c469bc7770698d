//! slotwatch watches reservation pages and sends a push notification the
//! moment a slot opens.
//!
//! The pieces live in their own crates and are wired together here:
//!
//! - `slotwatch-detect` classifies a rendered page as OPEN, CLOSED or UNKNOWN
//! - `slotwatch-store` keeps targets, transition state and observation logs
//! - `slotwatch-scheduler` fires checks on a jittered period
//! - `slotwatch-notify` sends a notification when a target enters OPEN
//!
//! [`Monitor`] runs the per-tick pipeline, [`HttpRenderer`] talks to the
//! render service and [`MonitorConfig`] loads the TOML configuration.

#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod monitor;
pub mod render;

pub use config::{GatewayKind, MonitorConfig};
pub use error::{ConfigError, MonitorError, RenderError, Result};
pub use monitor::{Monitor, Observation, TargetOutcome, TickReport};
pub use render::{HttpRenderer, Renderer};

use slotwatch_store::{ObservationLog, StoreError, TargetStore};

/// Opens the target store and observation log under `state_dir`.
///
/// # Errors
///
/// Returns an error if an existing target document cannot be loaded.
pub fn open_state(state_dir: &Path) -> std::result::Result<Arc<TargetStore>, StoreError> {
    let observations = Arc::new(ObservationLog::open(state_dir.join("observations")));
    TargetStore::open(state_dir, observations).map(Arc::new)
}
