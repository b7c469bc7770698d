//! Durable state for slotwatch.
//!
//! - [`TargetStore`] keeps monitored targets and their [`TransitionState`]
//!   in `targets.json`.
//! - [`ObservationLog`] keeps the most recent observations of each target
//!   under `observations/`.
//!
//! Every write reaches disk before the call returns. A failed write is
//! reported and leaves the previous value in place.

#![forbid(unsafe_code)]

pub mod error;
pub mod observations;
pub mod targets;
pub mod types;

pub use error::{Result, StoreError};
pub use observations::{ObservationLog, MAX_ENTRIES_PER_TARGET};
pub use targets::TargetStore;
pub use types::{LogEntry, NewTarget, Target, TargetId, TargetUpdate, TransitionState};
