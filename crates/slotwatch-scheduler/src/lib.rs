//! Jittered periodic scheduler.
//!
//! [`Scheduler`] drives an async routine on a randomized period. The state
//! machine is explicit (`Idle → Running → Stopped`) and an atomic in-flight
//! flag guarantees at most one invocation runs at a time.
//!
//! ```no_run
//! use std::time::Duration;
//! use slotwatch_scheduler::{Scheduler, SchedulerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new(SchedulerConfig::new(Duration::from_secs(60)))?;
//! scheduler.start(|| async { Ok::<(), String>(()) })?;
//! // ...
//! scheduler.stop()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::{jittered_delay, SchedulerConfig, MIN_DELAY_FLOOR};
pub use error::{Result, SchedulerError};
pub use scheduler::{Phase, Scheduler};
