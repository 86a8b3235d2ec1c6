//! Background Tasks Module
//!
//! Contains background work that runs periodically while a cache is alive.
//!
//! # Tasks
//! - Expiry Sweeper: removes expired entries, enforces the memory budget and
//!   reconciles the durable mirror at the configured interval

mod scheduler;
mod sweeper;

pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, Tick, TokioScheduler};
pub use sweeper::SweepReport;
