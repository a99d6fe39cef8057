//! Periodic task scheduler.
//!
//! Runs the scrape and notification cycles on independent cadences until
//! the shared shutdown token is cancelled.

mod runner;
mod state;

pub use runner::{PeriodicTask, Scheduler, SharedStatus};
pub use state::{TaskState, TaskStatus};
