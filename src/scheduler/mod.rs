//! Periodic matching
//!
//! [`TickProcessor`] performs one pass over the active categories;
//! [`Scheduler`] runs it on an interval and owns the loop's lifecycle.

pub mod runner;
pub mod tick;

// Re-export commonly used types
pub use runner::{Scheduler, SchedulerConfig, SchedulerState, SchedulerStats};
pub use tick::{TickProcessor, TickReport};
