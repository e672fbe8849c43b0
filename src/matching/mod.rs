//! Match formation for the waiting pools
//!
//! The engine is a pure decision function over a pool snapshot and a view of
//! presence. It performs no storage I/O; the scheduler applies its output.

pub mod engine;

// Re-export commonly used types
pub use engine::{MatchingEngine, PresenceView, RunOutcome};
