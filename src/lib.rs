//! Waiting Room - category-scoped waiting pools with periodic group matching
//!
//! Users join per-category waiting pools, keep themselves present through
//! heartbeats, and a background scheduler groups eligible users into
//! fixed-size matches oldest first, evicting entries that waited too long.

pub mod config;
pub mod error;
pub mod events;
pub mod matching;
pub mod metrics;
pub mod presence;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{error_kind, ErrorKind, MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use events::{MatchFormedHandler, RecordingMatchHandler};
pub use matching::MatchingEngine;
pub use presence::PresenceTracker;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerState, TickProcessor};
pub use service::MatchmakingService;
pub use store::{PresenceStore, WaitingPoolStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
