//! Outbound match-formed notifications
//!
//! Formed matches leave the core through [`MatchFormedHandler`]. The handler
//! is the seam towards whatever allocates sessions for a match.

pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use messages::{MatchFormedEnvelope, MATCH_FORMED_ROUTING_KEY};
pub use publisher::{LoggingMatchHandler, MatchFormedHandler, RecordingMatchHandler};

#[cfg(test)]
pub use publisher::MockMatchFormedHandler;
