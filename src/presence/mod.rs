//! User liveness tracking
//!
//! Presence is refreshed by heartbeats from an ingestion path outside this
//! crate and read lazily: a record counts only while its TTL has not elapsed.

pub mod tracker;

pub use tracker::PresenceTracker;
