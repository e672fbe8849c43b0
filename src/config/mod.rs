//! Configuration management for the waiting-room service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values for the matchmaking service.

pub mod app;
pub mod matching;

// Re-export commonly used types
pub use app::{
    validate_config, AppConfig, MatchmakingSettings, PresenceSettings, SchedulerSettings,
    ServiceSettings,
};
pub use matching::MatchingConfig;
