//! Service layer for the waiting-room matchmaking service
//!
//! This module contains the request façade, the main application state,
//! and background task management for the production service.

pub mod app;
pub mod health;
pub mod matchmaking;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus};
pub use matchmaking::MatchmakingService;
