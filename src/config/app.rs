//! Main application configuration
//!
//! This module defines the primary configuration structures for the waiting-room
//! matchmaking service, including environment variable loading and validation.

use crate::types::Category;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Largest group the engine will form
pub const MAX_GROUP_SIZE: usize = 16;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchmakingSettings,
    pub presence: PresenceSettings,
    pub scheduler: SchedulerSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Waiting pool and grouping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Allowed categories. Empty accepts any well-formed category.
    pub categories: Vec<String>,
    /// Number of users per match
    pub group_size: usize,
    /// How long an entry may wait before eviction, in seconds
    pub waiting_timeout_seconds: u64,
    /// Per-category overrides of `waiting_timeout_seconds`
    pub category_timeouts: HashMap<String, u64>,
}

/// Presence tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// How long a heartbeat keeps a user online, in seconds
    pub ttl_seconds: u64,
}

/// Background matching loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Interval between matching ticks in milliseconds
    pub tick_interval_ms: u64,
    /// Upper bound on how long stopping may wait for an in-flight tick
    pub shutdown_grace_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "waiting-room".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            group_size: 2,
            waiting_timeout_seconds: 120, // 2 minutes
            category_timeouts: HashMap::new(),
        }
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self { ttl_seconds: 30 }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3000,
            shutdown_grace_seconds: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            self.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Matchmaking settings
        if let Ok(categories) = env::var("MATCH_CATEGORIES") {
            self.matchmaking.categories = categories
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(group_size) = env::var("MATCH_GROUP_SIZE") {
            self.matchmaking.group_size = group_size
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_GROUP_SIZE value: {}", group_size))?;
        }
        if let Ok(timeout) = env::var("WAITING_TIMEOUT_SECONDS") {
            self.matchmaking.waiting_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid WAITING_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Presence settings
        if let Ok(ttl) = env::var("PRESENCE_TTL_SECONDS") {
            self.presence.ttl_seconds = ttl
                .parse()
                .map_err(|_| anyhow!("Invalid PRESENCE_TTL_SECONDS value: {}", ttl))?;
        }

        // Scheduler settings
        if let Ok(interval) = env::var("TICK_INTERVAL_MS") {
            self.scheduler.tick_interval_ms = interval
                .parse()
                .map_err(|_| anyhow!("Invalid TICK_INTERVAL_MS value: {}", interval))?;
        }
        if let Ok(grace) = env::var("SHUTDOWN_GRACE_SECONDS") {
            self.scheduler.shutdown_grace_seconds = grace
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_GRACE_SECONDS value: {}", grace))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get default waiting timeout as Duration
    pub fn waiting_timeout(&self) -> Duration {
        Duration::from_secs(self.matchmaking.waiting_timeout_seconds)
    }

    /// Get presence TTL as Duration
    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence.ttl_seconds)
    }

    /// Get tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms)
    }

    /// Get scheduler drain grace period as Duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.scheduler.shutdown_grace_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.matchmaking.waiting_timeout_seconds == 0 {
        return Err(anyhow!("Waiting timeout must be greater than 0"));
    }
    if config.presence.ttl_seconds == 0 {
        return Err(anyhow!("Presence TTL must be greater than 0"));
    }
    if config.scheduler.tick_interval_ms == 0 {
        return Err(anyhow!("Tick interval must be greater than 0"));
    }
    if config.scheduler.shutdown_grace_seconds == 0 {
        return Err(anyhow!("Shutdown grace period must be greater than 0"));
    }

    // Validate grouping
    if config.matchmaking.group_size < 2 {
        return Err(anyhow!("Group size must be at least 2"));
    }
    if config.matchmaking.group_size > MAX_GROUP_SIZE {
        return Err(anyhow!("Group size cannot exceed {}", MAX_GROUP_SIZE));
    }

    // Validate categories
    for category in &config.matchmaking.categories {
        Category::new(category.as_str())
            .with_context(|| format!("Invalid configured category '{}'", category))?;
    }
    for (category, timeout) in &config.matchmaking.category_timeouts {
        Category::new(category.as_str())
            .with_context(|| format!("Invalid category timeout key '{}'", category))?;
        if *timeout == 0 {
            return Err(anyhow!("Timeout for category {} must be greater than 0", category));
        }
    }

    Ok(())
}
