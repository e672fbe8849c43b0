//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the waiting-room
//! matchmaking service, including readiness and liveness probes.

use crate::scheduler::SchedulerState;
use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value (0=unhealthy, 1=degraded, 2=healthy)
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.as_gauge() < self.as_gauge() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version (could be from environment)
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Users waiting, by category
    pub pool_sizes: HashMap<String, usize>,
    /// Total users currently waiting
    pub users_waiting: usize,
    /// Matching ticks completed since start
    pub ticks_completed: u64,
    /// Matches formed since start
    pub matches_formed: u64,
    /// Timed-out entries evicted since start
    pub users_evicted: u64,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let service_check = Self::check_service_running(&app_state).await;
        let scheduler_check = Self::check_scheduler(&app_state);
        let store_check = Self::check_store(&app_state).await;

        let status = service_check
            .status
            .clone()
            .worst(scheduler_check.status.clone())
            .worst(store_check.status.clone());

        let stats = Self::gather_service_stats(&app_state).await;

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: std::env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            timestamp: chrono::Utc::now(),
            checks: vec![service_check, scheduler_check, store_check],
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        // Service must be running
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_store(&app_state).await.status)
    }

    /// Check if service is running
    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Scheduler must be running for matches to form
    fn check_scheduler(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let state = app_state.scheduler_state();
        let (status, message) = match state {
            SchedulerState::Running => (HealthStatus::Healthy, None),
            SchedulerState::Draining => (
                HealthStatus::Degraded,
                Some("Scheduler is draining".to_string()),
            ),
            SchedulerState::NotStarted | SchedulerState::Stopped => (
                HealthStatus::Unhealthy,
                Some(format!("Scheduler is {}", state)),
            ),
        };

        ComponentCheck {
            name: "scheduler".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Probe the waiting pool store with a cheap read
    async fn check_store(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.waiting_pool_store().active_categories().await {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Waiting pool store probe failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Store probe failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "waiting_pool_store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Gather current service statistics
    async fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let pool_sizes = match app_state.pool_sizes().await {
            Ok(sizes) => sizes,
            Err(e) => {
                debug!("Failed to get pool sizes for health check: {}", e);
                HashMap::new()
            }
        };
        let scheduler = app_state.scheduler_stats();

        ServiceStats {
            users_waiting: pool_sizes.values().sum(),
            pool_sizes,
            ticks_completed: scheduler.ticks_completed,
            matches_formed: scheduler.matches_formed,
            users_evicted: scheduler.users_evicted,
            uptime_seconds: app_state.uptime().as_secs(),
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
