//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the stores,
//! presence tracker, scheduler and façade together and owns the background
//! maintenance tasks.

use crate::config::{AppConfig, MatchingConfig};
use crate::events::{LoggingMatchHandler, MatchFormedHandler};
use crate::matching::MatchingEngine;
use crate::metrics::MetricsCollector;
use crate::presence::PresenceTracker;
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerState, SchedulerStats, TickProcessor};
use crate::service::matchmaking::MatchmakingService;
use crate::store::{InMemoryPresenceStore, InMemoryWaitingPoolStore, WaitingPoolStore};
use crate::utils::{Clock, SystemClock};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Interval of the metrics refresh and presence cleanup tasks
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Shared waiting pool
    store: Arc<InMemoryWaitingPoolStore>,

    /// Shared presence records
    presence_store: Arc<InMemoryPresenceStore>,

    /// Façade for request handlers
    matchmaking: Arc<MatchmakingService>,

    /// Background matching loop
    scheduler: Arc<Scheduler>,

    /// Metrics collector for monitoring and health checks
    metrics: Arc<MetricsCollector>,

    clock: Arc<dyn Clock>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with the logging match handler
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_handler(config, Arc::new(LoggingMatchHandler::new()))
    }

    /// Initialize the application with a custom match-formed handler
    pub fn with_handler(
        config: AppConfig,
        handler: Arc<dyn MatchFormedHandler>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing waiting-room matchmaking service");
        info!(
            "Configuration: service={}, group_size={}, tick_interval={:?}, presence_ttl={:?}",
            config.service.name,
            config.matchmaking.group_size,
            config.tick_interval(),
            config.presence_ttl()
        );

        let matching_config =
            MatchingConfig::from_app_config(&config).map_err(|e| ServiceError::Configuration {
                message: format!("Invalid matchmaking settings: {}", e),
            })?;

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryWaitingPoolStore::new());
        let presence_store = Arc::new(InMemoryPresenceStore::new());
        let presence =
            PresenceTracker::new(presence_store.clone(), clock.clone(), config.presence_ttl());

        let processor = TickProcessor::new(
            store.clone(),
            presence.clone(),
            MatchingEngine::new(matching_config.group_size),
            handler,
            clock.clone(),
        )
        .with_metrics(metrics.clone());
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(processor),
            SchedulerConfig::from_app_config(&config),
        ));

        let matchmaking = Arc::new(
            MatchmakingService::new(store.clone(), presence, matching_config, clock.clone())
                .with_metrics(metrics.clone()),
        );

        Ok(Self {
            config,
            store,
            presence_store,
            matchmaking,
            scheduler,
            metrics,
            clock,
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start the scheduler and background maintenance
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting waiting-room matchmaking service");

        self.scheduler
            .start()
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to start scheduler: {}", e),
            })?;
        self.metrics.update_scheduler_state(self.scheduler.state());

        // Only a started scheduler counts as running
        *self.is_running.write().await = true;

        self.start_background_tasks().await;

        info!("✅ Waiting-room matchmaking service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of waiting-room service");

        // Mark as not running
        *self.is_running.write().await = false;

        self.scheduler
            .stop()
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to stop scheduler: {}", e),
            })?;
        self.metrics.update_scheduler_state(self.scheduler.state());
        info!("✅ Scheduler stopped");

        self.stop_background_tasks().await;

        let final_stats = self.scheduler.stats();
        info!("Final scheduler statistics: {:?}", final_stats);
        info!("✅ Waiting-room service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Façade for request handlers
    pub fn matchmaking(&self) -> Arc<MatchmakingService> {
        self.matchmaking.clone()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Get metrics collector
    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Waiting pool store, for health probes
    pub fn waiting_pool_store(&self) -> Arc<dyn WaitingPoolStore> {
        self.store.clone()
    }

    /// Per-category pool sizes
    pub async fn pool_sizes(&self) -> crate::error::Result<HashMap<String, usize>> {
        Ok(self
            .store
            .pool_sizes()
            .await?
            .into_iter()
            .map(|(category, size)| (category.to_string(), size))
            .collect())
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) {
        info!("Starting background maintenance tasks...");

        // Metrics update task
        let metrics_task = {
            let store = self.store.clone();
            let scheduler = self.scheduler.clone();
            let metrics = self.metrics.clone();
            let is_running = self.is_running.clone();
            let started_at = self.started_at;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
                info!("Metrics update task started");

                while *is_running.read().await {
                    interval.tick().await;

                    metrics.update_uptime(started_at.elapsed());
                    metrics.update_scheduler_state(scheduler.state());

                    match store.pool_sizes().await {
                        Ok(sizes) => {
                            debug!("Updating pool size metrics for {} categories", sizes.len());
                            metrics.update_pool_sizes(&sizes);
                            metrics.update_component_health("waiting_pool_store", true);
                        }
                        Err(e) => {
                            warn!("Failed to read pool sizes for metrics update: {}", e);
                            metrics.update_component_health("waiting_pool_store", false);
                        }
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        // Presence cleanup task
        let cleanup_task = {
            let presence_store = self.presence_store.clone();
            let clock = self.clock.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
                info!("Presence cleanup task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match presence_store.purge_stale(clock.now()) {
                        Ok(purged) if purged > 0 => {
                            debug!("Purged {} stale presence records", purged)
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Presence cleanup failed: {}", e),
                    }
                }

                info!("Presence cleanup task stopped");
            })
        };

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(metrics_task);
        tasks.push(cleanup_task);

        info!("✅ Started {} background tasks", tasks.len());
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        info!("Stopping {} background tasks...", tasks.len());

        for task in tasks.drain(..) {
            task.abort();
            // Cancellation result only
            let _ = task.await;
        }

        info!("✅ All background tasks stopped");
    }
}
