//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the waiting-room matchmaking
//! service using Prometheus metrics.

use crate::scheduler::SchedulerState;
use crate::types::Category;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Waiting pool metrics
    pool_metrics: PoolMetrics,

    /// Scheduler and match metrics
    scheduler_metrics: SchedulerMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Requests rejected by the façade, by error kind
    pub requests_rejected_total: IntCounterVec,
}

/// Waiting pool metrics
#[derive(Clone)]
pub struct PoolMetrics {
    /// Entries added, by category
    pub entries_enqueued_total: IntCounterVec,

    /// Explicit removals, by category
    pub entries_removed_total: IntCounterVec,

    /// Users currently waiting, by category
    pub pool_size: IntGaugeVec,

    /// Heartbeats received
    pub heartbeats_total: IntCounter,
}

/// Scheduler and match metrics
#[derive(Clone)]
pub struct SchedulerMetrics {
    /// Matches committed, by category
    pub matches_formed_total: IntCounterVec,

    /// Users placed in matches, by category
    pub users_matched_total: IntCounterVec,

    /// Matches dropped at commit time, by category
    pub matches_discarded_total: IntCounterVec,

    /// Timed-out entries removed, by category
    pub evictions_total: IntCounterVec,

    /// Categories skipped for a tick, by category
    pub category_skips_total: IntCounterVec,

    /// Failed match-formed notifications
    pub notification_failures_total: IntCounter,

    /// Tick duration
    pub tick_duration: Histogram,

    /// Scheduler state (0=not started, 1=running, 2=draining, 3=stopped)
    pub scheduler_state: IntGauge,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let pool_metrics = PoolMetrics::new(&registry)?;
        let scheduler_metrics = SchedulerMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            pool_metrics,
            scheduler_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get waiting pool metrics
    pub fn pool(&self) -> &PoolMetrics {
        &self.pool_metrics
    }

    /// Get scheduler metrics
    pub fn scheduler(&self) -> &SchedulerMetrics {
        &self.scheduler_metrics
    }

    /// Record an enqueue, first-time or refresh
    pub fn record_enqueue(&self, category: &Category) {
        self.pool_metrics
            .entries_enqueued_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    pub fn record_removal(&self, category: &Category) {
        self.pool_metrics
            .entries_removed_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    pub fn record_heartbeat(&self) {
        self.pool_metrics.heartbeats_total.inc();
    }

    /// Record a request the façade refused, labelled by error kind
    pub fn record_rejection(&self, kind: &str) {
        self.service_metrics
            .requests_rejected_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn record_match_formed(&self, category: &Category, group_size: usize) {
        self.scheduler_metrics
            .matches_formed_total
            .with_label_values(&[category.as_str()])
            .inc();
        self.scheduler_metrics
            .users_matched_total
            .with_label_values(&[category.as_str()])
            .inc_by(group_size as u64);
    }

    pub fn record_match_discarded(&self, category: &Category) {
        self.scheduler_metrics
            .matches_discarded_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    pub fn record_eviction(&self, category: &Category) {
        self.scheduler_metrics
            .evictions_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    pub fn record_category_skipped(&self, category: &Category) {
        self.scheduler_metrics
            .category_skips_total
            .with_label_values(&[category.as_str()])
            .inc();
    }

    pub fn record_notification_failure(&self) {
        self.scheduler_metrics.notification_failures_total.inc();
    }

    pub fn record_tick(&self, duration: Duration) {
        self.scheduler_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
    }

    /// Replace the pool size gauges. Categories absent from `sizes` drop to zero.
    pub fn update_pool_sizes(&self, sizes: &HashMap<Category, usize>) {
        self.pool_metrics.pool_size.reset();
        for (category, size) in sizes {
            self.pool_metrics
                .pool_size
                .with_label_values(&[category.as_str()])
                .set(*size as i64);
        }
    }

    pub fn update_scheduler_state(&self, state: SchedulerState) {
        self.scheduler_metrics
            .scheduler_state
            .set(state.as_gauge());
    }

    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("waiting_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "waiting_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("waiting_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let requests_rejected_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_requests_rejected_total",
                "Requests rejected by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(requests_rejected_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            requests_rejected_total,
        })
    }
}

impl PoolMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let entries_enqueued_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_entries_enqueued_total",
                "Waiting entries added or refreshed",
            ),
            &["category"],
        )?;
        registry.register(Box::new(entries_enqueued_total.clone()))?;

        let entries_removed_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_entries_removed_total",
                "Explicit removals from the waiting pool",
            ),
            &["category"],
        )?;
        registry.register(Box::new(entries_removed_total.clone()))?;

        let pool_size = IntGaugeVec::new(
            Opts::new("waiting_room_pool_size", "Users currently waiting"),
            &["category"],
        )?;
        registry.register(Box::new(pool_size.clone()))?;

        let heartbeats_total =
            IntCounter::new("waiting_room_heartbeats_total", "Heartbeats received")?;
        registry.register(Box::new(heartbeats_total.clone()))?;

        Ok(Self {
            entries_enqueued_total,
            entries_removed_total,
            pool_size,
            heartbeats_total,
        })
    }
}

impl SchedulerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_formed_total = IntCounterVec::new(
            Opts::new("waiting_room_matches_formed_total", "Matches committed"),
            &["category"],
        )?;
        registry.register(Box::new(matches_formed_total.clone()))?;

        let users_matched_total = IntCounterVec::new(
            Opts::new("waiting_room_users_matched_total", "Users placed in matches"),
            &["category"],
        )?;
        registry.register(Box::new(users_matched_total.clone()))?;

        let matches_discarded_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_matches_discarded_total",
                "Matches dropped because a member changed before commit",
            ),
            &["category"],
        )?;
        registry.register(Box::new(matches_discarded_total.clone()))?;

        let evictions_total = IntCounterVec::new(
            Opts::new("waiting_room_evictions_total", "Timed-out entries evicted"),
            &["category"],
        )?;
        registry.register(Box::new(evictions_total.clone()))?;

        let category_skips_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_category_skips_total",
                "Categories skipped for a tick",
            ),
            &["category"],
        )?;
        registry.register(Box::new(category_skips_total.clone()))?;

        let notification_failures_total = IntCounter::new(
            "waiting_room_notification_failures_total",
            "Failed match-formed notifications",
        )?;
        registry.register(Box::new(notification_failures_total.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "waiting_room_tick_duration_seconds",
                "Matching tick duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let scheduler_state = IntGauge::new(
            "waiting_room_scheduler_state",
            "Scheduler state (0=not started, 1=running, 2=draining, 3=stopped)",
        )?;
        registry.register(Box::new(scheduler_state.clone()))?;

        Ok(Self {
            matches_formed_total,
            users_matched_total,
            matches_discarded_total,
            evictions_total,
            category_skips_total,
            notification_failures_total,
            tick_duration,
            scheduler_state,
        })
    }
}
