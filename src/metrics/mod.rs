//! Metrics and monitoring for the waiting-room matchmaking service
//!
//! This module provides Prometheus metrics collection and the HTTP server
//! exposing health probes and the metrics endpoint.

pub mod collector;
pub mod health;

pub use collector::{MetricsCollector, MetricsTimer, PoolMetrics, SchedulerMetrics, ServiceMetrics};
pub use health::{HealthServer, HealthServerConfig};
