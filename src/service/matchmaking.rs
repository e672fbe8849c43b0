//! Entry point for external callers
//!
//! Identifiers arrive as raw strings from the (authenticated) request layer
//! and are validated here, before any store access.

use crate::config::MatchingConfig;
use crate::error::{error_kind, Result};
use crate::metrics::MetricsCollector;
use crate::presence::PresenceTracker;
use crate::store::WaitingPoolStore;
use crate::types::{Category, UserId, WaitingEntry};
use crate::utils::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Waiting-list operations for request handlers
pub struct MatchmakingService {
    store: Arc<dyn WaitingPoolStore>,
    presence: PresenceTracker,
    config: MatchingConfig,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl MatchmakingService {
    pub fn new(
        store: Arc<dyn WaitingPoolStore>,
        presence: PresenceTracker,
        config: MatchingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            presence,
            config,
            clock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Add the user to the category's pool, or refresh their existing entry.
    ///
    /// Returns the waiting timeout that applies to the entry.
    pub async fn add_to_waiting_list(&self, user_id: &str, category: &str) -> Result<Duration> {
        let result = self.enqueue(user_id, category).await;
        self.observe(result)
    }

    /// Remove the user from the category's pool. Absent entries are not an error.
    pub async fn remove_from_waiting_list(&self, user_id: &str, category: &str) -> Result<()> {
        let result = self.dequeue(user_id, category).await;
        self.observe(result)
    }

    /// Record that the user is still connected
    pub async fn heartbeat(&self, user_id: &str) -> Result<()> {
        let result = async {
            let user_id = UserId::new(user_id)?;
            self.presence.heartbeat(&user_id).await?;
            if let Some(metrics) = &self.metrics {
                metrics.record_heartbeat();
            }
            Ok(())
        }
        .await;
        self.observe(result)
    }

    /// Current entries of one category, oldest first
    pub async fn waiting_list(&self, category: &str) -> Result<Vec<WaitingEntry>> {
        let category = Category::new(category)?;
        self.store.snapshot(&category).await
    }

    async fn enqueue(&self, user_id: &str, category: &str) -> Result<Duration> {
        let user_id = UserId::new(user_id)?;
        let category = Category::new(category)?;
        self.config.ensure_known(&category)?;

        let timeout = self.config.timeout_for(&category);
        let entry = self
            .store
            .enqueue(&user_id, &category, self.clock.now(), timeout)
            .await?;

        info!(
            "User {} waiting in {} (timeout {:?}, revision {})",
            user_id, category, timeout, entry.revision
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_enqueue(&category);
        }

        Ok(timeout)
    }

    async fn dequeue(&self, user_id: &str, category: &str) -> Result<()> {
        let user_id = UserId::new(user_id)?;
        let category = Category::new(category)?;

        if self.store.remove(&user_id, &category).await? {
            info!("User {} left the {} waiting list", user_id, category);
            if let Some(metrics) = &self.metrics {
                metrics.record_removal(&category);
            }
        } else {
            debug!("User {} was not waiting in {}", user_id, category);
        }

        Ok(())
    }

    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let kind = error_kind(e);
            warn!("Waiting list request rejected ({}): {}", kind, e);
            if let Some(metrics) = &self.metrics {
                metrics.record_rejection(&kind.to_string());
            }
        }
        result
    }
}
