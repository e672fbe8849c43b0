//! One matching pass over every active category

use crate::error::{error_kind, Result};
use crate::events::MatchFormedHandler;
use crate::matching::MatchingEngine;
use crate::metrics::MetricsCollector;
use crate::presence::PresenceTracker;
use crate::store::WaitingPoolStore;
use crate::types::{Category, Match, UserId, WaitingEntry};
use crate::utils::Clock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Counters for a single tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub categories_processed: usize,
    pub categories_skipped: usize,
    pub matches_committed: usize,
    pub matches_discarded: usize,
    pub users_evicted: usize,
    pub users_skipped_offline: usize,
    pub notifications_failed: usize,
    #[serde(skip)]
    pub duration: Duration,
}

/// Applies engine decisions to the waiting pool and notifies the handler
pub struct TickProcessor {
    store: Arc<dyn WaitingPoolStore>,
    presence: PresenceTracker,
    engine: MatchingEngine,
    handler: Arc<dyn MatchFormedHandler>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsCollector>>,
    /// In-flight handler calls. They outlive an aborted tick.
    deliveries: TaskTracker,
}

impl TickProcessor {
    pub fn new(
        store: Arc<dyn WaitingPoolStore>,
        presence: PresenceTracker,
        engine: MatchingEngine,
        handler: Arc<dyn MatchFormedHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            presence,
            engine,
            handler,
            clock,
            metrics: None,
            deliveries: TaskTracker::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    /// Process every active category once, sequentially.
    ///
    /// Failures are contained per category (skipped until the next tick) and
    /// per match (discarded, members stay in the pool). A user committed in one
    /// category is not considered in the remaining categories of the same tick.
    pub async fn run_tick(&self) -> TickReport {
        self.run_tick_until(&CancellationToken::new()).await
    }

    /// Like [`TickProcessor::run_tick`], but commits nothing further once
    /// `cancel` fires. Matches already committed are still delivered.
    pub async fn run_tick_until(&self, cancel: &CancellationToken) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();

        let categories = match self.store.active_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                warn!(
                    "Failed to list active categories ({}), skipping tick: {}",
                    error_kind(&e),
                    e
                );
                report.duration = started.elapsed();
                self.observe_tick(&report);
                return report;
            }
        };

        let mut committed_users: HashSet<UserId> = HashSet::new();

        for category in &categories {
            if cancel.is_cancelled() {
                debug!("Tick cancelled before category {}", category);
                break;
            }
            match self
                .process_category(category, &mut committed_users, &mut report, cancel)
                .await
            {
                Ok(()) => report.categories_processed += 1,
                Err(e) => {
                    report.categories_skipped += 1;
                    warn!(
                        "Skipping category {} this tick ({}): {}",
                        category,
                        error_kind(&e),
                        e
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_category_skipped(category);
                    }
                }
            }
        }

        report.duration = started.elapsed();
        self.observe_tick(&report);

        if report.matches_committed > 0 || report.users_evicted > 0 {
            info!(
                "Tick finished in {:?}: {} categories, {} matches, {} discarded, {} evicted",
                report.duration,
                report.categories_processed,
                report.matches_committed,
                report.matches_discarded,
                report.users_evicted
            );
        } else {
            debug!(
                "Tick finished in {:?}: {} categories, nothing to commit",
                report.duration, report.categories_processed
            );
        }

        report
    }

    async fn process_category(
        &self,
        category: &Category,
        committed_users: &mut HashSet<UserId>,
        report: &mut TickReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let snapshot = self.store.snapshot(category).await?;

        let candidates: Vec<WaitingEntry> = snapshot
            .into_iter()
            .filter(|entry| !committed_users.contains(&entry.user_id))
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        let user_ids: Vec<UserId> = candidates.iter().map(|e| e.user_id.clone()).collect();
        let online = self.presence.online_among(&user_ids).await?;

        let outcome = self
            .engine
            .run_once(category, &candidates, &online, self.clock.now());
        report.users_skipped_offline += outcome.skipped_offline.len();

        let mut by_user: HashMap<&UserId, &WaitingEntry> = HashMap::new();
        for entry in &candidates {
            by_user.entry(&entry.user_id).or_insert(entry);
        }

        for formed in outcome.matches {
            if cancel.is_cancelled() {
                debug!(
                    "Tick cancelled, leaving match {} in {} uncommitted",
                    formed.match_id, category
                );
                break;
            }
            let members: Vec<WaitingEntry> = formed
                .user_ids
                .iter()
                .filter_map(|id| by_user.get(id).map(|entry| (*entry).clone()))
                .collect();

            let committed = if members.len() == formed.user_ids.len() {
                self.store.remove_group_if_unchanged(&members).await
            } else {
                Ok(false)
            };

            match committed {
                Ok(true) => {
                    report.matches_committed += 1;
                    committed_users.extend(formed.user_ids.iter().cloned());
                    if let Some(metrics) = &self.metrics {
                        metrics.record_match_formed(category, formed.user_ids.len());
                    }
                    if !self.deliver(formed).await {
                        report.notifications_failed += 1;
                    }
                }
                Ok(false) => {
                    report.matches_discarded += 1;
                    info!(
                        "Discarded match {} in {}: a member left or re-enqueued before commit",
                        formed.match_id, category
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_match_discarded(category);
                    }
                }
                Err(e) => {
                    report.matches_discarded += 1;
                    warn!(
                        "Failed to commit match {} in {}: {}",
                        formed.match_id, category, e
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_match_discarded(category);
                    }
                }
            }
        }

        for entry in &outcome.evicted {
            match self.store.remove_if_unchanged(entry).await {
                Ok(true) => {
                    report.users_evicted += 1;
                    info!(
                        "Evicted user {} from {} after waiting {:?}",
                        entry.user_id, category, entry.timeout
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_eviction(category);
                    }
                }
                Ok(false) => {
                    debug!(
                        "User {} already left {} before eviction",
                        entry.user_id, category
                    );
                }
                Err(e) => {
                    warn!(
                        "Failed to evict user {} from {}: {}",
                        entry.user_id, category, e
                    );
                }
            }
        }

        Ok(())
    }

    /// Hand a committed match to the handler. Returns false on handler failure.
    ///
    /// The call runs on its own tracked task, so aborting the tick after the
    /// commit cannot drop the notification.
    async fn deliver(&self, formed: Match) -> bool {
        let match_id = formed.match_id;
        let category = formed.category.clone();
        let handler = self.handler.clone();
        let metrics = self.metrics.clone();

        let delivery = self.deliveries.spawn(async move {
            match handler.on_match_formed(formed).await {
                Ok(()) => true,
                Err(e) => {
                    error!(
                        "Match-formed handler failed for match {} in {}: {}",
                        match_id, category, e
                    );
                    if let Some(metrics) = &metrics {
                        metrics.record_notification_failure();
                    }
                    false
                }
            }
        });

        match delivery.await {
            Ok(delivered) => delivered,
            Err(e) => {
                error!("Delivery task for match {} failed: {}", match_id, e);
                false
            }
        }
    }

    /// Wait for every handler call started so far. No new deliveries are
    /// expected once this is called.
    pub async fn drain_deliveries(&self) {
        self.deliveries.close();
        self.deliveries.wait().await;
    }

    /// Number of handler calls still running
    pub fn pending_deliveries(&self) -> usize {
        self.deliveries.len()
    }

    fn observe_tick(&self, report: &TickReport) {
        if let Some(metrics) = &self.metrics {
            metrics.record_tick(report.duration);
        }
    }
}
