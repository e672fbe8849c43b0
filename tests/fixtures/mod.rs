//! Test fixtures and store wrappers for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use waiting_room::config::{AppConfig, MatchingConfig};
use waiting_room::error::{MatchmakingError, Result};
use waiting_room::events::RecordingMatchHandler;
use waiting_room::matching::MatchingEngine;
use waiting_room::presence::PresenceTracker;
use waiting_room::scheduler::TickProcessor;
use waiting_room::service::MatchmakingService;
use waiting_room::store::{InMemoryPresenceStore, InMemoryWaitingPoolStore, WaitingPoolStore};
use waiting_room::types::{Category, UserId, WaitingEntry};
use waiting_room::utils::ManualClock;

/// Waiting pool store that lets a test interleave removals with a tick.
///
/// Removals queued with [`RacingStore::cancel_before_commit`] are applied
/// right before the next group commit, as if the users had left between the
/// tick's snapshot and its commit.
pub struct RacingStore {
    inner: Arc<InMemoryWaitingPoolStore>,
    pending_cancels: Mutex<Vec<(UserId, Category)>>,
}

impl RacingStore {
    pub fn new(inner: Arc<InMemoryWaitingPoolStore>) -> Self {
        Self {
            inner,
            pending_cancels: Mutex::new(Vec::new()),
        }
    }

    pub fn cancel_before_commit(&self, user_id: &UserId, category: &Category) {
        self.pending_cancels
            .lock()
            .unwrap()
            .push((user_id.clone(), category.clone()));
    }
}

#[async_trait]
impl WaitingPoolStore for RacingStore {
    async fn enqueue(
        &self,
        user_id: &UserId,
        category: &Category,
        enqueued_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<WaitingEntry> {
        self.inner
            .enqueue(user_id, category, enqueued_at, timeout)
            .await
    }

    async fn remove(&self, user_id: &UserId, category: &Category) -> Result<bool> {
        self.inner.remove(user_id, category).await
    }

    async fn snapshot(&self, category: &Category) -> Result<Vec<WaitingEntry>> {
        self.inner.snapshot(category).await
    }

    async fn remove_if_unchanged(&self, entry: &WaitingEntry) -> Result<bool> {
        self.inner.remove_if_unchanged(entry).await
    }

    async fn remove_group_if_unchanged(&self, entries: &[WaitingEntry]) -> Result<bool> {
        let pending: Vec<_> = self.pending_cancels.lock().unwrap().drain(..).collect();
        for (user_id, category) in pending {
            self.inner.remove(&user_id, &category).await?;
        }
        self.inner.remove_group_if_unchanged(entries).await
    }

    async fn active_categories(&self) -> Result<Vec<Category>> {
        self.inner.active_categories().await
    }

    async fn pool_sizes(&self) -> Result<HashMap<Category, usize>> {
        self.inner.pool_sizes().await
    }
}

/// Waiting pool store whose snapshots fail for selected categories
pub struct PartitionedStore {
    inner: Arc<InMemoryWaitingPoolStore>,
    unreachable: Mutex<HashSet<Category>>,
}

impl PartitionedStore {
    pub fn new(inner: Arc<InMemoryWaitingPoolStore>) -> Self {
        Self {
            inner,
            unreachable: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_unreachable(&self, category: &Category, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(category.clone());
        } else {
            set.remove(category);
        }
    }
}

#[async_trait]
impl WaitingPoolStore for PartitionedStore {
    async fn enqueue(
        &self,
        user_id: &UserId,
        category: &Category,
        enqueued_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<WaitingEntry> {
        self.inner
            .enqueue(user_id, category, enqueued_at, timeout)
            .await
    }

    async fn remove(&self, user_id: &UserId, category: &Category) -> Result<bool> {
        self.inner.remove(user_id, category).await
    }

    async fn snapshot(&self, category: &Category) -> Result<Vec<WaitingEntry>> {
        if self.unreachable.lock().unwrap().contains(category) {
            return Err(MatchmakingError::StoreUnavailable {
                message: format!("partition for {} is unreachable", category),
            }
            .into());
        }
        self.inner.snapshot(category).await
    }

    async fn remove_if_unchanged(&self, entry: &WaitingEntry) -> Result<bool> {
        self.inner.remove_if_unchanged(entry).await
    }

    async fn remove_group_if_unchanged(&self, entries: &[WaitingEntry]) -> Result<bool> {
        self.inner.remove_group_if_unchanged(entries).await
    }

    async fn active_categories(&self) -> Result<Vec<Category>> {
        self.inner.active_categories().await
    }

    async fn pool_sizes(&self) -> Result<HashMap<Category, usize>> {
        self.inner.pool_sizes().await
    }
}

/// Fixed starting point for manual clocks
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn category(name: &str) -> Category {
    Category::new(name).unwrap()
}

/// A complete in-memory stack driven by a manual clock
pub struct TestBed {
    pub pool: Arc<InMemoryWaitingPoolStore>,
    pub presence_store: Arc<InMemoryPresenceStore>,
    pub presence: PresenceTracker,
    pub clock: Arc<ManualClock>,
    pub handler: Arc<RecordingMatchHandler>,
    pub service: MatchmakingService,
    pub processor: TickProcessor,
}

impl TestBed {
    /// Group size 2, 30s waiting timeout, 60s presence TTL
    pub fn new() -> Self {
        Self::with_store(|pool| pool as Arc<dyn WaitingPoolStore>)
    }

    /// Build the stack with `wrap` placed in front of the in-memory waiting pool
    pub fn with_store<F>(wrap: F) -> Self
    where
        F: FnOnce(Arc<InMemoryWaitingPoolStore>) -> Arc<dyn WaitingPoolStore>,
    {
        Self::build(2, wrap)
    }

    pub fn with_group_size(group_size: usize) -> Self {
        Self::build(group_size, |pool| pool as Arc<dyn WaitingPoolStore>)
    }

    fn build<F>(group_size: usize, wrap: F) -> Self
    where
        F: FnOnce(Arc<InMemoryWaitingPoolStore>) -> Arc<dyn WaitingPoolStore>,
    {
        let mut app = AppConfig::default();
        app.matchmaking.group_size = group_size;
        app.matchmaking.waiting_timeout_seconds = 30;
        app.matchmaking.category_timeouts.insert("short".to_string(), 10);

        let pool = Arc::new(InMemoryWaitingPoolStore::new());
        let store = wrap(pool.clone());
        let presence_store = Arc::new(InMemoryPresenceStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let presence =
            PresenceTracker::new(presence_store.clone(), clock.clone(), Duration::from_secs(60));
        let handler = Arc::new(RecordingMatchHandler::new());

        let service = MatchmakingService::new(
            store.clone(),
            presence.clone(),
            MatchingConfig::from_app_config(&app).unwrap(),
            clock.clone(),
        );
        let processor = TickProcessor::new(
            store,
            presence.clone(),
            MatchingEngine::new(group_size),
            handler.clone(),
            clock.clone(),
        );

        Self {
            pool,
            presence_store,
            presence,
            clock,
            handler,
            service,
            processor,
        }
    }

    /// Move the clock to `secs` seconds after [`t0`]
    pub fn at(&self, secs: i64) {
        self.clock.set(t0() + chrono::Duration::seconds(secs));
    }

    /// Heartbeat then join
    pub async fn join_present(&self, user_id: &str, category: &str) {
        self.service.heartbeat(user_id).await.unwrap();
        self.service
            .add_to_waiting_list(user_id, category)
            .await
            .unwrap();
    }

    pub async fn waiting(&self, category_name: &str) -> Vec<String> {
        self.pool
            .snapshot(&category(category_name))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.user_id.to_string())
            .collect()
    }

    /// Members of every delivered match, in delivery order
    pub fn delivered_groups(&self) -> Vec<Vec<String>> {
        self.handler
            .delivered()
            .into_iter()
            .map(|m| m.user_ids.into_iter().map(String::from).collect())
            .collect()
    }
}
