//! In-memory store implementations
//!
//! Locks are held only for the duration of one operation and never across an
//! await point. Availability can be switched off to exercise `Unavailable` paths.

use crate::error::{MatchmakingError, Result};
use crate::store::{PresenceStore, WaitingPoolStore};
use crate::types::{Category, PresenceRecord, UserId, WaitingEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

type Pools = HashMap<Category, HashMap<UserId, WaitingEntry>>;

/// In-memory waiting pool store
#[derive(Debug)]
pub struct InMemoryWaitingPoolStore {
    pools: RwLock<Pools>,
    next_revision: AtomicU64,
    available: AtomicBool,
}

impl InMemoryWaitingPoolStore {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            next_revision: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backing store going away (false) or coming back (true)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MatchmakingError::StoreUnavailable {
                message: "in-memory waiting pool store is switched off".to_string(),
            }
            .into())
        }
    }

    fn is_current(pools: &Pools, entry: &WaitingEntry) -> bool {
        pools
            .get(&entry.category)
            .and_then(|pool| pool.get(&entry.user_id))
            .map(|stored| stored.same_version(entry))
            .unwrap_or(false)
    }

    fn remove_entry(pools: &mut Pools, category: &Category, user_id: &UserId) -> bool {
        let Some(pool) = pools.get_mut(category) else {
            return false;
        };
        let removed = pool.remove(user_id).is_some();
        if pool.is_empty() {
            pools.remove(category);
        }
        removed
    }
}

impl Default for InMemoryWaitingPoolStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitingPoolStore for InMemoryWaitingPoolStore {
    async fn enqueue(
        &self,
        user_id: &UserId,
        category: &Category,
        enqueued_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<WaitingEntry> {
        self.ensure_available()?;

        let mut pools = self
            .pools
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("waiting pools"))?;

        let entry = WaitingEntry {
            user_id: user_id.clone(),
            category: category.clone(),
            enqueued_at,
            timeout,
            revision: self.next_revision.fetch_add(1, Ordering::SeqCst),
        };

        let previous = pools
            .entry(category.clone())
            .or_default()
            .insert(user_id.clone(), entry.clone());

        debug!(
            "Stored waiting entry user={} category={} revision={} refreshed={}",
            user_id,
            category,
            entry.revision,
            previous.is_some()
        );

        Ok(entry)
    }

    async fn remove(&self, user_id: &UserId, category: &Category) -> Result<bool> {
        self.ensure_available()?;

        let mut pools = self
            .pools
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("waiting pools"))?;

        Ok(Self::remove_entry(&mut pools, category, user_id))
    }

    async fn snapshot(&self, category: &Category) -> Result<Vec<WaitingEntry>> {
        self.ensure_available()?;

        let pools = self
            .pools
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("waiting pools"))?;

        let mut entries: Vec<WaitingEntry> = pools
            .get(category)
            .map(|pool| pool.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then(a.revision.cmp(&b.revision))
        });

        Ok(entries)
    }

    async fn remove_if_unchanged(&self, entry: &WaitingEntry) -> Result<bool> {
        self.ensure_available()?;

        let mut pools = self
            .pools
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("waiting pools"))?;

        if !Self::is_current(&pools, entry) {
            return Ok(false);
        }

        Ok(Self::remove_entry(
            &mut pools,
            &entry.category,
            &entry.user_id,
        ))
    }

    async fn remove_group_if_unchanged(&self, entries: &[WaitingEntry]) -> Result<bool> {
        self.ensure_available()?;

        let mut pools = self
            .pools
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("waiting pools"))?;

        if !entries.iter().all(|entry| Self::is_current(&pools, entry)) {
            return Ok(false);
        }

        for entry in entries {
            Self::remove_entry(&mut pools, &entry.category, &entry.user_id);
        }

        Ok(true)
    }

    async fn active_categories(&self) -> Result<Vec<Category>> {
        self.ensure_available()?;

        let pools = self
            .pools
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("waiting pools"))?;

        let mut categories: Vec<Category> = pools
            .iter()
            .filter(|(_, pool)| !pool.is_empty())
            .map(|(category, _)| category.clone())
            .collect();
        categories.sort();

        Ok(categories)
    }

    async fn pool_sizes(&self) -> Result<HashMap<Category, usize>> {
        self.ensure_available()?;

        let pools = self
            .pools
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("waiting pools"))?;

        Ok(pools
            .iter()
            .map(|(category, pool)| (category.clone(), pool.len()))
            .collect())
    }
}

/// In-memory presence store
#[derive(Debug)]
pub struct InMemoryPresenceStore {
    records: RwLock<HashMap<UserId, PresenceRecord>>,
    available: AtomicBool,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backing store going away (false) or coming back (true)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MatchmakingError::PresenceUnavailable {
                message: "in-memory presence store is switched off".to_string(),
            }
            .into())
        }
    }

    /// Drop records whose TTL elapsed before `now`. Returns how many were dropped.
    pub fn purge_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut records = self
            .records
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("presence records"))?;

        let before = records.len();
        records.retain(|_, record| record.is_live(now));
        Ok(before - records.len())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryPresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn upsert(&self, record: PresenceRecord) -> Result<()> {
        self.ensure_available()?;

        let mut records = self
            .records
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("presence records"))?;
        records.insert(record.user_id.clone(), record);

        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<PresenceRecord>> {
        self.ensure_available()?;

        let records = self
            .records
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("presence records"))?;

        Ok(records.get(user_id).cloned())
    }

    async fn get_many(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, PresenceRecord>> {
        self.ensure_available()?;

        let records = self
            .records
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("presence records"))?;

        let mut result = HashMap::new();
        for user_id in user_ids {
            if let Some(record) = records.get(user_id) {
                result.insert(user_id.clone(), record.clone());
            }
        }

        Ok(result)
    }
}
