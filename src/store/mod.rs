//! Storage interfaces for the shared waiting-pool and presence state
//!
//! Every mutation of shared state goes through one of these traits. Each
//! method is a single atomic operation against the backing store, so an
//! in-memory implementation can stand in for a networked one in tests.

pub mod memory;

use crate::error::Result;
use crate::types::{Category, PresenceRecord, UserId, WaitingEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

pub use memory::{InMemoryPresenceStore, InMemoryWaitingPoolStore};

/// Per-category collection of waiting entries
#[async_trait]
pub trait WaitingPoolStore: Send + Sync {
    /// Insert or refresh the entry for (user, category). At most one entry per
    /// pair exists afterwards; a refresh moves `enqueued_at` and bumps the revision.
    async fn enqueue(
        &self,
        user_id: &UserId,
        category: &Category,
        enqueued_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<WaitingEntry>;

    /// Remove the entry for (user, category). Returns false if there was none.
    async fn remove(&self, user_id: &UserId, category: &Category) -> Result<bool>;

    /// All recorded entries of a category, oldest first, stale ones included
    async fn snapshot(&self, category: &Category) -> Result<Vec<WaitingEntry>>;

    /// Remove `entry` only if the stored version is still the same one
    async fn remove_if_unchanged(&self, entry: &WaitingEntry) -> Result<bool>;

    /// Remove every entry in `entries` only if all of them are unchanged.
    /// Either all are removed (true) or none are (false).
    async fn remove_group_if_unchanged(&self, entries: &[WaitingEntry]) -> Result<bool>;

    /// Categories holding at least one entry, sorted
    async fn active_categories(&self) -> Result<Vec<Category>>;

    /// Number of entries per active category
    async fn pool_sizes(&self) -> Result<HashMap<Category, usize>>;
}

/// Per-user liveness records
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn upsert(&self, record: PresenceRecord) -> Result<()>;

    async fn get(&self, user_id: &UserId) -> Result<Option<PresenceRecord>>;

    /// Records for the users that have one; users without a record are absent from the map
    async fn get_many(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, PresenceRecord>>;
}
