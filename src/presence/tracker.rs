//! Presence tracker backed by a [`PresenceStore`]

use crate::error::Result;
use crate::store::PresenceStore;
use crate::types::{PresenceRecord, UserId};
use crate::utils::Clock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Records and answers per-user liveness with a time-to-live
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn PresenceStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create or refresh the user's record with the current time
    pub async fn heartbeat(&self, user_id: &UserId) -> Result<()> {
        let record = PresenceRecord {
            user_id: user_id.clone(),
            last_seen_at: self.clock.now(),
            ttl: self.ttl,
        };

        debug!("Heartbeat from user {} at {}", user_id, record.last_seen_at);
        self.store.upsert(record).await
    }

    /// True iff a record exists and its TTL has not elapsed. No record means offline.
    pub async fn is_online(&self, user_id: &UserId) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .store
            .get(user_id)
            .await?
            .map(|record| record.is_live(now))
            .unwrap_or(false))
    }

    /// The subset of `user_ids` currently online, in one store round-trip
    pub async fn online_among(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let now = self.clock.now();
        let records = self.store.get_many(user_ids).await?;

        Ok(records
            .into_values()
            .filter(|record| record.is_live(now))
            .map(|record| record.user_id)
            .collect())
    }
}
