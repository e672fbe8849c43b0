//! Common types used throughout the waiting-room service

use crate::error::{MatchmakingError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Longest accepted user identifier
pub const MAX_USER_ID_LEN: usize = 64;

/// Longest accepted category name
pub const MAX_CATEGORY_LEN: usize = 32;

/// Unique identifier for formed matches
pub type MatchId = Uuid;

/// Externally issued user identifier. Never created or authenticated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        if raw.is_empty() {
            return Err(MatchmakingError::InvalidUserId {
                reason: "user id cannot be empty".to_string(),
            }
            .into());
        }
        if raw.len() > MAX_USER_ID_LEN {
            return Err(MatchmakingError::InvalidUserId {
                reason: format!("user id exceeds {} bytes", MAX_USER_ID_LEN),
            }
            .into());
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(MatchmakingError::InvalidUserId {
                reason: format!(
                    "user id '{}' contains whitespace or control characters",
                    raw.escape_debug()
                ),
            }
            .into());
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Matchmaking pool identifier. Pools of different categories never share entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

impl Category {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        if raw.is_empty() {
            return Err(MatchmakingError::InvalidCategory {
                reason: "category cannot be empty".to_string(),
            }
            .into());
        }
        if raw.len() > MAX_CATEGORY_LEN {
            return Err(MatchmakingError::InvalidCategory {
                reason: format!("category exceeds {} bytes", MAX_CATEGORY_LEN),
            }
            .into());
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(MatchmakingError::InvalidCategory {
                reason: format!("category '{}' must match [a-z0-9_-]", raw.escape_debug()),
            }
            .into());
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Category {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

/// A user waiting for a match in one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub user_id: UserId,
    pub category: Category,
    pub enqueued_at: DateTime<Utc>,
    /// How long the entry may wait before it is evicted
    pub timeout: Duration,
    /// Store-assigned; changes on every refresh of the same (user, category) pair
    pub revision: u64,
}

impl WaitingEntry {
    /// Whether `now` is past this entry's deadline. Waiting exactly `timeout` is still allowed.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        crate::utils::elapsed_exceeds(self.enqueued_at, now, self.timeout)
    }

    /// Whether `other` is the very same stored version of this entry
    pub fn same_version(&self, other: &WaitingEntry) -> bool {
        self.user_id == other.user_id
            && self.category == other.category
            && self.revision == other.revision
    }
}

/// Last observed liveness of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub last_seen_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl PresenceRecord {
    /// A record is live while `now - last_seen_at <= ttl`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !crate::utils::elapsed_exceeds(self.last_seen_at, now, self.ttl)
    }
}

/// A group of users committed together and removed from the waiting pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: MatchId,
    pub category: Category,
    /// Oldest-enqueued first
    pub user_ids: Vec<UserId>,
    pub formed_at: DateTime<Utc>,
}

impl Match {
    pub fn contains(&self, user_id: &UserId) -> bool {
        self.user_ids.contains(user_id)
    }
}
